// crates/triage-desk-core/src/core/time.rs
// ============================================================================
// Module: Triage Desk Time Model
// Description: UTC timestamps, storage formatting, and clock abstraction.
// Purpose: Keep every persisted instant explicit UTC and comparable as text.
// Dependencies: serde, thiserror, time
// ============================================================================

//! ## Overview
//! All persisted instants are ISO-8601 with an explicit `+00:00` offset so
//! stored strings compare correctly as text. Values read back from storage
//! may be naive (legacy rows) or carry a `Z`/offset suffix; naive values are
//! interpreted as UTC. Timestamps are truncated to whole seconds at
//! construction, which keeps re-rendered views byte-stable and accrual math
//! in whole seconds.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Mutex;
use std::sync::PoisonError;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use thiserror::Error;
use time::Duration;
use time::OffsetDateTime;
use time::PrimitiveDateTime;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Timestamp parsing errors.
///
/// # Invariants
/// - Error messages avoid embedding anything but the offending value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimeError {
    /// The stored value could not be parsed as a timestamp.
    #[error("invalid timestamp: {0}")]
    Parse(String),
}

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// Storage format for naive timestamps read back from legacy rows.
const NAIVE_FORMAT: &[time::format_description::BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");

/// Canonical UTC timestamp with whole-second resolution.
///
/// # Invariants
/// - Always UTC; the sub-second component is always zero.
/// - `to_storage` output parses back to an equal value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(OffsetDateTime);

impl Timestamp {
    /// Returns the current UTC instant truncated to whole seconds.
    #[must_use]
    pub fn now() -> Self {
        Self::from_datetime(OffsetDateTime::now_utc())
    }

    /// Normalizes an arbitrary datetime into the canonical representation.
    #[must_use]
    fn from_datetime(value: OffsetDateTime) -> Self {
        let utc = value.to_offset(time::UtcOffset::UTC);
        Self(utc.replace_nanosecond(0).unwrap_or(utc))
    }

    /// Parses a stored timestamp.
    ///
    /// Accepts ISO-8601 values with an explicit offset or `Z` suffix, a `T`
    /// or space separator, and optional fractional seconds. Naive values are
    /// interpreted as UTC.
    ///
    /// # Errors
    ///
    /// Returns [`TimeError::Parse`] when the value matches none of the
    /// accepted shapes.
    pub fn parse(value: &str) -> Result<Self, TimeError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(TimeError::Parse(value.to_string()));
        }
        let normalized = normalize_separator(trimmed);
        if has_explicit_offset(&normalized) {
            let parsed = OffsetDateTime::parse(&normalized, &Rfc3339)
                .map_err(|_| TimeError::Parse(value.to_string()))?;
            return Ok(Self::from_datetime(parsed));
        }
        let without_fraction = normalized.split('.').next().unwrap_or(&normalized);
        let parsed = PrimitiveDateTime::parse(without_fraction, NAIVE_FORMAT)
            .map_err(|_| TimeError::Parse(value.to_string()))?;
        Ok(Self::from_datetime(parsed.assume_utc()))
    }

    /// Renders the canonical storage form, e.g. `2026-03-01T08:15:00+00:00`.
    #[must_use]
    pub fn to_storage(self) -> String {
        let date = self.0.date();
        let time = self.0.time();
        format!(
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}+00:00",
            date.year(),
            u8::from(date.month()),
            date.day(),
            time.hour(),
            time.minute(),
            time.second()
        )
    }

    /// Returns whole seconds from `start` to `self`, clamped to zero.
    ///
    /// Clock skew observed across a storage restore must never produce a
    /// negative accrual term.
    #[must_use]
    pub fn seconds_since(self, start: Self) -> u64 {
        let seconds = (self.0 - start.0).whole_seconds();
        u64::try_from(seconds).unwrap_or(0)
    }

    /// Returns whole minutes from `start` to `self`, clamped to zero.
    #[must_use]
    pub fn minutes_since(self, start: Self) -> u64 {
        self.seconds_since(start) / 60
    }

    /// Returns this timestamp shifted backwards by whole minutes.
    #[must_use]
    pub fn minus_minutes(self, minutes: u64) -> Self {
        let shift = Duration::minutes(i64::try_from(minutes).unwrap_or(i64::MAX));
        Self::from_datetime(self.0.saturating_sub(shift))
    }

    /// Returns this timestamp shifted forwards by whole seconds.
    #[must_use]
    pub fn plus_seconds(self, seconds: u64) -> Self {
        let shift = Duration::seconds(i64::try_from(seconds).unwrap_or(i64::MAX));
        Self::from_datetime(self.0.saturating_add(shift))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_storage())
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_storage())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Self::parse(&value).map_err(serde::de::Error::custom)
    }
}

/// Replaces a space separator between date and time with `T`.
fn normalize_separator(value: &str) -> String {
    if value.len() > 10 && value.as_bytes()[10] == b' ' {
        let mut normalized = value.to_string();
        normalized.replace_range(10 .. 11, "T");
        normalized
    } else {
        value.to_string()
    }
}

/// Returns true when the value carries a `Z` suffix or numeric offset.
fn has_explicit_offset(value: &str) -> bool {
    let Some(tail) = value.get(19 ..) else {
        return false;
    };
    tail.contains('Z') || tail.contains('z') || tail.contains('+') || tail.contains('-')
}

// ============================================================================
// SECTION: Clock
// ============================================================================

/// Time source abstraction for lifecycle operations and the scheduler.
pub trait Clock: Send + Sync {
    /// Returns the current UTC instant.
    fn now(&self) -> Timestamp;
}

/// Wall-clock time source.
///
/// # Invariants
/// - Delegates directly to the operating system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// Deterministic clock for tests and offline replay.
///
/// # Invariants
/// - Only advances when explicitly told to.
#[derive(Debug)]
pub struct ManualClock {
    /// Current instant returned by [`Clock::now`].
    current: Mutex<Timestamp>,
}

impl ManualClock {
    /// Creates a manual clock pinned to the given instant.
    #[must_use]
    pub const fn new(start: Timestamp) -> Self {
        Self {
            current: Mutex::new(start),
        }
    }

    /// Replaces the current instant.
    pub fn set(&self, value: Timestamp) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = value;
    }

    /// Advances the current instant by whole seconds.
    pub fn advance_seconds(&self, seconds: u64) {
        let mut guard = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        *guard = guard.plus_seconds(seconds);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
