// crates/triage-desk-core/src/core/identifiers.rs
// ============================================================================
// Module: Triage Desk Identifiers
// Description: Canonical typed identifiers for incidents, chats, and tenants.
// Purpose: Provide strongly typed, serializable identifiers with stable wire forms.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! This module defines the canonical identifiers used throughout Triage Desk.
//! Platform-scoped identifiers (`GroupId`, `UserId`, `MessageId`) are signed
//! integers because chat platforms issue negative channel ids. Store-scoped
//! identifiers (`CompanyId`, `DepartmentId`) are row ids. Incident ids are
//! zero-padded decimal strings minted densely by the store; legacy ticket ids
//! containing digit groups are accepted on read but never minted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Platform Identifiers
// ============================================================================

/// Chat group (channel) identifier issued by the chat platform.
///
/// # Invariants
/// - Opaque; group channels commonly carry negative values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(i64);

impl GroupId {
    /// Creates a new group identifier.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw identifier value.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Platform user identifier.
///
/// # Invariants
/// - Opaque; positive for real users on the supported platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i64);

impl UserId {
    /// Creates a new user identifier.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw identifier value.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Chat message identifier scoped to a group.
///
/// # Invariants
/// - Opaque; unique only within its group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(i64);

impl MessageId {
    /// Creates a new message identifier.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw identifier value.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Callback query identifier issued by the chat platform for button taps.
///
/// # Invariants
/// - Opaque UTF-8 string; no normalization is applied.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallbackId(String);

impl CallbackId {
    /// Creates a new callback identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Tenant Identifiers
// ============================================================================

/// Company (tenant) identifier.
///
/// # Invariants
/// - Store row id; always >= 1 for persisted companies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompanyId(i64);

impl CompanyId {
    /// Creates a new company identifier.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw identifier value.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for CompanyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Department identifier scoped to a company.
///
/// # Invariants
/// - Store row id; always >= 1 for persisted departments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DepartmentId(i64);

impl DepartmentId {
    /// Creates a new department identifier.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw identifier value.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for DepartmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Incident Identifier
// ============================================================================

/// Minimum rendered width for minted incident id suffixes.
const INCIDENT_ID_MIN_WIDTH: usize = 4;

/// Incident ticket identifier.
///
/// # Invariants
/// - Minted values are zero-padded decimal strings, 4 digits minimum, wider
///   once the numeric suffix exceeds 9999.
/// - Legacy ids containing digit groups (for example `TKT-2024-0042`) are
///   accepted on read; the last digit group is the numeric suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IncidentId(String);

impl IncidentId {
    /// Creates an incident identifier from a stored value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Renders a freshly minted identifier from a numeric suffix.
    #[must_use]
    pub fn from_suffix(suffix: u64) -> Self {
        Self(format!("{suffix:0width$}", width = INCIDENT_ID_MIN_WIDTH))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Extracts the numeric suffix: the last run of ASCII digits.
    ///
    /// Returns `None` when the identifier contains no digits or the digit
    /// run overflows `u64`.
    #[must_use]
    pub fn numeric_suffix(&self) -> Option<u64> {
        last_digit_group(&self.0)
    }
}

impl fmt::Display for IncidentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for IncidentId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for IncidentId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Parses the last run of ASCII digits in `value` as a `u64`.
fn last_digit_group(value: &str) -> Option<u64> {
    let mut end = None;
    let bytes = value.as_bytes();
    for (index, byte) in bytes.iter().enumerate().rev() {
        if byte.is_ascii_digit() {
            end = Some(index + 1);
            break;
        }
    }
    let end = end?;
    let mut start = end;
    while start > 0 && bytes[start - 1].is_ascii_digit() {
        start -= 1;
    }
    value.get(start .. end)?.parse().ok()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
