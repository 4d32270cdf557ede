// crates/triage-desk-config/src/lib.rs
// ============================================================================
// Module: Triage Desk Config
// Description: Environment-variable configuration with startup validation.
// Purpose: Load SLA timers, admin gating, and store/report settings once.
// Dependencies: thiserror, triage-desk-core
// ============================================================================

//! ## Overview
//! Configuration for the coordinator process, read from environment
//! variables at startup. Every invalid value is a [`ConfigError`] before any
//! connection is opened; missing optional keys fall back to documented
//! defaults. Report-renderer settings are validated for shape here and
//! forwarded untouched.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::path::PathBuf;

use thiserror::Error;
use triage_desk_core::UserId;

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Default unclaimed-nudge threshold in minutes.
const DEFAULT_SLA_UNCLAIMED_NUDGE_MINUTES: u64 = 10;
/// Default summary-timeout threshold in minutes.
const DEFAULT_SLA_SUMMARY_TIMEOUT_MINUTES: u64 = 30;
/// Default scheduler tick interval in minutes.
const DEFAULT_REMINDER_CHECK_INTERVAL_MINUTES: u64 = 5;
/// Default report timezone label.
const DEFAULT_REPORT_TIMEZONE: &str = "UTC";
/// Default report week boundary day.
const DEFAULT_REPORT_WEEK_END_DAY: &str = "sunday";
/// Default logging directive.
const DEFAULT_LOG_LEVEL: &str = "info";

/// Accepted weekday labels for `REPORT_WEEK_END_DAY`.
const WEEKDAYS: [&str; 7] =
    ["monday", "tuesday", "wednesday", "thursday", "friday", "saturday", "sunday"];
/// Accepted logging directives for `LOG_LEVEL`.
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading errors.
///
/// # Invariants
/// - Every message names the offending environment key.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required key is absent or empty.
    #[error("missing required configuration: {0}")]
    Missing(&'static str),
    /// A key carries a value outside its accepted shape.
    #[error("invalid configuration for {key}: {value}")]
    Invalid {
        /// Offending environment key.
        key: &'static str,
        /// Rejected value.
        value: String,
    },
}

// ============================================================================
// SECTION: Config
// ============================================================================

/// Validated process configuration.
///
/// # Invariants
/// - Timer values are minutes and greater than zero.
/// - `platform_admin_ids` is non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriageConfig {
    /// Store file location (`DATABASE_PATH`).
    pub database_path: PathBuf,
    /// Unclaimed-nudge threshold in minutes (`SLA_UNCLAIMED_NUDGE_MINUTES`).
    pub sla_unclaimed_nudge_minutes: u64,
    /// Summary-timeout threshold in minutes (`SLA_SUMMARY_TIMEOUT_MINUTES`).
    pub sla_summary_timeout_minutes: u64,
    /// Scheduler tick interval in minutes (`REMINDER_CHECK_INTERVAL_MINUTES`).
    pub reminder_check_interval_minutes: u64,
    /// Users allowed to run report and onboarding commands
    /// (`PLATFORM_ADMIN_IDS`).
    pub platform_admin_ids: Vec<UserId>,
    /// Timezone label forwarded to the report renderer (`REPORT_TIMEZONE`).
    pub report_timezone: String,
    /// Week boundary day forwarded to the report renderer
    /// (`REPORT_WEEK_END_DAY`).
    pub report_week_end_day: String,
    /// Optional template path forwarded to the report renderer
    /// (`REPORT_TEMPLATE_PATH`).
    pub report_template_path: Option<PathBuf>,
    /// Default tracing directive (`LOG_LEVEL`).
    pub log_level: String,
}

impl TriageConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for missing required keys or malformed
    /// values.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Loads configuration through an arbitrary key lookup.
    ///
    /// Exists so tests and embedders can supply settings without touching
    /// the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for missing required keys or malformed
    /// values.
    pub fn from_lookup(
        lookup: impl Fn(&'static str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let database_path = required(&lookup, "DATABASE_PATH")?;
        let platform_admin_ids = parse_admin_ids(&lookup)?;

        let sla_unclaimed_nudge_minutes = parse_minutes(
            &lookup,
            "SLA_UNCLAIMED_NUDGE_MINUTES",
            DEFAULT_SLA_UNCLAIMED_NUDGE_MINUTES,
        )?;
        let sla_summary_timeout_minutes = parse_minutes(
            &lookup,
            "SLA_SUMMARY_TIMEOUT_MINUTES",
            DEFAULT_SLA_SUMMARY_TIMEOUT_MINUTES,
        )?;
        let reminder_check_interval_minutes = parse_minutes(
            &lookup,
            "REMINDER_CHECK_INTERVAL_MINUTES",
            DEFAULT_REMINDER_CHECK_INTERVAL_MINUTES,
        )?;

        let report_timezone = optional(&lookup, "REPORT_TIMEZONE")
            .unwrap_or_else(|| DEFAULT_REPORT_TIMEZONE.to_string());
        let report_week_end_day = parse_week_end_day(&lookup)?;
        let report_template_path = optional(&lookup, "REPORT_TEMPLATE_PATH").map(PathBuf::from);
        let log_level = parse_log_level(&lookup)?;

        Ok(Self {
            database_path: PathBuf::from(database_path),
            sla_unclaimed_nudge_minutes,
            sla_summary_timeout_minutes,
            reminder_check_interval_minutes,
            platform_admin_ids,
            report_timezone,
            report_week_end_day,
            report_template_path,
            log_level,
        })
    }

    /// Returns the scheduler tick interval in seconds.
    #[must_use]
    pub const fn reminder_interval_seconds(&self) -> u64 {
        self.reminder_check_interval_minutes * 60
    }

    /// Returns true when the user may run admin-gated commands.
    #[must_use]
    pub fn is_platform_admin(&self, user: UserId) -> bool {
        self.platform_admin_ids.contains(&user)
    }
}

// ============================================================================
// SECTION: Parsing Helpers
// ============================================================================

/// Reads an optional key, treating empty values as absent.
fn optional(
    lookup: &impl Fn(&'static str) -> Option<String>,
    key: &'static str,
) -> Option<String> {
    lookup(key).map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

/// Reads a required key.
fn required(
    lookup: &impl Fn(&'static str) -> Option<String>,
    key: &'static str,
) -> Result<String, ConfigError> {
    optional(lookup, key).ok_or(ConfigError::Missing(key))
}

/// Parses a positive minute count with a default.
fn parse_minutes(
    lookup: &impl Fn(&'static str) -> Option<String>,
    key: &'static str,
    default: u64,
) -> Result<u64, ConfigError> {
    let Some(raw) = optional(lookup, key) else {
        return Ok(default);
    };
    match raw.parse::<u64>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(ConfigError::Invalid { key, value: raw }),
    }
}

/// Parses the comma-separated platform admin list.
fn parse_admin_ids(
    lookup: &impl Fn(&'static str) -> Option<String>,
) -> Result<Vec<UserId>, ConfigError> {
    const KEY: &str = "PLATFORM_ADMIN_IDS";
    let raw = required(lookup, KEY)?;
    let mut ids = Vec::new();
    for part in raw.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let id = part.parse::<i64>().map_err(|_| ConfigError::Invalid {
            key: KEY,
            value: raw.clone(),
        })?;
        let id = UserId::new(id);
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    if ids.is_empty() {
        return Err(ConfigError::Missing(KEY));
    }
    Ok(ids)
}

/// Parses the report week boundary day.
fn parse_week_end_day(
    lookup: &impl Fn(&'static str) -> Option<String>,
) -> Result<String, ConfigError> {
    const KEY: &str = "REPORT_WEEK_END_DAY";
    let Some(raw) = optional(lookup, KEY) else {
        return Ok(DEFAULT_REPORT_WEEK_END_DAY.to_string());
    };
    let normalized = raw.to_ascii_lowercase();
    if WEEKDAYS.contains(&normalized.as_str()) {
        Ok(normalized)
    } else {
        Err(ConfigError::Invalid { key: KEY, value: raw })
    }
}

/// Parses the default logging directive.
fn parse_log_level(
    lookup: &impl Fn(&'static str) -> Option<String>,
) -> Result<String, ConfigError> {
    const KEY: &str = "LOG_LEVEL";
    let Some(raw) = optional(lookup, KEY) else {
        return Ok(DEFAULT_LOG_LEVEL.to_string());
    };
    let normalized = raw.to_ascii_lowercase();
    if LOG_LEVELS.contains(&normalized.as_str()) {
        Ok(normalized)
    } else {
        Err(ConfigError::Invalid { key: KEY, value: raw })
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
