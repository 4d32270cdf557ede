// crates/triage-desk-core/src/core/time/tests.rs
// ============================================================================
// Module: Time Model Tests
// Description: Unit tests for timestamp parsing, formatting, and accrual math.
// Purpose: Validate UTC normalization, naive-value handling, and clamping.
// Dependencies: triage-desk-core
// ============================================================================

//! ## Overview
//! Validates that storage round-trips are lossless, naive and offset-bearing
//! inputs normalize to the same instant, and elapsed-time helpers clamp
//! negative deltas to zero.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

use super::Clock;
use super::ManualClock;
use super::TimeError;
use super::Timestamp;

#[test]
fn storage_round_trip_is_lossless() {
    let parsed = Timestamp::parse("2026-03-01T08:15:00+00:00").expect("parse");
    assert_eq!(parsed.to_storage(), "2026-03-01T08:15:00+00:00");
    assert_eq!(Timestamp::parse(&parsed.to_storage()).expect("reparse"), parsed);
}

#[test]
fn zulu_suffix_parses_as_utc() {
    let zulu = Timestamp::parse("2026-03-01T08:15:00Z").expect("parse zulu");
    let offset = Timestamp::parse("2026-03-01T08:15:00+00:00").expect("parse offset");
    assert_eq!(zulu, offset);
}

#[test]
fn naive_values_are_interpreted_as_utc() {
    let naive = Timestamp::parse("2026-03-01T08:15:00").expect("parse naive");
    let explicit = Timestamp::parse("2026-03-01T08:15:00+00:00").expect("parse explicit");
    assert_eq!(naive, explicit);
}

#[test]
fn space_separator_is_accepted() {
    let spaced = Timestamp::parse("2026-03-01 08:15:00").expect("parse spaced");
    assert_eq!(spaced.to_storage(), "2026-03-01T08:15:00+00:00");
}

#[test]
fn fractional_seconds_truncate() {
    let with_fraction = Timestamp::parse("2026-03-01T08:15:00.734210+00:00").expect("parse");
    assert_eq!(with_fraction.to_storage(), "2026-03-01T08:15:00+00:00");
    let naive_fraction = Timestamp::parse("2026-03-01T08:15:00.734210").expect("parse naive");
    assert_eq!(naive_fraction, with_fraction);
}

#[test]
fn nonzero_offsets_normalize_to_utc() {
    let eastern = Timestamp::parse("2026-03-01T03:15:00-05:00").expect("parse offset");
    assert_eq!(eastern.to_storage(), "2026-03-01T08:15:00+00:00");
}

#[test]
fn empty_and_garbage_inputs_are_rejected() {
    assert_eq!(Timestamp::parse(""), Err(TimeError::Parse(String::new())));
    assert!(Timestamp::parse("not-a-timestamp").is_err());
    assert!(Timestamp::parse("2026-13-01T00:00:00").is_err());
}

#[test]
fn seconds_since_floors_and_clamps() {
    let start = Timestamp::parse("2026-03-01T08:00:00+00:00").expect("start");
    let end = Timestamp::parse("2026-03-01T08:01:30+00:00").expect("end");
    assert_eq!(end.seconds_since(start), 90);
    assert_eq!(start.seconds_since(end), 0);
    assert_eq!(end.minutes_since(start), 1);
}

#[test]
fn minus_minutes_shifts_backwards() {
    let now = Timestamp::parse("2026-03-01T08:15:00+00:00").expect("now");
    assert_eq!(now.minus_minutes(15).to_storage(), "2026-03-01T08:00:00+00:00");
}

#[test]
fn manual_clock_advances_deterministically() {
    let start = Timestamp::parse("2026-03-01T08:00:00+00:00").expect("start");
    let clock = ManualClock::new(start);
    assert_eq!(clock.now(), start);
    clock.advance_seconds(120);
    assert_eq!(clock.now().to_storage(), "2026-03-01T08:02:00+00:00");
}

#[test]
fn storage_strings_compare_chronologically() {
    let earlier = Timestamp::parse("2026-03-01T08:00:00+00:00").expect("earlier");
    let later = Timestamp::parse("2026-03-01T09:00:00+00:00").expect("later");
    assert!(earlier.to_storage() < later.to_storage());
}
