// crates/triage-desk-core/src/core/identifiers/tests.rs
// ============================================================================
// Module: Identifier Tests
// Description: Unit tests for incident id minting and suffix extraction.
// Purpose: Validate zero-padding, widening, and legacy id acceptance.
// Dependencies: triage-desk-core
// ============================================================================

//! ## Overview
//! Validates that incident id suffix extraction accepts minted and legacy id
//! shapes and that minted ids render with stable zero padding.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

use super::IncidentId;

#[test]
fn from_suffix_pads_to_four_digits() {
    assert_eq!(IncidentId::from_suffix(1).as_str(), "0001");
    assert_eq!(IncidentId::from_suffix(42).as_str(), "0042");
    assert_eq!(IncidentId::from_suffix(9999).as_str(), "9999");
}

#[test]
fn from_suffix_widens_past_9999() {
    assert_eq!(IncidentId::from_suffix(10_000).as_str(), "10000");
    assert_eq!(IncidentId::from_suffix(123_456).as_str(), "123456");
}

#[test]
fn numeric_suffix_reads_minted_ids() {
    assert_eq!(IncidentId::new("0001").numeric_suffix(), Some(1));
    assert_eq!(IncidentId::new("0420").numeric_suffix(), Some(420));
    assert_eq!(IncidentId::new("10000").numeric_suffix(), Some(10_000));
}

#[test]
fn numeric_suffix_reads_last_group_of_legacy_ids() {
    assert_eq!(IncidentId::new("TKT-2024-0042").numeric_suffix(), Some(42));
    assert_eq!(IncidentId::new("TKT-2023-9999").numeric_suffix(), Some(9_999));
}

#[test]
fn numeric_suffix_rejects_digitless_ids() {
    assert_eq!(IncidentId::new("no-digits-here").numeric_suffix(), None);
    assert_eq!(IncidentId::new("").numeric_suffix(), None);
}

#[test]
fn minting_after_legacy_ids_is_monotonic() {
    let stored = [
        IncidentId::new("TKT-2024-0042"),
        IncidentId::new("0007"),
        IncidentId::new("0103"),
    ];
    let max = stored.iter().filter_map(IncidentId::numeric_suffix).max().unwrap_or(0);
    assert_eq!(IncidentId::from_suffix(max + 1).as_str(), "0104");
}
