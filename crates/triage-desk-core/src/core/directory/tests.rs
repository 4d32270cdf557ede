// crates/triage-desk-core/src/core/directory/tests.rs
// ============================================================================
// Module: Directory Model Tests
// Description: Unit tests for handle normalization and role ranking.
// Purpose: Validate fallback handles and the monotone role ladder.
// Dependencies: triage-desk-core
// ============================================================================

//! ## Overview
//! Validates handle normalization edge cases and the legacy role ranking
//! used by the monotone-upgrade rule in user tracking.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

use super::GlobalRole;
use super::UserProfile;
use super::normalize_handle;
use crate::core::identifiers::UserId;

#[test]
fn normalize_handle_prefixes_at() {
    assert_eq!(normalize_handle(Some("alice"), UserId::new(7)), "@alice");
}

#[test]
fn normalize_handle_keeps_existing_prefix() {
    assert_eq!(normalize_handle(Some("@alice"), UserId::new(7)), "@alice");
}

#[test]
fn normalize_handle_falls_back_to_user_id() {
    assert_eq!(normalize_handle(None, UserId::new(7)), "User_7");
    assert_eq!(normalize_handle(Some(""), UserId::new(7)), "User_7");
}

#[test]
fn profile_handle_uses_username_when_present() {
    let mut profile = UserProfile::bare(UserId::new(42));
    assert_eq!(profile.handle(), "User_42");
    profile.username = Some("bob".to_string());
    assert_eq!(profile.handle(), "@bob");
}

#[test]
fn role_ranks_are_strictly_ordered() {
    assert!(GlobalRole::Driver.rank() < GlobalRole::Dispatcher.rank());
    assert!(GlobalRole::Dispatcher.rank() < GlobalRole::OpsManager.rank());
}

#[test]
fn role_labels_round_trip() {
    for role in [GlobalRole::Driver, GlobalRole::Dispatcher, GlobalRole::OpsManager] {
        assert_eq!(GlobalRole::parse(role.as_str()), Some(role));
    }
    assert_eq!(GlobalRole::parse("Admin"), None);
}
