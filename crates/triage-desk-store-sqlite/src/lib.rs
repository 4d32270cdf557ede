// crates/triage-desk-store-sqlite/src/lib.rs
// ============================================================================
// Module: Triage Desk SQLite Store
// Description: Durable TriageStore implementation backed by SQLite WAL.
// Purpose: Persist incidents, claims, rollups, sessions, events, and the
//          directory with single-writer serialization.
// Dependencies: rusqlite, serde, serde_json, thiserror, triage-desk-core
// ============================================================================

//! ## Overview
//! SQLite-backed implementation of the [`triage_desk_core::TriageStore`]
//! contract. Every lifecycle mutation runs in one transaction behind a
//! process-wide writer mutex; reads go through a round-robin pool of
//! read-only WAL connections. Legacy tier-based databases are migrated into
//! the department schema on open.

mod store;

pub use store::SqliteJournalMode;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteSyncMode;
pub use store::SqliteTriageStore;
