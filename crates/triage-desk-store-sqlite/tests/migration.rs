// crates/triage-desk-store-sqlite/tests/migration.rs
// ============================================================================
// Module: Schema Migration Tests
// Description: Legacy tier-schema rebuild and default-department seeding.
// Purpose: Validate that tier-based databases open cleanly in the department
//          model with statuses, claims, and participants rewritten.
// ============================================================================

//! ## Overview
//! Builds a legacy tier-based database by hand (single-owner tier columns,
//! tiered participant rows, no schema version), opens the store against it,
//! and checks the rebuilt rows: status mapping, reconstructed active claims,
//! collapsed department-neutral participants, and seeded default departments
//! for companies without any.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::path::Path;

use rusqlite::Connection;
use rusqlite::params;
use tempfile::TempDir;
use triage_desk_core::CompanyId;
use triage_desk_core::GroupId;
use triage_desk_core::IncidentId;
use triage_desk_core::IncidentStatus;
use triage_desk_core::ParticipantStatus;
use triage_desk_core::TriageStore;
use triage_desk_core::UserId;
use triage_desk_store_sqlite::SqliteStoreConfig;
use triage_desk_store_sqlite::SqliteTriageStore;

// ============================================================================
// SECTION: Legacy Fixture
// ============================================================================

/// Writes a tier-era database: no `store_meta`, single-owner claim columns,
/// tiered participant rows.
fn write_legacy_database(path: &Path) {
    let conn = Connection::open(path).expect("open raw");
    conn.execute_batch(
        "CREATE TABLE companies (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE TABLE incidents (
            id TEXT PRIMARY KEY,
            group_id INTEGER NOT NULL,
            company_id INTEGER,
            created_by_id INTEGER NOT NULL,
            created_by_handle TEXT NOT NULL,
            description TEXT NOT NULL,
            pinned_message_id INTEGER,
            status TEXT NOT NULL,
            tier INTEGER,
            claimed_by_t1_id INTEGER,
            claimed_by_t2_id INTEGER,
            pending_resolution_by_user_id INTEGER,
            resolution_summary TEXT,
            t_created TEXT NOT NULL,
            t_escalated TEXT,
            t_first_claimed TEXT,
            t_last_claimed TEXT,
            t_resolution_requested TEXT,
            t_resolved TEXT
        );
        CREATE TABLE participants (
            incident_id TEXT NOT NULL,
            user_id INTEGER NOT NULL,
            tier INTEGER NOT NULL,
            first_claimed_at TEXT NOT NULL,
            last_claimed_at TEXT NOT NULL,
            total_active_seconds INTEGER NOT NULL DEFAULT 0,
            join_count INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL
        );",
    )
    .expect("legacy schema");

    conn.execute(
        "INSERT INTO companies (id, name, created_at, updated_at) VALUES (1, 'Acme Logistics', \
         '2024-06-01 09:00:00', '2024-06-01 09:00:00')",
        params![],
    )
    .expect("company row");

    // Unclaimed ticket, never escalated.
    conn.execute(
        "INSERT INTO incidents (id, group_id, company_id, created_by_id, created_by_handle, \
         description, status, t_created) VALUES ('TKT-2024-0007', -100, 1, 10, '@reporter', \
         'Trailer door jammed', 'Unclaimed', '2024-06-02 10:00:00')",
        params![],
    )
    .expect("unclaimed row");
    // Tier-1 claimed ticket with an owner.
    conn.execute(
        "INSERT INTO incidents (id, group_id, company_id, created_by_id, created_by_handle, \
         description, status, claimed_by_t1_id, t_created, t_first_claimed, t_last_claimed) \
         VALUES ('0008', -100, 1, 10, '@reporter', 'Reefer temp alarm', 'Claimed_T1', 20, \
         '2024-06-02 11:00:00', '2024-06-02 11:05:00', '2024-06-02 11:05:00')",
        params![],
    )
    .expect("t1 row");
    // Escalated, waiting for tier 2.
    conn.execute(
        "INSERT INTO incidents (id, group_id, company_id, created_by_id, created_by_handle, \
         description, status, t_created, t_escalated) VALUES ('0009', -100, 1, 11, '@driver2', \
         'Dispatch radio down', 'Escalated_Unclaimed_T2', '2024-06-02 12:00:00', '2024-06-02 \
         12:30:00')",
        params![],
    )
    .expect("escalated row");
    // Tier-2 claimed ticket.
    conn.execute(
        "INSERT INTO incidents (id, group_id, company_id, created_by_id, created_by_handle, \
         description, status, claimed_by_t2_id, t_created, t_escalated) VALUES ('0010', -100, 1, \
         12, '@driver3', 'Yard gate sensor stuck', 'Claimed_T2', 30, '2024-06-02 13:00:00', \
         '2024-06-02 13:10:00')",
        params![],
    )
    .expect("t2 row");
    // Resolved history survives untouched.
    conn.execute(
        "INSERT INTO incidents (id, group_id, company_id, created_by_id, created_by_handle, \
         description, status, resolution_summary, t_created, t_resolved) VALUES ('0006', -100, \
         1, 10, '@reporter', 'Flat tire on unit 3', 'Resolved', 'Swapped tire', '2024-06-01 \
         15:00:00', '2024-06-01 16:00:00')",
        params![],
    )
    .expect("resolved row");

    // Tiered participant rows for the T1 owner across both tiers.
    conn.execute(
        "INSERT INTO participants (incident_id, user_id, tier, first_claimed_at, \
         last_claimed_at, total_active_seconds, join_count, status) VALUES ('0008', 20, 1, \
         '2024-06-02 11:05:00', '2024-06-02 11:05:00', 120, 1, 'active')",
        params![],
    )
    .expect("participant t1");
    conn.execute(
        "INSERT INTO participants (incident_id, user_id, tier, first_claimed_at, \
         last_claimed_at, total_active_seconds, join_count, status) VALUES ('0008', 20, 2, \
         '2024-06-02 11:30:00', '2024-06-02 11:45:00', 300, 1, 'active')",
        params![],
    )
    .expect("participant t2");
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn tier_schema_rebuilds_into_department_model() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("legacy.db");
    write_legacy_database(&path);

    let store = SqliteTriageStore::new(SqliteStoreConfig::for_path(&path)).expect("migrated open");

    let unclaimed = store
        .incident(&IncidentId::new("TKT-2024-0007"))
        .expect("query")
        .expect("legacy id kept");
    assert_eq!(unclaimed.status, IncidentStatus::AwaitingClaim);
    assert_eq!(unclaimed.department_id, None);
    // Naive legacy timestamps read back as UTC.
    assert_eq!(
        unclaimed.t_department_assigned.expect("assigned anchor").to_storage(),
        "2024-06-02T10:00:00+00:00"
    );

    let t1 = store.incident(&IncidentId::new("0008")).expect("query").expect("t1 row");
    assert_eq!(t1.status, IncidentStatus::InProgress);
    let claims = store.active_claims(&IncidentId::new("0008")).expect("claims");
    assert_eq!(claims.len(), 1);
    assert_eq!(claims[0].user_id, UserId::new(20));

    let escalated = store.incident(&IncidentId::new("0009")).expect("query").expect("escalated");
    assert_eq!(escalated.status, IncidentStatus::AwaitingClaim);
    assert_eq!(
        escalated.t_department_assigned.expect("anchor").to_storage(),
        "2024-06-02T12:30:00+00:00"
    );

    let t2 = store.incident(&IncidentId::new("0010")).expect("query").expect("t2 row");
    assert_eq!(t2.status, IncidentStatus::InProgress);
    let claims = store.active_claims(&IncidentId::new("0010")).expect("claims");
    assert_eq!(claims.len(), 1);
    assert_eq!(claims[0].user_id, UserId::new(30));

    let resolved = store.incident(&IncidentId::new("0006")).expect("query").expect("resolved");
    assert_eq!(resolved.status, IncidentStatus::Resolved);
    assert_eq!(resolved.resolution_summary.as_deref(), Some("Swapped tire"));
}

#[test]
fn tiered_participants_collapse_to_neutral_rows() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("legacy.db");
    write_legacy_database(&path);

    let store = SqliteTriageStore::new(SqliteStoreConfig::for_path(&path)).expect("migrated open");
    let participants = store.participants(&IncidentId::new("0008")).expect("participants");
    assert_eq!(participants.len(), 1);
    let rollup = &participants[0];
    assert_eq!(rollup.user_id, UserId::new(20));
    assert_eq!(rollup.total_active_seconds, 420);
    assert_eq!(rollup.join_count, 2);
    assert_eq!(rollup.status, ParticipantStatus::Active);
    assert_eq!(rollup.first_claimed_at.to_storage(), "2024-06-02T11:05:00+00:00");
    assert_eq!(rollup.last_claimed_at.to_storage(), "2024-06-02T11:45:00+00:00");
}

#[test]
fn companies_without_departments_get_defaults_seeded() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("legacy.db");
    write_legacy_database(&path);

    let store = SqliteTriageStore::new(SqliteStoreConfig::for_path(&path)).expect("migrated open");
    let departments = store.company_departments(CompanyId::new(1)).expect("departments");
    let names: Vec<&str> =
        departments.iter().map(|department| department.name.as_str()).collect();
    assert_eq!(names, ["Dispatchers", "Operations"]);
}

#[test]
fn minting_continues_after_legacy_ids() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("legacy.db");
    write_legacy_database(&path);

    let store = SqliteTriageStore::new(SqliteStoreConfig::for_path(&path)).expect("migrated open");
    let company = CompanyId::new(1);
    store.attach_group_to_company(GroupId::new(-100), "Acme Fleet Ops", company).expect("attach");
    let id = store
        .create_incident(GroupId::new(-100), UserId::new(10), "@reporter", "Another issue here", None)
        .expect("create");
    // Max legacy suffix is 10 ('0010'); TKT-2024-0007's suffix is 7.
    assert_eq!(id.as_str(), "0011");
}

#[test]
fn reopening_a_migrated_store_is_idempotent() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("legacy.db");
    write_legacy_database(&path);

    {
        let _store =
            SqliteTriageStore::new(SqliteStoreConfig::for_path(&path)).expect("first open");
    }
    let store = SqliteTriageStore::new(SqliteStoreConfig::for_path(&path)).expect("second open");
    let departments = store.company_departments(CompanyId::new(1)).expect("departments");
    assert_eq!(departments.len(), 2);
    let t1 = store.incident(&IncidentId::new("0008")).expect("query").expect("t1 row");
    assert_eq!(t1.status, IncidentStatus::InProgress);
}
