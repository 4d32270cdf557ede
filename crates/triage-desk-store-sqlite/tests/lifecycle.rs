// crates/triage-desk-store-sqlite/tests/lifecycle.rs
// ============================================================================
// Module: Lifecycle Store Tests
// Description: End-to-end lifecycle scenarios against the SQLite store.
// Purpose: Validate transitions, claim bookkeeping, the participant ledger,
//          the event log, and the commit-boundary invariants.
// ============================================================================

//! ## Overview
//! Drives the full incident lifecycle through the store: happy path,
//! co-claims, transfers, timeouts, permission failures, and the
//! double-resolve race. Each scenario checks the claim and participant
//! invariants at commit boundaries and replays the event log against the
//! state grammar.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::sync::Arc;
use std::thread;

use tempfile::TempDir;
use triage_desk_core::Clock;
use triage_desk_core::CompanyId;
use triage_desk_core::DepartmentId;
use triage_desk_core::EventKind;
use triage_desk_core::GroupId;
use triage_desk_core::Incident;
use triage_desk_core::IncidentId;
use triage_desk_core::IncidentStatus;
use triage_desk_core::LifecycleError;
use triage_desk_core::ManualClock;
use triage_desk_core::MessageId;
use triage_desk_core::ParticipantStatus;
use triage_desk_core::SessionStatus;
use triage_desk_core::Timestamp;
use triage_desk_core::TriageStore;
use triage_desk_core::UserId;
use triage_desk_core::UserProfile;
use triage_desk_core::transitions;
use triage_desk_store_sqlite::SqliteStoreConfig;
use triage_desk_store_sqlite::SqliteTriageStore;

// ============================================================================
// SECTION: Fixture
// ============================================================================

/// Group used by every scenario.
const GROUP: GroupId = GroupId::new(-100_200_300);
/// Reporter.
const REPORTER: UserId = UserId::new(10);
/// Maintenance responder.
const ALICE: UserId = UserId::new(20);
/// Second maintenance responder.
const BOB: UserId = UserId::new(21);
/// Dispatch responder.
const CAROL: UserId = UserId::new(30);
/// User outside every department.
const OUTSIDER: UserId = UserId::new(99);

/// One wired store with a company, two departments, and rosters.
struct Fixture {
    /// Keeps the database directory alive for the test.
    _dir: TempDir,
    /// Store under test.
    store: SqliteTriageStore,
    /// Deterministic clock shared with the store.
    clock: Arc<ManualClock>,
    /// Company id.
    company: CompanyId,
    /// Maintenance department.
    maintenance: DepartmentId,
    /// Dispatch department.
    dispatch: DepartmentId,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().expect("tempdir");
    let clock = Arc::new(ManualClock::new(
        Timestamp::parse("2026-03-01T08:00:00+00:00").expect("start"),
    ));
    let store = SqliteTriageStore::with_clock(
        SqliteStoreConfig::for_path(dir.path().join("triage.db")),
        Arc::<ManualClock>::clone(&clock) as Arc<dyn Clock>,
    )
    .expect("store init");

    let company = store.create_company("Acme Logistics").expect("company");
    let maintenance = store.create_department(company, "Maintenance", false).expect("dept");
    let dispatch = store.create_department(company, "Dispatch", false).expect("dept");
    store.attach_group_to_company(GROUP, "Acme Fleet Ops", company).expect("group");
    for (user, username) in [
        (REPORTER, "reporter"),
        (ALICE, "alice"),
        (BOB, "bob"),
        (CAROL, "carol"),
        (OUTSIDER, "mallory"),
    ] {
        let mut profile = UserProfile::bare(user);
        profile.username = Some(username.to_string());
        store.track_user(&profile, Some(GROUP), None).expect("track");
    }
    store.add_department_member(maintenance, ALICE).expect("member");
    store.add_department_member(maintenance, BOB).expect("member");
    store.add_department_member(dispatch, CAROL).expect("member");

    Fixture {
        _dir: dir,
        store,
        clock,
        company,
        maintenance,
        dispatch,
    }
}

impl Fixture {
    /// Creates an incident and routes it to maintenance.
    fn routed_incident(&self) -> IncidentId {
        let id = self
            .store
            .create_incident(
                GROUP,
                REPORTER,
                "@reporter",
                "Brake light out on unit 12",
                Some(MessageId::new(501)),
            )
            .expect("create");
        self.store.set_pinned_message(&id, MessageId::new(777)).expect("pin record");
        self.store.assign_department(&id, self.maintenance, REPORTER).expect("assign");
        id
    }

    /// Reads the incident snapshot.
    fn incident(&self, id: &IncidentId) -> Incident {
        self.store.incident(id).expect("query").expect("exists")
    }

    /// Checks the claim-count invariants at a commit boundary.
    fn assert_claim_invariants(&self, id: &IncidentId) {
        let incident = self.incident(id);
        let active = self.store.active_claims(id).expect("claims").len();
        match incident.status {
            IncidentStatus::InProgress => assert!(active >= 1),
            IncidentStatus::AwaitingSummary => {
                let pending = incident.pending_resolution_by_user_id.expect("pending user");
                let claims = self.store.active_claims(id).expect("claims");
                assert!(claims.iter().any(|claim| claim.user_id == pending));
            }
            IncidentStatus::AwaitingDepartment
            | IncidentStatus::AwaitingClaim
            | IncidentStatus::Resolved
            | IncidentStatus::Closed => assert_eq!(active, 0),
        }
        if incident.status.is_terminal() {
            for participant in self.store.participants(id).expect("participants") {
                assert!(participant.status.is_terminal());
                assert!(participant.active_since.is_none());
            }
        }
    }

    /// Replays the event log against the state grammar.
    fn assert_event_grammar(&self, id: &IncidentId) {
        let kinds: Vec<EventKind> =
            self.store.events(id).expect("events").iter().map(|event| event.kind).collect();
        assert!(transitions::event_sequence_is_valid(&kinds), "invalid sequence: {kinds:?}");
    }
}

// ============================================================================
// SECTION: Happy Path
// ============================================================================

#[test]
fn happy_path_create_route_claim_resolve() {
    let fx = fixture();
    let id = fx.routed_incident();
    assert_eq!(id.as_str(), "0001");

    let incident = fx.incident(&id);
    assert_eq!(incident.status, IncidentStatus::AwaitingClaim);
    assert_eq!(incident.department_id, Some(fx.maintenance));
    assert!(incident.t_department_assigned.is_some());

    fx.clock.advance_seconds(60);
    fx.store.claim(&id, ALICE).expect("claim");
    let incident = fx.incident(&id);
    assert_eq!(incident.status, IncidentStatus::InProgress);
    assert_eq!(incident.t_first_claimed, incident.t_last_claimed);
    fx.assert_claim_invariants(&id);

    fx.clock.advance_seconds(300);
    fx.store.request_resolution(&id, ALICE).expect("request");
    let incident = fx.incident(&id);
    assert_eq!(incident.status, IncidentStatus::AwaitingSummary);
    assert_eq!(incident.pending_resolution_by_user_id, Some(ALICE));
    fx.assert_claim_invariants(&id);

    fx.clock.advance_seconds(120);
    fx.store.resolve(&id, ALICE, "Bulb replaced").expect("resolve");
    let incident = fx.incident(&id);
    assert_eq!(incident.status, IncidentStatus::Resolved);
    assert_eq!(incident.resolved_by_user_id, Some(ALICE));
    assert_eq!(incident.resolution_summary.as_deref(), Some("Bulb replaced"));
    assert!(incident.t_resolved.is_some());
    fx.assert_claim_invariants(&id);

    // Timestamp ordering across the lifecycle.
    assert!(incident.t_department_assigned <= incident.t_first_claimed);
    assert!(incident.t_first_claimed <= incident.t_last_claimed);
    assert!(incident.t_last_claimed <= incident.t_resolution_requested);
    assert!(incident.t_resolution_requested <= incident.t_resolved);

    // Resolver accrued the full span from claim to resolve.
    let participants = fx.store.participants(&id).expect("participants");
    assert_eq!(participants.len(), 1);
    assert_eq!(participants[0].status, ParticipantStatus::ResolvedSelf);
    assert_eq!(participants[0].total_active_seconds, 420);
    assert!(participants[0].resolved_at.is_some());

    let kinds: Vec<EventKind> =
        fx.store.events(&id).expect("events").iter().map(|event| event.kind).collect();
    assert_eq!(
        kinds,
        [
            EventKind::Create,
            EventKind::DepartmentAssigned,
            EventKind::Claim,
            EventKind::ResolutionRequested,
            EventKind::Resolve,
        ]
    );
    fx.assert_event_grammar(&id);

    let sessions = fx.store.department_sessions(&id).expect("sessions");
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].status, SessionStatus::Resolved);
    assert!(sessions[0].claimed_at.is_some());
    assert!(sessions[0].released_at.is_some());
}

#[test]
fn incident_ids_are_dense_and_monotonic() {
    let fx = fixture();
    let first = fx.routed_incident();
    let second = fx
        .store
        .create_incident(GROUP, REPORTER, "@reporter", "Second problem report", None)
        .expect("create");
    assert_eq!(first.as_str(), "0001");
    assert_eq!(second.as_str(), "0002");
}

#[test]
fn description_length_is_validated() {
    let fx = fixture();
    let err = fx
        .store
        .create_incident(GROUP, REPORTER, "@reporter", "hi", None)
        .expect_err("too short");
    assert_eq!(err.kind(), "validation_error");
    let err = fx
        .store
        .create_incident(GROUP, REPORTER, "@reporter", &"x".repeat(3001), None)
        .expect_err("too long");
    assert_eq!(err.kind(), "validation_error");
}

// ============================================================================
// SECTION: Co-Claim and Release
// ============================================================================

#[test]
fn co_claim_and_release_track_status_and_ledger() {
    let fx = fixture();
    let id = fx.routed_incident();

    fx.store.claim(&id, ALICE).expect("alice claims");
    fx.clock.advance_seconds(30);
    fx.store.claim(&id, BOB).expect("bob claims");
    assert_eq!(fx.store.active_claims(&id).expect("claims").len(), 2);
    assert_eq!(fx.incident(&id).status, IncidentStatus::InProgress);

    // Oldest active claim renders first.
    let handles = fx.store.active_claim_handles(&id, None).expect("handles");
    assert_eq!(handles, ["@alice", "@bob"]);

    fx.clock.advance_seconds(60);
    fx.store.release(&id, BOB).expect("bob releases");
    assert_eq!(fx.incident(&id).status, IncidentStatus::InProgress);
    assert_eq!(fx.store.active_claims(&id).expect("claims").len(), 1);
    fx.assert_claim_invariants(&id);

    fx.clock.advance_seconds(60);
    fx.store.release(&id, ALICE).expect("alice releases");
    assert_eq!(fx.incident(&id).status, IncidentStatus::AwaitingClaim);
    assert_eq!(fx.store.active_claims(&id).expect("claims").len(), 0);
    fx.assert_claim_invariants(&id);

    let participants = fx.store.participants(&id).expect("participants");
    let bob = participants.iter().find(|p| p.user_id == BOB).expect("bob rollup");
    assert_eq!(bob.status, ParticipantStatus::Released);
    assert_eq!(bob.total_active_seconds, 60);
    let alice = participants.iter().find(|p| p.user_id == ALICE).expect("alice rollup");
    assert_eq!(alice.status, ParticipantStatus::Released);
    assert_eq!(alice.total_active_seconds, 150);
    fx.assert_event_grammar(&id);
}

#[test]
fn double_claim_is_rejected_with_single_event() {
    let fx = fixture();
    let id = fx.routed_incident();

    fx.store.claim(&id, ALICE).expect("first claim");
    let err = fx.store.claim(&id, ALICE).expect_err("double claim");
    assert_eq!(err.kind(), "state_conflict");

    assert_eq!(fx.store.active_claims(&id).expect("claims").len(), 1);
    let claim_events = fx
        .store
        .events(&id)
        .expect("events")
        .iter()
        .filter(|event| event.kind == EventKind::Claim)
        .count();
    assert_eq!(claim_events, 1);

    let participants = fx.store.participants(&id).expect("participants");
    assert_eq!(participants.len(), 1);
    assert_eq!(participants[0].join_count, 1);
}

#[test]
fn rejoin_after_release_increments_join_count() {
    let fx = fixture();
    let id = fx.routed_incident();

    fx.store.claim(&id, ALICE).expect("claim");
    fx.clock.advance_seconds(100);
    fx.store.release(&id, ALICE).expect("release");
    fx.clock.advance_seconds(50);
    fx.store.claim(&id, ALICE).expect("rejoin");
    fx.clock.advance_seconds(25);
    fx.store.release(&id, ALICE).expect("release again");

    let participants = fx.store.participants(&id).expect("participants");
    assert_eq!(participants.len(), 1);
    assert_eq!(participants[0].join_count, 2);
    assert_eq!(participants[0].total_active_seconds, 125);
    assert!(participants[0].active_since.is_none());
}

// ============================================================================
// SECTION: Authorization Failures
// ============================================================================

#[test]
fn unauthorized_claim_leaves_no_trace() {
    let fx = fixture();
    let id = fx.routed_incident();
    let events_before = fx.store.events(&id).expect("events").len();

    let err = fx.store.claim(&id, OUTSIDER).expect_err("outsider claim");
    assert_eq!(err.kind(), "permission_denied");

    assert_eq!(fx.store.events(&id).expect("events").len(), events_before);
    assert_eq!(fx.store.active_claims(&id).expect("claims").len(), 0);
    assert_eq!(fx.incident(&id).status, IncidentStatus::AwaitingClaim);
}

#[test]
fn cross_department_member_cannot_claim() {
    let fx = fixture();
    let id = fx.routed_incident();
    let err = fx.store.claim(&id, CAROL).expect_err("wrong department");
    assert_eq!(err.kind(), "permission_denied");
}

#[test]
fn non_member_cannot_transfer() {
    let fx = fixture();
    let id = fx.routed_incident();
    let err = fx
        .store
        .assign_department(&id, fx.dispatch, OUTSIDER)
        .expect_err("outsider transfer");
    assert_eq!(err.kind(), "permission_denied");
    assert_eq!(fx.incident(&id).department_id, Some(fx.maintenance));
}

#[test]
fn cross_company_department_is_rejected() {
    let fx = fixture();
    let id = fx.routed_incident();
    let other_company = fx.store.create_company("Other Co").expect("company");
    let foreign = fx.store.create_department(other_company, "Maintenance", false).expect("dept");
    let err = fx
        .store
        .assign_department(&id, foreign, ALICE)
        .expect_err("foreign department");
    assert_eq!(err.kind(), "validation_error");
    assert_eq!(fx.company, fx.incident(&id).company_id);
}

// ============================================================================
// SECTION: Transfer
// ============================================================================

#[test]
fn transfer_finalizes_claims_sessions_and_reenters_awaiting_claim() {
    let fx = fixture();
    let id = fx.routed_incident();
    fx.store.claim(&id, ALICE).expect("claim");
    fx.clock.advance_seconds(90);

    fx.store.assign_department(&id, fx.dispatch, ALICE).expect("transfer");

    let incident = fx.incident(&id);
    assert_eq!(incident.status, IncidentStatus::AwaitingClaim);
    assert_eq!(incident.department_id, Some(fx.dispatch));
    assert_eq!(fx.store.active_claims(&id).expect("claims").len(), 0);

    let participants = fx.store.participants(&id).expect("participants");
    let alice = participants.iter().find(|p| p.user_id == ALICE).expect("rollup");
    assert_eq!(alice.status, ParticipantStatus::Transferred);
    assert_eq!(alice.total_active_seconds, 90);
    assert!(alice.resolved_at.is_none());

    let sessions = fx.store.department_sessions(&id).expect("sessions");
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[0].department_id, fx.maintenance);
    assert_eq!(sessions[0].status, SessionStatus::Transferred);
    assert!(sessions[0].released_at.is_some());
    assert_eq!(sessions[1].department_id, fx.dispatch);
    assert_eq!(sessions[1].status, SessionStatus::Active);

    let events = fx.store.events(&id).expect("events");
    let assigned = events
        .iter()
        .filter(|event| event.kind == EventKind::DepartmentAssigned)
        .next_back()
        .expect("assigned event");
    assert_eq!(assigned.metadata["department_id"], fx.dispatch.get());
    assert_eq!(assigned.metadata["previous_department_id"], fx.maintenance.get());
    assert_eq!(assigned.metadata["status_before"], "In_Progress");
    fx.assert_event_grammar(&id);

    // The new department's roster can claim now.
    fx.store.claim(&id, CAROL).expect("carol claims");
    fx.assert_claim_invariants(&id);
}

// ============================================================================
// SECTION: Resolution and Auto-Close
// ============================================================================

#[test]
fn co_claimants_keep_accruing_until_resolve() {
    let fx = fixture();
    let id = fx.routed_incident();
    fx.store.claim(&id, ALICE).expect("alice");
    fx.store.claim(&id, BOB).expect("bob");

    fx.clock.advance_seconds(100);
    fx.store.request_resolution(&id, ALICE).expect("request");
    // Bob stays active through the summary wait.
    assert_eq!(fx.store.active_claims(&id).expect("claims").len(), 2);

    fx.clock.advance_seconds(200);
    fx.store.resolve(&id, ALICE, "Fixed").expect("resolve");

    let participants = fx.store.participants(&id).expect("participants");
    let alice = participants.iter().find(|p| p.user_id == ALICE).expect("alice");
    let bob = participants.iter().find(|p| p.user_id == BOB).expect("bob");
    assert_eq!(alice.status, ParticipantStatus::ResolvedSelf);
    assert_eq!(bob.status, ParticipantStatus::ResolvedOther);
    assert_eq!(alice.total_active_seconds, 300);
    assert_eq!(bob.total_active_seconds, 300);
    fx.assert_claim_invariants(&id);
}

#[test]
fn resolve_requires_pending_user_and_summary() {
    let fx = fixture();
    let id = fx.routed_incident();
    fx.store.claim(&id, ALICE).expect("claim");
    fx.store.claim(&id, BOB).expect("claim");
    fx.store.request_resolution(&id, ALICE).expect("request");

    let err = fx.store.resolve(&id, BOB, "Not mine").expect_err("wrong resolver");
    assert_eq!(err.kind(), "permission_denied");
    let err = fx.store.resolve(&id, ALICE, "   ").expect_err("empty summary");
    assert_eq!(err.kind(), "validation_error");
    fx.store.resolve(&id, ALICE, "Done").expect("resolve");
}

#[test]
fn auto_close_mirrors_resolve_with_closed_statuses() {
    let fx = fixture();
    let id = fx.routed_incident();
    fx.store.claim(&id, ALICE).expect("claim");
    fx.clock.advance_seconds(45);
    fx.store.request_resolution(&id, ALICE).expect("request");
    fx.clock.advance_seconds(1800);

    fx.store
        .auto_close(&id, "Auto-closed after waiting 30 minutes.", "summary_timeout")
        .expect("auto close");

    let incident = fx.incident(&id);
    assert_eq!(incident.status, IncidentStatus::Closed);
    assert_eq!(incident.resolved_by_user_id, None);
    assert!(incident.resolution_summary.as_deref().unwrap().contains("Auto-closed"));

    let participants = fx.store.participants(&id).expect("participants");
    assert_eq!(participants[0].status, ParticipantStatus::Closed);
    assert_eq!(participants[0].total_active_seconds, 1845);

    let sessions = fx.store.department_sessions(&id).expect("sessions");
    assert_eq!(sessions[0].status, SessionStatus::Closed);

    let events = fx.store.events(&id).expect("events");
    let closed = events.last().expect("auto_closed event");
    assert_eq!(closed.kind, EventKind::AutoClosed);
    assert_eq!(closed.actor_user_id, None);
    assert_eq!(closed.metadata["reason"], "summary_timeout");
    assert_eq!(closed.metadata["pending_user_id"], ALICE.get());
    fx.assert_claim_invariants(&id);
    fx.assert_event_grammar(&id);
}

#[test]
fn auto_close_outside_awaiting_summary_conflicts() {
    let fx = fixture();
    let id = fx.routed_incident();
    let err = fx.store.auto_close(&id, "summary", "summary_timeout").expect_err("no summary wait");
    assert_eq!(err.kind(), "state_conflict");
}

// ============================================================================
// SECTION: Concurrency
// ============================================================================

#[test]
fn double_resolve_race_commits_exactly_once() {
    let fx = fixture();
    let id = fx.routed_incident();
    fx.store.claim(&id, ALICE).expect("claim");
    fx.store.request_resolution(&id, ALICE).expect("request");

    let store_a = fx.store.clone();
    let store_b = fx.store.clone();
    let id_a = id.clone();
    let id_b = id.clone();
    let handle_a = thread::spawn(move || store_a.resolve(&id_a, ALICE, "First summary"));
    let handle_b = thread::spawn(move || store_b.resolve(&id_b, ALICE, "Second summary"));
    let results = [handle_a.join().expect("join"), handle_b.join().expect("join")];

    let ok_count = results.iter().filter(|result| result.is_ok()).count();
    assert_eq!(ok_count, 1);
    let conflict = results
        .iter()
        .find_map(|result| result.as_ref().err())
        .expect("one loser");
    assert!(matches!(conflict, LifecycleError::StateConflict(_)));

    let resolve_events = fx
        .store
        .events(&id)
        .expect("events")
        .iter()
        .filter(|event| event.kind == EventKind::Resolve)
        .count();
    assert_eq!(resolve_events, 1);
    assert_eq!(fx.incident(&id).status, IncidentStatus::Resolved);
}

#[test]
fn concurrent_claims_from_distinct_users_both_land() {
    let fx = fixture();
    let id = fx.routed_incident();

    let store_a = fx.store.clone();
    let store_b = fx.store.clone();
    let id_a = id.clone();
    let id_b = id.clone();
    let handle_a = thread::spawn(move || store_a.claim(&id_a, ALICE));
    let handle_b = thread::spawn(move || store_b.claim(&id_b, BOB));
    handle_a.join().expect("join").expect("alice claim");
    handle_b.join().expect("join").expect("bob claim");

    assert_eq!(fx.store.active_claims(&id).expect("claims").len(), 2);
    assert_eq!(fx.incident(&id).status, IncidentStatus::InProgress);
    fx.assert_event_grammar(&id);
}

// ============================================================================
// SECTION: Scheduler Queries
// ============================================================================

#[test]
fn sla_queries_filter_by_age() {
    let fx = fixture();
    let id = fx.routed_incident();

    assert!(fx.store.unclaimed_incidents(10).expect("query").is_empty());
    fx.clock.advance_seconds(11 * 60);
    let due = fx.store.unclaimed_incidents(10).expect("query");
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].incident_id, id);

    fx.store.claim(&id, ALICE).expect("claim");
    assert!(fx.store.unclaimed_incidents(10).expect("query").is_empty());

    fx.store.request_resolution(&id, ALICE).expect("request");
    assert!(fx.store.awaiting_summary_incidents(30).expect("query").is_empty());
    fx.clock.advance_seconds(31 * 60);
    let timed_out = fx.store.awaiting_summary_incidents(30).expect("query");
    assert_eq!(timed_out.len(), 1);
    assert_eq!(timed_out[0].incident_id, id);
}

#[test]
fn pinned_message_lookup_round_trips() {
    let fx = fixture();
    let id = fx.routed_incident();
    let found = fx
        .store
        .incident_by_pinned_message(GROUP, MessageId::new(777))
        .expect("query")
        .expect("found");
    assert_eq!(found.incident_id, id);
    assert!(
        fx.store
            .incident_by_pinned_message(GROUP, MessageId::new(778))
            .expect("query")
            .is_none()
    );
}

// ============================================================================
// SECTION: Directory and Notifications
// ============================================================================

#[test]
fn membership_reflects_group_activation() {
    let fx = fixture();
    let membership = fx.store.membership(GROUP).expect("query").expect("known group");
    assert!(membership.is_active);
    assert_eq!(membership.company.expect("company").name, "Acme Logistics");

    let pending_group = GroupId::new(-42);
    fx.store
        .record_pending_group(
            pending_group,
            "New Crew",
            Some(MessageId::new(5)),
            Some(REPORTER),
            Some("@reporter"),
            Some("Acme Logistics"),
        )
        .expect("record");
    let membership = fx.store.membership(pending_group).expect("query").expect("pending group");
    assert!(!membership.is_active);
    assert!(membership.company.is_none());
    assert_eq!(membership.group.requested_company_name.as_deref(), Some("Acme Logistics"));
}

#[test]
fn notification_queue_round_trips() {
    let fx = fixture();
    let group = GroupId::new(-42);
    let kind = triage_desk_core::NotificationKind::GroupPendingActivation;
    assert!(!fx.store.notification_exists(group, kind).expect("exists"));

    fx.store
        .enqueue_notification(group, kind, &serde_json::json!({ "group_name": "New Crew" }))
        .expect("enqueue");
    assert!(fx.store.notification_exists(group, kind).expect("exists"));

    let pending = fx.store.pending_notifications().expect("pending");
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].payload["group_name"], "New Crew");

    fx.store.mark_notification_sent(pending[0].id).expect("sent");
    assert!(fx.store.pending_notifications().expect("pending").is_empty());
    // The one-shot guard still sees the sent row.
    assert!(fx.store.notification_exists(group, kind).expect("exists"));
}

#[test]
fn track_user_upgrades_role_monotonically() {
    let fx = fixture();
    let mut profile = UserProfile::bare(UserId::new(555));
    profile.username = Some("dana".to_string());
    fx.store
        .track_user(&profile, Some(GROUP), Some(triage_desk_core::GlobalRole::OpsManager))
        .expect("track");
    fx.store
        .track_user(&profile, Some(GROUP), Some(triage_desk_core::GlobalRole::Driver))
        .expect("track again");
    let user = fx.store.user(UserId::new(555)).expect("query").expect("user");
    assert_eq!(user.global_role, Some(triage_desk_core::GlobalRole::OpsManager));
    assert_eq!(user.handle, "@dana");
}
