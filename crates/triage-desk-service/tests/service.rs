// crates/triage-desk-service/tests/service.rs
// ============================================================================
// Module: Service Integration Tests
// Description: Router and scheduler flows over the SQLite store.
// Purpose: Validate the chat surface end-to-end with a recording adapter.
// ============================================================================

//! ## Overview
//! Drives the router with decoded chat events over a real SQLite store and a
//! recording adapter: ticket creation with pinning, department selection and
//! pings, claims, the resolve round-trip through the summary reply channel,
//! capability rejections, the pending-group flow, and the scheduler's nudge
//! and auto-close ticks.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use tempfile::TempDir;
use triage_desk_config::TriageConfig;
use triage_desk_core::ButtonRows;
use triage_desk_core::CallbackId;
use triage_desk_core::ChatAdapter;
use triage_desk_core::ChatError;
use triage_desk_core::ChatEvent;
use triage_desk_core::Clock;
use triage_desk_core::DepartmentId;
use triage_desk_core::EventKind;
use triage_desk_core::GroupId;
use triage_desk_core::IncidentId;
use triage_desk_core::IncidentStatus;
use triage_desk_core::InboundMessage;
use triage_desk_core::ManualClock;
use triage_desk_core::MessageId;
use triage_desk_core::NotificationKind;
use triage_desk_core::Timestamp;
use triage_desk_core::TriageStore;
use triage_desk_core::UserId;
use triage_desk_core::UserProfile;
use triage_desk_service::router::Router;
use triage_desk_service::scheduler::Scheduler;
use triage_desk_store_sqlite::SqliteStoreConfig;
use triage_desk_store_sqlite::SqliteTriageStore;

// ============================================================================
// SECTION: Recording Adapter
// ============================================================================

/// One captured outbound chat effect.
#[derive(Debug, Clone)]
enum ChatCall {
    /// A sent message with its minted id.
    Send {
        #[allow(dead_code, reason = "recorded for completeness; assertions match with ..")]
        group: GroupId,
        text: String,
        reply_to: Option<MessageId>,
        has_buttons: bool,
        minted: MessageId,
    },
    /// An in-place edit.
    Edit {
        message: MessageId,
        text: String,
        has_buttons: bool,
    },
    /// A pin.
    Pin(MessageId),
    /// An unpin.
    Unpin(MessageId),
    /// A callback acknowledgement.
    Answer { text: String, alert: bool },
}

/// Adapter capturing every outbound call for assertions.
#[derive(Debug, Default)]
struct RecordingAdapter {
    calls: Mutex<Vec<ChatCall>>,
    next_id: AtomicI64,
}

impl RecordingAdapter {
    fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(1000),
        }
    }

    fn calls(&self) -> Vec<ChatCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    fn clear(&self) {
        self.calls.lock().expect("calls lock").clear();
    }

    fn sends(&self) -> Vec<(String, Option<MessageId>, MessageId)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ChatCall::Send {
                    text,
                    reply_to,
                    minted,
                    ..
                } => Some((text, reply_to, minted)),
                _ => None,
            })
            .collect()
    }

    fn last_answer(&self) -> Option<(String, bool)> {
        self.calls().into_iter().rev().find_map(|call| match call {
            ChatCall::Answer { text, alert } => Some((text, alert)),
            _ => None,
        })
    }

    fn last_edit(&self) -> Option<(MessageId, String, bool)> {
        self.calls().into_iter().rev().find_map(|call| match call {
            ChatCall::Edit {
                message,
                text,
                has_buttons,
            } => Some((message, text, has_buttons)),
            _ => None,
        })
    }
}

#[async_trait]
impl ChatAdapter for RecordingAdapter {
    async fn send(
        &self,
        group: GroupId,
        text: &str,
        reply_to: Option<MessageId>,
        buttons: Option<&ButtonRows>,
    ) -> Result<MessageId, ChatError> {
        let minted = MessageId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.calls.lock().expect("calls lock").push(ChatCall::Send {
            group,
            text: text.to_string(),
            reply_to,
            has_buttons: buttons.is_some(),
            minted,
        });
        Ok(minted)
    }

    async fn edit(
        &self,
        _group: GroupId,
        message: MessageId,
        text: &str,
        buttons: Option<&ButtonRows>,
    ) -> Result<(), ChatError> {
        self.calls.lock().expect("calls lock").push(ChatCall::Edit {
            message,
            text: text.to_string(),
            has_buttons: buttons.is_some(),
        });
        Ok(())
    }

    async fn pin(&self, _group: GroupId, message: MessageId) -> Result<(), ChatError> {
        self.calls.lock().expect("calls lock").push(ChatCall::Pin(message));
        Ok(())
    }

    async fn unpin(&self, _group: GroupId, message: MessageId) -> Result<(), ChatError> {
        self.calls.lock().expect("calls lock").push(ChatCall::Unpin(message));
        Ok(())
    }

    async fn answer_callback(
        &self,
        _callback: &CallbackId,
        text: &str,
        alert: bool,
    ) -> Result<(), ChatError> {
        self.calls.lock().expect("calls lock").push(ChatCall::Answer {
            text: text.to_string(),
            alert,
        });
        Ok(())
    }
}

// ============================================================================
// SECTION: Fixture
// ============================================================================

const GROUP: GroupId = GroupId::new(-100_500);
const BOT: UserId = UserId::new(7_777);
const REPORTER: UserId = UserId::new(10);
const ALICE: UserId = UserId::new(20);
const OUTSIDER: UserId = UserId::new(99);
const ADMIN: UserId = UserId::new(900);

struct Fixture {
    _dir: TempDir,
    store: Arc<SqliteTriageStore>,
    adapter: Arc<RecordingAdapter>,
    router: Router<SqliteTriageStore, RecordingAdapter>,
    clock: Arc<ManualClock>,
    config: Arc<TriageConfig>,
    maintenance: DepartmentId,
    dispatch: DepartmentId,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().expect("tempdir");
    let clock = Arc::new(ManualClock::new(
        Timestamp::parse("2026-03-01T08:00:00+00:00").expect("start"),
    ));
    let store = Arc::new(
        SqliteTriageStore::with_clock(
            SqliteStoreConfig::for_path(dir.path().join("triage.db")),
            Arc::<ManualClock>::clone(&clock) as Arc<dyn Clock>,
        )
        .expect("store init"),
    );
    let config = Arc::new(
        TriageConfig::from_lookup(|key| match key {
            "DATABASE_PATH" => Some("unused".to_string()),
            "PLATFORM_ADMIN_IDS" => Some("900".to_string()),
            "SLA_UNCLAIMED_NUDGE_MINUTES" => Some("10".to_string()),
            "SLA_SUMMARY_TIMEOUT_MINUTES" => Some("30".to_string()),
            _ => None,
        })
        .expect("config"),
    );

    let company = store.create_company("Acme Logistics").expect("company");
    let maintenance = store.create_department(company, "Maintenance", false).expect("dept");
    let dispatch = store.create_department(company, "Dispatch", false).expect("dept");
    store.attach_group_to_company(GROUP, "Acme Fleet Ops", company).expect("group");
    for (user, username) in [(REPORTER, "reporter"), (ALICE, "alice"), (OUTSIDER, "mallory")] {
        let mut profile = UserProfile::bare(user);
        profile.username = Some(username.to_string());
        store.track_user(&profile, Some(GROUP), None).expect("track");
    }
    store.add_department_member(maintenance, ALICE).expect("member");

    let adapter = Arc::new(RecordingAdapter::new());
    let router = Router::new(
        Arc::clone(&store),
        Arc::clone(&adapter),
        Arc::clone(&config),
        Some(BOT),
    );
    Fixture {
        _dir: dir,
        store,
        adapter,
        router,
        clock,
        config,
        maintenance,
        dispatch,
    }
}

fn profile(user: UserId, username: &str) -> UserProfile {
    let mut profile = UserProfile::bare(user);
    profile.username = Some(username.to_string());
    profile
}

fn callback(user: UserId, username: &str, data: &str, message_id: MessageId) -> ChatEvent {
    ChatEvent::Callback {
        chat: GROUP,
        user: profile(user, username),
        callback_id: CallbackId::new(format!("cb-{data}")),
        data: data.to_string(),
        message_id,
    }
}

impl Fixture {
    /// Runs `/new_issue` and returns (incident id, pinned message id).
    async fn open_ticket(&self) -> (IncidentId, MessageId) {
        self.router
            .handle_event(ChatEvent::Command {
                chat: GROUP,
                user: profile(REPORTER, "reporter"),
                message_id: MessageId::new(600),
                name: "new_issue".to_string(),
                args: Vec::new(),
                reply: Some(InboundMessage {
                    message_id: MessageId::new(501),
                    sender: Some(REPORTER),
                    text: Some("Brake light out on unit 12".to_string()),
                }),
            })
            .await;
        let calls = self.adapter.calls();
        let minted = calls
            .iter()
            .find_map(|call| match call {
                ChatCall::Send {
                    has_buttons: true,
                    minted,
                    ..
                } => Some(*minted),
                _ => None,
            })
            .expect("menu message");
        assert!(calls.iter().any(|call| matches!(call, ChatCall::Pin(id) if *id == minted)));
        let incident = self
            .store
            .incident_by_pinned_message(GROUP, minted)
            .expect("query")
            .expect("pinned lookup");
        self.adapter.clear();
        (incident.incident_id, minted)
    }

    /// Routes the ticket to maintenance via the reporter's button tap.
    async fn route_to_maintenance(&self, incident: &IncidentId, pinned: MessageId) {
        let data = format!("select_department:{incident}:{}", self.maintenance.get());
        self.router.handle_event(callback(REPORTER, "reporter", &data, pinned)).await;
        assert_eq!(
            self.store.incident(incident).expect("query").expect("row").status,
            IncidentStatus::AwaitingClaim
        );
        self.adapter.clear();
    }
}

// ============================================================================
// SECTION: Happy Path
// ============================================================================

#[tokio::test]
async fn new_issue_posts_menu_and_pins() {
    let fx = fixture();
    let (incident_id, pinned) = fx.open_ticket().await;
    assert_eq!(incident_id.as_str(), "0001");

    let incident = fx.store.incident(&incident_id).expect("query").expect("row");
    assert_eq!(incident.status, IncidentStatus::AwaitingDepartment);
    assert_eq!(incident.pinned_message_id, Some(pinned));
    assert_eq!(incident.source_message_id, Some(MessageId::new(501)));
}

#[tokio::test]
async fn select_department_edits_view_and_pings_roster() {
    let fx = fixture();
    let (incident_id, pinned) = fx.open_ticket().await;

    let data = format!("select_department:{incident_id}:{}", fx.maintenance.get());
    fx.router.handle_event(callback(REPORTER, "reporter", &data, pinned)).await;

    let (message, text, has_buttons) = fx.adapter.last_edit().expect("edited view");
    assert_eq!(message, pinned);
    assert!(text.contains("WAITING FOR DEPARTMENT"));
    assert!(has_buttons);
    assert_eq!(fx.adapter.last_answer(), Some(("Department selected".to_string(), false)));

    let pings = fx.adapter.sends();
    assert_eq!(pings.len(), 1);
    assert!(pings[0].0.contains("@alice"));
    assert_eq!(pings[0].1, Some(pinned));
}

#[tokio::test]
async fn full_resolution_round_trip() {
    let fx = fixture();
    let (incident_id, pinned) = fx.open_ticket().await;
    fx.route_to_maintenance(&incident_id, pinned).await;

    // Alice joins.
    fx.router
        .handle_event(callback(ALICE, "alice", &format!("claim:{incident_id}"), pinned))
        .await;
    assert_eq!(
        fx.store.incident(&incident_id).expect("query").expect("row").status,
        IncidentStatus::InProgress
    );
    let (_, text, _) = fx.adapter.last_edit().expect("claimed view");
    assert!(text.contains("@alice"));
    fx.adapter.clear();

    // Alice asks to resolve; the prompt carries the id.
    fx.router
        .handle_event(callback(ALICE, "alice", &format!("resolve:{incident_id}"), pinned))
        .await;
    let prompt = fx
        .adapter
        .sends()
        .into_iter()
        .map(|(text, _, _)| text)
        .find(|text| text.to_lowercase().contains("resolution summary"))
        .expect("summary prompt");
    assert!(prompt.contains(incident_id.as_str()));
    fx.adapter.clear();

    // Alice replies to the prompt with the summary.
    fx.router
        .handle_event(ChatEvent::Message {
            chat: GROUP,
            user: profile(ALICE, "alice"),
            message_id: MessageId::new(910),
            text: "Bulb replaced".to_string(),
            reply_to: Some(InboundMessage {
                message_id: MessageId::new(909),
                sender: Some(BOT),
                text: Some(prompt),
            }),
        })
        .await;

    let incident = fx.store.incident(&incident_id).expect("query").expect("row");
    assert_eq!(incident.status, IncidentStatus::Resolved);
    assert_eq!(incident.resolved_by_user_id, Some(ALICE));
    assert_eq!(incident.resolution_summary.as_deref(), Some("Bulb replaced"));

    let calls = fx.adapter.calls();
    assert!(calls.iter().any(|call| matches!(call, ChatCall::Unpin(id) if *id == pinned)));
    assert!(calls.iter().any(|call| matches!(
        call,
        ChatCall::Edit { message, text, .. } if *message == pinned && text.contains("RESOLVED")
    )));
    assert!(
        fx.adapter
            .sends()
            .iter()
            .any(|(text, _, _)| text.contains("has been marked as resolved"))
    );

    let kinds: Vec<EventKind> =
        fx.store.events(&incident_id).expect("events").iter().map(|event| event.kind).collect();
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
}

// ============================================================================
// SECTION: Capability Rejections
// ============================================================================

#[tokio::test]
async fn outsider_claim_is_alerted_without_effect() {
    let fx = fixture();
    let (incident_id, pinned) = fx.open_ticket().await;
    fx.route_to_maintenance(&incident_id, pinned).await;

    fx.router
        .handle_event(callback(OUTSIDER, "mallory", &format!("claim:{incident_id}"), pinned))
        .await;
    let (text, alert) = fx.adapter.last_answer().expect("alert");
    assert!(alert);
    assert_eq!(text, "You are not a member of this department.");
    assert_eq!(
        fx.store.incident(&incident_id).expect("query").expect("row").status,
        IncidentStatus::AwaitingClaim
    );
    assert!(fx.store.active_claims(&incident_id).expect("claims").is_empty());
}

#[tokio::test]
async fn non_reporter_cannot_pick_initial_department() {
    let fx = fixture();
    let (incident_id, pinned) = fx.open_ticket().await;
    let data = format!("select_department:{incident_id}:{}", fx.maintenance.get());
    fx.router.handle_event(callback(ALICE, "alice", &data, pinned)).await;
    let (text, alert) = fx.adapter.last_answer().expect("alert");
    assert!(alert);
    assert_eq!(text, "Only the reporter can choose the department.");
    assert_eq!(
        fx.store.incident(&incident_id).expect("query").expect("row").status,
        IncidentStatus::AwaitingDepartment
    );
}

#[tokio::test]
async fn malformed_callback_payload_is_alerted() {
    let fx = fixture();
    let (_, pinned) = fx.open_ticket().await;
    fx.router.handle_event(callback(REPORTER, "reporter", "escalate:0001", pinned)).await;
    let (text, alert) = fx.adapter.last_answer().expect("alert");
    assert!(alert);
    assert_eq!(text, "Invalid button data");
}

// ============================================================================
// SECTION: Transfer Menu
// ============================================================================

#[tokio::test]
async fn change_department_menu_and_restore_view() {
    let fx = fixture();
    let (incident_id, pinned) = fx.open_ticket().await;
    fx.route_to_maintenance(&incident_id, pinned).await;
    fx.router
        .handle_event(callback(ALICE, "alice", &format!("claim:{incident_id}"), pinned))
        .await;
    fx.adapter.clear();

    fx.router
        .handle_event(callback(
            ALICE,
            "alice",
            &format!("change_department:{incident_id}"),
            pinned,
        ))
        .await;
    let (_, text, has_buttons) = fx.adapter.last_edit().expect("menu");
    assert!(text.contains("Select a new department"));
    assert!(has_buttons);
    fx.adapter.clear();

    fx.router
        .handle_event(callback(ALICE, "alice", &format!("restore_view:{incident_id}"), pinned))
        .await;
    let (_, text, _) = fx.adapter.last_edit().expect("restored");
    assert!(text.contains("IN PROGRESS"));

    // Confirming the transfer moves the ticket to dispatch.
    fx.adapter.clear();
    let data = format!("reassign_department:{incident_id}:{}", fx.dispatch.get());
    fx.router.handle_event(callback(ALICE, "alice", &data, pinned)).await;
    let incident = fx.store.incident(&incident_id).expect("query").expect("row");
    assert_eq!(incident.status, IncidentStatus::AwaitingClaim);
    assert_eq!(incident.department_id, Some(fx.dispatch));
}

// ============================================================================
// SECTION: Pending Groups
// ============================================================================

#[tokio::test]
async fn pending_group_new_issue_records_one_marker() {
    let fx = fixture();
    let pending = GroupId::new(-777);
    fx.store
        .record_pending_group(pending, "New Crew", None, Some(REPORTER), Some("@reporter"), None)
        .expect("pending group");

    let command = |message: i64| ChatEvent::Command {
        chat: pending,
        user: profile(REPORTER, "reporter"),
        message_id: MessageId::new(message),
        name: "new_issue".to_string(),
        args: Vec::new(),
        reply: Some(InboundMessage {
            message_id: MessageId::new(1),
            sender: Some(REPORTER),
            text: Some("Trailer door jammed".to_string()),
        }),
    };

    fx.router.handle_event(command(11)).await;
    assert!(
        fx.store
            .notification_exists(pending, NotificationKind::GroupPendingActivation)
            .expect("exists")
    );
    let sends = fx.adapter.sends();
    assert!(sends.iter().any(|(text, _, _)| text.contains("Waiting for activation")));
    fx.adapter.clear();

    // The second attempt reuses the marker.
    fx.router.handle_event(command(12)).await;
    let sends = fx.adapter.sends();
    assert!(sends.iter().any(|(text, _, _)| text.contains("pending activation")));
    assert_eq!(fx.store.pending_notifications().expect("pending").len(), 1);
}

// ============================================================================
// SECTION: Admin Commands
// ============================================================================

#[tokio::test]
async fn report_command_is_admin_gated() {
    let fx = fixture();
    fx.router
        .handle_event(ChatEvent::Command {
            chat: GROUP,
            user: profile(REPORTER, "reporter"),
            message_id: MessageId::new(20),
            name: "report".to_string(),
            args: vec!["1".to_string(), "week".to_string()],
            reply: None,
        })
        .await;
    assert!(
        fx.adapter
            .sends()
            .iter()
            .any(|(text, _, _)| text.contains("Only platform admins"))
    );
    fx.adapter.clear();

    fx.router
        .handle_event(ChatEvent::Command {
            chat: GROUP,
            user: profile(ADMIN, "admin"),
            message_id: MessageId::new(21),
            name: "report".to_string(),
            args: vec!["1".to_string(), "week".to_string()],
            reply: None,
        })
        .await;
    assert!(
        fx.adapter
            .sends()
            .iter()
            .any(|(text, _, _)| text.contains("Building KPI report for Acme Logistics"))
    );
}

// ============================================================================
// SECTION: Scheduler
// ============================================================================

#[tokio::test]
async fn scheduler_nudges_once_per_assignment() {
    let fx = fixture();
    let (incident_id, pinned) = fx.open_ticket().await;
    fx.route_to_maintenance(&incident_id, pinned).await;

    let mut scheduler = Scheduler::new(
        Arc::clone(&fx.store),
        Arc::clone(&fx.adapter),
        Arc::clone(&fx.config),
        Arc::<ManualClock>::clone(&fx.clock) as Arc<dyn Clock>,
    );

    // Not due yet.
    scheduler.tick().await;
    assert!(fx.adapter.sends().is_empty());

    fx.clock.advance_seconds(11 * 60);
    scheduler.tick().await;
    let sends = fx.adapter.sends();
    assert_eq!(sends.len(), 1);
    assert!(sends[0].0.contains("Unassigned ticket reminder"));
    assert!(sends[0].0.contains("11 minutes"));
    assert_eq!(sends[0].1, Some(pinned));
    fx.adapter.clear();

    // The same assignment never nudges twice.
    fx.clock.advance_seconds(5 * 60);
    scheduler.tick().await;
    assert!(fx.adapter.sends().is_empty());

    // A re-assignment re-arms the nudge.
    fx.store.assign_department(&incident_id, fx.dispatch, ALICE).expect("transfer");
    fx.clock.advance_seconds(11 * 60);
    scheduler.tick().await;
    assert_eq!(fx.adapter.sends().len(), 1);
}

#[tokio::test]
async fn scheduler_auto_closes_summary_timeouts() {
    let fx = fixture();
    let (incident_id, pinned) = fx.open_ticket().await;
    fx.route_to_maintenance(&incident_id, pinned).await;
    fx.store.claim(&incident_id, ALICE).expect("claim");
    fx.store.request_resolution(&incident_id, ALICE).expect("request");
    fx.adapter.clear();

    let mut scheduler = Scheduler::new(
        Arc::clone(&fx.store),
        Arc::clone(&fx.adapter),
        Arc::clone(&fx.config),
        Arc::<ManualClock>::clone(&fx.clock) as Arc<dyn Clock>,
    );

    // Within the window nothing closes.
    scheduler.tick().await;
    assert_eq!(
        fx.store.incident(&incident_id).expect("query").expect("row").status,
        IncidentStatus::AwaitingSummary
    );

    fx.clock.advance_seconds(31 * 60);
    scheduler.tick().await;

    let incident = fx.store.incident(&incident_id).expect("query").expect("row");
    assert_eq!(incident.status, IncidentStatus::Closed);
    let summary = incident.resolution_summary.expect("summary");
    assert!(summary.contains("@alice"));
    assert!(summary.contains("30 minutes"));

    let calls = fx.adapter.calls();
    assert!(calls.iter().any(|call| matches!(
        call,
        ChatCall::Edit { message, text, .. } if *message == pinned && text.contains("CLOSED")
    )));
    assert!(calls.iter().any(|call| matches!(call, ChatCall::Unpin(id) if *id == pinned)));
    assert!(
        fx.adapter
            .sends()
            .iter()
            .any(|(text, _, _)| text.contains("Auto-closed") && text.contains("@alice"))
    );

    let events = fx.store.events(&incident_id).expect("events");
    assert_eq!(events.last().expect("last").kind, EventKind::AutoClosed);

    // A later tick finds nothing left to close.
    fx.adapter.clear();
    scheduler.tick().await;
    assert!(fx.adapter.sends().is_empty());
}
