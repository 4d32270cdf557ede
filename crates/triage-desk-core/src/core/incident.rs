// crates/triage-desk-core/src/core/incident.rs
// ============================================================================
// Module: Incident Data Model
// Description: Incidents, claims, participant rollups, sessions, and events.
// Purpose: Define the persisted lifecycle records and their status vocabularies.
// Dependencies: crate::core::{identifiers, time}, serde, serde_json
// ============================================================================

//! ## Overview
//! Persistent record types for the incident lifecycle. Status vocabularies
//! carry stable storage labels (`as_str`/`parse`) because stored rows are
//! matched by string comparison and legacy databases are migrated in place.
//! The event log is append-only; every lifecycle mutation appends at least
//! one [`IncidentEvent`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::CompanyId;
use crate::core::identifiers::DepartmentId;
use crate::core::identifiers::GroupId;
use crate::core::identifiers::IncidentId;
use crate::core::identifiers::MessageId;
use crate::core::identifiers::UserId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Incident Status
// ============================================================================

/// Incident lifecycle status.
///
/// # Invariants
/// - Storage labels are stable; migrations rewrite legacy tier labels into
///   this vocabulary on startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    /// Reporter has not yet routed the ticket to a department.
    AwaitingDepartment,
    /// Routed to a department; nobody is working on it.
    AwaitingClaim,
    /// At least one responder holds an active claim.
    InProgress,
    /// A responder requested resolution and owes a summary.
    AwaitingSummary,
    /// Closed with a human-provided summary.
    Resolved,
    /// Closed by the scheduler after a summary timeout.
    Closed,
}

impl IncidentStatus {
    /// Returns the stable storage label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AwaitingDepartment => "Awaiting_Department",
            Self::AwaitingClaim => "Awaiting_Claim",
            Self::InProgress => "In_Progress",
            Self::AwaitingSummary => "Awaiting_Summary",
            Self::Resolved => "Resolved",
            Self::Closed => "Closed",
        }
    }

    /// Parses a stored status label.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Awaiting_Department" => Some(Self::AwaitingDepartment),
            "Awaiting_Claim" => Some(Self::AwaitingClaim),
            "In_Progress" => Some(Self::InProgress),
            "Awaiting_Summary" => Some(Self::AwaitingSummary),
            "Resolved" => Some(Self::Resolved),
            "Closed" => Some(Self::Closed),
            _ => None,
        }
    }

    /// Returns true for the terminal statuses.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved | Self::Closed)
    }

    /// Returns true when new claims are accepted in this status.
    #[must_use]
    pub const fn accepts_claims(self) -> bool {
        matches!(self, Self::AwaitingClaim | Self::InProgress)
    }
}

// ============================================================================
// SECTION: Incident
// ============================================================================

/// One incident ticket.
///
/// # Invariants
/// - `pending_resolution_by_user_id` is `Some` exactly in `AwaitingSummary`.
/// - `department_id` changes only through department assignment.
/// - Timestamps are monotone in lifecycle order where set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    /// Incident identifier.
    pub incident_id: IncidentId,
    /// Group the incident was reported in.
    pub group_id: GroupId,
    /// Company owning the group.
    pub company_id: CompanyId,
    /// Reporter user id.
    pub created_by_id: UserId,
    /// Reporter handle at creation time.
    pub created_by_handle: String,
    /// Problem description (5 to 3000 characters).
    pub description: String,
    /// Canonical pinned state-view message, once posted.
    pub pinned_message_id: Option<MessageId>,
    /// Message the reporter replied to when opening the ticket.
    pub source_message_id: Option<MessageId>,
    /// Currently assigned department.
    pub department_id: Option<DepartmentId>,
    /// Lifecycle status.
    pub status: IncidentStatus,
    /// Responder owing the resolution summary.
    pub pending_resolution_by_user_id: Option<UserId>,
    /// Responder who provided the closing summary.
    pub resolved_by_user_id: Option<UserId>,
    /// Closing summary text.
    pub resolution_summary: Option<String>,
    /// Creation instant.
    pub t_created: Timestamp,
    /// Latest department assignment instant.
    pub t_department_assigned: Option<Timestamp>,
    /// First claim instant.
    pub t_first_claimed: Option<Timestamp>,
    /// Latest claim instant.
    pub t_last_claimed: Option<Timestamp>,
    /// Resolution request instant.
    pub t_resolution_requested: Option<Timestamp>,
    /// Terminal instant (resolve or auto-close).
    pub t_resolved: Option<Timestamp>,
}

// ============================================================================
// SECTION: Claims
// ============================================================================

/// An active or historical declaration that a user works an incident.
///
/// # Invariants
/// - At most one active claim per (incident, user, department).
/// - `released_at` is `Some` exactly when `is_active` is false.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    /// Incident the claim belongs to.
    pub incident_id: IncidentId,
    /// Claiming user.
    pub user_id: UserId,
    /// Department the claim was made under.
    pub department_id: DepartmentId,
    /// Claiming user's handle, resolved at query time.
    pub handle: String,
    /// Claim instant.
    pub claimed_at: Timestamp,
    /// Release instant, once released.
    pub released_at: Option<Timestamp>,
    /// Whether the claim is currently active.
    pub is_active: bool,
}

// ============================================================================
// SECTION: Participant Rollup
// ============================================================================

/// Terminal and in-flight participant outcomes.
///
/// # Invariants
/// - Storage labels are stable for reporting queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStatus {
    /// Currently holding an active claim.
    Active,
    /// Released their claim before the incident closed.
    Released,
    /// Provided the resolution summary.
    ResolvedSelf,
    /// Held a claim while another responder resolved.
    ResolvedOther,
    /// Claim closed by a department transfer.
    Transferred,
    /// Claim closed by an auto-close timeout.
    Closed,
}

impl ParticipantStatus {
    /// Returns the stable storage label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Released => "released",
            Self::ResolvedSelf => "resolved_self",
            Self::ResolvedOther => "resolved_other",
            Self::Transferred => "transferred",
            Self::Closed => "closed",
        }
    }

    /// Parses a stored status label.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Self::Active),
            "released" => Some(Self::Released),
            "resolved_self" => Some(Self::ResolvedSelf),
            "resolved_other" => Some(Self::ResolvedOther),
            "transferred" => Some(Self::Transferred),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }

    /// Returns true for terminal participant outcomes.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Active)
    }
}

/// Per-user engagement rollup on one incident.
///
/// # Invariants
/// - One row per (incident, user, department).
/// - `total_active_seconds` equals the sum of finalized active spans,
///   each clamped to zero.
/// - `active_since` is `Some` exactly when `status` is `Active`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Incident the rollup belongs to.
    pub incident_id: IncidentId,
    /// Participating user.
    pub user_id: UserId,
    /// Department the participation was under.
    pub department_id: DepartmentId,
    /// First claim instant.
    pub first_claimed_at: Timestamp,
    /// Most recent claim instant.
    pub last_claimed_at: Timestamp,
    /// Start of the currently accruing span.
    pub active_since: Option<Timestamp>,
    /// Total finalized engagement seconds.
    pub total_active_seconds: u64,
    /// Number of times the user joined this incident.
    pub join_count: u32,
    /// Rollup status.
    pub status: ParticipantStatus,
    /// Instant the rollup was finalized by resolve/close.
    pub resolved_at: Option<Timestamp>,
}

// ============================================================================
// SECTION: Department Sessions
// ============================================================================

/// Department session outcomes.
///
/// # Invariants
/// - Storage labels are stable for reporting queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// The department currently owns the incident.
    Active,
    /// Ownership moved to another department.
    Transferred,
    /// Incident resolved while this department owned it.
    Resolved,
    /// Incident auto-closed while this department owned it.
    Closed,
}

impl SessionStatus {
    /// Returns the stable storage label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Transferred => "transferred",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
        }
    }

    /// Parses a stored status label.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Self::Active),
            "transferred" => Some(Self::Transferred),
            "resolved" => Some(Self::Resolved),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }
}

/// One department assignment span on an incident.
///
/// # Invariants
/// - At most one active session per incident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepartmentSession {
    /// Incident the session belongs to.
    pub incident_id: IncidentId,
    /// Assigned department.
    pub department_id: DepartmentId,
    /// Assignment instant.
    pub assigned_at: Timestamp,
    /// User who performed the assignment.
    pub assigned_by: Option<UserId>,
    /// First claim instant inside this session.
    pub claimed_at: Option<Timestamp>,
    /// Session close instant.
    pub released_at: Option<Timestamp>,
    /// Session status.
    pub status: SessionStatus,
}

// ============================================================================
// SECTION: Events
// ============================================================================

/// Append-only event vocabulary.
///
/// # Invariants
/// - Storage labels are stable; the KPI renderer consumes them read-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Incident created.
    Create,
    /// Department assigned or transferred.
    DepartmentAssigned,
    /// Responder joined.
    Claim,
    /// Responder left.
    Release,
    /// Responder requested resolution.
    ResolutionRequested,
    /// Resolved with a summary.
    Resolve,
    /// Closed by the scheduler.
    AutoClosed,
}

impl EventKind {
    /// Returns the stable storage label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::DepartmentAssigned => "department_assigned",
            Self::Claim => "claim",
            Self::Release => "release",
            Self::ResolutionRequested => "resolution_requested",
            Self::Resolve => "resolve",
            Self::AutoClosed => "auto_closed",
        }
    }

    /// Parses a stored event label.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "create" => Some(Self::Create),
            "department_assigned" => Some(Self::DepartmentAssigned),
            "claim" => Some(Self::Claim),
            "release" => Some(Self::Release),
            "resolution_requested" => Some(Self::ResolutionRequested),
            "resolve" => Some(Self::Resolve),
            "auto_closed" => Some(Self::AutoClosed),
            _ => None,
        }
    }
}

/// Immutable event log entry.
///
/// # Invariants
/// - Never updated or deleted after insertion.
/// - Events within one transaction share the commit instant and order by
///   insertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentEvent {
    /// Incident the event belongs to.
    pub incident_id: IncidentId,
    /// Event kind.
    pub kind: EventKind,
    /// Acting user, when the event has a human actor.
    pub actor_user_id: Option<UserId>,
    /// Commit instant.
    pub at: Timestamp,
    /// Structured event metadata.
    pub metadata: serde_json::Value,
}

// ============================================================================
// SECTION: Notifications
// ============================================================================

/// Notification queue row status.
///
/// # Invariants
/// - Storage labels are stable; the drain marks rows sent or failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    /// Awaiting delivery.
    Pending,
    /// Delivered to the chat platform.
    Sent,
    /// Delivery failed; `last_error` records why.
    Failed,
}

impl NotificationStatus {
    /// Returns the stable storage label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }

    /// Parses a stored status label.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "sent" => Some(Self::Sent),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Cross-process notification kinds delivered through the queue.
///
/// # Invariants
/// - Storage labels are stable; external writers insert matching labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A pending group tried to use the coordinator.
    GroupPendingActivation,
    /// A pending group was approved and activated.
    GroupApproved,
    /// A pending group's activation request was denied.
    GroupDenied,
}

impl NotificationKind {
    /// Returns the stable storage label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GroupPendingActivation => "group_pending_activation",
            Self::GroupApproved => "group_approved",
            Self::GroupDenied => "group_denied",
        }
    }

    /// Parses a stored kind label.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "group_pending_activation" => Some(Self::GroupPendingActivation),
            "group_approved" => Some(Self::GroupApproved),
            "group_denied" => Some(Self::GroupDenied),
            _ => None,
        }
    }
}

/// Queued cross-process message the adapter drains.
///
/// # Invariants
/// - `sent_at` is `Some` only for `Sent` rows; `last_error` only for
///   `Failed` rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Queue row id.
    pub id: i64,
    /// Destination group.
    pub group_id: GroupId,
    /// Notification kind.
    pub kind: NotificationKind,
    /// Structured payload rendered at delivery time.
    pub payload: serde_json::Value,
    /// Delivery status.
    pub status: NotificationStatus,
    /// Enqueue instant.
    pub created_at: Timestamp,
    /// Delivery instant.
    pub sent_at: Option<Timestamp>,
    /// Most recent delivery error.
    pub last_error: Option<String>,
}
