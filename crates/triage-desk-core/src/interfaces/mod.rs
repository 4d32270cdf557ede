// crates/triage-desk-core/src/interfaces/mod.rs
// ============================================================================
// Module: Triage Desk Interfaces
// Description: Backend-agnostic contracts for persistence and chat transport.
// Purpose: Define the surfaces the store, router, and scheduler plug into.
// Dependencies: crate::core, async-trait, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Interfaces define how the lifecycle core integrates with storage and the
//! chat platform without embedding backend specifics. The [`TriageStore`]
//! trait carries the lifecycle operations themselves: every mutation is
//! atomic end-to-end (incident row, claims, participant rollups, sessions,
//! and the event log commit together or not at all), and implementations
//! serialize mutations behind a process-wide writer lock.
//!
//! [`ChatAdapter`] is the outbound transport contract; inbound traffic
//! arrives as [`ChatEvent`] values produced by the platform adapter.
//! Chat failures never roll back committed lifecycle transitions.

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::directory::Company;
use crate::core::directory::Department;
use crate::core::directory::GlobalRole;
use crate::core::directory::Membership;
use crate::core::directory::User;
use crate::core::directory::UserProfile;
use crate::core::identifiers::CallbackId;
use crate::core::identifiers::CompanyId;
use crate::core::identifiers::DepartmentId;
use crate::core::identifiers::GroupId;
use crate::core::identifiers::IncidentId;
use crate::core::identifiers::MessageId;
use crate::core::identifiers::UserId;
use crate::core::incident::Claim;
use crate::core::incident::DepartmentSession;
use crate::core::incident::Incident;
use crate::core::incident::IncidentEvent;
use crate::core::incident::Notification;
use crate::core::incident::NotificationKind;
use crate::core::incident::Participant;
use crate::core::render::ButtonRows;

// ============================================================================
// SECTION: Lifecycle Errors
// ============================================================================

/// Lifecycle operation errors.
///
/// # Invariants
/// - Kind labels are stable for logging and alert policy decisions.
/// - Messages are user-presentable; they never embed storage internals.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// Input shape or range violation.
    #[error("{0}")]
    Validation(String),
    /// The role resolver rejected the capability.
    #[error("{0}")]
    PermissionDenied(String),
    /// A precondition on the current state failed.
    #[error("{0}")]
    StateConflict(String),
    /// The target record does not exist.
    #[error("{0}")]
    NotFound(String),
    /// The storage transaction failed.
    #[error("storage error: {0}")]
    Storage(String),
}

impl LifecycleError {
    /// Returns the stable kind label.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::PermissionDenied(_) => "permission_denied",
            Self::StateConflict(_) => "state_conflict",
            Self::NotFound(_) => "not_found",
            Self::Storage(_) => "storage_error",
        }
    }
}

// ============================================================================
// SECTION: Triage Store
// ============================================================================

/// Durable persistence and lifecycle execution contract.
///
/// Mutating methods validate preconditions against rows read inside their
/// own transaction, apply the transition, and append events; a failing
/// precondition returns the typed error with no storage effect.
pub trait TriageStore: Send + Sync {
    // ------------------------------------------------------------------
    // Directory queries
    // ------------------------------------------------------------------

    /// Returns the combined group/company membership view for a chat.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Storage`] when the query fails.
    fn membership(&self, group: GroupId) -> Result<Option<Membership>, LifecycleError>;

    /// Looks up a company.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Storage`] when the query fails.
    fn company(&self, company: CompanyId) -> Result<Option<Company>, LifecycleError>;

    /// Lists a company's departments ordered by name.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Storage`] when the query fails.
    fn company_departments(&self, company: CompanyId)
    -> Result<Vec<Department>, LifecycleError>;

    /// Looks up a department.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Storage`] when the query fails.
    fn department(&self, department: DepartmentId)
    -> Result<Option<Department>, LifecycleError>;

    /// Returns true when the user belongs to the department.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Storage`] when the query fails.
    fn is_department_member(
        &self,
        department: DepartmentId,
        user: UserId,
    ) -> Result<bool, LifecycleError>;

    /// Returns the roster handles of a department.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Storage`] when the query fails.
    fn department_handles(&self, department: DepartmentId)
    -> Result<Vec<String>, LifecycleError>;

    /// Looks up a tracked user.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Storage`] when the query fails.
    fn user(&self, user: UserId) -> Result<Option<User>, LifecycleError>;

    /// Looks up a tracked user by platform username (without `@`).
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Storage`] when the query fails.
    fn user_by_username(&self, username: &str) -> Result<Option<User>, LifecycleError>;

    /// Returns the user's handle, or the `User_<id>` fallback.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Storage`] when the lookup fails.
    fn user_handle_or_fallback(&self, user: Option<UserId>) -> Result<String, LifecycleError> {
        let Some(user_id) = user else {
            return Ok("Unknown".to_string());
        };
        Ok(self
            .user(user_id)?
            .map_or_else(|| format!("User_{user_id}"), |record| record.handle))
    }

    // ------------------------------------------------------------------
    // Incident queries
    // ------------------------------------------------------------------

    /// Looks up an incident snapshot with no claims attached.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Storage`] when the query fails.
    fn incident(&self, incident: &IncidentId) -> Result<Option<Incident>, LifecycleError>;

    /// Looks up an incident by its pinned state-view message.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Storage`] when the query fails.
    fn incident_by_pinned_message(
        &self,
        group: GroupId,
        message: MessageId,
    ) -> Result<Option<Incident>, LifecycleError>;

    /// Returns the active claims on an incident with resolved handles.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Storage`] when the query fails.
    fn active_claims(&self, incident: &IncidentId) -> Result<Vec<Claim>, LifecycleError>;

    /// Returns handles of active claimers, oldest claim first, optionally
    /// restricted to one department.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Storage`] when the query fails.
    fn active_claim_handles(
        &self,
        incident: &IncidentId,
        department: Option<DepartmentId>,
    ) -> Result<Vec<String>, LifecycleError>;

    /// Returns incidents awaiting a claim whose department assignment is at
    /// least `older_than_minutes` old.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Storage`] when the query fails.
    fn unclaimed_incidents(
        &self,
        older_than_minutes: u64,
    ) -> Result<Vec<Incident>, LifecycleError>;

    /// Returns incidents awaiting a summary whose resolution request is at
    /// least `older_than_minutes` old.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Storage`] when the query fails.
    fn awaiting_summary_incidents(
        &self,
        older_than_minutes: u64,
    ) -> Result<Vec<Incident>, LifecycleError>;

    /// Returns the append-only event log for an incident, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Storage`] when the query fails.
    fn events(&self, incident: &IncidentId) -> Result<Vec<IncidentEvent>, LifecycleError>;

    /// Returns the participant rollups for an incident.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Storage`] when the query fails.
    fn participants(&self, incident: &IncidentId) -> Result<Vec<Participant>, LifecycleError>;

    /// Returns the department sessions for an incident, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Storage`] when the query fails.
    fn department_sessions(
        &self,
        incident: &IncidentId,
    ) -> Result<Vec<DepartmentSession>, LifecycleError>;

    // ------------------------------------------------------------------
    // Lifecycle mutations
    // ------------------------------------------------------------------

    /// Creates an incident in `Awaiting_Department` and emits `create`.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Validation`] for description-length
    /// violations, [`LifecycleError::StateConflict`] for inactive groups,
    /// [`LifecycleError::NotFound`] for unregistered groups, and
    /// [`LifecycleError::Storage`] for transaction failures.
    fn create_incident(
        &self,
        group: GroupId,
        reporter: UserId,
        reporter_handle: &str,
        description: &str,
        source_message: Option<MessageId>,
    ) -> Result<IncidentId, LifecycleError>;

    /// Records the pinned state-view message for an incident.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::NotFound`] for unknown incidents and
    /// [`LifecycleError::Storage`] for transaction failures.
    fn set_pinned_message(
        &self,
        incident: &IncidentId,
        message: MessageId,
    ) -> Result<(), LifecycleError>;

    /// Assigns or transfers the incident to a department.
    ///
    /// Finalizes prior claims and the prior session as `transferred`, opens
    /// a new session, re-enters `Awaiting_Claim`, and emits
    /// `department_assigned`.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::StateConflict`] outside the assignable
    /// statuses, [`LifecycleError::NotFound`] for unknown rows,
    /// [`LifecycleError::Validation`] for cross-company departments, and
    /// [`LifecycleError::Storage`] for transaction failures.
    fn assign_department(
        &self,
        incident: &IncidentId,
        department: DepartmentId,
        actor: UserId,
    ) -> Result<(), LifecycleError>;

    /// Adds the user's active claim and moves the incident to `In_Progress`.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::StateConflict`] outside the claimable
    /// statuses or for a duplicate claim, [`LifecycleError::NotFound`] for
    /// unknown incidents, and [`LifecycleError::Storage`] for transaction
    /// failures.
    fn claim(&self, incident: &IncidentId, user: UserId) -> Result<(), LifecycleError>;

    /// Releases the user's active claim; the last release re-enters
    /// `Awaiting_Claim`.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::StateConflict`] when the user holds no
    /// active claim or the status forbids release,
    /// [`LifecycleError::NotFound`] for unknown incidents, and
    /// [`LifecycleError::Storage`] for transaction failures.
    fn release(&self, incident: &IncidentId, user: UserId) -> Result<(), LifecycleError>;

    /// Moves the incident to `Awaiting_Summary` with the user as resolver.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::StateConflict`] outside `In_Progress` or
    /// without an active claim, [`LifecycleError::NotFound`] for unknown
    /// incidents, and [`LifecycleError::Storage`] for transaction failures.
    fn request_resolution(
        &self,
        incident: &IncidentId,
        user: UserId,
    ) -> Result<(), LifecycleError>;

    /// Resolves the incident with the pending user's summary.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::StateConflict`] outside
    /// `Awaiting_Summary`, [`LifecycleError::PermissionDenied`] for a
    /// non-pending user, [`LifecycleError::Validation`] for an empty
    /// summary, [`LifecycleError::NotFound`] for unknown incidents, and
    /// [`LifecycleError::Storage`] for transaction failures.
    fn resolve(
        &self,
        incident: &IncidentId,
        user: UserId,
        summary: &str,
    ) -> Result<(), LifecycleError>;

    /// Closes a summary-timeout incident on behalf of the scheduler.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::StateConflict`] outside
    /// `Awaiting_Summary`, [`LifecycleError::NotFound`] for unknown
    /// incidents, and [`LifecycleError::Storage`] for transaction failures.
    fn auto_close(
        &self,
        incident: &IncidentId,
        summary: &str,
        reason: &str,
    ) -> Result<(), LifecycleError>;

    // ------------------------------------------------------------------
    // User tracking and onboarding
    // ------------------------------------------------------------------

    /// Upserts a user profile and optional group connection.
    ///
    /// The legacy global role only upgrades, never demotes.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Storage`] for transaction failures.
    fn track_user(
        &self,
        profile: &UserProfile,
        group: Option<GroupId>,
        role_hint: Option<GlobalRole>,
    ) -> Result<(), LifecycleError>;

    /// Attaches a group to a company and marks it active.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::NotFound`] for unknown companies and
    /// [`LifecycleError::Storage`] for transaction failures.
    fn attach_group_to_company(
        &self,
        group: GroupId,
        group_name: &str,
        company: CompanyId,
    ) -> Result<(), LifecycleError>;

    /// Records or refreshes a pending group registration request.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Storage`] for transaction failures.
    fn record_pending_group(
        &self,
        group: GroupId,
        group_name: &str,
        registration_message: Option<MessageId>,
        requested_by: Option<UserId>,
        requested_by_handle: Option<&str>,
        requested_company_name: Option<&str>,
    ) -> Result<(), LifecycleError>;

    // ------------------------------------------------------------------
    // Notification queue
    // ------------------------------------------------------------------

    /// Returns pending notification rows, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Storage`] when the query fails.
    fn pending_notifications(&self) -> Result<Vec<Notification>, LifecycleError>;

    /// Returns true when a notification of this kind already exists for the
    /// group in any non-discarded status.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Storage`] when the query fails.
    fn notification_exists(
        &self,
        group: GroupId,
        kind: NotificationKind,
    ) -> Result<bool, LifecycleError>;

    /// Enqueues a notification row.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Storage`] for transaction failures.
    fn enqueue_notification(
        &self,
        group: GroupId,
        kind: NotificationKind,
        payload: &serde_json::Value,
    ) -> Result<(), LifecycleError>;

    /// Marks a notification row delivered.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Storage`] for transaction failures.
    fn mark_notification_sent(&self, notification: i64) -> Result<(), LifecycleError>;

    /// Marks a notification row failed with the delivery error.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Storage`] for transaction failures.
    fn mark_notification_failed(
        &self,
        notification: i64,
        error: &str,
    ) -> Result<(), LifecycleError>;
}

// ============================================================================
// SECTION: Chat Errors
// ============================================================================

/// Chat transport errors.
///
/// # Invariants
/// - Kind labels are stable for logging; chat failures never roll back a
///   committed lifecycle transition.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// Sending a message failed.
    #[error("chat send failed: {0}")]
    Send(String),
    /// Editing a message failed.
    #[error("chat edit failed: {0}")]
    Edit(String),
    /// Pinning or unpinning failed.
    #[error("chat pin failed: {0}")]
    Pin(String),
    /// Answering a callback query failed.
    #[error("chat callback answer failed: {0}")]
    Answer(String),
}

impl ChatError {
    /// Returns the stable kind label.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Send(_) => "send",
            Self::Edit(_) => "edit",
            Self::Pin(_) => "pin",
            Self::Answer(_) => "answer",
        }
    }
}

// ============================================================================
// SECTION: Chat Adapter
// ============================================================================

/// Outbound chat transport contract.
///
/// Pin and unpin are idempotent: repeating either call for the same message
/// must succeed without observable effect.
#[async_trait]
pub trait ChatAdapter: Send + Sync {
    /// Sends a message, optionally as a reply and with inline buttons.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError`] when the platform rejects the send.
    async fn send(
        &self,
        group: GroupId,
        text: &str,
        reply_to: Option<MessageId>,
        buttons: Option<&ButtonRows>,
    ) -> Result<MessageId, ChatError>;

    /// Edits a message in place.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError`] when the platform rejects the edit.
    async fn edit(
        &self,
        group: GroupId,
        message: MessageId,
        text: &str,
        buttons: Option<&ButtonRows>,
    ) -> Result<(), ChatError>;

    /// Pins a message (idempotent).
    ///
    /// # Errors
    ///
    /// Returns [`ChatError`] when the platform rejects the pin.
    async fn pin(&self, group: GroupId, message: MessageId) -> Result<(), ChatError>;

    /// Unpins a message (idempotent).
    ///
    /// # Errors
    ///
    /// Returns [`ChatError`] when the platform rejects the unpin.
    async fn unpin(&self, group: GroupId, message: MessageId) -> Result<(), ChatError>;

    /// Acknowledges a callback query with a toast or alert popup.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError`] when the platform rejects the answer.
    async fn answer_callback(
        &self,
        callback: &CallbackId,
        text: &str,
        alert: bool,
    ) -> Result<(), ChatError>;
}

// ============================================================================
// SECTION: Chat Events
// ============================================================================

/// A message referenced as a reply target.
///
/// # Invariants
/// - `sender` is `None` when the platform withholds the original author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Message identifier.
    pub message_id: MessageId,
    /// Author of the referenced message.
    pub sender: Option<UserId>,
    /// Text or caption of the referenced message.
    pub text: Option<String>,
}

/// Inbound chat traffic decoded by the platform adapter.
///
/// # Invariants
/// - Every variant names the originating chat and user so the router can
///   track interactions before dispatching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatEvent {
    /// A slash command.
    Command {
        /// Originating chat.
        chat: GroupId,
        /// Invoking user.
        user: UserProfile,
        /// Message carrying the command.
        message_id: MessageId,
        /// Command name without the leading slash.
        name: String,
        /// Whitespace-split arguments.
        args: Vec<String>,
        /// Message the command replied to, when any.
        reply: Option<InboundMessage>,
    },
    /// An inline-button tap.
    Callback {
        /// Originating chat.
        chat: GroupId,
        /// Tapping user.
        user: UserProfile,
        /// Callback query identifier for acknowledgement.
        callback_id: CallbackId,
        /// Raw callback payload.
        data: String,
        /// Message carrying the tapped button.
        message_id: MessageId,
    },
    /// A plain message (the resolution-summary channel).
    Message {
        /// Originating chat.
        chat: GroupId,
        /// Sending user.
        user: UserProfile,
        /// Message identifier.
        message_id: MessageId,
        /// Message text.
        text: String,
        /// Message this one replied to, when any.
        reply_to: Option<InboundMessage>,
    },
    /// The coordinator was added to or promoted in a chat.
    MembershipChange {
        /// Affected chat.
        chat: GroupId,
        /// Chat title, when known.
        chat_title: Option<String>,
        /// User who performed the change.
        user: Option<UserProfile>,
    },
}
