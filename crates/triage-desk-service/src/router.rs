// crates/triage-desk-service/src/router.rs
// ============================================================================
// Module: Command and Callback Router
// Description: Turns inbound chat events into lifecycle operations.
// Purpose: Enforce membership and capabilities, apply transitions, and keep
//          the pinned state view current.
// Dependencies: regex, serde_json, tracing, triage-desk-config,
//               triage-desk-core
// ============================================================================

//! ## Overview
//! One router instance serves every group. Each inbound event is handled in
//! three steps: track the interacting user, validate the group's membership
//! (pending groups are rejected, with a one-shot activation notification on
//! `/new_issue`), then resolve capabilities and call the lifecycle store.
//! On success the pinned message is re-rendered from the fresh snapshot; on
//! failure the typed error text is surfaced as an alert or reply. Chat
//! transport failures are logged and never roll back a committed transition.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;
use triage_desk_config::TriageConfig;
use triage_desk_core::ButtonRows;
use triage_desk_core::CallbackData;
use triage_desk_core::CallbackId;
use triage_desk_core::ChatAdapter;
use triage_desk_core::ChatError;
use triage_desk_core::ChatEvent;
use triage_desk_core::CompanyId;
use triage_desk_core::DepartmentId;
use triage_desk_core::GlobalRole;
use triage_desk_core::GroupId;
use triage_desk_core::InboundMessage;
use triage_desk_core::Incident;
use triage_desk_core::IncidentId;
use triage_desk_core::IncidentStatus;
use triage_desk_core::LifecycleError;
use triage_desk_core::Membership;
use triage_desk_core::MessageId;
use triage_desk_core::NotificationKind;
use triage_desk_core::TriageStore;
use triage_desk_core::UserId;
use triage_desk_core::UserProfile;
use triage_desk_core::render;
use triage_desk_core::roles::Capability;
use triage_desk_core::roles::CapabilitySet;
use triage_desk_core::roles::RoleContext;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Welcome text for `/start` and `/help`.
const WELCOME_TEXT: &str = "👋 Welcome to the Triage Desk incident coordinator!\n\nThis bot \
                            helps manage incidents in your team. Here's how to use it:\n\n📋 \
                            Commands:\n/new_issue - Reply to an issue message with /new_issue to \
                            start a ticket\n\n🔧 Features:\n- Department-based workflow managed \
                            from the dashboard\n- Button-based interactions end-to-end\n- \
                            Automatic SLA reminders\n- Race condition protection\n- Per-group \
                            isolation\n\nMake sure your group is activated and departments are \
                            set up in the dashboard before creating incidents.";

/// Reply shown when a pending group is used.
const PENDING_TEXT: &str = "This group is pending activation. Please reply to the registration \
                            prompt so Platform Admin can attach it to a company.";

/// Reply shown when a chat is not registered at all.
const UNREGISTERED_TEXT: &str = "This group is not registered yet. Please invite the bot and \
                                 complete activation first.";

/// Marker phrase identifying the resolve-completion channel.
const RESOLUTION_MARKER: &str = "resolution summary";

/// Incident-id fallback pattern: legacy ticket ids or a 4+ digit group.
static INCIDENT_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used, reason = "pattern is a compile-time constant")]
    Regex::new(r"(TKT-\d{4}-\d+|\b\d{4,}\b)").expect("incident id pattern")
});

// ============================================================================
// SECTION: Router
// ============================================================================

/// Routes inbound chat events into lifecycle operations.
///
/// # Invariants
/// - Lifecycle mutations run only after the capability checks pass.
/// - Chat failures after a committed transition are logged, never retried
///   or rolled back.
pub struct Router<S, A> {
    /// Lifecycle store.
    store: Arc<S>,
    /// Outbound chat transport.
    adapter: Arc<A>,
    /// Process configuration (admin gating, SLA display values).
    config: Arc<TriageConfig>,
    /// The coordinator's own user id, for recognizing replies to it.
    bot_user_id: Option<UserId>,
}

impl<S: TriageStore, A: ChatAdapter> Router<S, A> {
    /// Creates a router over the store, adapter, and configuration.
    #[must_use]
    pub const fn new(
        store: Arc<S>,
        adapter: Arc<A>,
        config: Arc<TriageConfig>,
        bot_user_id: Option<UserId>,
    ) -> Self {
        Self {
            store,
            adapter,
            config,
            bot_user_id,
        }
    }

    /// Handles one inbound event; errors are surfaced to the user and
    /// logged, never propagated.
    pub async fn handle_event(&self, event: ChatEvent) {
        match event {
            ChatEvent::Command {
                chat,
                user,
                message_id,
                name,
                args,
                reply,
            } => self.handle_command(chat, &user, message_id, &name, &args, reply).await,
            ChatEvent::Callback {
                chat,
                user,
                callback_id,
                data,
                message_id,
            } => self.handle_callback(chat, &user, &callback_id, &data, message_id).await,
            ChatEvent::Message {
                chat,
                user,
                message_id,
                text,
                reply_to,
            } => self.handle_message(chat, &user, message_id, &text, reply_to).await,
            ChatEvent::MembershipChange {
                chat,
                chat_title,
                user,
            } => self.handle_membership_change(chat, chat_title.as_deref(), user.as_ref()).await,
        }
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Dispatches a slash command.
    async fn handle_command(
        &self,
        chat: GroupId,
        user: &UserProfile,
        message_id: MessageId,
        name: &str,
        args: &[String],
        reply: Option<InboundMessage>,
    ) {
        tracing::info!(chat = chat.get(), user = user.id.get(), command = name, "command");
        self.track(user, Some(chat));
        match name {
            "start" | "help" => {
                self.send_reply(chat, Some(message_id), WELCOME_TEXT).await;
            }
            "new_issue" => self.handle_new_issue(chat, user, message_id, reply).await,
            "report" => self.handle_report(chat, user, message_id, args).await,
            "add_group" => self.handle_add_group(chat, user, message_id, args).await,
            "add_manager" => self.handle_add_manager(chat, user, message_id, args).await,
            other => {
                tracing::debug!(command = other, "ignoring unknown command");
            }
        }
    }

    /// Handles `/new_issue`: reply-sourced description, department menu,
    /// pinning.
    async fn handle_new_issue(
        &self,
        chat: GroupId,
        user: &UserProfile,
        message_id: MessageId,
        reply: Option<InboundMessage>,
    ) {
        let membership = match self.store.membership(chat) {
            Ok(Some(membership)) => membership,
            Ok(None) => {
                self.send_reply(chat, Some(message_id), UNREGISTERED_TEXT).await;
                return;
            }
            Err(err) => {
                self.report_error(chat, Some(message_id), &err).await;
                return;
            }
        };
        if !membership.is_active {
            self.handle_pending_new_issue(chat, user, message_id, &membership).await;
            return;
        }
        let Some(company) = membership.group.company_id else {
            self.send_reply(chat, Some(message_id), UNREGISTERED_TEXT).await;
            return;
        };

        let description = reply
            .as_ref()
            .and_then(|origin| origin.text.as_deref())
            .map(str::trim)
            .filter(|text| !text.is_empty());
        let Some(description) = description else {
            self.send_reply(
                chat,
                Some(message_id),
                "❌ Please reply to the message describing the issue and run /new_issue from \
                 that reply.",
            )
            .await;
            return;
        };

        let departments = match self.store.company_departments(company) {
            Ok(departments) if !departments.is_empty() => departments,
            Ok(_) => {
                self.send_reply(
                    chat,
                    Some(message_id),
                    "❌ No departments are configured for this company yet. Please set up \
                     departments in the dashboard before creating incidents.",
                )
                .await;
                return;
            }
            Err(err) => {
                self.report_error(chat, Some(message_id), &err).await;
                return;
            }
        };

        let source_message = reply.as_ref().map(|origin| origin.message_id);
        let incident_id = match self.store.create_incident(
            chat,
            user.id,
            &user.handle(),
            description,
            source_message,
        ) {
            Ok(id) => id,
            Err(err) => {
                self.report_error(chat, Some(message_id), &err).await;
                return;
            }
        };
        tracing::info!(incident = incident_id.as_str(), chat = chat.get(), "incident created");

        let Ok(Some(incident)) = self.store.incident(&incident_id) else {
            self.send_reply(chat, Some(message_id), "An error occurred. Please try again.").await;
            return;
        };
        let (text, buttons) = render::department_selection(
            &incident,
            &departments,
            "Choose the department to handle this issue.",
            false,
            false,
        );
        let sent = match self.adapter.send(chat, &text, Some(message_id), Some(&buttons)).await {
            Ok(sent) => sent,
            Err(err) => {
                self.log_chat_error(&incident_id, &err);
                return;
            }
        };
        if let Err(err) = self.store.set_pinned_message(&incident_id, sent) {
            tracing::error!(incident = incident_id.as_str(), error = %err, "pin bookkeeping");
        }
        if let Err(err) = self.adapter.pin(chat, sent).await {
            self.log_chat_error(&incident_id, &err);
            self.send_reply(
                chat,
                Some(message_id),
                &format!(
                    "Created incident {incident_id} but couldn't pin the message. Make sure the \
                     bot has pin message permissions."
                ),
            )
            .await;
        }
    }

    /// Handles `/new_issue` in a pending group: one-shot activation marker.
    async fn handle_pending_new_issue(
        &self,
        chat: GroupId,
        user: &UserProfile,
        message_id: MessageId,
        membership: &Membership,
    ) {
        let exists = self
            .store
            .notification_exists(chat, NotificationKind::GroupPendingActivation)
            .unwrap_or_else(|err| {
                tracing::error!(chat = chat.get(), error = %err, "pending marker check");
                true
            });
        if exists {
            self.send_reply(chat, Some(message_id), PENDING_TEXT).await;
            return;
        }
        let group = &membership.group;
        let payload = serde_json::json!({
            "group_id": chat.get(),
            "group_name": group.name,
            "requested_company_name": group.requested_company_name,
            "requested_by_user_id": group.requested_by_user_id.map(UserId::get),
            "requested_by_handle": group.requested_by_handle,
            "triggered_by_user_id": user.id.get(),
            "triggered_by_handle": user.handle(),
        });
        match self.store.enqueue_notification(
            chat,
            NotificationKind::GroupPendingActivation,
            &payload,
        ) {
            Ok(()) => self.send_reply(chat, Some(message_id), "Group is Waiting for activation").await,
            Err(err) => {
                tracing::error!(chat = chat.get(), error = %err, "pending marker enqueue");
                self.send_reply(chat, Some(message_id), PENDING_TEXT).await;
            }
        }
    }

    /// Handles `/report <company_id> <day|week|month>` (platform admins).
    async fn handle_report(
        &self,
        chat: GroupId,
        user: &UserProfile,
        message_id: MessageId,
        args: &[String],
    ) {
        if !self.config.is_platform_admin(user.id) {
            self.send_reply(chat, Some(message_id), "❌ Only platform admins can generate reports.")
                .await;
            return;
        }
        let (company_raw, period) = match args {
            [company, period, ..] => (company, period.to_ascii_lowercase()),
            _ => {
                self.send_reply(
                    chat,
                    Some(message_id),
                    "❌ Usage: /report <company_id> <day|week|month>",
                )
                .await;
                return;
            }
        };
        let Ok(company_id) = company_raw.parse::<i64>() else {
            self.send_reply(
                chat,
                Some(message_id),
                "❌ Usage: /report <company_id> <day|week|month>",
            )
            .await;
            return;
        };
        if !matches!(period.as_str(), "day" | "week" | "month") {
            self.send_reply(chat, Some(message_id), "❌ Period must be one of: day, week, month.")
                .await;
            return;
        }
        let company = match self.store.company(CompanyId::new(company_id)) {
            Ok(Some(company)) => company,
            Ok(None) => {
                self.send_reply(
                    chat,
                    Some(message_id),
                    &format!("❌ Company {company_id} does not exist."),
                )
                .await;
                return;
            }
            Err(err) => {
                self.report_error(chat, Some(message_id), &err).await;
                return;
            }
        };
        // Rendering happens in the external report service; this surface
        // validates and acknowledges.
        tracing::info!(
            company = company.id.get(),
            period,
            timezone = self.config.report_timezone,
            week_end_day = self.config.report_week_end_day,
            "report requested"
        );
        self.send_reply(
            chat,
            Some(message_id),
            &format!(
                "⏳ Building KPI report for {} ({period})... The report will be delivered here \
                 when it is ready.",
                company.name
            ),
        )
        .await;
    }

    /// Handles `/add_group <company_id> <group_id>` (platform admins).
    async fn handle_add_group(
        &self,
        chat: GroupId,
        user: &UserProfile,
        message_id: MessageId,
        args: &[String],
    ) {
        if !self.config.is_platform_admin(user.id) {
            self.send_reply(chat, Some(message_id), "❌ You are not authorized to use this command.")
                .await;
            return;
        }
        let parsed = match args {
            [company, group, ..] => company.parse::<i64>().ok().zip(group.parse::<i64>().ok()),
            _ => None,
        };
        let Some((company_raw, group_raw)) = parsed else {
            self.send_reply(chat, Some(message_id), "❌ Usage: /add_group <company_id> <group_id>")
                .await;
            return;
        };
        let company_id = CompanyId::new(company_raw);
        let target_group = GroupId::new(group_raw);
        let company = match self.store.company(company_id) {
            Ok(Some(company)) => company,
            Ok(None) => {
                self.send_reply(
                    chat,
                    Some(message_id),
                    &format!("❌ Company {company_raw} does not exist."),
                )
                .await;
                return;
            }
            Err(err) => {
                self.report_error(chat, Some(message_id), &err).await;
                return;
            }
        };
        let group_name = self
            .store
            .membership(target_group)
            .ok()
            .flatten()
            .map_or_else(|| format!("Group_{group_raw}"), |membership| membership.group.name);
        if let Err(err) = self.store.attach_group_to_company(target_group, &group_name, company_id)
        {
            self.report_error(chat, Some(message_id), &err).await;
            return;
        }
        let activation_text = format!(
            "✅ Incident coordinator activated for {}.\nIncidents can now be reported and \
             triaged in this group.",
            company.name
        );
        let notify_result =
            match self.adapter.send(target_group, &activation_text, None, None).await {
                Ok(_) => "Notification sent to group.".to_string(),
                Err(err) => {
                    tracing::error!(group = target_group.get(), error = %err, "activation notice");
                    format!("Failed to notify group: {err}")
                }
            };
        self.send_reply(
            chat,
            Some(message_id),
            &format!(
                "Attached group {group_name} ({group_raw}) to {}.\n{notify_result}",
                company.name
            ),
        )
        .await;
    }

    /// Handles `/add_manager <company_id> <user_id> <handle>` (platform
    /// admins). Managers are tracked users with the legacy role upgraded.
    async fn handle_add_manager(
        &self,
        chat: GroupId,
        user: &UserProfile,
        message_id: MessageId,
        args: &[String],
    ) {
        if !self.config.is_platform_admin(user.id) {
            self.send_reply(chat, Some(message_id), "❌ You are not authorized to use this command.")
                .await;
            return;
        }
        let [company_raw, manager_raw, handle_parts @ ..] = args else {
            self.send_reply(
                chat,
                Some(message_id),
                "❌ Usage: /add_manager <company_id> <manager_user_id> <manager_handle>",
            )
            .await;
            return;
        };
        let handle = handle_parts.join(" ");
        let handle = handle.trim();
        let (Ok(company_raw), Ok(manager_raw)) =
            (company_raw.parse::<i64>(), manager_raw.parse::<i64>())
        else {
            self.send_reply(
                chat,
                Some(message_id),
                "❌ company_id and manager_user_id must be integers.",
            )
            .await;
            return;
        };
        if handle.is_empty() {
            self.send_reply(chat, Some(message_id), "❌ manager_handle is required.").await;
            return;
        }
        let company = match self.store.company(CompanyId::new(company_raw)) {
            Ok(Some(company)) => company,
            Ok(None) => {
                self.send_reply(
                    chat,
                    Some(message_id),
                    &format!("❌ Company {company_raw} does not exist."),
                )
                .await;
                return;
            }
            Err(err) => {
                self.report_error(chat, Some(message_id), &err).await;
                return;
            }
        };
        let mut profile = UserProfile::bare(UserId::new(manager_raw));
        profile.username = Some(handle.trim_start_matches('@').to_string());
        if let Err(err) = self.store.track_user(&profile, None, Some(GlobalRole::OpsManager)) {
            self.report_error(chat, Some(message_id), &err).await;
            return;
        }
        self.send_reply(
            chat,
            Some(message_id),
            &format!(
                "✅ Recorded manager {} (ID {manager_raw}) for {}.",
                profile.handle(),
                company.name
            ),
        )
        .await;
    }

    // ------------------------------------------------------------------
    // Callbacks
    // ------------------------------------------------------------------

    /// Dispatches an inline-button callback.
    async fn handle_callback(
        &self,
        chat: GroupId,
        user: &UserProfile,
        callback_id: &CallbackId,
        data: &str,
        message_id: MessageId,
    ) {
        tracing::info!(chat = chat.get(), user = user.id.get(), data, "callback");
        self.track(user, Some(chat));

        let action = match CallbackData::parse(data) {
            Ok(action) => action,
            Err(err) => {
                tracing::warn!(data, error = %err, "malformed callback payload");
                self.alert(callback_id, "Invalid button data").await;
                return;
            }
        };

        let membership = match self.store.membership(chat) {
            Ok(Some(membership)) if membership.is_active => membership,
            Ok(Some(_)) => {
                self.alert(callback_id, PENDING_TEXT).await;
                return;
            }
            Ok(None) => {
                self.alert(callback_id, UNREGISTERED_TEXT).await;
                return;
            }
            Err(err) => {
                self.alert(callback_id, &user_text(&err)).await;
                return;
            }
        };

        let incident = match self.store.incident(action.incident_id()) {
            Ok(Some(incident)) => incident,
            Ok(None) => {
                self.alert(callback_id, "Incident not found.").await;
                return;
            }
            Err(err) => {
                self.alert(callback_id, &user_text(&err)).await;
                return;
            }
        };
        let capabilities = match self.capability_set(&membership, &incident, user.id) {
            Ok(capabilities) => capabilities,
            Err(err) => {
                self.alert(callback_id, &user_text(&err)).await;
                return;
            }
        };

        let outcome = match &action {
            CallbackData::SelectDepartment { department_id, .. } => {
                self.run_select_department(
                    chat,
                    user,
                    callback_id,
                    message_id,
                    &incident,
                    &capabilities,
                    *department_id,
                    true,
                )
                .await
            }
            CallbackData::ReassignDepartment { department_id, .. } => {
                self.run_select_department(
                    chat,
                    user,
                    callback_id,
                    message_id,
                    &incident,
                    &capabilities,
                    *department_id,
                    false,
                )
                .await
            }
            CallbackData::ChangeDepartment { .. } => {
                self.run_change_department(chat, callback_id, message_id, &incident, &capabilities)
                    .await
            }
            CallbackData::RestoreView { .. } => {
                self.run_restore_view(chat, callback_id, message_id, &incident, &capabilities)
                    .await
            }
            CallbackData::Claim { .. } => {
                self.run_claim(chat, user, callback_id, message_id, &incident, &capabilities)
                    .await
            }
            CallbackData::Release { .. } => {
                self.run_release(chat, user, callback_id, message_id, &incident, &capabilities)
                    .await
            }
            CallbackData::Resolve { .. } => {
                self.run_resolve(chat, user, callback_id, message_id, &incident, &capabilities)
                    .await
            }
        };
        if let Err(err) = outcome {
            self.alert(callback_id, &user_text(&err)).await;
        }
    }

    /// Applies the initial selection or a confirmed transfer.
    #[allow(clippy::too_many_arguments, reason = "Callback context travels together.")]
    async fn run_select_department(
        &self,
        chat: GroupId,
        user: &UserProfile,
        callback_id: &CallbackId,
        message_id: MessageId,
        incident: &Incident,
        capabilities: &CapabilitySet,
        department: DepartmentId,
        initial: bool,
    ) -> Result<(), LifecycleError> {
        if initial {
            capabilities.require(Capability::SelectInitialDepartment)?;
        } else {
            capabilities.require(Capability::ChangeDepartment)?;
        }
        self.store.assign_department(&incident.incident_id, department, user.id)?;

        let updated = self.require_incident(&incident.incident_id)?;
        let department_name = self.department_name(department)?;
        let (text, buttons) = render::unclaimed_view(&updated, &department_name);
        self.edit_view(chat, message_id, &text, Some(&buttons), &incident.incident_id).await;
        self.answer(callback_id, if initial { "Department selected" } else { "Department updated" })
            .await;

        let handles = self.store.department_handles(department)?;
        if handles.is_empty() {
            tracing::warn!(
                incident = incident.incident_id.as_str(),
                department = department.get(),
                "no department members to ping"
            );
            return Ok(());
        }
        for ping in render::department_ping(&handles, &incident.incident_id) {
            if let Err(err) = self.adapter.send(chat, &ping, Some(message_id), None).await {
                self.log_chat_error(&incident.incident_id, &err);
            }
        }
        Ok(())
    }

    /// Replaces the pinned view with the transfer menu.
    async fn run_change_department(
        &self,
        chat: GroupId,
        callback_id: &CallbackId,
        message_id: MessageId,
        incident: &Incident,
        capabilities: &CapabilitySet,
    ) -> Result<(), LifecycleError> {
        if incident.department_id.is_none() {
            return Err(LifecycleError::StateConflict(
                "Set a department first.".to_string(),
            ));
        }
        capabilities.require(Capability::ChangeDepartment)?;
        let departments = self.store.company_departments(incident.company_id)?;
        if departments.is_empty() {
            return Err(LifecycleError::StateConflict("No departments configured.".to_string()));
        }
        let (text, buttons) = render::department_selection(
            incident,
            &departments,
            "Select a new department to transfer this issue.",
            true,
            true,
        );
        self.edit_view(chat, message_id, &text, Some(&buttons), &incident.incident_id).await;
        self.answer(callback_id, "Choose new department").await;
        Ok(())
    }

    /// Returns from the transfer menu to the live state view.
    async fn run_restore_view(
        &self,
        chat: GroupId,
        callback_id: &CallbackId,
        message_id: MessageId,
        incident: &Incident,
        capabilities: &CapabilitySet,
    ) -> Result<(), LifecycleError> {
        let Some(department) = incident.department_id else {
            return Err(LifecycleError::StateConflict("Department not set yet.".to_string()));
        };
        capabilities.require(Capability::RestoreView)?;
        let department_name = self.department_name(department)?;
        let (text, buttons) = match incident.status {
            IncidentStatus::InProgress => {
                let handles = self
                    .store
                    .active_claim_handles(&incident.incident_id, Some(department))?;
                render::claimed_view(incident, &handles, &department_name)
            }
            IncidentStatus::AwaitingClaim => render::unclaimed_view(incident, &department_name),
            IncidentStatus::AwaitingDepartment
            | IncidentStatus::AwaitingSummary
            | IncidentStatus::Resolved
            | IncidentStatus::Closed => {
                return Err(LifecycleError::StateConflict(
                    "Incident updated. Please open the latest pinned message.".to_string(),
                ));
            }
        };
        self.edit_view(chat, message_id, &text, Some(&buttons), &incident.incident_id).await;
        self.answer(callback_id, "Back to incident").await;
        Ok(())
    }

    /// Applies a claim and refreshes the in-progress view.
    async fn run_claim(
        &self,
        chat: GroupId,
        user: &UserProfile,
        callback_id: &CallbackId,
        message_id: MessageId,
        incident: &Incident,
        capabilities: &CapabilitySet,
    ) -> Result<(), LifecycleError> {
        if incident.department_id.is_none() {
            return Err(LifecycleError::StateConflict(
                "Please choose a department first.".to_string(),
            ));
        }
        capabilities.require(Capability::Claim)?;
        self.store.claim(&incident.incident_id, user.id)?;

        let updated = self.require_incident(&incident.incident_id)?;
        let department = updated.department_id;
        let handles = self.store.active_claim_handles(&incident.incident_id, department)?;
        let department_name =
            match department {
                Some(id) => self.department_name(id)?,
                None => "Department".to_string(),
            };
        let (text, buttons) = render::claimed_view(&updated, &handles, &department_name);
        self.edit_view(chat, message_id, &text, Some(&buttons), &incident.incident_id).await;
        self.answer(callback_id, "Incident claimed successfully!").await;
        Ok(())
    }

    /// Applies a release and refreshes the view for the remaining state.
    async fn run_release(
        &self,
        chat: GroupId,
        user: &UserProfile,
        callback_id: &CallbackId,
        message_id: MessageId,
        incident: &Incident,
        capabilities: &CapabilitySet,
    ) -> Result<(), LifecycleError> {
        capabilities.require(Capability::Release)?;
        self.store.release(&incident.incident_id, user.id)?;

        let updated = self.require_incident(&incident.incident_id)?;
        let department = updated.department_id;
        let department_name = match department {
            Some(id) => self.department_name(id)?,
            None => "Department".to_string(),
        };
        let handles = self.store.active_claim_handles(&incident.incident_id, department)?;
        let (text, buttons) = if updated.status == IncidentStatus::InProgress && !handles.is_empty()
        {
            render::claimed_view(&updated, &handles, &department_name)
        } else {
            render::unclaimed_view(&updated, &department_name)
        };
        self.edit_view(chat, message_id, &text, Some(&buttons), &incident.incident_id).await;
        self.answer(callback_id, "Claim released").await;
        Ok(())
    }

    /// Requests resolution and posts the summary prompt.
    async fn run_resolve(
        &self,
        chat: GroupId,
        user: &UserProfile,
        callback_id: &CallbackId,
        message_id: MessageId,
        incident: &Incident,
        capabilities: &CapabilitySet,
    ) -> Result<(), LifecycleError> {
        capabilities.require(Capability::Resolve)?;
        self.store.request_resolution(&incident.incident_id, user.id)?;

        let updated = self.require_incident(&incident.incident_id)?;
        let handle = user.handle();
        let (text, _) = render::awaiting_summary_view(&updated, &handle);
        self.edit_view(chat, message_id, &text, None, &incident.incident_id).await;

        let request = render::resolution_request(&incident.incident_id, &handle);
        if let Err(err) = self.adapter.send(chat, &request, Some(message_id), None).await {
            self.log_chat_error(&incident.incident_id, &err);
        }
        self.answer(callback_id, "Please reply to the bot's message with your summary").await;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Summary replies
    // ------------------------------------------------------------------

    /// Handles a plain message: the resolution-summary channel.
    async fn handle_message(
        &self,
        chat: GroupId,
        user: &UserProfile,
        message_id: MessageId,
        text: &str,
        reply_to: Option<InboundMessage>,
    ) {
        self.track(user, Some(chat));
        let Some(parent) = reply_to else {
            return;
        };
        // Only replies to the coordinator's own prompts are summaries.
        if self.bot_user_id.is_none() || parent.sender != self.bot_user_id {
            return;
        }
        let Some(parent_text) = parent.text.as_deref() else {
            return;
        };
        if !parent_text.to_lowercase().contains(RESOLUTION_MARKER) {
            return;
        }
        let Some(incident_id) = extract_incident_id(parent_text) else {
            tracing::warn!(chat = chat.get(), "summary reply without an extractable incident id");
            return;
        };

        let summary = text.trim();
        match self.store.resolve(&incident_id, user.id, summary) {
            Ok(()) => {
                tracing::info!(incident = incident_id.as_str(), "incident resolved");
                self.finish_resolved(chat, &incident_id, user, message_id).await;
            }
            Err(err) => {
                self.send_reply(chat, Some(message_id), &format!("❌ {}", user_text(&err))).await;
            }
        }
    }

    /// Edits and unpins the pinned view after a successful resolve.
    async fn finish_resolved(
        &self,
        chat: GroupId,
        incident_id: &IncidentId,
        user: &UserProfile,
        message_id: MessageId,
    ) {
        let Ok(Some(incident)) = self.store.incident(incident_id) else {
            self.send_reply(
                chat,
                Some(message_id),
                &format!("✅ {incident_id} has been marked as resolved!"),
            )
            .await;
            return;
        };
        let (text, _) = render::resolved_view(&incident, &user.handle());
        if let Some(pinned) = incident.pinned_message_id {
            if let Err(err) = self.adapter.edit(chat, pinned, &text, None).await {
                self.log_chat_error(incident_id, &err);
                self.send_reply(
                    chat,
                    Some(message_id),
                    &format!(
                        "✅ {incident_id} marked as resolved, but couldn't update the pinned \
                         message."
                    ),
                )
                .await;
                return;
            }
            if let Err(err) = self.adapter.unpin(chat, pinned).await {
                self.log_chat_error(incident_id, &err);
            }
        }
        self.send_reply(
            chat,
            Some(message_id),
            &format!("✅ {incident_id} has been marked as resolved!"),
        )
        .await;
    }

    // ------------------------------------------------------------------
    // Membership changes
    // ------------------------------------------------------------------

    /// Records unknown chats as pending when the coordinator is added.
    async fn handle_membership_change(
        &self,
        chat: GroupId,
        chat_title: Option<&str>,
        user: Option<&UserProfile>,
    ) {
        if let Some(inviter) = user {
            self.track(inviter, Some(chat));
        }
        match self.store.membership(chat) {
            Ok(Some(_)) => {}
            Ok(None) => {
                let name =
                    chat_title.map_or_else(|| format!("Group_{}", chat.get()), str::to_string);
                tracing::info!(chat = chat.get(), name, "recording pending group");
                // Activation itself happens in the dashboard; the row makes
                // the group visible there.
                let result = self.store.record_pending_group(
                    chat,
                    &name,
                    None,
                    user.map(|inviter| inviter.id),
                    user.map(UserProfile::handle).as_deref(),
                    None,
                );
                if let Err(err) = result {
                    tracing::error!(chat = chat.get(), error = %err, "pending group record");
                }
            }
            Err(err) => {
                tracing::error!(chat = chat.get(), error = %err, "membership lookup");
            }
        }
    }

    // ------------------------------------------------------------------
    // Shared helpers
    // ------------------------------------------------------------------

    /// Tracks the interacting user; tracking failures only log.
    fn track(&self, user: &UserProfile, group: Option<GroupId>) {
        if let Err(err) = self.store.track_user(user, group, None) {
            tracing::error!(user = user.id.get(), error = %err, "user tracking");
        }
    }

    /// Resolves the capability set for one (membership, incident, user).
    fn capability_set(
        &self,
        membership: &Membership,
        incident: &Incident,
        user: UserId,
    ) -> Result<CapabilitySet, LifecycleError> {
        let member = match incident.department_id {
            Some(department) => self.store.is_department_member(department, user)?,
            None => false,
        };
        Ok(CapabilitySet::resolve(RoleContext::from_snapshot(
            membership, incident, user, member,
        )))
    }

    /// Reads a fresh incident snapshot after a mutation.
    fn require_incident(&self, incident: &IncidentId) -> Result<Incident, LifecycleError> {
        self.store
            .incident(incident)?
            .ok_or_else(|| LifecycleError::NotFound("Incident not found.".to_string()))
    }

    /// Resolves a department's display name.
    fn department_name(
        &self,
        department: DepartmentId,
    ) -> Result<String, LifecycleError> {
        Ok(self
            .store
            .department(department)?
            .map_or_else(|| "Department".to_string(), |record| record.name))
    }

    /// Edits the state view; chat failures only log.
    async fn edit_view(
        &self,
        chat: GroupId,
        message: MessageId,
        text: &str,
        buttons: Option<&ButtonRows>,
        incident: &IncidentId,
    ) {
        if let Err(err) = self.adapter.edit(chat, message, text, buttons).await {
            self.log_chat_error(incident, &err);
        }
    }

    /// Acknowledges a callback with a toast; failures only log.
    async fn answer(&self, callback_id: &CallbackId, text: &str) {
        if let Err(err) = self.adapter.answer_callback(callback_id, text, false).await {
            tracing::warn!(error = %err, "callback answer");
        }
    }

    /// Acknowledges a callback with an alert popup; failures only log.
    async fn alert(&self, callback_id: &CallbackId, text: &str) {
        if let Err(err) = self.adapter.answer_callback(callback_id, text, true).await {
            tracing::warn!(error = %err, "callback alert");
        }
    }

    /// Sends a reply; failures only log.
    async fn send_reply(&self, chat: GroupId, reply_to: Option<MessageId>, text: &str) {
        if let Err(err) = self.adapter.send(chat, text, reply_to, None).await {
            tracing::warn!(chat = chat.get(), error = %err, "reply send");
        }
    }

    /// Surfaces a lifecycle error on the command path.
    async fn report_error(
        &self,
        chat: GroupId,
        reply_to: Option<MessageId>,
        error: &LifecycleError,
    ) {
        match error {
            LifecycleError::Storage(message) => {
                tracing::error!(error = message, "storage failure");
            }
            other => {
                tracing::warn!(kind = other.kind(), error = %other, "rejected operation");
            }
        }
        self.send_reply(chat, reply_to, &format!("❌ {}", user_text(error))).await;
    }

    /// Logs a chat failure tied to an incident.
    fn log_chat_error(&self, incident: &IncidentId, error: &ChatError) {
        tracing::error!(
            incident = incident.as_str(),
            kind = error.kind(),
            error = %error,
            "chat transport failure"
        );
    }
}

// ============================================================================
// SECTION: Free Helpers
// ============================================================================

/// Maps a lifecycle error to its user-facing text.
fn user_text(error: &LifecycleError) -> String {
    match error {
        LifecycleError::Storage(_) => "An error occurred. Please try again.".to_string(),
        other => other.to_string(),
    }
}

/// Extracts the incident id from a summary-prompt message.
///
/// Prefers a literal `ID:` line; falls back to the first legacy ticket id or
/// 4+ digit group anywhere in the text.
#[must_use]
pub fn extract_incident_id(text: &str) -> Option<IncidentId> {
    for line in text.lines() {
        let lowered = line.trim_start();
        if lowered.len() >= 3 && lowered[.. 3].eq_ignore_ascii_case("id:") {
            let value = lowered[3 ..].trim().trim_matches(|ch| ch == '.' || ch == ',');
            if !value.is_empty() {
                return Some(IncidentId::new(value));
            }
        }
    }
    INCIDENT_ID_PATTERN
        .find(text)
        .map(|found| IncidentId::new(found.as_str().trim_end_matches(['.', ','])))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
