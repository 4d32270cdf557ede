// crates/triage-desk-service/src/notifications.rs
// ============================================================================
// Module: Notification Drain
// Description: Renders and delivers queued cross-process notifications.
// Purpose: Bridge dashboard-side decisions (approvals, denials) into chat.
// Dependencies: serde_json, tracing, triage-desk-core
// ============================================================================

//! ## Overview
//! External writers (the company dashboard) queue notification rows; the
//! scheduler drains them here. Rows with chat-facing text are sent to their
//! group and marked `sent`/`failed`. Rows that are signals for other
//! consumers (pending-activation markers) carry no chat text and are marked
//! `sent` without delivery.

// ============================================================================
// SECTION: Imports
// ============================================================================

use triage_desk_core::ChatAdapter;
use triage_desk_core::LifecycleError;
use triage_desk_core::Notification;
use triage_desk_core::NotificationKind;
use triage_desk_core::TriageStore;

// ============================================================================
// SECTION: Rendering
// ============================================================================

/// Renders the chat text for a notification, if it has one.
#[must_use]
pub fn build_message(notification: &Notification) -> Option<String> {
    let company_name = notification
        .payload
        .get("company_name")
        .and_then(serde_json::Value::as_str)
        .unwrap_or("the company");
    match notification.kind {
        NotificationKind::GroupApproved => Some(format!(
            "✅ <b>Group Approved!</b>\n\nGreat news! This group has been approved and activated \
             for <b>{company_name}</b>.\n\n🎉 The incident coordinator is now fully active in \
             this group.\n📊 You can start creating incidents with /new_issue\n❓ Get help with \
             /help"
        )),
        NotificationKind::GroupDenied => Some(format!(
            "❌ <b>Join Request Denied</b>\n\nThe join request for <b>{company_name}</b> has \
             been denied.\n\nIf you believe this was a mistake, please contact your company \
             administrator or request to join again with the correct company name."
        )),
        // Pending-activation rows are markers for the dashboard, not chat
        // messages.
        NotificationKind::GroupPendingActivation => None,
    }
}

// ============================================================================
// SECTION: Drain
// ============================================================================

/// Delivers every pending notification once.
///
/// Delivery failures mark the row `failed` and never abort the drain.
///
/// # Errors
///
/// Returns [`LifecycleError::Storage`] when the queue itself cannot be read.
pub async fn drain<S: TriageStore, A: ChatAdapter>(
    store: &S,
    adapter: &A,
) -> Result<usize, LifecycleError> {
    let pending = store.pending_notifications()?;
    let mut delivered = 0_usize;
    for notification in pending {
        match build_message(&notification) {
            Some(text) => {
                match adapter.send(notification.group_id, &text, None, None).await {
                    Ok(_) => {
                        store.mark_notification_sent(notification.id)?;
                        delivered += 1;
                    }
                    Err(err) => {
                        tracing::error!(
                            notification = notification.id,
                            group = notification.group_id.get(),
                            error = %err,
                            "notification delivery failed"
                        );
                        store.mark_notification_failed(notification.id, &err.to_string())?;
                    }
                }
            }
            None => {
                store.mark_notification_sent(notification.id)?;
            }
        }
    }
    Ok(delivered)
}
