// crates/triage-desk-service/src/adapter.rs
// ============================================================================
// Module: Console Chat Adapter
// Description: Tracing-backed ChatAdapter used headless and in tests.
// Purpose: Stand in for the platform transport where none is wired.
// Dependencies: async-trait, tracing, triage-desk-core
// ============================================================================

//! ## Overview
//! The production transport lives in a separate crate implementing
//! [`ChatAdapter`] against the chat platform's API. This adapter satisfies
//! the same contract by logging every outbound effect and minting local
//! message ids, which lets the scheduler and notification drain run in a
//! headless deployment and keeps wiring code testable.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use triage_desk_core::ButtonRows;
use triage_desk_core::CallbackId;
use triage_desk_core::ChatAdapter;
use triage_desk_core::ChatError;
use triage_desk_core::GroupId;
use triage_desk_core::MessageId;

// ============================================================================
// SECTION: Adapter
// ============================================================================

/// Chat adapter that logs outbound traffic instead of delivering it.
///
/// # Invariants
/// - Minted message ids are unique within the process lifetime.
#[derive(Debug)]
pub struct ConsoleChatAdapter {
    /// Monotonic counter backing minted message ids.
    next_message_id: AtomicI64,
}

impl ConsoleChatAdapter {
    /// Creates a console adapter.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next_message_id: AtomicI64::new(1),
        }
    }
}

impl Default for ConsoleChatAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatAdapter for ConsoleChatAdapter {
    async fn send(
        &self,
        group: GroupId,
        text: &str,
        reply_to: Option<MessageId>,
        buttons: Option<&ButtonRows>,
    ) -> Result<MessageId, ChatError> {
        let message_id = MessageId::new(self.next_message_id.fetch_add(1, Ordering::Relaxed));
        tracing::info!(
            group = group.get(),
            message = message_id.get(),
            reply_to = reply_to.map(MessageId::get),
            buttons = buttons.map_or(0, Vec::len),
            text,
            "chat send"
        );
        Ok(message_id)
    }

    async fn edit(
        &self,
        group: GroupId,
        message: MessageId,
        text: &str,
        buttons: Option<&ButtonRows>,
    ) -> Result<(), ChatError> {
        tracing::info!(
            group = group.get(),
            message = message.get(),
            buttons = buttons.map_or(0, Vec::len),
            text,
            "chat edit"
        );
        Ok(())
    }

    async fn pin(&self, group: GroupId, message: MessageId) -> Result<(), ChatError> {
        tracing::info!(group = group.get(), message = message.get(), "chat pin");
        Ok(())
    }

    async fn unpin(&self, group: GroupId, message: MessageId) -> Result<(), ChatError> {
        tracing::info!(group = group.get(), message = message.get(), "chat unpin");
        Ok(())
    }

    async fn answer_callback(
        &self,
        callback: &CallbackId,
        text: &str,
        alert: bool,
    ) -> Result<(), ChatError> {
        tracing::debug!(callback = callback.as_str(), alert, text, "chat callback answer");
        Ok(())
    }
}
