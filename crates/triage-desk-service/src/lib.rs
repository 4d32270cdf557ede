// crates/triage-desk-service/src/lib.rs
// ============================================================================
// Module: Triage Desk Service
// Description: Router, scheduler, notification drain, and console adapter.
// Purpose: Turn inbound chat traffic into lifecycle operations and drive the
//          SLA timers.
// Dependencies: async-trait, regex, serde_json, tokio, tracing,
//               triage-desk-config, triage-desk-core, triage-desk-store-sqlite
// ============================================================================

//! ## Overview
//! The service crate wires the lifecycle core to a chat transport. The
//! [`router::Router`] consumes decoded [`triage_desk_core::ChatEvent`]s,
//! enforces capabilities, applies lifecycle operations through the store,
//! and keeps the pinned state view current. The [`scheduler::Scheduler`]
//! runs the periodic SLA loop: unclaimed nudges, summary timeouts, and the
//! notification drain. Both are generic over the [`triage_desk_core::ChatAdapter`]
//! transport; [`adapter::ConsoleChatAdapter`] is the tracing-backed stand-in
//! used by the headless binary and tests.

pub mod adapter;
pub mod notifications;
pub mod router;
pub mod scheduler;
