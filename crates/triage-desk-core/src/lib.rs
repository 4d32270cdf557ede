// crates/triage-desk-core/src/lib.rs
// ============================================================================
// Module: Triage Desk Core
// Description: Domain model, transition rules, and contract surfaces for the
//              incident triage coordinator.
// Purpose: Provide backend-agnostic building blocks shared by the store,
//          router, and scheduler crates.
// Dependencies: async-trait, serde, serde_json, thiserror, time
// ============================================================================

//! ## Overview
//! `triage-desk-core` defines the incident domain: identifiers, timestamps,
//! the incident/claim/participant data model, the pure message renderer, the
//! role resolver, and the lifecycle transition rules. It also declares the
//! two contract surfaces the rest of the workspace plugs into: the
//! [`TriageStore`] persistence trait and the [`ChatAdapter`] transport trait.
//!
//! The crate performs no I/O. All storage and chat effects live behind the
//! contract traits so lifecycle semantics stay testable in isolation.

pub mod core;
pub mod interfaces;
pub mod runtime;

pub use crate::core::directory::Company;
pub use crate::core::directory::Department;
pub use crate::core::directory::GlobalRole;
pub use crate::core::directory::Group;
pub use crate::core::directory::GroupStatus;
pub use crate::core::directory::Membership;
pub use crate::core::directory::User;
pub use crate::core::directory::UserProfile;
pub use crate::core::directory::normalize_handle;
pub use crate::core::identifiers::CallbackId;
pub use crate::core::identifiers::CompanyId;
pub use crate::core::identifiers::DepartmentId;
pub use crate::core::identifiers::GroupId;
pub use crate::core::identifiers::IncidentId;
pub use crate::core::identifiers::MessageId;
pub use crate::core::identifiers::UserId;
pub use crate::core::incident::Claim;
pub use crate::core::incident::DepartmentSession;
pub use crate::core::incident::EventKind;
pub use crate::core::incident::Incident;
pub use crate::core::incident::IncidentEvent;
pub use crate::core::incident::IncidentStatus;
pub use crate::core::incident::Notification;
pub use crate::core::incident::NotificationKind;
pub use crate::core::incident::NotificationStatus;
pub use crate::core::incident::Participant;
pub use crate::core::incident::ParticipantStatus;
pub use crate::core::incident::SessionStatus;
pub use crate::core::render;
pub use crate::core::render::Button;
pub use crate::core::render::ButtonRows;
pub use crate::core::render::CallbackData;
pub use crate::core::render::CallbackParseError;
pub use crate::core::time::Clock;
pub use crate::core::time::ManualClock;
pub use crate::core::time::SystemClock;
pub use crate::core::time::TimeError;
pub use crate::core::time::Timestamp;
pub use crate::interfaces::ChatAdapter;
pub use crate::interfaces::ChatError;
pub use crate::interfaces::ChatEvent;
pub use crate::interfaces::InboundMessage;
pub use crate::interfaces::LifecycleError;
pub use crate::interfaces::TriageStore;
pub use crate::runtime::roles;
pub use crate::runtime::roles::CapabilitySet;
pub use crate::runtime::roles::RoleContext;
pub use crate::runtime::transitions;
