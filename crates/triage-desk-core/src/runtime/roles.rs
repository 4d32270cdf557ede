// crates/triage-desk-core/src/runtime/roles.rs
// ============================================================================
// Module: Role Resolver
// Description: Capability computation from the group/department role model.
// Purpose: Decide which lifecycle operations a user may attempt.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Capabilities derive from three facts: the group's activation status, the
//! reporter identity, and membership of the incident's current department.
//! Department membership is authoritative; legacy global roles play no part.
//! The router consults the resolved [`CapabilitySet`] before calling any
//! lifecycle mutation, so a denial never reaches the store.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::directory::Membership;
use crate::core::identifiers::UserId;
use crate::core::incident::Incident;
use crate::interfaces::LifecycleError;

// ============================================================================
// SECTION: Capabilities
// ============================================================================

/// One lifecycle capability a user may hold on an incident.
///
/// # Invariants
/// - Variants are stable for logging denial reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Perform the initial department selection.
    SelectInitialDepartment,
    /// Join the incident.
    Claim,
    /// Leave the incident.
    Release,
    /// Request resolution.
    Resolve,
    /// Open the transfer menu and confirm a transfer.
    ChangeDepartment,
    /// Return from the transfer menu to the live view.
    RestoreView,
}

impl Capability {
    /// Returns the user-facing denial message for this capability.
    #[must_use]
    pub const fn denial_message(self) -> &'static str {
        match self {
            Self::SelectInitialDepartment => "Only the reporter can choose the department.",
            Self::Claim | Self::Release | Self::Resolve | Self::RestoreView => {
                "You are not a member of this department."
            }
            Self::ChangeDepartment => {
                "Only members of the current department can transfer this issue."
            }
        }
    }
}

// ============================================================================
// SECTION: Role Context
// ============================================================================

/// Facts the resolver needs about one (group, user, incident) triple.
///
/// # Invariants
/// - `member_of_current_department` refers to the incident's currently
///   assigned department, not any department of the company.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleContext {
    /// Whether the group is active.
    pub group_active: bool,
    /// Whether the user reported the incident.
    pub is_reporter: bool,
    /// Whether the incident has a department assigned.
    pub department_assigned: bool,
    /// Whether the user belongs to the assigned department.
    pub member_of_current_department: bool,
}

impl RoleContext {
    /// Builds a context from the membership view and incident snapshot.
    #[must_use]
    pub const fn from_snapshot(
        membership: &Membership,
        incident: &Incident,
        user: UserId,
        member_of_current_department: bool,
    ) -> Self {
        Self {
            group_active: membership.is_active,
            is_reporter: incident.created_by_id.get() == user.get(),
            department_assigned: incident.department_id.is_some(),
            member_of_current_department,
        }
    }
}

// ============================================================================
// SECTION: Capability Set
// ============================================================================

/// Resolved capability set for one (group, user, incident) triple.
///
/// # Invariants
/// - An inactive group yields the empty set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilitySet {
    /// Context the set was resolved from.
    context: RoleContext,
}

impl CapabilitySet {
    /// Resolves the capability set from a role context.
    #[must_use]
    pub const fn resolve(context: RoleContext) -> Self {
        Self { context }
    }

    /// Returns true when the user holds the capability.
    #[must_use]
    pub const fn allows(&self, capability: Capability) -> bool {
        if !self.context.group_active {
            return false;
        }
        match capability {
            Capability::SelectInitialDepartment => self.context.is_reporter,
            Capability::Claim
            | Capability::Release
            | Capability::Resolve
            | Capability::ChangeDepartment
            | Capability::RestoreView => {
                self.context.department_assigned && self.context.member_of_current_department
            }
        }
    }

    /// Requires the capability, yielding the user-facing denial otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::PermissionDenied`] with the capability's
    /// denial message.
    pub fn require(&self, capability: Capability) -> Result<(), LifecycleError> {
        if self.allows(capability) {
            Ok(())
        } else if !self.context.group_active {
            Err(LifecycleError::PermissionDenied(
                "This group is not active yet.".to_string(),
            ))
        } else {
            Err(LifecycleError::PermissionDenied(capability.denial_message().to_string()))
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
