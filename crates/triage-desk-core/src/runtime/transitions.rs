// crates/triage-desk-core/src/runtime/transitions.rs
// ============================================================================
// Module: Transition Rules
// Description: Precondition checks and accrual math for lifecycle mutations.
// Purpose: Keep the transition table in one pure, testable place.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! The store evaluates these rules against rows read inside its write
//! transaction. Every rule returns the typed [`LifecycleError`] the router
//! surfaces verbatim, so precondition failures carry user-presentable text
//! and leave storage untouched.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::identifiers::DepartmentId;
use crate::core::identifiers::UserId;
use crate::core::incident::EventKind;
use crate::core::incident::IncidentStatus;
use crate::core::time::Timestamp;
use crate::interfaces::LifecycleError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Minimum incident description length in characters.
pub const MIN_DESCRIPTION_CHARS: usize = 5;
/// Maximum incident description length in characters.
pub const MAX_DESCRIPTION_CHARS: usize = 3000;

// ============================================================================
// SECTION: Precondition Rules
// ============================================================================

/// Validates the incident description length.
///
/// # Errors
///
/// Returns [`LifecycleError::Validation`] outside the 5 to 3000 character
/// range.
pub fn ensure_description(description: &str) -> Result<(), LifecycleError> {
    let length = description.chars().count();
    if length < MIN_DESCRIPTION_CHARS {
        return Err(LifecycleError::Validation(format!(
            "Description too short. Please provide more details (at least \
             {MIN_DESCRIPTION_CHARS} characters)."
        )));
    }
    if length > MAX_DESCRIPTION_CHARS {
        return Err(LifecycleError::Validation(format!(
            "Description too long. Maximum {MAX_DESCRIPTION_CHARS} characters allowed."
        )));
    }
    Ok(())
}

/// Validates that a department can be assigned in the current status.
///
/// # Errors
///
/// Returns [`LifecycleError::StateConflict`] outside
/// `Awaiting_Department`, `Awaiting_Claim`, and `In_Progress`.
pub fn ensure_assignable(status: IncidentStatus) -> Result<(), LifecycleError> {
    match status {
        IncidentStatus::AwaitingDepartment
        | IncidentStatus::AwaitingClaim
        | IncidentStatus::InProgress => Ok(()),
        IncidentStatus::AwaitingSummary | IncidentStatus::Resolved | IncidentStatus::Closed => {
            Err(LifecycleError::StateConflict(
                "This incident cannot be moved to another department right now.".to_string(),
            ))
        }
    }
}

/// Validates a claim attempt.
///
/// # Errors
///
/// Returns [`LifecycleError::StateConflict`] when the status forbids
/// claims, no department is assigned, or the user already holds an active
/// claim.
pub fn ensure_claimable(
    status: IncidentStatus,
    department: Option<DepartmentId>,
    user_has_active_claim: bool,
) -> Result<(), LifecycleError> {
    if !status.accepts_claims() {
        return Err(LifecycleError::StateConflict(
            "This incident cannot be claimed right now.".to_string(),
        ));
    }
    if department.is_none() {
        return Err(LifecycleError::StateConflict(
            "Please choose a department first.".to_string(),
        ));
    }
    if user_has_active_claim {
        return Err(LifecycleError::StateConflict(
            "You are already working on this incident.".to_string(),
        ));
    }
    Ok(())
}

/// Validates a release attempt.
///
/// # Errors
///
/// Returns [`LifecycleError::StateConflict`] when the status forbids
/// release or the user holds no active claim.
pub fn ensure_releasable(
    status: IncidentStatus,
    user_has_active_claim: bool,
) -> Result<(), LifecycleError> {
    if !status.accepts_claims() {
        return Err(LifecycleError::StateConflict(
            "You cannot release this claim right now.".to_string(),
        ));
    }
    if !user_has_active_claim {
        return Err(LifecycleError::StateConflict(
            "You do not have an active claim on this incident.".to_string(),
        ));
    }
    Ok(())
}

/// Validates a resolution request.
///
/// # Errors
///
/// Returns [`LifecycleError::StateConflict`] outside `In_Progress` or
/// without an active claim held by the user.
pub fn ensure_resolution_requestable(
    status: IncidentStatus,
    user_has_active_claim: bool,
) -> Result<(), LifecycleError> {
    if status != IncidentStatus::InProgress || !user_has_active_claim {
        return Err(LifecycleError::StateConflict(
            "You cannot resolve this incident.".to_string(),
        ));
    }
    Ok(())
}

/// Validates a resolve attempt with a summary.
///
/// # Errors
///
/// Returns [`LifecycleError::StateConflict`] outside `Awaiting_Summary`,
/// [`LifecycleError::PermissionDenied`] when the user is not the pending
/// resolver, and [`LifecycleError::Validation`] for an empty summary.
pub fn ensure_resolvable(
    status: IncidentStatus,
    pending_user: Option<UserId>,
    user: UserId,
    summary: &str,
) -> Result<(), LifecycleError> {
    if status != IncidentStatus::AwaitingSummary {
        return Err(LifecycleError::StateConflict(
            "This incident is not awaiting a summary.".to_string(),
        ));
    }
    if pending_user != Some(user) {
        return Err(LifecycleError::PermissionDenied(
            "You are not authorized to resolve this incident. It's waiting for a summary from \
             another user."
                .to_string(),
        ));
    }
    if summary.trim().is_empty() {
        return Err(LifecycleError::Validation(
            "Resolution summary must not be empty.".to_string(),
        ));
    }
    Ok(())
}

/// Validates a scheduler auto-close.
///
/// # Errors
///
/// Returns [`LifecycleError::StateConflict`] outside `Awaiting_Summary`.
pub fn ensure_auto_closable(status: IncidentStatus) -> Result<(), LifecycleError> {
    if status != IncidentStatus::AwaitingSummary {
        return Err(LifecycleError::StateConflict(
            "This incident is no longer awaiting a summary.".to_string(),
        ));
    }
    Ok(())
}

// ============================================================================
// SECTION: Derived Values
// ============================================================================

/// Returns the accrual term for one active span in whole seconds.
///
/// Negative deltas clamp to zero to defend against clock skew observed
/// across a storage restore.
#[must_use]
pub fn accrued_seconds(active_since: Timestamp, end: Timestamp) -> u64 {
    end.seconds_since(active_since)
}

/// Returns the incident status after a release leaves `remaining_active`
/// claims.
#[must_use]
pub const fn status_after_release(
    status: IncidentStatus,
    remaining_active: usize,
) -> IncidentStatus {
    if remaining_active == 0 && !matches!(status, IncidentStatus::AwaitingSummary) {
        IncidentStatus::AwaitingClaim
    } else {
        status
    }
}

// ============================================================================
// SECTION: Event Grammar
// ============================================================================

/// Checks an incident's event sequence against the state grammar.
///
/// `create (department_assigned (claim | release)* (resolution_requested
/// (resolve | auto_closed))?)*`, with further `department_assigned`
/// interleavings. Used by integrity checks and tests; replays the status
/// machine with an active-claim counter.
#[must_use]
pub fn event_sequence_is_valid(kinds: &[EventKind]) -> bool {
    let Some((&EventKind::Create, rest)) = kinds.split_first() else {
        return false;
    };
    let mut status = IncidentStatus::AwaitingDepartment;
    let mut active_claims = 0_usize;
    for kind in rest {
        match kind {
            EventKind::Create => return false,
            EventKind::DepartmentAssigned => {
                if ensure_assignable(status).is_err() {
                    return false;
                }
                status = IncidentStatus::AwaitingClaim;
                active_claims = 0;
            }
            EventKind::Claim => {
                if !status.accepts_claims() {
                    return false;
                }
                status = IncidentStatus::InProgress;
                active_claims += 1;
            }
            EventKind::Release => {
                if !status.accepts_claims() || active_claims == 0 {
                    return false;
                }
                active_claims -= 1;
                status = status_after_release(status, active_claims);
            }
            EventKind::ResolutionRequested => {
                if status != IncidentStatus::InProgress || active_claims == 0 {
                    return false;
                }
                status = IncidentStatus::AwaitingSummary;
            }
            EventKind::Resolve | EventKind::AutoClosed => {
                if status != IncidentStatus::AwaitingSummary {
                    return false;
                }
                status = if matches!(kind, EventKind::Resolve) {
                    IncidentStatus::Resolved
                } else {
                    IncidentStatus::Closed
                };
                active_claims = 0;
            }
        }
    }
    true
}

// ============================================================================
// SECTION: Tests
// ============================================================================
