// crates/triage-desk-core/src/core/directory.rs
// ============================================================================
// Module: Tenant Directory Model
// Description: Companies, groups, departments, users, and membership views.
// Purpose: Define the role-model records the resolver and router consult.
// Dependencies: crate::core::identifiers, serde
// ============================================================================

//! ## Overview
//! Directory records for the company/department/group role model. Department
//! membership is the authoritative capability source; the legacy global role
//! vocabulary survives as a derived, read-only field that only upgrades
//! monotonically.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::CompanyId;
use crate::core::identifiers::DepartmentId;
use crate::core::identifiers::GroupId;
use crate::core::identifiers::MessageId;
use crate::core::identifiers::UserId;

// ============================================================================
// SECTION: Company
// ============================================================================

/// A tenant owning departments and groups.
///
/// # Invariants
/// - `name` is unique within the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    /// Company identifier.
    pub id: CompanyId,
    /// Unique company name.
    pub name: String,
}

// ============================================================================
// SECTION: Group
// ============================================================================

/// Group activation status.
///
/// # Invariants
/// - Storage labels are stable; pending groups reject lifecycle operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    /// Registration recorded; not yet attached to a company.
    Pending,
    /// Attached to a company and accepting incidents.
    Active,
}

impl GroupStatus {
    /// Returns the stable storage label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
        }
    }

    /// Parses a stored status label.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "active" => Some(Self::Active),
            _ => None,
        }
    }
}

/// One chat channel attached to (at most) one company.
///
/// # Invariants
/// - `company_id` is `Some` for active groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Group identifier (platform chat id).
    pub id: GroupId,
    /// Group display name.
    pub name: String,
    /// Owning company, once attached.
    pub company_id: Option<CompanyId>,
    /// Activation status.
    pub status: GroupStatus,
    /// Registration prompt message, for pending groups.
    pub registration_message_id: Option<MessageId>,
    /// User who requested activation.
    pub requested_by_user_id: Option<UserId>,
    /// Handle of the requesting user.
    pub requested_by_handle: Option<String>,
    /// Company name supplied with the activation request.
    pub requested_company_name: Option<String>,
}

// ============================================================================
// SECTION: Department
// ============================================================================

/// A named work queue inside a company.
///
/// # Invariants
/// - `name` is unique within its company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    /// Department identifier.
    pub id: DepartmentId,
    /// Owning company.
    pub company_id: CompanyId,
    /// Department name, unique per company.
    pub name: String,
    /// Restricts transfers out of this department to its members.
    pub restricted_to_department_members: bool,
}

// ============================================================================
// SECTION: User
// ============================================================================

/// Legacy global role vocabulary, derived and read-only.
///
/// # Invariants
/// - Ranks only ever upgrade; department membership is authoritative for
///   capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GlobalRole {
    /// Field worker reporting problems.
    Driver,
    /// First-line responder.
    Dispatcher,
    /// Operations manager.
    OpsManager,
}

impl GlobalRole {
    /// Returns the stable storage label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Driver => "Driver",
            Self::Dispatcher => "Dispatcher",
            Self::OpsManager => "OpsManager",
        }
    }

    /// Parses a stored role label.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Driver" => Some(Self::Driver),
            "Dispatcher" => Some(Self::Dispatcher),
            "OpsManager" => Some(Self::OpsManager),
            _ => None,
        }
    }

    /// Returns the comparison rank (higher is more privileged).
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Driver => 1,
            Self::Dispatcher => 2,
            Self::OpsManager => 3,
        }
    }
}

/// A tracked platform user.
///
/// # Invariants
/// - `handle` always carries the `@` prefix or the `User_<id>` fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User identifier.
    pub id: UserId,
    /// Normalized handle.
    pub handle: String,
    /// Raw platform username, when set.
    pub username: Option<String>,
    /// First name.
    pub first_name: Option<String>,
    /// Last name.
    pub last_name: Option<String>,
    /// Language code reported by the platform.
    pub language_code: Option<String>,
    /// Whether the account is a bot.
    pub is_bot: bool,
    /// Legacy global role, derived and read-only.
    pub global_role: Option<GlobalRole>,
}

/// Profile fields captured from an inbound chat interaction.
///
/// # Invariants
/// - Field contents come verbatim from the platform payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// User identifier.
    pub id: UserId,
    /// Raw platform username, when set.
    pub username: Option<String>,
    /// First name.
    pub first_name: Option<String>,
    /// Last name.
    pub last_name: Option<String>,
    /// Language code reported by the platform.
    pub language_code: Option<String>,
    /// Whether the account is a bot.
    pub is_bot: bool,
}

impl UserProfile {
    /// Builds a minimal profile from just a user id.
    #[must_use]
    pub const fn bare(id: UserId) -> Self {
        Self {
            id,
            username: None,
            first_name: None,
            last_name: None,
            language_code: None,
            is_bot: false,
        }
    }

    /// Returns the normalized handle for this profile.
    #[must_use]
    pub fn handle(&self) -> String {
        normalize_handle(self.username.as_deref(), self.id)
    }
}

/// Normalizes a platform username into a display handle.
///
/// Handles always carry the `@` prefix; users without a username fall back
/// to `User_<id>`.
#[must_use]
pub fn normalize_handle(username: Option<&str>, user_id: UserId) -> String {
    match username {
        Some(name) if name.starts_with('@') => name.to_string(),
        Some(name) if !name.is_empty() => format!("@{name}"),
        _ => format!("User_{user_id}"),
    }
}

// ============================================================================
// SECTION: Membership
// ============================================================================

/// Combined group and company view for one chat.
///
/// # Invariants
/// - `is_active` is true exactly when the group status is `Active`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    /// The group record.
    pub group: Group,
    /// The owning company, when attached.
    pub company: Option<Company>,
    /// Whether the group accepts lifecycle operations.
    pub is_active: bool,
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
