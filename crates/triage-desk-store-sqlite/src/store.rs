// crates/triage-desk-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Triage Store
// Description: Durable TriageStore backed by SQLite WAL.
// Purpose: Execute lifecycle mutations atomically under a single writer lock.
// Dependencies: rusqlite, serde, serde_json, thiserror, triage-desk-core
// ============================================================================

//! ## Overview
//! This module implements the [`TriageStore`] contract using SQLite. Every
//! mutation acquires the process-wide writer mutex, opens one transaction,
//! re-reads the rows it depends on, validates the transition rules from
//! `triage_desk_core::transitions`, applies the effects, and appends the
//! event log; all of it commits or rolls back together. Reads run against
//! a round-robin pool of WAL connections without the writer lock.
//!
//! On open the store creates missing tables, upgrades older departmental
//! schemas in place, rebuilds legacy tier-based databases into the
//! department model, and seeds default departments for companies that have
//! none.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::Transaction;
use rusqlite::params;
use serde::Deserialize;
use thiserror::Error;
use triage_desk_core::Claim;
use triage_desk_core::Clock;
use triage_desk_core::Company;
use triage_desk_core::CompanyId;
use triage_desk_core::Department;
use triage_desk_core::DepartmentId;
use triage_desk_core::DepartmentSession;
use triage_desk_core::EventKind;
use triage_desk_core::GlobalRole;
use triage_desk_core::Group;
use triage_desk_core::GroupId;
use triage_desk_core::GroupStatus;
use triage_desk_core::Incident;
use triage_desk_core::IncidentEvent;
use triage_desk_core::IncidentId;
use triage_desk_core::IncidentStatus;
use triage_desk_core::LifecycleError;
use triage_desk_core::Membership;
use triage_desk_core::MessageId;
use triage_desk_core::Notification;
use triage_desk_core::NotificationKind;
use triage_desk_core::NotificationStatus;
use triage_desk_core::Participant;
use triage_desk_core::ParticipantStatus;
use triage_desk_core::SessionStatus;
use triage_desk_core::SystemClock;
use triage_desk_core::Timestamp;
use triage_desk_core::TriageStore;
use triage_desk_core::User;
use triage_desk_core::UserId;
use triage_desk_core::UserProfile;
use triage_desk_core::transitions;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// SQLite schema version for the department model.
const SCHEMA_VERSION: i64 = 2;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Department names seeded for companies that have none.
const DEFAULT_DEPARTMENT_NAMES: [&str; 2] = ["Dispatchers", "Operations"];

/// Column list for incident row reads, matching [`read_incident_row`].
const INCIDENT_COLUMNS: &str = "id, group_id, company_id, created_by_id, created_by_handle, \
                                description, pinned_message_id, source_message_id, \
                                department_id, status, pending_resolution_by_user_id, \
                                resolved_by_user_id, resolution_summary, t_created, \
                                t_department_assigned, t_first_claimed, t_last_claimed, \
                                t_resolution_requested, t_resolved";

// ============================================================================
// SECTION: Config
// ============================================================================

/// SQLite journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to SQLite `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteJournalMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteJournalMode {
    /// Returns the SQLite pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// SQLite sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to SQLite `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the SQLite pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the SQLite triage store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
/// - `read_pool_size` must be greater than zero.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the SQLite database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// SQLite journal mode.
    #[serde(default)]
    pub journal_mode: SqliteJournalMode,
    /// SQLite sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
    /// Number of read-only connections used for read path isolation.
    #[serde(default = "default_read_pool_size")]
    pub read_pool_size: usize,
}

impl SqliteStoreConfig {
    /// Builds a configuration with defaults for everything but the path.
    #[must_use]
    pub fn for_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: default_busy_timeout_ms(),
            journal_mode: SqliteJournalMode::default(),
            sync_mode: SqliteSyncMode::default(),
            read_pool_size: default_read_pool_size(),
        }
    }
}

/// Returns the default busy timeout for SQLite connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Returns the default read connection pool size.
const fn default_read_pool_size() -> usize {
    4
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// SQLite store open/configuration errors.
///
/// # Invariants
/// - Error messages avoid embedding row contents.
#[derive(Debug, Error, Clone)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// SQLite engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Invalid store configuration or data.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
}

impl From<SqliteStoreError> for LifecycleError {
    fn from(error: SqliteStoreError) -> Self {
        Self::Storage(error.to_string())
    }
}

/// Maps a rusqlite error into the lifecycle storage kind.
fn storage(err: &rusqlite::Error) -> LifecycleError {
    LifecycleError::Storage(err.to_string())
}

/// Maps a corrupt stored value into the lifecycle storage kind.
fn corrupt(what: &str, value: &str) -> LifecycleError {
    LifecycleError::Storage(format!("corrupt stored {what}: {value}"))
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// SQLite-backed triage store with WAL support.
///
/// # Invariants
/// - Every mutation runs in one transaction under the writer mutex.
/// - Read connections never execute mutating statements.
#[derive(Clone)]
pub struct SqliteTriageStore {
    /// Shared writer connection guarded by a mutex.
    write_connection: Arc<Mutex<Connection>>,
    /// Read connection pool used for read path isolation under WAL.
    read_connections: Arc<Vec<Mutex<Connection>>>,
    /// Round-robin cursor for read connection selection.
    read_cursor: Arc<AtomicUsize>,
    /// Time source stamped onto every transition.
    clock: Arc<dyn Clock>,
}

impl SqliteTriageStore {
    /// Opens an SQLite-backed triage store with the system clock.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened,
    /// migrated, or initialized.
    pub fn new(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Opens the store with an explicit time source.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened,
    /// migrated, or initialized.
    pub fn with_clock(
        config: SqliteStoreConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        if config.read_pool_size == 0 {
            return Err(SqliteStoreError::Invalid(
                "read_pool_size must be greater than zero".to_string(),
            ));
        }
        let mut write_connection = open_connection(&config)?;
        initialize_schema(&mut write_connection)?;
        let mut read_connections = Vec::with_capacity(config.read_pool_size);
        for _ in 0 .. config.read_pool_size {
            read_connections.push(Mutex::new(open_connection(&config)?));
        }
        Ok(Self {
            write_connection: Arc::new(Mutex::new(write_connection)),
            read_connections: Arc::new(read_connections),
            read_cursor: Arc::new(AtomicUsize::new(0)),
            clock,
        })
    }

    /// Returns the next read connection using round-robin selection.
    fn read_connection(&self) -> &Mutex<Connection> {
        let len = self.read_connections.len();
        let index = self.read_cursor.fetch_add(1, Ordering::Relaxed) % len;
        &self.read_connections[index]
    }

    /// Runs a closure against a read connection.
    fn with_read<T>(
        &self,
        operation: impl FnOnce(&Connection) -> Result<T, LifecycleError>,
    ) -> Result<T, LifecycleError> {
        let guard = self
            .read_connection()
            .lock()
            .map_err(|_| LifecycleError::Storage("read mutex poisoned".to_string()))?;
        operation(&guard)
    }

    /// Runs a closure inside one writer transaction.
    ///
    /// The closure's error aborts the transaction; nothing is committed.
    fn with_write_tx<T>(
        &self,
        operation: impl FnOnce(&Transaction<'_>) -> Result<T, LifecycleError>,
    ) -> Result<T, LifecycleError> {
        let mut guard = self
            .write_connection
            .lock()
            .map_err(|_| LifecycleError::Storage("writer mutex poisoned".to_string()))?;
        let tx = guard.transaction().map_err(|err| storage(&err))?;
        let value = operation(&tx)?;
        tx.commit().map_err(|err| storage(&err))?;
        Ok(value)
    }

    // ------------------------------------------------------------------
    // Directory administration
    // ------------------------------------------------------------------

    /// Creates a company.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Validation`] for duplicate names and
    /// [`LifecycleError::Storage`] for transaction failures.
    pub fn create_company(&self, name: &str) -> Result<CompanyId, LifecycleError> {
        let now = self.clock.now().to_storage();
        self.with_write_tx(|tx| {
            tx.execute(
                "INSERT INTO companies (name, created_at, updated_at) VALUES (?1, ?2, ?2)",
                params![name, now],
            )
            .map_err(|err| match err {
                rusqlite::Error::SqliteFailure(code, _)
                    if code.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    LifecycleError::Validation(format!("Company {name} already exists."))
                }
                other => storage(&other),
            })?;
            Ok(CompanyId::new(tx.last_insert_rowid()))
        })
    }

    /// Creates a department inside a company.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::NotFound`] for unknown companies,
    /// [`LifecycleError::Validation`] for duplicate names, and
    /// [`LifecycleError::Storage`] for transaction failures.
    pub fn create_department(
        &self,
        company: CompanyId,
        name: &str,
        restricted_to_department_members: bool,
    ) -> Result<DepartmentId, LifecycleError> {
        self.with_write_tx(|tx| {
            ensure_company_exists(tx, company)?;
            tx.execute(
                "INSERT INTO departments (company_id, name, restricted_to_department_members) \
                 VALUES (?1, ?2, ?3)",
                params![company.get(), name, i64::from(restricted_to_department_members)],
            )
            .map_err(|err| match err {
                rusqlite::Error::SqliteFailure(code, _)
                    if code.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    LifecycleError::Validation(format!(
                        "Department {name} already exists in this company."
                    ))
                }
                other => storage(&other),
            })?;
            Ok(DepartmentId::new(tx.last_insert_rowid()))
        })
    }

    /// Adds a user to a department roster.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::NotFound`] for unknown departments and
    /// [`LifecycleError::Storage`] for transaction failures.
    pub fn add_department_member(
        &self,
        department: DepartmentId,
        user: UserId,
    ) -> Result<(), LifecycleError> {
        let now = self.clock.now().to_storage();
        self.with_write_tx(|tx| {
            ensure_department_exists(tx, department)?;
            tx.execute(
                "INSERT INTO department_members (department_id, user_id, added_at) VALUES (?1, \
                 ?2, ?3) ON CONFLICT (department_id, user_id) DO NOTHING",
                params![department.get(), user.get(), now],
            )
            .map_err(|err| storage(&err))?;
            Ok(())
        })
    }

    /// Removes a user from a department roster.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Storage`] for transaction failures.
    pub fn remove_department_member(
        &self,
        department: DepartmentId,
        user: UserId,
    ) -> Result<(), LifecycleError> {
        self.with_write_tx(|tx| {
            tx.execute(
                "DELETE FROM department_members WHERE department_id = ?1 AND user_id = ?2",
                params![department.get(), user.get()],
            )
            .map_err(|err| storage(&err))?;
            Ok(())
        })
    }
}

// ============================================================================
// SECTION: TriageStore Queries
// ============================================================================

impl TriageStore for SqliteTriageStore {
    fn membership(&self, group: GroupId) -> Result<Option<Membership>, LifecycleError> {
        self.with_read(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, name, company_id, status, registration_message_id, \
                     requested_by_user_id, requested_by_handle, requested_company_name FROM \
                     groups WHERE id = ?1",
                    params![group.get()],
                    read_group_row,
                )
                .optional()
                .map_err(|err| storage(&err))?;
            let Some(group_record) = row else {
                return Ok(None);
            };
            let group_record = group_record?;
            let company = match group_record.company_id {
                Some(company_id) => conn
                    .query_row(
                        "SELECT id, name FROM companies WHERE id = ?1",
                        params![company_id.get()],
                        |row| {
                            Ok(Company {
                                id: CompanyId::new(row.get(0)?),
                                name: row.get(1)?,
                            })
                        },
                    )
                    .optional()
                    .map_err(|err| storage(&err))?,
                None => None,
            };
            let is_active = group_record.status == GroupStatus::Active;
            Ok(Some(Membership {
                group: group_record,
                company,
                is_active,
            }))
        })
    }

    fn company(&self, company: CompanyId) -> Result<Option<Company>, LifecycleError> {
        self.with_read(|conn| {
            conn.query_row(
                "SELECT id, name FROM companies WHERE id = ?1",
                params![company.get()],
                |row| {
                    Ok(Company {
                        id: CompanyId::new(row.get(0)?),
                        name: row.get(1)?,
                    })
                },
            )
            .optional()
            .map_err(|err| storage(&err))
        })
    }

    fn company_departments(
        &self,
        company: CompanyId,
    ) -> Result<Vec<Department>, LifecycleError> {
        self.with_read(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, company_id, name, restricted_to_department_members FROM \
                     departments WHERE company_id = ?1 ORDER BY name",
                )
                .map_err(|err| storage(&err))?;
            let rows = stmt
                .query_map(params![company.get()], read_department_row)
                .map_err(|err| storage(&err))?;
            let mut departments = Vec::new();
            for row in rows {
                departments.push(row.map_err(|err| storage(&err))?);
            }
            Ok(departments)
        })
    }

    fn department(
        &self,
        department: DepartmentId,
    ) -> Result<Option<Department>, LifecycleError> {
        self.with_read(|conn| {
            conn.query_row(
                "SELECT id, company_id, name, restricted_to_department_members FROM departments \
                 WHERE id = ?1",
                params![department.get()],
                read_department_row,
            )
            .optional()
            .map_err(|err| storage(&err))
        })
    }

    fn is_department_member(
        &self,
        department: DepartmentId,
        user: UserId,
    ) -> Result<bool, LifecycleError> {
        self.with_read(|conn| is_department_member_on(conn, department, user))
    }

    fn department_handles(
        &self,
        department: DepartmentId,
    ) -> Result<Vec<String>, LifecycleError> {
        self.with_read(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT COALESCE(u.handle, 'User_' || m.user_id) FROM department_members m \
                     LEFT JOIN users u ON u.id = m.user_id WHERE m.department_id = ?1 ORDER BY \
                     m.user_id",
                )
                .map_err(|err| storage(&err))?;
            let rows = stmt
                .query_map(params![department.get()], |row| row.get::<_, String>(0))
                .map_err(|err| storage(&err))?;
            let mut handles = Vec::new();
            for row in rows {
                handles.push(row.map_err(|err| storage(&err))?);
            }
            Ok(handles)
        })
    }

    fn user(&self, user: UserId) -> Result<Option<User>, LifecycleError> {
        self.with_read(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, handle, username, first_name, last_name, language_code, is_bot, \
                     global_role FROM users WHERE id = ?1",
                    params![user.get()],
                    read_user_row,
                )
                .optional()
                .map_err(|err| storage(&err))?;
            row.transpose()
        })
    }

    fn user_by_username(&self, username: &str) -> Result<Option<User>, LifecycleError> {
        self.with_read(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, handle, username, first_name, last_name, language_code, is_bot, \
                     global_role FROM users WHERE username = ?1",
                    params![username],
                    read_user_row,
                )
                .optional()
                .map_err(|err| storage(&err))?;
            row.transpose()
        })
    }

    fn incident(&self, incident: &IncidentId) -> Result<Option<Incident>, LifecycleError> {
        self.with_read(|conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {INCIDENT_COLUMNS} FROM incidents WHERE id = ?1"),
                    params![incident.as_str()],
                    read_incident_row,
                )
                .optional()
                .map_err(|err| storage(&err))?;
            row.transpose()
        })
    }

    fn incident_by_pinned_message(
        &self,
        group: GroupId,
        message: MessageId,
    ) -> Result<Option<Incident>, LifecycleError> {
        self.with_read(|conn| {
            let row = conn
                .query_row(
                    &format!(
                        "SELECT {INCIDENT_COLUMNS} FROM incidents WHERE group_id = ?1 AND \
                         pinned_message_id = ?2"
                    ),
                    params![group.get(), message.get()],
                    read_incident_row,
                )
                .optional()
                .map_err(|err| storage(&err))?;
            row.transpose()
        })
    }

    fn active_claims(&self, incident: &IncidentId) -> Result<Vec<Claim>, LifecycleError> {
        self.with_read(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT c.incident_id, c.user_id, c.department_id, COALESCE(u.handle, \
                     'User_' || c.user_id), c.claimed_at, c.released_at, c.is_active FROM claims \
                     c LEFT JOIN users u ON u.id = c.user_id WHERE c.incident_id = ?1 AND \
                     c.is_active = 1 ORDER BY c.claimed_at, c.id",
                )
                .map_err(|err| storage(&err))?;
            let rows = stmt
                .query_map(params![incident.as_str()], read_claim_row)
                .map_err(|err| storage(&err))?;
            let mut claims = Vec::new();
            for row in rows {
                claims.push(row.map_err(|err| storage(&err))??);
            }
            Ok(claims)
        })
    }

    fn active_claim_handles(
        &self,
        incident: &IncidentId,
        department: Option<DepartmentId>,
    ) -> Result<Vec<String>, LifecycleError> {
        self.with_read(|conn| {
            let sql = "SELECT COALESCE(u.handle, 'User_' || c.user_id) FROM claims c LEFT JOIN \
                       users u ON u.id = c.user_id WHERE c.incident_id = ?1 AND c.is_active = 1 \
                       AND (?2 IS NULL OR c.department_id = ?2) ORDER BY c.claimed_at, c.id";
            let mut stmt = conn.prepare(sql).map_err(|err| storage(&err))?;
            let rows = stmt
                .query_map(
                    params![incident.as_str(), department.map(DepartmentId::get)],
                    |row| row.get::<_, String>(0),
                )
                .map_err(|err| storage(&err))?;
            let mut handles = Vec::new();
            for row in rows {
                handles.push(row.map_err(|err| storage(&err))?);
            }
            Ok(handles)
        })
    }

    fn unclaimed_incidents(
        &self,
        older_than_minutes: u64,
    ) -> Result<Vec<Incident>, LifecycleError> {
        let threshold = self.clock.now().minus_minutes(older_than_minutes).to_storage();
        self.with_read(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {INCIDENT_COLUMNS} FROM incidents WHERE status = ?1 AND \
                     t_department_assigned IS NOT NULL AND t_department_assigned <= ?2 ORDER BY \
                     t_department_assigned"
                ))
                .map_err(|err| storage(&err))?;
            let rows = stmt
                .query_map(
                    params![IncidentStatus::AwaitingClaim.as_str(), threshold],
                    read_incident_row,
                )
                .map_err(|err| storage(&err))?;
            let mut incidents = Vec::new();
            for row in rows {
                incidents.push(row.map_err(|err| storage(&err))??);
            }
            Ok(incidents)
        })
    }

    fn awaiting_summary_incidents(
        &self,
        older_than_minutes: u64,
    ) -> Result<Vec<Incident>, LifecycleError> {
        let threshold = self.clock.now().minus_minutes(older_than_minutes).to_storage();
        self.with_read(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {INCIDENT_COLUMNS} FROM incidents WHERE status = ?1 AND \
                     t_resolution_requested IS NOT NULL AND t_resolution_requested <= ?2 ORDER \
                     BY t_resolution_requested"
                ))
                .map_err(|err| storage(&err))?;
            let rows = stmt
                .query_map(
                    params![IncidentStatus::AwaitingSummary.as_str(), threshold],
                    read_incident_row,
                )
                .map_err(|err| storage(&err))?;
            let mut incidents = Vec::new();
            for row in rows {
                incidents.push(row.map_err(|err| storage(&err))??);
            }
            Ok(incidents)
        })
    }

    fn events(&self, incident: &IncidentId) -> Result<Vec<IncidentEvent>, LifecycleError> {
        self.with_read(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT incident_id, event_type, actor_user_id, occurred_at, metadata FROM \
                     incident_events WHERE incident_id = ?1 ORDER BY id",
                )
                .map_err(|err| storage(&err))?;
            let rows = stmt
                .query_map(params![incident.as_str()], read_event_row)
                .map_err(|err| storage(&err))?;
            let mut events = Vec::new();
            for row in rows {
                events.push(row.map_err(|err| storage(&err))??);
            }
            Ok(events)
        })
    }

    fn participants(&self, incident: &IncidentId) -> Result<Vec<Participant>, LifecycleError> {
        self.with_read(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT incident_id, user_id, department_id, first_claimed_at, \
                     last_claimed_at, active_since, total_active_seconds, join_count, status, \
                     resolved_at FROM participants WHERE incident_id = ?1 ORDER BY user_id, \
                     department_id",
                )
                .map_err(|err| storage(&err))?;
            let rows = stmt
                .query_map(params![incident.as_str()], read_participant_row)
                .map_err(|err| storage(&err))?;
            let mut participants = Vec::new();
            for row in rows {
                participants.push(row.map_err(|err| storage(&err))??);
            }
            Ok(participants)
        })
    }

    fn department_sessions(
        &self,
        incident: &IncidentId,
    ) -> Result<Vec<DepartmentSession>, LifecycleError> {
        self.with_read(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT incident_id, department_id, assigned_at, assigned_by, claimed_at, \
                     released_at, status FROM department_sessions WHERE incident_id = ?1 ORDER \
                     BY id",
                )
                .map_err(|err| storage(&err))?;
            let rows = stmt
                .query_map(params![incident.as_str()], read_session_row)
                .map_err(|err| storage(&err))?;
            let mut sessions = Vec::new();
            for row in rows {
                sessions.push(row.map_err(|err| storage(&err))??);
            }
            Ok(sessions)
        })
    }

    // ========================================================================
    // SECTION: TriageStore Mutations
    // ========================================================================

    fn create_incident(
        &self,
        group: GroupId,
        reporter: UserId,
        reporter_handle: &str,
        description: &str,
        source_message: Option<MessageId>,
    ) -> Result<IncidentId, LifecycleError> {
        transitions::ensure_description(description)?;
        let now = self.clock.now();
        self.with_write_tx(|tx| {
            let (company_id, group_active) = tx
                .query_row(
                    "SELECT company_id, status FROM groups WHERE id = ?1",
                    params![group.get()],
                    |row| {
                        Ok((row.get::<_, Option<i64>>(0)?, row.get::<_, String>(1)? == "active"))
                    },
                )
                .optional()
                .map_err(|err| storage(&err))?
                .ok_or_else(|| {
                    LifecycleError::NotFound("This group is not registered yet.".to_string())
                })?;
            if !group_active {
                return Err(LifecycleError::PermissionDenied(
                    "This group is not active yet.".to_string(),
                ));
            }
            let company_id = company_id.ok_or_else(|| {
                LifecycleError::StateConflict(
                    "This group is not attached to a company.".to_string(),
                )
            })?;

            let incident_id = next_incident_id(tx)?;
            tx.execute(
                "INSERT INTO incidents (id, group_id, company_id, created_by_id, \
                 created_by_handle, description, source_message_id, status, t_created, \
                 updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
                params![
                    incident_id.as_str(),
                    group.get(),
                    company_id,
                    reporter.get(),
                    reporter_handle,
                    description,
                    source_message.map(MessageId::get),
                    IncidentStatus::AwaitingDepartment.as_str(),
                    now.to_storage()
                ],
            )
            .map_err(|err| storage(&err))?;
            append_event(
                tx,
                &incident_id,
                EventKind::Create,
                Some(reporter),
                now,
                &serde_json::json!({ "group_id": group.get() }),
            )?;
            Ok(incident_id)
        })
    }

    fn set_pinned_message(
        &self,
        incident: &IncidentId,
        message: MessageId,
    ) -> Result<(), LifecycleError> {
        let now = self.clock.now().to_storage();
        self.with_write_tx(|tx| {
            let updated = tx
                .execute(
                    "UPDATE incidents SET pinned_message_id = ?1, updated_at = ?2 WHERE id = ?3",
                    params![message.get(), now, incident.as_str()],
                )
                .map_err(|err| storage(&err))?;
            if updated == 0 {
                return Err(LifecycleError::NotFound("Incident not found.".to_string()));
            }
            Ok(())
        })
    }

    fn assign_department(
        &self,
        incident: &IncidentId,
        department: DepartmentId,
        actor: UserId,
    ) -> Result<(), LifecycleError> {
        let now = self.clock.now();
        self.with_write_tx(|tx| {
            let snapshot = read_incident_for_update(tx, incident)?;
            transitions::ensure_assignable(snapshot.status)?;

            let department_company: Option<i64> = tx
                .query_row(
                    "SELECT company_id FROM departments WHERE id = ?1",
                    params![department.get()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|err| storage(&err))?;
            let department_company = department_company.ok_or_else(|| {
                LifecycleError::NotFound("Department not found.".to_string())
            })?;
            if department_company != snapshot.company_id.get() {
                return Err(LifecycleError::Validation(
                    "That department belongs to another company.".to_string(),
                ));
            }
            if let Some(current) = snapshot.department_id
                && !is_department_member_on(tx, current, actor)?
            {
                return Err(LifecycleError::PermissionDenied(
                    "Only members of the current department can transfer this issue.".to_string(),
                ));
            }

            finalize_active_claims(tx, incident, ParticipantStatus::Transferred, None, now)?;
            close_active_session(tx, incident, SessionStatus::Transferred, now)?;
            tx.execute(
                "INSERT INTO department_sessions (incident_id, department_id, assigned_at, \
                 assigned_by, status) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    incident.as_str(),
                    department.get(),
                    now.to_storage(),
                    actor.get(),
                    SessionStatus::Active.as_str()
                ],
            )
            .map_err(|err| storage(&err))?;
            tx.execute(
                "UPDATE incidents SET department_id = ?1, status = ?2, t_department_assigned = \
                 ?3, pending_resolution_by_user_id = NULL, updated_at = ?3 WHERE id = ?4",
                params![
                    department.get(),
                    IncidentStatus::AwaitingClaim.as_str(),
                    now.to_storage(),
                    incident.as_str()
                ],
            )
            .map_err(|err| storage(&err))?;
            append_event(
                tx,
                incident,
                EventKind::DepartmentAssigned,
                Some(actor),
                now,
                &serde_json::json!({
                    "department_id": department.get(),
                    "previous_department_id": snapshot.department_id.map(DepartmentId::get),
                    "status_before": snapshot.status.as_str(),
                }),
            )?;
            Ok(())
        })
    }

    fn claim(&self, incident: &IncidentId, user: UserId) -> Result<(), LifecycleError> {
        let now = self.clock.now();
        self.with_write_tx(|tx| {
            let snapshot = read_incident_for_update(tx, incident)?;
            let already_active = user_has_active_claim(tx, incident, user)?;
            transitions::ensure_claimable(snapshot.status, snapshot.department_id, already_active)?;
            let department = snapshot
                .department_id
                .ok_or_else(|| {
                    LifecycleError::StateConflict("Please choose a department first.".to_string())
                })?;
            if !is_department_member_on(tx, department, user)? {
                return Err(LifecycleError::PermissionDenied(
                    "You are not a member of this department.".to_string(),
                ));
            }

            tx.execute(
                "INSERT INTO claims (incident_id, user_id, department_id, claimed_at, is_active) \
                 VALUES (?1, ?2, ?3, ?4, 1)",
                params![incident.as_str(), user.get(), department.get(), now.to_storage()],
            )
            .map_err(|err| storage(&err))?;
            tx.execute(
                "INSERT INTO participants (incident_id, user_id, department_id, \
                 first_claimed_at, last_claimed_at, active_since, total_active_seconds, \
                 join_count, status) VALUES (?1, ?2, ?3, ?4, ?4, ?4, 0, 1, ?5) ON CONFLICT \
                 (incident_id, user_id, department_id) DO UPDATE SET last_claimed_at = ?4, \
                 active_since = ?4, join_count = join_count + 1, status = ?5, resolved_at = NULL",
                params![
                    incident.as_str(),
                    user.get(),
                    department.get(),
                    now.to_storage(),
                    ParticipantStatus::Active.as_str()
                ],
            )
            .map_err(|err| storage(&err))?;
            tx.execute(
                "UPDATE incidents SET status = ?1, t_first_claimed = COALESCE(t_first_claimed, \
                 ?2), t_last_claimed = ?2, pending_resolution_by_user_id = NULL, updated_at = ?2 \
                 WHERE id = ?3",
                params![IncidentStatus::InProgress.as_str(), now.to_storage(), incident.as_str()],
            )
            .map_err(|err| storage(&err))?;
            tx.execute(
                "UPDATE department_sessions SET claimed_at = COALESCE(claimed_at, ?1) WHERE \
                 incident_id = ?2 AND status = ?3",
                params![now.to_storage(), incident.as_str(), SessionStatus::Active.as_str()],
            )
            .map_err(|err| storage(&err))?;
            append_event(
                tx,
                incident,
                EventKind::Claim,
                Some(user),
                now,
                &serde_json::json!({ "department_id": department.get() }),
            )?;
            Ok(())
        })
    }

    fn release(&self, incident: &IncidentId, user: UserId) -> Result<(), LifecycleError> {
        let now = self.clock.now();
        self.with_write_tx(|tx| {
            let snapshot = read_incident_for_update(tx, incident)?;
            let has_claim = user_has_active_claim(tx, incident, user)?;
            transitions::ensure_releasable(snapshot.status, has_claim)?;

            tx.execute(
                "UPDATE claims SET is_active = 0, released_at = ?1 WHERE incident_id = ?2 AND \
                 user_id = ?3 AND is_active = 1",
                params![now.to_storage(), incident.as_str(), user.get()],
            )
            .map_err(|err| storage(&err))?;
            finalize_participant(tx, incident, user, ParticipantStatus::Released, None, now)?;

            let remaining = count_active_claims(tx, incident)?;
            let next_status = transitions::status_after_release(snapshot.status, remaining);
            if next_status != snapshot.status {
                tx.execute(
                    "UPDATE incidents SET status = ?1, updated_at = ?2 WHERE id = ?3",
                    params![next_status.as_str(), now.to_storage(), incident.as_str()],
                )
                .map_err(|err| storage(&err))?;
            } else {
                tx.execute(
                    "UPDATE incidents SET updated_at = ?1 WHERE id = ?2",
                    params![now.to_storage(), incident.as_str()],
                )
                .map_err(|err| storage(&err))?;
            }
            append_event(
                tx,
                incident,
                EventKind::Release,
                Some(user),
                now,
                &serde_json::json!({ "remaining_active_claims": remaining }),
            )?;
            Ok(())
        })
    }

    fn request_resolution(
        &self,
        incident: &IncidentId,
        user: UserId,
    ) -> Result<(), LifecycleError> {
        let now = self.clock.now();
        self.with_write_tx(|tx| {
            let snapshot = read_incident_for_update(tx, incident)?;
            let has_claim = user_has_active_claim(tx, incident, user)?;
            transitions::ensure_resolution_requestable(snapshot.status, has_claim)?;

            tx.execute(
                "UPDATE incidents SET status = ?1, pending_resolution_by_user_id = ?2, \
                 t_resolution_requested = ?3, updated_at = ?3 WHERE id = ?4",
                params![
                    IncidentStatus::AwaitingSummary.as_str(),
                    user.get(),
                    now.to_storage(),
                    incident.as_str()
                ],
            )
            .map_err(|err| storage(&err))?;
            append_event(
                tx,
                incident,
                EventKind::ResolutionRequested,
                Some(user),
                now,
                &serde_json::json!({}),
            )?;
            Ok(())
        })
    }

    fn resolve(
        &self,
        incident: &IncidentId,
        user: UserId,
        summary: &str,
    ) -> Result<(), LifecycleError> {
        let now = self.clock.now();
        self.with_write_tx(|tx| {
            let snapshot = read_incident_for_update(tx, incident)?;
            transitions::ensure_resolvable(
                snapshot.status,
                snapshot.pending_resolution_by_user_id,
                user,
                summary,
            )?;

            tx.execute(
                "UPDATE incidents SET status = ?1, resolution_summary = ?2, t_resolved = ?3, \
                 resolved_by_user_id = ?4, pending_resolution_by_user_id = NULL, updated_at = ?3 \
                 WHERE id = ?5",
                params![
                    IncidentStatus::Resolved.as_str(),
                    summary,
                    now.to_storage(),
                    user.get(),
                    incident.as_str()
                ],
            )
            .map_err(|err| storage(&err))?;
            finalize_active_claims(
                tx,
                incident,
                ParticipantStatus::ResolvedOther,
                Some((user, ParticipantStatus::ResolvedSelf)),
                now,
            )?;
            close_active_session(tx, incident, SessionStatus::Resolved, now)?;
            append_event(
                tx,
                incident,
                EventKind::Resolve,
                Some(user),
                now,
                &serde_json::json!({}),
            )?;
            Ok(())
        })
    }

    fn auto_close(
        &self,
        incident: &IncidentId,
        summary: &str,
        reason: &str,
    ) -> Result<(), LifecycleError> {
        let now = self.clock.now();
        self.with_write_tx(|tx| {
            let snapshot = read_incident_for_update(tx, incident)?;
            transitions::ensure_auto_closable(snapshot.status)?;

            tx.execute(
                "UPDATE incidents SET status = ?1, resolution_summary = ?2, t_resolved = ?3, \
                 pending_resolution_by_user_id = NULL, updated_at = ?3 WHERE id = ?4",
                params![
                    IncidentStatus::Closed.as_str(),
                    summary,
                    now.to_storage(),
                    incident.as_str()
                ],
            )
            .map_err(|err| storage(&err))?;
            finalize_active_claims(tx, incident, ParticipantStatus::Closed, None, now)?;
            close_active_session(tx, incident, SessionStatus::Closed, now)?;
            append_event(
                tx,
                incident,
                EventKind::AutoClosed,
                None,
                now,
                &serde_json::json!({
                    "reason": reason,
                    "pending_user_id": snapshot.pending_resolution_by_user_id.map(UserId::get),
                    "department_id": snapshot.department_id.map(DepartmentId::get),
                }),
            )?;
            Ok(())
        })
    }

    fn track_user(
        &self,
        profile: &UserProfile,
        group: Option<GroupId>,
        role_hint: Option<GlobalRole>,
    ) -> Result<(), LifecycleError> {
        let now = self.clock.now().to_storage();
        let handle = profile.handle();
        self.with_write_tx(|tx| {
            let existing_role: Option<String> = tx
                .query_row(
                    "SELECT global_role FROM users WHERE id = ?1",
                    params![profile.id.get()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|err| storage(&err))?
                .flatten();
            let current = existing_role.as_deref().and_then(GlobalRole::parse);
            // The legacy role ladder only ever upgrades.
            let final_role = match (current, role_hint) {
                (Some(held), Some(hint)) if hint.rank() > held.rank() => Some(hint),
                (None, hint) => hint,
                (held, _) => held,
            };

            tx.execute(
                "INSERT INTO users (id, handle, username, first_name, last_name, language_code, \
                 is_bot, global_role, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, \
                 ?7, ?8, ?9, ?9) ON CONFLICT (id) DO UPDATE SET handle = excluded.handle, \
                 username = excluded.username, first_name = excluded.first_name, last_name = \
                 excluded.last_name, language_code = excluded.language_code, is_bot = \
                 excluded.is_bot, global_role = excluded.global_role, updated_at = \
                 excluded.updated_at",
                params![
                    profile.id.get(),
                    handle,
                    profile.username,
                    profile.first_name,
                    profile.last_name,
                    profile.language_code,
                    i64::from(profile.is_bot),
                    final_role.map(GlobalRole::as_str),
                    now
                ],
            )
            .map_err(|err| storage(&err))?;

            if let Some(group_id) = group {
                tx.execute(
                    "INSERT INTO group_memberships (group_id, user_id, last_seen_at) VALUES (?1, \
                     ?2, ?3) ON CONFLICT (group_id, user_id) DO UPDATE SET last_seen_at = \
                     excluded.last_seen_at",
                    params![group_id.get(), profile.id.get(), now],
                )
                .map_err(|err| storage(&err))?;
            }
            Ok(())
        })
    }

    fn attach_group_to_company(
        &self,
        group: GroupId,
        group_name: &str,
        company: CompanyId,
    ) -> Result<(), LifecycleError> {
        let now = self.clock.now().to_storage();
        self.with_write_tx(|tx| {
            ensure_company_exists(tx, company)?;
            tx.execute(
                "INSERT INTO groups (id, name, company_id, status, updated_at) VALUES (?1, ?2, \
                 ?3, 'active', ?4) ON CONFLICT (id) DO UPDATE SET name = excluded.name, \
                 company_id = excluded.company_id, status = 'active', updated_at = \
                 excluded.updated_at",
                params![group.get(), group_name, company.get(), now],
            )
            .map_err(|err| storage(&err))?;
            Ok(())
        })
    }

    fn record_pending_group(
        &self,
        group: GroupId,
        group_name: &str,
        registration_message: Option<MessageId>,
        requested_by: Option<UserId>,
        requested_by_handle: Option<&str>,
        requested_company_name: Option<&str>,
    ) -> Result<(), LifecycleError> {
        let now = self.clock.now().to_storage();
        self.with_write_tx(|tx| {
            tx.execute(
                "INSERT INTO groups (id, name, company_id, status, registration_message_id, \
                 requested_by_user_id, requested_by_handle, requested_company_name, updated_at) \
                 VALUES (?1, ?2, NULL, 'pending', ?3, ?4, ?5, ?6, ?7) ON CONFLICT (id) DO UPDATE \
                 SET name = excluded.name, status = 'pending', registration_message_id = \
                 excluded.registration_message_id, requested_by_user_id = \
                 excluded.requested_by_user_id, requested_by_handle = \
                 excluded.requested_by_handle, requested_company_name = \
                 excluded.requested_company_name, updated_at = excluded.updated_at",
                params![
                    group.get(),
                    group_name,
                    registration_message.map(MessageId::get),
                    requested_by.map(UserId::get),
                    requested_by_handle,
                    requested_company_name,
                    now
                ],
            )
            .map_err(|err| storage(&err))?;
            Ok(())
        })
    }

    fn pending_notifications(&self) -> Result<Vec<Notification>, LifecycleError> {
        self.with_read(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, group_id, kind, payload, status, created_at, sent_at, last_error \
                     FROM notifications WHERE status = 'pending' ORDER BY id",
                )
                .map_err(|err| storage(&err))?;
            let rows = stmt.query_map(params![], read_notification_row).map_err(|err| storage(&err))?;
            let mut notifications = Vec::new();
            for row in rows {
                notifications.push(row.map_err(|err| storage(&err))??);
            }
            Ok(notifications)
        })
    }

    fn notification_exists(
        &self,
        group: GroupId,
        kind: NotificationKind,
    ) -> Result<bool, LifecycleError> {
        self.with_read(|conn| {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(1) FROM notifications WHERE group_id = ?1 AND kind = ?2",
                    params![group.get(), kind.as_str()],
                    |row| row.get(0),
                )
                .map_err(|err| storage(&err))?;
            Ok(count > 0)
        })
    }

    fn enqueue_notification(
        &self,
        group: GroupId,
        kind: NotificationKind,
        payload: &serde_json::Value,
    ) -> Result<(), LifecycleError> {
        let now = self.clock.now().to_storage();
        let payload_json = serde_json::to_string(payload)
            .map_err(|err| LifecycleError::Storage(err.to_string()))?;
        self.with_write_tx(|tx| {
            tx.execute(
                "INSERT INTO notifications (group_id, kind, payload, status, created_at) VALUES \
                 (?1, ?2, ?3, 'pending', ?4)",
                params![group.get(), kind.as_str(), payload_json, now],
            )
            .map_err(|err| storage(&err))?;
            Ok(())
        })
    }

    fn mark_notification_sent(&self, notification: i64) -> Result<(), LifecycleError> {
        let now = self.clock.now().to_storage();
        self.with_write_tx(|tx| {
            tx.execute(
                "UPDATE notifications SET status = 'sent', sent_at = ?1, last_error = NULL WHERE \
                 id = ?2",
                params![now, notification],
            )
            .map_err(|err| storage(&err))?;
            Ok(())
        })
    }

    fn mark_notification_failed(
        &self,
        notification: i64,
        error: &str,
    ) -> Result<(), LifecycleError> {
        self.with_write_tx(|tx| {
            tx.execute(
                "UPDATE notifications SET status = 'failed', last_error = ?1 WHERE id = ?2",
                params![error, notification],
            )
            .map_err(|err| storage(&err))?;
            Ok(())
        })
    }
}

// ============================================================================
// SECTION: Transaction Helpers
// ============================================================================

/// Incident fields a mutation needs before validating its transition.
#[derive(Debug)]
struct IncidentSnapshot {
    /// Current status.
    status: IncidentStatus,
    /// Currently assigned department.
    department_id: Option<DepartmentId>,
    /// Owning company.
    company_id: CompanyId,
    /// Pending resolver.
    pending_resolution_by_user_id: Option<UserId>,
}

/// Reads the incident fields a mutation validates against.
fn read_incident_for_update(
    tx: &Transaction<'_>,
    incident: &IncidentId,
) -> Result<IncidentSnapshot, LifecycleError> {
    let row = tx
        .query_row(
            "SELECT status, department_id, company_id, pending_resolution_by_user_id FROM \
             incidents WHERE id = ?1",
            params![incident.as_str()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<i64>>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, Option<i64>>(3)?,
                ))
            },
        )
        .optional()
        .map_err(|err| storage(&err))?;
    let (status_raw, department, company, pending) =
        row.ok_or_else(|| LifecycleError::NotFound("Incident not found.".to_string()))?;
    let status =
        IncidentStatus::parse(&status_raw).ok_or_else(|| corrupt("status", &status_raw))?;
    Ok(IncidentSnapshot {
        status,
        department_id: department.map(DepartmentId::new),
        company_id: CompanyId::new(company),
        pending_resolution_by_user_id: pending.map(UserId::new),
    })
}

/// Returns true when the user belongs to the department (any connection).
fn is_department_member_on(
    conn: &Connection,
    department: DepartmentId,
    user: UserId,
) -> Result<bool, LifecycleError> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(1) FROM department_members WHERE department_id = ?1 AND user_id = ?2",
            params![department.get(), user.get()],
            |row| row.get(0),
        )
        .map_err(|err| storage(&err))?;
    Ok(count > 0)
}

/// Returns true when the user holds an active claim on the incident.
fn user_has_active_claim(
    tx: &Transaction<'_>,
    incident: &IncidentId,
    user: UserId,
) -> Result<bool, LifecycleError> {
    let count: i64 = tx
        .query_row(
            "SELECT COUNT(1) FROM claims WHERE incident_id = ?1 AND user_id = ?2 AND is_active \
             = 1",
            params![incident.as_str(), user.get()],
            |row| row.get(0),
        )
        .map_err(|err| storage(&err))?;
    Ok(count > 0)
}

/// Counts active claims on the incident.
fn count_active_claims(
    tx: &Transaction<'_>,
    incident: &IncidentId,
) -> Result<usize, LifecycleError> {
    let count: i64 = tx
        .query_row(
            "SELECT COUNT(1) FROM claims WHERE incident_id = ?1 AND is_active = 1",
            params![incident.as_str()],
            |row| row.get(0),
        )
        .map_err(|err| storage(&err))?;
    usize::try_from(count).map_err(|_| LifecycleError::Storage("claim count overflow".to_string()))
}

/// Finalizes one user's active participant rollup, accruing engagement time.
fn finalize_participant(
    tx: &Transaction<'_>,
    incident: &IncidentId,
    user: UserId,
    status: ParticipantStatus,
    resolved_at: Option<Timestamp>,
    now: Timestamp,
) -> Result<(), LifecycleError> {
    let rows: Vec<(i64, Option<String>)> = {
        let mut stmt = tx
            .prepare(
                "SELECT department_id, active_since FROM participants WHERE incident_id = ?1 \
                 AND user_id = ?2 AND status = 'active'",
            )
            .map_err(|err| storage(&err))?;
        let mapped = stmt
            .query_map(params![incident.as_str(), user.get()], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, Option<String>>(1)?))
            })
            .map_err(|err| storage(&err))?;
        let mut rows = Vec::new();
        for row in mapped {
            rows.push(row.map_err(|err| storage(&err))?);
        }
        rows
    };
    for (department, active_since) in rows {
        let accrued = match active_since.as_deref() {
            Some(raw) => {
                let started = Timestamp::parse(raw).map_err(|_| corrupt("active_since", raw))?;
                transitions::accrued_seconds(started, now)
            }
            None => 0,
        };
        tx.execute(
            "UPDATE participants SET total_active_seconds = total_active_seconds + ?1, \
             active_since = NULL, status = ?2, resolved_at = ?3 WHERE incident_id = ?4 AND \
             user_id = ?5 AND department_id = ?6",
            params![
                i64::try_from(accrued).unwrap_or(i64::MAX),
                status.as_str(),
                resolved_at.map(Timestamp::to_storage),
                incident.as_str(),
                user.get(),
                department
            ],
        )
        .map_err(|err| storage(&err))?;
    }
    Ok(())
}

/// Closes every active claim and finalizes the matching participant rollups.
///
/// `resolver` overrides the participant status for one user (the resolver on
/// a human resolve); everyone else gets `default_status`. Resolve and
/// auto-close stamp `resolved_at = now`; transfers do not.
fn finalize_active_claims(
    tx: &Transaction<'_>,
    incident: &IncidentId,
    default_status: ParticipantStatus,
    resolver: Option<(UserId, ParticipantStatus)>,
    now: Timestamp,
) -> Result<(), LifecycleError> {
    let users: Vec<i64> = {
        let mut stmt = tx
            .prepare(
                "SELECT DISTINCT user_id FROM claims WHERE incident_id = ?1 AND is_active = 1",
            )
            .map_err(|err| storage(&err))?;
        let mapped = stmt
            .query_map(params![incident.as_str()], |row| row.get::<_, i64>(0))
            .map_err(|err| storage(&err))?;
        let mut users = Vec::new();
        for row in mapped {
            users.push(row.map_err(|err| storage(&err))?);
        }
        users
    };
    tx.execute(
        "UPDATE claims SET is_active = 0, released_at = ?1 WHERE incident_id = ?2 AND is_active \
         = 1",
        params![now.to_storage(), incident.as_str()],
    )
    .map_err(|err| storage(&err))?;
    let stamps_resolved_at = matches!(
        default_status,
        ParticipantStatus::ResolvedOther | ParticipantStatus::Closed
    );
    let resolved_at = stamps_resolved_at.then_some(now);
    for user_raw in users {
        let user = UserId::new(user_raw);
        let status = match resolver {
            Some((resolver_id, resolver_status)) if resolver_id == user => resolver_status,
            _ => default_status,
        };
        finalize_participant(tx, incident, user, status, resolved_at, now)?;
    }
    Ok(())
}

/// Closes the active department session with the given terminal status.
fn close_active_session(
    tx: &Transaction<'_>,
    incident: &IncidentId,
    status: SessionStatus,
    now: Timestamp,
) -> Result<(), LifecycleError> {
    tx.execute(
        "UPDATE department_sessions SET status = ?1, released_at = ?2 WHERE incident_id = ?3 \
         AND status = ?4",
        params![
            status.as_str(),
            now.to_storage(),
            incident.as_str(),
            SessionStatus::Active.as_str()
        ],
    )
    .map_err(|err| storage(&err))?;
    Ok(())
}

/// Appends one event row inside the mutation's transaction.
fn append_event(
    tx: &Transaction<'_>,
    incident: &IncidentId,
    kind: EventKind,
    actor: Option<UserId>,
    at: Timestamp,
    metadata: &serde_json::Value,
) -> Result<(), LifecycleError> {
    let metadata_json =
        serde_json::to_string(metadata).map_err(|err| LifecycleError::Storage(err.to_string()))?;
    tx.execute(
        "INSERT INTO incident_events (incident_id, event_type, actor_user_id, occurred_at, \
         metadata) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            incident.as_str(),
            kind.as_str(),
            actor.map(UserId::get),
            at.to_storage(),
            metadata_json
        ],
    )
    .map_err(|err| storage(&err))?;
    Ok(())
}

/// Allocates the next dense incident id under the writer lock.
fn next_incident_id(tx: &Transaction<'_>) -> Result<IncidentId, LifecycleError> {
    let mut stmt = tx.prepare("SELECT id FROM incidents").map_err(|err| storage(&err))?;
    let rows = stmt
        .query_map(params![], |row| row.get::<_, String>(0))
        .map_err(|err| storage(&err))?;
    let mut max_suffix = 0_u64;
    for row in rows {
        let raw = row.map_err(|err| storage(&err))?;
        if let Some(suffix) = IncidentId::new(raw).numeric_suffix()
            && suffix > max_suffix
        {
            max_suffix = suffix;
        }
    }
    Ok(IncidentId::from_suffix(max_suffix + 1))
}

/// Verifies a company row exists.
fn ensure_company_exists(tx: &Transaction<'_>, company: CompanyId) -> Result<(), LifecycleError> {
    let count: i64 = tx
        .query_row(
            "SELECT COUNT(1) FROM companies WHERE id = ?1",
            params![company.get()],
            |row| row.get(0),
        )
        .map_err(|err| storage(&err))?;
    if count == 0 {
        return Err(LifecycleError::NotFound(format!("Company {company} does not exist.")));
    }
    Ok(())
}

/// Verifies a department row exists.
fn ensure_department_exists(
    tx: &Transaction<'_>,
    department: DepartmentId,
) -> Result<(), LifecycleError> {
    let count: i64 = tx
        .query_row(
            "SELECT COUNT(1) FROM departments WHERE id = ?1",
            params![department.get()],
            |row| row.get(0),
        )
        .map_err(|err| storage(&err))?;
    if count == 0 {
        return Err(LifecycleError::NotFound("Department not found.".to_string()));
    }
    Ok(())
}

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Parses a stored timestamp column.
fn parse_timestamp(raw: &str) -> Result<Timestamp, LifecycleError> {
    Timestamp::parse(raw).map_err(|_| corrupt("timestamp", raw))
}

/// Parses an optional stored timestamp column.
fn parse_optional_timestamp(
    raw: Option<String>,
) -> Result<Option<Timestamp>, LifecycleError> {
    raw.as_deref().map(parse_timestamp).transpose()
}

/// Maps a group row.
fn read_group_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<Group, LifecycleError>> {
    let status_raw: String = row.get(3)?;
    let group = Group {
        id: GroupId::new(row.get(0)?),
        name: row.get(1)?,
        company_id: row.get::<_, Option<i64>>(2)?.map(CompanyId::new),
        status: match GroupStatus::parse(&status_raw) {
            Some(status) => status,
            None => return Ok(Err(corrupt("group status", &status_raw))),
        },
        registration_message_id: row.get::<_, Option<i64>>(4)?.map(MessageId::new),
        requested_by_user_id: row.get::<_, Option<i64>>(5)?.map(UserId::new),
        requested_by_handle: row.get(6)?,
        requested_company_name: row.get(7)?,
    };
    Ok(Ok(group))
}

/// Maps a department row.
fn read_department_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Department> {
    Ok(Department {
        id: DepartmentId::new(row.get(0)?),
        company_id: CompanyId::new(row.get(1)?),
        name: row.get(2)?,
        restricted_to_department_members: row.get::<_, i64>(3)? != 0,
    })
}

/// Maps a user row.
fn read_user_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<User, LifecycleError>> {
    let role_raw: Option<String> = row.get(7)?;
    let global_role = match role_raw {
        None => None,
        Some(raw) => match GlobalRole::parse(&raw) {
            Some(role) => Some(role),
            None => return Ok(Err(corrupt("global role", &raw))),
        },
    };
    Ok(Ok(User {
        id: UserId::new(row.get(0)?),
        handle: row.get(1)?,
        username: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        language_code: row.get(5)?,
        is_bot: row.get::<_, i64>(6)? != 0,
        global_role,
    }))
}

/// Maps an incident row selected with [`INCIDENT_COLUMNS`].
fn read_incident_row(
    row: &rusqlite::Row<'_>,
) -> rusqlite::Result<Result<Incident, LifecycleError>> {
    let id: String = row.get(0)?;
    let group_id: i64 = row.get(1)?;
    let company_id: i64 = row.get(2)?;
    let created_by_id: i64 = row.get(3)?;
    let created_by_handle: String = row.get(4)?;
    let description: String = row.get(5)?;
    let pinned_message_id: Option<i64> = row.get(6)?;
    let source_message_id: Option<i64> = row.get(7)?;
    let department_id: Option<i64> = row.get(8)?;
    let status_raw: String = row.get(9)?;
    let pending_user: Option<i64> = row.get(10)?;
    let resolved_by: Option<i64> = row.get(11)?;
    let resolution_summary: Option<String> = row.get(12)?;
    let t_created_raw: String = row.get(13)?;
    let t_department_assigned_raw: Option<String> = row.get(14)?;
    let t_first_claimed_raw: Option<String> = row.get(15)?;
    let t_last_claimed_raw: Option<String> = row.get(16)?;
    let t_resolution_requested_raw: Option<String> = row.get(17)?;
    let t_resolved_raw: Option<String> = row.get(18)?;
    Ok((move || {
        let status =
            IncidentStatus::parse(&status_raw).ok_or_else(|| corrupt("status", &status_raw))?;
        Ok(Incident {
            incident_id: IncidentId::new(id),
            group_id: GroupId::new(group_id),
            company_id: CompanyId::new(company_id),
            created_by_id: UserId::new(created_by_id),
            created_by_handle,
            description,
            pinned_message_id: pinned_message_id.map(MessageId::new),
            source_message_id: source_message_id.map(MessageId::new),
            department_id: department_id.map(DepartmentId::new),
            status,
            pending_resolution_by_user_id: pending_user.map(UserId::new),
            resolved_by_user_id: resolved_by.map(UserId::new),
            resolution_summary,
            t_created: parse_timestamp(&t_created_raw)?,
            t_department_assigned: parse_optional_timestamp(t_department_assigned_raw)?,
            t_first_claimed: parse_optional_timestamp(t_first_claimed_raw)?,
            t_last_claimed: parse_optional_timestamp(t_last_claimed_raw)?,
            t_resolution_requested: parse_optional_timestamp(t_resolution_requested_raw)?,
            t_resolved: parse_optional_timestamp(t_resolved_raw)?,
        })
    })())
}

/// Maps an active claim row with its resolved handle.
fn read_claim_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<Claim, LifecycleError>> {
    let incident_id: String = row.get(0)?;
    let user_id: i64 = row.get(1)?;
    let department_id: i64 = row.get(2)?;
    let handle: String = row.get(3)?;
    let claimed_at_raw: String = row.get(4)?;
    let released_at_raw: Option<String> = row.get(5)?;
    let is_active: i64 = row.get(6)?;
    Ok((move || {
        Ok(Claim {
            incident_id: IncidentId::new(incident_id),
            user_id: UserId::new(user_id),
            department_id: DepartmentId::new(department_id),
            handle,
            claimed_at: parse_timestamp(&claimed_at_raw)?,
            released_at: parse_optional_timestamp(released_at_raw)?,
            is_active: is_active != 0,
        })
    })())
}

/// Maps an event row.
fn read_event_row(
    row: &rusqlite::Row<'_>,
) -> rusqlite::Result<Result<IncidentEvent, LifecycleError>> {
    let incident_id: String = row.get(0)?;
    let kind_raw: String = row.get(1)?;
    let actor: Option<i64> = row.get(2)?;
    let occurred_at_raw: String = row.get(3)?;
    let metadata_raw: String = row.get(4)?;
    Ok((move || {
        let kind =
            EventKind::parse(&kind_raw).ok_or_else(|| corrupt("event type", &kind_raw))?;
        Ok(IncidentEvent {
            incident_id: IncidentId::new(incident_id),
            kind,
            actor_user_id: actor.map(UserId::new),
            at: parse_timestamp(&occurred_at_raw)?,
            metadata: serde_json::from_str(&metadata_raw)
                .map_err(|_| corrupt("event metadata", &metadata_raw))?,
        })
    })())
}

/// Maps a participant rollup row.
fn read_participant_row(
    row: &rusqlite::Row<'_>,
) -> rusqlite::Result<Result<Participant, LifecycleError>> {
    let incident_id: String = row.get(0)?;
    let user_id: i64 = row.get(1)?;
    let department_id: i64 = row.get(2)?;
    let first_raw: String = row.get(3)?;
    let last_raw: String = row.get(4)?;
    let active_since_raw: Option<String> = row.get(5)?;
    let total_active_seconds: i64 = row.get(6)?;
    let join_count: i64 = row.get(7)?;
    let status_raw: String = row.get(8)?;
    let resolved_at_raw: Option<String> = row.get(9)?;
    Ok((move || {
        let status = ParticipantStatus::parse(&status_raw)
            .ok_or_else(|| corrupt("participant status", &status_raw))?;
        Ok(Participant {
            incident_id: IncidentId::new(incident_id),
            user_id: UserId::new(user_id),
            department_id: DepartmentId::new(department_id),
            first_claimed_at: parse_timestamp(&first_raw)?,
            last_claimed_at: parse_timestamp(&last_raw)?,
            active_since: parse_optional_timestamp(active_since_raw)?,
            total_active_seconds: u64::try_from(total_active_seconds).unwrap_or(0),
            join_count: u32::try_from(join_count).unwrap_or(0),
            status,
            resolved_at: parse_optional_timestamp(resolved_at_raw)?,
        })
    })())
}

/// Maps a department session row.
fn read_session_row(
    row: &rusqlite::Row<'_>,
) -> rusqlite::Result<Result<DepartmentSession, LifecycleError>> {
    let incident_id: String = row.get(0)?;
    let department_id: i64 = row.get(1)?;
    let assigned_at_raw: String = row.get(2)?;
    let assigned_by: Option<i64> = row.get(3)?;
    let claimed_at_raw: Option<String> = row.get(4)?;
    let released_at_raw: Option<String> = row.get(5)?;
    let status_raw: String = row.get(6)?;
    Ok((move || {
        let status = SessionStatus::parse(&status_raw)
            .ok_or_else(|| corrupt("session status", &status_raw))?;
        Ok(DepartmentSession {
            incident_id: IncidentId::new(incident_id),
            department_id: DepartmentId::new(department_id),
            assigned_at: parse_timestamp(&assigned_at_raw)?,
            assigned_by: assigned_by.map(UserId::new),
            claimed_at: parse_optional_timestamp(claimed_at_raw)?,
            released_at: parse_optional_timestamp(released_at_raw)?,
            status,
        })
    })())
}

/// Maps a notification queue row.
fn read_notification_row(
    row: &rusqlite::Row<'_>,
) -> rusqlite::Result<Result<Notification, LifecycleError>> {
    let id: i64 = row.get(0)?;
    let group_id: i64 = row.get(1)?;
    let kind_raw: String = row.get(2)?;
    let payload_raw: String = row.get(3)?;
    let status_raw: String = row.get(4)?;
    let created_at_raw: String = row.get(5)?;
    let sent_at_raw: Option<String> = row.get(6)?;
    let last_error: Option<String> = row.get(7)?;
    Ok((move || {
        let kind = NotificationKind::parse(&kind_raw)
            .ok_or_else(|| corrupt("notification kind", &kind_raw))?;
        let status = NotificationStatus::parse(&status_raw)
            .ok_or_else(|| corrupt("notification status", &status_raw))?;
        Ok(Notification {
            id,
            group_id: GroupId::new(group_id),
            kind,
            payload: serde_json::from_str(&payload_raw)
                .map_err(|_| corrupt("notification payload", &payload_raw))?,
            status,
            created_at: parse_timestamp(&created_at_raw)?,
            sent_at: parse_optional_timestamp(sent_at_raw)?,
            last_error,
        })
    })())
}

// ============================================================================
// SECTION: Open and Schema
// ============================================================================

/// Validates the configured store path shape.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
    if path.exists() && path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Creates the parent directory for the store file when missing.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))?;
    }
    Ok(())
}

/// Opens an SQLite connection with durability pragmas applied.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(connection)
}

/// Returns true when a table exists.
fn table_exists(tx: &Transaction<'_>, name: &str) -> Result<bool, SqliteStoreError> {
    let count: i64 = tx
        .query_row(
            "SELECT COUNT(1) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![name],
            |row| row.get(0),
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(count > 0)
}

/// Returns true when a table carries the named column.
fn table_has_column(
    tx: &Transaction<'_>,
    table: &str,
    column: &str,
) -> Result<bool, SqliteStoreError> {
    let mut stmt = tx
        .prepare(&format!("PRAGMA table_info({table})"))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let rows = stmt
        .query_map(params![], |row| row.get::<_, String>(1))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    for row in rows {
        let name = row.map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Statements creating the current department-model schema.
const CREATE_SCHEMA_SQL: &str = "CREATE TABLE IF NOT EXISTS companies (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS groups (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    company_id INTEGER REFERENCES companies (id),
    status TEXT NOT NULL DEFAULT 'pending',
    registration_message_id INTEGER,
    requested_by_user_id INTEGER,
    requested_by_handle TEXT,
    requested_company_name TEXT,
    updated_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS departments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    company_id INTEGER NOT NULL REFERENCES companies (id),
    name TEXT NOT NULL,
    restricted_to_department_members INTEGER NOT NULL DEFAULT 0,
    UNIQUE (company_id, name)
);
CREATE TABLE IF NOT EXISTS department_members (
    department_id INTEGER NOT NULL REFERENCES departments (id),
    user_id INTEGER NOT NULL,
    added_at TEXT NOT NULL,
    PRIMARY KEY (department_id, user_id)
);
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    handle TEXT NOT NULL,
    username TEXT,
    first_name TEXT,
    last_name TEXT,
    language_code TEXT,
    is_bot INTEGER NOT NULL DEFAULT 0,
    global_role TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_users_username ON users (username);
CREATE TABLE IF NOT EXISTS group_memberships (
    group_id INTEGER NOT NULL,
    user_id INTEGER NOT NULL,
    last_seen_at TEXT NOT NULL,
    PRIMARY KEY (group_id, user_id)
);
CREATE TABLE IF NOT EXISTS incidents (
    id TEXT PRIMARY KEY,
    group_id INTEGER NOT NULL,
    company_id INTEGER NOT NULL,
    created_by_id INTEGER NOT NULL,
    created_by_handle TEXT NOT NULL,
    description TEXT NOT NULL,
    pinned_message_id INTEGER,
    source_message_id INTEGER,
    department_id INTEGER,
    status TEXT NOT NULL,
    pending_resolution_by_user_id INTEGER,
    resolved_by_user_id INTEGER,
    resolution_summary TEXT,
    t_created TEXT NOT NULL,
    t_department_assigned TEXT,
    t_first_claimed TEXT,
    t_last_claimed TEXT,
    t_resolution_requested TEXT,
    t_resolved TEXT,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_incidents_status ON incidents (status);
CREATE INDEX IF NOT EXISTS idx_incidents_pinned ON incidents (group_id, pinned_message_id);
CREATE TABLE IF NOT EXISTS claims (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    incident_id TEXT NOT NULL REFERENCES incidents (id),
    user_id INTEGER NOT NULL,
    department_id INTEGER NOT NULL,
    claimed_at TEXT NOT NULL,
    released_at TEXT,
    is_active INTEGER NOT NULL DEFAULT 1
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_claims_one_active
    ON claims (incident_id, user_id, department_id) WHERE is_active = 1;
CREATE INDEX IF NOT EXISTS idx_claims_incident ON claims (incident_id, is_active);
CREATE TABLE IF NOT EXISTS participants (
    incident_id TEXT NOT NULL,
    user_id INTEGER NOT NULL,
    department_id INTEGER NOT NULL,
    first_claimed_at TEXT NOT NULL,
    last_claimed_at TEXT NOT NULL,
    active_since TEXT,
    total_active_seconds INTEGER NOT NULL DEFAULT 0,
    join_count INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL,
    resolved_at TEXT,
    PRIMARY KEY (incident_id, user_id, department_id)
);
CREATE TABLE IF NOT EXISTS department_sessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    incident_id TEXT NOT NULL,
    department_id INTEGER NOT NULL,
    assigned_at TEXT NOT NULL,
    assigned_by INTEGER,
    claimed_at TEXT,
    released_at TEXT,
    status TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sessions_incident ON department_sessions (incident_id, status);
CREATE TABLE IF NOT EXISTS incident_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    incident_id TEXT NOT NULL,
    event_type TEXT NOT NULL,
    actor_user_id INTEGER,
    occurred_at TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}'
);
CREATE INDEX IF NOT EXISTS idx_events_incident ON incident_events (incident_id, id);
CREATE TABLE IF NOT EXISTS notifications (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    group_id INTEGER NOT NULL,
    kind TEXT NOT NULL,
    payload TEXT NOT NULL DEFAULT '{}',
    status TEXT NOT NULL DEFAULT 'pending',
    created_at TEXT NOT NULL,
    sent_at TEXT,
    last_error TEXT
);
CREATE INDEX IF NOT EXISTS idx_notifications_status ON notifications (status, id);";

/// Rebuild statements migrating a legacy tier-based incidents table.
///
/// Statuses map `Unclaimed`/`Escalated_Unclaimed_T2` to `Awaiting_Claim` and
/// `Claimed_T1`/`Claimed_T2` to `In_Progress`; the single-owner tier columns
/// become active claims under the neutral department sentinel so the claim
/// invariants hold for migrated open incidents.
const MIGRATE_TIER_INCIDENTS_SQL: &str = "ALTER TABLE incidents RENAME TO incidents_legacy;
CREATE TABLE incidents (
    id TEXT PRIMARY KEY,
    group_id INTEGER NOT NULL,
    company_id INTEGER NOT NULL,
    created_by_id INTEGER NOT NULL,
    created_by_handle TEXT NOT NULL,
    description TEXT NOT NULL,
    pinned_message_id INTEGER,
    source_message_id INTEGER,
    department_id INTEGER,
    status TEXT NOT NULL,
    pending_resolution_by_user_id INTEGER,
    resolved_by_user_id INTEGER,
    resolution_summary TEXT,
    t_created TEXT NOT NULL,
    t_department_assigned TEXT,
    t_first_claimed TEXT,
    t_last_claimed TEXT,
    t_resolution_requested TEXT,
    t_resolved TEXT,
    updated_at TEXT NOT NULL
);
INSERT INTO incidents (id, group_id, company_id, created_by_id, created_by_handle, description,
    pinned_message_id, source_message_id, department_id, status,
    pending_resolution_by_user_id, resolved_by_user_id, resolution_summary, t_created,
    t_department_assigned, t_first_claimed, t_last_claimed, t_resolution_requested, t_resolved,
    updated_at)
SELECT id, group_id, COALESCE(company_id, 0), created_by_id, created_by_handle, description,
    pinned_message_id, NULL, NULL,
    CASE status
        WHEN 'Unclaimed' THEN 'Awaiting_Claim'
        WHEN 'Claimed_T1' THEN 'In_Progress'
        WHEN 'Escalated_Unclaimed_T2' THEN 'Awaiting_Claim'
        WHEN 'Claimed_T2' THEN 'In_Progress'
        ELSE status
    END,
    pending_resolution_by_user_id, NULL, resolution_summary, t_created,
    COALESCE(t_escalated, t_created), t_first_claimed, t_last_claimed,
    t_resolution_requested, t_resolved, t_created
FROM incidents_legacy;
INSERT INTO claims (incident_id, user_id, department_id, claimed_at, is_active)
SELECT id, claimed_by_t1_id, 0, COALESCE(t_first_claimed, t_created), 1
FROM incidents_legacy
WHERE claimed_by_t1_id IS NOT NULL AND status = 'Claimed_T1';
INSERT INTO claims (incident_id, user_id, department_id, claimed_at, is_active)
SELECT id, claimed_by_t2_id, 0, COALESCE(t_escalated, t_created), 1
FROM incidents_legacy
WHERE claimed_by_t2_id IS NOT NULL AND status = 'Claimed_T2';
DROP TABLE incidents_legacy;";

/// Rebuild statements collapsing tiered participant rows.
const MIGRATE_TIER_PARTICIPANTS_SQL: &str = "ALTER TABLE participants RENAME TO \
participants_legacy;
CREATE TABLE participants (
    incident_id TEXT NOT NULL,
    user_id INTEGER NOT NULL,
    department_id INTEGER NOT NULL,
    first_claimed_at TEXT NOT NULL,
    last_claimed_at TEXT NOT NULL,
    active_since TEXT,
    total_active_seconds INTEGER NOT NULL DEFAULT 0,
    join_count INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL,
    resolved_at TEXT,
    PRIMARY KEY (incident_id, user_id, department_id)
);
INSERT INTO participants (incident_id, user_id, department_id, first_claimed_at,
    last_claimed_at, active_since, total_active_seconds, join_count, status, resolved_at)
SELECT p.incident_id, p.user_id, 0, MIN(p.first_claimed_at), MAX(p.last_claimed_at),
    CASE WHEN c.user_id IS NULL THEN NULL ELSE MAX(p.last_claimed_at) END,
    COALESCE(SUM(p.total_active_seconds), 0), COALESCE(SUM(p.join_count), 0),
    CASE WHEN c.user_id IS NULL THEN 'released' ELSE 'active' END, NULL
FROM participants_legacy p
LEFT JOIN claims c
    ON c.incident_id = p.incident_id AND c.user_id = p.user_id AND c.is_active = 1
GROUP BY p.incident_id, p.user_id;
DROP TABLE participants_legacy;";

/// Seeds default departments for companies that have none.
const SEED_DEFAULT_DEPARTMENTS_SQL_PREFIX: &str = "CREATE TEMP TABLE IF NOT EXISTS \
seed_companies AS SELECT id FROM companies WHERE id NOT IN (SELECT DISTINCT company_id FROM \
departments);";

/// Initializes the SQLite schema, migrating older layouts in place.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;

    let legacy_tier_schema = version.is_none()
        && table_exists(&tx, "incidents")?
        && table_has_column(&tx, "incidents", "claimed_by_t1_id")?;

    match version {
        None => {
            if legacy_tier_schema {
                // Create the department-model companion tables first so the
                // rebuilt incident rows have claims/participants to land in.
                tx.execute_batch(CREATE_LEGACY_COMPANION_SQL)
                    .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
                tx.execute_batch(MIGRATE_TIER_INCIDENTS_SQL)
                    .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
                if table_exists(&tx, "participants")?
                    && table_has_column(&tx, "participants", "tier")?
                {
                    tx.execute_batch(MIGRATE_TIER_PARTICIPANTS_SQL)
                        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
                }
            }
            tx.execute_batch(CREATE_SCHEMA_SQL)
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        }
        Some(1) => {
            // Version 1 predates the source-message column and the
            // notification queue.
            if !table_has_column(&tx, "incidents", "source_message_id")? {
                tx.execute_batch("ALTER TABLE incidents ADD COLUMN source_message_id INTEGER;")
                    .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            }
            tx.execute_batch(CREATE_SCHEMA_SQL)
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            tx.execute("UPDATE store_meta SET version = ?1", params![SCHEMA_VERSION])
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }

    tx.execute_batch(SEED_DEFAULT_DEPARTMENTS_SQL_PREFIX)
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    for name in DEFAULT_DEPARTMENT_NAMES {
        tx.execute(
            "INSERT INTO departments (company_id, name, restricted_to_department_members) \
             SELECT id, ?1, 0 FROM seed_companies",
            params![name],
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    }
    tx.execute_batch("DROP TABLE IF EXISTS seed_companies;")
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;

    tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(())
}

/// Companion tables the tier rebuild inserts into before the full schema
/// pass runs.
const CREATE_LEGACY_COMPANION_SQL: &str = "CREATE TABLE IF NOT EXISTS claims (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    incident_id TEXT NOT NULL,
    user_id INTEGER NOT NULL,
    department_id INTEGER NOT NULL,
    claimed_at TEXT NOT NULL,
    released_at TEXT,
    is_active INTEGER NOT NULL DEFAULT 1
);";
