// crates/triage-desk-core/src/core/render.rs
// ============================================================================
// Module: Message Renderer
// Description: State-view texts, button matrices, and the callback grammar.
// Purpose: Render every incident state deterministically from a snapshot.
// Dependencies: crate::core::{directory, identifiers, incident}, thiserror
// ============================================================================

//! ## Overview
//! Pure rendering of chat messages and inline button matrices. Every builder
//! is a function of the incident snapshot and its arguments only, so
//! re-rendering a snapshot yields byte-equal output. User-provided text is
//! HTML-escaped; descriptions are additionally italicized.
//!
//! Callback payloads follow the grammar
//! `action ":" incident_id [":" department_id]` and round-trip through
//! [`CallbackData::encode`] / [`CallbackData::parse`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::directory::Department;
use crate::core::identifiers::DepartmentId;
use crate::core::identifiers::IncidentId;
use crate::core::incident::Incident;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Divider line used in every state view.
const DIVIDER: &str = "------------------------------";

/// Maximum characters the chat platform accepts in one message.
pub const MAX_MESSAGE_CHARS: usize = 4096;

/// Buttons per keyboard row in department menus.
const MENU_BUTTONS_PER_ROW: usize = 2;

// ============================================================================
// SECTION: Buttons
// ============================================================================

/// One inline button.
///
/// # Invariants
/// - `callback` encodes a valid [`CallbackData`] payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    /// Visible button label.
    pub label: String,
    /// Callback payload delivered when tapped.
    pub callback: String,
}

impl Button {
    /// Creates a button from a label and callback payload.
    #[must_use]
    pub fn new(label: impl Into<String>, callback: &CallbackData) -> Self {
        Self {
            label: label.into(),
            callback: callback.encode(),
        }
    }
}

/// Inline keyboard: rows of buttons.
pub type ButtonRows = Vec<Vec<Button>>;

// ============================================================================
// SECTION: Callback Grammar
// ============================================================================

/// Callback payload parsing errors.
///
/// # Invariants
/// - The offending payload is echoed for alert rendering.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CallbackParseError {
    /// The action token is not part of the grammar.
    #[error("unknown callback action: {0}")]
    UnknownAction(String),
    /// The payload shape does not match the action's arity.
    #[error("malformed callback payload: {0}")]
    Malformed(String),
}

/// Decoded inline-button callback payload.
///
/// # Invariants
/// - `encode` output parses back to an equal value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackData {
    /// Initial department selection by the reporter.
    SelectDepartment {
        /// Target incident.
        incident_id: IncidentId,
        /// Chosen department.
        department_id: DepartmentId,
    },
    /// Confirmed department transfer.
    ReassignDepartment {
        /// Target incident.
        incident_id: IncidentId,
        /// New department.
        department_id: DepartmentId,
    },
    /// Open the transfer menu.
    ChangeDepartment {
        /// Target incident.
        incident_id: IncidentId,
    },
    /// Return from the transfer menu to the live view.
    RestoreView {
        /// Target incident.
        incident_id: IncidentId,
    },
    /// Join the incident.
    Claim {
        /// Target incident.
        incident_id: IncidentId,
    },
    /// Leave the incident.
    Release {
        /// Target incident.
        incident_id: IncidentId,
    },
    /// Request resolution.
    Resolve {
        /// Target incident.
        incident_id: IncidentId,
    },
}

impl CallbackData {
    /// Encodes the payload as `action:incident[:department]`.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Self::SelectDepartment {
                incident_id,
                department_id,
            } => format!("select_department:{incident_id}:{department_id}"),
            Self::ReassignDepartment {
                incident_id,
                department_id,
            } => format!("reassign_department:{incident_id}:{department_id}"),
            Self::ChangeDepartment { incident_id } => format!("change_department:{incident_id}"),
            Self::RestoreView { incident_id } => format!("restore_view:{incident_id}"),
            Self::Claim { incident_id } => format!("claim:{incident_id}"),
            Self::Release { incident_id } => format!("release:{incident_id}"),
            Self::Resolve { incident_id } => format!("resolve:{incident_id}"),
        }
    }

    /// Parses a raw callback payload.
    ///
    /// # Errors
    ///
    /// Returns [`CallbackParseError`] for unknown actions or payloads whose
    /// segment count does not match the action.
    pub fn parse(data: &str) -> Result<Self, CallbackParseError> {
        let mut parts = data.split(':');
        let action = parts.next().unwrap_or_default();
        let rest: Vec<&str> = parts.collect();
        match action {
            "select_department" | "reassign_department" => {
                let [incident, department] = rest.as_slice() else {
                    return Err(CallbackParseError::Malformed(data.to_string()));
                };
                let department_id = department
                    .parse::<i64>()
                    .map(DepartmentId::new)
                    .map_err(|_| CallbackParseError::Malformed(data.to_string()))?;
                let incident_id = parse_incident_segment(incident, data)?;
                if action == "select_department" {
                    Ok(Self::SelectDepartment {
                        incident_id,
                        department_id,
                    })
                } else {
                    Ok(Self::ReassignDepartment {
                        incident_id,
                        department_id,
                    })
                }
            }
            "change_department" | "restore_view" | "claim" | "release" | "resolve" => {
                let [incident] = rest.as_slice() else {
                    return Err(CallbackParseError::Malformed(data.to_string()));
                };
                let incident_id = parse_incident_segment(incident, data)?;
                Ok(match action {
                    "change_department" => Self::ChangeDepartment { incident_id },
                    "restore_view" => Self::RestoreView { incident_id },
                    "claim" => Self::Claim { incident_id },
                    "release" => Self::Release { incident_id },
                    _ => Self::Resolve { incident_id },
                })
            }
            other => Err(CallbackParseError::UnknownAction(other.to_string())),
        }
    }

    /// Returns the incident the payload targets.
    #[must_use]
    pub const fn incident_id(&self) -> &IncidentId {
        match self {
            Self::SelectDepartment { incident_id, .. }
            | Self::ReassignDepartment { incident_id, .. }
            | Self::ChangeDepartment { incident_id }
            | Self::RestoreView { incident_id }
            | Self::Claim { incident_id }
            | Self::Release { incident_id }
            | Self::Resolve { incident_id } => incident_id,
        }
    }
}

/// Validates a non-empty incident segment.
fn parse_incident_segment(segment: &str, payload: &str) -> Result<IncidentId, CallbackParseError> {
    if segment.is_empty() {
        return Err(CallbackParseError::Malformed(payload.to_string()));
    }
    Ok(IncidentId::new(segment))
}

// ============================================================================
// SECTION: Escaping
// ============================================================================

/// HTML-escapes user-provided text for chat rendering.
#[must_use]
pub fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Escapes and italicizes an incident description.
fn format_description(description: &str) -> String {
    format!("<i>{}</i>", escape_html(description))
}

// ============================================================================
// SECTION: State Views
// ============================================================================

/// Builds the department-selection menu view.
///
/// Used for the initial routing prompt and, with `back` set, for the
/// transfer menu. Restricted departments are marked with a lock.
#[must_use]
pub fn department_selection(
    incident: &Incident,
    departments: &[Department],
    prompt: &str,
    reassign: bool,
    back: bool,
) -> (String, ButtonRows) {
    let text = format!(
        "🚨 NEW TICKET\n{DIVIDER}\nID: {id}\nStatus: 🗂️ Choose department\n{DIVIDER}\nReported \
         by: {reporter}\nTicket:\n{description}\n{DIVIDER}\n{prompt}",
        id = escape_html(incident.incident_id.as_str()),
        reporter = escape_html(&incident.created_by_handle),
        description = format_description(&incident.description),
        prompt = escape_html(prompt),
    );

    let buttons: Vec<Button> = departments
        .iter()
        .map(|dept| {
            let label = if dept.restricted_to_department_members {
                format!("🔒 {}", dept.name)
            } else {
                dept.name.clone()
            };
            let callback = if reassign {
                CallbackData::ReassignDepartment {
                    incident_id: incident.incident_id.clone(),
                    department_id: dept.id,
                }
            } else {
                CallbackData::SelectDepartment {
                    incident_id: incident.incident_id.clone(),
                    department_id: dept.id,
                }
            };
            Button::new(label, &callback)
        })
        .collect();

    let mut rows: ButtonRows =
        buttons.chunks(MENU_BUTTONS_PER_ROW).map(<[Button]>::to_vec).collect();
    if back {
        rows.push(vec![Button::new(
            "⬅️ Back",
            &CallbackData::RestoreView {
                incident_id: incident.incident_id.clone(),
            },
        )]);
    }
    (text, rows)
}

/// Builds the view for an incident awaiting a department response.
#[must_use]
pub fn unclaimed_view(incident: &Incident, department_name: &str) -> (String, ButtonRows) {
    let text = format!(
        "🚨 WAITING FOR DEPARTMENT\n{DIVIDER}\nID: {id}\nDepartment: {dept}\nStatus: 🔔 Awaiting \
         response from department\n{DIVIDER}\nReported by: {reporter}\nTicket:\n{description}\n\
         {DIVIDER}\nTap Join if you're taking this. You can still change the department if it \
         belongs elsewhere.",
        id = escape_html(incident.incident_id.as_str()),
        dept = escape_html(department_name),
        reporter = escape_html(&incident.created_by_handle),
        description = format_description(&incident.description),
    );
    let rows = vec![
        vec![Button::new(
            "✅ Join",
            &CallbackData::Claim {
                incident_id: incident.incident_id.clone(),
            },
        )],
        vec![Button::new(
            "🔀 Change department",
            &CallbackData::ChangeDepartment {
                incident_id: incident.incident_id.clone(),
            },
        )],
    ];
    (text, rows)
}

/// Builds the view for an in-progress incident with active responders.
#[must_use]
pub fn claimed_view(
    incident: &Incident,
    claimer_handles: &[String],
    department_name: &str,
) -> (String, ButtonRows) {
    let responders = if claimer_handles.is_empty() {
        "—".to_string()
    } else {
        claimer_handles.join(", ")
    };
    let text = format!(
        "🚨 INCIDENT IN PROGRESS\n{DIVIDER}\nID: {id}\nDepartment: {dept}\nStatus: 🛠️ In \
         progress\nActive: {responders}\n{DIVIDER}\nReported by: {reporter}\nTicket:\n\
         {description}\n{DIVIDER}\nOthers from the department can join. Resolve when you've \
         handled it, or move it to another department if needed.",
        id = escape_html(incident.incident_id.as_str()),
        dept = escape_html(department_name),
        responders = escape_html(&responders),
        reporter = escape_html(&incident.created_by_handle),
        description = format_description(&incident.description),
    );
    let rows = vec![
        vec![
            Button::new(
                "✅ Join",
                &CallbackData::Claim {
                    incident_id: incident.incident_id.clone(),
                },
            ),
            Button::new(
                "❌ Leave",
                &CallbackData::Release {
                    incident_id: incident.incident_id.clone(),
                },
            ),
        ],
        vec![Button::new(
            "🏁 Resolve",
            &CallbackData::Resolve {
                incident_id: incident.incident_id.clone(),
            },
        )],
        vec![Button::new(
            "🔀 Change department",
            &CallbackData::ChangeDepartment {
                incident_id: incident.incident_id.clone(),
            },
        )],
    ];
    (text, rows)
}

/// Builds the view shown while a resolution summary is awaited.
#[must_use]
pub fn awaiting_summary_view(incident: &Incident, resolver_handle: &str) -> (String, ButtonRows) {
    let resolver = escape_html(resolver_handle);
    let text = format!(
        "📄 INCIDENT AWAITING RESOLUTION SUMMARY\n{DIVIDER}\nID: {id}\nResolver: \
         {resolver}\nStatus: ⌛ Awaiting summary\n{DIVIDER}\nReported by: {reporter}\nTicket:\n\
         {description}\n{DIVIDER}\n{resolver}, please reply to this message with a short \
         resolution summary (1–3 sentences).",
        id = escape_html(incident.incident_id.as_str()),
        reporter = escape_html(&incident.created_by_handle),
        description = format_description(&incident.description),
    );
    (text, Vec::new())
}

/// Builds the terminal view for a resolved incident.
#[must_use]
pub fn resolved_view(incident: &Incident, resolver_handle: &str) -> (String, ButtonRows) {
    let text = format!(
        "✅ INCIDENT RESOLVED\n{DIVIDER}\nID: {id}\nStatus: ✅ Resolved\nResolved by: \
         {resolver}\n{DIVIDER}\nReported by: {reporter}\nTicket:\n{description}\n{DIVIDER}\n\
         Resolution summary:\n{summary}",
        id = escape_html(incident.incident_id.as_str()),
        resolver = escape_html(resolver_handle),
        reporter = escape_html(&incident.created_by_handle),
        description = format_description(&incident.description),
        summary = escape_html(incident.resolution_summary.as_deref().unwrap_or_default()),
    );
    (text, Vec::new())
}

/// Builds the terminal view for an auto-closed incident.
#[must_use]
pub fn closed_view(
    incident: &Incident,
    closed_by: Option<&str>,
    reason: &str,
) -> (String, ButtonRows) {
    let text = format!(
        "❌ INCIDENT CLOSED\n{DIVIDER}\nID: {id}\nStatus: ❌ Closed\nClosed by: \
         {closed_by}\nReason: {reason}\n{DIVIDER}\nReported by: {reporter}\nTicket:\n\
         {description}\n{DIVIDER}\nResolution summary:\n{summary}",
        id = escape_html(incident.incident_id.as_str()),
        closed_by = escape_html(closed_by.unwrap_or("System")),
        reason = escape_html(reason),
        reporter = escape_html(&incident.created_by_handle),
        description = format_description(&incident.description),
        summary = escape_html(
            incident.resolution_summary.as_deref().unwrap_or("No summary provided.")
        ),
    );
    (text, Vec::new())
}

// ============================================================================
// SECTION: Auxiliary Messages
// ============================================================================

/// Builds the reply asking the resolver for a summary.
///
/// The text contains the literal incident id so the summary reply handler
/// can associate the response, and the phrase "resolution summary" that
/// marks the message as the resolve-completion channel.
#[must_use]
pub fn resolution_request(incident_id: &IncidentId, user_handle: &str) -> String {
    format!(
        "{user_handle}, please reply to this message with a short resolution summary for \
         {incident_id}.\nInclude what you did, the root cause (if known), and any follow-up \
         actions."
    )
}

/// Builds the SLA reminder posted for an unclaimed incident.
#[must_use]
pub fn unclaimed_reminder(
    incident_id: &IncidentId,
    minutes: u64,
    department_name: Option<&str>,
) -> String {
    let department_line =
        department_name.map_or(String::new(), |name| format!("Department: {name}\n"));
    format!(
        "⏰ Unassigned ticket reminder\n{DIVIDER}\nIncident: \
         {incident_id}\n{department_line}Unassigned for: {minutes} minutes\n{DIVIDER}\nPlease \
         review the pinned ticket message and join if you are taking ownership."
    )
}

/// Builds the short notice posted after a summary timeout closes a ticket.
#[must_use]
pub fn auto_close_notice(incident_id: &IncidentId, user_handle: &str, minutes: u64) -> String {
    format!(
        "Auto-closed {incident_id} after waiting {minutes} minutes for {user_handle}'s summary. \
         Reopen manually if more details are needed."
    )
}

/// Builds the closing summary recorded by a summary timeout.
#[must_use]
pub fn auto_close_summary(user_handle: &str, minutes: u64) -> String {
    format!(
        "Auto-closed after waiting {minutes} minutes for a resolution summary from \
         {user_handle}. No response received."
    )
}

/// Builds the department ping messages tagging the roster.
///
/// A single message with space-joined handles; split only when the rendered
/// text would exceed [`MAX_MESSAGE_CHARS`].
#[must_use]
pub fn department_ping(department_handles: &[String], incident_id: &IncidentId) -> Vec<String> {
    let render = |mentions: &str| {
        format!(
            "🔔 {mentions}\nPlease review ticket {incident_id} and join if you are taking \
             ownership."
        )
    };
    let joined = department_handles.join(" ");
    let single = render(&joined);
    if single.chars().count() <= MAX_MESSAGE_CHARS {
        return vec![single];
    }

    // Overhead of one rendered message with the mentions removed.
    let frame = render("").chars().count();
    let budget = MAX_MESSAGE_CHARS.saturating_sub(frame);
    let mut messages = Vec::new();
    let mut chunk = String::new();
    for handle in department_handles {
        let extra = handle.chars().count() + usize::from(!chunk.is_empty());
        if !chunk.is_empty() && chunk.chars().count() + extra > budget {
            messages.push(render(&chunk));
            chunk.clear();
        }
        if !chunk.is_empty() {
            chunk.push(' ');
        }
        chunk.push_str(handle);
    }
    if !chunk.is_empty() {
        messages.push(render(&chunk));
    }
    messages
}

// ============================================================================
// SECTION: Tests
// ============================================================================
