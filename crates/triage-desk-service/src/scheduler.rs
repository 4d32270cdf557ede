// crates/triage-desk-service/src/scheduler.rs
// ============================================================================
// Module: SLA Scheduler
// Description: Periodic loop for unclaimed nudges and summary auto-closes.
// Purpose: Drive time-based side effects with at-most-once-per-trigger
//          semantics.
// Dependencies: tokio, tracing, triage-desk-config, triage-desk-core
// ============================================================================

//! ## Overview
//! A single cooperative loop ticks every configured interval. Each tick
//! posts reminders for incidents still unclaimed past the SLA threshold,
//! auto-closes incidents whose resolution summary timed out, and drains the
//! notification queue. Reminder at-most-once is tracked in a process-local
//! map keyed by incident id with the `t_department_assigned` snapshot as the
//! value, so a re-assignment naturally re-arms the nudge. Concurrency with
//! the router is mediated entirely by the store's writer lock: an auto-close
//! racing a human resolve loses with a state conflict and is skipped.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use triage_desk_config::TriageConfig;
use triage_desk_core::ChatAdapter;
use triage_desk_core::Clock;
use triage_desk_core::Incident;
use triage_desk_core::IncidentId;
use triage_desk_core::LifecycleError;
use triage_desk_core::TriageStore;
use triage_desk_core::render;

use crate::notifications;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Reminder map entries above this count trigger a full clear.
const REMINDER_CACHE_CAP: usize = 1_000;

// ============================================================================
// SECTION: Scheduler
// ============================================================================

/// Periodic SLA loop.
///
/// # Invariants
/// - The loop is single-threaded with respect to itself.
/// - The reminder map is owned here and touched nowhere else.
pub struct Scheduler<S, A> {
    /// Lifecycle store.
    store: Arc<S>,
    /// Outbound chat transport.
    adapter: Arc<A>,
    /// Process configuration (thresholds, tick interval).
    config: Arc<TriageConfig>,
    /// Time source for reminder age rendering.
    clock: Arc<dyn Clock>,
    /// Incidents already nudged, keyed to their assignment snapshot.
    reminded: HashMap<IncidentId, String>,
}

impl<S: TriageStore, A: ChatAdapter> Scheduler<S, A> {
    /// Creates a scheduler over the store, adapter, and configuration.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        adapter: Arc<A>,
        config: Arc<TriageConfig>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            adapter,
            config,
            clock,
            reminded: HashMap::new(),
        }
    }

    /// Runs the loop until the shutdown signal flips.
    ///
    /// The in-flight tick always completes; partial effects are impossible
    /// because every store action is one transaction.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        let period = Duration::from_secs(self.config.reminder_interval_seconds());
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(period_seconds = period.as_secs(), "scheduler started");
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("scheduler stopping");
                        return;
                    }
                }
            }
        }
    }

    /// Runs one full tick: nudges, timeouts, notification drain, cleanup.
    pub async fn tick(&mut self) {
        let nudges = match self.check_unclaimed().await {
            Ok(count) => count,
            Err(err) => {
                tracing::error!(error = %err, "unclaimed check failed");
                0
            }
        };
        let closures = match self.check_summary_timeouts().await {
            Ok(count) => count,
            Err(err) => {
                tracing::error!(error = %err, "summary timeout check failed");
                0
            }
        };
        match notifications::drain(self.store.as_ref(), self.adapter.as_ref()).await {
            Ok(delivered) if delivered > 0 => {
                tracing::info!(delivered, "notifications delivered");
            }
            Ok(_) => {}
            Err(err) => {
                tracing::error!(error = %err, "notification drain failed");
            }
        }
        if nudges > 0 || closures > 0 {
            tracing::info!(nudges, closures, "tick complete");
        }
        if self.reminded.len() > REMINDER_CACHE_CAP {
            tracing::info!(entries = self.reminded.len(), "clearing reminder cache");
            self.reminded.clear();
        }
    }

    /// Clears the reminder entry for one incident.
    pub fn clear_reminder(&mut self, incident: &IncidentId) {
        self.reminded.remove(incident);
    }

    // ------------------------------------------------------------------
    // Unclaimed nudges
    // ------------------------------------------------------------------

    /// Posts reminders for incidents unclaimed past the SLA threshold.
    async fn check_unclaimed(&mut self) -> Result<usize, LifecycleError> {
        let due = self.store.unclaimed_incidents(self.config.sla_unclaimed_nudge_minutes)?;
        let mut sent = 0_usize;
        for incident in due {
            let Some(assigned_at) = incident.t_department_assigned else {
                continue;
            };
            let snapshot = assigned_at.to_storage();
            if self.reminded.get(&incident.incident_id) == Some(&snapshot) {
                continue;
            }
            match self.send_unclaimed_reminder(&incident).await {
                Ok(true) => {
                    self.reminded.insert(incident.incident_id.clone(), snapshot);
                    sent += 1;
                }
                // Delivery failed or the group is inactive; the next tick
                // retries. A duplicate nudge is acceptable, a missed one is
                // not.
                Ok(false) => {}
                Err(err) => {
                    tracing::error!(
                        incident = incident.incident_id.as_str(),
                        error = %err,
                        "unclaimed reminder failed"
                    );
                }
            }
        }
        Ok(sent)
    }

    /// Builds and posts one unclaimed reminder; returns whether it was
    /// delivered.
    async fn send_unclaimed_reminder(&self, incident: &Incident) -> Result<bool, LifecycleError> {
        let membership = self.store.membership(incident.group_id)?;
        let Some(membership) = membership else {
            tracing::warn!(
                incident = incident.incident_id.as_str(),
                "no group membership for reminder"
            );
            return Ok(false);
        };
        if !membership.is_active {
            tracing::info!(
                incident = incident.incident_id.as_str(),
                group = incident.group_id.get(),
                "skipping reminder for inactive group"
            );
            return Ok(false);
        }

        let anchor = incident.t_department_assigned.unwrap_or(incident.t_created);
        let minutes = self.clock.now().minutes_since(anchor);
        let department_name = match incident.department_id {
            Some(department) => {
                self.store.department(department)?.map(|record| record.name)
            }
            None => None,
        };
        let text = render::unclaimed_reminder(
            &incident.incident_id,
            minutes,
            department_name.as_deref(),
        );
        match self.adapter.send(incident.group_id, &text, incident.pinned_message_id, None).await {
            Ok(_) => Ok(true),
            Err(err) => {
                tracing::error!(
                    incident = incident.incident_id.as_str(),
                    error = %err,
                    "reminder delivery failed"
                );
                Ok(false)
            }
        }
    }

    // ------------------------------------------------------------------
    // Summary timeouts
    // ------------------------------------------------------------------

    /// Auto-closes incidents whose summary wait exceeded the threshold.
    async fn check_summary_timeouts(&mut self) -> Result<usize, LifecycleError> {
        let minutes = self.config.sla_summary_timeout_minutes;
        let due = self.store.awaiting_summary_incidents(minutes)?;
        let mut closed = 0_usize;
        for incident in due {
            let pending_handle = self
                .store
                .user_handle_or_fallback(incident.pending_resolution_by_user_id)
                .unwrap_or_else(|_| "Unknown".to_string());
            let summary = render::auto_close_summary(&pending_handle, minutes);
            match self.store.auto_close(&incident.incident_id, &summary, "summary_timeout") {
                Ok(()) => {}
                Err(LifecycleError::StateConflict(reason)) => {
                    // A human resolve committed first; their transaction won.
                    tracing::info!(
                        incident = incident.incident_id.as_str(),
                        reason,
                        "skipping auto-close"
                    );
                    continue;
                }
                Err(err) => {
                    tracing::error!(
                        incident = incident.incident_id.as_str(),
                        error = %err,
                        "auto-close failed"
                    );
                    continue;
                }
            }

            self.publish_auto_close(&incident, &pending_handle, minutes).await;
            self.reminded.remove(&incident.incident_id);
            closed += 1;
            tracing::info!(incident = incident.incident_id.as_str(), "auto-closed");
        }
        Ok(closed)
    }

    /// Edits, unpins, and posts the notice after a committed auto-close.
    async fn publish_auto_close(&self, incident: &Incident, pending_handle: &str, minutes: u64) {
        let updated = match self.store.incident(&incident.incident_id) {
            Ok(Some(updated)) => updated,
            Ok(None) | Err(_) => {
                tracing::warn!(
                    incident = incident.incident_id.as_str(),
                    "incident missing after auto-close"
                );
                return;
            }
        };
        let (closed_text, _) = render::closed_view(
            &updated,
            Some(pending_handle),
            "No resolution summary received",
        );
        if let Some(pinned) = updated.pinned_message_id {
            if let Err(err) =
                self.adapter.edit(updated.group_id, pinned, &closed_text, None).await
            {
                tracing::error!(
                    incident = incident.incident_id.as_str(),
                    error = %err,
                    "closed view edit failed"
                );
            }
            if let Err(err) = self.adapter.unpin(updated.group_id, pinned).await {
                tracing::warn!(
                    incident = incident.incident_id.as_str(),
                    error = %err,
                    "unpin failed"
                );
            }
        } else if let Err(err) =
            self.adapter.send(updated.group_id, &closed_text, None, None).await
        {
            tracing::error!(
                incident = incident.incident_id.as_str(),
                error = %err,
                "closed view send failed"
            );
        }

        let notice =
            render::auto_close_notice(&incident.incident_id, pending_handle, minutes);
        if let Err(err) = self
            .adapter
            .send(updated.group_id, &notice, updated.pinned_message_id, None)
            .await
        {
            tracing::error!(
                incident = incident.incident_id.as_str(),
                error = %err,
                "auto-close notice failed"
            );
        }
    }
}
