// libs/appointment-cell/src/services/cascade.rs
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashSet;
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use treatment_plan_cell::models::{
    ItemStatus, PlanError, PlanStatus, TreatmentPlanItem, TreatmentPlanPhase,
};
use treatment_plan_cell::services::plan::TreatmentPlanService;

use crate::models::{AppointmentError, AppointmentStatus};

// ==============================================================================
// PURE CASCADE DECISIONS
// ==============================================================================

/// Item status an appointment outcome maps to, plus whether the item's
/// completion timestamp is stamped. `None` means the outcome does not touch
/// plan items (scheduled, checked-in).
pub fn item_target_for(status: AppointmentStatus) -> Option<(ItemStatus, bool)> {
    match status {
        AppointmentStatus::InProgress => Some((ItemStatus::InProgress, false)),
        AppointmentStatus::Completed => Some((ItemStatus::Completed, true)),
        // The slot came to nothing; the item goes back on the booking queue
        AppointmentStatus::Cancelled | AppointmentStatus::NoShow => {
            Some((ItemStatus::ReadyForBooking, false))
        }
        AppointmentStatus::Scheduled | AppointmentStatus::CheckedIn => None,
    }
}

/// A phase completes only when every item in it is completed or skipped.
pub fn phase_should_complete(items: &[TreatmentPlanItem]) -> bool {
    !items.is_empty() && items.iter().all(|item| item.status.counts_as_done())
}

/// A plan completes only when every phase is completed and the plan is not
/// already terminally statused.
pub fn plan_should_complete(phases: &[TreatmentPlanPhase], plan_status: PlanStatus) -> bool {
    !plan_status.is_terminal()
        && !phases.is_empty()
        && phases
            .iter()
            .all(|phase| phase.status == treatment_plan_cell::models::PhaseStatus::Completed)
}

// ==============================================================================
// CASCADE SERVICE
// ==============================================================================

/// Result of the direct item writes: the fresh rows plus the prior
/// snapshots the orchestrator needs if it later has to unwind.
#[derive(Debug, Default)]
pub struct CascadeOutcome {
    pub updated_items: Vec<TreatmentPlanItem>,
    pub prior_items: Vec<TreatmentPlanItem>,
}

/// Propagates an appointment status change into the treatment-plan
/// hierarchy. The direct item writes are correctness-critical; the
/// phase/plan completion rollup is a convenience and is classified
/// separately so the orchestrator can swallow its failures.
pub struct PlanCascadeService {
    plans: TreatmentPlanService,
}

impl PlanCascadeService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            plans: TreatmentPlanService::new(config),
        }
    }

    /// Applies the mapped item status to every plan item linked to the
    /// appointment. Zero linked items is a valid no-op. Any failure here is
    /// fatal to the whole unit of work; items already written by the time it
    /// strikes are restored here, so the caller never sees a half-applied
    /// cascade.
    pub async fn apply_item_updates(
        &self,
        appointment_id: Uuid,
        new_status: AppointmentStatus,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<CascadeOutcome, AppointmentError> {
        let Some((target_status, stamp_completion)) = item_target_for(new_status) else {
            return Ok(CascadeOutcome::default());
        };

        let items = self
            .plans
            .items_for_appointment(appointment_id, auth_token)
            .await
            .map_err(|e| AppointmentError::CascadeFailed(e.to_string()))?;

        if items.is_empty() {
            debug!("No plan items linked to appointment {}", appointment_id);
            return Ok(CascadeOutcome::default());
        }

        let completed_at = stamp_completion.then_some(now);
        let mut outcome = CascadeOutcome::default();

        for item in items {
            match self
                .plans
                .update_item_status(item.id, target_status, completed_at, auth_token)
                .await
            {
                Ok(updated) => {
                    outcome.prior_items.push(item);
                    outcome.updated_items.push(updated);
                }
                Err(e) => {
                    self.unwind_item_updates(&outcome.prior_items, auth_token).await;
                    return Err(AppointmentError::CascadeFailed(format!(
                        "item {} -> {}: {}",
                        item.id, target_status, e
                    )));
                }
            }
        }

        info!(
            "Cascaded appointment {} status {} into {} plan item(s)",
            appointment_id,
            new_status,
            outcome.updated_items.len()
        );

        Ok(outcome)
    }

    /// Bottom-up completion rollup, run only for completed appointments.
    /// Re-reads phases and items fresh so updates from other paths are
    /// seen; re-running it with nothing changed writes nothing.
    pub async fn rollup_completions(
        &self,
        outcome: &CascadeOutcome,
        today: NaiveDate,
        auth_token: &str,
    ) -> Result<(), PlanError> {
        let phase_ids: HashSet<Uuid> = outcome.updated_items.iter().map(|i| i.phase_id).collect();
        let mut touched_plan_ids: HashSet<Uuid> = HashSet::new();

        for phase_id in phase_ids {
            let phase = self.plans.get_phase(phase_id, auth_token).await?;
            touched_plan_ids.insert(phase.plan_id);

            // Skip the write when the phase is already closed, so a re-run
            // never moves its completion date
            if phase.status == treatment_plan_cell::models::PhaseStatus::Completed {
                continue;
            }

            let items = self.plans.items_in_phase(phase_id, auth_token).await?;
            if phase_should_complete(&items) {
                self.plans
                    .mark_phase_completed(phase_id, today, auth_token)
                    .await?;
                info!("Phase {} auto-completed", phase_id);
            }
        }

        for plan_id in touched_plan_ids {
            let plan = self.plans.get_plan(plan_id, auth_token).await?;
            let phases = self.plans.phases_in_plan(plan_id, auth_token).await?;
            if plan_should_complete(&phases, plan.status) {
                self.plans.mark_plan_completed(plan_id, auth_token).await?;
                info!("Plan {} auto-completed", plan_id);
            }
        }

        Ok(())
    }

    /// Best-effort restoration of the prior item snapshots when a later
    /// step of the unit of work fails. Individual restore failures are
    /// logged and skipped; stopping halfway would leave even more drift.
    pub async fn unwind_item_updates(&self, prior_items: &[TreatmentPlanItem], auth_token: &str) {
        for snapshot in prior_items {
            if let Err(e) = self.plans.restore_item(snapshot, auth_token).await {
                tracing::error!(
                    "Failed to restore plan item {} during rollback: {}",
                    snapshot.id,
                    e
                );
            }
        }
    }
}
