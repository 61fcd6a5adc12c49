// libs/appointment-cell/src/services/risk.rs
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use patient_cell::models::{BlockDetails, RiskUpdate};
use patient_cell::services::patient::PatientService;
use shared_config::AppConfig;

use crate::models::{Actor, Appointment, AppointmentError, AppointmentStatus};

/// Consecutive no-shows at which a patient's booking is blocked.
pub const BLOCK_THRESHOLD: i32 = 3;

pub const BLOCK_REASON: &str = "excessive_no_shows";

// ==============================================================================
// PURE POLICY
// ==============================================================================

/// Decides what, if anything, an appointment outcome does to the patient's
/// risk fields. Attendance resets the counter but never lifts an existing
/// block; unblocking is a separate manual action.
#[allow(clippy::too_many_arguments)]
pub fn assess(
    new_status: AppointmentStatus,
    old_status: AppointmentStatus,
    consecutive_no_shows: i32,
    already_blocked: bool,
    appointment_code: &str,
    actor: Actor,
    now: DateTime<Utc>,
) -> Option<RiskUpdate> {
    if new_status == old_status {
        return None;
    }

    match new_status {
        AppointmentStatus::NoShow => {
            let new_count = consecutive_no_shows + 1;
            let block = (new_count >= BLOCK_THRESHOLD && !already_blocked).then(|| BlockDetails {
                reason: BLOCK_REASON.to_string(),
                note: format!(
                    "Booking blocked after {} consecutive no-shows, most recently appointment {}",
                    new_count, appointment_code
                ),
                blocked_at: now,
                blocked_by: actor.staff_id(),
            });
            Some(RiskUpdate::RecordNoShow { new_count, block })
        }
        status if status.indicates_attendance() => {
            (consecutive_no_shows > 0).then_some(RiskUpdate::ResetCounter)
        }
        _ => None,
    }
}

// ==============================================================================
// RISK SERVICE
// ==============================================================================

/// Applies the no-show risk policy to the patient behind an appointment.
pub struct PatientRiskService {
    patients: PatientService,
}

impl PatientRiskService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            patients: PatientService::new(config),
        }
    }

    pub async fn apply(
        &self,
        appointment: &Appointment,
        new_status: AppointmentStatus,
        old_status: AppointmentStatus,
        actor: Actor,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        if new_status == old_status {
            return Ok(());
        }

        // Only no-shows and attendance outcomes touch the risk fields;
        // skip the patient read for everything else
        if new_status != AppointmentStatus::NoShow && !new_status.indicates_attendance() {
            debug!("Status {} has no risk-policy effect", new_status);
            return Ok(());
        }

        let patient = self
            .patients
            .get_patient(appointment.patient_id, auth_token)
            .await
            .map_err(|e| AppointmentError::DatabaseError(format!("Risk profile read failed: {}", e)))?;

        let Some(update) = assess(
            new_status,
            old_status,
            patient.consecutive_no_shows,
            patient.is_booking_blocked,
            &appointment.code,
            actor,
            now,
        ) else {
            return Ok(());
        };

        if let RiskUpdate::RecordNoShow { new_count, block } = &update {
            if block.is_some() {
                warn!(
                    "Patient {} reached {} consecutive no-shows, blocking bookings",
                    patient.id, new_count
                );
            }
        }

        self.patients
            .apply_risk_update(patient.id, &update, auth_token)
            .await
            .map_err(|e| AppointmentError::DatabaseError(format!("Risk profile write failed: {}", e)))?;

        info!("Risk policy applied for patient {}: {:?}", patient.id, update);
        Ok(())
    }
}
