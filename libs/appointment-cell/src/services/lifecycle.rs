// libs/appointment-cell/src/services/lifecycle.rs
//
// Appointment lifecycle orchestrator. One status update is one unit of
// work: lock the appointment row, gate the transition, mutate the
// appointment, append the audit entry, cascade into the treatment plan,
// apply the no-show risk policy. PostgREST has no transactions, so the
// unit of work is held together by the per-appointment lock plus
// compensation of already-issued writes when a later step fails.
//
use chrono::{DateTime, Duration, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_utils::clock::{Clock, SystemClock};

use crate::models::{
    Actor, Appointment, AppointmentError, AppointmentStatus, AuditLogEntry, TransitionOutcome,
    UpdateStatusRequest,
};
use crate::services::audit::AuditTrailService;
use crate::services::cascade::{CascadeOutcome, PlanCascadeService};
use crate::services::risk::PatientRiskService;
use crate::services::transition::TransitionValidator;

pub struct AppointmentLifecycleService {
    supabase: SupabaseClient,
    validator: TransitionValidator,
    audit: AuditTrailService,
    cascade: PlanCascadeService,
    risk: PatientRiskService,
    clock: Arc<dyn Clock>,
    lock_timeout_seconds: i64,
    max_lock_attempts: u32,
}

impl AppointmentLifecycleService {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &AppConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            validator: TransitionValidator::new(),
            audit: AuditTrailService::new(config),
            cascade: PlanCascadeService::new(config),
            risk: PatientRiskService::new(config),
            clock,
            lock_timeout_seconds: 30,
            max_lock_attempts: 3,
        }
    }

    pub fn validator(&self) -> &TransitionValidator {
        &self.validator
    }

    pub fn audit(&self) -> &AuditTrailService {
        &self.audit
    }

    // ==========================================================================
    // PUBLIC OPERATIONS
    // ==========================================================================

    pub async fn get_appointment_by_code(
        &self,
        code: &str,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?code=eq.{}", urlencoding::encode(code));
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let row = rows.into_iter().next().ok_or(AppointmentError::NotFound)?;
        serde_json::from_value(row).map_err(|e| AppointmentError::DatabaseError(e.to_string()))
    }

    /// Advances an appointment through its lifecycle. Holds the
    /// per-appointment lock for the duration so two front-desk operations
    /// on the same appointment serialize; the loser re-evaluates against
    /// the status the winner left behind.
    #[instrument(skip(self, auth_token), fields(code = %code, requested = %request.status))]
    pub async fn update_status(
        &self,
        code: &str,
        request: UpdateStatusRequest,
        actor: Actor,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        info!("Status update requested for appointment {} by {}", code, actor);

        let lock_key = format!("appointment_{}", code);
        self.acquire_lock(&lock_key, code, auth_token).await?;

        let result = self.locked_update(code, &request, actor, auth_token).await;

        // The lock must come off even when the update failed; a stuck lock
        // only clears via expiry
        if let Err(e) = self.release_lock(&lock_key, auth_token).await {
            warn!("Failed to release lock {}: {}", lock_key, e);
        }

        result
    }

    // ==========================================================================
    // UNIT OF WORK
    // ==========================================================================

    async fn locked_update(
        &self,
        code: &str,
        request: &UpdateStatusRequest,
        actor: Actor,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        // Step 1: fresh read under the lock
        let appointment = self.get_appointment_by_code(code, auth_token).await?;
        let now = self.clock.now();

        // Step 2: transition gate. A rejection is an expected outcome, not
        // a fault; it leaves no writes behind.
        let outcome = self
            .validator
            .validate(
                appointment.status,
                request.status,
                appointment.scheduled_start_time,
                appointment.scheduled_end_time,
                now,
                request.reason_code.as_deref(),
            )
            .map_err(|e| {
                warn!("Transition rejected for appointment {}: {}", code, e);
                e
            })?;

        // Step 3: appointment mutation, issued and acknowledged before any
        // dependent write so later re-reads observe it
        let updated = self
            .persist_transition(&appointment, request, outcome, now, auth_token)
            .await?;

        // Step 4: audit entry
        let audit_entry = match self
            .audit
            .record_status_change(
                updated.id,
                appointment.status,
                updated.status,
                actor,
                request.reason_code.as_deref(),
                request.notes.as_deref(),
                now,
                auth_token,
            )
            .await
        {
            Ok(entry) => entry,
            Err(e) => {
                error!("Audit write failed for appointment {}: {}", code, e);
                self.rollback_appointment(&appointment, auth_token).await;
                return Err(e);
            }
        };

        // Step 5: plan cascade. The direct item writes are fatal on
        // failure; a partial write is restored inside the cascade service
        // before the error surfaces.
        let cascade_outcome = if updated.status.triggers_plan_cascade() {
            match self
                .cascade
                .apply_item_updates(updated.id, updated.status, now, auth_token)
                .await
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(
                        "Plan cascade failed for appointment {} (attempted status {}): {}",
                        updated.id, updated.status, e
                    );
                    self.unwind(&appointment, &audit_entry, None, auth_token).await;
                    return Err(e);
                }
            }
        } else {
            CascadeOutcome::default()
        };

        // Step 6: patient risk policy
        if let Err(e) = self
            .risk
            .apply(&updated, updated.status, appointment.status, actor, now, auth_token)
            .await
        {
            error!(
                "Risk policy write failed for appointment {} (attempted status {}): {}",
                updated.id, updated.status, e
            );
            self.unwind(&appointment, &audit_entry, Some(&cascade_outcome), auth_token)
                .await;
            return Err(e);
        }

        // Step 7: completion rollup, last so no fatal step can strand a
        // phase or plan marked completed against restored items
        if updated.status == AppointmentStatus::Completed {
            if let Err(e) = self
                .cascade
                .rollup_completions(&cascade_outcome, now.date_naive(), auth_token)
                .await
            {
                // Convenience rollup over fresh reads; the next completion
                // re-derives it, so the update still counts as a success
                error!(
                    "Phase/plan completion rollup failed for appointment {}: {}",
                    updated.id, e
                );
            }
        }

        info!(
            "Appointment {} moved {} -> {}",
            code, appointment.status, updated.status
        );
        Ok(updated)
    }

    async fn persist_transition(
        &self,
        appointment: &Appointment,
        request: &UpdateStatusRequest,
        outcome: TransitionOutcome,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let mut update_data = serde_json::Map::new();
        update_data.insert("status".to_string(), json!(request.status));
        if outcome.set_actual_start {
            update_data.insert("actual_start_time".to_string(), json!(now.to_rfc3339()));
        }
        if outcome.set_actual_end {
            update_data.insert("actual_end_time".to_string(), json!(now.to_rfc3339()));
        }
        if let Some(notes) = &request.notes {
            update_data.insert("notes".to_string(), json!(notes));
        }
        update_data.insert("updated_at".to_string(), json!(now.to_rfc3339()));

        let path = format!(
            "/rest/v1/appointments?code=eq.{}",
            urlencoding::encode(&appointment.code)
        );
        let rows: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(Value::Object(update_data)),
                Some(SupabaseClient::returning_representation()),
            )
            .await
            .map_err(|e| AppointmentError::DatabaseError(format!("Appointment write failed: {}", e)))?;

        let row = rows.into_iter().next().ok_or(AppointmentError::NotFound)?;
        serde_json::from_value(row).map_err(|e| AppointmentError::DatabaseError(e.to_string()))
    }

    /// Unwinds the unit of work after a fatal step: plan items back to
    /// their snapshots, audit entry out, appointment back to its prior
    /// row. Best-effort by necessity; every failure is logged loudly.
    async fn unwind(
        &self,
        prior: &Appointment,
        audit_entry: &AuditLogEntry,
        cascade_outcome: Option<&CascadeOutcome>,
        auth_token: &str,
    ) {
        if let Some(outcome) = cascade_outcome {
            self.cascade
                .unwind_item_updates(&outcome.prior_items, auth_token)
                .await;
        }
        if let Err(e) = self.audit.remove_entry(audit_entry.id, auth_token).await {
            error!("Audit entry {} could not be removed during rollback: {}", audit_entry.id, e);
        }
        self.rollback_appointment(prior, auth_token).await;
    }

    async fn rollback_appointment(&self, prior: &Appointment, auth_token: &str) {
        let update_data = json!({
            "status": prior.status,
            "actual_start_time": prior.actual_start_time.map(|t| t.to_rfc3339()),
            "actual_end_time": prior.actual_end_time.map(|t| t.to_rfc3339()),
            "notes": prior.notes,
            "updated_at": Utc::now().to_rfc3339(),
        });

        let path = format!(
            "/rest/v1/appointments?code=eq.{}",
            urlencoding::encode(&prior.code)
        );
        let result: Result<Vec<Value>, _> = self
            .supabase
            .request(Method::PATCH, &path, Some(auth_token), Some(update_data))
            .await;

        match result {
            Ok(_) => info!("Appointment {} restored to {} after failed update", prior.code, prior.status),
            Err(e) => error!(
                "Appointment {} could not be restored after failed update, manual reconciliation needed: {}",
                prior.code, e
            ),
        }
    }

    // ==========================================================================
    // APPOINTMENT LOCK
    // ==========================================================================

    /// Exclusive per-appointment lock backed by a lock table. A concurrent
    /// caller retries with backoff until the holder commits or the lock
    /// expires, then re-reads the appointment and re-runs the gate.
    async fn acquire_lock(
        &self,
        lock_key: &str,
        code: &str,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        for attempt in 1..=self.max_lock_attempts {
            debug!("Lock attempt {} for {}", attempt, lock_key);

            if self.try_acquire_lock(lock_key, code, auth_token).await? {
                return Ok(());
            }

            if self.cleanup_expired_lock(lock_key, auth_token).await?
                && self.try_acquire_lock(lock_key, code, auth_token).await?
            {
                return Ok(());
            }

            if attempt < self.max_lock_attempts {
                tokio::time::sleep(tokio::time::Duration::from_millis(100 * attempt as u64)).await;
            }
        }

        warn!("Could not acquire lock {} after {} attempts", lock_key, self.max_lock_attempts);
        Err(AppointmentError::LockContention)
    }

    async fn try_acquire_lock(
        &self,
        lock_key: &str,
        code: &str,
        auth_token: &str,
    ) -> Result<bool, AppointmentError> {
        let now = Utc::now();
        let lock_data = json!({
            "lock_key": lock_key,
            "appointment_code": code,
            "acquired_at": now.to_rfc3339(),
            "expires_at": (now + Duration::seconds(self.lock_timeout_seconds)).to_rfc3339(),
            "process_id": format!("lifecycle_{}", Uuid::new_v4()),
        });

        // The unique key on lock_key makes the insert fail while another
        // holder is active
        match self
            .supabase
            .request::<Value>(
                Method::POST,
                "/rest/v1/appointment_locks",
                Some(auth_token),
                Some(lock_data),
            )
            .await
        {
            Ok(_) => {
                debug!("Lock acquired: {}", lock_key);
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }

    async fn cleanup_expired_lock(
        &self,
        lock_key: &str,
        auth_token: &str,
    ) -> Result<bool, AppointmentError> {
        let path = format!(
            "/rest/v1/appointment_locks?lock_key=eq.{}&select=*",
            urlencoding::encode(lock_key)
        );
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(format!("Lock check failed: {}", e)))?;

        if let Some(lock) = rows.first() {
            if let Some(expires_at_str) = lock.get("expires_at").and_then(|v| v.as_str()) {
                if let Ok(expires_at) = DateTime::parse_from_rfc3339(expires_at_str) {
                    if expires_at.with_timezone(&Utc) < Utc::now() {
                        self.release_lock(lock_key, auth_token).await?;
                        return Ok(true);
                    }
                }
            }
        }

        Ok(false)
    }

    async fn release_lock(&self, lock_key: &str, auth_token: &str) -> Result<(), AppointmentError> {
        let path = format!(
            "/rest/v1/appointment_locks?lock_key=eq.{}",
            urlencoding::encode(lock_key)
        );
        let _rows: Vec<Value> = self
            .supabase
            .request(Method::DELETE, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(format!("Lock release failed: {}", e)))?;

        debug!("Lock released: {}", lock_key);
        Ok(())
    }
}
