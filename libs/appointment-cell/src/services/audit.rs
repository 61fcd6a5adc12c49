// libs/appointment-cell/src/services/audit.rs
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{Actor, AppointmentError, AppointmentStatus, AuditAction, AuditLogEntry};

/// Append-only audit trail of appointment state changes. Entries are never
/// edited; the single delete path exists so an aborted unit of work can
/// take its own entry back out.
pub struct AuditTrailService {
    supabase: SupabaseClient,
}

impl AuditTrailService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn record_status_change(
        &self,
        appointment_id: Uuid,
        old_status: AppointmentStatus,
        new_status: AppointmentStatus,
        actor: Actor,
        reason_code: Option<&str>,
        note: Option<&str>,
        recorded_at: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<AuditLogEntry, AppointmentError> {
        // Client-generated id so the compensation path can address the row
        let entry = AuditLogEntry {
            id: Uuid::new_v4(),
            appointment_id,
            performed_by: actor.staff_id(),
            action: AuditAction::StatusChange,
            reason_code: reason_code.map(str::to_string),
            old_status,
            new_status,
            note: note.map(str::to_string),
            created_at: recorded_at,
        };

        debug!(
            "Recording audit entry {} for appointment {}: {} -> {} by {}",
            entry.id, appointment_id, old_status, new_status, actor
        );

        let entry_data = json!({
            "id": entry.id,
            "appointment_id": entry.appointment_id,
            "performed_by": entry.performed_by,
            "action": entry.action,
            "reason_code": entry.reason_code,
            "old_status": entry.old_status,
            "new_status": entry.new_status,
            "note": entry.note,
            "created_at": entry.created_at.to_rfc3339(),
        });

        let _rows: Vec<Value> = self
            .supabase
            .request(
                Method::POST,
                "/rest/v1/appointment_audit_log",
                Some(auth_token),
                Some(entry_data),
            )
            .await
            .map_err(|e| AppointmentError::DatabaseError(format!("Audit write failed: {}", e)))?;

        Ok(entry)
    }

    pub async fn entries_for_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<AuditLogEntry>, AppointmentError> {
        let path = format!(
            "/rest/v1/appointment_audit_log?appointment_id=eq.{}&order=created_at.desc",
            appointment_id
        );
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        rows.into_iter()
            .map(|row| {
                serde_json::from_value(row).map_err(|e| AppointmentError::DatabaseError(e.to_string()))
            })
            .collect()
    }

    /// Compensation only: removes the entry written by a unit of work that
    /// subsequently failed and rolled back its appointment mutation.
    pub async fn remove_entry(&self, entry_id: Uuid, auth_token: &str) -> Result<(), AppointmentError> {
        debug!("Removing audit entry {} during rollback", entry_id);

        let path = format!("/rest/v1/appointment_audit_log?id=eq.{}", entry_id);
        let _rows: Vec<Value> = self
            .supabase
            .request(Method::DELETE, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(format!("Audit rollback failed: {}", e)))?;

        Ok(())
    }
}
