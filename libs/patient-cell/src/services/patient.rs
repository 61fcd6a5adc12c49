// libs/patient-cell/src/services/patient.rs
use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{Patient, PatientError, RiskUpdate};

pub struct PatientService {
    supabase: SupabaseClient,
}

impl PatientService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn get_patient(&self, patient_id: Uuid, auth_token: &str) -> Result<Patient, PatientError> {
        debug!("Fetching patient profile: {}", patient_id);

        let path = format!("/rest/v1/patients?id=eq.{}", patient_id);
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| PatientError::DatabaseError(e.to_string()))?;

        let row = rows.into_iter().next().ok_or(PatientError::NotFound)?;
        serde_json::from_value(row).map_err(|e| PatientError::DatabaseError(e.to_string()))
    }

    /// Persists a risk-policy decision. The block flag is only ever raised
    /// here; lowering it goes through [`unblock`](Self::unblock).
    pub async fn apply_risk_update(
        &self,
        patient_id: Uuid,
        update: &RiskUpdate,
        auth_token: &str,
    ) -> Result<(), PatientError> {
        let mut update_data = serde_json::Map::new();

        match update {
            RiskUpdate::RecordNoShow { new_count, block } => {
                update_data.insert("consecutive_no_shows".to_string(), json!(new_count));
                if let Some(block) = block {
                    update_data.insert("is_booking_blocked".to_string(), json!(true));
                    update_data.insert("block_reason".to_string(), json!(block.reason));
                    update_data.insert("block_note".to_string(), json!(block.note));
                    update_data.insert("blocked_at".to_string(), json!(block.blocked_at.to_rfc3339()));
                    update_data.insert("blocked_by".to_string(), json!(block.blocked_by));
                }
            }
            RiskUpdate::ResetCounter => {
                update_data.insert("consecutive_no_shows".to_string(), json!(0));
            }
        }

        update_data.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let path = format!("/rest/v1/patients?id=eq.{}", patient_id);
        let _rows: Vec<Value> = self
            .supabase
            .request(Method::PATCH, &path, Some(auth_token), Some(Value::Object(update_data)))
            .await
            .map_err(|e| PatientError::DatabaseError(e.to_string()))?;

        debug!("Applied risk update to patient {}: {:?}", patient_id, update);
        Ok(())
    }

    /// Manual unblock. Clears the block and zeroes the no-show counter so
    /// the patient does not trip the threshold again on their next miss.
    pub async fn unblock(
        &self,
        patient_id: Uuid,
        unblocked_by: Uuid,
        auth_token: &str,
    ) -> Result<Patient, PatientError> {
        let patient = self.get_patient(patient_id, auth_token).await?;
        if !patient.is_booking_blocked {
            return Err(PatientError::NotBlocked);
        }

        let update_data = json!({
            "is_booking_blocked": false,
            "block_reason": null,
            "block_note": null,
            "blocked_at": null,
            "blocked_by": null,
            "consecutive_no_shows": 0,
            "updated_at": Utc::now().to_rfc3339(),
        });

        let path = format!("/rest/v1/patients?id=eq.{}", patient_id);
        let rows: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(update_data),
                Some(SupabaseClient::returning_representation()),
            )
            .await
            .map_err(|e| PatientError::DatabaseError(e.to_string()))?;

        info!("Patient {} unblocked by {}", patient_id, unblocked_by);

        let row = rows.into_iter().next().ok_or(PatientError::NotFound)?;
        serde_json::from_value(row).map_err(|e| PatientError::DatabaseError(e.to_string()))
    }
}
