// libs/patient-cell/src/models.rs
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,
    pub date_of_birth: NaiveDate,
    // No-show risk profile. The counter and flag are written only by the
    // appointment lifecycle engine and the manual unblock action.
    pub consecutive_no_shows: i32,
    pub is_booking_blocked: bool,
    pub block_reason: Option<String>,
    pub block_note: Option<String>,
    pub blocked_at: Option<DateTime<Utc>>,
    pub blocked_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Patient {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Write applied to a patient's risk fields after an appointment outcome.
/// Computed by the lifecycle engine's risk policy; this cell only persists
/// it.
#[derive(Debug, Clone, PartialEq)]
pub enum RiskUpdate {
    RecordNoShow {
        new_count: i32,
        block: Option<BlockDetails>,
    },
    ResetCounter,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockDetails {
    pub reason: String,
    pub note: String,
    pub blocked_at: DateTime<Utc>,
    pub blocked_by: Option<Uuid>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum PatientError {
    #[error("Patient not found")]
    NotFound,

    #[error("Patient is not booking-blocked")]
    NotBlocked,

    #[error("Database error: {0}")]
    DatabaseError(String),
}
