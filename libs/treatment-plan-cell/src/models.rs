// libs/treatment-plan-cell/src/models.rs
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ==============================================================================
// TREATMENT PLAN HIERARCHY
// ==============================================================================

/// A patient's ongoing care plan. Plans own phases, phases own items; both
/// associations are resolved by foreign-key lookups, never cached in memory,
/// so completion rollups always see fresh rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreatmentPlan {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub title: String,
    pub status: PlanStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreatmentPlanPhase {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub name: String,
    pub sequence: i32,
    pub status: PhaseStatus,
    pub completed_on: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One plannable procedure. `appointment_id` links the item to the
/// appointment that services it, if one has been booked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreatmentPlanItem {
    pub id: Uuid,
    pub phase_id: Uuid,
    pub plan_id: Uuid,
    pub appointment_id: Option<Uuid>,
    pub procedure_name: String,
    pub sequence: i32,
    pub status: ItemStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    InProgress,
    Completed,
    Cancelled,
}

impl PlanStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PlanStatus::Completed | PlanStatus::Cancelled)
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanStatus::InProgress => write!(f, "in_progress"),
            PlanStatus::Completed => write!(f, "completed"),
            PlanStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Pending,
    InProgress,
    Completed,
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhaseStatus::Pending => write!(f, "pending"),
            PhaseStatus::InProgress => write!(f, "in_progress"),
            PhaseStatus::Completed => write!(f, "completed"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    ReadyForBooking,
    InProgress,
    Completed,
    Skipped,
}

impl ItemStatus {
    /// Items in either of these states no longer hold their phase open.
    pub fn counts_as_done(&self) -> bool {
        matches!(self, ItemStatus::Completed | ItemStatus::Skipped)
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemStatus::ReadyForBooking => write!(f, "ready_for_booking"),
            ItemStatus::InProgress => write!(f, "in_progress"),
            ItemStatus::Completed => write!(f, "completed"),
            ItemStatus::Skipped => write!(f, "skipped"),
        }
    }
}

// ==============================================================================
// READ MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreatmentPlanView {
    pub plan: TreatmentPlan,
    pub phases: Vec<PhaseView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseView {
    pub phase: TreatmentPlanPhase,
    pub items: Vec<TreatmentPlanItem>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum PlanError {
    #[error("Treatment plan not found")]
    NotFound,

    #[error("Treatment plan phase not found")]
    PhaseNotFound,

    #[error("Treatment plan item not found")]
    ItemNotFound,

    #[error("Database error: {0}")]
    DatabaseError(String),
}
