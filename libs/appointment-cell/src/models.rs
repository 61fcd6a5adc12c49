// libs/appointment-cell/src/models.rs
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use shared_models::auth::User;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

/// A scheduled clinical encounter. Created by the booking subsystem in
/// `scheduled`; every later mutation goes through the lifecycle engine.
/// Appointments are never deleted, only moved into a terminal status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    /// Durable human-readable business code (e.g. `APT-2025-000123`).
    pub code: String,
    pub patient_id: Uuid,
    pub dentist_id: Uuid,
    pub room_id: Uuid,
    pub scheduled_start_time: DateTime<Utc>,
    pub scheduled_end_time: DateTime<Utc>,
    /// Set only on the transition into `in_progress`.
    pub actual_start_time: Option<DateTime<Utc>>,
    /// Set only on the transition into `completed`.
    pub actual_end_time: Option<DateTime<Utc>>,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    CheckedIn,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    /// Terminal statuses have no outgoing transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed | AppointmentStatus::Cancelled | AppointmentStatus::NoShow
        )
    }

    /// Statuses whose arrival must be propagated into the patient's
    /// treatment plan.
    pub fn triggers_plan_cascade(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::InProgress
                | AppointmentStatus::Completed
                | AppointmentStatus::Cancelled
                | AppointmentStatus::NoShow
        )
    }

    /// Statuses proving the patient actually showed up.
    pub fn indicates_attendance(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::CheckedIn | AppointmentStatus::InProgress | AppointmentStatus::Completed
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::CheckedIn => write!(f, "checked_in"),
            AppointmentStatus::InProgress => write!(f, "in_progress"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::NoShow => write!(f, "no_show"),
        }
    }
}

// ==============================================================================
// ACTING IDENTITY
// ==============================================================================

/// Who performed a state change. System covers automated paths and callers
/// whose session does not resolve to a staff member; the distinction is kept
/// at the type level rather than as a nullable reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Staff(Uuid),
    System,
}

impl Actor {
    pub fn from_user(user: Option<&User>) -> Self {
        user.and_then(|u| Uuid::parse_str(&u.id).ok())
            .map(Actor::Staff)
            .unwrap_or(Actor::System)
    }

    /// The nullable column representation: `None` means system-initiated.
    pub fn staff_id(&self) -> Option<Uuid> {
        match self {
            Actor::Staff(id) => Some(*id),
            Actor::System => None,
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::Staff(id) => write!(f, "staff:{}", id),
            Actor::System => write!(f, "system"),
        }
    }
}

// ==============================================================================
// AUDIT TRAIL
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    StatusChange,
}

/// Immutable record of one state change, written in the same unit of work
/// as the appointment mutation. Exactly one entry per successful update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub appointment_id: Uuid,
    /// Staff member who made the change; `None` means system-initiated.
    pub performed_by: Option<Uuid>,
    pub action: AuditAction,
    pub reason_code: Option<String>,
    pub old_status: AppointmentStatus,
    pub new_status: AppointmentStatus,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: AppointmentStatus,
    pub reason_code: Option<String>,
    pub notes: Option<String>,
}

/// Side effects a legal transition carries, derived by the validator.
/// Check-in does not set the actual start: arrival is not treatment start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransitionOutcome {
    pub set_actual_start: bool,
    pub set_actual_end: bool,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

/// Time-window and reason-code rule failures. Each variant carries the
/// timestamps a UI needs to render an actionable message without
/// re-deriving the rule.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuleViolation {
    #[error("A cancellation reason code is required")]
    ReasonCodeRequired,

    #[error("Too late to cancel: cancellations need at least {notice_hours}h notice before the scheduled start ({scheduled_start})")]
    LateCancellation {
        scheduled_start: DateTime<Utc>,
        notice_hours: i64,
    },

    #[error("Check-in window is {window_start} to {window_end}; outside it the appointment should be recorded as a no-show")]
    OutsideCheckInWindow {
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    #[error("Treatment cannot start before the scheduled start ({scheduled_start})")]
    TreatmentBeforeStart {
        scheduled_start: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    #[error("Completion window elapsed: appointments must be completed within {grace_hours}h of the scheduled end ({scheduled_end})")]
    CompletionWindowElapsed {
        scheduled_end: DateTime<Utc>,
        grace_hours: i64,
        now: DateTime<Utc>,
    },

    #[error("A no-show cannot be recorded before the scheduled start ({scheduled_start})")]
    NoShowBeforeStart {
        scheduled_start: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    #[error("Status changes are only allowed on the appointment's calendar day ({scheduled_day})")]
    WrongCalendarDay {
        scheduled_day: NaiveDate,
        now: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Illegal status transition from {current}; allowed next statuses: {allowed:?}")]
    IllegalTransition {
        current: AppointmentStatus,
        allowed: Vec<AppointmentStatus>,
    },

    #[error("{0}")]
    RuleViolation(#[from] RuleViolation),

    #[error("Appointment is being updated by another operation, try again")]
    LockContention,

    #[error("Treatment plan cascade failed: {0}")]
    CascadeFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
