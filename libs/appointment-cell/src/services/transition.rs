// libs/appointment-cell/src/services/transition.rs
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::models::{AppointmentError, AppointmentStatus, RuleViolation, TransitionOutcome};

/// Allowed next statuses per current status. Terminal states have no
/// outgoing edges. Pure static data; never mutated at runtime.
pub fn allowed_transitions(current: AppointmentStatus) -> &'static [AppointmentStatus] {
    match current {
        AppointmentStatus::Scheduled => &[
            AppointmentStatus::CheckedIn,
            AppointmentStatus::Cancelled,
            AppointmentStatus::NoShow,
        ],
        AppointmentStatus::CheckedIn => &[
            AppointmentStatus::InProgress,
            AppointmentStatus::Cancelled,
        ],
        AppointmentStatus::InProgress => &[
            AppointmentStatus::Completed,
            AppointmentStatus::Cancelled,
        ],
        AppointmentStatus::Completed
        | AppointmentStatus::Cancelled
        | AppointmentStatus::NoShow => &[],
    }
}

/// Business-rule thresholds for the transition gate.
#[derive(Debug, Clone)]
pub struct LifecycleRules {
    pub early_check_in_minutes: i64,
    pub late_check_in_minutes: i64,
    pub min_cancellation_notice_hours: i64,
    pub late_completion_grace_hours: i64,
}

impl Default for LifecycleRules {
    fn default() -> Self {
        Self {
            early_check_in_minutes: 30,       // Check-in opens 30 minutes early
            late_check_in_minutes: 45,        // Closes 45 minutes after the start
            min_cancellation_notice_hours: 24, // Cancellations need a day's notice
            late_completion_grace_hours: 2,   // Completion allowed up to 2h past the end
        }
    }
}

/// Pure transition gate: structural state-machine check first, then the
/// time-window and reason-code rules in a fixed order. No IO; "now" is an
/// argument so callers control the clock.
pub struct TransitionValidator {
    rules: LifecycleRules,
}

impl TransitionValidator {
    pub fn new() -> Self {
        Self {
            rules: LifecycleRules::default(),
        }
    }

    pub fn with_rules(rules: LifecycleRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &LifecycleRules {
        &self.rules
    }

    pub fn validate(
        &self,
        current: AppointmentStatus,
        requested: AppointmentStatus,
        scheduled_start: DateTime<Utc>,
        scheduled_end: DateTime<Utc>,
        now: DateTime<Utc>,
        reason_code: Option<&str>,
    ) -> Result<TransitionOutcome, AppointmentError> {
        debug!("Validating status transition {} -> {}", current, requested);

        // Self-transitions and edges missing from the table are the same
        // class of failure: the state machine forbids them outright.
        let allowed = allowed_transitions(current);
        if current == requested || !allowed.contains(&requested) {
            warn!("Illegal status transition attempted: {} -> {}", current, requested);
            return Err(AppointmentError::IllegalTransition {
                current,
                allowed: allowed.to_vec(),
            });
        }

        // Day-of guard: staff cannot check in, start, complete or no-show
        // an appointment outside its calendar day. Cancellation is exempt,
        // it has its own notice rule.
        if requested != AppointmentStatus::Cancelled
            && now.date_naive() != scheduled_start.date_naive()
        {
            return Err(RuleViolation::WrongCalendarDay {
                scheduled_day: scheduled_start.date_naive(),
                now,
            }
            .into());
        }

        match requested {
            AppointmentStatus::Cancelled => {
                if reason_code.map_or(true, |r| r.trim().is_empty()) {
                    return Err(RuleViolation::ReasonCodeRequired.into());
                }
                let notice = Duration::hours(self.rules.min_cancellation_notice_hours);
                if scheduled_start - now < notice {
                    return Err(RuleViolation::LateCancellation {
                        scheduled_start,
                        notice_hours: self.rules.min_cancellation_notice_hours,
                    }
                    .into());
                }
            }
            AppointmentStatus::CheckedIn => {
                let window_start =
                    scheduled_start - Duration::minutes(self.rules.early_check_in_minutes);
                let window_end =
                    scheduled_start + Duration::minutes(self.rules.late_check_in_minutes);
                if now < window_start || now > window_end {
                    return Err(RuleViolation::OutsideCheckInWindow {
                        window_start,
                        window_end,
                        now,
                    }
                    .into());
                }
            }
            AppointmentStatus::InProgress => {
                if now < scheduled_start {
                    return Err(RuleViolation::TreatmentBeforeStart {
                        scheduled_start,
                        now,
                    }
                    .into());
                }
            }
            AppointmentStatus::Completed => {
                let grace = Duration::hours(self.rules.late_completion_grace_hours);
                if now > scheduled_end + grace {
                    return Err(RuleViolation::CompletionWindowElapsed {
                        scheduled_end,
                        grace_hours: self.rules.late_completion_grace_hours,
                        now,
                    }
                    .into());
                }
            }
            AppointmentStatus::NoShow => {
                if now < scheduled_start {
                    return Err(RuleViolation::NoShowBeforeStart {
                        scheduled_start,
                        now,
                    }
                    .into());
                }
            }
            // No edge leads back into Scheduled; unreachable past the table check.
            AppointmentStatus::Scheduled => {}
        }

        Ok(TransitionOutcome {
            set_actual_start: requested == AppointmentStatus::InProgress,
            set_actual_end: requested == AppointmentStatus::Completed,
        })
    }
}

impl Default for TransitionValidator {
    fn default() -> Self {
        Self::new()
    }
}
