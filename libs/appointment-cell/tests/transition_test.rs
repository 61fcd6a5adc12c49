use assert_matches::assert_matches;
use chrono::{DateTime, Duration, TimeZone, Utc};

use appointment_cell::models::{
    AppointmentError, AppointmentStatus, RuleViolation, TransitionOutcome,
};
use appointment_cell::services::transition::{allowed_transitions, TransitionValidator};

fn scheduled_times() -> (DateTime<Utc>, DateTime<Utc>) {
    let start = Utc.with_ymd_and_hms(2025, 6, 10, 10, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2025, 6, 10, 10, 30, 0).unwrap();
    (start, end)
}

#[test]
fn test_transition_table_shape() {
    assert_eq!(
        allowed_transitions(AppointmentStatus::Scheduled),
        &[
            AppointmentStatus::CheckedIn,
            AppointmentStatus::Cancelled,
            AppointmentStatus::NoShow
        ]
    );
    assert_eq!(
        allowed_transitions(AppointmentStatus::CheckedIn),
        &[AppointmentStatus::InProgress, AppointmentStatus::Cancelled]
    );
    assert_eq!(
        allowed_transitions(AppointmentStatus::InProgress),
        &[AppointmentStatus::Completed, AppointmentStatus::Cancelled]
    );
    assert!(allowed_transitions(AppointmentStatus::Completed).is_empty());
    assert!(allowed_transitions(AppointmentStatus::Cancelled).is_empty());
    assert!(allowed_transitions(AppointmentStatus::NoShow).is_empty());
}

#[test]
fn test_check_in_inside_window() {
    let (start, end) = scheduled_times();
    let validator = TransitionValidator::new();

    let outcome = validator
        .validate(
            AppointmentStatus::Scheduled,
            AppointmentStatus::CheckedIn,
            start,
            end,
            start - Duration::minutes(10),
            None,
        )
        .unwrap();

    // Arrival is not treatment start
    assert_eq!(outcome, TransitionOutcome::default());
}

#[test]
fn test_check_in_window_boundaries_are_inclusive() {
    let (start, end) = scheduled_times();
    let validator = TransitionValidator::new();

    assert!(validator
        .validate(
            AppointmentStatus::Scheduled,
            AppointmentStatus::CheckedIn,
            start,
            end,
            start - Duration::minutes(30),
            None,
        )
        .is_ok());

    assert!(validator
        .validate(
            AppointmentStatus::Scheduled,
            AppointmentStatus::CheckedIn,
            start,
            end,
            start + Duration::minutes(45),
            None,
        )
        .is_ok());
}

#[test]
fn test_check_in_too_early_is_rejected() {
    let (start, end) = scheduled_times();
    let validator = TransitionValidator::new();

    let result = validator.validate(
        AppointmentStatus::Scheduled,
        AppointmentStatus::CheckedIn,
        start,
        end,
        start - Duration::minutes(31),
        None,
    );

    assert_matches!(
        result,
        Err(AppointmentError::RuleViolation(
            RuleViolation::OutsideCheckInWindow { .. }
        ))
    );
}

#[test]
fn test_check_in_too_late_is_rejected() {
    let (start, end) = scheduled_times();
    let validator = TransitionValidator::new();

    let result = validator.validate(
        AppointmentStatus::Scheduled,
        AppointmentStatus::CheckedIn,
        start,
        end,
        start + Duration::minutes(46),
        None,
    );

    assert_matches!(
        result,
        Err(AppointmentError::RuleViolation(
            RuleViolation::OutsideCheckInWindow { .. }
        ))
    );
}

#[test]
fn test_missing_reason_code_reported_before_late_notice() {
    // Two hours before the start, no reason code: both rules fail, but the
    // front desk should be told about the missing reason first.
    let (start, end) = scheduled_times();
    let validator = TransitionValidator::new();

    let result = validator.validate(
        AppointmentStatus::Scheduled,
        AppointmentStatus::Cancelled,
        start,
        end,
        start - Duration::hours(2),
        None,
    );

    assert_matches!(
        result,
        Err(AppointmentError::RuleViolation(
            RuleViolation::ReasonCodeRequired
        ))
    );
}

#[test]
fn test_blank_reason_code_counts_as_missing() {
    let (start, end) = scheduled_times();
    let validator = TransitionValidator::new();

    let result = validator.validate(
        AppointmentStatus::Scheduled,
        AppointmentStatus::Cancelled,
        start,
        end,
        start - Duration::hours(48),
        Some("   "),
    );

    assert_matches!(
        result,
        Err(AppointmentError::RuleViolation(
            RuleViolation::ReasonCodeRequired
        ))
    );
}

#[test]
fn test_late_cancellation_is_rejected() {
    let (start, end) = scheduled_times();
    let validator = TransitionValidator::new();

    let result = validator.validate(
        AppointmentStatus::Scheduled,
        AppointmentStatus::Cancelled,
        start,
        end,
        start - Duration::hours(2),
        Some("patient_request"),
    );

    assert_matches!(
        result,
        Err(AppointmentError::RuleViolation(
            RuleViolation::LateCancellation { notice_hours: 24, .. }
        ))
    );
}

#[test]
fn test_cancellation_with_exact_notice_is_allowed() {
    let (start, end) = scheduled_times();
    let validator = TransitionValidator::new();

    let outcome = validator
        .validate(
            AppointmentStatus::Scheduled,
            AppointmentStatus::Cancelled,
            start,
            end,
            start - Duration::hours(24),
            Some("patient_request"),
        )
        .unwrap();

    assert_eq!(outcome, TransitionOutcome::default());
}

#[test]
fn test_cancellation_is_exempt_from_day_of_rule() {
    // A cancellation two days ahead happens on a different calendar day;
    // only the notice rule applies to it.
    let (start, end) = scheduled_times();
    let validator = TransitionValidator::new();

    let result = validator.validate(
        AppointmentStatus::Scheduled,
        AppointmentStatus::Cancelled,
        start,
        end,
        start - Duration::hours(48),
        Some("clinic_reschedule"),
    );

    assert!(result.is_ok());
}

#[test]
fn test_day_of_rule_blocks_early_check_in_attempt() {
    let (start, end) = scheduled_times();
    let validator = TransitionValidator::new();

    let result = validator.validate(
        AppointmentStatus::Scheduled,
        AppointmentStatus::CheckedIn,
        start,
        end,
        start - Duration::days(1),
        None,
    );

    assert_matches!(
        result,
        Err(AppointmentError::RuleViolation(
            RuleViolation::WrongCalendarDay { .. }
        ))
    );
}

#[test]
fn test_treatment_cannot_start_before_scheduled_start() {
    let (start, end) = scheduled_times();
    let validator = TransitionValidator::new();

    let result = validator.validate(
        AppointmentStatus::CheckedIn,
        AppointmentStatus::InProgress,
        start,
        end,
        start - Duration::minutes(5),
        None,
    );

    assert_matches!(
        result,
        Err(AppointmentError::RuleViolation(
            RuleViolation::TreatmentBeforeStart { .. }
        ))
    );
}

#[test]
fn test_starting_treatment_stamps_actual_start() {
    let (start, end) = scheduled_times();
    let validator = TransitionValidator::new();

    let outcome = validator
        .validate(
            AppointmentStatus::CheckedIn,
            AppointmentStatus::InProgress,
            start,
            end,
            start + Duration::minutes(3),
            None,
        )
        .unwrap();

    assert!(outcome.set_actual_start);
    assert!(!outcome.set_actual_end);
}

#[test]
fn test_completion_stamps_actual_end() {
    let (start, end) = scheduled_times();
    let validator = TransitionValidator::new();

    let outcome = validator
        .validate(
            AppointmentStatus::InProgress,
            AppointmentStatus::Completed,
            start,
            end,
            end + Duration::minutes(10),
            None,
        )
        .unwrap();

    assert!(!outcome.set_actual_start);
    assert!(outcome.set_actual_end);
}

#[test]
fn test_completion_after_grace_period_is_rejected() {
    let (start, end) = scheduled_times();
    let validator = TransitionValidator::new();

    let result = validator.validate(
        AppointmentStatus::InProgress,
        AppointmentStatus::Completed,
        start,
        end,
        end + Duration::hours(2) + Duration::minutes(1),
        None,
    );

    assert_matches!(
        result,
        Err(AppointmentError::RuleViolation(
            RuleViolation::CompletionWindowElapsed { grace_hours: 2, .. }
        ))
    );
}

#[test]
fn test_no_show_cannot_be_recorded_before_start() {
    let (start, end) = scheduled_times();
    let validator = TransitionValidator::new();

    let result = validator.validate(
        AppointmentStatus::Scheduled,
        AppointmentStatus::NoShow,
        start,
        end,
        start - Duration::minutes(1),
        None,
    );

    assert_matches!(
        result,
        Err(AppointmentError::RuleViolation(
            RuleViolation::NoShowBeforeStart { .. }
        ))
    );
}

#[test]
fn test_no_show_after_start_is_allowed() {
    let (start, end) = scheduled_times();
    let validator = TransitionValidator::new();

    let result = validator.validate(
        AppointmentStatus::Scheduled,
        AppointmentStatus::NoShow,
        start,
        end,
        start + Duration::hours(1),
        None,
    );

    assert!(result.is_ok());
}

#[test]
fn test_terminal_statuses_reject_all_transitions() {
    let (start, end) = scheduled_times();
    let validator = TransitionValidator::new();

    for terminal in [
        AppointmentStatus::Completed,
        AppointmentStatus::Cancelled,
        AppointmentStatus::NoShow,
    ] {
        let result = validator.validate(
            terminal,
            AppointmentStatus::Scheduled,
            start,
            end,
            start,
            Some("any_reason"),
        );

        assert_matches!(
            result,
            Err(AppointmentError::IllegalTransition { current, ref allowed })
                if current == terminal && allowed.is_empty()
        );
    }
}

#[test]
fn test_self_transition_is_illegal_and_lists_alternatives() {
    let (start, end) = scheduled_times();
    let validator = TransitionValidator::new();

    let result = validator.validate(
        AppointmentStatus::CheckedIn,
        AppointmentStatus::CheckedIn,
        start,
        end,
        start,
        None,
    );

    assert_matches!(
        result,
        Err(AppointmentError::IllegalTransition { current: AppointmentStatus::CheckedIn, ref allowed })
            if allowed == &[AppointmentStatus::InProgress, AppointmentStatus::Cancelled]
    );
}

#[test]
fn test_skipping_states_is_illegal() {
    let (start, end) = scheduled_times();
    let validator = TransitionValidator::new();

    // Straight from scheduled to completed skips check-in and treatment
    let result = validator.validate(
        AppointmentStatus::Scheduled,
        AppointmentStatus::Completed,
        start,
        end,
        start + Duration::minutes(5),
        None,
    );

    assert_matches!(result, Err(AppointmentError::IllegalTransition { .. }));
}

#[test]
fn test_structural_check_runs_before_window_rules() {
    // Terminal state plus an out-of-window time: the structural failure
    // wins, the window rules are never consulted.
    let (start, end) = scheduled_times();
    let validator = TransitionValidator::new();

    let result = validator.validate(
        AppointmentStatus::Completed,
        AppointmentStatus::CheckedIn,
        start,
        end,
        start - Duration::days(3),
        None,
    );

    assert_matches!(result, Err(AppointmentError::IllegalTransition { .. }));
}
