use assert_matches::assert_matches;
use chrono::{TimeZone, Utc};
use uuid::Uuid;

use appointment_cell::models::{Actor, AppointmentStatus};
use appointment_cell::services::risk::{assess, BLOCK_REASON, BLOCK_THRESHOLD};
use patient_cell::models::RiskUpdate;

fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 10, 11, 0, 0).unwrap()
}

#[test]
fn test_first_no_show_only_increments() {
    let update = assess(
        AppointmentStatus::NoShow,
        AppointmentStatus::Scheduled,
        0,
        false,
        "APT-2025-000001",
        Actor::System,
        now(),
    );

    assert_matches!(
        update,
        Some(RiskUpdate::RecordNoShow { new_count: 1, block: None })
    );
}

#[test]
fn test_third_no_show_blocks_booking() {
    let staff_id = Uuid::new_v4();
    let update = assess(
        AppointmentStatus::NoShow,
        AppointmentStatus::Scheduled,
        BLOCK_THRESHOLD - 1,
        false,
        "APT-2025-000002",
        Actor::Staff(staff_id),
        now(),
    );

    let Some(RiskUpdate::RecordNoShow { new_count, block: Some(block) }) = update else {
        panic!("expected a blocking no-show record, got {:?}", update);
    };
    assert_eq!(new_count, BLOCK_THRESHOLD);
    assert_eq!(block.reason, BLOCK_REASON);
    assert!(block.note.contains("APT-2025-000002"));
    assert_eq!(block.blocked_by, Some(staff_id));
    assert_eq!(block.blocked_at, now());
}

#[test]
fn test_no_show_past_threshold_keeps_counting_without_reblocking() {
    let update = assess(
        AppointmentStatus::NoShow,
        AppointmentStatus::Scheduled,
        4,
        true,
        "APT-2025-000003",
        Actor::System,
        now(),
    );

    assert_matches!(
        update,
        Some(RiskUpdate::RecordNoShow { new_count: 5, block: None })
    );
}

#[test]
fn test_attendance_resets_counter() {
    for status in [
        AppointmentStatus::CheckedIn,
        AppointmentStatus::InProgress,
        AppointmentStatus::Completed,
    ] {
        let update = assess(
            status,
            AppointmentStatus::Scheduled,
            2,
            false,
            "APT-2025-000004",
            Actor::System,
            now(),
        );
        assert_matches!(update, Some(RiskUpdate::ResetCounter));
    }
}

#[test]
fn test_attendance_with_zero_counter_writes_nothing() {
    let update = assess(
        AppointmentStatus::CheckedIn,
        AppointmentStatus::Scheduled,
        0,
        false,
        "APT-2025-000005",
        Actor::System,
        now(),
    );

    assert_eq!(update, None);
}

#[test]
fn test_attendance_never_lifts_an_existing_block() {
    // Counter resets, but the block stays until an admin lifts it
    let update = assess(
        AppointmentStatus::Completed,
        AppointmentStatus::InProgress,
        3,
        true,
        "APT-2025-000006",
        Actor::System,
        now(),
    );

    assert_matches!(update, Some(RiskUpdate::ResetCounter));
}

#[test]
fn test_cancellation_has_no_risk_effect() {
    let update = assess(
        AppointmentStatus::Cancelled,
        AppointmentStatus::Scheduled,
        2,
        false,
        "APT-2025-000007",
        Actor::System,
        now(),
    );

    assert_eq!(update, None);
}
