// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{Actor, AppointmentError, RuleViolation, UpdateStatusRequest};
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::transition::allowed_transitions;

fn map_error(e: AppointmentError) -> AppError {
    match e {
        AppointmentError::NotFound => AppError::NotFound("Appointment not found".to_string()),
        AppointmentError::IllegalTransition { .. } => AppError::Conflict(e.to_string()),
        // A missing reason code is a caller mistake; window violations are
        // conflicts with the appointment's current schedule
        AppointmentError::RuleViolation(RuleViolation::ReasonCodeRequired) => {
            AppError::BadRequest(RuleViolation::ReasonCodeRequired.to_string())
        }
        AppointmentError::RuleViolation(v) => AppError::Conflict(v.to_string()),
        AppointmentError::LockContention => AppError::Conflict(e.to_string()),
        AppointmentError::CascadeFailed(msg) => AppError::Internal(msg),
        AppointmentError::DatabaseError(msg) => AppError::Database(msg),
    }
}

/// Appointment detail plus the statuses it may legally move to next, so a
/// front-desk UI can render exactly the actions that will not bounce.
#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(code): Path<String>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    if !user.is_staff() {
        return Err(AppError::Auth("Not authorized to view appointments".to_string()));
    }

    let service = AppointmentLifecycleService::new(&state);

    let appointment = service
        .get_appointment_by_code(&code, auth.token())
        .await
        .map_err(map_error)?;

    let allowed = allowed_transitions(appointment.status);

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "allowed_next_statuses": allowed
    })))
}

#[axum::debug_handler]
pub async fn get_audit_trail(
    State(state): State<Arc<AppConfig>>,
    Path(code): Path<String>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    if !user.is_staff() {
        return Err(AppError::Auth("Not authorized to view the audit trail".to_string()));
    }

    let service = AppointmentLifecycleService::new(&state);

    // Resolve the code first so an unknown appointment is a 404, not an
    // empty trail
    let appointment = service
        .get_appointment_by_code(&code, auth.token())
        .await
        .map_err(map_error)?;

    let entries = service
        .audit()
        .entries_for_appointment(appointment.id, auth.token())
        .await
        .map_err(map_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment_code": appointment.code,
        "entries": entries
    })))
}

#[axum::debug_handler]
pub async fn update_status(
    State(state): State<Arc<AppConfig>>,
    Path(code): Path<String>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Value>, AppError> {
    if !user.is_staff() {
        return Err(AppError::Auth("Not authorized to update appointments".to_string()));
    }

    let actor = Actor::from_user(Some(&user));
    let service = AppointmentLifecycleService::new(&state);

    let appointment = service
        .update_status(&code, request, actor, auth.token())
        .await
        .map_err(map_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment
    })))
}
