// libs/patient-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::PatientError;
use crate::services::patient::PatientService;

#[axum::debug_handler]
pub async fn get_patient(
    State(state): State<Arc<AppConfig>>,
    Path(patient_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    if !user.is_staff() {
        return Err(AppError::Auth("Not authorized to view patient profiles".to_string()));
    }

    let service = PatientService::new(&state);

    let patient = service
        .get_patient(patient_id, auth.token())
        .await
        .map_err(|e| match e {
            PatientError::NotFound => AppError::NotFound("Patient not found".to_string()),
            other => AppError::Internal(other.to_string()),
        })?;

    Ok(Json(json!({
        "success": true,
        "patient": patient
    })))
}

/// Manual release of a no-show booking block. Deliberately not part of the
/// lifecycle engine: the counter resets on attendance, the block never does.
#[axum::debug_handler]
pub async fn unblock_patient(
    State(state): State<Arc<AppConfig>>,
    Path(patient_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    if !user.is_admin() {
        return Err(AppError::Auth("Only admins can lift a booking block".to_string()));
    }

    let unblocked_by = Uuid::parse_str(&user.id)
        .map_err(|_| AppError::Auth("Invalid user identity".to_string()))?;

    let service = PatientService::new(&state);

    let patient = service
        .unblock(patient_id, unblocked_by, auth.token())
        .await
        .map_err(|e| match e {
            PatientError::NotFound => AppError::NotFound("Patient not found".to_string()),
            PatientError::NotBlocked => {
                AppError::BadRequest("Patient is not booking-blocked".to_string())
            }
            other => AppError::Internal(other.to_string()),
        })?;

    Ok(Json(json!({
        "success": true,
        "patient": patient,
        "message": "Booking block lifted"
    })))
}
