// libs/treatment-plan-cell/src/handlers.rs
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

use crate::models::PlanError;
use crate::services::plan::TreatmentPlanService;

/// Read-only view of a treatment plan with its phases and items. Plan CRUD
/// lives elsewhere; this cell only serves the hierarchy the lifecycle engine
/// cascades into.
#[axum::debug_handler]
pub async fn get_treatment_plan(
    State(state): State<Arc<AppConfig>>,
    Path(plan_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    if !user.is_staff() {
        return Err(AppError::Auth("Not authorized to view treatment plans".to_string()));
    }

    let service = TreatmentPlanService::new(&state);

    let view = service
        .get_plan_view(plan_id, auth.token())
        .await
        .map_err(|e| match e {
            PlanError::NotFound => AppError::NotFound("Treatment plan not found".to_string()),
            other => AppError::Internal(other.to_string()),
        })?;

    Ok(Json(json!({
        "success": true,
        "treatment_plan": view
    })))
}
