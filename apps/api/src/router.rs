use std::sync::Arc;

use axum::{routing::get, Router};

use appointment_cell::router::appointment_routes;
use patient_cell::router::patient_routes;
use shared_config::AppConfig;
use treatment_plan_cell::router::treatment_plan_routes;

pub fn create_router(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(|| async { "Dental lifecycle API is running!" }))
        .nest("/appointments", appointment_routes(state.clone()))
        .nest("/treatment-plans", treatment_plan_routes(state.clone()))
        .nest("/patients", patient_routes(state))
}
