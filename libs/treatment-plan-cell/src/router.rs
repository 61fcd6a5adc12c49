// libs/treatment-plan-cell/src/router.rs
use std::sync::Arc;

use axum::{middleware, routing::get, Router};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn treatment_plan_routes(state: Arc<AppConfig>) -> Router {
    let protected_routes = Router::new()
        .route("/{plan_id}", get(handlers::get_treatment_plan))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}
