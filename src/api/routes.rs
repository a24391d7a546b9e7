use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::app::AppContext;

use super::handlers::{
    bulk_update, get_settings, get_target, health_check, record_visit, run_tick, update_settings,
    update_target, AppState,
};

pub fn create_api_router(app: Arc<AppContext>) -> Router {
    let state = Arc::new(AppState { app });

    let api_routes = Router::new()
        .route("/visits", post(record_visit))
        .route("/targets/bulk", post(bulk_update))
        .route("/targets/{kind}/{id}", get(get_target).put(update_target))
        .route("/ticks/{frequency}", post(run_tick))
        .route("/settings", get(get_settings).put(update_settings))
        .with_state(state);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
}
