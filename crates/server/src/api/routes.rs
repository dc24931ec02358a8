use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::{handlers, jobs, library, middleware::metrics_middleware, recheck, signals, ws};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Batch jobs (anime, manga)
        .route("/jobs/{job}/status", get(jobs::get_status))
        .route("/jobs/{job}/start", post(jobs::start))
        .route("/jobs/{job}/stop", post(jobs::stop))
        .route("/jobs/{job}/reset", post(jobs::reset))
        .route("/jobs/{job}/preview", post(jobs::preview))
        // Recheck scheduler
        .route("/recheck", get(recheck::get_status))
        .route("/recheck/start", post(recheck::start))
        .route("/recheck/stop", post(recheck::stop))
        .route("/recheck/run", post(recheck::run_now))
        // Reading list
        .route(
            "/reading-list",
            get(library::list_reading_list).post(library::add_to_reading_list),
        )
        .route("/reading-list/{id}", delete(library::remove_from_reading_list))
        // Associations
        .route(
            "/associations",
            get(library::list_associations).delete(library::clear_associations),
        )
        .route("/associations/{key}", delete(library::delete_association))
        // Runtime flags
        .route(
            "/signals",
            get(signals::get_signals).put(signals::update_signals),
        )
        // Notifications
        .route("/ws", get(ws::ws_handler));

    Router::new()
        .route("/metrics", get(handlers::metrics))
        .nest("/api/v1", api_routes)
        .route_layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
