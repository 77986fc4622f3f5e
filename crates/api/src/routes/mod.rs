//! API routes

pub mod conversations;
pub mod health;
pub mod messages;
pub mod presence;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    // Consultation API. Principals arrive pre-authenticated; identity is
    // carried explicitly in every request.
    let api_v1_routes = Router::new()
        // Conversation resource
        .route("/conversations", get(conversations::list_conversations))
        .route("/conversations", post(conversations::create_conversation))
        .route("/conversations/waiting", get(conversations::list_waiting))
        .route(
            "/conversations/:conversation_id/accept",
            put(conversations::accept_conversation),
        )
        .route(
            "/conversations/:conversation_id/close",
            post(conversations::close_conversation),
        )
        // Message resource
        .route("/messages", get(messages::fetch_messages))
        .route("/messages", post(messages::send_message))
        .route("/messages/read", put(messages::mark_read))
        // Presence resource
        .route("/presence", put(presence::set_status))
        .route("/presence/heartbeat", post(presence::heartbeat))
        .route("/presence/offline", post(presence::offline_beacon))
        .route("/experts/active", get(presence::list_active_experts));

    Router::new()
        .merge(health_routes)
        .nest("/api/v1", api_v1_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        // Request body size limit to keep oversized payloads out
        .layer(DefaultBodyLimit::max(1024 * 1024)) // 1MB limit
        .with_state(state)
}
