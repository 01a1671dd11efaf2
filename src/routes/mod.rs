use axum::http::HeaderValue;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::{auth::AuthenticatedOperator, state::AppState};

pub mod auth;
pub mod health;
pub mod leads;
pub mod webhooks;

pub fn create_router(state: AppState) -> Router<()> {
    let cors = if let Some(origins) = state.config.cors_allowed_origins.as_ref() {
        let headers: Vec<HeaderValue> = origins
            .split(',')
            .filter_map(|value| {
                let trimmed = value.trim();
                (!trimmed.is_empty()).then(|| {
                    trimmed
                        .parse::<HeaderValue>()
                        .expect("invalid CORS allowed origin")
                })
            })
            .collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(headers))
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::mirror_request())
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    };

    let leads_routes = Router::new()
        .route("/new", get(leads::get_new_leads))
        .route("/history", get(leads::get_history_leads))
        .route("/:property_id/messages", get(leads::get_lead_messages))
        .route("/:property_id/reply", post(leads::send_manual_reply))
        .route("/:property_id/mark-read", post(leads::mark_conversation_read));

    let protected_state = state.clone();
    let protected_routes = Router::new()
        .nest("/api/leads", leads_routes)
        .route("/api/templates", get(leads::get_templates))
        .route("/api/send-whatsapp", post(leads::send_whatsapp))
        .layer(middleware::from_extractor_with_state::<AuthenticatedOperator, _>(protected_state));

    Router::new()
        .merge(protected_routes)
        .route("/api/login", post(auth::login))
        // Triggered by the external scheduler; intentionally unauthenticated.
        .route("/api/poll", post(leads::trigger_poll))
        .route(
            "/api/webhooks/whatsapp",
            get(webhooks::verify_webhook).post(webhooks::receive_webhook),
        )
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
