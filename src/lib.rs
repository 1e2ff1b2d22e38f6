// Library exports for Foro
// The binary and the integration tests both build the app from here.

pub mod auth;
pub mod avatar;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod reputation;
pub mod routes;
pub mod slug;
pub mod state;
pub mod validation;

use axum::http::{header, HeaderValue, Method};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::CorsConfig;
use crate::state::AppState;

/// Builds the full application router.
pub fn app(state: AppState) -> Router {
    let uploads = ServeDir::new(state.config.uploads_path());
    let max_avatar_bytes = state.config.avatars.max_bytes;
    let cors = cors_layer(&state.config.cors);

    Router::new()
        .merge(routes::auth::router())
        .merge(routes::categories::router())
        .merge(routes::posts::router())
        .merge(routes::comments::router())
        .merge(routes::members::router())
        .merge(routes::groups::router())
        .merge(routes::reputation::router())
        .merge(routes::avatars::router(max_avatar_bytes))
        .merge(routes::settings::router())
        .merge(routes::stats::router())
        .nest_service("/uploads", uploads)
        .merge(routes::assets::router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    match config.allowed_origin.parse::<HeaderValue>() {
        Ok(origin) => layer.allow_origin(origin),
        Err(_) => {
            tracing::warn!(
                origin = %config.allowed_origin,
                "Invalid CORS origin; cross-origin requests will be rejected"
            );
            layer
        }
    }
}
