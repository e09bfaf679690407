//! Real-time presence and collaboration broadcast server built with Rust.
//!
//! Tracks which users are connected and their activity state, and fans out
//! ephemeral collaboration events (presence changes, project-room membership,
//! cursor movement, typing indicators, business-update notices) to the right
//! set of connected clients. All state is in-memory; durable data belongs to
//! the business APIs.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;

pub use config::Config;
pub use error::AppError;
pub use handlers::http::AppState;
pub use services::{ConnectionRegistry, PresenceStore, RoomManager};

use axum::routing::{get, post};
use handlers::http;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the router (ws, notify/broadcast/presence API, health). Used by
/// main and by integration tests.
pub fn create_app(state: AppState) -> axum::Router {
    let api_routes = axum::Router::new()
        .route("/notify", post(handlers::notify))
        .route("/broadcast", post(handlers::broadcast))
        .route("/presence", get(handlers::presence_list));

    axum::Router::new()
        .route("/ws", get(handlers::ws_handler))
        .nest("/api", api_routes)
        .route("/health", get(http::health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
