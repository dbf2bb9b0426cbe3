//! confplanner authentication API server.
//!
//! The router here is unprefixed; the binary nests it under `/api`.

pub mod auth;
pub mod config;
pub mod error;
pub mod types;

use axum::{
    Router,
    routing::{delete, get, post},
};
use std::sync::Arc;

use auth::AppState;

/// Builds the auth API router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/login", get(auth::login_options))
        .route("/login/{provider}", post(auth::login))
        .route("/register", post(auth::register))
        .route("/logout", post(auth::logout))
        .route("/session", get(auth::current_session))
        .route("/sessions/{id}", delete(auth::revoke_session))
        .with_state(state)
}
