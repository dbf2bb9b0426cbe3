//! Request and response bodies for the auth API.

use axum::{Json, http::StatusCode};
use chrono::{DateTime, Utc};
use confplanner_auth::{LoginOption, SessionId};
use confplanner_core::UserId;
use serde::{Deserialize, Serialize};

/// Success envelope: `{code, data}`.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub code: u16,
    pub data: T,
}

impl<T: Serialize> Envelope<T> {
    /// Wraps `data` with the numeric form of `status`.
    pub fn json(status: StatusCode, data: T) -> (StatusCode, Json<Self>) {
        (
            status,
            Json(Self {
                code: status.as_u16(),
                data,
            }),
        )
    }
}

/// Error envelope: `{code, message}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub code: u16,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct LoginOptions {
    pub options: Vec<LoginOption>,
}

#[derive(Debug, Deserialize)]
pub struct BasicLoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct Registered {
    pub id: UserId,
}

/// Body posted back by the frontend after the identity provider redirect.
#[derive(Debug, Deserialize)]
pub struct OidcCallbackRequest {
    pub code: String,
    pub state: String,
}

#[derive(Debug, Serialize)]
pub struct LoginSuccess {
    pub id: UserId,
    pub username: String,
    pub token: String,
}

/// Where to send the user to continue an OIDC journey.
#[derive(Debug, Serialize)]
pub struct JourneyRedirect {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub username: String,
    pub admin: bool,
    pub login_time: DateTime<Utc>,
}
