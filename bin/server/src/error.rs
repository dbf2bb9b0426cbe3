//! Errors returned at the HTTP boundary.
//!
//! Each variant maps to one stable status/message pair. Internal causes are
//! logged where they are caught and never echoed to the client.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;

use crate::types::ErrorEnvelope;

/// A request failure, as the client sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The request body could not be parsed.
    InvalidRequest { details: String },
    /// No provider is registered under the requested identifier.
    UnknownProvider,
    /// Unknown user or wrong password; the two are indistinguishable.
    InvalidCredentials,
    /// No state token could be issued for an OIDC journey.
    JourneyStartFailed,
    /// The OIDC state token is unknown or already used.
    InvalidState,
    /// The OIDC state token expired or came from another user agent.
    StateVerificationFailed,
    /// The identity provider authenticated a user the filter rejects.
    NotAuthorised,
    /// The local account could not be found or provisioned.
    UserSyncFailed,
    /// No valid session credential was presented.
    Unauthorized,
    /// The session's user no longer exists.
    InvalidSession,
    /// The caller lacks administrator rights.
    Forbidden,
    /// The targeted session does not exist.
    SessionNotFound,
    /// Local registration is off because the basic provider is disabled.
    RegistrationRequiresIdentityProvider,
    /// The user store is not accepting new accounts.
    RegistrationsClosed,
    /// An account with the requested username already exists.
    UsernameTaken,
    /// Anything else.
    Internal,
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest { .. }
            | Self::UnknownProvider
            | Self::InvalidCredentials
            | Self::InvalidState
            | Self::StateVerificationFailed => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotAuthorised
            | Self::InvalidSession
            | Self::Forbidden
            | Self::RegistrationRequiresIdentityProvider
            | Self::RegistrationsClosed => StatusCode::FORBIDDEN,
            Self::UsernameTaken => StatusCode::CONFLICT,
            Self::SessionNotFound => StatusCode::NOT_FOUND,
            Self::JourneyStartFailed | Self::UserSyncFailed | Self::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRequest { details } => write!(f, "Invalid request ({details})"),
            Self::UnknownProvider => write!(f, "Unknown auth provider"),
            Self::InvalidCredentials => write!(f, "Username and password combination not found"),
            Self::JourneyStartFailed => write!(f, "Could not start OAuth journey"),
            Self::InvalidState => write!(f, "Invalid state"),
            Self::StateVerificationFailed => write!(f, "State verification failed"),
            Self::NotAuthorised => write!(f, "You are not authorised to use this service"),
            Self::UserSyncFailed => write!(f, "User sync failed"),
            Self::Unauthorized => write!(f, "Unauthorized"),
            Self::InvalidSession => write!(f, "Invalid session"),
            Self::Forbidden => write!(f, "Forbidden"),
            Self::SessionNotFound => write!(f, "Session not found"),
            Self::RegistrationRequiresIdentityProvider => {
                write!(f, "Registrations are only accepted via an identity provider")
            }
            Self::RegistrationsClosed => {
                write!(f, "This service is not currently accepting registrations")
            }
            Self::UsernameTaken => write!(f, "User with that username already exists"),
            Self::Internal => write!(f, "Internal Server Error"),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorEnvelope {
            code: status.as_u16(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
