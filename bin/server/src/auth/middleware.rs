//! Authentication extractors for Axum.

use axum::{
    extract::{ConnectInfo, FromRef, FromRequestParts},
    http::{
        header::{AUTHORIZATION, USER_AGENT},
        request::Parts,
    },
};
use axum_extra::extract::CookieJar;
use confplanner_auth::Session;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, warn};

use super::{AppState, SESSION_COOKIE};
use crate::error::ApiError;

/// Where a request came from.
///
/// The address is `"unknown"` when the server runs without connect info,
/// as it does under test.
#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub ip: String,
    pub user_agent: String,
}

impl<S> FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map_or_else(|| "unknown".to_string(), |ConnectInfo(addr)| addr.ip().to_string());

        let user_agent = parts
            .headers
            .get(USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();

        Ok(Self { ip, user_agent })
    }
}

/// Extractor for requiring an authenticated session.
///
/// Accepts `Authorization: Bearer <token>` or the session cookie. The
/// session's user is re-read on every request, so `username` and `admin`
/// reflect the live account rather than the login-time snapshot.
#[derive(Debug, Clone)]
pub struct AuthenticatedSession {
    pub session: Arc<Session>,
    pub username: String,
    pub admin: bool,
}

impl<S> FromRequestParts<S> for AuthenticatedSession
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = Arc::<AppState>::from_ref(state);

        let token = bearer_token(parts).ok_or(ApiError::Unauthorized)?;
        let session = app_state
            .sessions
            .get_by_token(&token)
            .ok_or(ApiError::Unauthorized)?;

        let user = app_state
            .users
            .find_by_id(session.user_id())
            .await
            .map_err(|e| {
                error!(session_id = %session.id(), error = %e, "failed to load session user");
                ApiError::Internal
            })?;

        let Some(user) = user else {
            warn!(
                session_id = %session.id(),
                user_id = %session.user_id(),
                "session user no longer exists, destroying session"
            );
            // A concurrent request may have destroyed it already.
            let _ = app_state.sessions.destroy(session.id());
            return Err(ApiError::InvalidSession);
        };

        Ok(Self {
            session,
            username: user.username().to_string(),
            admin: user.is_admin(),
        })
    }
}

/// Extractor for requiring an authenticated admin.
#[derive(Debug, Clone)]
pub struct RequireAdmin(pub AuthenticatedSession);

impl<S> FromRequestParts<S> for RequireAdmin
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = AuthenticatedSession::from_request_parts(parts, state).await?;

        if !session.admin {
            return Err(ApiError::Forbidden);
        }

        Ok(Self(session))
    }
}

/// Reads the session token from the `Authorization` header, falling back to
/// the session cookie.
fn bearer_token(parts: &Parts) -> Option<String> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());

    if let Some(token) = header {
        return Some(token.to_string());
    }

    CookieJar::from_headers(&parts.headers)
        .get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|token| !token.is_empty())
}
