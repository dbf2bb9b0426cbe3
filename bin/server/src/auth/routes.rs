//! Authentication routes for login, logout and session management.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use confplanner_auth::{
    AuthProvider, BasicProvider, JourneyError, OidcProvider, SessionId, User, UserStoreError,
};
use std::sync::Arc;
use time::Duration as TimeDuration;
use tracing::{debug, error, info, warn};

use super::{
    AppState, BASIC_PROVIDER_ID, SESSION_COOKIE, SESSION_COOKIE_PATH,
    middleware::{AuthenticatedSession, ClientInfo, RequireAdmin},
};
use crate::error::ApiError;
use crate::types::{
    BasicLoginRequest, Envelope, JourneyRedirect, LoginOptions, LoginSuccess,
    OidcCallbackRequest, RegisterRequest, Registered, SessionInfo,
};

/// Lists the configured providers for the login picker.
pub async fn login_options(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Envelope::json(
        StatusCode::OK,
        LoginOptions {
            options: state.providers.login_options(),
        },
    )
}

/// Logs in through the provider named in the path.
///
/// For the basic provider the body carries credentials. For an OIDC
/// provider, a body with non-empty `code` and `state` completes a journey
/// and any other body starts one.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Path(provider_id): Path<String>,
    client: ClientInfo,
    jar: CookieJar,
    body: Bytes,
) -> Result<Response, ApiError> {
    let provider = state
        .providers
        .get(&provider_id)
        .ok_or(ApiError::UnknownProvider)?;

    let user = match provider.as_ref() {
        AuthProvider::Basic(basic) => basic_login(basic, &body).await?,
        AuthProvider::Oidc(oidc) => match serde_json::from_slice::<OidcCallbackRequest>(&body) {
            Ok(callback) if !callback.code.is_empty() && !callback.state.is_empty() => {
                complete_journey(oidc, &provider_id, &callback, &client).await?
            }
            _ => return start_journey(oidc, &provider_id, &client),
        },
    };

    issue_session(&state, jar, &user, &client)
}

async fn basic_login(provider: &BasicProvider, body: &[u8]) -> Result<User, ApiError> {
    let request: BasicLoginRequest =
        serde_json::from_slice(body).map_err(|e| ApiError::InvalidRequest {
            details: e.to_string(),
        })?;

    match provider
        .authenticate(&request.username, &request.password)
        .await
    {
        Ok(Some(user)) => Ok(user),
        Ok(None) => Err(ApiError::InvalidCredentials),
        Err(e) => {
            error!(error = %e, "basic authentication failed");
            Err(ApiError::Internal)
        }
    }
}

fn start_journey(
    provider: &OidcProvider,
    provider_id: &str,
    client: &ClientInfo,
) -> Result<Response, ApiError> {
    let url = provider
        .start_journey(&client.ip, &client.user_agent)
        .map_err(|e| {
            error!(provider = provider_id, error = %e, "could not start OIDC journey");
            ApiError::JourneyStartFailed
        })?;

    Ok(Envelope::json(StatusCode::TEMPORARY_REDIRECT, JourneyRedirect { url }).into_response())
}

async fn complete_journey(
    provider: &OidcProvider,
    provider_id: &str,
    callback: &OidcCallbackRequest,
    client: &ClientInfo,
) -> Result<User, ApiError> {
    let result = provider
        .complete_journey(
            &callback.code,
            &callback.state,
            &client.ip,
            &client.user_agent,
        )
        .await;

    result.map_err(|e| match e.current_context() {
        JourneyError::NotAuthorised => {
            info!(provider = provider_id, remote_addr = %client.ip, "login refused by claim filter");
            ApiError::NotAuthorised
        }
        JourneyError::InvalidState => ApiError::InvalidState,
        JourneyError::StateVerificationFailed => ApiError::StateVerificationFailed,
        JourneyError::UserSyncFailed { .. } => {
            error!(provider = provider_id, error = %e, "user sync failed");
            ApiError::UserSyncFailed
        }
        _ => {
            error!(
                provider = provider_id,
                remote_addr = %client.ip,
                error = %e,
                "OIDC journey failed"
            );
            ApiError::Internal
        }
    })
}

/// Creates a local account with a password.
///
/// Only available while the basic provider is registered; deployments
/// that log in through an identity provider provision accounts there.
pub async fn register(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let request: RegisterRequest =
        serde_json::from_slice(&body).map_err(|e| ApiError::InvalidRequest {
            details: e.to_string(),
        })?;
    if request.username.trim().is_empty() || request.password.is_empty() {
        return Err(ApiError::InvalidRequest {
            details: "username and password are required".to_string(),
        });
    }

    let provider = state
        .providers
        .get(BASIC_PROVIDER_ID)
        .ok_or(ApiError::RegistrationRequiresIdentityProvider)?;
    let AuthProvider::Basic(basic) = provider.as_ref() else {
        return Err(ApiError::RegistrationRequiresIdentityProvider);
    };

    let password_hash = basic
        .hash_password_blocking(&request.password)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to hash password for registration");
            ApiError::Internal
        })?;

    let user = state
        .users
        .create(&request.username, Some(password_hash))
        .await
        .map_err(|e| match e.current_context() {
            UserStoreError::AlreadyExists { .. } => ApiError::UsernameTaken,
            UserStoreError::RegistrationsClosed => ApiError::RegistrationsClosed,
            UserStoreError::Backend { .. } => {
                error!(error = %e, "failed to create user");
                ApiError::Internal
            }
        })?;

    info!(user_id = %user.id(), username = user.username(), "user registered");
    Ok(Envelope::json(StatusCode::CREATED, Registered { id: user.id() }))
}

/// Creates a session for `user` and returns it as both cookie and body.
fn issue_session(
    state: &AppState,
    jar: CookieJar,
    user: &User,
    client: &ClientInfo,
) -> Result<Response, ApiError> {
    let session = state
        .sessions
        .create(
            user.id(),
            user.username(),
            &client.ip,
            &client.user_agent,
            user.is_admin(),
        )
        .map_err(|e| {
            error!(username = user.username(), error = %e, "failed to create session");
            ApiError::Internal
        })?;

    info!(
        session_id = %session.id(),
        username = user.username(),
        remote_addr = %client.ip,
        "session created"
    );

    let cookie = Cookie::build((SESSION_COOKIE, session.token().to_string()))
        .path(SESSION_COOKIE_PATH)
        .http_only(true)
        .secure(state.session_config.secure_cookies)
        .same_site(SameSite::Strict);

    let body = LoginSuccess {
        id: user.id(),
        username: user.username().to_string(),
        token: session.token().to_string(),
    };

    Ok((jar.add(cookie), Envelope::json(StatusCode::OK, body)).into_response())
}

/// Logs out the caller by destroying their session.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    caller: AuthenticatedSession,
    jar: CookieJar,
) -> impl IntoResponse {
    let session_id = caller.session.id();
    if state.sessions.destroy(session_id).is_err() {
        debug!(session_id = %session_id, "session already gone at logout");
    }

    // Remove session cookie
    let remove_session = Cookie::build((SESSION_COOKIE, ""))
        .path(SESSION_COOKIE_PATH)
        .max_age(TimeDuration::ZERO);

    (jar.add(remove_session), StatusCode::NO_CONTENT)
}

/// Describes the caller's session.
pub async fn current_session(caller: AuthenticatedSession) -> impl IntoResponse {
    Envelope::json(
        StatusCode::OK,
        SessionInfo {
            id: caller.session.id(),
            username: caller.username,
            admin: caller.admin,
            login_time: caller.session.created_at(),
        },
    )
}

/// Revokes any session. Admin only.
pub async fn revoke_session(
    State(state): State<Arc<AppState>>,
    RequireAdmin(admin): RequireAdmin,
    Path(session_id): Path<u64>,
) -> Result<StatusCode, ApiError> {
    let session_id = SessionId::new(session_id);
    state.sessions.destroy(session_id).map_err(|_| ApiError::SessionNotFound)?;

    warn!(
        session_id = %session_id,
        revoked_by = %admin.username,
        "session revoked"
    );
    Ok(StatusCode::NO_CONTENT)
}
