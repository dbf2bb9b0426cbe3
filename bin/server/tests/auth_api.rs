use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{
        Request, Response, StatusCode,
        header::{AUTHORIZATION, CONTENT_TYPE, SET_COOKIE, USER_AGENT},
    },
};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use confplanner_auth::{
    AuthorizationRequest, BasicProvider, HashParams, InMemoryUserStore, JourneyError,
    OidcBackend, OidcProvider, OidcProviderConfig, ProviderRegistry, User, UserStore,
};
use confplanner_core::Result;
use confplanner_server::{
    auth::{AppState, BASIC_PROVIDER_ID},
    config::SessionConfig,
    router,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

const UA: &str = "Mozilla/5.0 (integration test)";

/// Identity provider stand-in that mints unsigned tokens with fixed claims.
struct FakeIdp {
    claims: Value,
}

#[async_trait]
impl OidcBackend for FakeIdp {
    fn authorization_request(&self, state: &str) -> AuthorizationRequest {
        AuthorizationRequest {
            url: format!("https://idp.example.com/authorize?state={state}"),
            nonce: "nonce".to_string(),
            pkce_verifier: "verifier".to_string(),
        }
    }

    async fn exchange_code(
        &self,
        _code: &str,
        _pkce_verifier: String,
        _nonce: &str,
    ) -> Result<String, JourneyError> {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
        let payload = URL_SAFE_NO_PAD.encode(self.claims.to_string());
        Ok(format!("{header}.{payload}.sig"))
    }
}

fn okta_config() -> OidcProviderConfig {
    OidcProviderConfig::new(
        "okta".to_string(),
        "Company SSO".to_string(),
        "planner".to_string(),
        "secret".to_string(),
        "https://idp.example.com".to_string(),
        "preferred_username".to_string(),
    )
}

/// An in-memory app with optional basic and OIDC providers.
struct TestApp {
    state: Arc<AppState>,
    users: Arc<InMemoryUserStore>,
    basic_hasher: BasicProvider,
}

impl TestApp {
    fn new(oidc: Option<(OidcProviderConfig, Value)>) -> Self {
        Self::configured(oidc, true, true)
    }

    fn configured(
        oidc: Option<(OidcProviderConfig, Value)>,
        enable_basic_auth: bool,
        accept_registrations: bool,
    ) -> Self {
        let users = Arc::new(InMemoryUserStore::new(accept_registrations));
        let store = Arc::clone(&users) as Arc<dyn UserStore>;
        let params = HashParams::new(1024, 1, 1, None).expect("params");

        let registry = ProviderRegistry::new();
        if enable_basic_auth {
            registry
                .register(
                    BASIC_PROVIDER_ID,
                    BasicProvider::with_params(Arc::clone(&store), params.clone())
                        .expect("basic"),
                )
                .expect("register basic");
        }

        if let Some((config, claims)) = oidc {
            let provider = OidcProvider::with_backend(
                &config,
                Arc::new(FakeIdp { claims }),
                Arc::clone(&store),
            );
            registry
                .register(config.identifier(), provider)
                .expect("register oidc");
        }

        let state = Arc::new(AppState::new(store, registry, SessionConfig::default()));
        let basic_hasher =
            BasicProvider::with_params(Arc::clone(&users) as Arc<dyn UserStore>, params)
                .expect("hasher");

        Self {
            state,
            users,
            basic_hasher,
        }
    }

    fn add_user(&self, username: &str, password: &str, admin: bool) -> User {
        let hash = self.basic_hasher.hash_password(password).expect("hash");
        let mut user = User::new(username.to_string(), Some(hash));
        user.set_admin(admin);
        self.users.insert(user)
    }

    fn router(&self) -> Router {
        router(Arc::clone(&self.state))
    }

    async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router().oneshot(request).await.expect("response")
    }

    async fn login(&self, username: &str, password: &str) -> (StatusCode, Value) {
        let response = self
            .send(post_json(
                "/login/basic",
                &json!({"username": username, "password": password}),
            ))
            .await;
        let status = response.status();
        (status, body_json(response).await)
    }

    async fn token_for(&self, username: &str, password: &str) -> String {
        let (status, body) = self.login(username, password).await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");
        body["data"]["token"]
            .as_str()
            .expect("token in body")
            .to_string()
    }
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .header(USER_AGENT, UA)
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn authed(method: &str, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .expect("request")
}

async fn body_json(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    }
}

fn state_param(url: &str) -> String {
    url.split("state=")
        .nth(1)
        .expect("state in url")
        .to_string()
}

#[tokio::test]
async fn login_options_list_providers_in_order() {
    let app = TestApp::new(Some((okta_config(), json!({}))));

    let response = app
        .send(
            Request::builder()
                .uri("/login")
                .body(Body::empty())
                .expect("request"),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({
            "code": 200,
            "data": {"options": [
                {"name": "Basic", "identifier": "basic", "type": "basic"},
                {"name": "Company SSO", "identifier": "okta", "type": "oidc"}
            ]}
        })
    );
}

#[tokio::test]
async fn unknown_provider_is_rejected() {
    let app = TestApp::new(None);
    let response = app.send(post_json("/login/nope", &json!({}))).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await,
        json!({"code": 400, "message": "Unknown auth provider"})
    );
}

#[tokio::test]
async fn unknown_user_and_wrong_password_look_identical() {
    let app = TestApp::new(None);
    app.add_user("alice", "correct horse", false);

    let (unknown_status, unknown_body) = app.login("mallory", "whatever").await;
    let (wrong_status, wrong_body) = app.login("alice", "battery staple").await;

    assert_eq!(unknown_status, StatusCode::BAD_REQUEST);
    assert_eq!(unknown_status, wrong_status);
    assert_eq!(unknown_body, wrong_body);
    assert_eq!(
        unknown_body,
        json!({"code": 400, "message": "Username and password combination not found"})
    );
    assert!(app.state.sessions.is_empty());
}

#[tokio::test]
async fn malformed_basic_body_is_invalid_request() {
    let app = TestApp::new(None);
    let response = app
        .send(post_json("/login/basic", &json!({"username": "alice"})))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(
        body["message"]
            .as_str()
            .expect("message")
            .starts_with("Invalid request (")
    );
}

#[tokio::test]
async fn basic_login_sets_cookie_and_returns_token() {
    let app = TestApp::new(None);
    let alice = app.add_user("alice", "correct horse", false);

    let response = app
        .send(post_json(
            "/login/basic",
            &json!({"username": "Alice", "password": "correct horse"}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let cookie = response
        .headers()
        .get(SET_COOKIE)
        .expect("session cookie")
        .to_str()
        .expect("ascii cookie")
        .to_string();
    assert!(cookie.starts_with("confplanner_session="));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Strict"));
    assert!(cookie.contains("Path=/api"));
    assert!(cookie.contains("Secure"));

    let body = body_json(response).await;
    assert_eq!(body["code"], 200);
    assert_eq!(body["data"]["username"], "alice");
    assert_eq!(body["data"]["id"], json!(alice.id()));

    let token = body["data"]["token"].as_str().expect("token");
    assert!(cookie.contains(token));
    assert_eq!(
        app.state
            .sessions
            .get_by_token(token)
            .expect("live session")
            .user_id(),
        alice.id()
    );
}

#[tokio::test]
async fn session_cookie_authenticates_requests() {
    let app = TestApp::new(None);
    app.add_user("alice", "correct horse", false);
    let token = app.token_for("alice", "correct horse").await;

    let response = app
        .send(
            Request::builder()
                .uri("/session")
                .header("cookie", format!("confplanner_session={token}"))
                .body(Body::empty())
                .expect("request"),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["username"], "alice");
    assert_eq!(body["data"]["admin"], false);
    assert!(body["data"]["login_time"].is_string());
}

#[tokio::test]
async fn missing_or_unknown_token_is_unauthorized() {
    let app = TestApp::new(None);

    let response = app
        .send(
            Request::builder()
                .uri("/session")
                .body(Body::empty())
                .expect("request"),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        body_json(response).await,
        json!({"code": 401, "message": "Unauthorized"})
    );

    let response = app.send(authed("GET", "/session", "not-a-token")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_destroys_session() {
    let app = TestApp::new(None);
    app.add_user("alice", "correct horse", false);
    let token = app.token_for("alice", "correct horse").await;

    let response = app.send(authed("POST", "/logout", &token)).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let cleared = response
        .headers()
        .get(SET_COOKIE)
        .expect("cookie cleared")
        .to_str()
        .expect("ascii cookie");
    assert!(cleared.starts_with("confplanner_session=;"));

    let response = app.send(authed("GET", "/session", &token)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(app.state.sessions.is_empty());
}

#[tokio::test]
async fn deleted_user_invalidates_session() {
    let app = TestApp::new(None);
    let alice = app.add_user("alice", "correct horse", false);
    let token = app.token_for("alice", "correct horse").await;

    app.users.remove(alice.id()).expect("user existed");

    let response = app.send(authed("GET", "/session", &token)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        body_json(response).await,
        json!({"code": 403, "message": "Invalid session"})
    );
    assert!(app.state.sessions.get_by_token(&token).is_none());

    // The session is gone, so the next attempt is simply unauthenticated.
    let response = app.send(authed("GET", "/session", &token)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn session_reflects_live_admin_flag() {
    let app = TestApp::new(None);
    let alice = app.add_user("alice", "correct horse", false);
    let token = app.token_for("alice", "correct horse").await;

    let mut promoted = alice.clone();
    promoted.set_admin(true);
    app.users.insert(promoted);

    let response = app.send(authed("GET", "/session", &token)).await;
    assert_eq!(body_json(response).await["data"]["admin"], true);
}

#[tokio::test]
async fn only_admins_revoke_sessions() {
    let app = TestApp::new(None);
    app.add_user("root", "admin pass", true);
    app.add_user("bob", "user pass", false);

    let admin_token = app.token_for("root", "admin pass").await;
    let user_token = app.token_for("bob", "user pass").await;
    let admin_session = app
        .state
        .sessions
        .get_by_token(&admin_token)
        .expect("admin session")
        .id();
    let user_session = app
        .state
        .sessions
        .get_by_token(&user_token)
        .expect("user session")
        .id();

    let response = app
        .send(authed(
            "DELETE",
            &format!("/sessions/{admin_session}"),
            &user_token,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        body_json(response).await,
        json!({"code": 403, "message": "Forbidden"})
    );

    let uri = format!("/sessions/{user_session}");
    let response = app.send(authed("DELETE", &uri, &admin_token)).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(app.state.sessions.get_by_token(&user_token).is_none());

    let response = app.send(authed("DELETE", &uri, &admin_token)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        body_json(response).await,
        json!({"code": 404, "message": "Session not found"})
    );
}

#[tokio::test]
async fn oidc_journey_start_then_callback() {
    let app = TestApp::new(Some((okta_config(), json!({"preferred_username": "Carol"}))));

    let response = app.send(post_json("/login/okta", &json!({}))).await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    let body = body_json(response).await;
    assert_eq!(body["code"], 307);
    let url = body["data"]["url"].as_str().expect("redirect url");
    assert!(url.starts_with("https://idp.example.com/authorize"));

    let callback = json!({"code": "auth-code", "state": state_param(url)});
    let response = app.send(post_json("/login/okta", &callback)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(SET_COOKIE).is_some());

    let body = body_json(response).await;
    assert_eq!(body["data"]["username"], "carol");
    assert_eq!(app.users.len(), 1);
    assert_eq!(app.state.sessions.len(), 1);

    // Replaying the callback finds no pending state.
    let response = app.send(post_json("/login/okta", &callback)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await,
        json!({"code": 400, "message": "Invalid state"})
    );
}

#[tokio::test]
async fn oidc_callback_with_empty_fields_starts_a_journey() {
    let app = TestApp::new(Some((okta_config(), json!({"preferred_username": "carol"}))));

    let response = app
        .send(post_json("/login/okta", &json!({"code": "", "state": ""})))
        .await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    let body = body_json(response).await;
    assert!(body["data"]["url"].as_str().is_some());
    assert!(app.users.is_empty());
}

#[tokio::test]
async fn oidc_callback_from_other_browser_fails_verification() {
    let app = TestApp::new(Some((okta_config(), json!({"preferred_username": "carol"}))));

    let body = body_json(app.send(post_json("/login/okta", &json!({}))).await).await;
    let url = body["data"]["url"].as_str().expect("redirect url");

    let request = Request::builder()
        .method("POST")
        .uri("/login/okta")
        .header(CONTENT_TYPE, "application/json")
        .header(USER_AGENT, "curl/8.0")
        .body(Body::from(
            json!({"code": "auth-code", "state": state_param(url)}).to_string(),
        ))
        .expect("request");

    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await,
        json!({"code": 400, "message": "State verification failed"})
    );
    assert!(app.state.sessions.is_empty());
}

#[tokio::test]
async fn oidc_allow_list_rejects_outsiders() {
    let config = okta_config().with_login_filter("groups".to_string(), vec!["staff".to_string()]);
    let app = TestApp::new(Some((
        config,
        json!({"preferred_username": "eve", "groups": ["guest"]}),
    )));

    let body = body_json(app.send(post_json("/login/okta", &json!({}))).await).await;
    let url = body["data"]["url"].as_str().expect("redirect url");

    let callback = json!({"code": "auth-code", "state": state_param(url)});
    let response = app.send(post_json("/login/okta", &callback)).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        body_json(response).await,
        json!({"code": 403, "message": "You are not authorised to use this service"})
    );
    assert!(app.state.sessions.is_empty());
    assert!(app.users.is_empty());
}

#[tokio::test]
async fn oidc_missing_claim_is_internal_error() {
    let app = TestApp::new(Some((okta_config(), json!({"email": "carol@example.com"}))));

    let body = body_json(app.send(post_json("/login/okta", &json!({}))).await).await;
    let url = body["data"]["url"].as_str().expect("redirect url");

    let callback = json!({"code": "auth-code", "state": state_param(url)});
    let response = app.send(post_json("/login/okta", &callback)).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body_json(response).await,
        json!({"code": 500, "message": "Internal Server Error"})
    );
}

#[tokio::test]
async fn registered_user_can_log_in() {
    let app = TestApp::new(None);

    let response = app
        .send(post_json(
            "/register",
            &json!({"username": "Erin", "password": "hunter22"}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["code"], 201);
    let id = body["data"]["id"].as_str().expect("user id").to_string();
    assert!(id.starts_with("usr_"));

    let (status, body) = app.login("erin", "hunter22").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], json!(id));
    assert_eq!(body["data"]["username"], "erin");
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let app = TestApp::new(None);
    app.add_user("frank", "first password", false);

    let response = app
        .send(post_json(
            "/register",
            &json!({"username": "Frank", "password": "second password"}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(
        body_json(response).await,
        json!({"code": 409, "message": "User with that username already exists"})
    );

    // The original password still works.
    let (status, _) = app.login("frank", "first password").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn registration_is_refused_when_closed() {
    let app = TestApp::configured(None, true, false);

    let response = app
        .send(post_json(
            "/register",
            &json!({"username": "grace", "password": "hunter22"}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        body_json(response).await,
        json!({
            "code": 403,
            "message": "This service is not currently accepting registrations"
        })
    );
    assert!(app.users.is_empty());
}

#[tokio::test]
async fn registration_requires_basic_provider() {
    let app = TestApp::configured(Some((okta_config(), json!({}))), false, true);

    let response = app
        .send(post_json(
            "/register",
            &json!({"username": "heidi", "password": "hunter22"}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        body_json(response).await,
        json!({
            "code": 403,
            "message": "Registrations are only accepted via an identity provider"
        })
    );
    assert!(app.users.is_empty());
}

#[tokio::test]
async fn registration_requires_username_and_password() {
    let app = TestApp::new(None);

    let response = app
        .send(post_json(
            "/register",
            &json!({"username": "ivan", "password": ""}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(app.users.is_empty());
}
