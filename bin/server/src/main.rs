use axum::Router;
use confplanner_auth::{
    BasicProvider, InMemoryUserStore, OidcProvider, ProviderRegistry, UserStore,
};
use confplanner_server::{
    auth::{AppState, BASIC_PROVIDER_ID, PgUserStore},
    config::ServerConfig,
    router,
};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::load().expect("failed to load configuration");
    tracing::info!("Loaded configuration");

    let users: Arc<dyn UserStore> = match &config.database_url {
        Some(database_url) => {
            let db_pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(database_url)
                .await
                .expect("failed to connect to database");

            tracing::info!("Running database migrations...");
            sqlx::migrate!("./migrations")
                .run(&db_pool)
                .await
                .expect("failed to run migrations");

            Arc::new(PgUserStore::new(db_pool, config.accept_registrations))
        }
        None => {
            tracing::warn!("no database_url configured, users are kept in memory");
            Arc::new(InMemoryUserStore::new(config.accept_registrations))
        }
    };

    let providers = ProviderRegistry::new();

    if config.auth.enable_basic_auth {
        let basic = BasicProvider::new(Arc::clone(&users)).expect("failed to set up basic auth");
        providers
            .register(BASIC_PROVIDER_ID, basic)
            .expect("failed to register basic auth");
    }

    for provider_config in &config.auth.providers {
        let identifier = provider_config.identifier();
        tracing::info!(provider = identifier, "Discovering OIDC provider...");

        let callback_url = provider_config.callback_url(&config.server.base_url);
        let provider = OidcProvider::discover(provider_config, callback_url, Arc::clone(&users))
            .await
            .expect("failed to discover OIDC provider");

        providers
            .register(identifier, provider)
            .expect("failed to register OIDC provider");
    }

    if providers.is_empty() {
        tracing::warn!("no auth providers configured, nobody can log in");
    }

    let listen_addr = config.listen_addr();
    let sweep_interval_secs = config.session.pending_state_sweep_seconds;
    let app_state = Arc::new(AppState::new(users, providers, config.session));

    // Spawn periodic sweep of abandoned OIDC journeys
    let sweep_state = Arc::clone(&app_state);
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(sweep_interval_secs));
        loop {
            interval.tick().await;
            let purged = sweep_state.providers.purge_expired_states();
            if purged > 0 {
                tracing::debug!(purged_states = purged, "Swept expired OIDC journeys");
            }
        }
    });

    let app = Router::new()
        .nest("/api", router(app_state))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .expect("failed to bind to address");

    tracing::info!("listening on http://{}", listen_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("server error");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
