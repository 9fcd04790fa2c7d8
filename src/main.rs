use axum::{
    Router,
    routing::{get, post},
    middleware::from_fn_with_state,
};

use http::{HeaderValue, Method, header};
use std::net::SocketAddr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::{
    limit::RequestBodyLimitLayer,
    trace::{TraceLayer, DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, DefaultOnFailure},
    cors::CorsLayer,
};

use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod error;
mod state;
mod db;
mod crypto {
    pub mod password;
    pub mod signing;
}

mod models {
    pub mod user;
    pub mod session;
    pub mod episode;
}

mod repositories {
    pub mod user;
    pub mod episode;
}

mod services {
    pub mod credentials;
    pub mod sessions;
    pub mod revocation;
    pub mod episode_cache;
    pub mod episodes;
}

mod handlers {
    pub mod auth;
    pub mod episodes;
    pub mod extract;
}

mod middleware_layer {
    pub mod auth;
    pub mod rate_limit;
}

mod validation {
    pub mod auth;
}

#[cfg(test)]
mod testing;

use config::Config;
use middleware_layer::rate_limit::{self, with_rate_limit};
use state::AppState;

/// Largest accepted request body. Every payload here is a small JSON object.
const MAX_BODY_BYTES: usize = 64 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    tracing::info!("Configuration loaded");

    let state = AppState::new(&config).await?;
    tracing::info!("AppState initialized");

    let shutdown = CancellationToken::new();

    if !config.episode_cache_warm.is_empty() {
        let cache = state.episode_cache.clone();
        let keys = config.episode_cache_warm.clone();
        let cancel = shutdown.child_token();
        tokio::spawn(async move {
            let loaded = cache.warm(&keys, &cancel).await;
            tracing::info!("Episode cache warmed: {}/{} seasons", loaded, keys.len());
        });
    }

    let origins = config
        .cors_origins
        .iter()
        .map(|origin| origin.parse::<HeaderValue>())
        .collect::<Result<Vec<_>, _>>()?;

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .max_age(Duration::from_secs(86400));

    let credential_routes = Router::new()
        .route("/api/auth/register", post(handlers::auth::register))
        .route("/api/auth/login", post(handlers::auth::login))
        .with_state(state.clone());
    let credential_routes = with_rate_limit(credential_routes, rate_limit::AUTH)?;

    let session_routes = Router::new()
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route("/api/auth/me", get(handlers::auth::me))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::require_auth,
        ))
        .with_state(state.clone());

    let episode_routes = Router::new()
        .route(
            "/api/episodes",
            get(handlers::episodes::list_episodes).merge(
                post(handlers::episodes::create_episode).route_layer(from_fn_with_state(
                    state.clone(),
                    middleware_layer::auth::require_auth,
                )),
            ),
        )
        .route("/api/episodes/{id}", get(handlers::episodes::get_episode))
        .with_state(state.clone());

    let api_routes = with_rate_limit(session_routes.merge(episode_routes), rate_limit::API)?;

    let app = Router::new()
        .merge(credential_routes)
        .merge(api_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(false))
                .on_request(DefaultOnRequest::default().level(Level::DEBUG))
                .on_response(DefaultOnResponse::default().level(Level::DEBUG))
                .on_failure(DefaultOnFailure::default().level(Level::ERROR)),
        )
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(cors);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on http://{}", config.bind_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown))
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM and cancels `shutdown` for background tasks.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
    shutdown.cancel();
}
