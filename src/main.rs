use std::{any::Any, net::SocketAddr, sync::Arc, time::Instant};

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod error;
mod geo;
mod handlers;
mod models;
mod shortcode;
mod store;
mod sweeper;
mod validator;

use error::ApiError;
use geo::GeoCache;
use store::LinkStore;

/// Largest JSON body accepted by the API.
const BODY_LIMIT: usize = 10 * 1024 * 1024;

// ── Shared application state ───────────────────────────────────────────────

pub struct AppState {
    pub config: config::AppConfig,
    pub store: LinkStore,
    /// In-memory cache for IP → GeoInfo lookups so the same IP is never
    /// looked up more than once per server lifetime.
    pub geo_cache: GeoCache,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: config::AppConfig) -> Self {
        Self {
            config,
            store: LinkStore::new(),
            geo_cache: GeoCache::new(),
            started_at: Instant::now(),
        }
    }
}

// ── Router ─────────────────────────────────────────────────────────────────

pub fn build_router(state: Arc<AppState>) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring unusable CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true);

    Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health::health))
        .route(
            "/shorturls",
            get(handlers::shorturls::list_short_urls).post(handlers::shorturls::create_short_url),
        )
        .route("/shorturls/:shortcode", get(handlers::shorturls::get_statistics))
        // Short-link redirect — static routes above take priority
        .route("/:shortcode", get(handlers::redirect::redirect))
        .fallback(handlers::not_found)
        .with_state(state)
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("SAMEORIGIN"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::REFERRER_POLICY,
            HeaderValue::from_static("no-referrer"),
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!("Unhandled error: {}", detail);
    ApiError::internal().into_response()
}

// ── Entry point ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (ignore error if file is absent — env vars may already be set)
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shortly=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::AppConfig::from_env()?;
    tracing::info!("Starting shortly on {}:{}", config.host, config.port);
    tracing::info!("Frontend URL: {}", config.frontend_url);
    if let Some(base) = &config.base_url {
        tracing::info!("Base URL: {}", base);
    }

    let bind_addr = format!("{}:{}", config.host, config.port);
    let sweep_interval = config.sweep_interval;

    let state = Arc::new(AppState::new(config));
    let sweeper = sweeper::spawn(state.store.clone(), sweep_interval);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    sweeper.abort();
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => tracing::error!("Failed to listen for SIGTERM: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
