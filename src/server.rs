use crate::config::Config;
use crate::error::Result;
use crate::handlers;
use crate::limiter::{QuotaPolicy, SlidingWindowLimiter};
use crate::middleware::{logging_middleware, rate_limit};
use crate::store::{CounterStore, MemoryStore, ValkeyStore};
use axum::routing::get;
use axum::{middleware, Router};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub limiter: Arc<SlidingWindowLimiter>,
}

/// Assemble the application router. Only `/api/*` routes pass through the
/// rate-limit gate; `/health` and `/` are always served.
pub fn create_app(state: AppState) -> Router {
    let api = Router::new()
        .route("/quote", get(handlers::quote))
        .route("/status", get(handlers::status))
        .route("/quotes/random/:count", get(handlers::random_quotes))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit));

    Router::new()
        .nest("/api", api)
        .route("/health", get(handlers::health))
        .route("/", get(handlers::root))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn(logging_middleware)),
        )
}

pub struct Server {
    config: Config,
    app: Router,
}

impl Server {
    pub async fn new(config: Config) -> Result<Self> {
        let policy = QuotaPolicy::new(
            config.rate_limit,
            Duration::from_secs(config.window_seconds),
        )?;

        let store: Arc<dyn CounterStore> = match config.cache_url()? {
            Some(url) => {
                let store =
                    ValkeyStore::connect(&url, Duration::from_millis(config.store_timeout_ms))
                        .await?;
                store.ping().await?;
                tracing::info!(url = %url, "connected to counter store");
                Arc::new(store)
            }
            None => {
                tracing::warn!(
                    "no cache connection string configured, using in-process counters"
                );
                Arc::new(MemoryStore::new())
            }
        };

        let limiter = Arc::new(SlidingWindowLimiter::new(store, policy));
        let app = create_app(AppState { limiter });

        Ok(Self { config, app })
    }

    pub async fn run(self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;

        tracing::info!(addr = %self.config.bind_addr, "quotegate listening");
        tracing::info!(
            limit = self.config.rate_limit,
            window_seconds = self.config.window_seconds,
            "rate limit policy active on /api routes"
        );

        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        },
    }
}
