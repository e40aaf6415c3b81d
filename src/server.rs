//! HTTP server: router, middleware stack and graceful shutdown

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Json, Router, middleware, routing::get};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::auth::{Authenticator, Principal, auth_middleware};
use crate::cache::{CacheStore, InMemoryCache};
use crate::config::Config;
use crate::oidc::TrustChain;
use crate::{Error, Result};

/// Build the application router with authentication applied to every route.
///
/// Paths listed in `auth.public_paths` pass through the middleware untouched.
pub fn build_router(authenticator: Arc<Authenticator>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/me", get(me_handler))
        .layer(middleware::from_fn_with_state(authenticator, auth_middleware))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
}

async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn me_handler(principal: Principal) -> Json<Principal> {
    Json(principal)
}

/// Validate `config`, wire the trust chain and serve until a shutdown signal.
pub async fn run(config: Config) -> Result<()> {
    config.validate()?;

    let cache = Arc::new(InMemoryCache::new());
    let chain = TrustChain::from_config(&config.oidc, Arc::clone(&cache) as Arc<dyn CacheStore>)?;
    let authenticator = Arc::new(Authenticator::new(chain.verifier.clone(), &config.auth));

    #[allow(unused_mut)]
    let mut app = build_router(authenticator);

    #[cfg(feature = "metrics")]
    {
        let handle = metrics_exporter_prometheus::PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| Error::Internal(format!("failed to install metrics recorder: {e}")))?;
        // Merged after the auth layer, so scrapes are unauthenticated
        let scraped = Arc::clone(&cache);
        app = app.merge(Router::new().route(
            "/metrics",
            get(move || {
                let handle = handle.clone();
                let cache = Arc::clone(&scraped);
                async move {
                    cache.stats().record();
                    handle.render()
                }
            }),
        ));
    }

    let listener =
        TcpListener::bind((config.server.host.as_str(), config.server.port)).await?;
    let addr: SocketAddr = listener.local_addr()?;

    info!(
        addr = %addr,
        discovery_url = %config.oidc.discovery_url,
        public_paths = ?config.auth.public_paths,
        "Listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| Error::Internal(e.to_string()))?;

    let stats = cache.stats();
    info!(
        hits = stats.hits,
        misses = stats.misses,
        evictions = stats.evictions,
        entries = stats.size,
        "Server shutdown complete"
    );
    Ok(())
}

/// Shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
