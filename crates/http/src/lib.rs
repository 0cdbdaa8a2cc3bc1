//! HTTP server facade for shelf: routing, middleware, error envelopes and a
//! bounded graceful shutdown.

use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{http::StatusCode, response::Response, routing::get, Router};
use serde_json::json;
use tokio::{net::TcpListener, signal, sync::Notify, task::JoinError};

use shelf_kernel::{
    settings::{Environment, Settings},
    ModuleRegistry,
};

pub mod error;
pub mod extract;
pub mod rate_limit;
pub mod response;
pub mod router;

pub use error::AppError;
pub use rate_limit::{RateLimiter, SweeperHandle};
pub use response::envelope;
use router::RouterBuilder;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Bind the configured address and serve until SIGINT or SIGTERM
pub async fn start_server(registry: &ModuleRegistry, settings: &Settings) -> anyhow::Result<()> {
    tracing::info!(
        "starting HTTP server on {}:{}",
        settings.server.host,
        settings.server.port
    );

    let listener = TcpListener::bind((settings.server.host.as_str(), settings.server.port))
        .await
        .context("failed to bind to address")?;

    serve(listener, registry, settings, shutdown_signal()).await
}

/// Serve on `listener` until `shutdown` resolves.
///
/// Once `shutdown` fires the server stops accepting connections and waits up
/// to `server.shutdown_timeout_secs` for in-flight requests. Connections still
/// open after that are abandoned. The rate limiter sweeper lives exactly as
/// long as the server.
pub async fn serve<F>(
    listener: TcpListener,
    registry: &ModuleRegistry,
    settings: &Settings,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send,
{
    let addr = listener.local_addr().context("listener has no local address")?;

    let limiter = settings
        .limiter
        .enabled
        .then(|| RateLimiter::new(&settings.limiter));
    let sweeper = limiter.as_ref().map(RateLimiter::start);

    let app = build_router(registry, settings, limiter);

    let drain = Arc::new(Notify::new());
    let drain_signal = drain.clone();
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { drain_signal.notified().await });
    let mut server = tokio::spawn(async move { server.await });

    tracing::info!("HTTP server listening on http://{}", addr);

    let result = tokio::select! {
        joined = &mut server => flatten(joined),
        _ = shutdown => {
            let timeout = Duration::from_secs(settings.server.shutdown_timeout_secs);
            tracing::info!(timeout_secs = timeout.as_secs(), "shutting down server, draining in-flight requests");
            drain.notify_one();

            match tokio::time::timeout(timeout, &mut server).await {
                Ok(joined) => flatten(joined),
                Err(_) => {
                    tracing::warn!("drain timed out, abandoning remaining connections");
                    server.abort();
                    Ok(())
                }
            }
        }
    };

    if let Some(sweeper) = sweeper {
        sweeper.stop().await;
    }

    tracing::info!(%addr, "server stopped");
    result
}

fn flatten(joined: Result<std::io::Result<()>, JoinError>) -> anyhow::Result<()> {
    joined
        .context("HTTP server task failed")?
        .context("HTTP server failed")
}

/// Build the main HTTP router with all module routes mounted
pub fn build_router(
    registry: &ModuleRegistry,
    settings: &Settings,
    limiter: Option<RateLimiter>,
) -> Router {
    let environment = settings.environment;
    let mut router_builder =
        RouterBuilder::new().route("/v1/healthcheck", get(move || healthcheck(environment)));

    for module in registry.modules() {
        let module_name = module.name();
        tracing::info!(
            module = module_name,
            "mounting module routes under /v1/{}",
            module_name
        );
        router_builder = router_builder.mount_module(module_name, module.routes());
    }

    router_builder = router_builder.with_fallbacks();

    if let Some(limiter) = limiter {
        router_builder = router_builder.with_rate_limit(limiter);
    } else {
        tracing::warn!("rate limiting disabled");
    }

    router_builder
        .with_timeout(settings.server.request_timeout_ms)
        .with_panic_recovery()
        .with_tracing()
        .with_request_id()
        .build()
}

/// Health check endpoint
async fn healthcheck(environment: Environment) -> Response {
    envelope(
        StatusCode::OK,
        &json!({
            "status": "available",
            "system_info": {
                "environment": environment.as_str(),
                "version": VERSION,
            }
        }),
    )
}

/// Wait for SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!(signal = "SIGINT", "shutdown signal received"),
        _ = terminate => tracing::info!(signal = "SIGTERM", "shutdown signal received"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, extract::ConnectInfo, http::Request};
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpStream,
        sync::oneshot,
    };
    use tower::ServiceExt;

    fn quiet_settings() -> Settings {
        let mut settings = Settings::default();
        settings.limiter.enabled = false;
        settings
    }

    #[tokio::test]
    async fn healthcheck_reports_environment_and_version() {
        let registry = ModuleRegistry::new();
        let app = build_router(&registry, &quiet_settings(), None);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/healthcheck")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "available");
        assert_eq!(body["system_info"]["environment"], "development");
        assert_eq!(body["system_info"]["version"], VERSION);
    }

    #[tokio::test]
    async fn limiter_is_installed_when_given() {
        let registry = ModuleRegistry::new();
        let limiter = RateLimiter::new(&Settings::default().limiter);
        let app = build_router(&registry, &Settings::default(), Some(limiter.clone()));

        let mut request = Request::builder()
            .uri("/v1/healthcheck")
            .body(Body::empty())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([203, 0, 113, 9], 40000))));

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(limiter.is_tracking("203.0.113.9"));
    }

    #[tokio::test]
    async fn serve_answers_then_drains_on_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let server = tokio::spawn(async move {
            let registry = ModuleRegistry::new();
            let settings = Settings::default();
            serve(listener, &registry, &settings, async {
                let _ = stop_rx.await;
            })
            .await
        });

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /v1/healthcheck HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut raw = String::new();
        stream.read_to_string(&mut raw).await.unwrap();
        assert!(raw.starts_with("HTTP/1.1 200 OK"));
        assert!(raw.contains("\"available\""));

        stop_tx.send(()).unwrap();
        server.await.unwrap().unwrap();
    }
}
