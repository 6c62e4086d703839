//! ChatRelay server assembly.
//!
//! Wires the webhook routes to a bounded event queue and the background
//! dispatch workers, with graceful shutdown that stops the workers after the
//! HTTP listener drains.

use crate::config::RelayConfig;
use crate::dispatcher::Dispatcher;
use crate::followers::{FollowerStore, SqliteFollowerStore};
use crate::queue::EventQueue;
use crate::routes;
use anyhow::Result;
use axum::Extension;
use axum::http::{HeaderMap, Request};
use axum::response::Response;
use relay_genai::{GeminiClient, ReplyGenerator};
use relay_messaging::{LineMessagingClient, MessagingApi};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::classify::ServerErrorsFailureClass;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub struct AppState {
    pub queue: EventQueue,
    pub test_reply_token: String,
    pub started_at: Instant,
}

pub async fn doctor(config_path: Option<PathBuf>) -> Result<()> {
    let cfg = RelayConfig::load(config_path).await?;
    SqliteFollowerStore::open(&cfg.store.path)?;
    tracing::info!(
        bind_addr = %cfg.server.bind_addr,
        gemini_model = %cfg.gemini.model,
        queue_capacity = cfg.queue.capacity,
        queue_workers = cfg.queue.workers,
        store_path = %cfg.store.path,
        "config ok"
    );
    Ok(())
}

pub async fn serve(config_path: Option<PathBuf>) -> Result<()> {
    let cfg = RelayConfig::load(config_path).await?;
    let started_at = Instant::now();
    let addr = cfg.bind_addr()?;
    tracing::info!(
        bind_addr = %addr,
        gemini_model = %cfg.gemini.model,
        line_api_base_url = ?cfg.line.api_base_url,
        gemini_api_base_url = ?cfg.gemini.api_base_url,
        queue_capacity = cfg.queue.capacity,
        queue_workers = cfg.queue.workers,
        store_path = %cfg.store.path,
        http_timeout_seconds = cfg.server.http_timeout_seconds,
        http_max_in_flight = cfg.server.http_max_in_flight,
        "server configuration loaded"
    );
    let listener = preflight_bind_listener(addr).await?;

    let mut line_client = LineMessagingClient::new(&cfg.line.channel_access_token)?;
    if let Some(base_url) = &cfg.line.api_base_url {
        line_client = line_client.with_api_base_url(base_url);
    }
    let messaging: Arc<dyn MessagingApi> = Arc::new(line_client);

    let mut gemini_client = GeminiClient::new(&cfg.gemini.api_key)?.with_model(&cfg.gemini.model);
    if let Some(base_url) = &cfg.gemini.api_base_url {
        gemini_client = gemini_client.with_api_base_url(base_url);
    }
    let genai: Arc<dyn ReplyGenerator> = Arc::new(gemini_client);

    let followers: Arc<dyn FollowerStore> = Arc::new(SqliteFollowerStore::open(&cfg.store.path)?);

    let (queue, queue_rx) = EventQueue::bounded(cfg.queue.capacity);
    let dispatcher = Arc::new(Dispatcher::new(messaging, genai, followers, queue_rx));
    let shutdown = CancellationToken::new();
    let worker_handles = dispatcher.start(cfg.queue.workers, shutdown.child_token());
    tracing::info!(workers = cfg.queue.workers, "dispatch workers started");

    let state = Arc::new(AppState {
        queue,
        test_reply_token: cfg.line.test_reply_token.clone(),
        started_at,
    });

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &Request<_>| {
            tracing::info_span!(
                "http.request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id_from_headers(request.headers())
            )
        })
        .on_response(
            |response: &Response, latency: Duration, _span: &tracing::Span| {
                tracing::info!(
                    status = response.status().as_u16(),
                    latency_ms = latency.as_millis() as u64,
                    "http request completed"
                );
            },
        )
        .on_failure(
            |error: ServerErrorsFailureClass, latency: Duration, _span: &tracing::Span| {
                tracing::error!(
                    error_class = %error,
                    latency_ms = latency.as_millis() as u64,
                    "http request failed"
                );
            },
        );

    let app = routes::router()
        .layer(Extension(state))
        .layer(GlobalConcurrencyLimitLayer::new(cfg.server.http_max_in_flight))
        .layer(TimeoutLayer::new(Duration::from_secs(
            cfg.server.http_timeout_seconds,
        )))
        .layer(trace_layer)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));

    tracing::info!(%addr, "chatrelay serving");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;
    tracing::info!("http server shutdown completed");

    shutdown.cancel();
    for handle in worker_handles {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "dispatch worker join failed during shutdown");
        }
    }
    tracing::info!("dispatch workers shutdown completed");

    Ok(())
}

async fn preflight_bind_listener(addr: SocketAddr) -> Result<tokio::net::TcpListener> {
    tracing::info!(%addr, "preflight bind check starting");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("preflight bind failed for {addr}: {e}"))?;
    tracing::info!(%addr, "preflight bind check passed");
    Ok(listener)
}

fn request_id_from_headers(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
        .unwrap_or_else(|| "missing".to_string())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(sig) => sig,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler; falling back to ctrl_c only");
                if let Err(ctrlc_err) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %ctrlc_err, "failed to await ctrl-c signal");
                }
                shutdown.cancel();
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("received ctrl-c; beginning graceful shutdown");
            }
            _ = terminate.recv() => {
                tracing::warn!("received SIGTERM; beginning graceful shutdown");
            }
        }
    }
    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to await ctrl-c signal");
        } else {
            tracing::warn!("received ctrl-c; beginning graceful shutdown");
        }
    }
    shutdown.cancel();
}
