//! Per-client token bucket rate limiting.
//!
//! Each client address gets its own bucket. A background sweep drops buckets
//! of clients that have gone quiet so the registry does not grow without
//! bound. Every access to the registry, the sweep included, goes through one
//! mutex and never awaits while holding it.

use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::anyhow;
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use parking_lot::Mutex;
use tokio::{
    sync::oneshot,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};

use shelf_kernel::settings::LimiterSettings;

use crate::error::AppError;

#[derive(Debug)]
struct Client {
    tokens: f64,
    last_refill: Instant,
    last_seen: Instant,
}

impl Client {
    fn new(burst: f64, now: Instant) -> Self {
        Self {
            tokens: burst,
            last_refill: now,
            last_seen: now,
        }
    }

    fn try_acquire(&mut self, now: Instant, rate: f64, burst: f64) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate).min(burst);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

struct Inner {
    rate: f64,
    burst: f64,
    sweep_interval: Duration,
    idle_timeout: Duration,
    clients: Mutex<HashMap<String, Client>>,
}

/// Shared handle to the client registry. Clones refer to the same registry.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Inner>,
}

impl RateLimiter {
    pub fn new(settings: &LimiterSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                rate: settings.requests_per_second,
                burst: f64::from(settings.burst),
                sweep_interval: Duration::from_secs(settings.sweep_interval_secs.max(1)),
                idle_timeout: Duration::from_secs(settings.idle_timeout_secs),
                clients: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Record a request from `client` and take one token from its bucket.
    /// Returns false when the bucket is empty.
    pub fn check(&self, client: &str) -> bool {
        let now = Instant::now();
        let (rate, burst) = (self.inner.rate, self.inner.burst);

        let mut clients = self.inner.clients.lock();
        let entry = clients
            .entry(client.to_string())
            .or_insert_with(|| Client::new(burst, now));

        entry.last_seen = now;
        entry.try_acquire(now, rate, burst)
    }

    /// Drop clients idle for longer than the configured timeout. Returns how
    /// many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let idle_timeout = self.inner.idle_timeout;

        let mut clients = self.inner.clients.lock();
        let before = clients.len();
        clients.retain(|_, entry| now.saturating_duration_since(entry.last_seen) <= idle_timeout);
        before - clients.len()
    }

    pub fn tracked_clients(&self) -> usize {
        self.inner.clients.lock().len()
    }

    pub fn is_tracking(&self, client: &str) -> bool {
        self.inner.clients.lock().contains_key(client)
    }

    /// Spawn the periodic sweep. The task runs until the returned handle is
    /// stopped or dropped.
    pub fn start(&self) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let limiter = self.clone();
        let period = self.inner.sweep_interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = limiter.sweep();
                        if evicted > 0 {
                            tracing::debug!(
                                evicted,
                                remaining = limiter.tracked_clients(),
                                "evicted idle rate limiter clients"
                            );
                        }
                    }
                    _ = &mut shutdown_rx => break,
                }
            }
        });

        tracing::info!(
            interval_secs = period.as_secs(),
            idle_timeout_secs = self.inner.idle_timeout.as_secs(),
            "rate limiter sweeper started"
        );

        SweeperHandle {
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }
}

/// Owner of the background sweep task.
pub struct SweeperHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Signal the sweep task to exit and wait for it.
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }

        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                tracing::warn!(error = %err, "rate limiter sweeper ended abnormally");
            }
        }

        tracing::info!("rate limiter sweeper stopped");
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Middleware admitting a request only when its client still has a token.
///
/// The client is identified by the peer IP address; the port is ignored. A
/// request without connection info is a server fault, not a rejection.
pub async fn rate_limit(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .ok_or_else(|| anyhow!("unable to determine client address"))?;

    if !limiter.check(&client) {
        tracing::debug!(%client, "rate limit exceeded");
        return Err(AppError::RateLimitExceeded);
    }

    Ok(next.run(request).await)
}
