#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};

use serde::Serialize;
use tokio::{
    sync::{Semaphore, oneshot},
    time::timeout,
};
use tracing::{debug, warn};

use super::{KillSwitch, RenderArtifact, Renderer};
use crate::{
    config::{EngineConfig, Viewport},
    error::EngineError,
    types::CodeBundle,
};

/// Point-in-time view of pool activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    /// Configured number of contexts.
    pub capacity:  usize,
    /// Contexts free right now.
    pub available: usize,
    /// Renders still executing, including timed-out or abandoned ones.
    pub in_flight: usize,
    /// Renders that produced an artifact.
    pub completed: u64,
    /// Renders that returned an error.
    pub failed:    u64,
    /// Renders cut off by the deadline.
    pub timed_out: u64,
    /// Acquisitions that gave up waiting for a context.
    pub exhausted: u64,
}

/// Shared counters behind [`PoolStats`].
#[derive(Debug, Default)]
struct Counters {
    /// See [`PoolStats::in_flight`].
    in_flight: AtomicUsize,
    /// See [`PoolStats::completed`].
    completed: AtomicU64,
    /// See [`PoolStats::failed`].
    failed:    AtomicU64,
    /// See [`PoolStats::timed_out`].
    timed_out: AtomicU64,
    /// See [`PoolStats::exhausted`].
    exhausted: AtomicU64,
}

/// Decrements the in-flight counter when the render thread finishes.
struct InFlight(Arc<Counters>);

impl InFlight {
    /// Counts a render as started.
    fn enter(counters: &Arc<Counters>) -> Self {
        counters.in_flight.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counters))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Bounded set of render contexts.
///
/// A permit is held by the blocking render thread until the renderer
/// returns, so a context whose deadline passed is never handed to another
/// evaluation while its scripts may still be running. If the caller drops
/// the future instead, the render runs to completion and its result is
/// discarded.
#[derive(Clone)]
pub struct RenderPool {
    /// The backend every render goes through.
    renderer:        Arc<dyn Renderer>,
    /// One permit per context.
    permits:         Arc<Semaphore>,
    /// Number of contexts.
    capacity:        usize,
    /// Render resolution.
    viewport:        Viewport,
    /// Deadline for one render.
    render_timeout:  Duration,
    /// Deadline for getting a context.
    acquire_timeout: Duration,
    /// Activity counters.
    counters:        Arc<Counters>,
}

impl RenderPool {
    /// Creates a pool sized and timed from `config`.
    pub fn new(renderer: Arc<dyn Renderer>, config: &EngineConfig) -> Self {
        let capacity = config.pool_size.max(1);
        Self {
            renderer,
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
            viewport: config.viewport,
            render_timeout: config.render_timeout,
            acquire_timeout: config.acquire_timeout,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Name of the backend in use.
    pub fn backend(&self) -> &'static str {
        self.renderer.name()
    }

    /// Renders `bundle` in an isolated context.
    ///
    /// Fails with [`EngineError::PoolExhausted`] if no context frees up in
    /// time and with [`EngineError::RenderTimeout`] if the render outlives
    /// its deadline; in the latter case the context is torn down.
    pub async fn render(&self, bundle: CodeBundle) -> Result<RenderArtifact, EngineError> {
        let permit = match timeout(self.acquire_timeout, Arc::clone(&self.permits).acquire_owned())
            .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) | Err(_) => {
                self.counters.exhausted.fetch_add(1, Ordering::SeqCst);
                warn!(
                    capacity = self.capacity,
                    waited_ms = self.acquire_timeout.as_millis() as u64,
                    "no render context became available"
                );
                return Err(EngineError::PoolExhausted(self.acquire_timeout));
            }
        };

        let kill = KillSwitch::new();
        let (tx, rx) = oneshot::channel();

        let renderer = Arc::clone(&self.renderer);
        let viewport = self.viewport;
        let in_flight = InFlight::enter(&self.counters);
        let task_kill = kill.clone();
        tokio::task::spawn_blocking(move || {
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                renderer.render(&bundle, viewport, &task_kill)
            }))
            .unwrap_or_else(|_| Err(EngineError::RenderCrash("Renderer panicked".into())));
            drop(in_flight);
            drop(permit);
            let _ = tx.send(outcome);
        });

        let outcome = match timeout(self.render_timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(EngineError::RenderCrash(
                "Render thread exited without a result".into(),
            )),
            Err(_) => {
                debug!(backend = self.backend(), "render deadline passed, tearing down context");
                kill.fire();
                self.counters.timed_out.fetch_add(1, Ordering::SeqCst);
                return Err(EngineError::RenderTimeout(self.render_timeout));
            }
        };

        match &outcome {
            Ok(_) => self.counters.completed.fetch_add(1, Ordering::SeqCst),
            Err(_) => self.counters.failed.fetch_add(1, Ordering::SeqCst),
        };
        outcome
    }

    /// Current counters.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            capacity:  self.capacity,
            available: self.permits.available_permits(),
            in_flight: self.counters.in_flight.load(Ordering::SeqCst),
            completed: self.counters.completed.load(Ordering::SeqCst),
            failed:    self.counters.failed.load(Ordering::SeqCst),
            timed_out: self.counters.timed_out.load(Ordering::SeqCst),
            exhausted: self.counters.exhausted.load(Ordering::SeqCst),
        }
    }
}
