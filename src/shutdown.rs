//! Graceful shutdown coordination for the relay.
//!
//! A pipeline registers itself before its loop starts and holds a
//! [`CycleGuard`] for each poll cycle. Shutdown cancels the token so no new
//! cycle is scheduled, then waits until every cycle has finished and every
//! registered pipeline has published its final snapshot and exited. An
//! engine call already in flight is allowed to finish.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

/// Shutdown state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    Draining,
    Stopped,
}

/// Result of a shutdown operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownResult {
    Complete,
    Timeout {
        cycles_in_flight: u32,
        pipelines_running: u32,
    },
}

#[derive(Default)]
struct Counters {
    cycles: AtomicU32,
    pipelines: AtomicU32,
}

impl Counters {
    fn is_drained(&self) -> bool {
        self.cycles.load(Ordering::SeqCst) == 0 && self.pipelines.load(Ordering::SeqCst) == 0
    }
}

/// Coordinates graceful shutdown between the signal handler and pipelines.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    state: Arc<RwLock<ShutdownState>>,
    counters: Arc<Counters>,
    notify: Arc<Notify>,
    token: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(ShutdownState::Running)),
            counters: Arc::new(Counters::default()),
            notify: Arc::new(Notify::new()),
            token: CancellationToken::new(),
        }
    }

    /// Token cancelled when shutdown begins.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Get current shutdown state.
    pub async fn state(&self) -> ShutdownState {
        *self.state.read().await
    }

    /// Check if new poll cycles may start.
    pub fn is_accepting(&self) -> bool {
        !self.token.is_cancelled()
            && self
                .state
                .try_read()
                .map(|s| *s == ShutdownState::Running)
                .unwrap_or(false)
    }

    /// Register a pipeline loop. Shutdown waits until the returned guard
    /// is dropped, even after the token has been cancelled.
    pub fn register_pipeline(&self) -> PipelineRegistration {
        self.counters.pipelines.fetch_add(1, Ordering::SeqCst);
        PipelineRegistration {
            counters: self.counters.clone(),
            notify: self.notify.clone(),
        }
    }

    /// Start a poll cycle. Returns None once shutdown has begun.
    pub fn begin_cycle(&self) -> Option<CycleGuard> {
        if !self.is_accepting() {
            return None;
        }
        self.counters.cycles.fetch_add(1, Ordering::SeqCst);
        Some(CycleGuard {
            counters: self.counters.clone(),
            notify: self.notify.clone(),
        })
    }

    pub fn cycles_in_flight(&self) -> u32 {
        self.counters.cycles.load(Ordering::SeqCst)
    }

    pub fn pipelines_running(&self) -> u32 {
        self.counters.pipelines.load(Ordering::SeqCst)
    }

    /// Cancel the token, stop new cycles, and wait for pipelines to exit.
    pub async fn initiate(&self, timeout: Duration) -> ShutdownResult {
        {
            let mut state = self.state.write().await;
            *state = ShutdownState::Draining;
        }
        self.token.cancel();

        let result = self.wait_for_drain(timeout).await;

        {
            let mut state = self.state.write().await;
            *state = ShutdownState::Stopped;
        }

        result
    }

    /// Initiate shutdown and collect the output of the task running the
    /// pipeline. A task still running when the drain times out is aborted
    /// and yields None, which also kills any engine child it owns.
    pub async fn stop_task<T>(
        &self,
        task: JoinHandle<T>,
        timeout: Duration,
    ) -> (ShutdownResult, Option<T>) {
        let result = self.initiate(timeout).await;
        if result != ShutdownResult::Complete {
            task.abort();
        }
        let output = match task.await {
            Ok(output) => Some(output),
            Err(e) if e.is_cancelled() => {
                warn!("pipeline task aborted mid-cycle");
                None
            }
            Err(e) => {
                error!(error = %e, "pipeline task failed");
                None
            }
        };
        (result, output)
    }

    async fn wait_for_drain(&self, timeout: Duration) -> ShutdownResult {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            // Register interest before checking so a guard dropped in
            // between still wakes us.
            let notified = self.notify.notified();
            if self.counters.is_drained() {
                return ShutdownResult::Complete;
            }

            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep_until(deadline) => {
                    if self.counters.is_drained() {
                        return ShutdownResult::Complete;
                    }
                    return ShutdownResult::Timeout {
                        cycles_in_flight: self.cycles_in_flight(),
                        pipelines_running: self.pipelines_running(),
                    };
                }
            }
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for one in-flight poll cycle.
pub struct CycleGuard {
    counters: Arc<Counters>,
    notify: Arc<Notify>,
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        self.counters.cycles.fetch_sub(1, Ordering::SeqCst);
        self.notify.notify_waiters();
    }
}

/// Held by a pipeline for the lifetime of its loop.
pub struct PipelineRegistration {
    counters: Arc<Counters>,
    notify: Arc<Notify>,
}

impl Drop for PipelineRegistration {
    fn drop(&mut self) {
        self.counters.pipelines.fetch_sub(1, Ordering::SeqCst);
        self.notify.notify_waiters();
    }
}
