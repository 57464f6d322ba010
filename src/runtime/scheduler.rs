//! Cooperative scheduler bridge.
//!
//! Every cooperative worker thread owns a current-thread tokio runtime plus a
//! [`LocalSet`], so step functions may `spawn_local` and hold non-`Send` state. Code
//! running on other threads never touches that scheduler directly: it pushes wake
//! requests into a [`WakeChannel`], and the task suspended on the matching
//! [`WakeEvent`] drains them on its own thread when it resumes.

use anyhow::{Context, Result};
use std::future::Future;
use std::time::Duration;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::mpsc;
use tokio::task::LocalSet;
use tokio::time::timeout;

/// Single-threaded runtime private to one worker thread.
pub struct LocalScheduler {
    runtime: Runtime,
    local: LocalSet,
}

impl LocalScheduler {
    pub fn new() -> Result<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .context("failed to build worker scheduler")?;
        Ok(Self {
            runtime,
            local: LocalSet::new(),
        })
    }

    /// Drives `future` to completion on the calling thread.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.local.block_on(&self.runtime, future)
    }

    /// Drops any local tasks still pending and shuts the runtime down, waiting at most
    /// `grace` for blocking tasks.
    pub fn shutdown(self, grace: Duration) {
        let Self { runtime, local } = self;
        drop(local);
        runtime.shutdown_timeout(grace);
    }
}

/// Returns `true` when the caller runs inside a tokio scheduler, i.e. when a reply
/// future created here can later be awaited.
pub fn in_scheduler_context() -> bool {
    Handle::try_current().is_ok()
}

/// Creates a connected wake channel and event.
pub fn wake_pair() -> (WakeChannel, WakeEvent) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        WakeChannel { tx: tx.clone() },
        WakeEvent {
            rx,
            _keepalive: tx,
        },
    )
}

/// Thread-safe sending half used to resume a suspended task.
#[derive(Debug, Clone)]
pub struct WakeChannel {
    tx: mpsc::UnboundedSender<()>,
}

impl WakeChannel {
    /// Queues a wake request. Never blocks; a request with nobody waiting stays buffered
    /// until the next wait drains it.
    pub fn wake(&self) {
        let _ = self.tx.send(());
    }
}

/// Scheduler-side half of a wake pair. Owned by the single task that suspends on it.
#[derive(Debug)]
pub struct WakeEvent {
    rx: mpsc::UnboundedReceiver<()>,
    // Keeps the channel open so `recv` only returns on a real wake request.
    _keepalive: mpsc::UnboundedSender<()>,
}

impl WakeEvent {
    /// Suspends the current task until a wake request arrives or `limit` elapses.
    ///
    /// Returns `true` when woken. Any further requests queued by then are drained, so a
    /// burst of wakes is observed once.
    pub async fn wait(&mut self, limit: Option<Duration>) -> bool {
        let woken = match limit {
            Some(limit) => timeout(limit, self.rx.recv()).await.is_ok(),
            None => self.rx.recv().await.is_some(),
        };
        self.drain();
        woken
    }

    /// Discards queued wake requests, returning how many were pending.
    pub fn drain(&mut self) -> usize {
        let mut drained = 0;
        while self.rx.try_recv().is_ok() {
            drained += 1;
        }
        drained
    }
}
