//! Single-assignment reply cells for request/reply over a worker mailbox.
//!
//! A [`ReplyFuture`] is held by the requesting side; its [`ReplyResolver`] travels with
//! the message and settles it on the worker thread. The first resolution wins and later
//! ones are ignored (reported through the `bool` returned by the setters).

use crate::mailbox::Callback;
use crate::runtime::fault::SharedError;
use crate::runtime::scheduler::{self, WakeChannel, WakeEvent};
use crate::worker::WorkerContext;
use anyhow::Result;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
enum ReplyState {
    Pending,
    Resolved(Value),
    Rejected(SharedError),
}

struct ReplyShared {
    state: Mutex<ReplyState>,
    wake: Option<WakeChannel>,
    /// Live [`ReplyResolver`] handles. Zero while pending means nothing can settle it.
    resolvers: AtomicUsize,
}

impl ReplyShared {
    fn state(&self) -> MutexGuard<'_, ReplyState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn settle(&self, next: ReplyState) -> bool {
        {
            let mut state = self.state();
            if !matches!(*state, ReplyState::Pending) {
                tracing::debug!(ignored = ?next, "reply already settled; ignoring late resolution");
                return false;
            }
            *state = next;
        }

        self.wake();
        true
    }

    fn is_settled(&self) -> bool {
        !matches!(*self.state(), ReplyState::Pending)
    }

    fn is_abandoned(&self) -> bool {
        self.resolvers.load(Ordering::SeqCst) == 0
    }

    fn wake(&self) {
        if let Some(wake) = &self.wake {
            wake.wake();
        }
    }
}

#[derive(Debug)]
pub enum ReplyError {
    /// The reply was created outside a scheduler, so there is nothing to suspend on.
    Unbound,
}

impl fmt::Display for ReplyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplyError::Unbound => {
                write!(f, "reply future is not bound to a scheduler; poll it with is_data/is_error")
            }
        }
    }
}

impl std::error::Error for ReplyError {}

/// Requesting side of a reply.
pub struct ReplyFuture {
    shared: Arc<ReplyShared>,
    event: Option<WakeEvent>,
}

impl ReplyFuture {
    /// Creates a reply whose [`wait`](Self::wait) suspends the calling task. Must be
    /// awaited from within a tokio runtime.
    pub fn bound() -> Self {
        let (wake, event) = scheduler::wake_pair();
        Self {
            shared: Arc::new(ReplyShared {
                state: Mutex::new(ReplyState::Pending),
                wake: Some(wake),
                resolvers: AtomicUsize::new(0),
            }),
            event: Some(event),
        }
    }

    /// Creates a reply that can only be polled.
    pub fn unbound() -> Self {
        Self {
            shared: Arc::new(ReplyShared {
                state: Mutex::new(ReplyState::Pending),
                wake: None,
                resolvers: AtomicUsize::new(0),
            }),
            event: None,
        }
    }

    /// Binds to the caller's scheduler when there is one.
    pub fn for_current_scheduler() -> Self {
        if scheduler::in_scheduler_context() {
            Self::bound()
        } else {
            Self::unbound()
        }
    }

    pub fn is_bound(&self) -> bool {
        self.event.is_some()
    }

    /// Handle that settles this reply from any thread.
    pub fn resolver(&self) -> ReplyResolver {
        ReplyResolver::attach(self.shared.clone())
    }

    pub fn set_data(&self, data: impl Into<Value>) -> bool {
        self.shared.settle(ReplyState::Resolved(data.into()))
    }

    pub fn set_error(&self, error: impl Into<anyhow::Error>) -> bool {
        self.shared
            .settle(ReplyState::Rejected(SharedError::new(error.into())))
    }

    pub fn is_data(&self) -> bool {
        matches!(*self.shared.state(), ReplyState::Resolved(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(*self.shared.state(), ReplyState::Rejected(_))
    }

    pub fn is_settled(&self) -> bool {
        self.shared.is_settled()
    }

    /// Resolved value, or `None` while pending or when rejected.
    pub fn data(&self) -> Option<Value> {
        match &*self.shared.state() {
            ReplyState::Resolved(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// Rejection error, or `None` while pending or when resolved.
    pub fn error(&self) -> Option<SharedError> {
        match &*self.shared.state() {
            ReplyState::Rejected(error) => Some(error.clone()),
            _ => None,
        }
    }

    /// Suspends until the reply settles or `limit` elapses; returns whether it settled.
    ///
    /// A timeout is not an error: the reply simply stays pending. Returns `Ok(false)`
    /// early once every resolver has been dropped without settling.
    pub async fn wait(&mut self, limit: Duration) -> Result<bool, ReplyError> {
        let Some(event) = self.event.as_mut() else {
            return Err(ReplyError::Unbound);
        };
        let deadline = Instant::now().checked_add(limit);

        loop {
            if self.shared.is_settled() {
                return Ok(true);
            }
            if self.shared.is_abandoned() {
                return Ok(false);
            }

            let remaining = deadline.map(|deadline| deadline.saturating_duration_since(Instant::now()));
            if remaining.is_some_and(|remaining| remaining.is_zero()) {
                return Ok(false);
            }

            if !event.wait(remaining).await {
                return Ok(self.shared.is_settled());
            }
        }
    }
}

impl fmt::Debug for ReplyFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplyFuture")
            .field("state", &*self.shared.state())
            .field("bound", &self.is_bound())
            .finish()
    }
}

/// Settling side of a reply; cheap to clone and `Send`.
///
/// Dropping the last resolver of a pending reply wakes its waiter.
pub struct ReplyResolver {
    shared: Arc<ReplyShared>,
}

impl ReplyResolver {
    fn attach(shared: Arc<ReplyShared>) -> Self {
        shared.resolvers.fetch_add(1, Ordering::SeqCst);
        Self { shared }
    }

    pub fn set_data(&self, data: impl Into<Value>) -> bool {
        self.shared.settle(ReplyState::Resolved(data.into()))
    }

    pub fn set_error(&self, error: impl Into<anyhow::Error>) -> bool {
        self.shared
            .settle(ReplyState::Rejected(SharedError::new(error.into())))
    }

    /// Settles from a handler outcome.
    pub fn resolve(&self, outcome: Result<Value>) -> bool {
        match outcome {
            Ok(value) => self.set_data(value),
            Err(error) => self.set_error(error),
        }
    }

    /// Mailbox callback that settles this reply with the dispatch outcome.
    pub fn into_callback(self) -> Callback {
        Box::new(move |_ctx: &WorkerContext, outcome: Result<Value>| {
            self.resolve(outcome);
        })
    }
}

impl Clone for ReplyResolver {
    fn clone(&self) -> Self {
        Self::attach(self.shared.clone())
    }
}

impl Drop for ReplyResolver {
    fn drop(&mut self) {
        if self.shared.resolvers.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.shared.wake();
        }
    }
}

impl fmt::Debug for ReplyResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplyResolver")
            .field("settled", &self.shared.is_settled())
            .finish()
    }
}
