use crate::mailbox::{Mailbox, Message};
use crate::runtime::config::WorkerConfig;
use crate::runtime::fault::{FaultRecorder, SharedError};
use crate::runtime::telemetry::{Telemetry, TelemetrySnapshot};
use anyhow::Result;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// State shared by the owning [`Worker`](super::Worker), its thread, and every context
/// clone handed to producers.
pub(crate) struct WorkerShared {
    pub(crate) config: WorkerConfig,
    pub(crate) run: AtomicBool,
    pub(crate) loop_count: AtomicU64,
    pub(crate) mailbox: Mailbox,
    pub(crate) faults: FaultRecorder,
    pub(crate) telemetry: Telemetry,
}

/// Cloneable handle to a worker.
///
/// Step functions receive one on every invocation; producers on any thread use it to
/// post messages and request shutdown. Dropping contexts never stops the worker.
#[derive(Clone)]
pub struct WorkerContext {
    shared: Arc<WorkerShared>,
}

impl WorkerContext {
    pub(crate) fn new(config: WorkerConfig) -> Self {
        Self {
            shared: Arc::new(WorkerShared {
                config,
                run: AtomicBool::new(true),
                loop_count: AtomicU64::new(0),
                mailbox: Mailbox::new(),
                faults: FaultRecorder::new(),
                telemetry: Telemetry::default(),
            }),
        }
    }

    pub(crate) fn shared(&self) -> &WorkerShared {
        &self.shared
    }

    pub fn name(&self) -> &str {
        self.shared.config.name()
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.shared.config
    }

    /// Payload key used for dispatch by function name, if configured.
    pub fn dispatch_key(&self) -> Option<&str> {
        self.shared.config.dispatch_key()
    }

    /// `true` while the worker is in its normal phase; `false` once stopping, including
    /// during the final teardown invocation.
    pub fn want_run(&self) -> bool {
        self.shared.run.load(Ordering::SeqCst)
    }

    /// Asks the worker to leave its loop and wakes it if it is waiting. Returns
    /// immediately; the in-flight step (if any) is never interrupted.
    pub fn stop(&self) {
        if self.shared.run.swap(false, Ordering::SeqCst) {
            tracing::debug!(worker = self.name(), "worker stopping");
        }
        self.shared.mailbox.notify();
    }

    /// Number of completed step invocations, including the teardown call.
    pub fn loop_count(&self) -> u64 {
        self.shared.loop_count.load(Ordering::SeqCst)
    }

    /// Number of messages ever enqueued.
    pub fn msg_count(&self) -> u64 {
        self.shared.mailbox.msg_count()
    }

    /// Number of messages waiting in the mailbox.
    pub fn pending(&self) -> usize {
        self.shared.mailbox.len()
    }

    pub fn add_msg(&self, payload: impl Into<Value>) {
        self.post(Message::new(payload));
    }

    /// Enqueues `payload` with a callback that receives the outcome when the worker
    /// dispatches it.
    pub fn add_msg_with<F>(&self, payload: impl Into<Value>, callback: F)
    where
        F: FnOnce(&WorkerContext, Result<Value>) + Send + 'static,
    {
        self.post(Message::with_callback(payload, callback));
    }

    pub fn post(&self, message: Message) {
        let count = self.shared.mailbox.push(message);
        tracing::trace!(worker = self.name(), msg_count = count, "message enqueued");
    }

    /// Pops the oldest message, or `None` when the mailbox is empty.
    pub fn get_msg(&self) -> Option<Message> {
        self.shared.mailbox.pop()
    }

    /// Pops the oldest message and returns only its payload.
    pub fn get_msg_data(&self) -> Option<Value> {
        self.get_msg().map(Message::into_payload)
    }

    /// First normal-phase fault raised by the step function, if any.
    pub fn fault(&self) -> Option<SharedError> {
        self.shared.faults.error()
    }

    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.shared.telemetry.snapshot()
    }
}

impl fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerContext")
            .field("name", &self.name())
            .field("run", &self.want_run())
            .field("loop_count", &self.loop_count())
            .field("msg_count", &self.msg_count())
            .finish()
    }
}
