//! Lifecycle orchestration for a worker thread: start, stop, join, and the implicit
//! join performed when the owner is dropped.

use super::context::WorkerContext;
use super::process;
use super::types::{StepFn, WorkerError};
use crate::mailbox::Message;
use crate::runtime::config::{ExecutionMode, WorkerConfig};
use crate::runtime::fault::SharedError;
use crate::runtime::scheduler::wake_pair;
use anyhow::Result;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};

enum ThreadSlot {
    /// Constructed but not started; holds the step function until the thread exists.
    Idle(Box<dyn StepFn>),
    Running(JoinHandle<()>),
    /// Handle taken by a joiner; the thread may still be running.
    Joining(ThreadId),
    Finished,
}

/// Owner of a dedicated worker thread.
///
/// Exactly one OS thread runs per worker. Dropping the owner stops the worker and joins
/// its thread, so the teardown invocation has always completed once the drop returns.
pub struct Worker {
    ctx: WorkerContext,
    thread: Mutex<ThreadSlot>,
    /// Serializes joiners so every `join` returns only after the thread has exited.
    join_gate: Mutex<()>,
}

impl Worker {
    /// Creates a worker and, when `config.auto_start()` is set, launches its thread.
    pub fn new(config: WorkerConfig, step: impl StepFn) -> Result<Self> {
        let auto_start = config.auto_start();
        let worker = Self {
            ctx: WorkerContext::new(config),
            thread: Mutex::new(ThreadSlot::Idle(Box::new(step))),
            join_gate: Mutex::new(()),
        };

        if auto_start {
            worker.start()?;
        }
        Ok(worker)
    }

    /// Creates and starts a worker with the default configuration.
    pub fn spawn(step: impl StepFn) -> Result<Self> {
        Self::new(WorkerConfig::default(), step)
    }

    fn slot(&self) -> MutexGuard<'_, ThreadSlot> {
        self.thread.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Launches the worker thread. Valid once per worker.
    pub fn start(&self) -> Result<(), WorkerError> {
        let mut slot = self.slot();
        let step = match std::mem::replace(&mut *slot, ThreadSlot::Finished) {
            ThreadSlot::Idle(step) => step,
            other => {
                *slot = other;
                return Err(WorkerError::AlreadyStarted {
                    name: self.name().to_owned(),
                });
            }
        };

        let shared = self.ctx.shared();
        shared.run.store(true, Ordering::SeqCst);
        let event = match shared.config.mode() {
            ExecutionMode::Cooperative => {
                let (wake, event) = wake_pair();
                shared.mailbox.attach_wake(wake);
                Some(event)
            }
            ExecutionMode::Blocking => None,
        };

        let ctx = self.ctx.clone();
        let spawned = thread::Builder::new()
            .name(self.name().to_owned())
            .spawn(move || process::thread_main(ctx, step, event));

        match spawned {
            Ok(handle) => {
                *slot = ThreadSlot::Running(handle);
                Ok(())
            }
            Err(source) => {
                shared.run.store(false, Ordering::SeqCst);
                shared.mailbox.detach_wake();
                Err(WorkerError::Spawn {
                    name: self.name().to_owned(),
                    source,
                })
            }
        }
    }

    /// Asks the worker to stop; see [`WorkerContext::stop`].
    pub fn stop(&self) {
        self.ctx.stop();
    }

    /// Waits for the worker thread to terminate, stopping it first when `also_stop` is
    /// set.
    ///
    /// Safe to call repeatedly and on a worker that never started. Calling it from the
    /// worker's own thread logs a warning and returns instead of deadlocking.
    pub fn join(&self, also_stop: bool) {
        if also_stop {
            self.stop();
        }

        let current = thread::current().id();
        let worker_thread = match &*self.slot() {
            ThreadSlot::Running(handle) => Some(handle.thread().id()),
            ThreadSlot::Joining(id) => Some(*id),
            ThreadSlot::Idle(_) | ThreadSlot::Finished => return,
        };
        if worker_thread == Some(current) {
            tracing::warn!(worker = self.name(), "join called from the worker thread; ignoring");
            return;
        }

        let _gate = self.join_gate.lock().unwrap_or_else(PoisonError::into_inner);
        let handle = {
            let mut slot = self.slot();
            match std::mem::replace(&mut *slot, ThreadSlot::Finished) {
                ThreadSlot::Running(handle) => {
                    *slot = ThreadSlot::Joining(handle.thread().id());
                    handle
                }
                other => {
                    *slot = other;
                    return;
                }
            }
        };

        if handle.join().is_err() {
            tracing::warn!(worker = self.name(), "worker thread panicked outside the step loop");
        }
        *self.slot() = ThreadSlot::Finished;
    }

    pub fn is_started(&self) -> bool {
        !matches!(&*self.slot(), ThreadSlot::Idle(_))
    }

    /// Returns `true` once the thread has been joined or has exited on its own.
    pub fn is_finished(&self) -> bool {
        match &*self.slot() {
            ThreadSlot::Idle(_) => false,
            ThreadSlot::Running(handle) => handle.is_finished(),
            ThreadSlot::Joining(_) => false,
            ThreadSlot::Finished => true,
        }
    }

    /// Cloneable handle for producers and other threads.
    pub fn context(&self) -> WorkerContext {
        self.ctx.clone()
    }

    pub fn name(&self) -> &str {
        self.ctx.name()
    }

    pub fn want_run(&self) -> bool {
        self.ctx.want_run()
    }

    pub fn loop_count(&self) -> u64 {
        self.ctx.loop_count()
    }

    pub fn msg_count(&self) -> u64 {
        self.ctx.msg_count()
    }

    pub fn pending(&self) -> usize {
        self.ctx.pending()
    }

    pub fn add_msg(&self, payload: impl Into<Value>) {
        self.ctx.add_msg(payload);
    }

    pub fn add_msg_with<F>(&self, payload: impl Into<Value>, callback: F)
    where
        F: FnOnce(&WorkerContext, Result<Value>) + Send + 'static,
    {
        self.ctx.add_msg_with(payload, callback);
    }

    pub fn post(&self, message: Message) {
        self.ctx.post(message);
    }

    pub fn fault(&self) -> Option<SharedError> {
        self.ctx.fault()
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.join(true);
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("context", &self.ctx)
            .field("started", &self.is_started())
            .finish()
    }
}
