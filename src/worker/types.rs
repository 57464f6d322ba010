use super::context::WorkerContext;
use anyhow::Result;
use futures::future::LocalBoxFuture;
use std::fmt;
use std::future::Future;
use std::time::Duration;

/// Future returned by a step function. It runs on the worker thread only, so it does not
/// need to be `Send`.
pub type StepFuture<'a> = LocalBoxFuture<'a, Result<StepDelay>>;

/// What a step function asks the loop to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepDelay {
    /// Leave the loop; only the teardown call remains.
    Exit,
    /// Call the step function again right away.
    Immediate,
    /// Wait up to the given duration, or less if a message or stop arrives.
    After(Duration),
    /// Wait until a message or stop arrives.
    Idle,
}

impl StepDelay {
    /// Maps a delay in seconds: negative exits, zero loops immediately, positive waits.
    /// Values that are not representable as a [`Duration`] wait until notified.
    pub fn from_secs_f64(secs: f64) -> Self {
        if secs < 0.0 {
            StepDelay::Exit
        } else if secs == 0.0 {
            StepDelay::Immediate
        } else {
            Duration::try_from_secs_f64(secs)
                .map(StepDelay::After)
                .unwrap_or(StepDelay::Idle)
        }
    }
}

impl From<Duration> for StepDelay {
    fn from(delay: Duration) -> Self {
        if delay.is_zero() {
            StepDelay::Immediate
        } else {
            StepDelay::After(delay)
        }
    }
}

impl From<Option<Duration>> for StepDelay {
    fn from(delay: Option<Duration>) -> Self {
        delay.map(StepDelay::from).unwrap_or(StepDelay::Idle)
    }
}

/// User-supplied body of a worker, invoked repeatedly on the worker thread.
///
/// State the step needs across invocations lives in the implementor. Closures of the
/// form `FnMut(WorkerContext) -> impl Future<Output = Result<StepDelay>>` implement this
/// trait directly; see [`with_args`] for closures that take fixed extra arguments.
pub trait StepFn: Send + 'static {
    fn step(&mut self, ctx: WorkerContext) -> StepFuture<'_>;
}

impl<F, Fut> StepFn for F
where
    F: FnMut(WorkerContext) -> Fut + Send + 'static,
    Fut: Future<Output = Result<StepDelay>> + 'static,
{
    fn step(&mut self, ctx: WorkerContext) -> StepFuture<'_> {
        Box::pin((self)(ctx))
    }
}

/// Step function that receives a clone of `args` on every invocation.
pub struct WithArgs<A, F> {
    args: A,
    f: F,
}

pub fn with_args<A, F, Fut>(args: A, f: F) -> WithArgs<A, F>
where
    A: Clone + Send + 'static,
    F: FnMut(WorkerContext, A) -> Fut + Send + 'static,
    Fut: Future<Output = Result<StepDelay>> + 'static,
{
    WithArgs { args, f }
}

impl<A, F, Fut> StepFn for WithArgs<A, F>
where
    A: Clone + Send + 'static,
    F: FnMut(WorkerContext, A) -> Fut + Send + 'static,
    Fut: Future<Output = Result<StepDelay>> + 'static,
{
    fn step(&mut self, ctx: WorkerContext) -> StepFuture<'_> {
        let args = self.args.clone();
        Box::pin((self.f)(ctx, args))
    }
}

#[derive(Debug)]
pub enum WorkerError {
    /// `start` was called on a worker whose thread was already launched.
    AlreadyStarted { name: String },
    /// Dispatch by name was requested but no dispatch key is configured.
    MissingDispatchKey,
    /// The OS refused to spawn the worker thread.
    Spawn {
        name: String,
        source: std::io::Error,
    },
}

impl fmt::Display for WorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerError::AlreadyStarted { name } => {
                write!(f, "worker {name} has already been started")
            }
            WorkerError::MissingDispatchKey => {
                write!(f, "call by function name requires a configured dispatch key")
            }
            WorkerError::Spawn { name, source } => {
                write!(f, "failed to spawn worker thread {name}: {source}")
            }
        }
    }
}

impl std::error::Error for WorkerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WorkerError::Spawn { source, .. } => Some(source),
            _ => None,
        }
    }
}
