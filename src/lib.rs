pub mod dispatch;
pub mod mailbox;
pub mod reply;
pub mod runtime;
pub mod worker;

pub use dispatch::{
    find_by_kind, ArgKind, BoundArgs, CallArg, DispatchError, FunctionTable, Handler,
    HandlerFuture, Params, Target,
};
pub use mailbox::{Callback, Message};
pub use reply::{ReplyError, ReplyFuture, ReplyResolver};
pub use runtime::config::{ExecutionMode, WorkerConfig, WorkerConfigBuilder, WorkerConfigParams};
pub use runtime::fault::{SharedError, StepFault, StepPhase};
pub use runtime::scheduler::in_scheduler_context;
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
pub use worker::{with_args, StepDelay, StepFn, StepFuture, WithArgs, Worker, WorkerContext, WorkerError};
