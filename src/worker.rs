//! Worker module split across focused submodules:
//! - `types`: step function contract, delays, and lifecycle errors
//! - `context`: cloneable handle shared by the step function and producers
//! - `process`: thread entry point and the step loop
//! - `lifecycle`: owning handle that starts, stops, and joins the thread
//! - `tests`: worker unit tests

mod context;
mod lifecycle;
mod process;
mod types;

#[cfg(test)]
mod tests;

pub use context::WorkerContext;
pub use lifecycle::Worker;
pub use types::{with_args, StepDelay, StepFn, StepFuture, WithArgs, WorkerError};
