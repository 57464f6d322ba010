//! Name-based dispatch of mailbox payloads to registered handlers.
//!
//! Payloads are JSON objects. One reserved key (the worker's configured dispatch key)
//! names the handler; the remaining keys are bound to the handler's declared parameter
//! names.

mod args;
mod error;
mod mapper;
mod table;

pub use args::{find_by_kind, ArgKind, CallArg};
pub use error::DispatchError;
pub use mapper::Target;
pub use table::{BoundArgs, FunctionTable, Handler, HandlerFuture};

/// Named parameters carried by a dispatched payload.
pub type Params = serde_json::Map<String, serde_json::Value>;
