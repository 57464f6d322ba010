//! Thread-safe FIFO mailbox and the wait/notify primitive the step loop parks on.
//!
//! - `message`: payload + optional reply callback
//! - `queue`: lock-guarded FIFO with enqueue/observe counters
//! - `signal`: missed-wakeup-free interruptible waits (condvar or wake event)

mod message;
mod queue;
mod signal;

pub use message::{Callback, Message};
pub(crate) use queue::Mailbox;
