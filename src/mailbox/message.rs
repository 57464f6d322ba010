use crate::worker::WorkerContext;
use anyhow::Result;
use serde_json::Value;
use std::fmt;

/// Reply hook carried by a message; receives the handler outcome on the worker thread.
pub type Callback = Box<dyn FnOnce(&WorkerContext, Result<Value>) + Send + 'static>;

/// Unit of work stored in a worker's mailbox.
pub struct Message {
    payload: Value,
    callback: Option<Callback>,
}

impl Message {
    pub fn new(payload: impl Into<Value>) -> Self {
        Self {
            payload: payload.into(),
            callback: None,
        }
    }

    pub fn with_callback<F>(payload: impl Into<Value>, callback: F) -> Self
    where
        F: FnOnce(&WorkerContext, Result<Value>) + Send + 'static,
    {
        Self {
            payload: payload.into(),
            callback: Some(Box::new(callback)),
        }
    }

    pub(crate) fn from_parts(payload: Value, callback: Option<Callback>) -> Self {
        Self { payload, callback }
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn into_payload(self) -> Value {
        self.payload
    }

    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }

    pub fn take_callback(&mut self) -> Option<Callback> {
        self.callback.take()
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("payload", &self.payload)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}
