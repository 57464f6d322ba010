use super::args::{take_by_kind, ArgKind, CallArg};
use super::error::DispatchError;
use super::table::{BoundArgs, FunctionTable, Handler};
use super::Params;
use crate::mailbox::{Callback, Message};
use crate::reply::ReplyFuture;
use crate::runtime::scheduler;
use crate::worker::{Worker, WorkerContext, WorkerError};
use anyhow::Result;
use serde_json::Value;

/// Label used in errors for handlers passed directly rather than looked up by name.
const DIRECT_HANDLER: &str = "<handler>";

/// Which handler a mapped call should run.
#[derive(Debug, Clone, Default)]
pub enum Target {
    /// Look the name up under the worker's configured dispatch key.
    #[default]
    Default,
    /// Look the name up under this payload key.
    Key(String),
    /// Run this handler without a table lookup.
    Handler(Handler),
}

impl From<&str> for Target {
    fn from(key: &str) -> Self {
        Target::Key(key.to_owned())
    }
}

impl From<String> for Target {
    fn from(key: String) -> Self {
        Target::Key(key)
    }
}

impl From<Handler> for Target {
    fn from(handler: Handler) -> Self {
        Target::Handler(handler)
    }
}

impl WorkerContext {
    /// Posts a function call to the worker.
    ///
    /// `args` may hold at most one name, one parameter map and one callback, in any
    /// order. `kwargs` are merged over the parameter map. Without a callback, a call
    /// made from inside a tokio runtime returns a [`ReplyFuture`] that the worker
    /// settles with the handler outcome.
    pub fn call(
        &self,
        mut args: Vec<CallArg>,
        kwargs: Params,
    ) -> Result<Option<ReplyFuture>, WorkerError> {
        let callback = take_by_kind(&mut args, ArgKind::Callback).and_then(CallArg::into_callback);
        let name = take_by_kind(&mut args, ArgKind::Name).and_then(CallArg::into_name);
        let mut params = take_by_kind(&mut args, ArgKind::Params)
            .and_then(CallArg::into_params)
            .unwrap_or_default();
        if !args.is_empty() {
            tracing::debug!(worker = self.name(), ignored = ?args, "extra call arguments ignored");
        }
        params.extend(kwargs);

        if let Some(name) = name {
            let key = self.dispatch_key().ok_or(WorkerError::MissingDispatchKey)?;
            params.insert(key.to_owned(), Value::String(name));
        }

        let (callback, reply) = match callback {
            Some(callback) => (Some(callback), None),
            None if scheduler::in_scheduler_context() => {
                let reply = ReplyFuture::bound();
                (Some(reply.resolver().into_callback()), Some(reply))
            }
            None => (None, None),
        };

        self.post(Message::from_parts(Value::Object(params), callback));
        Ok(reply)
    }

    fn resolve<'t>(
        &self,
        target: &'t Target,
        table: &'t FunctionTable,
        params: &Params,
    ) -> Result<(String, &'t Handler), DispatchError> {
        let key = match target {
            Target::Handler(handler) => return Ok((DIRECT_HANDLER.to_owned(), handler)),
            Target::Key(key) => key.as_str(),
            Target::Default => self.dispatch_key().ok_or(DispatchError::MissingTarget)?,
        };

        let name = match params.get(key) {
            Some(Value::String(name)) => name,
            Some(_) => return Err(DispatchError::InvalidName { key: key.to_owned() }),
            None => return Err(DispatchError::MissingKey { key: key.to_owned() }),
        };
        let handler = table
            .get(name)
            .ok_or_else(|| DispatchError::UnknownFunction { name: name.clone() })?;
        Ok((name.clone(), handler))
    }

    fn bind<'t>(
        &self,
        target: &'t Target,
        table: &'t FunctionTable,
        params: &Params,
    ) -> Result<(&'t Handler, BoundArgs), DispatchError> {
        let (function, handler) = self.resolve(target, table, params)?;
        let args = handler.bind(&function, params)?;
        Ok((handler, args))
    }

    /// Runs the handler selected by `target` with `params`. Async handlers are refused;
    /// use [`map_call_async`](Self::map_call_async) for those.
    pub fn map_call(&self, target: &Target, table: &FunctionTable, params: &Params) -> Result<Value> {
        let (handler, args) = self.bind(target, table, params)?;
        handler.invoke_sync(args)
    }

    pub async fn map_call_async(
        &self,
        target: &Target,
        table: &FunctionTable,
        params: &Params,
    ) -> Result<Value> {
        let (handler, args) = self.bind(target, table, params)?;
        handler.invoke(args).await
    }

    /// Dispatches a message payload and delivers the outcome to its callback.
    ///
    /// With a callback, failures are handed to it and `Ok(None)` is returned. Without
    /// one, the handler's value is returned and failures propagate to the caller.
    pub fn map_msg(
        &self,
        target: &Target,
        table: &FunctionTable,
        mut message: Message,
    ) -> Result<Option<Value>> {
        let callback = message.take_callback();
        let outcome = match message.into_payload() {
            Value::Object(params) => self.map_call(target, table, &params),
            _ => Err(DispatchError::PayloadNotMap.into()),
        };
        self.deliver(outcome, callback)
    }

    pub async fn map_msg_async(
        &self,
        target: &Target,
        table: &FunctionTable,
        mut message: Message,
    ) -> Result<Option<Value>> {
        let callback = message.take_callback();
        let outcome = match message.into_payload() {
            Value::Object(params) => self.map_call_async(target, table, &params).await,
            _ => Err(DispatchError::PayloadNotMap.into()),
        };
        self.deliver(outcome, callback)
    }

    fn deliver(&self, outcome: Result<Value>, callback: Option<Callback>) -> Result<Option<Value>> {
        let telemetry = &self.shared().telemetry;
        telemetry.record_dispatch(outcome.is_ok());

        let Some(callback) = callback else {
            return outcome.map(Some);
        };
        if let Err(err) = &outcome {
            tracing::warn!(worker = self.name(), error = %err, "dispatch failed; passing error to callback");
        }
        telemetry.record_callback();
        callback(self, outcome);
        Ok(None)
    }
}

impl Worker {
    /// See [`WorkerContext::call`].
    pub fn call(
        &self,
        args: Vec<CallArg>,
        kwargs: Params,
    ) -> Result<Option<ReplyFuture>, WorkerError> {
        self.context().call(args, kwargs)
    }
}
