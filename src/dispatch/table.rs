use super::error::DispatchError;
use super::Params;
use anyhow::Result;
use futures::future::LocalBoxFuture;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Future produced by an async handler; polled on the worker thread.
pub type HandlerFuture = LocalBoxFuture<'static, Result<Value>>;

type SyncCall = Arc<dyn Fn(BoundArgs) -> Result<Value> + Send + Sync>;
type AsyncCall = Arc<dyn Fn(BoundArgs) -> HandlerFuture + Send + Sync>;

#[derive(Clone)]
enum HandlerCall {
    Sync(SyncCall),
    Async(AsyncCall),
}

/// A callable with an explicit list of parameter names.
#[derive(Clone)]
pub struct Handler {
    params: Arc<[String]>,
    call: HandlerCall,
}

impl Handler {
    pub fn new<I, S, F>(params: I, f: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(BoundArgs) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            params: params.into_iter().map(Into::into).collect(),
            call: HandlerCall::Sync(Arc::new(f)),
        }
    }

    pub fn new_async<I, S, F, Fut>(params: I, f: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(BoundArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + 'static,
    {
        Self {
            params: params.into_iter().map(Into::into).collect(),
            call: HandlerCall::Async(Arc::new(move |args| Box::pin(f(args)))),
        }
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn is_async(&self) -> bool {
        matches!(self.call, HandlerCall::Async(_))
    }

    /// Picks the declared parameters out of `params`; extra entries are ignored.
    pub fn bind(&self, function: &str, params: &Params) -> Result<BoundArgs, DispatchError> {
        let mut bound = Params::new();
        for name in self.params.iter() {
            let value = params
                .get(name)
                .ok_or_else(|| DispatchError::MissingParameter {
                    function: function.to_owned(),
                    parameter: name.clone(),
                })?;
            bound.insert(name.clone(), value.clone());
        }
        Ok(BoundArgs {
            function: function.to_owned(),
            values: bound,
        })
    }

    pub(crate) fn invoke_sync(&self, args: BoundArgs) -> Result<Value> {
        match &self.call {
            HandlerCall::Sync(call) => call(args),
            HandlerCall::Async(_) => Err(DispatchError::RequiresAsync {
                function: args.function,
            }
            .into()),
        }
    }

    pub(crate) async fn invoke(&self, args: BoundArgs) -> Result<Value> {
        match &self.call {
            HandlerCall::Sync(call) => call(args),
            HandlerCall::Async(call) => call(args).await,
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("params", &self.params)
            .field("async", &self.is_async())
            .finish()
    }
}

/// Arguments bound to a handler's declared parameter names.
#[derive(Debug, Clone)]
pub struct BoundArgs {
    function: String,
    values: Params,
}

impl BoundArgs {
    pub fn function(&self) -> &str {
        &self.function
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Deserializes the named argument.
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let value = self.values.get(name).ok_or_else(|| DispatchError::MissingParameter {
            function: self.function.clone(),
            parameter: name.to_owned(),
        })?;
        serde_json::from_value(value.clone()).map_err(|err| {
            anyhow::anyhow!(
                "function {} parameter {name} has the wrong type: {err}",
                self.function
            )
        })
    }
}

/// Name-to-handler mapping consulted by the dispatch mapper.
#[derive(Debug, Clone, Default)]
pub struct FunctionTable {
    handlers: HashMap<String, Handler>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<I, S, F>(&mut self, name: impl Into<String>, params: I, f: F) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(BoundArgs) -> Result<Value> + Send + Sync + 'static,
    {
        self.insert(name, Handler::new(params, f))
    }

    pub fn register_async<I, S, F, Fut>(
        &mut self,
        name: impl Into<String>,
        params: I,
        f: F,
    ) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(BoundArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + 'static,
    {
        self.insert(name, Handler::new_async(params, f))
    }

    /// Adds or replaces the handler registered under `name`.
    pub fn insert(&mut self, name: impl Into<String>, handler: Handler) -> &mut Self {
        self.handlers.insert(name.into(), handler);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Handler> {
        self.handlers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }
}
