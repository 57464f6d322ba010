use anyhow::{bail, Result};
use std::time::Duration;
use tracing::Dispatch;

const DEFAULT_WORKER_NAME: &str = "threadmsg-worker";
const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 500;

/// How a worker thread drives its step function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// Step functions run on a private current-thread scheduler and waits suspend the
    /// task.
    #[default]
    Cooperative,
    /// Step functions are driven by a plain executor and waits block the OS thread on a
    /// condition variable.
    Blocking,
}

/// Configuration for a single worker.
///
/// Instances are built via [`WorkerConfig::builder`], [`WorkerConfig::new`], or
/// [`WorkerConfig::default`]; the first two validate before returning.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    name: String,
    auto_start: bool,
    dispatch_key: Option<String>,
    mode: ExecutionMode,
    max_idle_wait: Option<Duration>,
    shutdown_timeout: Duration,
    log_dispatch: Option<Dispatch>,
}

pub struct WorkerConfigParams {
    pub name: String,
    pub auto_start: bool,
    pub dispatch_key: Option<String>,
    pub mode: ExecutionMode,
    pub max_idle_wait: Option<Duration>,
    pub shutdown_timeout: Duration,
    pub log_dispatch: Option<Dispatch>,
}

impl WorkerConfig {
    pub fn builder() -> WorkerConfigBuilder {
        WorkerConfigBuilder::default()
    }

    /// Constructs a configuration directly from the provided values, running validation.
    pub fn new(params: WorkerConfigParams) -> Result<Self> {
        let WorkerConfigParams {
            name,
            auto_start,
            dispatch_key,
            mode,
            max_idle_wait,
            shutdown_timeout,
            log_dispatch,
        } = params;

        let config = Self {
            name: name.trim().to_owned(),
            auto_start,
            dispatch_key: dispatch_key.map(|key| key.trim().to_owned()),
            mode,
            max_idle_wait,
            shutdown_timeout,
            log_dispatch,
        };

        config.validate()?;
        Ok(config)
    }

    /// Name given to the worker thread and attached to its log span.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the thread starts as soon as the worker is constructed.
    pub fn auto_start(&self) -> bool {
        self.auto_start
    }

    /// Payload key that carries the target function name for dispatch-by-name.
    pub fn dispatch_key(&self) -> Option<&str> {
        self.dispatch_key.as_deref()
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Upper bound on an idle wait (a step that returned no delay). `None` waits until
    /// notified.
    pub fn max_idle_wait(&self) -> Option<Duration> {
        self.max_idle_wait
    }

    /// Grace period given to the private scheduler when the thread winds down.
    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// Dispatcher installed as the thread default on the worker thread.
    pub fn log_dispatch(&self) -> Option<&Dispatch> {
        self.log_dispatch.as_ref()
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("name cannot be empty");
        }

        if self.name.contains('\0') {
            bail!("name cannot contain NUL bytes");
        }

        if let Some(key) = &self.dispatch_key {
            if key.trim().is_empty() {
                bail!("dispatch_key cannot be empty when set");
            }
        }

        if matches!(self.max_idle_wait, Some(wait) if wait.is_zero()) {
            bail!("max_idle_wait must be greater than 0");
        }

        if self.shutdown_timeout.is_zero() {
            bail!("shutdown_timeout must be greater than 0");
        }

        Ok(())
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_WORKER_NAME.to_owned(),
            auto_start: true,
            dispatch_key: None,
            mode: ExecutionMode::default(),
            max_idle_wait: None,
            shutdown_timeout: Duration::from_millis(DEFAULT_SHUTDOWN_TIMEOUT_MS),
            log_dispatch: None,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct WorkerConfigBuilder {
    name: Option<String>,
    auto_start: Option<bool>,
    dispatch_key: Option<String>,
    mode: Option<ExecutionMode>,
    max_idle_wait: Option<Duration>,
    shutdown_timeout: Option<Duration>,
    log_dispatch: Option<Dispatch>,
}

impl WorkerConfigBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = Some(auto_start);
        self
    }

    pub fn dispatch_key(mut self, key: impl Into<String>) -> Self {
        self.dispatch_key = Some(key.into());
        self
    }

    pub fn mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn max_idle_wait(mut self, wait: Duration) -> Self {
        self.max_idle_wait = Some(wait);
        self
    }

    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = Some(timeout);
        self
    }

    pub fn log_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.log_dispatch = Some(dispatch);
        self
    }

    pub fn build(self) -> Result<WorkerConfig> {
        let params = WorkerConfigParams {
            name: self
                .name
                .unwrap_or_else(|| DEFAULT_WORKER_NAME.to_owned()),
            auto_start: self.auto_start.unwrap_or(true),
            dispatch_key: self.dispatch_key,
            mode: self.mode.unwrap_or_default(),
            max_idle_wait: self.max_idle_wait,
            shutdown_timeout: self
                .shutdown_timeout
                .unwrap_or_else(|| Duration::from_millis(DEFAULT_SHUTDOWN_TIMEOUT_MS)),
            log_dispatch: self.log_dispatch,
        };

        WorkerConfig::new(params)
    }
}
