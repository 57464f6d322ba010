use anyhow::Error as AnyError;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Phase of the step loop an invocation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPhase {
    /// Regular invocations made while the worker wants to run.
    Run,
    /// The single final invocation made after the loop has ended.
    Teardown,
}

/// Fault raised by a step function invocation, either as an error result or a panic.
#[derive(Debug)]
pub struct StepFault {
    phase: StepPhase,
    source: AnyError,
}

impl StepFault {
    pub fn new(phase: StepPhase, source: AnyError) -> Self {
        Self { phase, source }
    }

    pub fn phase(&self) -> StepPhase {
        self.phase
    }

    pub fn into_source(self) -> AnyError {
        self.source
    }
}

impl fmt::Display for StepFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} step fault: {}", self.phase, self.source)
    }
}

impl std::error::Error for StepFault {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

/// Cloneable handle to an error observed by more than one reader.
#[derive(Clone)]
pub struct SharedError {
    inner: Arc<AnyError>,
}

impl SharedError {
    pub fn new(inner: AnyError) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Returns the underlying error if it is of type `E`.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.inner.downcast_ref::<E>()
    }
}

impl From<AnyError> for SharedError {
    fn from(inner: AnyError) -> Self {
        Self::new(inner)
    }
}

impl fmt::Debug for SharedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SharedError").field(&self.inner).finish()
    }
}

impl fmt::Display for SharedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.inner.as_ref(), f)
    }
}

impl std::error::Error for SharedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.inner.as_ref().as_ref())
    }
}

/// Logs step faults and keeps the first normal-phase fault for later inspection.
#[derive(Debug, Default)]
pub struct FaultRecorder {
    triggered: AtomicBool,
    captured: Mutex<Option<SharedError>>,
}

impl FaultRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Logs `fault` and returns the step's own error as a [`SharedError`].
    ///
    /// Only the first [`StepPhase::Run`] fault is retained; teardown faults are logged
    /// and otherwise dropped.
    pub fn record(&self, worker: &str, fault: StepFault) -> SharedError {
        let phase = fault.phase();
        tracing::error!(
            worker,
            phase = ?phase,
            error = %fault,
            "step function fault"
        );

        let error = SharedError::new(fault.into_source());
        if phase == StepPhase::Run && !self.triggered.swap(true, Ordering::SeqCst) {
            let mut slot = self
                .captured
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if slot.is_none() {
                *slot = Some(error.clone());
            }
        }
        error
    }

    pub fn error(&self) -> Option<SharedError> {
        self.captured
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
