use std::fmt;

/// Failure to turn a dispatch target and parameter set into a handler invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The default target was requested but the worker has no dispatch key.
    MissingTarget,
    /// The parameters do not contain the key that names the function.
    MissingKey { key: String },
    /// The value stored under the function-name key is not a string.
    InvalidName { key: String },
    /// No handler is registered under the requested name.
    UnknownFunction { name: String },
    /// A parameter declared by the handler is absent from the payload.
    MissingParameter { function: String, parameter: String },
    /// An async handler was reached through the synchronous mapper.
    RequiresAsync { function: String },
    /// The payload is not a JSON object.
    PayloadNotMap,
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::MissingTarget => {
                write!(f, "no dispatch target given and no dispatch key configured")
            }
            DispatchError::MissingKey { key } => {
                write!(f, "parameters do not contain function key {key}")
            }
            DispatchError::InvalidName { key } => {
                write!(f, "function key {key} does not hold a string")
            }
            DispatchError::UnknownFunction { name } => {
                write!(f, "function {name} is not registered")
            }
            DispatchError::MissingParameter {
                function,
                parameter,
            } => write!(f, "function {function} is missing parameter {parameter}"),
            DispatchError::RequiresAsync { function } => {
                write!(f, "function {function} is async and needs the async mapper")
            }
            DispatchError::PayloadNotMap => write!(f, "dispatched payload is not a map"),
        }
    }
}

impl std::error::Error for DispatchError {}
