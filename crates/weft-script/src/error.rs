//! Error types for script compilation and execution.

use thiserror::Error;

/// Result type alias for script operations.
pub type ScriptResult<T> = Result<T, ScriptError>;

/// Errors that can occur while preparing or running a script.
///
/// A cooperative exit is not an error; it surfaces as
/// [`RunOutcome::Halted`](crate::namespace::RunOutcome).
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("failed to read script {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to compile script {path}: {message}")]
    Compile { path: String, message: String },

    #[error("script {path} faulted: {message}")]
    Execution { path: String, message: String },
}

impl ScriptError {
    pub fn read(path: impl Into<String>, source: std::io::Error) -> Self {
        ScriptError::Read { path: path.into(), source }
    }

    pub fn compile(path: impl Into<String>, message: impl Into<String>) -> Self {
        ScriptError::Compile { path: path.into(), message: message.into() }
    }

    pub fn execution(path: impl Into<String>, message: impl Into<String>) -> Self {
        ScriptError::Execution { path: path.into(), message: message.into() }
    }
}
