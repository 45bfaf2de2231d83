//! Error taxonomy shared by every layer of the runtime.

use thiserror::Error;

/// Unified error type returned across the actor runtime, stream primitive,
/// event bus and workflow composer.
#[derive(Debug, Error, Clone)]
pub enum CoreError {
    #[error("operation cancelled")]
    Cancelled,

    /// Sentinel signalling normal stream completion. Not a user-facing
    /// failure; `Reader::recv` surfaces it so callers can stop polling.
    #[error("end of stream")]
    EndOfStream,

    #[error("request timed out after {0:?}")]
    ResponseTimeout(std::time::Duration),

    #[error("mailbox for {0} is full")]
    MailboxFull(String),

    #[error("no route for key '{0}'")]
    UnknownRoute(String),

    #[error("permission denied for tool '{0}'")]
    PermissionDenied(String),

    #[error("provider error: {0}")]
    ProviderError(String),

    #[error("tool '{tool}' failed: {message}")]
    ToolError { tool: String, message: String },

    #[error("actor panicked: {0}")]
    Panic(String),

    #[error("invalid configuration: {0}")]
    Validation(String),

    #[error("actor '{0}' does not exist or has already stopped")]
    ActorNotFound(String),

    #[error("an actor already exists at '{0}'")]
    DuplicateName(String),
}

impl CoreError {
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, CoreError::EndOfStream)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, CoreError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
