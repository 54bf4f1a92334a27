//! Error types for the HTTP server and the routing engine.

use thiserror::Error;

use crate::parser::Error as ParserError;

/// Errors raised while registering routes, dispatching requests or serving connections.
#[derive(Debug, Error)]
pub enum Error {
    /// A servlet, filter or handler pattern is empty or malformed.
    #[error("Invalid pattern: {0:?}")]
    InvalidPattern(String),

    /// A context path is not `/` or a single `/segment`.
    #[error("Invalid context path: {0:?}")]
    InvalidContextPath(String),

    /// Two registrations collide, or a request matches ambiguously.
    #[error("Mapping conflict in context [{context}]: {detail}")]
    MappingConflict { context: String, detail: String },

    /// A registration was attempted after the server started.
    #[error("Server [{0}] has already been started")]
    AlreadyStarted(String),

    /// A user handler, servlet or filter reported a failure.
    #[error("Handler failed: {0}")]
    Handler(String),

    /// A user handler, servlet or filter panicked.
    #[error("Handler panicked: {0}")]
    HandlerPanic(String),

    /// The context's error handler failed while handling `cause`.
    #[error("Error handler failed while handling [{cause}]: {source}")]
    ErrorHandlerFailure {
        cause: Box<Error>,
        #[source]
        source: Box<Error>,
    },

    /// Something tried to write a response that was already written.
    #[error("Response has already been written")]
    ResponseAlreadyWritten,

    /// JSON serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Error parsing an HTTP request.
    #[error("Parse error: {0}")]
    ParseError(#[from] ParserError),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Invalid server configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Convenience constructor for handler failures.
    pub fn handler(message: impl Into<String>) -> Self {
        Error::Handler(message.into())
    }

    pub(crate) fn conflict(context: &str, detail: impl Into<String>) -> Self {
        Error::MappingConflict {
            context: context.to_string(),
            detail: detail.into(),
        }
    }
}
