//! Error taxonomy shared by every stage of the executor.
//!
//! Messages are meant for logs and status panels; they never carry
//! passwords, passphrases or key material.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Stored or resolved configuration is unusable. Detected before any
    /// network activity.
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport, handshake or authentication failure (including connect
    /// timeouts).
    #[error("connect error: {0}")]
    Connect(String),

    /// The shared session is already held by another operation.
    #[error("session busy: another operation is in progress")]
    Busy,

    #[error("invalid operation: {0:?}")]
    InvalidOperation(String),

    /// The remote action itself failed (missing path, permission denied,
    /// operation timeout, ...).
    #[error("{operation} failed: {message}")]
    Operation { operation: String, message: String },
}

impl Error {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub(crate) fn connect(msg: impl std::fmt::Display) -> Self {
        Error::Connect(msg.to_string())
    }

    pub(crate) fn operation(operation: impl Into<String>, msg: impl std::fmt::Display) -> Self {
        Error::Operation {
            operation: operation.into(),
            message: msg.to_string(),
        }
    }

    /// Short machine-readable kind, used by the FFI envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Config(_) => "config",
            Error::Connect(_) => "connect",
            Error::Busy => "busy",
            Error::InvalidOperation(_) => "invalid_operation",
            Error::Operation { .. } => "operation",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
