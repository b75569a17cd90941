//! sftp-exec — run one SFTP operation per incoming message
//!
//! An [`SftpExecutor`] is configured once with a server and a task
//! (list, get, put, delete, mkdir, rmdir). Each request opens an
//! authenticated session, performs the operation, reports status
//! transitions and releases the session. A C FFI exposes the same flow
//! to a host runtime as JSON in, JSON out.

pub mod config;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod executor;
pub mod ffi;
pub mod keys;
pub mod manager;
pub mod ssh;
pub mod status;

pub use dispatch::{Operation, OperationOutput};
pub use error::{Error, Result};
pub use executor::{ExecutorOptions, OperationResult, Request, SftpExecutor, TaskSettings};
