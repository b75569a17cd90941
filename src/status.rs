//! Observable status transitions and the uniform error-reporting seam.

use serde::Serialize;

use crate::error::Error;

/// Colour class of a status indicator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Idle,
    Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Connecting,
    Connected,
    Done,
    Failed,
    /// Indicator removed; the executor is idle again.
    Cleared,
}

impl Status {
    pub fn text(&self) -> &'static str {
        match self {
            Status::Connecting => "connecting",
            Status::Connected => "connected",
            Status::Done => "done!",
            Status::Failed => "failed",
            Status::Cleared => "",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Status::Connecting => Severity::Info,
            Status::Connected => Severity::Success,
            Status::Done | Status::Cleared => Severity::Idle,
            Status::Failed => Severity::Error,
        }
    }
}

/// Receives status transitions and errors from the executor.
///
/// Every request ends with exactly one `Status::Cleared`, after any error.
pub trait Reporter: Send + Sync {
    fn on_status(&self, status: Status);
    fn on_error(&self, error: &Error);
}

/// A request that ends in `error`: failed, the error itself, then cleared.
pub fn report_failure(reporter: &dyn Reporter, error: &Error) {
    reporter.on_status(Status::Failed);
    reporter.on_error(error);
    reporter.on_status(Status::Cleared);
}

/// Writes transitions and errors to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn on_status(&self, status: Status) {
        log::debug!("status: {:?}", status);
    }

    fn on_error(&self, error: &Error) {
        log::error!("{}", error);
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl Reporter for NoopReporter {
    fn on_status(&self, _status: Status) {}
    fn on_error(&self, _error: &Error) {}
}
