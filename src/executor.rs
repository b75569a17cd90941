//! The request pipeline: resolve, acquire, dispatch, report, release.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::config::{self, RequestOverrides, ServerConfig};
use crate::dispatch::{dispatch, Operation, OperationOutput, OperationRequest, RequestPayload};
use crate::error::{Error, Result};
use crate::keys::{Credentials, KeyLoader};
use crate::manager::{Deployment, SessionManager};
use crate::ssh::session::RusshConnector;
use crate::ssh::{Connector, RemoteFs};
use crate::status::{report_failure, Reporter, Status};

pub const DEFAULT_WORKDIR: &str = "./";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(300);

/// Node-level settings fixed at setup.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskSettings {
    pub operation: String,
    pub filename: String,
    pub workdir: String,
}

#[derive(Clone, Debug)]
pub struct ExecutorOptions {
    pub connect_timeout: Duration,
    pub operation_timeout: Duration,
    pub deployment: Deployment,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            deployment: Deployment::PerRequest,
        }
    }
}

/// One invocation's input.
#[derive(Clone, Debug, Default)]
pub struct Request {
    pub overrides: RequestOverrides,
    pub workdir: Option<String>,
    pub payload: RequestPayload,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResultStatus {
    Success,
    Failure,
}

#[derive(Debug)]
pub struct OperationResult {
    /// The configured operation name, echoed as given.
    pub operation: String,
    pub output: Option<OperationOutput>,
    pub status: ResultStatus,
    pub error: Option<Error>,
}

impl OperationResult {
    fn success(operation: &str, output: OperationOutput) -> Self {
        Self {
            operation: operation.to_string(),
            output: Some(output),
            status: ResultStatus::Success,
            error: None,
        }
    }

    fn failure(operation: &str, error: Error) -> Self {
        Self {
            operation: operation.to_string(),
            output: None,
            status: ResultStatus::Failure,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResultStatus::Success
    }

    pub fn error_detail(&self) -> Option<String> {
        self.error.as_ref().map(|e| e.to_string())
    }
}

pub struct SftpExecutor {
    config: ServerConfig,
    credentials: Credentials,
    settings: TaskSettings,
    manager: SessionManager,
    operation_timeout: Duration,
}

impl SftpExecutor {
    /// Validate the stored configuration and settle its credential.
    /// Configuration errors surface here, before any request runs.
    pub fn new(
        config: ServerConfig,
        settings: TaskSettings,
        keys: &KeyLoader,
        connector: Arc<dyn Connector>,
        options: ExecutorOptions,
    ) -> Result<Self> {
        config.validate()?;
        let credentials = keys.load(&config)?;
        log::debug!(
            "Executor ready: {} on {}:{} ({:?})",
            settings.operation,
            config.host,
            config.port,
            options.deployment
        );

        Ok(Self {
            config,
            credentials,
            settings,
            manager: SessionManager::new(connector, options.deployment, options.connect_timeout),
            operation_timeout: options.operation_timeout,
        })
    }

    /// Same as [`SftpExecutor::new`] with the russh transport.
    pub fn with_russh(
        config: ServerConfig,
        settings: TaskSettings,
        keys: &KeyLoader,
        options: ExecutorOptions,
    ) -> Result<Self> {
        Self::new(config, settings, keys, Arc::new(RusshConnector), options)
    }

    pub fn settings(&self) -> &TaskSettings {
        &self.settings
    }

    pub fn manager(&self) -> &SessionManager {
        &self.manager
    }

    /// Run one request. Never panics on remote failure: errors go to
    /// `reporter.on_error` and into the returned result, and the status
    /// always ends on [`Status::Cleared`].
    pub async fn execute(&self, request: Request, reporter: &dyn Reporter) -> OperationResult {
        let operation = self.settings.operation.as_str();
        match self.run(request, reporter).await {
            Ok(output) => {
                reporter.on_status(Status::Done);
                reporter.on_status(Status::Cleared);
                OperationResult::success(operation, output)
            }
            Err(e) => {
                report_failure(reporter, &e);
                OperationResult::failure(operation, e)
            }
        }
    }

    async fn run(&self, request: Request, reporter: &dyn Reporter) -> Result<OperationOutput> {
        let operation: Operation = self.settings.operation.parse()?;
        let op_request = self.operation_request(operation, request.workdir, request.payload);
        // Incomplete requests fail here, before any connection.
        op_request.target()?;
        let spec = config::resolve(&self.config, &self.credentials, &request.overrides)?;

        reporter.on_status(Status::Connecting);
        let mut session = self.manager.acquire(&spec).await?;
        reporter.on_status(Status::Connected);

        let outcome = match session.fs() {
            Ok(fs) => self.dispatch_timed(fs, &op_request).await,
            Err(e) => Err(e),
        };

        if let Err(e) = session.release().await {
            log::warn!("Session cleanup failed: {}", e);
        }
        outcome
    }

    async fn dispatch_timed(&self, fs: &mut dyn RemoteFs, request: &OperationRequest) -> Result<OperationOutput> {
        tokio::time::timeout(self.operation_timeout, dispatch(fs, request))
            .await
            .map_err(|_| {
                Error::operation(
                    request.operation.as_str(),
                    format!("timed out after {}s", self.operation_timeout.as_secs_f32()),
                )
            })?
    }

    /// Workdir resolves request first, then the node setting, then `./`.
    fn operation_request(
        &self,
        operation: Operation,
        workdir: Option<String>,
        payload: RequestPayload,
    ) -> OperationRequest {
        let workdir = config::non_empty(workdir.as_deref())
            .or_else(|| config::non_empty(Some(self.settings.workdir.as_str())))
            .unwrap_or(DEFAULT_WORKDIR)
            .to_string();
        OperationRequest {
            operation,
            workdir,
            filename: self.settings.filename.clone(),
            payload,
        }
    }
}
