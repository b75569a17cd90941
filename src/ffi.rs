//! C FFI interface for embedding in a host runtime.
//!
//! Everything crosses the boundary as JSON strings. Returned strings are
//! owned by Rust and must be freed with `sftp_exec_string_free`.
//! Naming convention: sftp_exec_<object>_<action>

use std::ffi::{c_void, CStr, CString};
use std::os::raw::c_char;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{anyhow, Context};
use serde::Deserialize;

use crate::config::ServerConfig;
use crate::envelope::{Message, Reply};
use crate::error::Error;
use crate::executor::{
    ExecutorOptions, Request, SftpExecutor, TaskSettings, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_OPERATION_TIMEOUT,
};
use crate::keys::KeyLoader;
use crate::manager::Deployment;
use crate::status::{report_failure, LogReporter, Reporter, Status};

/// Global tokio runtime shared by every executor handle.
fn runtime() -> Option<&'static tokio::runtime::Runtime> {
    static RUNTIME: OnceLock<std::io::Result<tokio::runtime::Runtime>> = OnceLock::new();
    RUNTIME
        .get_or_init(|| {
            tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
        })
        .as_ref()
        .ok()
}

/// Everything a node needs at setup.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeSetup {
    server: ServerConfig,
    #[serde(default)]
    settings: TaskSettings,
    #[serde(default)]
    options: NodeOptions,
    /// Base for the key-file environment variable; defaults to the
    /// current directory.
    #[serde(default)]
    install_root: Option<String>,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct NodeOptions {
    connect_timeout_secs: Option<u64>,
    operation_timeout_secs: Option<u64>,
    deployment: Deployment,
}

impl From<NodeOptions> for ExecutorOptions {
    fn from(o: NodeOptions) -> Self {
        Self {
            connect_timeout: o
                .connect_timeout_secs
                .map_or(DEFAULT_CONNECT_TIMEOUT, Duration::from_secs),
            operation_timeout: o
                .operation_timeout_secs
                .map_or(DEFAULT_OPERATION_TIMEOUT, Duration::from_secs),
            deployment: o.deployment,
        }
    }
}

fn build_executor(setup_json: &str) -> anyhow::Result<SftpExecutor> {
    let setup: NodeSetup = serde_json::from_str(setup_json).context("Invalid setup JSON")?;
    let root = match setup.install_root {
        Some(root) => PathBuf::from(root),
        None => std::env::current_dir().context("Cannot determine install root")?,
    };
    let keys = KeyLoader::from_env(root);
    Ok(SftpExecutor::with_russh(
        setup.server,
        setup.settings,
        &keys,
        setup.options.into(),
    )?)
}

fn to_c_string(json: String) -> *mut c_char {
    CString::new(json).unwrap_or_default().into_raw()
}

/// Borrow a C string as `&str`. None for null or non-UTF-8 input.
unsafe fn borrow_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok()
}

// ═══════════════════════════════════════════════════════════
// Lifecycle
// ═══════════════════════════════════════════════════════════

/// Opaque pointer to an SftpExecutor.
pub type SftpExecHandle = *mut SftpExecutor;

/// Create an executor from a setup JSON document
/// (`{"server": {...}, "settings": {...}, "options": {...}}`).
/// Returns null on failure; the reason is logged.
#[no_mangle]
pub extern "C" fn sftp_exec_node_create(setup_json: *const c_char) -> SftpExecHandle {
    let Some(json) = (unsafe { borrow_str(setup_json) }) else {
        log::error!("Node setup JSON is null or not UTF-8");
        return std::ptr::null_mut();
    };

    match build_executor(json) {
        Ok(exec) => Box::into_raw(Box::new(exec)),
        Err(e) => {
            log::error!("Failed to create SFTP node: {:#}", e);
            std::ptr::null_mut()
        }
    }
}

/// Destroy an executor. Safe to call with null.
#[no_mangle]
pub extern "C" fn sftp_exec_node_destroy(handle: SftpExecHandle) {
    if !handle.is_null() {
        unsafe {
            drop(Box::from_raw(handle));
        }
    }
}

/// Whether a shared-deployment node is currently serving a request.
#[no_mangle]
pub extern "C" fn sftp_exec_node_is_busy(handle: SftpExecHandle) -> bool {
    if handle.is_null() {
        return false;
    }
    let exec = unsafe { &*handle };
    exec.manager().is_busy()
}

// ═══════════════════════════════════════════════════════════
// Requests
// ═══════════════════════════════════════════════════════════

/// Status callback: `(text, severity, user_data)`. Both strings are only
/// valid for the duration of the call.
pub type SftpExecStatusCallback =
    extern "C" fn(text: *const c_char, severity: *const c_char, user_data: *mut c_void);

struct CallbackReporter {
    callback: SftpExecStatusCallback,
    user_data: usize,
}

impl Reporter for CallbackReporter {
    fn on_status(&self, status: Status) {
        let text = CString::new(status.text()).unwrap_or_default();
        let severity = match serde_json::to_value(status.severity()) {
            Ok(serde_json::Value::String(s)) => s,
            _ => String::new(),
        };
        let severity = CString::new(severity).unwrap_or_default();
        (self.callback)(text.as_ptr(), severity.as_ptr(), self.user_data as *mut c_void);
    }

    fn on_error(&self, error: &Error) {
        LogReporter.on_error(error);
    }
}

/// Run one request message against the node.
/// Returns a reply JSON `{"ok", "operation", "status", "msg", "error"?}`.
/// Caller must free with sftp_exec_string_free.
#[no_mangle]
pub extern "C" fn sftp_exec_node_run(handle: SftpExecHandle, message_json: *const c_char) -> *mut c_char {
    run_with(handle, message_json, &LogReporter)
}

/// Like `sftp_exec_node_run`, reporting each status transition to
/// `callback` on the calling thread.
#[no_mangle]
pub extern "C" fn sftp_exec_node_run_with_status(
    handle: SftpExecHandle,
    message_json: *const c_char,
    callback: Option<SftpExecStatusCallback>,
    user_data: *mut c_void,
) -> *mut c_char {
    match callback {
        Some(callback) => {
            let reporter = CallbackReporter {
                callback,
                user_data: user_data as usize,
            };
            run_with(handle, message_json, &reporter)
        }
        None => run_with(handle, message_json, &LogReporter),
    }
}

fn run_with(handle: SftpExecHandle, message_json: *const c_char, reporter: &dyn Reporter) -> *mut c_char {
    if handle.is_null() {
        return std::ptr::null_mut();
    }
    let exec = unsafe { &*handle };
    let operation = exec.settings().operation.clone();

    let reply = match prepare(&operation, unsafe { borrow_str(message_json) }) {
        Ok((msg, request)) => match runtime() {
            Some(rt) => {
                let result = rt.block_on(exec.execute(request, reporter));
                Reply::from_result(msg, &result)
            }
            None => reject(
                reporter,
                &operation,
                msg,
                Error::Connect("async runtime unavailable".to_string()),
            ),
        },
        Err((msg, err)) => reject(reporter, &operation, msg, err),
    };

    match serde_json::to_string(&reply) {
        Ok(json) => to_c_string(json),
        Err(e) => {
            log::error!("Failed to serialise reply: {}", e);
            std::ptr::null_mut()
        }
    }
}

/// Decode the message and build the request. A message that cannot be
/// decoded is replaced by an empty one in the rejection.
fn prepare(operation: &str, json: Option<&str>) -> Result<(Message, Request), (Message, Error)> {
    let msg = parse_message(json)
        .map_err(|e| (Message::default(), Error::operation(operation, format!("{:#}", e))))?;
    match msg.to_request(operation) {
        Ok(request) => Ok((msg, request)),
        Err(e) => Err((msg, e)),
    }
}

/// A request that never reached the executor still ends failed, then cleared.
fn reject(reporter: &dyn Reporter, operation: &str, msg: Message, err: Error) -> Reply {
    report_failure(reporter, &err);
    Reply::rejected(operation, msg, &err)
}

fn parse_message(json: Option<&str>) -> anyhow::Result<Message> {
    let json = json.ok_or_else(|| anyhow!("message is null or not UTF-8"))?;
    serde_json::from_str(json).context("Invalid message JSON")
}

// ═══════════════════════════════════════════════════════════
// Utilities
// ═══════════════════════════════════════════════════════════

/// Free a string returned by any sftp_exec_* function.
#[no_mangle]
pub extern "C" fn sftp_exec_string_free(s: *mut c_char) {
    if !s.is_null() {
        unsafe {
            drop(CString::from_raw(s));
        }
    }
}

/// Initialize the logger. Call once from the host at startup.
/// Honours `RUST_LOG`.
#[no_mangle]
pub extern "C" fn sftp_exec_init() {
    let _ = env_logger::try_init();
    log::info!("sftp-exec initialized");
}
