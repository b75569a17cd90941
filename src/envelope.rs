//! The JSON message a host runtime hands in and gets back.
//!
//! Connection overrides and `workdir` ride on the message next to an
//! operation-dependent `payload`. The reply is the same message with
//! `payload` replaced by the result; every other field is passed through
//! untouched, except `password`, which is never echoed.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::config::{port_from_any, RequestOverrides};
use crate::dispatch::{Operation, OperationOutput, RequestPayload};
use crate::error::{Error, Result};
use crate::executor::{OperationResult, Request};
use crate::status::Status;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, deserialize_with = "port_from_any", skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workdir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_filename: Option<String>,
    #[serde(default)]
    pub payload: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Upload data as text, a byte array, or a serialised Node.js Buffer.
#[derive(Deserialize)]
#[serde(untagged)]
enum PutData {
    Text(String),
    Bytes(Vec<u8>),
    Buffer { data: Vec<u8> },
}

impl From<PutData> for Vec<u8> {
    fn from(d: PutData) -> Self {
        match d {
            PutData::Text(s) => s.into_bytes(),
            PutData::Bytes(b) | PutData::Buffer { data: b } => b,
        }
    }
}

impl Message {
    /// Build the executor request. `operation` is the configured name;
    /// an unknown name yields an empty payload and is rejected downstream.
    pub fn to_request(&self, operation: &str) -> Result<Request> {
        let payload = match operation.parse::<Operation>() {
            Ok(Operation::Put) => put_payload(&self.payload)?,
            Ok(Operation::Get | Operation::Delete | Operation::Mkdir | Operation::Rmdir) => {
                match &self.payload {
                    Value::String(p) if !p.trim().is_empty() => RequestPayload::Path(p.clone()),
                    _ => RequestPayload::Empty,
                }
            }
            Ok(Operation::List) | Err(_) => RequestPayload::Empty,
        };

        Ok(Request {
            overrides: RequestOverrides {
                host: self.host.clone(),
                port: self.port,
                user: self.user.clone(),
                password: self.password.clone(),
                ..Default::default()
            },
            workdir: self.workdir.clone(),
            payload,
        })
    }

    /// The message with `payload` replaced by `output`.
    pub fn with_output(mut self, output: &OperationOutput) -> Message {
        self.payload = output_to_json(output);
        self
    }
}

fn put_payload(payload: &Value) -> Result<RequestPayload> {
    let Value::Object(obj) = payload else {
        return Ok(RequestPayload::Empty);
    };
    let Some(data) = obj.get("data") else {
        return Ok(RequestPayload::Empty);
    };
    let data: PutData = serde_json::from_value(data.clone()).map_err(|_| {
        Error::operation("put", "payload.data must be a string, a byte array or a Buffer")
    })?;
    let filename = obj
        .get("filename")
        .and_then(Value::as_str)
        .map(str::to_string);
    Ok(RequestPayload::Data {
        data: data.into(),
        filename,
    })
}

fn output_to_json(output: &OperationOutput) -> Value {
    match output {
        OperationOutput::Listing(entries) => serde_json::to_value(entries).unwrap_or_default(),
        OperationOutput::Bytes(bytes) => json!({ "type": "Buffer", "data": bytes }),
        other => other.confirmation().map(Value::String).unwrap_or_default(),
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorReport {
    pub kind: String,
    pub message: String,
}

impl From<&Error> for ErrorReport {
    fn from(e: &Error) -> Self {
        Self {
            kind: e.kind().to_string(),
            message: e.to_string(),
        }
    }
}

/// What the adapter hands back: the data channel (`msg`) and the error
/// channel (`error`) are kept apart.
#[derive(Debug, Serialize)]
pub struct Reply {
    pub ok: bool,
    pub operation: String,
    pub status: Status,
    pub msg: Message,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
}

impl Reply {
    /// On failure the original message is kept for correlation.
    pub fn from_result(msg: Message, result: &OperationResult) -> Self {
        match (&result.output, &result.error) {
            (Some(output), _) => Self {
                ok: true,
                operation: result.operation.clone(),
                status: Status::Done,
                msg: msg.with_output(output),
                error: None,
            },
            (None, error) => Self {
                ok: false,
                operation: result.operation.clone(),
                status: Status::Failed,
                msg,
                error: error.as_ref().map(ErrorReport::from),
            },
        }
    }

    pub fn rejected(operation: &str, msg: Message, error: &Error) -> Self {
        Self {
            ok: false,
            operation: operation.to_string(),
            status: Status::Failed,
            msg,
            error: Some(error.into()),
        }
    }
}
