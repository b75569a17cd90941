//! One remote action per request.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ssh::{RemoteEntry, RemoteFs};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    List,
    Get,
    Put,
    Delete,
    Mkdir,
    Rmdir,
}

impl Operation {
    pub const ALL: [Operation; 6] = [
        Operation::List,
        Operation::Get,
        Operation::Put,
        Operation::Delete,
        Operation::Mkdir,
        Operation::Rmdir,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::List => "list",
            Operation::Get => "get",
            Operation::Put => "put",
            Operation::Delete => "delete",
            Operation::Mkdir => "mkdir",
            Operation::Rmdir => "rmdir",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Operation::ALL
            .into_iter()
            .find(|op| op.as_str() == s.trim())
            .ok_or_else(|| Error::InvalidOperation(s.to_string()))
    }
}

/// Operation-dependent request payload.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum RequestPayload {
    #[default]
    Empty,
    /// Explicit remote path (get, delete, mkdir, rmdir).
    Path(String),
    /// Bytes to upload, optionally under a different file name.
    Data {
        data: Vec<u8>,
        filename: Option<String>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperationRequest {
    pub operation: Operation,
    pub workdir: String,
    pub filename: String,
    pub payload: RequestPayload,
}

impl OperationRequest {
    /// The remote path the action applies to.
    pub fn target(&self) -> Result<String> {
        let op = self.operation;
        match (op, &self.payload) {
            (Operation::List, _) => Ok(self.workdir.clone()),
            (Operation::Get | Operation::Delete, RequestPayload::Path(p)) if !p.is_empty() => {
                Ok(p.clone())
            }
            (Operation::Get | Operation::Delete, _) => {
                let name = self.filename.trim();
                if name.is_empty() {
                    return Err(Error::operation(op.as_str(), "no filename or target path given"));
                }
                Ok(join_remote(&self.workdir, name))
            }
            (Operation::Put, RequestPayload::Data { filename, .. }) => {
                // Filenames are trimmed before joining.
                let name = filename
                    .as_deref()
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .unwrap_or(self.filename.trim());
                if name.is_empty() {
                    return Err(Error::operation(op.as_str(), "no filename given"));
                }
                Ok(join_remote(&self.workdir, name))
            }
            (Operation::Put, _) => Err(Error::operation(op.as_str(), "payload carries no data")),
            (Operation::Mkdir | Operation::Rmdir, RequestPayload::Path(p)) if !p.is_empty() => {
                Ok(p.clone())
            }
            (Operation::Mkdir | Operation::Rmdir, _) => Ok(self.workdir.clone()),
        }
    }
}

/// What a successful action produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OperationOutput {
    Listing(Vec<RemoteEntry>),
    Bytes(Vec<u8>),
    Written { path: String, bytes: u64 },
    Deleted { path: String },
    DirCreated { path: String },
    DirRemoved { path: String },
}

impl OperationOutput {
    /// Human-readable confirmation for write-style actions.
    pub fn confirmation(&self) -> Option<String> {
        match self {
            OperationOutput::Listing(_) | OperationOutput::Bytes(_) => None,
            OperationOutput::Written { path, .. } => Some(format!("Uploaded data stream to {}", path)),
            OperationOutput::Deleted { path } => Some(format!("Successfully deleted {}", path)),
            OperationOutput::DirCreated { path } => Some(format!("{} directory created", path)),
            OperationOutput::DirRemoved { .. } => Some("Successfully removed directory".to_string()),
        }
    }
}

/// Perform exactly one remote action.
pub async fn dispatch(fs: &mut dyn RemoteFs, request: &OperationRequest) -> Result<OperationOutput> {
    let path = request.target()?;
    log::debug!("{} {}", request.operation, path);

    match request.operation {
        Operation::List => fs.list(&path).await.map(OperationOutput::Listing),
        Operation::Get => fs.read(&path).await.map(OperationOutput::Bytes),
        Operation::Put => {
            let data = match &request.payload {
                RequestPayload::Data { data, .. } => data.as_slice(),
                _ => return Err(Error::operation("put", "payload carries no data")),
            };
            let bytes = fs.write(&path, data).await?;
            Ok(OperationOutput::Written { path, bytes })
        }
        Operation::Delete => {
            fs.remove_file(&path).await?;
            Ok(OperationOutput::Deleted { path })
        }
        Operation::Mkdir => {
            fs.create_dir(&path).await?;
            Ok(OperationOutput::DirCreated { path })
        }
        Operation::Rmdir => {
            fs.remove_dir(&path).await?;
            Ok(OperationOutput::DirRemoved { path })
        }
    }
}

/// Join and normalise a remote POSIX path, the way `path.join` does.
pub fn join_remote(base: &str, name: &str) -> String {
    let joined = match (base.is_empty(), name.is_empty()) {
        (_, true) => base.to_string(),
        (true, false) => name.to_string(),
        (false, false) => format!("{}/{}", base, name),
    };
    normalize_remote(&joined)
}

fn normalize_remote(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|p| *p != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            s => parts.push(s),
        }
    }

    let body = parts.join("/");
    if absolute {
        format!("/{}", body)
    } else if body.is_empty() {
        ".".to_string()
    } else {
        body
    }
}
