//! Transport seam: what the executor needs from an SSH/SFTP connection.
//!
//! [`session::RusshConnector`] is the production [`Connector`]; tests plug
//! in the in-memory implementation from `ssh::testing`.

pub mod session;
pub mod sftp;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ConnectSpec;
use crate::error::Result;

/// Kind of a remote directory entry, in `ls -l` notation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    #[serde(rename = "d")]
    Directory,
    #[serde(rename = "-")]
    File,
    #[serde(rename = "l")]
    Symlink,
}

/// Permission triplets as `rwx` strings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rights {
    pub user: String,
    pub group: String,
    pub other: String,
}

impl Rights {
    pub fn from_mode(mode: u32) -> Self {
        let triplet = |shift: u32| {
            let bits = (mode >> shift) & 0o7;
            [(0o4, 'r'), (0o2, 'w'), (0o1, 'x')]
                .iter()
                .filter(|(bit, _)| bits & bit != 0)
                .map(|(_, ch)| *ch)
                .collect::<String>()
        };
        Self {
            user: triplet(6),
            group: triplet(3),
            other: triplet(0),
        }
    }
}

/// A remote directory entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEntry {
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub name: String,
    pub size: u64,
    /// Milliseconds since the epoch.
    pub modify_time: Option<u64>,
    pub access_time: Option<u64>,
    pub rights: Option<Rights>,
    pub owner: Option<u32>,
    pub group: Option<u32>,
}

/// An authenticated SFTP session.
///
/// `close` is called exactly once by the session guard; implementations
/// should tear down both the SFTP channel and the SSH transport.
#[async_trait]
pub trait RemoteFs: Send {
    async fn list(&mut self, path: &str) -> Result<Vec<RemoteEntry>>;
    async fn read(&mut self, path: &str) -> Result<Vec<u8>>;
    async fn write(&mut self, path: &str, data: &[u8]) -> Result<u64>;
    async fn remove_file(&mut self, path: &str) -> Result<()>;
    async fn create_dir(&mut self, path: &str) -> Result<()>;
    async fn remove_dir(&mut self, path: &str) -> Result<()>;
    async fn close(&mut self) -> Result<()>;
}

/// Opens authenticated sessions.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, spec: &ConnectSpec) -> Result<Box<dyn RemoteFs>>;
}
