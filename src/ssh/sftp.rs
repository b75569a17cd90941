use async_trait::async_trait;
use russh::client;
use russh::Disconnect;
use russh_sftp::client::fs::DirEntry;
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::OpenFlags;
use tokio::io::AsyncWriteExt;

use super::session::SshHandler;
use super::{EntryKind, RemoteEntry, RemoteFs, Rights};
use crate::error::{Error, Result};

/// SFTP operations over an authenticated russh session.
pub struct RusshSftp {
    sftp: SftpSession,
    handle: client::Handle<SshHandler>,
}

impl RusshSftp {
    pub(crate) fn new(sftp: SftpSession, handle: client::Handle<SshHandler>) -> Self {
        Self { sftp, handle }
    }
}

fn sftp_error(operation: &str, path: &str, e: impl std::fmt::Display) -> Error {
    Error::operation(operation, format!("{}: {}", path, e))
}

fn entry_from(entry: DirEntry) -> RemoteEntry {
    let attrs = entry.metadata();
    let file_type = entry.file_type();
    let kind = if file_type.is_dir() {
        EntryKind::Directory
    } else if file_type.is_symlink() {
        EntryKind::Symlink
    } else {
        EntryKind::File
    };

    RemoteEntry {
        kind,
        name: entry.file_name(),
        size: attrs.size.unwrap_or(0),
        modify_time: attrs.mtime.map(|t| t as u64 * 1000),
        access_time: attrs.atime.map(|t| t as u64 * 1000),
        rights: attrs.permissions.map(Rights::from_mode),
        owner: attrs.uid,
        group: attrs.gid,
    }
}

#[async_trait]
impl RemoteFs for RusshSftp {
    async fn list(&mut self, path: &str) -> Result<Vec<RemoteEntry>> {
        let dir = self
            .sftp
            .read_dir(path)
            .await
            .map_err(|e| sftp_error("list", path, e))?;

        // Server order is preserved.
        Ok(dir
            .into_iter()
            .filter(|e| e.file_name() != "." && e.file_name() != "..")
            .map(entry_from)
            .collect())
    }

    async fn read(&mut self, path: &str) -> Result<Vec<u8>> {
        let data = self
            .sftp
            .read(path)
            .await
            .map_err(|e| sftp_error("get", path, e))?;
        log::info!("Downloaded {} ({} bytes)", path, data.len());
        Ok(data)
    }

    async fn write(&mut self, path: &str, data: &[u8]) -> Result<u64> {
        let mut file = self
            .sftp
            .open_with_flags(path, OpenFlags::CREATE | OpenFlags::TRUNCATE | OpenFlags::WRITE)
            .await
            .map_err(|e| sftp_error("put", path, e))?;

        file.write_all(data).await.map_err(|e| sftp_error("put", path, e))?;
        file.flush().await.map_err(|e| sftp_error("put", path, e))?;
        file.shutdown().await.map_err(|e| sftp_error("put", path, e))?;

        log::info!("Uploaded {} bytes to {}", data.len(), path);
        Ok(data.len() as u64)
    }

    async fn remove_file(&mut self, path: &str) -> Result<()> {
        self.sftp
            .remove_file(path)
            .await
            .map_err(|e| sftp_error("delete", path, e))
    }

    async fn create_dir(&mut self, path: &str) -> Result<()> {
        self.sftp
            .create_dir(path)
            .await
            .map_err(|e| sftp_error("mkdir", path, e))
    }

    async fn remove_dir(&mut self, path: &str) -> Result<()> {
        self.sftp
            .remove_dir(path)
            .await
            .map_err(|e| sftp_error("rmdir", path, e))
    }

    async fn close(&mut self) -> Result<()> {
        let sftp_closed = self.sftp.close().await;
        let disconnected = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "English")
            .await;

        sftp_closed.map_err(|e| Error::connect(format!("closing sftp channel: {}", e)))?;
        disconnected.map_err(|e| Error::connect(format!("disconnecting: {}", e)))?;
        log::info!("SSH disconnected");
        Ok(())
    }
}
