//! Private key and password resolution.
//!
//! Exactly one credential source is active per server configuration:
//! an explicit key file, the key file named by [`KEY_FILE_ENV`], an
//! in-memory key blob, or a password. An explicit key file that cannot be
//! read fails the setup; the environment key file falls back to the
//! password instead.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use russh::keys::{decode_secret_key, PrivateKey};

use crate::config::{non_empty, AuthMode, ServerConfig};
use crate::error::{Error, Result};

/// Environment variable naming a private key file, relative to the
/// installation root.
pub const KEY_FILE_ENV: &str = "SFTP_KEY_FILE";

/// Where a private key came from. Only used for diagnostics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeySource {
    File(PathBuf),
    EnvFile(PathBuf),
    Blob,
}

/// The credential that authenticates a session.
#[derive(Clone)]
pub enum Credentials {
    Password(String),
    PrivateKey {
        key: Arc<PrivateKey>,
        source: KeySource,
    },
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Password(_) => f.write_str("Password(<redacted>)"),
            Credentials::PrivateKey { source, .. } => f
                .debug_struct("PrivateKey")
                .field("source", source)
                .finish_non_exhaustive(),
        }
    }
}

pub struct KeyLoader {
    install_root: PathBuf,
    env_key_file: Option<String>,
}

impl KeyLoader {
    /// A loader that ignores the environment.
    pub fn new(install_root: impl Into<PathBuf>) -> Self {
        Self {
            install_root: install_root.into(),
            env_key_file: None,
        }
    }

    /// A loader that honours [`KEY_FILE_ENV`] if it is set.
    pub fn from_env(install_root: impl Into<PathBuf>) -> Self {
        let env_key_file = std::env::var(KEY_FILE_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty());
        Self {
            install_root: install_root.into(),
            env_key_file,
        }
    }

    pub fn with_env_key_file(mut self, relative: impl Into<String>) -> Self {
        self.env_key_file = Some(relative.into());
        self
    }

    /// Settle the credential for `config`. Called once at setup.
    pub fn load(&self, config: &ServerConfig) -> Result<Credentials> {
        let passphrase = non_empty(config.passphrase.as_deref());

        match config.auth_mode {
            AuthMode::Password => password_credentials(config),
            AuthMode::KeyFile => {
                if let Some(path) = non_empty(config.key_path.as_deref()) {
                    let path = PathBuf::from(path);
                    let text = std::fs::read_to_string(&path).map_err(|e| {
                        Error::config(format!(
                            "cannot read private key file {}: {}",
                            path.display(),
                            e
                        ))
                    })?;
                    let key = decode(&text, passphrase)?;
                    log::debug!("Loaded private key from {}", path.display());
                    return Ok(Credentials::PrivateKey {
                        key,
                        source: KeySource::File(path),
                    });
                }

                if let Some(relative) = self.env_key_file.as_deref() {
                    let path = self.install_root.join(relative);
                    match read_env_key(&path, passphrase) {
                        Ok(key) => {
                            log::debug!("Loaded private key from {}", path.display());
                            return Ok(Credentials::PrivateKey {
                                key,
                                source: KeySource::EnvFile(path),
                            });
                        }
                        Err(e) => {
                            log::warn!(
                                "Private key {} unusable ({}), falling back to password",
                                path.display(),
                                e
                            );
                            return password_credentials(config);
                        }
                    }
                }

                Err(Error::config("keyFile authentication selected but no key path configured"))
            }
            AuthMode::KeyData => {
                let blob = non_empty(config.key_blob.as_deref())
                    .ok_or_else(|| Error::config("keyData authentication selected but no stored key"))?;
                let key = decode(blob, passphrase)?;
                Ok(Credentials::PrivateKey {
                    key,
                    source: KeySource::Blob,
                })
            }
        }
    }
}

fn password_credentials(config: &ServerConfig) -> Result<Credentials> {
    non_empty(config.password.as_deref())
        .map(|p| Credentials::Password(p.to_string()))
        .ok_or_else(|| {
            Error::config("missing password; define it in the server configuration or select a key")
        })
}

fn read_env_key(path: &Path, passphrase: Option<&str>) -> Result<Arc<PrivateKey>> {
    let text = std::fs::read_to_string(path).map_err(|e| Error::config(e.to_string()))?;
    decode(&text, passphrase)
}

fn decode(text: &str, passphrase: Option<&str>) -> Result<Arc<PrivateKey>> {
    decode_secret_key(text, passphrase)
        .map(Arc::new)
        .map_err(|e| Error::config(format!("invalid private key: {}", e)))
}
