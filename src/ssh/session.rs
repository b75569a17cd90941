use std::borrow::Cow;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use russh::client::{self, KeyboardInteractiveAuthResponse};
use russh::keys::{ssh_key, PrivateKeyWithHashAlg};
use russh::{cipher, compression, kex, mac, Disconnect, Preferred};
use russh_sftp::client::SftpSession;

use super::sftp::RusshSftp;
use super::{Connector, RemoteFs};
use crate::config::{Algorithms, ConnectSpec};
use crate::error::{Error, Result};
use crate::keys::Credentials;

/// Upper bound on keyboard-interactive info-request rounds.
const MAX_KBD_ROUNDS: usize = 4;

/// Minimal SSH client handler.
pub(crate) struct SshHandler;

impl client::Handler for SshHandler {
    type Error = anyhow::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &ssh_key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        // Host keys are not pinned; algorithm lists only constrain negotiation.
        Ok(true)
    }
}

/// Opens russh sessions with the SFTP subsystem attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct RusshConnector;

#[async_trait]
impl Connector for RusshConnector {
    async fn connect(&self, spec: &ConnectSpec) -> Result<Box<dyn RemoteFs>> {
        let ssh_config = client::Config {
            preferred: preferred(&spec.algorithms)?,
            ..Default::default()
        };

        log::info!("Connecting to {} as {}", spec.addr(), spec.username);
        let mut handle = client::connect(
            Arc::new(ssh_config),
            (spec.host.as_str(), spec.port),
            SshHandler,
        )
        .await
        .map_err(|e| Error::connect(format!("{}: {}", spec.addr(), e)))?;

        // A half-open transport is torn down before the error propagates.
        let sftp = match open_sftp(&mut handle, spec).await {
            Ok(sftp) => sftp,
            Err(e) => {
                if let Err(de) = handle
                    .disconnect(Disconnect::ByApplication, "", "English")
                    .await
                {
                    log::warn!("Disconnect after failed setup: {}", de);
                }
                return Err(e);
            }
        };

        log::info!("SSH connected to {}", spec.addr());
        Ok(Box::new(RusshSftp::new(sftp, handle)))
    }
}

async fn open_sftp(handle: &mut client::Handle<SshHandler>, spec: &ConnectSpec) -> Result<SftpSession> {
    authenticate(handle, spec).await?;

    let channel = handle.channel_open_session().await.map_err(Error::connect)?;
    channel
        .request_subsystem(true, "sftp")
        .await
        .map_err(Error::connect)?;
    SftpSession::new(channel.into_stream())
        .await
        .map_err(|e| Error::connect(format!("sftp subsystem: {}", e)))
}

async fn authenticate(handle: &mut client::Handle<SshHandler>, spec: &ConnectSpec) -> Result<()> {
    let user = spec.username.as_str();
    let accepted = match &spec.credentials {
        Credentials::Password(password) => {
            let result = handle
                .authenticate_password(user, password)
                .await
                .map_err(Error::connect)?;
            if result.success() {
                true
            } else if spec.try_keyboard_interactive {
                log::debug!("Password rejected, trying keyboard-interactive");
                keyboard_interactive(handle, user, password).await?
            } else {
                false
            }
        }
        Credentials::PrivateKey { key, source } => {
            log::debug!("Authenticating with private key from {:?}", source);
            let hash_alg = handle
                .best_supported_rsa_hash()
                .await
                .map_err(Error::connect)?
                .flatten();
            handle
                .authenticate_publickey(user, PrivateKeyWithHashAlg::new(key.clone(), hash_alg))
                .await
                .map_err(Error::connect)?
                .success()
        }
    };

    if accepted {
        Ok(())
    } else {
        Err(Error::Connect(format!(
            "authentication failed for user {} on {}",
            user,
            spec.addr()
        )))
    }
}

/// Answer every prompt with the password.
async fn keyboard_interactive(
    handle: &mut client::Handle<SshHandler>,
    user: &str,
    password: &str,
) -> Result<bool> {
    let mut response = handle
        .authenticate_keyboard_interactive_start(user, None::<String>)
        .await
        .map_err(Error::connect)?;

    for _ in 0..MAX_KBD_ROUNDS {
        match response {
            KeyboardInteractiveAuthResponse::Success => return Ok(true),
            KeyboardInteractiveAuthResponse::Failure { .. } => return Ok(false),
            KeyboardInteractiveAuthResponse::InfoRequest { prompts, .. } => {
                let answers = prompts.iter().map(|_| password.to_string()).collect();
                response = handle
                    .authenticate_keyboard_interactive_respond(answers)
                    .await
                    .map_err(Error::connect)?;
            }
        }
    }
    Ok(false)
}

/// Translate the resolved name lists into russh negotiation preferences.
///
/// Names russh does not implement are skipped; a category left empty is a
/// configuration error.
pub(crate) fn preferred(algorithms: &Algorithms) -> Result<Preferred> {
    let mut preferred = Preferred::default();
    preferred.kex = Cow::Owned(supported("kex", &algorithms.kex, |n| {
        kex::Name::try_from(n).ok()
    })?);
    preferred.key = Cow::Owned(supported(
        "serverHostKey",
        &algorithms.server_host_key,
        |n| ssh_key::Algorithm::from_str(n).ok(),
    )?);
    preferred.cipher = Cow::Owned(supported("cipher", &algorithms.cipher, |n| {
        cipher::Name::try_from(n).ok()
    })?);
    preferred.mac = Cow::Owned(supported("hmac", &algorithms.hmac, |n| {
        mac::Name::try_from(n).ok()
    })?);
    preferred.compression = Cow::Owned(supported("compress", &algorithms.compress, |n| {
        compression::Name::try_from(n).ok()
    })?);
    Ok(preferred)
}

fn supported<T>(category: &str, names: &[String], parse: impl Fn(&str) -> Option<T>) -> Result<Vec<T>> {
    let mut out = Vec::with_capacity(names.len());
    for name in names {
        match parse(name.as_str()) {
            Some(alg) => out.push(alg),
            None => log::debug!("Skipping unsupported {} algorithm {}", category, name),
        }
    }
    if out.is_empty() {
        return Err(Error::config(format!(
            "no supported {} algorithm in [{}]",
            category,
            names.join(",")
        )));
    }
    Ok(out)
}
