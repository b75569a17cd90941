//! Session lifecycle: acquire, hand out, release exactly once.
//!
//! In [`Deployment::Shared`] mode a single session slot serves every
//! request; a second `acquire` while the slot is held fails with
//! [`Error::Busy`] instead of waiting.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::config::ConnectSpec;
use crate::error::{Error, Result};
use crate::ssh::{Connector, RemoteFs};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Deployment {
    /// Every request gets its own session; requests never contend.
    #[default]
    PerRequest,
    /// One session slot shared by all requests, busy-rejecting.
    Shared,
}

pub struct SessionManager {
    connector: Arc<dyn Connector>,
    slot: Option<Arc<Mutex<()>>>,
    connect_timeout: Duration,
}

impl SessionManager {
    pub fn new(connector: Arc<dyn Connector>, deployment: Deployment, connect_timeout: Duration) -> Self {
        let slot = match deployment {
            Deployment::Shared => Some(Arc::new(Mutex::new(()))),
            Deployment::PerRequest => None,
        };
        Self {
            connector,
            slot,
            connect_timeout,
        }
    }

    pub fn deployment(&self) -> Deployment {
        if self.slot.is_some() {
            Deployment::Shared
        } else {
            Deployment::PerRequest
        }
    }

    /// Whether a shared session is currently held.
    pub fn is_busy(&self) -> bool {
        self.slot.as_ref().is_some_and(|slot| slot.try_lock().is_err())
    }

    /// Connect and authenticate. Rejects immediately with `Busy` when the
    /// shared slot is taken; nothing touches the network in that case.
    pub async fn acquire(&self, spec: &ConnectSpec) -> Result<SessionGuard> {
        let permit = match &self.slot {
            Some(slot) => Some(slot.clone().try_lock_owned().map_err(|_| Error::Busy)?),
            None => None,
        };

        let fs = tokio::time::timeout(self.connect_timeout, self.connector.connect(spec))
            .await
            .map_err(|_| {
                Error::Connect(format!(
                    "timed out after {}s connecting to {}",
                    self.connect_timeout.as_secs_f32(),
                    spec.addr()
                ))
            })??;

        Ok(SessionGuard {
            fs: Some(fs),
            _permit: permit,
        })
    }
}

/// A held session. Call [`SessionGuard::release`] on every path; dropping
/// an unreleased guard closes the session in the background.
pub struct SessionGuard {
    fs: Option<Box<dyn RemoteFs>>,
    _permit: Option<OwnedMutexGuard<()>>,
}

impl SessionGuard {
    pub fn fs(&mut self) -> Result<&mut dyn RemoteFs> {
        match self.fs.as_mut() {
            Some(fs) => Ok(fs.as_mut()),
            None => Err(Error::Connect("session already released".to_string())),
        }
    }

    /// Close the session. Consumes the guard, so it runs at most once.
    pub async fn release(mut self) -> Result<()> {
        match self.fs.take() {
            Some(mut fs) => fs.close().await,
            None => Ok(()),
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let Some(mut fs) = self.fs.take() else {
            return;
        };
        log::warn!("Session dropped without release, closing in background");
        match tokio::runtime::Handle::try_current() {
            Ok(rt) => {
                rt.spawn(async move {
                    if let Err(e) = fs.close().await {
                        log::warn!("Background session close failed: {}", e);
                    }
                });
            }
            Err(_) => log::warn!("No runtime to close session on; transport dropped"),
        }
    }
}
