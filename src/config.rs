//! Stored server configuration and per-request option resolution.
//!
//! Every field resolves as: request override, then stored value, then a
//! hard-coded default. Resolution always produces a fresh [`ConnectSpec`];
//! the stored [`ServerConfig`] is never written back to.

use std::fmt;

use serde::{Deserialize, Deserializer};

use crate::error::{Error, Result};
use crate::keys::Credentials;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 22;

pub const DEFAULT_KEX: &str = "ecdh-sha2-nistp256,ecdh-sha2-nistp384,ecdh-sha2-nistp521,diffie-hellman-group-exchange-sha256,diffie-hellman-group14-sha1";
pub const DEFAULT_CIPHER: &str = "aes128-ctr,aes192-ctr,aes256-ctr,aes128-gcm,aes128-gcm@openssh.com,aes256-gcm,aes256-gcm@openssh.com";
pub const DEFAULT_SERVER_HOST_KEY: &str = "ssh-rsa,ecdsa-sha2-nistp256,ecdsa-sha2-nistp384,ecdsa-sha2-nistp521";
pub const DEFAULT_HMAC: &str = "hmac-sha2-256,hmac-sha2-512,hmac-sha1";
pub const DEFAULT_COMPRESS: &str = "none,zlib@openssh.com,zlib";

/// Which credential is authoritative at connect time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuthMode {
    #[default]
    Password,
    KeyFile,
    KeyData,
}

/// Comma-separated algorithm override strings, as typed into a setup form.
///
/// Accepts both the camelCase names and the flat `algorithms_*` names.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AlgorithmOverrides {
    #[serde(alias = "algorithms_kex")]
    pub kex: Option<String>,
    #[serde(alias = "algorithms_cipher")]
    pub cipher: Option<String>,
    #[serde(alias = "algorithms_serverHostKey")]
    pub server_host_key: Option<String>,
    #[serde(alias = "algorithms_hmac")]
    pub hmac: Option<String>,
    #[serde(alias = "algorithms_compress")]
    pub compress: Option<String>,
}

/// Server configuration captured at setup time.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    pub host: String,
    #[serde(deserialize_with = "stored_port")]
    pub port: u16,
    pub auth_mode: AuthMode,
    pub username: Option<String>,
    pub password: Option<String>,
    pub key_path: Option<String>,
    pub key_blob: Option<String>,
    pub passphrase: Option<String>,
    pub try_keyboard_interactive: bool,
    #[serde(flatten)]
    pub algorithms: AlgorithmOverrides,
}

/// A port given as a number or a numeric string. Blank strings and null
/// count as unset.
pub(crate) fn port_from_any<'de, D: Deserializer<'de>>(
    d: D,
) -> std::result::Result<Option<u16>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Num(u16),
        Text(String),
    }

    match Option::<Port>::deserialize(d)? {
        None => Ok(None),
        Some(Port::Num(n)) => Ok(Some(n)),
        Some(Port::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(Port::Text(s)) => s.trim().parse().map(Some).map_err(serde::de::Error::custom),
    }
}

fn stored_port<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<u16, D::Error> {
    Ok(port_from_any(d)?.filter(|p| *p != 0).unwrap_or(DEFAULT_PORT))
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            auth_mode: AuthMode::Password,
            username: None,
            password: None,
            key_path: None,
            key_blob: None,
            passphrase: None,
            try_keyboard_interactive: false,
            algorithms: AlgorithmOverrides::default(),
        }
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("auth_mode", &self.auth_mode)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("key_path", &self.key_path)
            .field("key_blob", &self.key_blob.as_ref().map(|_| "<redacted>"))
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .field("try_keyboard_interactive", &self.try_keyboard_interactive)
            .field("algorithms", &self.algorithms)
            .finish()
    }
}

impl ServerConfig {
    /// Setup-time checks that do not depend on any request.
    pub fn validate(&self) -> Result<()> {
        if non_empty(self.username.as_deref()).is_none() {
            return Err(Error::config(
                "missing username; define it in the server configuration",
            ));
        }
        Ok(())
    }
}

/// Connection fields a single request may override.
#[derive(Clone, Default)]
pub struct RequestOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub algorithms: AlgorithmOverrides,
}

impl fmt::Debug for RequestOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOverrides")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("algorithms", &self.algorithms)
            .finish()
    }
}

/// Ordered negotiation lists, one per algorithm category.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Algorithms {
    pub kex: Vec<String>,
    pub cipher: Vec<String>,
    pub server_host_key: Vec<String>,
    pub hmac: Vec<String>,
    pub compress: Vec<String>,
}

impl Default for Algorithms {
    fn default() -> Self {
        Self {
            kex: split_list(DEFAULT_KEX),
            cipher: split_list(DEFAULT_CIPHER),
            server_host_key: split_list(DEFAULT_SERVER_HOST_KEY),
            hmac: split_list(DEFAULT_HMAC),
            compress: split_list(DEFAULT_COMPRESS),
        }
    }
}

/// A fully resolved, request-scoped connection specification.
#[derive(Clone)]
pub struct ConnectSpec {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub credentials: Credentials,
    pub try_keyboard_interactive: bool,
    pub algorithms: Algorithms,
}

impl ConnectSpec {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for ConnectSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectSpec")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("credentials", &self.credentials)
            .field("try_keyboard_interactive", &self.try_keyboard_interactive)
            .field("algorithms", &self.algorithms)
            .finish()
    }
}

/// Merge request overrides over the stored configuration.
///
/// `credentials` are the ones the key loader settled on at setup; a
/// request password only replaces a password credential, never a key.
pub fn resolve(
    stored: &ServerConfig,
    credentials: &Credentials,
    overrides: &RequestOverrides,
) -> Result<ConnectSpec> {
    let host = non_empty(overrides.host.as_deref())
        .or_else(|| non_empty(Some(stored.host.as_str())))
        .unwrap_or(DEFAULT_HOST)
        .to_string();

    let port = overrides
        .port
        .filter(|p| *p != 0)
        .or(Some(stored.port).filter(|p| *p != 0))
        .unwrap_or(DEFAULT_PORT);

    let username = non_empty(overrides.user.as_deref())
        .or_else(|| non_empty(stored.username.as_deref()))
        .ok_or_else(|| Error::config("missing username"))?
        .to_string();

    let credentials = match credentials {
        Credentials::Password(stored_pw) => {
            let password = non_empty(overrides.password.as_deref())
                .or_else(|| non_empty(Some(stored_pw.as_str())))
                .ok_or_else(|| Error::config("missing password and no key material configured"))?;
            Credentials::Password(password.to_string())
        }
        other => other.clone(),
    };

    let req = &overrides.algorithms;
    let cfg = &stored.algorithms;
    let algorithms = Algorithms {
        kex: pick_list(&req.kex, &cfg.kex, DEFAULT_KEX),
        cipher: pick_list(&req.cipher, &cfg.cipher, DEFAULT_CIPHER),
        server_host_key: pick_list(
            &req.server_host_key,
            &cfg.server_host_key,
            DEFAULT_SERVER_HOST_KEY,
        ),
        hmac: pick_list(&req.hmac, &cfg.hmac, DEFAULT_HMAC),
        compress: pick_list(&req.compress, &cfg.compress, DEFAULT_COMPRESS),
    };

    Ok(ConnectSpec {
        host,
        port,
        username,
        credentials,
        try_keyboard_interactive: stored.try_keyboard_interactive,
        algorithms,
    })
}

/// Split a comma-separated algorithm string, keeping order.
pub fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn pick_list(request: &Option<String>, stored: &Option<String>, default: &str) -> Vec<String> {
    [request.as_deref(), stored.as_deref()]
        .into_iter()
        .flatten()
        .map(split_list)
        .find(|list| !list.is_empty())
        .unwrap_or_else(|| split_list(default))
}

pub(crate) fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored() -> ServerConfig {
        ServerConfig {
            host: "sftp.internal".to_string(),
            port: 2222,
            username: Some("deploy".to_string()),
            password: Some("stored-pw".to_string()),
            ..Default::default()
        }
    }

    fn pw(s: &str) -> Credentials {
        Credentials::Password(s.to_string())
    }

    #[test]
    fn test_resolve_uses_stored_values() {
        let spec = resolve(&stored(), &pw("stored-pw"), &RequestOverrides::default()).unwrap();
        assert_eq!(spec.addr(), "sftp.internal:2222");
        assert_eq!(spec.username, "deploy");
        assert!(matches!(spec.credentials, Credentials::Password(ref p) if p == "stored-pw"));
        assert_eq!(spec.algorithms, Algorithms::default());
    }

    #[test]
    fn test_resolve_request_overrides_win() {
        let overrides = RequestOverrides {
            host: Some("other.host".to_string()),
            port: Some(22022),
            user: Some("alice".to_string()),
            password: Some("request-pw".to_string()),
            algorithms: AlgorithmOverrides {
                kex: Some("curve25519-sha256, diffie-hellman-group14-sha256".to_string()),
                ..Default::default()
            },
        };
        let spec = resolve(&stored(), &pw("stored-pw"), &overrides).unwrap();
        assert_eq!(spec.host, "other.host");
        assert_eq!(spec.port, 22022);
        assert_eq!(spec.username, "alice");
        assert!(matches!(spec.credentials, Credentials::Password(ref p) if p == "request-pw"));
        assert_eq!(
            spec.algorithms.kex,
            vec!["curve25519-sha256", "diffie-hellman-group14-sha256"]
        );
        assert_eq!(spec.algorithms.cipher, split_list(DEFAULT_CIPHER));
    }

    #[test]
    fn test_resolve_does_not_mutate_stored() {
        let config = stored();
        let overrides = RequestOverrides {
            host: Some("elsewhere".to_string()),
            ..Default::default()
        };
        resolve(&config, &pw("stored-pw"), &overrides).unwrap();
        let again = resolve(&config, &pw("stored-pw"), &RequestOverrides::default()).unwrap();
        assert_eq!(again.host, "sftp.internal");
        assert_eq!(config.host, "sftp.internal");
    }

    #[test]
    fn test_resolve_falls_back_to_defaults() {
        let config = ServerConfig {
            host: String::new(),
            port: 0,
            username: Some("u".to_string()),
            algorithms: AlgorithmOverrides {
                hmac: Some(" , ".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let spec = resolve(&config, &pw("x"), &RequestOverrides::default()).unwrap();
        assert_eq!(spec.host, DEFAULT_HOST);
        assert_eq!(spec.port, DEFAULT_PORT);
        assert_eq!(spec.algorithms.hmac, vec!["hmac-sha2-256", "hmac-sha2-512", "hmac-sha1"]);
        assert_eq!(spec.algorithms.compress, vec!["none", "zlib@openssh.com", "zlib"]);
    }

    #[test]
    fn test_resolve_missing_username() {
        let config = ServerConfig {
            username: None,
            ..stored()
        };
        let err = resolve(&config, &pw("x"), &RequestOverrides::default()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolve_missing_password() {
        let err = resolve(&stored(), &pw(""), &RequestOverrides::default()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_deserialize_legacy_algorithm_names() {
        let json = r#"{
            "host": "h",
            "port": 2022,
            "authMode": "keyData",
            "username": "u",
            "tryKeyboardInteractive": true,
            "algorithms_kex": "diffie-hellman-group14-sha1",
            "serverHostKey": "ssh-ed25519"
        }"#;
        let config: ServerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.auth_mode, AuthMode::KeyData);
        assert!(config.try_keyboard_interactive);
        assert_eq!(config.algorithms.kex.as_deref(), Some("diffie-hellman-group14-sha1"));
        assert_eq!(config.algorithms.server_host_key.as_deref(), Some("ssh-ed25519"));
    }

    #[test]
    fn test_deserialize_defaults() {
        let config: ServerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.auth_mode, AuthMode::Password);
    }

    #[test]
    fn test_deserialize_port_as_text() {
        let config: ServerConfig =
            serde_json::from_str(r#"{"host":"h","port":"2222","username":"u","password":"p"}"#).unwrap();
        assert_eq!(config.port, 2222);

        let config: ServerConfig = serde_json::from_str(r#"{"port":""}"#).unwrap();
        assert_eq!(config.port, DEFAULT_PORT);

        let config: ServerConfig = serde_json::from_str(r#"{"port":0}"#).unwrap();
        assert_eq!(config.port, DEFAULT_PORT);

        assert!(serde_json::from_str::<ServerConfig>(r#"{"port":"ssh"}"#).is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let out = format!("{:?}", stored());
        assert!(!out.contains("stored-pw"));
        assert!(out.contains("<redacted>"));
    }
}
