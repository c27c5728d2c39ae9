use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{DeployError, DeployResult};
use crate::vars;

/// How the target authenticates SSH sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    Password,
    PrivateKey,
}

/// A stored remote-host descriptor.
///
/// Created and updated by the external configuration UI; read-only
/// here. Credential fields hold ciphertext produced by
/// [`SecretCodec`](crate::SecretCodec) — exactly one of them is
/// populated, matching `auth_mode`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VpsTarget {
    pub id: String,
    pub host: String,
    pub username: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub auth_mode: AuthMode,
    #[serde(default)]
    pub encrypted_password: Option<String>,
    #[serde(default)]
    pub encrypted_private_key: Option<String>,
    /// Pinned SSH host key in `known_hosts` key format
    /// (`ssh-ed25519 AAAA...`). When present, sessions verify the host
    /// against it and fail closed; when absent, the host is trusted on
    /// first use with a logged warning.
    #[serde(default)]
    pub host_key: Option<String>,
}

const fn default_port() -> u16 {
    22
}

impl VpsTarget {
    /// Check the stored-credential invariant before any remote work.
    pub fn validate(&self) -> DeployResult<()> {
        if self.host.is_empty() {
            return Err(DeployError::InvalidTarget("host is empty".into()));
        }
        if self.username.is_empty() {
            return Err(DeployError::InvalidTarget("username is empty".into()));
        }

        match (
            self.auth_mode,
            &self.encrypted_password,
            &self.encrypted_private_key,
        ) {
            (AuthMode::Password, Some(_), None) | (AuthMode::PrivateKey, None, Some(_)) => Ok(()),
            (AuthMode::Password, None, _) => Err(DeployError::InvalidTarget(
                "auth mode is password but no password is stored".into(),
            )),
            (AuthMode::PrivateKey, _, None) => Err(DeployError::InvalidTarget(
                "auth mode is private key but no key is stored".into(),
            )),
            _ => Err(DeployError::InvalidTarget(
                "both password and private key are stored".into(),
            )),
        }
    }

    /// The encrypted credential matching `auth_mode`. Call
    /// [`validate`](Self::validate) first.
    #[must_use]
    pub fn stored_credential(&self) -> Option<&str> {
        match self.auth_mode {
            AuthMode::Password => self.encrypted_password.as_deref(),
            AuthMode::PrivateKey => self.encrypted_private_key.as_deref(),
        }
    }
}

/// A decrypted credential. Exists only for the duration of one
/// deployment run; `Debug` never prints the payload.
#[derive(Clone)]
pub enum Credential {
    Password(String),
    PrivateKey(String),
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Password(_) => f.write_str("Credential::Password(<redacted>)"),
            Self::PrivateKey(_) => f.write_str("Credential::PrivateKey(<redacted>)"),
        }
    }
}

/// Derive a usable domain from the target host: a hostname is used
/// as-is (port stripped), a bare IPv4 address falls back to the
/// default domain the operator is expected to override.
#[must_use]
pub fn extract_domain_from_host(host: &str) -> String {
    let bare = host.split(':').next().unwrap_or(host);
    if bare.contains('.') && !is_ipv4(bare) {
        return bare.to_string();
    }
    vars::DEFAULT_DOMAIN.to_string()
}

fn is_ipv4(host: &str) -> bool {
    let octets: Vec<&str> = host.split('.').collect();
    octets.len() == 4 && octets.iter().all(|o| o.parse::<u8>().is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(mode: AuthMode, pw: Option<&str>, key: Option<&str>) -> VpsTarget {
        VpsTarget {
            id: "t1".into(),
            host: "vps.example.net".into(),
            username: "root".into(),
            port: 22,
            auth_mode: mode,
            encrypted_password: pw.map(String::from),
            encrypted_private_key: key.map(String::from),
            host_key: None,
        }
    }

    #[test]
    fn exactly_one_credential_is_valid() {
        assert!(target(AuthMode::Password, Some("c"), None).validate().is_ok());
        assert!(
            target(AuthMode::PrivateKey, None, Some("c"))
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn mismatched_credential_rejected() {
        assert!(target(AuthMode::Password, None, Some("c")).validate().is_err());
        assert!(
            target(AuthMode::PrivateKey, Some("c"), None)
                .validate()
                .is_err()
        );
        assert!(
            target(AuthMode::Password, Some("a"), Some("b"))
                .validate()
                .is_err()
        );
    }

    #[test]
    fn serde_defaults_port() {
        let t: VpsTarget = serde_json::from_str(
            r#"{
                "id": "t1",
                "host": "1.2.3.4",
                "username": "root",
                "auth_mode": "password",
                "encrypted_password": "abc"
            }"#,
        )
        .unwrap();
        assert_eq!(t.port, 22);
        assert_eq!(t.auth_mode, AuthMode::Password);
    }

    #[test]
    fn domain_from_hostname() {
        assert_eq!(extract_domain_from_host("vps.x.io"), "vps.x.io");
        assert_eq!(extract_domain_from_host("vps.x.io:2222"), "vps.x.io");
    }

    #[test]
    fn ipv4_falls_back_to_default_domain() {
        assert_eq!(extract_domain_from_host("203.0.113.9"), vars::DEFAULT_DOMAIN);
        assert_eq!(extract_domain_from_host("localhost"), vars::DEFAULT_DOMAIN);
    }

    #[test]
    fn credential_debug_is_redacted() {
        let dbg = format!("{:?}", Credential::Password("hunter2".into()));
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("redacted"));
    }
}
