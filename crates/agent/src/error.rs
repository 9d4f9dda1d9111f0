//! Agent error types.
//!
//! Every failure that aborts a run carries enough context to tell the
//! operator what to do next; see [`AgentError::guidance`]. Backup failures
//! are not part of this enum: the orchestrator logs and swallows them
//! (see [`crate::backup::BackupError`]).

use std::path::PathBuf;

use ssl_agent_config::ConfigError;
use thiserror::Error;

use crate::acme::TransportError;
use crate::keystore::KeyKind;

/// Result type for agent operations
pub type AgentResult<T> = Result<T, AgentError>;

/// Unrecoverable failures of a create / renew / info run
#[derive(Debug, Error)]
pub enum AgentError {
    /// Key file exists but cannot be read or parsed
    #[error("failed to load {kind} private key from {}: {reason}", .path.display())]
    KeyLoad {
        kind: KeyKind,
        path: PathBuf,
        reason: String,
    },

    /// Key file is absent where a strict load requires it
    #[error("{kind} private key not found at {}", .path.display())]
    KeyMissing { kind: KeyKind, path: PathBuf },

    /// Key generation or persistence failed
    #[error("failed to generate {kind} private key at {}: {reason}", .path.display())]
    KeyGeneration {
        kind: KeyKind,
        path: PathBuf,
        reason: String,
    },

    /// CA rejected the account registration
    #[error("registration with the CA failed: {0}")]
    Registration(#[source] TransportError),

    /// CA conversation failed while authorizing a domain
    #[error("authorization of {domain} failed: {source}")]
    Authorization {
        domain: String,
        #[source]
        source: TransportError,
    },

    /// Challenge file could not be placed under the web root
    #[error("failed to write challenge file {} for {domain}: {reason}", .path.display())]
    Challenge {
        domain: String,
        path: PathBuf,
        reason: String,
    },

    /// CA refused or failed to issue the certificate
    #[error("certificate issuance failed: {0}")]
    Issuance(#[source] TransportError),

    /// Issued certificate could not be written to disk
    #[error("failed to write {}: {source}", .path.display())]
    CertificateWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration is missing something the selected action needs
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl AgentError {
    /// Operator advice for fixing the failure and re-running
    pub fn guidance(&self) -> Option<String> {
        match self {
            AgentError::KeyLoad { kind, path, .. } => Some(format!(
                "The {kind} private key at {} is not a valid PEM private key. Restore it from a \
                 certs_<timestamp> backup, or delete it and run CREATE to start over with a new key.",
                path.display()
            )),
            AgentError::KeyMissing { kind, path } => Some(format!(
                "RENEW needs the {kind} private key from the original CREATE at {}. Restore the key \
                 file, or run CREATE to register and issue from scratch.",
                path.display()
            )),
            AgentError::KeyGeneration { path, .. } => Some(format!(
                "Check that {} is writable and that no file with that name is left over.",
                path.parent().unwrap_or(path.as_path()).display()
            )),
            AgentError::Registration(_) => Some(
                "Something went wrong registering with this key. You might want to try with a new \
                 private key: delete the account private key file and let the agent generate one. \
                 Or maybe you meant to RENEW with an existing private key?"
                    .to_string(),
            ),
            AgentError::Challenge { .. } => Some(
                "Check that the web document root is mounted read-write into the agent.".to_string(),
            ),
            AgentError::Issuance(_) => Some(
                "The CA refused to sign. Usually one of the domains failed verification; check \
                 that http://<domain>/.well-known/acme-challenge/ is served from the web document root."
                    .to_string(),
            ),
            AgentError::Config(ConfigError::Missing(var)) => Some(format!(
                "Set {var} in the environment (DOMAIN_NAMES is comma separated)."
            )),
            AgentError::Config(_)
            | AgentError::Authorization { .. }
            | AgentError::CertificateWrite { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_missing_names_path() {
        let err = AgentError::KeyMissing {
            kind: KeyKind::Account,
            path: PathBuf::from("/certs/acct_private_key.pem"),
        };
        assert_eq!(
            err.to_string(),
            "account private key not found at /certs/acct_private_key.pem"
        );
        assert!(err.guidance().unwrap().contains("RENEW"));
    }

    #[test]
    fn test_missing_variable_guidance() {
        let err = AgentError::from(ConfigError::Missing("CONTACT_EMAIL"));
        assert!(err.guidance().unwrap().contains("CONTACT_EMAIL"));
    }

    #[test]
    fn test_registration_guidance_suggests_new_key() {
        let err = AgentError::Registration(TransportError::Protocol("boom".to_string()));
        assert!(err.to_string().contains("boom"));
        assert!(err.guidance().unwrap().contains("delete the account private key"));
    }
}
