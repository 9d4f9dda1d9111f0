//! The ACME client capability consumed by the agent.
//!
//! Everything protocol-level (JWS, nonces, directory discovery, HTTP) lives
//! behind [`AcmeTransport`]. The production implementation is
//! [`Acme2Client`](super::Acme2Client); tests script their own.

use std::fmt;

use async_trait::async_trait;
use openssl::pkey::{PKey, Private};
use thiserror::Error;

use super::challenge::ACME_CHALLENGE_PREFIX;

/// Errors raised by an [`AcmeTransport`]
#[derive(Debug, Error)]
pub enum TransportError {
    /// Request failed at the protocol or network level (includes timeouts)
    #[error("ACME request failed: {0}")]
    Protocol(String),

    /// CA answered, but with something the agent cannot proceed from
    #[error("unexpected CA response: {0}")]
    UnexpectedState(String),

    /// Authorization offered no HTTP-01 challenge
    #[error("no http-01 challenge offered for {0}")]
    MissingChallenge(String),

    /// Local crypto failure (CSR, PEM encoding)
    #[error("crypto error: {0}")]
    Crypto(#[from] openssl::error::ErrorStack),
}

/// Authorization status as reported by the CA
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationStatus {
    Pending,
    Valid,
    Invalid,
}

impl AuthorizationStatus {
    /// Valid and Invalid end the poll loop
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AuthorizationStatus::Pending)
    }
}

impl fmt::Display for AuthorizationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AuthorizationStatus::Pending => "pending",
            AuthorizationStatus::Valid => "valid",
            AuthorizationStatus::Invalid => "invalid",
        })
    }
}

/// An HTTP-01 challenge the CA will fetch over plain HTTP
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Http01Challenge {
    /// Challenge token, the last path segment of the challenge URL
    pub token: String,
    /// Key authorization the file must contain
    pub key_authorization: String,
}

impl Http01Challenge {
    /// Path of the challenge file relative to the web document root
    pub fn file_name(&self) -> String {
        format!("{}{}", ACME_CHALLENGE_PREFIX.trim_start_matches('/'), self.token)
    }
}

/// Authorization of one domain, created at the start of verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainAuthorization {
    pub domain: String,
    pub status: AuthorizationStatus,
    /// Absent when the CA already holds a valid authorization
    pub challenge: Option<Http01Challenge>,
}

/// PEM output of a successful issuance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateBundle {
    /// Intermediates without the leaf
    pub chain_pem: Vec<u8>,
    /// Leaf certificate only
    pub leaf_pem: Vec<u8>,
    /// Leaf followed by the intermediates
    pub fullchain_pem: Vec<u8>,
}

/// Opaque ACME client capability
///
/// Calls are sequential; implementations may keep per-run state such as
/// pending authorizations between calls.
#[async_trait(?Send)]
pub trait AcmeTransport {
    /// Create (or look up) the account bound to `account_key`
    async fn register(
        &mut self,
        account_key: &PKey<Private>,
        contact_email: &str,
    ) -> Result<(), TransportError>;

    /// Request an authorization for a single domain
    async fn authorize(
        &mut self,
        account_key: &PKey<Private>,
        domain: &str,
    ) -> Result<DomainAuthorization, TransportError>;

    /// Tell the CA the challenge file is in place
    async fn request_verification(
        &mut self,
        authorization: &DomainAuthorization,
    ) -> Result<(), TransportError>;

    /// Re-fetch the authorization status
    async fn refresh_status(
        &mut self,
        authorization: &DomainAuthorization,
    ) -> Result<AuthorizationStatus, TransportError>;

    /// Submit a CSR for `domains` built from `certificate_key`
    async fn issue_certificate(
        &mut self,
        account_key: &PKey<Private>,
        domains: &[String],
        certificate_key: &PKey<Private>,
    ) -> Result<CertificateBundle, TransportError>;
}
