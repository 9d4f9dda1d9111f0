//! SSL Agent
//!
//! Obtains and renews domain-validated TLS certificates from an ACME CA using
//! HTTP-01 challenges served by an existing web server, and manages the
//! account and certificate keys on disk.
//!
//! # Modules
//!
//! - [`keystore`] - account and certificate private keys
//! - [`backup`] - timestamped copies of certificate files before a write
//! - [`acme`] - CA session, challenge files and domain verification
//! - [`storage`] - certificate file layout in the certs directory
//! - [`orchestrator`] - the create / renew / info runs
//! - [`summary`] - operator-facing report of the certs directory

pub mod acme;
pub mod backup;
pub mod error;
pub mod keystore;
pub mod orchestrator;
pub mod storage;
pub mod summary;

pub use acme::{Acme2Client, AcmeTransport, PollPolicy, VerificationOutcome};
pub use backup::{BackupError, BackupManager, BackupSnapshot};
pub use error::{AgentError, AgentResult};
pub use keystore::{KeyKind, KeyMaterial, KeyStore};
pub use orchestrator::{Action, CertificateAgent, RunReport};
pub use storage::CertificateStorage;
pub use summary::Summary;
