//! Certificate lifecycle: create, renew and info runs
//!
//! ```text
//! create: environment ─► obtain keys ─► register ─► verify domains ─► backup ─► issue ─► write ─► summary
//! renew:  environment ─► load keys ──────────────► verify domains ─► backup ─► issue ─► write ─► summary
//! info:   environment ─► summary
//! ```
//!
//! Progress is logged through `tracing`; the environment banner and the
//! summary are printed for the operator.

use std::fmt;
use std::path::PathBuf;

use openssl::pkey::{PKey, Private};
use ssl_agent_config::AgentConfig;
use tracing::{info, warn};

use crate::acme::{
    AcmeSession, AcmeTransport, ChallengeWriter, DomainVerifier, PollPolicy, VerificationReport,
};
use crate::backup::{BackupManager, BackupSnapshot};
use crate::error::AgentResult;
use crate::keystore::{KeyKind, KeyStore};
use crate::storage::CertificateStorage;
use crate::summary::{heading, Summary};

/// What the agent was asked to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Report configuration and file presence only
    Info,
    /// Register a new account and issue a first certificate
    Create,
    /// Issue a new certificate with the existing keys
    Renew,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Info => "info",
            Action::Create => "create",
            Action::Renew => "renew",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a successful run did
#[derive(Debug, Clone)]
pub struct RunReport {
    pub action: Action,
    pub directory_url: String,
    pub verifications: Vec<VerificationReport>,
    /// Absent for info runs and when the backup failed
    pub backup: Option<BackupSnapshot>,
    pub written_files: Vec<PathBuf>,
    pub summary: Summary,
}

impl RunReport {
    fn new(action: Action, directory_url: &str, summary: Summary) -> Self {
        Self {
            action,
            directory_url: directory_url.to_string(),
            verifications: Vec::new(),
            backup: None,
            written_files: Vec::new(),
            summary,
        }
    }
}

/// Runs one action against the CA and the local filesystem
///
/// All run state (cached keys, the CA session, the endpoint) lives here; one
/// instance serves one run.
pub struct CertificateAgent<T> {
    config: AgentConfig,
    keys: KeyStore,
    storage: CertificateStorage,
    backups: BackupManager,
    verifier: DomainVerifier,
    session: AcmeSession<T>,
}

impl<T: AcmeTransport> CertificateAgent<T> {
    pub fn new(config: AgentConfig, transport: T) -> Self {
        let storage = CertificateStorage::new(config.certs_dir.clone(), config.files.clone());
        let keys = KeyStore::new(storage.clone());
        let backups = BackupManager::new(config.certs_dir.clone());
        let verifier = DomainVerifier::new(
            ChallengeWriter::new(config.web_doc_root.clone()),
            PollPolicy::default(),
        );

        Self {
            config,
            keys,
            storage,
            backups,
            verifier,
            session: AcmeSession::new(transport),
        }
    }

    /// Replace the authorization polling schedule
    pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.verifier = DomainVerifier::new(
            ChallengeWriter::new(self.config.web_doc_root.clone()),
            policy,
        );
        self
    }

    /// Override the RSA size of generated keys
    pub fn with_key_bits(mut self, key_bits: u32) -> Self {
        self.keys = KeyStore::new(self.storage.clone()).with_key_bits(key_bits);
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn keys(&self) -> &KeyStore {
        &self.keys
    }

    pub fn transport(&self) -> &T {
        self.session.transport()
    }

    /// Current state of the certs directory
    pub fn summary(&self, include_notes: bool) -> Summary {
        Summary::collect(&self.storage, include_notes)
    }

    /// Run `action` to completion
    pub async fn run(&mut self, action: Action) -> AgentResult<RunReport> {
        info!(action = %action, "Starting run");
        match action {
            Action::Info => Ok(self.info()),
            Action::Create => self.create().await,
            Action::Renew => self.renew().await,
        }
    }

    /// Report the environment and which files exist
    pub fn info(&self) -> RunReport {
        self.print_environment();
        let summary = self.summary(false);
        println!("{summary}");
        RunReport::new(Action::Info, self.config.directory_url(), summary)
    }

    /// First-time issuance: keys are generated if absent, then registered
    pub async fn create(&mut self) -> AgentResult<RunReport> {
        self.print_environment();
        let domains = self.config.require_domains()?.to_vec();
        let contact_email = self.config.require_contact_email()?.to_string();

        let account_key = self.keys.obtain_key(KeyKind::Account)?.key.clone();
        let certificate_key = self.keys.obtain_key(KeyKind::Certificate)?.key.clone();

        self.session.register(&account_key, &contact_email).await?;

        self.issue(Action::Create, &account_key, &certificate_key, &domains)
            .await
    }

    /// Re-issuance with the keys from an earlier create
    pub async fn renew(&mut self) -> AgentResult<RunReport> {
        self.print_environment();
        let domains = self.config.require_domains()?.to_vec();

        info!("Loading existing private keys");
        let account_key = self.keys.load_key(KeyKind::Account)?.key.clone();
        let certificate_key = self.keys.load_key(KeyKind::Certificate)?.key.clone();

        self.issue(Action::Renew, &account_key, &certificate_key, &domains)
            .await
    }

    /// Shared tail of create and renew
    async fn issue(
        &mut self,
        action: Action,
        account_key: &PKey<Private>,
        certificate_key: &PKey<Private>,
        domains: &[String],
    ) -> AgentResult<RunReport> {
        let verifications = self.verify_domains(account_key, domains).await?;
        let backup = self.backup();

        let bundle = self
            .session
            .issue_certificate(account_key, domains, certificate_key)
            .await?;
        info!("Writing certificate files");
        let written_files = self.storage.save_bundle(&bundle)?;

        let summary = self.summary(true);
        println!("{summary}");

        Ok(RunReport {
            verifications,
            backup,
            written_files,
            ..RunReport::new(action, self.config.directory_url(), summary)
        })
    }

    async fn verify_domains(
        &mut self,
        account_key: &PKey<Private>,
        domains: &[String],
    ) -> AgentResult<Vec<VerificationReport>> {
        let mut reports = Vec::with_capacity(domains.len());
        for domain in domains {
            let report = self
                .verifier
                .verify(&mut self.session, account_key, domain)
                .await?;
            if !report.outcome.is_valid() {
                warn!(
                    domain = %domain,
                    outcome = ?report.outcome,
                    "Domain not verified, issuance will likely fail"
                );
            }
            reports.push(report);
        }
        Ok(reports)
    }

    /// Best effort; a failed backup never stops the run
    fn backup(&self) -> Option<BackupSnapshot> {
        match self.backups.snapshot() {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(error = %e, "Failed to backup old cert files");
                None
            }
        }
    }

    fn print_environment(&self) {
        println!("\n{}\n", heading("Environment"));
        println!("API Endpoint: {}", self.config.directory_url());
    }
}

impl<T> fmt::Debug for CertificateAgent<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateAgent")
            .field("directory_url", &self.config.directory_url())
            .field("certs_dir", &self.storage.base_path())
            .field("policy", &self.verifier.policy())
            .finish()
    }
}
