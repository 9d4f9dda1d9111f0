//! Lifecycle tests for the create / renew / info runs
//!
//! The CA is replaced by an in-memory transport that records every call and
//! only issues for domains it has seen validated.

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use openssl::pkey::{PKey, Private};
use tempfile::TempDir;

use ssl_agent::acme::{
    AuthorizationStatus, CertificateBundle, DomainAuthorization, Http01Challenge, TransportError,
};
use ssl_agent::{
    Action, AcmeTransport, AgentError, CertificateAgent, CertificateStorage, KeyKind, KeyStore,
    PollPolicy, VerificationOutcome,
};
use ssl_agent_config::{AgentConfig, ConfigError, FileRole, LETSENCRYPT_STAGING};

/// In-memory CA
#[derive(Debug, Default)]
struct FakeCa {
    calls: Vec<String>,
    /// Domains whose authorization is already valid when first requested
    preauthorized: HashSet<String>,
    /// Status every refresh reports
    verdict: Option<AuthorizationStatus>,
    validated: HashSet<String>,
    /// Reason `register` is refused with, if any
    register_error: Option<String>,
    /// Files expected on disk whenever `register` is called
    expected_at_register: Vec<PathBuf>,
    keys_on_disk_at_register: Option<bool>,
}

impl FakeCa {
    fn approving() -> Self {
        Self {
            verdict: Some(AuthorizationStatus::Valid),
            ..Self::default()
        }
    }

    fn count(&self, prefix: &str) -> usize {
        self.calls.iter().filter(|c| c.starts_with(prefix)).count()
    }
}

fn token_for(domain: &str) -> String {
    format!("tok-{}", domain.replace('.', "-"))
}

#[async_trait(?Send)]
impl AcmeTransport for FakeCa {
    async fn register(
        &mut self,
        _account_key: &PKey<Private>,
        contact_email: &str,
    ) -> Result<(), TransportError> {
        self.calls.push(format!("register {contact_email}"));
        self.keys_on_disk_at_register =
            Some(self.expected_at_register.iter().all(|p| p.is_file()));
        match &self.register_error {
            Some(reason) => Err(TransportError::Protocol(reason.clone())),
            None => Ok(()),
        }
    }

    async fn authorize(
        &mut self,
        _account_key: &PKey<Private>,
        domain: &str,
    ) -> Result<DomainAuthorization, TransportError> {
        self.calls.push(format!("authorize {domain}"));
        if self.preauthorized.contains(domain) {
            self.validated.insert(domain.to_string());
            return Ok(DomainAuthorization {
                domain: domain.to_string(),
                status: AuthorizationStatus::Valid,
                challenge: None,
            });
        }

        let token = token_for(domain);
        Ok(DomainAuthorization {
            domain: domain.to_string(),
            status: AuthorizationStatus::Pending,
            challenge: Some(Http01Challenge {
                key_authorization: format!("{token}.thumbprint"),
                token,
            }),
        })
    }

    async fn request_verification(
        &mut self,
        authorization: &DomainAuthorization,
    ) -> Result<(), TransportError> {
        self.calls
            .push(format!("request_verification {}", authorization.domain));
        Ok(())
    }

    async fn refresh_status(
        &mut self,
        authorization: &DomainAuthorization,
    ) -> Result<AuthorizationStatus, TransportError> {
        self.calls
            .push(format!("refresh_status {}", authorization.domain));
        let status = self.verdict.unwrap_or(AuthorizationStatus::Pending);
        if status == AuthorizationStatus::Valid {
            self.validated.insert(authorization.domain.clone());
        }
        Ok(status)
    }

    async fn issue_certificate(
        &mut self,
        _account_key: &PKey<Private>,
        domains: &[String],
        _certificate_key: &PKey<Private>,
    ) -> Result<CertificateBundle, TransportError> {
        self.calls.push(format!("issue {}", domains.join(",")));
        if let Some(domain) = domains.iter().find(|d| !self.validated.contains(*d)) {
            return Err(TransportError::UnexpectedState(format!(
                "authorization for {domain} is not valid"
            )));
        }

        let leaf = b"-----BEGIN CERTIFICATE-----\nleaf\n-----END CERTIFICATE-----\n".to_vec();
        let chain = b"-----BEGIN CERTIFICATE-----\nchain\n-----END CERTIFICATE-----\n".to_vec();
        Ok(CertificateBundle {
            fullchain_pem: [leaf.as_slice(), chain.as_slice()].concat(),
            leaf_pem: leaf,
            chain_pem: chain,
        })
    }
}

struct Fixture {
    _root: TempDir,
    certs_dir: PathBuf,
    web_doc_root: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let root = TempDir::new().unwrap();
        let certs_dir = root.path().join("certs");
        let web_doc_root = root.path().join("www");
        fs::create_dir_all(&certs_dir).unwrap();
        fs::create_dir_all(&web_doc_root).unwrap();
        Self {
            _root: root,
            certs_dir,
            web_doc_root,
        }
    }

    fn config(&self, extra: &[(&str, &str)]) -> AgentConfig {
        let mut vars = vec![
            ("CERTS_DIR".to_string(), self.certs_dir.display().to_string()),
            (
                "WEB_DOC_ROOT".to_string(),
                self.web_doc_root.display().to_string(),
            ),
        ];
        vars.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        AgentConfig::from_vars(vars).unwrap()
    }

    fn standard_config(&self) -> AgentConfig {
        self.config(&[
            ("CONTACT_EMAIL", "ops@example.com"),
            ("DOMAIN_NAMES", "a.example.com, b.example.com"),
            ("LETSENCRYPT_ENV", "staging"),
        ])
    }

    fn agent(&self, config: AgentConfig, ca: FakeCa) -> CertificateAgent<FakeCa> {
        CertificateAgent::new(config, ca)
            .with_key_bits(2048)
            .with_poll_policy(PollPolicy {
                attempts: 3,
                interval: Duration::ZERO,
            })
    }

    /// Write both keys as an earlier create would have
    fn seed_keys(&self, config: &AgentConfig) {
        let storage = CertificateStorage::new(config.certs_dir.clone(), config.files.clone());
        let mut keys = KeyStore::new(storage).with_key_bits(2048);
        keys.obtain_key(KeyKind::Account).unwrap();
        keys.obtain_key(KeyKind::Certificate).unwrap();
    }

    fn challenge_file(&self, domain: &str) -> PathBuf {
        self.web_doc_root
            .join(".well-known/acme-challenge")
            .join(token_for(domain))
    }
}

fn names(paths: &[PathBuf]) -> Vec<String> {
    paths
        .iter()
        .filter_map(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .collect()
}

fn exists(dir: &Path, name: &str) -> bool {
    dir.join(name).is_file()
}

#[tokio::test]
async fn test_create_from_empty_certs_dir() {
    let fixture = Fixture::new();
    let mut agent = fixture.agent(fixture.standard_config(), FakeCa::approving());

    let report = agent.run(Action::Create).await.unwrap();

    assert_eq!(report.action, Action::Create);
    assert_eq!(report.directory_url, LETSENCRYPT_STAGING);

    // One key per kind, both on disk
    assert!(exists(&fixture.certs_dir, "acct_private_key.pem"));
    assert!(exists(&fixture.certs_dir, "cert_private_key.pem"));
    assert!(agent.keys().cached(KeyKind::Account).is_some());
    assert!(agent.keys().cached(KeyKind::Certificate).is_some());

    // Registration came first
    let ca = agent.transport();
    assert_eq!(ca.calls.first().unwrap(), "register ops@example.com");
    assert_eq!(ca.count("register"), 1);
    assert_eq!(ca.count("authorize"), 2);
    assert_eq!(ca.count("issue"), 1);

    // Two domains, two challenge files
    assert_eq!(report.verifications.len(), 2);
    for (verification, domain) in report
        .verifications
        .iter()
        .zip(["a.example.com", "b.example.com"])
    {
        assert_eq!(verification.domain, domain);
        assert_eq!(verification.outcome, VerificationOutcome::Valid);
        assert_eq!(verification.attempts, 1);
        assert_eq!(
            verification.challenge_file.as_deref(),
            Some(fixture.challenge_file(domain).as_path())
        );
        assert_eq!(
            fs::read_to_string(fixture.challenge_file(domain)).unwrap(),
            format!("{}.thumbprint", token_for(domain))
        );
    }

    // The backup ran before the write; only the fresh keys were there to copy
    let backup = report.backup.expect("backup snapshot");
    assert!(backup.directory.starts_with(&fixture.certs_dir));
    assert_eq!(
        backup.copied_files,
        BTreeSet::from([
            PathBuf::from("acct_private_key.pem"),
            PathBuf::from("cert_private_key.pem"),
        ])
    );

    assert_eq!(
        names(&report.written_files),
        vec!["cert_chain.pem", "cert_server.pem", "cert_fullchain.pem"]
    );
    assert!(report.summary.all_found());
    assert_eq!(report.summary.files.len(), 5);
    assert!(report.summary.include_notes);
}

#[tokio::test]
async fn test_create_persists_keys_before_registering() {
    let fixture = Fixture::new();
    let ca = FakeCa {
        expected_at_register: vec![
            fixture.certs_dir.join("acct_private_key.pem"),
            fixture.certs_dir.join("cert_private_key.pem"),
        ],
        ..FakeCa::approving()
    };
    let mut agent = fixture.agent(fixture.standard_config(), ca);

    agent.run(Action::Create).await.unwrap();

    assert_eq!(agent.transport().keys_on_disk_at_register, Some(true));
}

#[tokio::test]
async fn test_registration_failure_aborts_create() {
    let fixture = Fixture::new();
    let ca = FakeCa {
        register_error: Some("account exists".to_string()),
        ..FakeCa::approving()
    };
    let mut agent = fixture.agent(fixture.standard_config(), ca);

    let err = agent.run(Action::Create).await.unwrap_err();

    assert!(matches!(err, AgentError::Registration(_)), "got {err:?}");
    assert!(err.guidance().is_some());

    let ca = agent.transport();
    assert_eq!(ca.calls, vec!["register ops@example.com".to_string()]);
    assert_eq!(ca.count("authorize"), 0);
    assert_eq!(ca.count("issue"), 0);
    assert!(!fixture.web_doc_root.join(".well-known").exists());

    // Keys stay for the next attempt, nothing else was written
    assert!(exists(&fixture.certs_dir, "acct_private_key.pem"));
    assert!(exists(&fixture.certs_dir, "cert_private_key.pem"));
    assert!(!exists(&fixture.certs_dir, "cert_fullchain.pem"));
}

#[tokio::test]
async fn test_failed_backup_does_not_stop_issuance() {
    let fixture = Fixture::new();
    let config = fixture.standard_config();
    fixture.seed_keys(&config);

    // Occupy every backup directory name the run could pick with a plain file
    let now = chrono::Utc::now().timestamp();
    for timestamp in now - 5..now + 300 {
        fs::write(fixture.certs_dir.join(format!("certs_{timestamp}")), "").unwrap();
    }

    let mut agent = fixture.agent(config, FakeCa::approving());
    let report = agent.run(Action::Renew).await.unwrap();

    assert!(report.backup.is_none());
    assert_eq!(
        names(&report.written_files),
        vec!["cert_chain.pem", "cert_server.pem", "cert_fullchain.pem"]
    );
    assert!(report.written_files.iter().all(|p| p.is_file()));
    assert!(report.summary.all_found());
    assert_eq!(agent.transport().count("issue"), 1);
}

#[tokio::test]
async fn test_create_uses_configured_names() {
    let fixture = Fixture::new();
    let config = fixture.config(&[
        ("CONTACT_EMAIL", "ops@example.com"),
        ("DOMAIN_NAMES", "a.example.com"),
        ("OBTAINED_CERT_FILENAME", "fullchain.pem"),
        ("CERT_PRIVATE_KEY_FILENAME", "privkey.pem"),
        ("ACCT_PRIVATE_KEY_FILENAME", "account.pem"),
    ]);
    let mut agent = fixture.agent(config, FakeCa::approving());

    let report = agent.run(Action::Create).await.unwrap();

    assert_eq!(
        names(&report.written_files),
        vec!["cert_chain.pem", "cert_server.pem", "fullchain.pem"]
    );
    for name in ["account.pem", "privkey.pem", "fullchain.pem"] {
        assert!(exists(&fixture.certs_dir, name), "{name} missing");
    }
    assert!(!exists(&fixture.certs_dir, "cert_fullchain.pem"));
    assert!(report.summary.all_found());
}

#[tokio::test]
async fn test_create_keeps_existing_keys() {
    let fixture = Fixture::new();
    let config = fixture.standard_config();
    fixture.seed_keys(&config);
    let before = fs::read(fixture.certs_dir.join("acct_private_key.pem")).unwrap();

    let mut agent = fixture.agent(config, FakeCa::approving());
    agent.run(Action::Create).await.unwrap();

    assert_eq!(
        fs::read(fixture.certs_dir.join("acct_private_key.pem")).unwrap(),
        before
    );
}

#[tokio::test]
async fn test_create_requires_contact_email() {
    let fixture = Fixture::new();
    let config = fixture.config(&[("DOMAIN_NAMES", "a.example.com")]);
    let mut agent = fixture.agent(config, FakeCa::approving());

    let err = agent.run(Action::Create).await.unwrap_err();

    assert!(matches!(
        err,
        AgentError::Config(ConfigError::Missing("CONTACT_EMAIL"))
    ));
    assert!(agent.transport().calls.is_empty());
    assert!(!exists(&fixture.certs_dir, "acct_private_key.pem"));
}

#[tokio::test]
async fn test_renew_without_keys_fails_before_network() {
    let fixture = Fixture::new();
    let mut agent = fixture.agent(fixture.standard_config(), FakeCa::approving());

    let err = agent.run(Action::Renew).await.unwrap_err();

    match err {
        AgentError::KeyMissing { kind, path } => {
            assert_eq!(kind, KeyKind::Account);
            assert_eq!(path, fixture.certs_dir.join("acct_private_key.pem"));
        }
        other => panic!("expected KeyMissing, got {other:?}"),
    }
    assert!(agent.transport().calls.is_empty());
    assert!(!exists(&fixture.certs_dir, "acct_private_key.pem"));
    assert!(!exists(&fixture.certs_dir, "cert_private_key.pem"));
}

#[tokio::test]
async fn test_renew_with_valid_authorizations_skips_challenges() {
    let fixture = Fixture::new();
    let config = fixture.standard_config();
    fixture.seed_keys(&config);
    fs::write(fixture.certs_dir.join("cert_server.pem"), "old leaf").unwrap();

    let ca = FakeCa {
        preauthorized: HashSet::from(["a.example.com".to_string(), "b.example.com".to_string()]),
        ..FakeCa::default()
    };
    let mut agent = fixture.agent(config, ca);

    let report = agent.run(Action::Renew).await.unwrap();

    assert!(report
        .verifications
        .iter()
        .all(|v| v.outcome == VerificationOutcome::AlreadyValid && v.challenge_file.is_none()));
    assert!(!fixture.web_doc_root.join(".well-known").exists());

    let ca = agent.transport();
    assert_eq!(ca.count("register"), 0);
    assert_eq!(ca.count("request_verification"), 0);
    assert_eq!(ca.count("refresh_status"), 0);

    // The old leaf was backed up, then replaced
    let backup = report.backup.expect("backup snapshot");
    assert_eq!(
        fs::read_to_string(backup.directory.join("cert_server.pem")).unwrap(),
        "old leaf"
    );
    assert_ne!(
        fs::read_to_string(fixture.certs_dir.join("cert_server.pem")).unwrap(),
        "old leaf"
    );
}

#[tokio::test]
async fn test_pending_domain_exhausts_then_issuance_fails() {
    let fixture = Fixture::new();
    let config = fixture.config(&[
        ("CONTACT_EMAIL", "ops@example.com"),
        ("DOMAIN_NAMES", "a.example.com"),
    ]);
    // Refreshes keep answering pending
    let mut agent = fixture.agent(config, FakeCa::default());

    let err = agent.run(Action::Create).await.unwrap_err();

    assert!(matches!(err, AgentError::Issuance(_)));
    assert!(err.guidance().is_some());
    assert_eq!(agent.transport().count("refresh_status"), 3);
    assert!(fixture.challenge_file("a.example.com").is_file());
    assert!(!exists(&fixture.certs_dir, "cert_fullchain.pem"));

    let summary = agent.summary(false);
    assert!(summary.status(FileRole::AcctPrivate).unwrap().found);
    assert!(!summary.status(FileRole::CertFullchain).unwrap().found);
}

#[tokio::test]
async fn test_invalid_domain_stops_polling_early() {
    let fixture = Fixture::new();
    let config = fixture.config(&[
        ("CONTACT_EMAIL", "ops@example.com"),
        ("DOMAIN_NAMES", "a.example.com"),
    ]);
    let ca = FakeCa {
        verdict: Some(AuthorizationStatus::Invalid),
        ..FakeCa::default()
    };
    let mut agent = fixture.agent(config, ca);

    let err = agent.run(Action::Create).await.unwrap_err();

    assert!(matches!(err, AgentError::Issuance(_)));
    assert_eq!(agent.transport().count("refresh_status"), 1);
}

#[tokio::test]
async fn test_info_touches_nothing() {
    let fixture = Fixture::new();
    fs::write(fixture.certs_dir.join("cert_fullchain.pem"), "chain").unwrap();
    let mut agent = fixture.agent(fixture.config(&[]), FakeCa::approving());

    let report = agent.run(Action::Info).await.unwrap();

    assert_eq!(report.action, Action::Info);
    assert!(report.verifications.is_empty());
    assert!(report.backup.is_none());
    assert!(report.written_files.is_empty());
    assert!(!report.summary.include_notes);
    assert!(report.summary.status(FileRole::CertFullchain).unwrap().found);
    assert!(!report.summary.status(FileRole::AcctPrivate).unwrap().found);

    assert!(agent.transport().calls.is_empty());
    assert!(!exists(&fixture.certs_dir, "acct_private_key.pem"));
    let entries = fs::read_dir(&fixture.certs_dir).unwrap().count();
    assert_eq!(entries, 1);
}
