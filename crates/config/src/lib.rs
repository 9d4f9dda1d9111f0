//! SSL Agent configuration
//!
//! The agent is configured entirely from the process environment so it can
//! run as a one-shot container next to a web server. This crate turns the
//! environment into an [`AgentConfig`] and validates it.
//!
//! | Variable | Meaning | Default |
//! |----------|---------|---------|
//! | `CONTACT_EMAIL` | ACME registration contact | - |
//! | `DOMAIN_NAMES` | comma-separated domain list | - |
//! | `LETSENCRYPT_ENV` | `prod` or anything else for staging | `staging` |
//! | `OBTAINED_CERT_FILENAME` | fullchain file name | `cert_fullchain.pem` |
//! | `CERT_PRIVATE_KEY_FILENAME` | certificate key file name | `cert_private_key.pem` |
//! | `ACCT_PRIVATE_KEY_FILENAME` | account key file name | `acct_private_key.pem` |
//! | `CERTS_DIR` | certificate and key directory | `/ssl-agent/certs` |
//! | `WEB_DOC_ROOT` | web server document root | `/ssl-agent/webserver-root` |
//! | `ACME_DIRECTORY_URL` | ACME directory override | - |

use std::path::PathBuf;

use serde::Deserialize;
use tracing::debug;

mod environment;
mod error;
mod files;
pub mod validate;

pub use environment::{CaEnvironment, LETSENCRYPT_PRODUCTION, LETSENCRYPT_STAGING};
pub use error::ConfigError;
pub use files::{FileNames, FileRole};

/// Default certificate and key directory
pub const DEFAULT_CERTS_DIR: &str = "/ssl-agent/certs";

/// Default web server document root
pub const DEFAULT_WEB_DOC_ROOT: &str = "/ssl-agent/webserver-root";

/// Environment as deserialized by `envy` (keys are lowercased variable names)
#[derive(Debug, Default, Deserialize)]
struct RawEnvironment {
    contact_email: Option<String>,
    domain_names: Option<String>,
    letsencrypt_env: Option<String>,
    obtained_cert_filename: Option<String>,
    cert_private_key_filename: Option<String>,
    acct_private_key_filename: Option<String>,
    certs_dir: Option<String>,
    web_doc_root: Option<String>,
    acme_directory_url: Option<String>,
}

/// Complete agent configuration
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Contact address used for ACME registration
    pub contact_email: Option<String>,
    /// Domains covered by the certificate, in request order
    pub domains: Vec<String>,
    /// Selected CA environment
    pub environment: CaEnvironment,
    /// Directory URL that replaces the environment's default
    pub directory_url_override: Option<String>,
    /// Directory holding keys, certificates and backups
    pub certs_dir: PathBuf,
    /// Web server document root that receives challenge files
    pub web_doc_root: PathBuf,
    /// File naming table
    pub files: FileNames,
}

impl AgentConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        let raw: RawEnvironment = envy::from_env()?;
        Self::from_raw(raw)
    }

    /// Load configuration from explicit `(NAME, value)` pairs
    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let raw: RawEnvironment = envy::from_iter(vars)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawEnvironment) -> Result<Self, ConfigError> {
        let environment = non_empty(raw.letsencrypt_env)
            .map(|s| CaEnvironment::from_selector(&s))
            .unwrap_or_default();

        let config = Self {
            contact_email: non_empty(raw.contact_email),
            domains: raw
                .domain_names
                .as_deref()
                .map(parse_domain_list)
                .unwrap_or_default(),
            environment,
            directory_url_override: non_empty(raw.acme_directory_url),
            certs_dir: non_empty(raw.certs_dir)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CERTS_DIR)),
            web_doc_root: non_empty(raw.web_doc_root)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_WEB_DOC_ROOT)),
            files: FileNames::with_overrides(
                non_empty(raw.obtained_cert_filename),
                non_empty(raw.cert_private_key_filename),
                non_empty(raw.acct_private_key_filename),
            ),
        };

        config.validate()?;

        debug!(
            environment = %config.environment,
            domains = ?config.domains,
            certs_dir = %config.certs_dir.display(),
            web_doc_root = %config.web_doc_root.display(),
            "Loaded agent configuration"
        );

        Ok(config)
    }

    /// Structural validation (file names, roots, domain syntax)
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate::validate_config(self)
    }

    /// ACME directory the agent talks to
    pub fn directory_url(&self) -> &str {
        self.directory_url_override
            .as_deref()
            .unwrap_or_else(|| self.environment.directory_url())
    }

    /// Contact email, required for registration
    pub fn require_contact_email(&self) -> Result<&str, ConfigError> {
        self.contact_email
            .as_deref()
            .ok_or(ConfigError::Missing("CONTACT_EMAIL"))
    }

    /// Domain list, required for any issuance
    pub fn require_domains(&self) -> Result<&[String], ConfigError> {
        if self.domains.is_empty() {
            return Err(ConfigError::Missing("DOMAIN_NAMES"));
        }
        Ok(self.domains.as_slice())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Split a comma-separated domain list, trimming whitespace and dropping
/// empty entries
pub fn parse_domain_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
