//! Configuration validation
//!
//! Structural checks that run once after the environment is parsed. Checks
//! that depend on the selected action (contact email for create, domains
//! for create and renew) live on [`AgentConfig`](crate::AgentConfig).

use std::path::Path;

use tracing::trace;

use crate::error::ConfigError;
use crate::files::{FileNames, FileRole};
use crate::AgentConfig;

/// Run all structural checks
pub fn validate_config(config: &AgentConfig) -> Result<(), ConfigError> {
    validate_file_names(&config.files)?;
    validate_roots(&config.certs_dir, &config.web_doc_root)?;
    validate_domains(&config.domains)?;
    trace!("Configuration passed validation");
    Ok(())
}

/// File names must be bare names and unique across roles
pub fn validate_file_names(files: &FileNames) -> Result<(), ConfigError> {
    for (role, name) in files.iter() {
        if name.is_empty()
            || name == "."
            || name == ".."
            || name.contains('/')
            || name.contains('\\')
        {
            return Err(ConfigError::InvalidFileName {
                role,
                name: name.to_string(),
            });
        }
    }

    let roles = FileRole::ALL;
    for (i, first) in roles.iter().enumerate() {
        for second in &roles[i + 1..] {
            if files.name(*first) == files.name(*second) {
                return Err(ConfigError::DuplicateFileName {
                    first: *first,
                    second: *second,
                    name: files.name(*first).to_string(),
                });
            }
        }
    }

    Ok(())
}

/// The certs root is TLS material and the web root is served in plaintext,
/// so neither may contain the other.
pub fn validate_roots(certs_dir: &Path, web_doc_root: &Path) -> Result<(), ConfigError> {
    if certs_dir.starts_with(web_doc_root) || web_doc_root.starts_with(certs_dir) {
        return Err(ConfigError::OverlappingRoots {
            certs_dir: certs_dir.to_path_buf(),
            web_doc_root: web_doc_root.to_path_buf(),
        });
    }
    Ok(())
}

/// Domains must be plain DNS names usable in an HTTP-01 URL
pub fn validate_domains(domains: &[String]) -> Result<(), ConfigError> {
    for domain in domains {
        let malformed = domain
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '/' | ':' | '*' | '@'))
            || domain.split('.').any(str::is_empty);
        if malformed {
            return Err(ConfigError::InvalidDomain(domain.clone()));
        }
    }
    Ok(())
}
