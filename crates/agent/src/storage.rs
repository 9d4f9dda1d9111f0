//! Certificate file storage
//!
//! All certificate-family files live flat in the certs directory under the
//! names from the [`FileNames`] table:
//!
//! ```text
//! certs/
//! ├── cert_chain.pem          # intermediates
//! ├── cert_server.pem         # leaf
//! ├── cert_fullchain.pem      # leaf + intermediates (OBTAINED_CERT_FILENAME)
//! ├── cert_private_key.pem    # certificate key (CERT_PRIVATE_KEY_FILENAME)
//! ├── acct_private_key.pem    # account key (ACCT_PRIVATE_KEY_FILENAME)
//! └── certs_<unixtime>/       # backups
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use ssl_agent_config::{FileNames, FileRole};
use tracing::{debug, info, trace};

use crate::acme::CertificateBundle;
use crate::error::{AgentError, AgentResult};

/// Certificate storage manager
#[derive(Debug, Clone)]
pub struct CertificateStorage {
    /// Certs directory
    base_path: PathBuf,
    files: FileNames,
}

impl CertificateStorage {
    /// Storage rooted at `base_path`; nothing is touched on disk
    pub fn new(base_path: impl Into<PathBuf>, files: FileNames) -> Self {
        Self {
            base_path: base_path.into(),
            files,
        }
    }

    /// Create the certs directory if it does not exist yet
    pub fn ensure_dir(&self) -> std::io::Result<()> {
        if !self.base_path.is_dir() {
            fs::create_dir_all(&self.base_path)?;
            info!(
                certs_dir = %self.base_path.display(),
                "Created certs directory"
            );
        }
        Ok(())
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn files(&self) -> &FileNames {
        &self.files
    }

    /// Full path of a file role
    pub fn path(&self, role: FileRole) -> PathBuf {
        self.base_path.join(self.files.name(role))
    }

    /// Whether the file for `role` is present
    pub fn exists(&self, role: FileRole) -> bool {
        let present = self.path(role).is_file();
        trace!(role = %role, present, "Checked certificate file");
        present
    }

    /// Write chain, leaf and fullchain, in that order
    ///
    /// Existing files are overwritten; callers take a backup first.
    pub fn save_bundle(&self, bundle: &CertificateBundle) -> AgentResult<Vec<PathBuf>> {
        self.ensure_dir().map_err(|source| AgentError::CertificateWrite {
            path: self.base_path.clone(),
            source,
        })?;

        let mut written = Vec::with_capacity(3);
        for (role, contents) in [
            (FileRole::CertChain, &bundle.chain_pem),
            (FileRole::CertServer, &bundle.leaf_pem),
            (FileRole::CertFullchain, &bundle.fullchain_pem),
        ] {
            let path = self.path(role);
            fs::write(&path, contents).map_err(|source| AgentError::CertificateWrite {
                path: path.clone(),
                source,
            })?;
            debug!(role = %role, path = %path.display(), "Wrote certificate file");
            written.push(path);
        }

        info!(
            certs_dir = %self.base_path.display(),
            files = written.len(),
            "Saved certificate to storage"
        );
        Ok(written)
    }
}
