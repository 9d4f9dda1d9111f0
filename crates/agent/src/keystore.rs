//! Account and certificate private keys
//!
//! Keys are PEM (PKCS#8) files in the certs directory. An existing file is
//! always loaded, never regenerated; a missing one is generated and written
//! before anything uses it. Each kind is cached for the lifetime of the store.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use ssl_agent_config::FileRole;
use tracing::{debug, info};

use crate::error::{AgentError, AgentResult};
use crate::storage::CertificateStorage;

/// RSA modulus size for generated keys
pub const DEFAULT_KEY_BITS: u32 = 4096;

/// Which of the two key pairs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    /// Authenticates requests under the CA account
    Account,
    /// Signs the CSR; its public half ends up in the certificate
    Certificate,
}

impl KeyKind {
    /// File role the key is stored under
    pub fn role(&self) -> FileRole {
        match self {
            KeyKind::Account => FileRole::AcctPrivate,
            KeyKind::Certificate => FileRole::CertPrivate,
        }
    }
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            KeyKind::Account => "account",
            KeyKind::Certificate => "certificate",
        })
    }
}

/// A loaded or freshly generated private key
#[derive(Debug, Clone)]
pub struct KeyMaterial {
    pub kind: KeyKind,
    pub key: PKey<Private>,
    pub source_path: PathBuf,
}

/// Loads, generates and caches the two key pairs
#[derive(Debug)]
pub struct KeyStore {
    storage: CertificateStorage,
    key_bits: u32,
    account: Option<KeyMaterial>,
    certificate: Option<KeyMaterial>,
}

impl KeyStore {
    pub fn new(storage: CertificateStorage) -> Self {
        Self {
            storage,
            key_bits: DEFAULT_KEY_BITS,
            account: None,
            certificate: None,
        }
    }

    /// Override the RSA size of generated keys
    pub fn with_key_bits(mut self, key_bits: u32) -> Self {
        self.key_bits = key_bits;
        self
    }

    pub fn key_path(&self, kind: KeyKind) -> PathBuf {
        self.storage.path(kind.role())
    }

    pub fn key_exists(&self, kind: KeyKind) -> bool {
        self.storage.exists(kind.role())
    }

    /// Cached key of `kind`, if this store has loaded or generated one
    pub fn cached(&self, kind: KeyKind) -> Option<&KeyMaterial> {
        match kind {
            KeyKind::Account => self.account.as_ref(),
            KeyKind::Certificate => self.certificate.as_ref(),
        }
    }

    fn slot_mut(&mut self, kind: KeyKind) -> &mut Option<KeyMaterial> {
        match kind {
            KeyKind::Account => &mut self.account,
            KeyKind::Certificate => &mut self.certificate,
        }
    }

    /// Load the key if its file exists, otherwise generate and persist it
    ///
    /// # Errors
    ///
    /// `KeyLoad` if the file exists but does not parse, `KeyGeneration` if a
    /// new key cannot be generated or written.
    pub fn obtain_key(&mut self, kind: KeyKind) -> AgentResult<&KeyMaterial> {
        let material = match self.slot_mut(kind).take() {
            Some(material) => material,
            None => {
                let path = self.key_path(kind);
                if path.exists() {
                    read_key(kind, &path)?
                } else {
                    self.generate_key(kind, &path)?
                }
            }
        };
        Ok(self.slot_mut(kind).insert(material))
    }

    /// Load an existing key; never generates
    ///
    /// # Errors
    ///
    /// `KeyMissing` if the file is absent, `KeyLoad` if it does not parse.
    pub fn load_key(&mut self, kind: KeyKind) -> AgentResult<&KeyMaterial> {
        let material = match self.slot_mut(kind).take() {
            Some(material) => material,
            None => {
                let path = self.key_path(kind);
                if !path.exists() {
                    return Err(AgentError::KeyMissing { kind, path });
                }
                read_key(kind, &path)?
            }
        };
        Ok(self.slot_mut(kind).insert(material))
    }

    fn generate_key(&self, kind: KeyKind, path: &Path) -> AgentResult<KeyMaterial> {
        let generation_error = |reason: String| AgentError::KeyGeneration {
            kind,
            path: path.to_path_buf(),
            reason,
        };

        info!(
            kind = %kind,
            bits = self.key_bits,
            path = %path.display(),
            "Generating private key"
        );
        let key = Rsa::generate(self.key_bits)
            .and_then(PKey::from_rsa)
            .map_err(|e| generation_error(e.to_string()))?;
        let pem = key
            .private_key_to_pem_pkcs8()
            .map_err(|e| generation_error(e.to_string()))?;

        self.storage
            .ensure_dir()
            .map_err(|e| generation_error(e.to_string()))?;
        write_private_file(path, &pem).map_err(|e| generation_error(e.to_string()))?;

        info!(kind = %kind, path = %path.display(), "Saved private key");
        Ok(KeyMaterial {
            kind,
            key,
            source_path: path.to_path_buf(),
        })
    }
}

fn read_key(kind: KeyKind, path: &Path) -> AgentResult<KeyMaterial> {
    let load_error = |reason: String| AgentError::KeyLoad {
        kind,
        path: path.to_path_buf(),
        reason,
    };

    let pem = fs::read(path).map_err(|e| load_error(e.to_string()))?;
    let key = PKey::private_key_from_pem(&pem).map_err(|e| load_error(e.to_string()))?;

    debug!(kind = %kind, path = %path.display(), "Loaded private key");
    Ok(KeyMaterial {
        kind,
        key,
        source_path: path.to_path_buf(),
    })
}

/// Create `path` exclusively, readable by the owner only
fn write_private_file(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}
