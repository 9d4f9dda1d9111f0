//! Backup of certificate material before it is overwritten

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info};

/// Extensions of files that belong to the certificate family
pub const BACKUP_EXTENSIONS: [&str; 4] = ["pem", "crt", "key", "der"];

/// Prefix of backup directory names; the suffix is a Unix timestamp
pub const BACKUP_DIR_PREFIX: &str = "certs_";

/// Errors that can occur while taking a backup
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("failed to create backup directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {}: {source}", .path.display())]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to copy {} to {}: {source}", .from.display(), .to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result of one backup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupSnapshot {
    /// `certs_<unixtime>` directory the files were copied into
    pub directory: PathBuf,
    /// File names copied, relative to the directory
    pub copied_files: BTreeSet<PathBuf>,
}

impl BackupSnapshot {
    pub fn is_empty(&self) -> bool {
        self.copied_files.is_empty()
    }
}

/// Copies certificate-family files into a timestamped directory
#[derive(Debug, Clone)]
pub struct BackupManager {
    certs_dir: PathBuf,
}

impl BackupManager {
    pub fn new(certs_dir: impl Into<PathBuf>) -> Self {
        Self {
            certs_dir: certs_dir.into(),
        }
    }

    /// Back up into `certs_<now>`
    pub fn snapshot(&self) -> Result<BackupSnapshot, BackupError> {
        self.snapshot_at(Utc::now().timestamp())
    }

    /// Back up into `certs_<timestamp>`
    ///
    /// Only regular files directly in the certs directory are considered;
    /// earlier backup directories are left alone.
    pub fn snapshot_at(&self, timestamp: i64) -> Result<BackupSnapshot, BackupError> {
        let directory = self
            .certs_dir
            .join(format!("{BACKUP_DIR_PREFIX}{timestamp}"));

        info!(backup_dir = %directory.display(), "Backing up certificate files");
        fs::create_dir_all(&directory).map_err(|source| BackupError::CreateDir {
            path: directory.clone(),
            source,
        })?;

        let read_error = |source: std::io::Error| BackupError::ReadDir {
            path: self.certs_dir.clone(),
            source,
        };

        let mut copied_files = BTreeSet::new();
        for entry in fs::read_dir(&self.certs_dir).map_err(read_error)? {
            let entry = entry.map_err(read_error)?;
            if !entry.file_type().map_err(read_error)?.is_file() {
                continue;
            }

            let path = entry.path();
            if !is_backed_up(&path) {
                continue;
            }

            let file_name = PathBuf::from(entry.file_name());
            let dest = directory.join(&file_name);
            fs::copy(&path, &dest).map_err(|source| BackupError::Copy {
                from: path.clone(),
                to: dest.clone(),
                source,
            })?;
            debug!(file = %file_name.display(), "Backed up file");
            copied_files.insert(file_name);
        }

        info!(
            backup_dir = %directory.display(),
            copied = copied_files.len(),
            "Backup complete"
        );
        Ok(BackupSnapshot {
            directory,
            copied_files,
        })
    }
}

fn is_backed_up(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| BACKUP_EXTENSIONS.contains(&ext))
}
