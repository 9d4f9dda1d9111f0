//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

use crate::files::FileRole;

/// Errors raised while loading or validating agent configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment could not be deserialized
    #[error("invalid environment: {0}")]
    Environment(#[from] envy::Error),

    /// A variable required by the selected action is unset or empty
    #[error("{0} is required but not set")]
    Missing(&'static str),

    /// A file name override is not a bare file name
    #[error("invalid file name for {role}: {name:?} (must be a plain file name)")]
    InvalidFileName { role: FileRole, name: String },

    /// Two roles resolve to the same file
    #[error("{first} and {second} both resolve to {name:?}")]
    DuplicateFileName {
        first: FileRole,
        second: FileRole,
        name: String,
    },

    /// The certs directory and web document root overlap
    #[error("certs directory {certs_dir:?} and web document root {web_doc_root:?} must not overlap")]
    OverlappingRoots {
        certs_dir: PathBuf,
        web_doc_root: PathBuf,
    },

    /// A domain name is malformed
    #[error("invalid domain name: {0:?}")]
    InvalidDomain(String),
}
