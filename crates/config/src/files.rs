//! File naming table for certificate and key material.
//!
//! Every file the agent reads or writes under the certs directory has a
//! logical role. Three of the five names can be overridden from the
//! environment; the chain and leaf names are fixed.

use std::fmt;

/// Logical role of a file in the certs directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileRole {
    /// Intermediate chain without the leaf
    CertChain,
    /// Leaf certificate without the chain
    CertServer,
    /// Leaf followed by the chain
    CertFullchain,
    /// Certificate private key
    CertPrivate,
    /// ACME account private key
    AcctPrivate,
}

impl FileRole {
    pub const ALL: [FileRole; 5] = [
        FileRole::CertChain,
        FileRole::CertServer,
        FileRole::CertFullchain,
        FileRole::CertPrivate,
        FileRole::AcctPrivate,
    ];

    /// Stable identifier used in logs
    pub fn key(&self) -> &'static str {
        match self {
            FileRole::CertChain => "cert_chain",
            FileRole::CertServer => "cert_server",
            FileRole::CertFullchain => "cert_fullchain",
            FileRole::CertPrivate => "cert_private",
            FileRole::AcctPrivate => "acct_private",
        }
    }

    pub fn default_name(&self) -> &'static str {
        match self {
            FileRole::CertChain => "cert_chain.pem",
            FileRole::CertServer => "cert_server.pem",
            FileRole::CertFullchain => "cert_fullchain.pem",
            FileRole::CertPrivate => "cert_private_key.pem",
            FileRole::AcctPrivate => "acct_private_key.pem",
        }
    }
}

impl fmt::Display for FileRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Resolved file names for all five roles
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileNames {
    cert_chain: String,
    cert_server: String,
    cert_fullchain: String,
    cert_private: String,
    acct_private: String,
}

impl FileNames {
    /// Build the table, applying any overrides on top of the defaults
    pub fn with_overrides(
        cert_fullchain: Option<String>,
        cert_private: Option<String>,
        acct_private: Option<String>,
    ) -> Self {
        let mut names = Self::default();
        if let Some(name) = cert_fullchain {
            names.cert_fullchain = name;
        }
        if let Some(name) = cert_private {
            names.cert_private = name;
        }
        if let Some(name) = acct_private {
            names.acct_private = name;
        }
        names
    }

    pub fn name(&self, role: FileRole) -> &str {
        match role {
            FileRole::CertChain => &self.cert_chain,
            FileRole::CertServer => &self.cert_server,
            FileRole::CertFullchain => &self.cert_fullchain,
            FileRole::CertPrivate => &self.cert_private,
            FileRole::AcctPrivate => &self.acct_private,
        }
    }

    /// Iterate over `(role, name)` pairs in table order
    pub fn iter(&self) -> impl Iterator<Item = (FileRole, &str)> {
        FileRole::ALL.into_iter().map(move |role| (role, self.name(role)))
    }
}

impl Default for FileNames {
    fn default() -> Self {
        Self {
            cert_chain: FileRole::CertChain.default_name().to_string(),
            cert_server: FileRole::CertServer.default_name().to_string(),
            cert_fullchain: FileRole::CertFullchain.default_name().to_string(),
            cert_private: FileRole::CertPrivate.default_name().to_string(),
            acct_private: FileRole::AcctPrivate.default_name().to_string(),
        }
    }
}
