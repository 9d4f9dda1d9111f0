//! Certificate authority environment selection.

use std::fmt;

/// Let's Encrypt production directory
pub const LETSENCRYPT_PRODUCTION: &str = "https://acme-v02.api.letsencrypt.org/directory";

/// Let's Encrypt staging directory
pub const LETSENCRYPT_STAGING: &str = "https://acme-staging-v02.api.letsencrypt.org/directory";

/// Which CA endpoint the agent talks to; staging unless asked otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaEnvironment {
    Production,
    #[default]
    Staging,
}

impl CaEnvironment {
    /// Parse the `LETSENCRYPT_ENV` selector.
    ///
    /// Only the exact value `prod` selects production; every other value
    /// (including typos such as `production`) selects staging.
    pub fn from_selector(selector: &str) -> Self {
        if selector.trim() == "prod" {
            CaEnvironment::Production
        } else {
            CaEnvironment::Staging
        }
    }

    /// ACME v2 directory URL for this environment
    pub fn directory_url(&self) -> &'static str {
        match self {
            CaEnvironment::Production => LETSENCRYPT_PRODUCTION,
            CaEnvironment::Staging => LETSENCRYPT_STAGING,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CaEnvironment::Production => "prod",
            CaEnvironment::Staging => "staging",
        }
    }
}

impl fmt::Display for CaEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
