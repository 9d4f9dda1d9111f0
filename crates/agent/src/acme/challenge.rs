//! HTTP-01 ACME challenge files
//!
//! Places challenge responses under the web server document root so the
//! existing web server serves `/.well-known/acme-challenge/<token>`.

use std::fs;
use std::io;
use std::path::PathBuf;

use tracing::debug;

use super::transport::Http01Challenge;

/// HTTP-01 challenge path prefix
pub const ACME_CHALLENGE_PREFIX: &str = "/.well-known/acme-challenge/";

/// Writes HTTP-01 challenge files into the web document root
///
/// Files are left in place after verification; the web root is owned by
/// the web server and the next run overwrites stale tokens of the same name.
#[derive(Debug, Clone)]
pub struct ChallengeWriter {
    /// Web server document root
    web_doc_root: PathBuf,
}

impl ChallengeWriter {
    /// Create a writer for the given document root
    pub fn new(web_doc_root: impl Into<PathBuf>) -> Self {
        Self {
            web_doc_root: web_doc_root.into(),
        }
    }

    /// Absolute path the challenge file is written to
    pub fn challenge_path(&self, challenge: &Http01Challenge) -> PathBuf {
        self.web_doc_root.join(challenge.file_name())
    }

    /// URL the CA fetches to validate the domain
    pub fn verification_url(domain: &str, challenge: &Http01Challenge) -> String {
        format!("http://{}{}{}", domain, ACME_CHALLENGE_PREFIX, challenge.token)
    }

    /// Write the challenge file
    ///
    /// Creates parent directories as needed and makes the file world-readable
    /// (0644 on Unix) so an unprivileged web server process can serve it.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the token is not a base64url string (which
    /// would let it escape the challenge directory), or any I/O error from
    /// creating, writing or chmod-ing the file.
    pub fn write_challenge(&self, challenge: &Http01Challenge) -> io::Result<PathBuf> {
        if !is_token_safe(&challenge.token) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("refusing unsafe challenge token {:?}", challenge.token),
            ));
        }

        let path = self.challenge_path(challenge);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(&path, challenge.key_authorization.as_bytes())?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o644))?;
        }

        debug!(
            token = %challenge.token,
            path = %path.display(),
            "Wrote ACME HTTP-01 challenge file"
        );
        Ok(path)
    }
}

/// ACME tokens are base64url; anything else could traverse out of the root
fn is_token_safe(token: &str) -> bool {
    !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
