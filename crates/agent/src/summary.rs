//! Operator-facing summary of the certs directory

use std::fmt;

use ssl_agent_config::FileRole;

use crate::storage::CertificateStorage;

/// Width of heading rules
const HEADING_WIDTH: usize = 80;

/// How the agent is meant to be invoked
pub const USAGE: &str = "\
docker-compose run --rm <SERVICE NAME> info|create|renew

 -- OR --

docker run -it -e LETSENCRYPT_ENV=staging -e DOMAIN_NAMES=YOURDOMAIN.COM \\
 -e CONTACT_EMAIL=YOUREMAIL@DOMAIN.COM \\
 -v \"<NGINX ROOT ON DOCKER HOST>:/ssl-agent/webserver-root:rw\" \\
 -v \"<DIRECTORY FOR CERTS & KEYS>:/ssl-agent/certs:rw\" \\
 ssl-agent:latest info|create|renew
";

const NOTES: [&str; 2] = [
    "Save both private key files which will be required during renewal",
    "If you need to create new private keys, delete the private keys from certs folder before executing CREATE again",
];

/// `title` upper-cased and centered in a rule of `=`
pub fn heading(title: &str) -> String {
    format!(
        "{:=^width$}",
        format!(" {} ", title.to_uppercase()),
        width = HEADING_WIDTH
    )
}

/// Usage block as printed after a failure
pub fn usage() -> String {
    format!("\n{}\n\n{USAGE}", heading("Usage"))
}

/// Presence of one file in the certs directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStatus {
    pub role: FileRole,
    pub name: String,
    pub found: bool,
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.found { "Found" } else { "Not found" };
        write!(f, "{} ({state})", self.name)
    }
}

/// Snapshot of which files exist, rendered for the operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub files: Vec<FileStatus>,
    pub include_notes: bool,
}

impl Summary {
    /// Check every file role against the certs directory
    pub fn collect(storage: &CertificateStorage, include_notes: bool) -> Self {
        let files = storage
            .files()
            .iter()
            .map(|(role, name)| FileStatus {
                role,
                name: name.to_string(),
                found: storage.exists(role),
            })
            .collect();
        Self {
            files,
            include_notes,
        }
    }

    pub fn status(&self, role: FileRole) -> Option<&FileStatus> {
        self.files.iter().find(|status| status.role == role)
    }

    pub fn all_found(&self) -> bool {
        self.files.iter().all(|status| status.found)
    }

    fn line(&self, f: &mut fmt::Formatter<'_>, label: &str, role: FileRole) -> fmt::Result {
        match self.status(role) {
            Some(status) => writeln!(f, "\t{label:<21}{status}"),
            None => Ok(()),
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\n{}\n", heading("Summary"))?;

        writeln!(f, "Account / Registration info")?;
        self.line(f, "Private Key:", FileRole::AcctPrivate)?;

        writeln!(f, "\nSSL Certificate files")?;
        self.line(f, "SSL Certificate Key:", FileRole::CertPrivate)?;
        self.line(f, "SSL Certificate:", FileRole::CertFullchain)?;

        writeln!(f, "\nOther files")?;
        self.line(f, "Chain:", FileRole::CertChain)?;
        self.line(f, "Cert without chain:", FileRole::CertServer)?;

        if self.include_notes {
            writeln!(f, "\n{}\n", heading("Notes"))?;
            for note in NOTES {
                writeln!(f, "- {note}")?;
            }
        }
        Ok(())
    }
}
