//! Per-domain HTTP-01 verification
//!
//! ```text
//! Authorizing ──► FastPathValid
//!      │
//!      └────────► Challenging ──► Polling ──► Valid | Invalid | Exhausted
//! ```
//!
//! Polling is bounded: at most [`PollPolicy::attempts`] status queries with a
//! fixed sleep before each. Running out of attempts while the CA still says
//! `pending` is reported as [`VerificationOutcome::Exhausted`], not as an
//! error; the caller decides what to make of it.

use std::path::PathBuf;
use std::time::Duration;

use openssl::pkey::{PKey, Private};
use tracing::{debug, info, warn};

use super::challenge::ChallengeWriter;
use super::session::AcmeSession;
use super::transport::{AcmeTransport, AuthorizationStatus, DomainAuthorization, TransportError};
use crate::error::{AgentError, AgentResult};

/// Default number of status queries after requesting verification
pub const DEFAULT_POLL_ATTEMPTS: u32 = 3;

/// Default sleep before each status query
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Bounded polling schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_POLL_ATTEMPTS,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// How verification of a domain ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// CA already held a valid authorization; no challenge was issued
    AlreadyValid,
    /// CA validated the challenge
    Valid,
    /// CA rejected the challenge
    Invalid,
    /// Attempts ran out before a terminal status
    Exhausted { last_status: AuthorizationStatus },
}

impl VerificationOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(
            self,
            VerificationOutcome::AlreadyValid | VerificationOutcome::Valid
        )
    }

    /// Last authorization status observed
    pub fn status(&self) -> AuthorizationStatus {
        match self {
            VerificationOutcome::AlreadyValid | VerificationOutcome::Valid => {
                AuthorizationStatus::Valid
            }
            VerificationOutcome::Invalid => AuthorizationStatus::Invalid,
            VerificationOutcome::Exhausted { last_status } => *last_status,
        }
    }
}

/// Result of verifying one domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationReport {
    pub domain: String,
    pub outcome: VerificationOutcome,
    /// Challenge file written under the web root, if any
    pub challenge_file: Option<PathBuf>,
    /// Number of status queries made while polling
    pub attempts: u32,
}

/// Drives the challenge-response protocol for one domain at a time
#[derive(Debug, Clone)]
pub struct DomainVerifier {
    challenges: ChallengeWriter,
    policy: PollPolicy,
}

impl DomainVerifier {
    pub fn new(challenges: ChallengeWriter, policy: PollPolicy) -> Self {
        Self { challenges, policy }
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// Verify control of `domain`
    ///
    /// # Errors
    ///
    /// Transport failures and an unwritable challenge file abort verification.
    /// A non-valid final status does not.
    pub async fn verify<T: AcmeTransport>(
        &self,
        session: &mut AcmeSession<T>,
        account_key: &PKey<Private>,
        domain: &str,
    ) -> AgentResult<VerificationReport> {
        info!(domain = %domain, "Authorizing domain");
        let authorization = session.authorize_domain(account_key, domain).await?;
        info!(
            domain = %domain,
            status = %authorization.status,
            "Domain verification status"
        );

        if authorization.status == AuthorizationStatus::Valid {
            info!(domain = %domain, "Authorization already valid, skipping domain verification");
            return Ok(VerificationReport {
                domain: domain.to_string(),
                outcome: VerificationOutcome::AlreadyValid,
                challenge_file: None,
                attempts: 0,
            });
        }

        let challenge_file = self.place_challenge(&authorization)?;
        session.request_verification(&authorization).await?;

        let (status, attempts) = self.poll(session, &authorization).await?;
        let outcome = match status {
            AuthorizationStatus::Valid => VerificationOutcome::Valid,
            AuthorizationStatus::Invalid => VerificationOutcome::Invalid,
            AuthorizationStatus::Pending => VerificationOutcome::Exhausted {
                last_status: status,
            },
        };

        Ok(VerificationReport {
            domain: domain.to_string(),
            outcome,
            challenge_file: Some(challenge_file),
            attempts,
        })
    }

    fn place_challenge(&self, authorization: &DomainAuthorization) -> AgentResult<PathBuf> {
        let domain = &authorization.domain;
        let challenge =
            authorization
                .challenge
                .as_ref()
                .ok_or_else(|| AgentError::Authorization {
                    domain: domain.clone(),
                    source: TransportError::MissingChallenge(domain.clone()),
                })?;

        info!(
            domain = %domain,
            file = %challenge.file_name(),
            "Creating challenge file under web doc root"
        );
        let path = self
            .challenges
            .write_challenge(challenge)
            .map_err(|e| AgentError::Challenge {
                domain: domain.clone(),
                path: self.challenges.challenge_path(challenge),
                reason: e.to_string(),
            })?;

        info!(
            domain = %domain,
            url = %ChallengeWriter::verification_url(domain, challenge),
            "Domain verification URL"
        );
        Ok(path)
    }

    async fn poll<T: AcmeTransport>(
        &self,
        session: &mut AcmeSession<T>,
        authorization: &DomainAuthorization,
    ) -> AgentResult<(AuthorizationStatus, u32)> {
        let domain = &authorization.domain;
        let mut status = authorization.status;
        let mut attempts = 0;

        while attempts < self.policy.attempts {
            attempts += 1;
            debug!(
                domain = %domain,
                attempt = attempts,
                wait_secs = self.policy.interval.as_secs(),
                "Waiting before status check"
            );
            tokio::time::sleep(self.policy.interval).await;

            status = session.refresh_status(authorization).await?;
            info!(
                domain = %domain,
                attempt = attempts,
                status = %status,
                "Domain verification status"
            );
            if status.is_terminal() {
                break;
            }
        }

        if !status.is_terminal() {
            warn!(
                domain = %domain,
                attempts,
                "Domain verification still pending after all attempts"
            );
        }

        Ok((status, attempts))
    }
}
