//! ACME conversation with the CA
//!
//! # Architecture
//!
//! - [`AcmeTransport`] - the protocol capability (JWS, nonces, HTTP); the
//!   production implementation is [`Acme2Client`]
//! - [`AcmeSession`] - the agent's view of the CA; classifies failures by step
//! - [`ChallengeWriter`] - places HTTP-01 challenge files under the web root
//! - [`DomainVerifier`] - per-domain challenge-response with bounded polling
//!
//! # Challenge Flow
//!
//! 1. [`AcmeSession`] requests the authorization for a domain
//! 2. If the CA already holds it as valid, the domain is done
//! 3. Otherwise [`ChallengeWriter`] writes the key authorization to
//!    `/.well-known/acme-challenge/<token>` under the web document root
//! 4. The CA is told to validate, then polled until the authorization is
//!    valid, invalid, or the attempts run out
//! 5. Once every domain is verified, the certificate is requested in one order

mod challenge;
mod client;
mod session;
mod transport;
mod verifier;

pub use challenge::{ChallengeWriter, ACME_CHALLENGE_PREFIX};
pub use client::{Acme2Client, CONNECT_TIMEOUT, REQUEST_TIMEOUT};
pub use session::AcmeSession;
pub use transport::{
    AcmeTransport, AuthorizationStatus, CertificateBundle, DomainAuthorization, Http01Challenge,
    TransportError,
};
pub use verifier::{
    DomainVerifier, PollPolicy, VerificationOutcome, VerificationReport, DEFAULT_POLL_ATTEMPTS,
    DEFAULT_POLL_INTERVAL,
};
