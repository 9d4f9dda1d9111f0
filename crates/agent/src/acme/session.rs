//! The agent's single conversation with the CA.

use openssl::pkey::{PKey, Private};
use tracing::{debug, info, warn};

use super::transport::{
    AcmeTransport, AuthorizationStatus, CertificateBundle, DomainAuthorization,
};
use crate::error::{AgentError, AgentResult};

/// Wraps an [`AcmeTransport`] and classifies its failures by step
///
/// Nothing here retries: a failed registration is reported with guidance
/// and a failed request surfaces as a hard error of the step that made it.
#[derive(Debug)]
pub struct AcmeSession<T> {
    transport: T,
}

impl<T: AcmeTransport> AcmeSession<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Register the account key with the CA, agreeing to the terms of service
    pub async fn register(
        &mut self,
        account_key: &PKey<Private>,
        contact_email: &str,
    ) -> AgentResult<()> {
        info!(contact = %contact_email, "Registering ACME account");
        self.transport
            .register(account_key, contact_email)
            .await
            .map_err(|e| {
                warn!(error = %e, "ACME registration failed");
                AgentError::Registration(e)
            })?;
        info!("ACME account registered");
        Ok(())
    }

    /// Request the authorization object for one domain
    pub async fn authorize_domain(
        &mut self,
        account_key: &PKey<Private>,
        domain: &str,
    ) -> AgentResult<DomainAuthorization> {
        let authorization = self
            .transport
            .authorize(account_key, domain)
            .await
            .map_err(|source| AgentError::Authorization {
                domain: domain.to_string(),
                source,
            })?;
        debug!(
            domain = %domain,
            status = %authorization.status,
            "Received domain authorization"
        );
        Ok(authorization)
    }

    /// Notify the CA that the challenge file is ready to be fetched
    pub async fn request_verification(
        &mut self,
        authorization: &DomainAuthorization,
    ) -> AgentResult<()> {
        self.transport
            .request_verification(authorization)
            .await
            .map_err(|source| AgentError::Authorization {
                domain: authorization.domain.clone(),
                source,
            })
    }

    /// Current status of a domain authorization
    pub async fn refresh_status(
        &mut self,
        authorization: &DomainAuthorization,
    ) -> AgentResult<AuthorizationStatus> {
        self.transport
            .refresh_status(authorization)
            .await
            .map_err(|source| AgentError::Authorization {
                domain: authorization.domain.clone(),
                source,
            })
    }

    /// Submit the CSR and receive the certificate chain
    pub async fn issue_certificate(
        &mut self,
        account_key: &PKey<Private>,
        domains: &[String],
        certificate_key: &PKey<Private>,
    ) -> AgentResult<CertificateBundle> {
        info!(domains = ?domains, "Requesting certificate");
        let bundle = self
            .transport
            .issue_certificate(account_key, domains, certificate_key)
            .await
            .map_err(AgentError::Issuance)?;
        info!(
            fullchain_bytes = bundle.fullchain_pem.len(),
            "Certificate issued"
        );
        Ok(bundle)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}
