//! ACME v2 transport backed by `acme2`
//!
//! The account is always addressed by the operator's account key: `register`
//! creates it, every later request looks it up with `onlyReturnExisting`.
//!
//! Domains are authorized through single-identifier orders. The final
//! multi-domain order then reuses the authorizations the CA already holds
//! as valid, so an unverified domain leaves that order short of `ready` and
//! issuance fails.

use std::collections::HashMap;
use std::time::Duration;

use acme2::{
    AccountBuilder, AuthorizationStatus as AcmeAuthorizationStatus, Csr, DirectoryBuilder,
    OrderBuilder, OrderStatus,
};
use async_trait::async_trait;
use openssl::pkey::{PKey, Private};
use tracing::{debug, trace};

use super::transport::{
    AcmeTransport, AuthorizationStatus, CertificateBundle, DomainAuthorization, Http01Challenge,
    TransportError,
};

/// TCP connect timeout for CA requests
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(8);

/// Overall timeout for a single CA request
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(8);

/// Order polling interval while waiting for `ready` / `valid` (3 attempts)
const ORDER_POLL_INTERVAL: Duration = Duration::from_secs(3);

const HTTP_01: &str = "http-01";

impl From<acme2::Error> for TransportError {
    fn from(err: acme2::Error) -> Self {
        TransportError::Protocol(err.to_string())
    }
}

/// [`AcmeTransport`] talking to a real ACME v2 directory
pub struct Acme2Client {
    directory_url: String,
    http: reqwest::Client,
    /// Authorizations awaiting a challenge response, by domain
    pending: HashMap<String, acme2::Authorization>,
}

impl Acme2Client {
    /// Create a client for the given directory URL
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built (TLS backend initialisation).
    pub fn new(directory_url: impl Into<String>) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TransportError::Protocol(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            directory_url: directory_url.into(),
            http,
            pending: HashMap::new(),
        })
    }

    pub fn directory_url(&self) -> &str {
        &self.directory_url
    }

    /// Look up the existing account for `account_key` and place an order
    async fn new_order(
        &self,
        account_key: &PKey<Private>,
        domains: &[String],
    ) -> Result<acme2::Order, TransportError> {
        let directory = DirectoryBuilder::new(self.directory_url.clone())
            .http_client(self.http.clone())
            .build()
            .await?;

        let mut builder = AccountBuilder::new(directory);
        builder.private_key(account_key.clone());
        builder.only_return_existing(true);
        let account = builder.build().await?;

        let mut builder = OrderBuilder::new(account);
        for domain in domains {
            builder.add_dns_identifier(domain.clone());
        }
        let order = builder.build().await?;

        debug!(domains = ?domains, status = ?order.status, "Placed ACME order");
        Ok(order)
    }
}

impl std::fmt::Debug for Acme2Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Acme2Client")
            .field("directory_url", &self.directory_url)
            .field("pending", &self.pending.len())
            .finish()
    }
}

fn map_status(status: &AcmeAuthorizationStatus) -> AuthorizationStatus {
    match status {
        AcmeAuthorizationStatus::Pending => AuthorizationStatus::Pending,
        AcmeAuthorizationStatus::Valid => AuthorizationStatus::Valid,
        _ => AuthorizationStatus::Invalid,
    }
}

fn http01_challenge(
    domain: &str,
    authorization: &acme2::Authorization,
) -> Result<Http01Challenge, TransportError> {
    let challenge = authorization
        .get_challenge(HTTP_01)
        .ok_or_else(|| TransportError::MissingChallenge(domain.to_string()))?;
    let key_authorization = challenge.key_authorization()?;
    build_http01(domain, challenge.token, key_authorization)
}

/// Both parts must be present and the key authorization must belong to the token
fn build_http01(
    domain: &str,
    token: Option<String>,
    key_authorization: Option<String>,
) -> Result<Http01Challenge, TransportError> {
    let (Some(token), Some(key_authorization)) = (token, key_authorization) else {
        return Err(TransportError::MissingChallenge(domain.to_string()));
    };

    // Key authorization is `<token>.<account key thumbprint>`
    if key_authorization.split_once('.').map(|(head, _)| head) != Some(token.as_str()) {
        return Err(TransportError::UnexpectedState(format!(
            "key authorization for {domain} does not match its token"
        )));
    }

    Ok(Http01Challenge {
        token,
        key_authorization,
    })
}

fn concat_pem(certs: &[openssl::x509::X509]) -> Result<Vec<u8>, TransportError> {
    let mut out = Vec::new();
    for cert in certs {
        out.extend_from_slice(&cert.to_pem()?);
    }
    Ok(out)
}

#[async_trait(?Send)]
impl AcmeTransport for Acme2Client {
    async fn register(
        &mut self,
        account_key: &PKey<Private>,
        contact_email: &str,
    ) -> Result<(), TransportError> {
        let directory = DirectoryBuilder::new(self.directory_url.clone())
            .http_client(self.http.clone())
            .build()
            .await?;

        let mut builder = AccountBuilder::new(directory);
        builder.private_key(account_key.clone());
        builder.contact(vec![format!("mailto:{contact_email}")]);
        builder.terms_of_service_agreed(true);
        let account = builder.build().await?;

        debug!(status = ?account.status, "ACME account ready");
        Ok(())
    }

    async fn authorize(
        &mut self,
        account_key: &PKey<Private>,
        domain: &str,
    ) -> Result<DomainAuthorization, TransportError> {
        let order = self.new_order(account_key, &[domain.to_string()]).await?;
        let authorization = order.authorizations().await?.into_iter().next().ok_or_else(|| {
            TransportError::UnexpectedState(format!("order for {domain} has no authorizations"))
        })?;

        let status = map_status(&authorization.status);
        let challenge = match status {
            AuthorizationStatus::Valid => None,
            _ => Some(http01_challenge(domain, &authorization)?),
        };

        self.pending.insert(domain.to_string(), authorization);

        Ok(DomainAuthorization {
            domain: domain.to_string(),
            status,
            challenge,
        })
    }

    async fn request_verification(
        &mut self,
        authorization: &DomainAuthorization,
    ) -> Result<(), TransportError> {
        let domain = &authorization.domain;
        let pending = self.pending.get(domain).ok_or_else(|| {
            TransportError::UnexpectedState(format!("no pending authorization for {domain}"))
        })?;
        let challenge = pending
            .get_challenge(HTTP_01)
            .ok_or_else(|| TransportError::MissingChallenge(domain.clone()))?;

        let challenge = challenge.validate().await?;
        debug!(domain = %domain, status = ?challenge.status, "Requested challenge validation");
        Ok(())
    }

    async fn refresh_status(
        &mut self,
        authorization: &DomainAuthorization,
    ) -> Result<AuthorizationStatus, TransportError> {
        let domain = &authorization.domain;
        let current = self.pending.remove(domain).ok_or_else(|| {
            TransportError::UnexpectedState(format!("no pending authorization for {domain}"))
        })?;

        let refreshed = current.poll().await?;
        let status = map_status(&refreshed.status);
        trace!(domain = %domain, status = %status, "Polled authorization");

        self.pending.insert(domain.clone(), refreshed);
        Ok(status)
    }

    async fn issue_certificate(
        &mut self,
        account_key: &PKey<Private>,
        domains: &[String],
        certificate_key: &PKey<Private>,
    ) -> Result<CertificateBundle, TransportError> {
        let order = self.new_order(account_key, domains).await?;

        let order = order
            .wait_ready(ORDER_POLL_INTERVAL, 3)
            .await?;
        if order.status != OrderStatus::Ready {
            return Err(TransportError::UnexpectedState(format!(
                "order is {:?}, expected ready (are all domains verified?)",
                order.status
            )));
        }

        let order = order.finalize(Csr::Automatic(certificate_key.clone())).await?;
        let order = order
            .wait_done(ORDER_POLL_INTERVAL, 3)
            .await?;
        if order.status != OrderStatus::Valid {
            return Err(TransportError::UnexpectedState(format!(
                "order is {:?} after finalization, expected valid",
                order.status
            )));
        }

        let certs = order.certificate().await?.ok_or_else(|| {
            TransportError::UnexpectedState("CA returned no certificate".to_string())
        })?;
        let (leaf, chain) = certs.split_first().ok_or_else(|| {
            TransportError::UnexpectedState("CA returned an empty certificate chain".to_string())
        })?;

        self.pending.clear();

        Ok(CertificateBundle {
            chain_pem: concat_pem(chain)?,
            leaf_pem: leaf.to_pem()?,
            fullchain_pem: concat_pem(&certs)?,
        })
    }
}
