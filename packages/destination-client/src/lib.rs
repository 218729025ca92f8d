//! Destination service REST client.
//!
//! A minimal client for the subaccount-level destination and certificate
//! endpoints. Creation is idempotent: a conflict means the resource already
//! exists. Deletion of a missing resource is not an error.
//!
//! # Example
//!
//! ```rust,ignore
//! use destination_client::{DestinationClient, DestinationInput};
//!
//! let client = DestinationClient::new("https://destinations.example.com".into(), token);
//! client.create_destination("subaccount-id", &input).await?;
//! ```

pub mod error;
pub mod types;

pub use error::{DestinationError, Result};
pub use types::{Certificate, CertificateInput, DestinationInput};

use reqwest::StatusCode;

const API_PREFIX: &str = "destination-configuration/v1/subaccountDestinations";
const CERTIFICATE_PREFIX: &str = "destination-configuration/v1/subaccountCertificates";

pub struct DestinationClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl DestinationClient {
    pub fn new(base_url: String, token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn url(&self, prefix: &str, subaccount_id: &str, name: Option<&str>) -> String {
        match name {
            Some(name) => format!("{}/{}/{}/{}", self.base_url, prefix, subaccount_id, name),
            None => format!("{}/{}/{}", self.base_url, prefix, subaccount_id),
        }
    }

    /// Create a destination in the given subaccount.
    pub async fn create_destination(
        &self,
        subaccount_id: &str,
        destination: &DestinationInput,
    ) -> Result<()> {
        if destination.name.is_empty() {
            return Err(DestinationError::InvalidInput(
                "destination name must not be empty".to_string(),
            ));
        }

        let resp = self
            .client
            .post(self.url(API_PREFIX, subaccount_id, None))
            .bearer_auth(&self.token)
            .json(destination)
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::CONFLICT {
            tracing::debug!(name = %destination.name, "Destination already exists");
            return Ok(());
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DestinationError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        tracing::info!(name = %destination.name, subaccount_id, "Destination created");
        Ok(())
    }

    /// Delete a destination. Missing destinations are treated as deleted.
    pub async fn delete_destination(&self, subaccount_id: &str, name: &str) -> Result<()> {
        let resp = self
            .client
            .delete(self.url(API_PREFIX, subaccount_id, Some(name)))
            .bearer_auth(&self.token)
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            tracing::debug!(name, "Destination already deleted");
            return Ok(());
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DestinationError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        tracing::info!(name, subaccount_id, "Destination deleted");
        Ok(())
    }

    /// Issue a certificate and return its material.
    pub async fn create_certificate(
        &self,
        subaccount_id: &str,
        input: &CertificateInput,
    ) -> Result<Certificate> {
        let resp = self
            .client
            .post(self.url(CERTIFICATE_PREFIX, subaccount_id, None))
            .bearer_auth(&self.token)
            .json(input)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DestinationError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let certificate: Certificate = resp.json().await?;
        tracing::info!(name = %certificate.name, subaccount_id, "Certificate created");
        Ok(certificate)
    }

    /// Delete a certificate. Missing certificates are treated as deleted.
    pub async fn delete_certificate(&self, subaccount_id: &str, name: &str) -> Result<()> {
        let resp = self
            .client
            .delete(self.url(CERTIFICATE_PREFIX, subaccount_id, Some(name)))
            .bearer_auth(&self.token)
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DestinationError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        tracing::info!(name, subaccount_id, "Certificate deleted");
        Ok(())
    }
}
