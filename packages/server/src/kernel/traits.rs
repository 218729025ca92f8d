// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// Assignment and formation logic lives in the domains and reaches the outside
// world through these traits.
//
// Naming convention: Base* for trait names (e.g., BaseWebhookClient)

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use destination_client::{Certificate, CertificateInput, DestinationInput};
use serde::{Deserialize, Serialize};

// =============================================================================
// Webhook HTTP Trait
// =============================================================================

/// A fully rendered outbound webhook call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookRequest {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
}

/// Raw response handed back to the output template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub status: u16,
    /// Lowercase header names, first value only
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl WebhookResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }
}

#[async_trait]
pub trait BaseWebhookClient: Send + Sync {
    /// Issue the request. Any HTTP status is a successful return; only
    /// transport failures (connect, timeout) are errors.
    async fn send(&self, request: &WebhookRequest) -> Result<WebhookResponse>;
}

// =============================================================================
// Destination Service Trait
// =============================================================================

#[async_trait]
pub trait BaseDestinationService: Send + Sync {
    async fn create_destination(&self, subaccount: &str, destination: &DestinationInput)
        -> Result<()>;

    async fn delete_destination(&self, subaccount: &str, name: &str) -> Result<()>;

    async fn create_certificate(
        &self,
        subaccount: &str,
        certificate: &CertificateInput,
    ) -> Result<Certificate>;

    async fn delete_certificate(&self, subaccount: &str, name: &str) -> Result<()>;
}
