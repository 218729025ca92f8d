//! Server dependencies for actions (using traits for testability)
//!
//! This module provides the central dependency container used by every
//! formation and assignment action. All external services sit behind traits.

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use destination_client::{Certificate, CertificateInput, DestinationClient, DestinationInput};

use crate::domains::webhook::template::TemplateRenderer;
use crate::kernel::store::BaseFormationStore;
use crate::kernel::{BaseDestinationService, BaseWebhookClient, FormationLocks};

// =============================================================================
// DestinationClient Adapter (implements BaseDestinationService trait)
// =============================================================================

/// Wrapper around DestinationClient that implements BaseDestinationService trait
pub struct DestinationAdapter(pub Arc<DestinationClient>);

impl DestinationAdapter {
    pub fn new(client: Arc<DestinationClient>) -> Self {
        Self(client)
    }
}

#[async_trait]
impl BaseDestinationService for DestinationAdapter {
    async fn create_destination(
        &self,
        subaccount: &str,
        destination: &DestinationInput,
    ) -> Result<()> {
        self.0
            .create_destination(subaccount, destination)
            .await
            .map_err(|e| anyhow::anyhow!("{}", e))
    }

    async fn delete_destination(&self, subaccount: &str, name: &str) -> Result<()> {
        self.0
            .delete_destination(subaccount, name)
            .await
            .map_err(|e| anyhow::anyhow!("{}", e))
    }

    async fn create_certificate(
        &self,
        subaccount: &str,
        certificate: &CertificateInput,
    ) -> Result<Certificate> {
        self.0
            .create_certificate(subaccount, certificate)
            .await
            .map_err(|e| anyhow::anyhow!("{}", e))
    }

    async fn delete_certificate(&self, subaccount: &str, name: &str) -> Result<()> {
        self.0
            .delete_certificate(subaccount, name)
            .await
            .map_err(|e| anyhow::anyhow!("{}", e))
    }
}

/// Used when no destination service is configured. Every call fails, which
/// surfaces as a technical error on the assignment being processed.
pub struct UnconfiguredDestinationService;

#[async_trait]
impl BaseDestinationService for UnconfiguredDestinationService {
    async fn create_destination(&self, _: &str, destination: &DestinationInput) -> Result<()> {
        bail!(
            "destination service is not configured; cannot create destination {}",
            destination.name
        )
    }

    async fn delete_destination(&self, _: &str, name: &str) -> Result<()> {
        bail!("destination service is not configured; cannot delete destination {}", name)
    }

    async fn create_certificate(&self, _: &str, certificate: &CertificateInput) -> Result<Certificate> {
        bail!(
            "destination service is not configured; cannot create certificate {}",
            certificate.name
        )
    }

    async fn delete_certificate(&self, _: &str, name: &str) -> Result<()> {
        bail!("destination service is not configured; cannot delete certificate {}", name)
    }
}

// =============================================================================
// ServerDeps
// =============================================================================

/// Engine policy knobs
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    /// Consecutive CONFIG_PENDING rounds allowed per assignment; 0 = unlimited
    pub config_pending_resend_limit: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            config_pending_resend_limit: 10,
        }
    }
}

/// Server dependencies accessible to actions (using traits for testability)
#[derive(Clone)]
pub struct ServerDeps {
    pub store: Arc<dyn BaseFormationStore>,
    pub webhook_client: Arc<dyn BaseWebhookClient>,
    pub destination_service: Arc<dyn BaseDestinationService>,
    pub renderer: Arc<TemplateRenderer>,
    pub locks: FormationLocks,
    pub settings: EngineSettings,
}

impl ServerDeps {
    pub fn new(
        store: Arc<dyn BaseFormationStore>,
        webhook_client: Arc<dyn BaseWebhookClient>,
        destination_service: Arc<dyn BaseDestinationService>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            webhook_client,
            destination_service,
            renderer: Arc::new(TemplateRenderer::new()),
            locks: FormationLocks::new(),
            settings,
        }
    }
}
