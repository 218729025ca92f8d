// TestDependencies - mock implementations for testing
//
// Provides mock services that can be injected into ServerDeps for tests.
// Responses can be changed while a test runs, so a webhook can fail first and
// succeed after a "fix".

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use destination_client::{Certificate, CertificateInput, DestinationInput};

use super::store::InMemoryFormationStore;
use super::{
    BaseDestinationService, BaseWebhookClient, EngineSettings, ServerDeps, WebhookRequest,
    WebhookResponse,
};

// =============================================================================
// Mock Webhook Client
// =============================================================================

type Responder = Arc<dyn Fn(&WebhookRequest) -> WebhookResponse + Send + Sync>;

#[derive(Clone)]
enum MockReply {
    Respond(WebhookResponse),
    Dynamic(Responder),
    TransportFailure(String),
}

impl MockReply {
    fn produce(&self, request: &WebhookRequest) -> Result<WebhookResponse> {
        match self {
            MockReply::Respond(response) => Ok(response.clone()),
            MockReply::Dynamic(f) => Ok(f(request)),
            MockReply::TransportFailure(message) => Err(anyhow::anyhow!("{}", message)),
        }
    }
}

/// Webhook transport keyed by exact request URL.
///
/// One-shot replies queued with `push_*` are consumed first; afterwards the
/// sticky reply set with `respond*` is used. Unknown URLs answer 404.
#[derive(Default)]
pub struct MockWebhookClient {
    sticky: Mutex<HashMap<String, MockReply>>,
    queued: Mutex<HashMap<String, VecDeque<MockReply>>>,
    requests: Mutex<Vec<WebhookRequest>>,
}

impl MockWebhookClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer `url` with this status and body.
    pub fn respond(&self, url: &str, status: u16, body: &str) {
        self.sticky.lock().unwrap().insert(
            url.to_string(),
            MockReply::Respond(WebhookResponse::new(status, body)),
        );
    }

    /// Always answer `url` by calling `f` with the request.
    pub fn respond_with<F>(&self, url: &str, f: F)
    where
        F: Fn(&WebhookRequest) -> WebhookResponse + Send + Sync + 'static,
    {
        self.sticky
            .lock()
            .unwrap()
            .insert(url.to_string(), MockReply::Dynamic(Arc::new(f)));
    }

    /// Always fail requests to `url` at the transport level.
    pub fn fail_transport(&self, url: &str) {
        self.sticky.lock().unwrap().insert(
            url.to_string(),
            MockReply::TransportFailure(format!("connection refused: {}", url)),
        );
    }

    /// Answer the next request to `url` with this status and body.
    pub fn push_response(&self, url: &str, status: u16, body: &str) {
        self.queued
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(MockReply::Respond(WebhookResponse::new(status, body)));
    }

    /// Get every request sent so far
    pub fn requests(&self) -> Vec<WebhookRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Get the requests sent to one URL
    pub fn requests_to(&self, url: &str) -> Vec<WebhookRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url == url)
            .cloned()
            .collect()
    }

    pub fn clear_requests(&self) {
        self.requests.lock().unwrap().clear();
    }
}

#[async_trait]
impl BaseWebhookClient for MockWebhookClient {
    async fn send(&self, request: &WebhookRequest) -> Result<WebhookResponse> {
        // Record the call
        self.requests.lock().unwrap().push(request.clone());

        let queued = self
            .queued
            .lock()
            .unwrap()
            .get_mut(&request.url)
            .and_then(|q| q.pop_front());
        let reply = queued.or_else(|| self.sticky.lock().unwrap().get(&request.url).cloned());

        match reply {
            Some(reply) => reply.produce(request),
            None => Ok(WebhookResponse::new(404, "")),
        }
    }
}

// =============================================================================
// Mock Destination Service
// =============================================================================

#[derive(Default)]
pub struct MockDestinationService {
    created_destinations: Mutex<Vec<(String, DestinationInput)>>,
    deleted_destinations: Mutex<Vec<(String, String)>>,
    created_certificates: Mutex<Vec<(String, CertificateInput)>>,
    deleted_certificates: Mutex<Vec<(String, String)>>,
    failing: Mutex<bool>,
}

impl MockDestinationService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    pub fn created_destinations(&self) -> Vec<DestinationInput> {
        self.created_destinations
            .lock()
            .unwrap()
            .iter()
            .map(|(_, d)| d.clone())
            .collect()
    }

    pub fn deleted_destinations(&self) -> Vec<String> {
        self.deleted_destinations
            .lock()
            .unwrap()
            .iter()
            .map(|(_, name)| name.clone())
            .collect()
    }

    pub fn created_certificates(&self) -> Vec<CertificateInput> {
        self.created_certificates
            .lock()
            .unwrap()
            .iter()
            .map(|(_, c)| c.clone())
            .collect()
    }

    pub fn deleted_certificates(&self) -> Vec<String> {
        self.deleted_certificates
            .lock()
            .unwrap()
            .iter()
            .map(|(_, name)| name.clone())
            .collect()
    }

    fn check(&self) -> Result<()> {
        if *self.failing.lock().unwrap() {
            anyhow::bail!("destination service unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl BaseDestinationService for MockDestinationService {
    async fn create_destination(
        &self,
        subaccount: &str,
        destination: &DestinationInput,
    ) -> Result<()> {
        self.check()?;
        self.created_destinations
            .lock()
            .unwrap()
            .push((subaccount.to_string(), destination.clone()));
        Ok(())
    }

    async fn delete_destination(&self, subaccount: &str, name: &str) -> Result<()> {
        self.check()?;
        self.deleted_destinations
            .lock()
            .unwrap()
            .push((subaccount.to_string(), name.to_string()));
        Ok(())
    }

    async fn create_certificate(
        &self,
        subaccount: &str,
        certificate: &CertificateInput,
    ) -> Result<Certificate> {
        self.check()?;
        self.created_certificates
            .lock()
            .unwrap()
            .push((subaccount.to_string(), certificate.clone()));
        Ok(Certificate {
            name: certificate.name.clone(),
            file_type: certificate.file_type.clone(),
            content: format!("mock-certificate-{}", certificate.name),
            certificate_chain: format!("mock-chain-{}", certificate.name),
        })
    }

    async fn delete_certificate(&self, subaccount: &str, name: &str) -> Result<()> {
        self.check()?;
        self.deleted_certificates
            .lock()
            .unwrap()
            .push((subaccount.to_string(), name.to_string()));
        Ok(())
    }
}

// =============================================================================
// TestDependencies
// =============================================================================

/// In-memory store plus mocks, with handles kept for assertions
#[derive(Clone)]
pub struct TestDependencies {
    pub store: Arc<InMemoryFormationStore>,
    pub webhooks: Arc<MockWebhookClient>,
    pub destinations: Arc<MockDestinationService>,
    pub settings: EngineSettings,
}

impl TestDependencies {
    pub fn new() -> Self {
        Self {
            store: Arc::new(InMemoryFormationStore::new()),
            webhooks: Arc::new(MockWebhookClient::new()),
            destinations: Arc::new(MockDestinationService::new()),
            settings: EngineSettings::default(),
        }
    }

    pub fn with_resend_limit(mut self, limit: u32) -> Self {
        self.settings.config_pending_resend_limit = limit;
        self
    }

    pub fn server_deps(&self) -> ServerDeps {
        ServerDeps::new(
            self.store.clone(),
            self.webhooks.clone(),
            self.destinations.clone(),
            self.settings,
        )
    }
}

impl Default for TestDependencies {
    fn default() -> Self {
        Self::new()
    }
}
