//! Test harness wiring the engine to in-memory infrastructure.
//!
//! Every test gets a fresh in-memory store, a mock webhook transport and a
//! mock destination service. Nothing is shared between tests.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use formation_core::domains::auth::{ConsumerType, JwtService};
use formation_core::kernel::{
    InMemoryFormationStore, MockDestinationService, MockWebhookClient, ServerDeps,
    TestDependencies,
};
use formation_core::server::build_app;
use serde_json::Value;
use test_context::AsyncTestContext;
use tower::ServiceExt;

pub const TEST_JWT_SECRET: &str = "test_secret_key";
pub const TEST_JWT_ISSUER: &str = "test_issuer";

/// Test harness with in-memory dependencies.
///
/// # Example using test-context
///
/// ```ignore
/// use test_context::test_context;
///
/// #[test_context(TestHarness)]
/// #[tokio::test]
/// async fn my_test(ctx: &TestHarness) {
///     let deps = ctx.deps();
///     // ... test code
/// }
/// ```
pub struct TestHarness {
    pub test_deps: TestDependencies,
    pub jwt_service: Arc<JwtService>,
}

impl AsyncTestContext for TestHarness {
    async fn setup() -> Self {
        Self::new()
    }

    async fn teardown(self) {
        // In-memory state is dropped with the harness
    }
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_dependencies(TestDependencies::new())
    }

    pub fn with_dependencies(test_deps: TestDependencies) -> Self {
        // Run tests with: RUST_LOG=debug cargo test -- --nocapture
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        Self {
            test_deps,
            jwt_service: Arc::new(JwtService::new(TEST_JWT_SECRET, TEST_JWT_ISSUER.to_string())),
        }
    }

    pub fn deps(&self) -> ServerDeps {
        self.test_deps.server_deps()
    }

    pub fn store(&self) -> &InMemoryFormationStore {
        &self.test_deps.store
    }

    pub fn webhooks(&self) -> &MockWebhookClient {
        &self.test_deps.webhooks
    }

    pub fn destinations(&self) -> &MockDestinationService {
        &self.test_deps.destinations
    }

    /// Router over this harness's dependencies.
    pub fn router(&self) -> Router {
        build_app(self.deps(), self.jwt_service.clone(), &[])
    }

    pub fn token(&self, consumer_id: &str, tenant_id: &str, consumer_type: ConsumerType) -> String {
        self.jwt_service
            .create_token(consumer_id, tenant_id, consumer_type)
            .expect("Failed to create test token")
    }

    /// Send a JSON request through the router. Returns the status and the
    /// parsed body (`Value::Null` when empty).
    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("Failed to build request");

        let response = self
            .router()
            .oneshot(request)
            .await
            .expect("Router failed");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read response body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, value)
    }

    /// Poll `check` until it returns true. Background work (woken reverse
    /// assignments, post-report resynchronization) runs on spawned tasks.
    pub async fn eventually<F, Fut>(&self, mut check: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        for _ in 0..100 {
            if check().await {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
