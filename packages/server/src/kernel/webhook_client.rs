//! reqwest-backed webhook transport.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;

use super::{BaseWebhookClient, WebhookRequest, WebhookResponse};

pub struct HttpWebhookClient {
    client: reqwest::Client,
}

impl HttpWebhookClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build webhook HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl BaseWebhookClient for HttpWebhookClient {
    async fn send(&self, request: &WebhookRequest) -> Result<WebhookResponse> {
        let method = Method::from_bytes(request.method.to_uppercase().as_bytes())
            .with_context(|| format!("Invalid HTTP method: {}", request.method))?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            let has_content_type = request
                .headers
                .keys()
                .any(|k| k.eq_ignore_ascii_case(CONTENT_TYPE.as_str()));
            if !has_content_type {
                builder = builder.header(CONTENT_TYPE, "application/json");
            }
            builder = builder.body(body.clone());
        }

        let response = builder
            .send()
            .await
            .with_context(|| format!("Webhook request to {} failed", request.url))?;

        let status = response.status().as_u16();
        let mut headers = BTreeMap::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers
                    .entry(name.as_str().to_lowercase())
                    .or_insert_with(|| value.to_string());
            }
        }
        let body = response
            .text()
            .await
            .with_context(|| format!("Failed to read webhook response from {}", request.url))?;

        tracing::debug!(url = %request.url, status, "Webhook responded");

        Ok(WebhookResponse {
            status,
            headers,
            body,
        })
    }
}
