//! Webhook template rendering.
//!
//! Templates are Jinja (minijinja) with strict undefined behavior: any access
//! to a missing context field fails unless guarded with `is defined`.

use std::collections::BTreeMap;

use minijinja::{Environment, UndefinedBehavior};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::TemplateError;
use crate::domains::formation_assignment::models::non_empty_config;

/// Output of the URL template
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RenderedUrl {
    pub path: String,
    pub method: String,
}

/// Output of the output template: how to read a webhook response
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ResponseSpec {
    #[serde(default, alias = "configuration")]
    pub config: Option<Value>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    pub success_status_code: u16,
    #[serde(default)]
    pub incomplete_status_code: Option<u16>,
}

impl ResponseSpec {
    /// The configuration as a JSON value. JSON delivered inside a string is
    /// parsed; blank values mean "no configuration".
    pub fn configuration(&self) -> Option<Value> {
        let value = match self.config.clone() {
            Some(Value::String(raw)) => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    return None;
                }
                Some(serde_json::from_str(trimmed).unwrap_or(Value::String(raw)))
            }
            other => other,
        };
        non_empty_config(value)
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref().map(str::trim).filter(|e| !e.is_empty())
    }

    pub fn reported_state(&self) -> Option<&str> {
        self.state.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

pub struct TemplateRenderer {
    env: Environment<'static>,
}

impl TemplateRenderer {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        Self { env }
    }

    /// Render `source` to a string. `artifact` names the template in errors.
    pub fn render(
        &self,
        artifact: &'static str,
        source: &str,
        context: &Value,
    ) -> Result<String, TemplateError> {
        self.env
            .render_str(source, context)
            .map_err(|e| TemplateError::new(artifact, e.to_string()))
    }

    /// Render and parse the result as JSON.
    pub fn render_json<T: DeserializeOwned>(
        &self,
        artifact: &'static str,
        source: &str,
        context: &Value,
    ) -> Result<T, TemplateError> {
        let rendered = self.render(artifact, source, context)?;
        serde_json::from_str(&rendered).map_err(|e| {
            TemplateError::new(artifact, format!("rendered output is not valid JSON: {}", e))
        })
    }

    pub fn render_url(&self, source: &str, context: &Value) -> Result<RenderedUrl, TemplateError> {
        self.render_json("url", source, context)
    }

    /// The request body. Must render to valid JSON; sent as the rendered text.
    pub fn render_input(&self, source: &str, context: &Value) -> Result<String, TemplateError> {
        let rendered = self.render("input", source, context)?;
        serde_json::from_str::<Value>(&rendered).map_err(|e| {
            TemplateError::new("input", format!("rendered output is not valid JSON: {}", e))
        })?;
        Ok(rendered)
    }

    pub fn render_headers(
        &self,
        source: &str,
        context: &Value,
    ) -> Result<BTreeMap<String, String>, TemplateError> {
        self.render_json("header", source, context)
    }

    pub fn render_output(&self, source: &str, context: &Value) -> Result<ResponseSpec, TemplateError> {
        self.render_json("output", source, context)
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}
