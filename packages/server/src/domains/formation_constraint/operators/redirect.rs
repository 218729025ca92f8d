use anyhow::{bail, Result};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::domains::webhook::TemplateRenderer;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RedirectInput {
    pub should_redirect: bool,
    /// Replacement URL, or base for a relative `url_template` path
    pub url: Option<String>,
    /// Replacement URL template rendering `{"path": ..., "method": ...}`
    pub url_template: Option<String>,
}

/// `RedirectNotification`: the URL the notification should go to instead,
/// or `None` when no redirect applies.
pub fn redirect_url(
    input: &RedirectInput,
    renderer: &TemplateRenderer,
    context: &Value,
) -> Result<Option<String>> {
    if !input.should_redirect {
        return Ok(None);
    }

    let Some(template) = &input.url_template else {
        return match &input.url {
            Some(url) => Ok(Some(url.clone())),
            None => bail!("redirect requested without url or url_template"),
        };
    };

    let rendered = renderer.render_url(template, context)?;
    if Url::parse(&rendered.path).is_ok() {
        return Ok(Some(rendered.path));
    }
    match &input.url {
        Some(base) => Ok(Some(Url::parse(base)?.join(&rendered.path)?.to_string())),
        None => bail!(
            "redirect path {:?} is relative and no base url was given",
            rendered.path
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_no_redirect_unless_requested() {
        let input = RedirectInput {
            should_redirect: false,
            url: Some("https://elsewhere.example.com".into()),
            url_template: None,
        };
        assert_eq!(
            redirect_url(&input, &TemplateRenderer::new(), &json!({})).unwrap(),
            None
        );
    }

    #[test]
    fn test_url_template_resolves_against_url() {
        let input = RedirectInput {
            should_redirect: true,
            url: Some("https://redirect.example.com/".into()),
            url_template: Some(
                r#"{"path": "/mappings/{{ formation.id }}", "method": "PATCH"}"#.into(),
            ),
        };
        let url = redirect_url(
            &input,
            &TemplateRenderer::new(),
            &json!({"formation": {"id": "f-1"}}),
        )
        .unwrap();
        assert_eq!(url.as_deref(), Some("https://redirect.example.com/mappings/f-1"));
    }

    #[test]
    fn test_redirect_without_target_fails() {
        let input = RedirectInput {
            should_redirect: true,
            ..Default::default()
        };
        assert!(redirect_url(&input, &TemplateRenderer::new(), &json!({})).is_err());
    }
}
