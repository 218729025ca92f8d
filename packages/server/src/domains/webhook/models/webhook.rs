use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::common::{FormationTemplateId, ParticipantId, ParticipantTemplateId, WebhookId};

/// Webhook - an endpoint declared by a participant or a template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Webhook {
    pub id: WebhookId,
    pub owner: WebhookOwner,
    pub webhook_type: WebhookType,
    pub mode: WebhookMode,
    /// Base URL that relative rendered paths resolve against
    pub url: Option<String>,
    /// Renders `{"path": ..., "method": ...}`
    pub url_template: String,
    pub input_template: Option<String>,
    pub header_template: Option<String>,
    /// Renders the normalized result from `body`, `headers` and `status_code`
    pub output_template: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WebhookOwner {
    Participant(ParticipantId),
    ParticipantTemplate(ParticipantTemplateId),
    FormationTemplate(FormationTemplateId),
}

impl WebhookOwner {
    pub fn kind(&self) -> &'static str {
        match self {
            WebhookOwner::Participant(_) => "PARTICIPANT",
            WebhookOwner::ParticipantTemplate(_) => "PARTICIPANT_TEMPLATE",
            WebhookOwner::FormationTemplate(_) => "FORMATION_TEMPLATE",
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            WebhookOwner::Participant(id) => id.into_uuid(),
            WebhookOwner::ParticipantTemplate(id) => id.into_uuid(),
            WebhookOwner::FormationTemplate(id) => id.into_uuid(),
        }
    }

    fn from_parts(kind: &str, id: Uuid) -> Result<Self> {
        match kind {
            "PARTICIPANT" => Ok(WebhookOwner::Participant(id.into())),
            "PARTICIPANT_TEMPLATE" => Ok(WebhookOwner::ParticipantTemplate(id.into())),
            "FORMATION_TEMPLATE" => Ok(WebhookOwner::FormationTemplate(id.into())),
            _ => Err(anyhow::anyhow!("Invalid webhook owner kind: {}", kind)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WebhookType {
    /// Assign/unassign notifications about a peer participant
    TenantMapping,
    /// Create/delete notifications about the formation itself
    FormationLifecycle,
}

impl std::fmt::Display for WebhookType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WebhookType::TenantMapping => write!(f, "TENANT_MAPPING"),
            WebhookType::FormationLifecycle => write!(f, "FORMATION_LIFECYCLE"),
        }
    }
}

impl std::str::FromStr for WebhookType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "TENANT_MAPPING" => Ok(WebhookType::TenantMapping),
            "FORMATION_LIFECYCLE" => Ok(WebhookType::FormationLifecycle),
            _ => Err(anyhow::anyhow!("Invalid webhook type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WebhookMode {
    Sync,
    /// The response only acknowledges receipt; the result arrives via the Status API
    AsyncCallback,
}

impl std::fmt::Display for WebhookMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WebhookMode::Sync => write!(f, "SYNC"),
            WebhookMode::AsyncCallback => write!(f, "ASYNC_CALLBACK"),
        }
    }
}

impl std::str::FromStr for WebhookMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "SYNC" => Ok(WebhookMode::Sync),
            "ASYNC_CALLBACK" => Ok(WebhookMode::AsyncCallback),
            _ => Err(anyhow::anyhow!("Invalid webhook mode: {}", s)),
        }
    }
}

impl Webhook {
    pub fn new(
        owner: WebhookOwner,
        webhook_type: WebhookType,
        mode: WebhookMode,
        url_template: impl Into<String>,
        output_template: impl Into<String>,
    ) -> Self {
        Self {
            id: WebhookId::new(),
            owner,
            webhook_type,
            mode,
            url: None,
            url_template: url_template.into(),
            input_template: None,
            header_template: None,
            output_template: output_template.into(),
            created_at: Utc::now(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_input_template(mut self, template: impl Into<String>) -> Self {
        self.input_template = Some(template.into());
        self
    }

    pub fn with_header_template(mut self, template: impl Into<String>) -> Self {
        self.header_template = Some(template.into());
        self
    }
}

// =============================================================================
// SQL Queries
// =============================================================================

#[derive(sqlx::FromRow)]
struct WebhookRow {
    id: WebhookId,
    owner_kind: String,
    owner_id: Uuid,
    webhook_type: String,
    mode: String,
    url: Option<String>,
    url_template: String,
    input_template: Option<String>,
    header_template: Option<String>,
    output_template: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<WebhookRow> for Webhook {
    type Error = anyhow::Error;

    fn try_from(row: WebhookRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            owner: WebhookOwner::from_parts(&row.owner_kind, row.owner_id)?,
            webhook_type: row.webhook_type.parse()?,
            mode: row.mode.parse()?,
            url: row.url,
            url_template: row.url_template,
            input_template: row.input_template,
            header_template: row.header_template,
            output_template: row.output_template,
            created_at: row.created_at,
        })
    }
}

impl Webhook {
    pub async fn find_by_owner(owner: &WebhookOwner, pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, WebhookRow>(
            "SELECT * FROM webhooks WHERE owner_kind = $1 AND owner_id = $2 ORDER BY created_at",
        )
        .bind(owner.kind())
        .bind(owner.id())
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(Self::try_from)
        .collect()
    }

    pub async fn upsert(&self, pool: &PgPool) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO webhooks
                (id, owner_kind, owner_id, webhook_type, mode, url, url_template,
                 input_template, header_template, output_template, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO UPDATE SET
                mode = EXCLUDED.mode,
                url = EXCLUDED.url,
                url_template = EXCLUDED.url_template,
                input_template = EXCLUDED.input_template,
                header_template = EXCLUDED.header_template,
                output_template = EXCLUDED.output_template
            "#,
        )
        .bind(self.id)
        .bind(self.owner.kind())
        .bind(self.owner.id())
        .bind(self.webhook_type.to_string())
        .bind(self.mode.to_string())
        .bind(&self.url)
        .bind(&self.url_template)
        .bind(&self.input_template)
        .bind(&self.header_template)
        .bind(&self.output_template)
        .bind(self.created_at)
        .execute(pool)
        .await?;
        Ok(())
    }
}
