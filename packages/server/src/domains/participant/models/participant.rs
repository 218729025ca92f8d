use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::common::{ParticipantId, ParticipantTemplateId};

/// Participant - an application, runtime or runtime context that can be
/// assigned to formations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub kind: ParticipantKind,
    pub name: String,
    pub template_id: Option<ParticipantTemplateId>,
    /// Runtime that owns a runtime context
    pub parent_id: Option<ParticipantId>,
    /// Type label used by constraint filters (e.g. an application type)
    pub subtype: Option<String>,
    pub owner_tenant: String,
    pub integration_system_id: Option<String>,
    pub labels: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParticipantKind {
    Application,
    Runtime,
    RuntimeContext,
}

impl std::fmt::Display for ParticipantKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParticipantKind::Application => write!(f, "APPLICATION"),
            ParticipantKind::Runtime => write!(f, "RUNTIME"),
            ParticipantKind::RuntimeContext => write!(f, "RUNTIME_CONTEXT"),
        }
    }
}

impl std::str::FromStr for ParticipantKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "APPLICATION" => Ok(ParticipantKind::Application),
            "RUNTIME" => Ok(ParticipantKind::Runtime),
            "RUNTIME_CONTEXT" => Ok(ParticipantKind::RuntimeContext),
            _ => Err(anyhow::anyhow!("Invalid participant kind: {}", s)),
        }
    }
}

impl Participant {
    pub fn new(kind: ParticipantKind, name: impl Into<String>, owner_tenant: impl Into<String>) -> Self {
        Self {
            id: ParticipantId::new(),
            kind,
            name: name.into(),
            template_id: None,
            parent_id: None,
            subtype: None,
            owner_tenant: owner_tenant.into(),
            integration_system_id: None,
            labels: serde_json::json!({}),
            created_at: Utc::now(),
        }
    }

    pub fn with_template(mut self, template_id: ParticipantTemplateId) -> Self {
        self.template_id = Some(template_id);
        self
    }

    pub fn with_subtype(mut self, subtype: impl Into<String>) -> Self {
        self.subtype = Some(subtype.into());
        self
    }

    pub fn with_parent(mut self, parent_id: ParticipantId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_integration_system(mut self, integration_system_id: impl Into<String>) -> Self {
        self.integration_system_id = Some(integration_system_id.into());
        self
    }
}

// =============================================================================
// SQL Queries
// =============================================================================

#[derive(sqlx::FromRow)]
struct ParticipantRow {
    id: ParticipantId,
    kind: String,
    name: String,
    template_id: Option<ParticipantTemplateId>,
    parent_id: Option<ParticipantId>,
    subtype: Option<String>,
    owner_tenant: String,
    integration_system_id: Option<String>,
    labels: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl TryFrom<ParticipantRow> for Participant {
    type Error = anyhow::Error;

    fn try_from(row: ParticipantRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            kind: row.kind.parse()?,
            name: row.name,
            template_id: row.template_id,
            parent_id: row.parent_id,
            subtype: row.subtype,
            owner_tenant: row.owner_tenant,
            integration_system_id: row.integration_system_id,
            labels: row.labels,
            created_at: row.created_at,
        })
    }
}

impl Participant {
    pub async fn find_by_id(id: ParticipantId, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, ParticipantRow>("SELECT * FROM participants WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .map(Self::try_from)
            .transpose()
    }

    pub async fn upsert(&self, pool: &PgPool) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO participants
                (id, kind, name, template_id, parent_id, subtype, owner_tenant,
                 integration_system_id, labels, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                template_id = EXCLUDED.template_id,
                parent_id = EXCLUDED.parent_id,
                subtype = EXCLUDED.subtype,
                owner_tenant = EXCLUDED.owner_tenant,
                integration_system_id = EXCLUDED.integration_system_id,
                labels = EXCLUDED.labels
            "#,
        )
        .bind(self.id)
        .bind(self.kind.to_string())
        .bind(&self.name)
        .bind(self.template_id)
        .bind(self.parent_id)
        .bind(&self.subtype)
        .bind(&self.owner_tenant)
        .bind(&self.integration_system_id)
        .bind(&self.labels)
        .bind(self.created_at)
        .execute(pool)
        .await?;
        Ok(())
    }
}
