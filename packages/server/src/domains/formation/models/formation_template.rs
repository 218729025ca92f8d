use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::common::FormationTemplateId;
use crate::domains::participant::ParticipantKind;

/// FormationTemplate - the "type" of a formation
///
/// Scoped constraints and the formation lifecycle webhook are attached here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormationTemplate {
    pub id: FormationTemplateId,
    /// Also used as the formation type name by constraint `except` lists
    pub name: String,
    pub supports_reset: bool,
    /// Empty means every kind is accepted
    pub accepted_kinds: Vec<ParticipantKind>,
    pub created_at: DateTime<Utc>,
}

impl FormationTemplate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: FormationTemplateId::new(),
            name: name.into(),
            supports_reset: false,
            accepted_kinds: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_reset_support(mut self) -> Self {
        self.supports_reset = true;
        self
    }

    pub fn with_accepted_kinds(mut self, kinds: impl IntoIterator<Item = ParticipantKind>) -> Self {
        self.accepted_kinds = kinds.into_iter().collect();
        self
    }

    pub fn accepts(&self, kind: ParticipantKind) -> bool {
        self.accepted_kinds.is_empty() || self.accepted_kinds.contains(&kind)
    }
}

// =============================================================================
// SQL Queries
// =============================================================================

#[derive(sqlx::FromRow)]
struct FormationTemplateRow {
    id: FormationTemplateId,
    name: String,
    supports_reset: bool,
    accepted_kinds: Vec<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<FormationTemplateRow> for FormationTemplate {
    type Error = anyhow::Error;

    fn try_from(row: FormationTemplateRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            name: row.name,
            supports_reset: row.supports_reset,
            accepted_kinds: row
                .accepted_kinds
                .iter()
                .map(|k| k.parse())
                .collect::<Result<_>>()?,
            created_at: row.created_at,
        })
    }
}

impl FormationTemplate {
    pub async fn find_by_id(id: FormationTemplateId, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, FormationTemplateRow>("SELECT * FROM formation_templates WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .map(Self::try_from)
            .transpose()
    }

    pub async fn upsert(&self, pool: &PgPool) -> Result<()> {
        let kinds: Vec<String> = self.accepted_kinds.iter().map(|k| k.to_string()).collect();
        sqlx::query(
            r#"
            INSERT INTO formation_templates (id, name, supports_reset, accepted_kinds, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                supports_reset = EXCLUDED.supports_reset,
                accepted_kinds = EXCLUDED.accepted_kinds
            "#,
        )
        .bind(self.id)
        .bind(&self.name)
        .bind(self.supports_reset)
        .bind(kinds)
        .bind(self.created_at)
        .execute(pool)
        .await?;
        Ok(())
    }
}
