use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::common::ParticipantTemplateId;

/// Template a participant was registered from. Webhooks declared here are the
/// fallback for participants that declare none of the same type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ParticipantTemplate {
    pub id: ParticipantTemplateId,
    pub name: String,
    pub subtype: Option<String>,
}

impl ParticipantTemplate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ParticipantTemplateId::new(),
            name: name.into(),
            subtype: None,
        }
    }

    pub async fn find_by_id(id: ParticipantTemplateId, pool: &PgPool) -> Result<Option<Self>> {
        let template = sqlx::query_as::<_, ParticipantTemplate>(
            "SELECT * FROM participant_templates WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;
        Ok(template)
    }

    pub async fn upsert(&self, pool: &PgPool) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO participant_templates (id, name, subtype)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, subtype = EXCLUDED.subtype
            "#,
        )
        .bind(self.id)
        .bind(&self.name)
        .bind(&self.subtype)
        .execute(pool)
        .await?;
        Ok(())
    }
}
