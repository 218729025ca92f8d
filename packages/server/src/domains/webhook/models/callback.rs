use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::common::{FormationAssignmentId, FormationId, NotificationRecordId, WebhookId};

/// Links an accepted asynchronous notification to whatever awaits its status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackCorrelation {
    pub subject: CallbackSubject,
    pub formation_id: FormationId,
    pub operation: String,
    pub webhook_id: WebhookId,
    pub notification_id: NotificationRecordId,
    pub accepted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallbackSubject {
    Assignment(FormationAssignmentId),
    Formation(FormationId),
}

impl CallbackSubject {
    pub fn id(&self) -> Uuid {
        match self {
            CallbackSubject::Assignment(id) => id.into_uuid(),
            CallbackSubject::Formation(id) => id.into_uuid(),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            CallbackSubject::Assignment(_) => "ASSIGNMENT",
            CallbackSubject::Formation(_) => "FORMATION",
        }
    }
}

// =============================================================================
// SQL Queries
// =============================================================================

#[derive(sqlx::FromRow)]
struct CallbackRow {
    subject_kind: String,
    subject_id: Uuid,
    formation_id: FormationId,
    operation: String,
    webhook_id: WebhookId,
    notification_id: NotificationRecordId,
    accepted_at: DateTime<Utc>,
}

impl TryFrom<CallbackRow> for CallbackCorrelation {
    type Error = anyhow::Error;

    fn try_from(row: CallbackRow) -> Result<Self> {
        let subject = match row.subject_kind.as_str() {
            "ASSIGNMENT" => CallbackSubject::Assignment(row.subject_id.into()),
            "FORMATION" => CallbackSubject::Formation(row.subject_id.into()),
            other => anyhow::bail!("Invalid callback subject kind: {}", other),
        };
        Ok(Self {
            subject,
            formation_id: row.formation_id,
            operation: row.operation,
            webhook_id: row.webhook_id,
            notification_id: row.notification_id,
            accepted_at: row.accepted_at,
        })
    }
}

impl CallbackCorrelation {
    pub async fn find(subject: CallbackSubject, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, CallbackRow>(
            "SELECT * FROM callback_correlations WHERE subject_kind = $1 AND subject_id = $2",
        )
        .bind(subject.kind())
        .bind(subject.id())
        .fetch_optional(pool)
        .await?
        .map(Self::try_from)
        .transpose()
    }

    /// A newer acceptance for the same subject replaces the older one.
    pub async fn upsert(&self, pool: &PgPool) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO callback_correlations
                (subject_kind, subject_id, formation_id, operation, webhook_id,
                 notification_id, accepted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (subject_kind, subject_id) DO UPDATE SET
                operation = EXCLUDED.operation,
                webhook_id = EXCLUDED.webhook_id,
                notification_id = EXCLUDED.notification_id,
                accepted_at = EXCLUDED.accepted_at
            "#,
        )
        .bind(self.subject.kind())
        .bind(self.subject.id())
        .bind(self.formation_id)
        .bind(&self.operation)
        .bind(self.webhook_id)
        .bind(self.notification_id)
        .bind(self.accepted_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn delete(subject: CallbackSubject, pool: &PgPool) -> Result<()> {
        sqlx::query("DELETE FROM callback_correlations WHERE subject_kind = $1 AND subject_id = $2")
            .bind(subject.kind())
            .bind(subject.id())
            .execute(pool)
            .await?;
        Ok(())
    }
}
