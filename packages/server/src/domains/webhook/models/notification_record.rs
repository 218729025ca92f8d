use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::PgPool;

use crate::common::{
    FormationAssignmentId, FormationId, NotificationError, NotificationRecordId, ParticipantId,
    WebhookId,
};
use crate::domains::webhook::models::WebhookMode;

/// Audit entry for one dispatched webhook call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: NotificationRecordId,
    pub formation_id: FormationId,
    /// None for formation lifecycle notifications
    pub assignment_id: Option<FormationAssignmentId>,
    /// The participant the notification was addressed to, before any redirect
    pub target_id: Option<ParticipantId>,
    pub webhook_id: WebhookId,
    pub operation: String,
    pub mode: WebhookMode,
    pub request_method: String,
    /// URL actually called, after redirects
    pub request_url: String,
    pub request_body: Option<String>,
    pub outcome: NotificationOutcome,
    pub response_status: Option<i32>,
    pub error: Option<NotificationError>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationOutcome {
    Succeeded,
    Incomplete,
    Accepted,
    Failed,
}

impl std::fmt::Display for NotificationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationOutcome::Succeeded => write!(f, "SUCCEEDED"),
            NotificationOutcome::Incomplete => write!(f, "INCOMPLETE"),
            NotificationOutcome::Accepted => write!(f, "ACCEPTED"),
            NotificationOutcome::Failed => write!(f, "FAILED"),
        }
    }
}

impl std::str::FromStr for NotificationOutcome {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "SUCCEEDED" => Ok(NotificationOutcome::Succeeded),
            "INCOMPLETE" => Ok(NotificationOutcome::Incomplete),
            "ACCEPTED" => Ok(NotificationOutcome::Accepted),
            "FAILED" => Ok(NotificationOutcome::Failed),
            _ => Err(anyhow::anyhow!("Invalid notification outcome: {}", s)),
        }
    }
}

// =============================================================================
// SQL Queries
// =============================================================================

#[derive(sqlx::FromRow)]
struct NotificationRecordRow {
    id: NotificationRecordId,
    formation_id: FormationId,
    assignment_id: Option<FormationAssignmentId>,
    target_id: Option<ParticipantId>,
    webhook_id: WebhookId,
    operation: String,
    mode: String,
    request_method: String,
    request_url: String,
    request_body: Option<String>,
    outcome: String,
    response_status: Option<i32>,
    error: Option<Json<NotificationError>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<NotificationRecordRow> for NotificationRecord {
    type Error = anyhow::Error;

    fn try_from(row: NotificationRecordRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            formation_id: row.formation_id,
            assignment_id: row.assignment_id,
            target_id: row.target_id,
            webhook_id: row.webhook_id,
            operation: row.operation,
            mode: row.mode.parse()?,
            request_method: row.request_method,
            request_url: row.request_url,
            request_body: row.request_body,
            outcome: row.outcome.parse()?,
            response_status: row.response_status,
            error: row.error.map(|e| e.0),
            created_at: row.created_at,
        })
    }
}

impl NotificationRecord {
    pub async fn find_by_target(target_id: ParticipantId, pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, NotificationRecordRow>(
            "SELECT * FROM notification_records WHERE target_id = $1 ORDER BY created_at, id",
        )
        .bind(target_id)
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(Self::try_from)
        .collect()
    }

    pub async fn find_by_formation(formation_id: FormationId, pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, NotificationRecordRow>(
            "SELECT * FROM notification_records WHERE formation_id = $1 ORDER BY created_at, id",
        )
        .bind(formation_id)
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(Self::try_from)
        .collect()
    }

    pub async fn insert(&self, pool: &PgPool) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO notification_records
                (id, formation_id, assignment_id, target_id, webhook_id, operation, mode,
                 request_method, request_url, request_body, outcome, response_status,
                 error, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(self.id)
        .bind(self.formation_id)
        .bind(self.assignment_id)
        .bind(self.target_id)
        .bind(self.webhook_id)
        .bind(&self.operation)
        .bind(self.mode.to_string())
        .bind(&self.request_method)
        .bind(&self.request_url)
        .bind(&self.request_body)
        .bind(self.outcome.to_string())
        .bind(self.response_status)
        .bind(self.error.as_ref().map(Json))
        .bind(self.created_at)
        .execute(pool)
        .await?;
        Ok(())
    }
}
