use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::PgPool;

use crate::common::{
    CustomerTenantContext, FormationId, FormationTemplateId, NotificationError, ParticipantId,
};

/// Formation - a named group of participants sharing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Formation {
    pub id: FormationId,
    pub name: String,
    pub template_id: FormationTemplateId,
    pub state: FormationState,
    pub error: Option<NotificationError>,
    pub tenant: CustomerTenantContext,
    /// Bumped on every persisted change
    pub revision: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle state of the formation itself (not of its assignments)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FormationState {
    Initial,
    Ready,
    CreateError,
    Deleting,
    DeleteError,
}

impl std::fmt::Display for FormationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FormationState::Initial => write!(f, "INITIAL"),
            FormationState::Ready => write!(f, "READY"),
            FormationState::CreateError => write!(f, "CREATE_ERROR"),
            FormationState::Deleting => write!(f, "DELETING"),
            FormationState::DeleteError => write!(f, "DELETE_ERROR"),
        }
    }
}

impl std::str::FromStr for FormationState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "INITIAL" => Ok(FormationState::Initial),
            "READY" => Ok(FormationState::Ready),
            "CREATE_ERROR" => Ok(FormationState::CreateError),
            "DELETING" => Ok(FormationState::Deleting),
            "DELETE_ERROR" => Ok(FormationState::DeleteError),
            _ => Err(anyhow::anyhow!("Invalid formation state: {}", s)),
        }
    }
}

impl FormationState {
    /// States reached while deleting the formation
    pub fn is_delete_side(&self) -> bool {
        matches!(self, FormationState::Deleting | FormationState::DeleteError)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, FormationState::CreateError | FormationState::DeleteError)
    }
}

/// Lifecycle operation a formation in a given state is negotiating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleOperation {
    Create,
    Delete,
}

impl LifecycleOperation {
    /// Name exposed to templates as `operation`
    pub fn template_name(&self) -> &'static str {
        match self {
            LifecycleOperation::Create => "create",
            LifecycleOperation::Delete => "delete",
        }
    }

    pub fn error_state(&self) -> FormationState {
        match self {
            LifecycleOperation::Create => FormationState::CreateError,
            LifecycleOperation::Delete => FormationState::DeleteError,
        }
    }
}

impl Formation {
    pub fn new(
        name: impl Into<String>,
        template_id: FormationTemplateId,
        tenant: CustomerTenantContext,
        state: FormationState,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: FormationId::new(),
            name: name.into(),
            template_id,
            state,
            error: None,
            tenant,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn lifecycle_operation(&self) -> LifecycleOperation {
        if self.state.is_delete_side() {
            LifecycleOperation::Delete
        } else {
            LifecycleOperation::Create
        }
    }

    /// Move to `state`, replacing the recorded error.
    pub fn transition(&mut self, state: FormationState, error: Option<NotificationError>) {
        self.state = state;
        self.error = error;
        self.revision += 1;
        self.updated_at = Utc::now();
    }
}

// =============================================================================
// SQL Queries
// =============================================================================

#[derive(sqlx::FromRow)]
struct FormationRow {
    id: FormationId,
    name: String,
    template_id: FormationTemplateId,
    state: String,
    error: Option<Json<NotificationError>>,
    tenant: Json<CustomerTenantContext>,
    revision: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<FormationRow> for Formation {
    type Error = anyhow::Error;

    fn try_from(row: FormationRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            name: row.name,
            template_id: row.template_id,
            state: row.state.parse()?,
            error: row.error.map(|e| e.0),
            tenant: row.tenant.0,
            revision: row.revision,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl Formation {
    pub async fn find_by_id(id: FormationId, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, FormationRow>("SELECT * FROM formations WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .map(Self::try_from)
            .transpose()
    }

    /// Formations any of whose assignments involve the participant
    pub async fn find_for_participant(participant_id: ParticipantId, pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, FormationRow>(
            r#"
            SELECT f.* FROM formations f
            WHERE EXISTS (
                SELECT 1 FROM formation_assignments fa
                WHERE fa.formation_id = f.id AND (fa.source = $1 OR fa.target = $1)
            )
            ORDER BY f.created_at
            "#,
        )
        .bind(participant_id)
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(Self::try_from)
        .collect()
    }

    pub async fn insert(&self, pool: &PgPool) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO formations
                (id, name, template_id, state, error, tenant, revision, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(self.id)
        .bind(&self.name)
        .bind(self.template_id)
        .bind(self.state.to_string())
        .bind(self.error.as_ref().map(Json))
        .bind(Json(&self.tenant))
        .bind(self.revision)
        .bind(self.created_at)
        .bind(self.updated_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn update(&self, pool: &PgPool) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE formations
            SET state = $2, error = $3, revision = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(self.id)
        .bind(self.state.to_string())
        .bind(self.error.as_ref().map(Json))
        .bind(self.revision)
        .bind(self.updated_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn delete(id: FormationId, pool: &PgPool) -> Result<bool> {
        let result = sqlx::query("DELETE FROM formations WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
