use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};

use crate::common::{FormationAssignmentId, FormationId, NotificationError, ParticipantId};
use crate::domains::participant::ParticipantKind;
use crate::kernel::store::AssignmentPlan;

/// FormationAssignment - the directed relationship from `source` to `target`
///
/// Notifications for an assignment are sent to the target and describe the
/// source. Every ordered pair of formation participants has exactly one row,
/// self-pairs included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormationAssignment {
    pub id: FormationAssignmentId,
    pub formation_id: FormationId,
    pub source: ParticipantId,
    pub source_type: ParticipantKind,
    pub target: ParticipantId,
    pub target_type: ParticipantKind,
    pub state: AssignmentState,
    /// Operation this assignment is currently negotiating
    pub last_operation: AssignmentOperation,
    /// Last successfully negotiated configuration
    pub configuration: Option<serde_json::Value>,
    /// Latest raw configuration payload, possibly still pending
    pub value: Option<serde_json::Value>,
    pub error: Option<NotificationError>,
    /// Consecutive CONFIG_PENDING results
    pub config_pending_rounds: i32,
    pub last_status_reported_at: Option<DateTime<Utc>>,
    /// Bumped on every persisted change
    pub revision: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentState {
    Initial,
    Ready,
    ConfigPending,
    CreateError,
    Deleting,
    DeleteError,
}

impl std::fmt::Display for AssignmentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssignmentState::Initial => write!(f, "INITIAL"),
            AssignmentState::Ready => write!(f, "READY"),
            AssignmentState::ConfigPending => write!(f, "CONFIG_PENDING"),
            AssignmentState::CreateError => write!(f, "CREATE_ERROR"),
            AssignmentState::Deleting => write!(f, "DELETING"),
            AssignmentState::DeleteError => write!(f, "DELETE_ERROR"),
        }
    }
}

impl std::str::FromStr for AssignmentState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "INITIAL" => Ok(AssignmentState::Initial),
            "READY" => Ok(AssignmentState::Ready),
            "CONFIG_PENDING" => Ok(AssignmentState::ConfigPending),
            "CREATE_ERROR" => Ok(AssignmentState::CreateError),
            "DELETING" => Ok(AssignmentState::Deleting),
            "DELETE_ERROR" => Ok(AssignmentState::DeleteError),
            _ => Err(anyhow::anyhow!("Invalid assignment state: {}", s)),
        }
    }
}

impl AssignmentState {
    pub fn is_error(&self) -> bool {
        matches!(self, AssignmentState::CreateError | AssignmentState::DeleteError)
    }

    /// Neither READY nor an error: a notification round is still open
    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            AssignmentState::Initial | AssignmentState::ConfigPending | AssignmentState::Deleting
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentOperation {
    Assign,
    Unassign,
}

impl AssignmentOperation {
    /// Name exposed to templates as `operation`
    pub fn template_name(&self) -> &'static str {
        match self {
            AssignmentOperation::Assign => "assign",
            AssignmentOperation::Unassign => "unassign",
        }
    }

    /// Error state a failed notification for this operation lands in
    pub fn error_state(&self) -> AssignmentState {
        match self {
            AssignmentOperation::Assign => AssignmentState::CreateError,
            AssignmentOperation::Unassign => AssignmentState::DeleteError,
        }
    }
}

impl std::fmt::Display for AssignmentOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssignmentOperation::Assign => write!(f, "ASSIGN"),
            AssignmentOperation::Unassign => write!(f, "UNASSIGN"),
        }
    }
}

impl std::str::FromStr for AssignmentOperation {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ASSIGN" => Ok(AssignmentOperation::Assign),
            "UNASSIGN" => Ok(AssignmentOperation::Unassign),
            _ => Err(anyhow::anyhow!("Invalid assignment operation: {}", s)),
        }
    }
}

impl FormationAssignment {
    pub fn new(
        formation_id: FormationId,
        source: (ParticipantId, ParticipantKind),
        target: (ParticipantId, ParticipantKind),
    ) -> Self {
        let now = Utc::now();
        Self {
            id: FormationAssignmentId::new(),
            formation_id,
            source: source.0,
            source_type: source.1,
            target: target.0,
            target_type: target.1,
            state: AssignmentState::Initial,
            last_operation: AssignmentOperation::Assign,
            configuration: None,
            value: None,
            error: None,
            config_pending_rounds: 0,
            last_status_reported_at: None,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_self_pair(&self) -> bool {
        self.source == self.target
    }

    pub fn involves(&self, participant_id: ParticipantId) -> bool {
        self.source == participant_id || self.target == participant_id
    }

    /// Whether a notification round is due for the current operation
    pub fn awaits_notification(&self) -> bool {
        match self.last_operation {
            AssignmentOperation::Assign => matches!(
                self.state,
                AssignmentState::Initial | AssignmentState::ConfigPending
            ),
            AssignmentOperation::Unassign => self.state == AssignmentState::Deleting,
        }
    }

    /// Mark a persisted change.
    pub fn touch(&mut self) {
        self.revision += 1;
        self.updated_at = Utc::now();
    }
}

/// Treat JSON null, empty strings and empty objects as "no configuration".
pub fn non_empty_config(value: Option<serde_json::Value>) -> Option<serde_json::Value> {
    match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) if s.trim().is_empty() => None,
        Some(serde_json::Value::Object(map)) if map.is_empty() => None,
        other => other,
    }
}

// =============================================================================
// SQL Queries
// =============================================================================

#[derive(sqlx::FromRow)]
struct AssignmentRow {
    id: FormationAssignmentId,
    formation_id: FormationId,
    source: ParticipantId,
    source_type: String,
    target: ParticipantId,
    target_type: String,
    state: String,
    last_operation: String,
    configuration: Option<serde_json::Value>,
    value: Option<serde_json::Value>,
    error: Option<Json<NotificationError>>,
    config_pending_rounds: i32,
    last_status_reported_at: Option<DateTime<Utc>>,
    revision: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AssignmentRow> for FormationAssignment {
    type Error = anyhow::Error;

    fn try_from(row: AssignmentRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            formation_id: row.formation_id,
            source: row.source,
            source_type: row.source_type.parse()?,
            target: row.target,
            target_type: row.target_type.parse()?,
            state: row.state.parse()?,
            last_operation: row.last_operation.parse()?,
            configuration: row.configuration,
            value: row.value,
            error: row.error.map(|e| e.0),
            config_pending_rounds: row.config_pending_rounds,
            last_status_reported_at: row.last_status_reported_at,
            revision: row.revision,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn collect_rows(rows: Vec<AssignmentRow>) -> Result<Vec<FormationAssignment>> {
    rows.into_iter().map(FormationAssignment::try_from).collect()
}

impl FormationAssignment {
    pub async fn find_by_id(id: FormationAssignmentId, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, AssignmentRow>("SELECT * FROM formation_assignments WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .map(Self::try_from)
            .transpose()
    }

    pub async fn find_by_pair(
        formation_id: FormationId,
        source: ParticipantId,
        target: ParticipantId,
        pool: &PgPool,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, AssignmentRow>(
            "SELECT * FROM formation_assignments WHERE formation_id = $1 AND source = $2 AND target = $3",
        )
        .bind(formation_id)
        .bind(source)
        .bind(target)
        .fetch_optional(pool)
        .await?
        .map(Self::try_from)
        .transpose()
    }

    pub async fn find_for_formation(formation_id: FormationId, pool: &PgPool) -> Result<Vec<Self>> {
        let rows = sqlx::query_as::<_, AssignmentRow>(
            "SELECT * FROM formation_assignments WHERE formation_id = $1 ORDER BY created_at, id",
        )
        .bind(formation_id)
        .fetch_all(pool)
        .await?;
        collect_rows(rows)
    }

    pub async fn find_for_participant(
        formation_id: FormationId,
        participant_id: ParticipantId,
        pool: &PgPool,
    ) -> Result<Vec<Self>> {
        let rows = sqlx::query_as::<_, AssignmentRow>(
            r#"
            SELECT * FROM formation_assignments
            WHERE formation_id = $1 AND (source = $2 OR target = $2)
            ORDER BY created_at, id
            "#,
        )
        .bind(formation_id)
        .bind(participant_id)
        .fetch_all(pool)
        .await?;
        collect_rows(rows)
    }

    pub async fn insert(&self, pool: &PgPool) -> Result<()> {
        let mut conn = pool.acquire().await?;
        self.insert_on(&mut *conn).await
    }

    /// Inserts what `plan` derives from the formation's rows inside one
    /// transaction holding the formation's advisory lock, so concurrent
    /// server instances cannot plan against the same snapshot.
    pub async fn insert_planned(
        formation_id: FormationId,
        plan: &AssignmentPlan<'_>,
        pool: &PgPool,
    ) -> Result<Vec<Self>> {
        let mut tx = pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
            .bind(formation_id)
            .execute(&mut *tx)
            .await?;

        let rows = sqlx::query_as::<_, AssignmentRow>(
            "SELECT * FROM formation_assignments WHERE formation_id = $1 ORDER BY created_at, id",
        )
        .bind(formation_id)
        .fetch_all(&mut *tx)
        .await?;
        let current = collect_rows(rows)?;

        let planned = plan(current.as_slice());
        for fa in &planned {
            fa.insert_on(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(planned)
    }

    async fn insert_on(&self, conn: &mut PgConnection) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO formation_assignments
                (id, formation_id, source, source_type, target, target_type, state,
                 last_operation, configuration, value, error, config_pending_rounds,
                 last_status_reported_at, revision, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(self.id)
        .bind(self.formation_id)
        .bind(self.source)
        .bind(self.source_type.to_string())
        .bind(self.target)
        .bind(self.target_type.to_string())
        .bind(self.state.to_string())
        .bind(self.last_operation.to_string())
        .bind(&self.configuration)
        .bind(&self.value)
        .bind(self.error.as_ref().map(Json))
        .bind(self.config_pending_rounds)
        .bind(self.last_status_reported_at)
        .bind(self.revision)
        .bind(self.created_at)
        .bind(self.updated_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn update(&self, pool: &PgPool) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE formation_assignments
            SET state = $2, last_operation = $3, configuration = $4, value = $5, error = $6,
                config_pending_rounds = $7, last_status_reported_at = $8, revision = $9,
                updated_at = $10
            WHERE id = $1
            "#,
        )
        .bind(self.id)
        .bind(self.state.to_string())
        .bind(self.last_operation.to_string())
        .bind(&self.configuration)
        .bind(&self.value)
        .bind(self.error.as_ref().map(Json))
        .bind(self.config_pending_rounds)
        .bind(self.last_status_reported_at)
        .bind(self.revision)
        .bind(self.updated_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn delete(id: FormationAssignmentId, pool: &PgPool) -> Result<bool> {
        let result = sqlx::query("DELETE FROM formation_assignments WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
