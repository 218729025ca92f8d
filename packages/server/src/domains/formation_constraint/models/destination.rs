use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::common::FormationAssignmentId;

/// A destination provisioned for an assignment, kept so unassign can remove it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DestinationRecord {
    pub name: String,
    pub assignment_id: FormationAssignmentId,
    #[sqlx(try_from = "String")]
    pub kind: DestinationKind,
    pub certificate_name: Option<String>,
    pub subaccount: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DestinationKind {
    DesignTime,
    Basic,
    SamlAssertion,
}

impl std::fmt::Display for DestinationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DestinationKind::DesignTime => write!(f, "DESIGN_TIME"),
            DestinationKind::Basic => write!(f, "BASIC"),
            DestinationKind::SamlAssertion => write!(f, "SAML_ASSERTION"),
        }
    }
}

impl TryFrom<String> for DestinationKind {
    type Error = anyhow::Error;

    fn try_from(s: String) -> Result<Self> {
        match s.as_str() {
            "DESIGN_TIME" => Ok(DestinationKind::DesignTime),
            "BASIC" => Ok(DestinationKind::Basic),
            "SAML_ASSERTION" => Ok(DestinationKind::SamlAssertion),
            _ => Err(anyhow::anyhow!("Invalid destination kind: {}", s)),
        }
    }
}

impl DestinationRecord {
    pub fn new(
        name: impl Into<String>,
        assignment_id: FormationAssignmentId,
        kind: DestinationKind,
        subaccount: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            assignment_id,
            kind,
            certificate_name: None,
            subaccount: subaccount.into(),
            created_at: Utc::now(),
        }
    }

    pub fn with_certificate(mut self, certificate_name: impl Into<String>) -> Self {
        self.certificate_name = Some(certificate_name.into());
        self
    }

    pub async fn find_for_assignment(
        assignment_id: FormationAssignmentId,
        pool: &PgPool,
    ) -> Result<Vec<Self>> {
        let records = sqlx::query_as::<_, DestinationRecord>(
            "SELECT * FROM destination_records WHERE assignment_id = $1 ORDER BY created_at",
        )
        .bind(assignment_id)
        .fetch_all(pool)
        .await?;
        Ok(records)
    }

    pub async fn upsert(&self, pool: &PgPool) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO destination_records
                (name, assignment_id, kind, certificate_name, subaccount, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (name, assignment_id) DO UPDATE SET
                kind = EXCLUDED.kind,
                certificate_name = EXCLUDED.certificate_name
            "#,
        )
        .bind(&self.name)
        .bind(self.assignment_id)
        .bind(self.kind.to_string())
        .bind(&self.certificate_name)
        .bind(&self.subaccount)
        .bind(self.created_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn delete_for_assignment(assignment_id: FormationAssignmentId, pool: &PgPool) -> Result<()> {
        sqlx::query("DELETE FROM destination_records WHERE assignment_id = $1")
            .bind(assignment_id)
            .execute(pool)
            .await?;
        Ok(())
    }
}
