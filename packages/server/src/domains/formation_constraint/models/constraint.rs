use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::common::{ConstraintId, FormationTemplateId};
use crate::domains::participant::ParticipantKind;

/// FormationConstraint - a declarative operator hook evaluated at a join point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormationConstraint {
    pub id: ConstraintId,
    pub name: String,
    pub operator: ConstraintOperator,
    pub target_operation: TargetOperation,
    pub constraint_type: ConstraintType,
    pub scope: ConstraintScope,
    /// None matches every participant kind
    pub resource_type: Option<ParticipantKind>,
    /// None matches every subtype
    pub resource_subtype: Option<String>,
    /// Rendered to JSON against the join point details to form operator input
    pub input_template: String,
    /// Higher runs first
    pub priority: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConstraintOperator {
    DoNotGenerateFormationAssignmentNotification,
    DoNotGenerateFormationAssignmentNotificationForLoops,
    RedirectNotification,
    DestinationCreator,
    ConfigMutator,
    IsNotAssignedToAnyFormationOfType,
    DoesNotContainResourceOfSubtype,
}

impl std::fmt::Display for ConstraintOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConstraintOperator::DoNotGenerateFormationAssignmentNotification => {
                "DoNotGenerateFormationAssignmentNotification"
            }
            ConstraintOperator::DoNotGenerateFormationAssignmentNotificationForLoops => {
                "DoNotGenerateFormationAssignmentNotificationForLoops"
            }
            ConstraintOperator::RedirectNotification => "RedirectNotification",
            ConstraintOperator::DestinationCreator => "DestinationCreator",
            ConstraintOperator::ConfigMutator => "ConfigMutator",
            ConstraintOperator::IsNotAssignedToAnyFormationOfType => {
                "IsNotAssignedToAnyFormationOfType"
            }
            ConstraintOperator::DoesNotContainResourceOfSubtype => {
                "DoesNotContainResourceOfSubtype"
            }
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for ConstraintOperator {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "DoNotGenerateFormationAssignmentNotification" => {
                Ok(ConstraintOperator::DoNotGenerateFormationAssignmentNotification)
            }
            "DoNotGenerateFormationAssignmentNotificationForLoops" => {
                Ok(ConstraintOperator::DoNotGenerateFormationAssignmentNotificationForLoops)
            }
            "RedirectNotification" => Ok(ConstraintOperator::RedirectNotification),
            "DestinationCreator" => Ok(ConstraintOperator::DestinationCreator),
            "ConfigMutator" => Ok(ConstraintOperator::ConfigMutator),
            "IsNotAssignedToAnyFormationOfType" => {
                Ok(ConstraintOperator::IsNotAssignedToAnyFormationOfType)
            }
            "DoesNotContainResourceOfSubtype" => {
                Ok(ConstraintOperator::DoesNotContainResourceOfSubtype)
            }
            _ => Err(anyhow::anyhow!("Invalid constraint operator: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetOperation {
    GenerateAssignmentNotification,
    SendNotification,
    NotificationStatusReturned,
    Assign,
}

impl std::fmt::Display for TargetOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetOperation::GenerateAssignmentNotification => {
                write!(f, "GenerateAssignmentNotification")
            }
            TargetOperation::SendNotification => write!(f, "SendNotification"),
            TargetOperation::NotificationStatusReturned => write!(f, "NotificationStatusReturned"),
            TargetOperation::Assign => write!(f, "Assign"),
        }
    }
}

impl std::str::FromStr for TargetOperation {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "GenerateAssignmentNotification" => Ok(TargetOperation::GenerateAssignmentNotification),
            "SendNotification" => Ok(TargetOperation::SendNotification),
            "NotificationStatusReturned" => Ok(TargetOperation::NotificationStatusReturned),
            "Assign" => Ok(TargetOperation::Assign),
            _ => Err(anyhow::anyhow!("Invalid target operation: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConstraintType {
    Pre,
    Post,
}

impl std::fmt::Display for ConstraintType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConstraintType::Pre => write!(f, "PRE"),
            ConstraintType::Post => write!(f, "POST"),
        }
    }
}

impl std::str::FromStr for ConstraintType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PRE" => Ok(ConstraintType::Pre),
            "POST" => Ok(ConstraintType::Post),
            _ => Err(anyhow::anyhow!("Invalid constraint type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConstraintScope {
    Global,
    FormationType,
}

impl std::fmt::Display for ConstraintScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConstraintScope::Global => write!(f, "GLOBAL"),
            ConstraintScope::FormationType => write!(f, "FORMATION_TYPE"),
        }
    }
}

impl std::str::FromStr for ConstraintScope {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "GLOBAL" => Ok(ConstraintScope::Global),
            "FORMATION_TYPE" => Ok(ConstraintScope::FormationType),
            _ => Err(anyhow::anyhow!("Invalid constraint scope: {}", s)),
        }
    }
}

impl FormationConstraint {
    pub fn new(
        name: impl Into<String>,
        operator: ConstraintOperator,
        target_operation: TargetOperation,
        constraint_type: ConstraintType,
        scope: ConstraintScope,
        input_template: impl Into<String>,
    ) -> Self {
        Self {
            id: ConstraintId::new(),
            name: name.into(),
            operator,
            target_operation,
            constraint_type,
            scope,
            resource_type: None,
            resource_subtype: None,
            input_template: input_template.into(),
            priority: 0,
            created_at: Utc::now(),
        }
    }

    pub fn for_resource(mut self, kind: ParticipantKind, subtype: Option<&str>) -> Self {
        self.resource_type = Some(kind);
        self.resource_subtype = subtype.map(str::to_string);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Whether this constraint applies to a resource of the given kind and subtype
    pub fn matches_resource(&self, kind: ParticipantKind, subtype: Option<&str>) -> bool {
        if self.resource_type.is_some_and(|t| t != kind) {
            return false;
        }
        match &self.resource_subtype {
            Some(wanted) => subtype == Some(wanted.as_str()),
            None => true,
        }
    }
}

/// Deterministic evaluation order: priority descending, then creation order.
pub fn sort_for_evaluation(constraints: &mut [FormationConstraint]) {
    constraints.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then(a.created_at.cmp(&b.created_at))
            .then(a.id.cmp(&b.id))
    });
}

// =============================================================================
// SQL Queries
// =============================================================================

#[derive(sqlx::FromRow)]
struct ConstraintRow {
    id: ConstraintId,
    name: String,
    operator: String,
    target_operation: String,
    constraint_type: String,
    scope: String,
    resource_type: Option<String>,
    resource_subtype: Option<String>,
    input_template: String,
    priority: i32,
    created_at: DateTime<Utc>,
}

impl TryFrom<ConstraintRow> for FormationConstraint {
    type Error = anyhow::Error;

    fn try_from(row: ConstraintRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            name: row.name,
            operator: row.operator.parse()?,
            target_operation: row.target_operation.parse()?,
            constraint_type: row.constraint_type.parse()?,
            scope: row.scope.parse()?,
            resource_type: row.resource_type.map(|t| t.parse()).transpose()?,
            resource_subtype: row.resource_subtype,
            input_template: row.input_template,
            priority: row.priority,
            created_at: row.created_at,
        })
    }
}

impl FormationConstraint {
    /// Global constraints plus those attached to the template, for one join point
    pub async fn find_applicable(
        template_id: FormationTemplateId,
        target_operation: TargetOperation,
        constraint_type: ConstraintType,
        pool: &PgPool,
    ) -> Result<Vec<Self>> {
        sqlx::query_as::<_, ConstraintRow>(
            r#"
            SELECT c.* FROM formation_constraints c
            WHERE c.target_operation = $2 AND c.constraint_type = $3
              AND (c.scope = 'GLOBAL' OR EXISTS (
                    SELECT 1 FROM formation_constraint_attachments a
                    WHERE a.constraint_id = c.id AND a.formation_template_id = $1
              ))
            ORDER BY c.priority DESC, c.created_at, c.id
            "#,
        )
        .bind(template_id)
        .bind(target_operation.to_string())
        .bind(constraint_type.to_string())
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(Self::try_from)
        .collect()
    }

    pub async fn insert(&self, pool: &PgPool) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO formation_constraints
                (id, name, operator, target_operation, constraint_type, scope, resource_type,
                 resource_subtype, input_template, priority, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(self.id)
        .bind(&self.name)
        .bind(self.operator.to_string())
        .bind(self.target_operation.to_string())
        .bind(self.constraint_type.to_string())
        .bind(self.scope.to_string())
        .bind(self.resource_type.map(|t| t.to_string()))
        .bind(&self.resource_subtype)
        .bind(&self.input_template)
        .bind(self.priority)
        .bind(self.created_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn attach(
        constraint_id: ConstraintId,
        template_id: FormationTemplateId,
        pool: &PgPool,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO formation_constraint_attachments (constraint_id, formation_template_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(constraint_id)
        .bind(template_id)
        .execute(pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constraint(priority: i32) -> FormationConstraint {
        FormationConstraint::new(
            "c",
            ConstraintOperator::ConfigMutator,
            TargetOperation::NotificationStatusReturned,
            ConstraintType::Post,
            ConstraintScope::Global,
            "{}",
        )
        .with_priority(priority)
    }

    #[test]
    fn test_resource_filter() {
        let c = constraint(0).for_resource(ParticipantKind::Application, Some("crm"));
        assert!(c.matches_resource(ParticipantKind::Application, Some("crm")));
        assert!(!c.matches_resource(ParticipantKind::Application, Some("erp")));
        assert!(!c.matches_resource(ParticipantKind::Runtime, Some("crm")));
        assert!(constraint(0).matches_resource(ParticipantKind::Runtime, None));
    }

    #[test]
    fn test_higher_priority_runs_first() {
        let low = constraint(1);
        let high = constraint(5);
        let mut all = vec![low.clone(), high.clone()];
        sort_for_evaluation(&mut all);
        assert_eq!(all[0].id, high.id);
        assert_eq!(all[1].id, low.id);
    }
}
