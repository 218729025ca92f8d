//! Formation constraints: declarative pre/post hooks around join points.

pub mod engine;
pub mod models;
pub mod operators;

pub use engine::{after_status_returned, before_assign, before_send, StageOutcome};
pub use models::{
    ConstraintOperator, ConstraintScope, ConstraintType, DestinationKind, DestinationRecord,
    FormationConstraint, TargetOperation,
};
