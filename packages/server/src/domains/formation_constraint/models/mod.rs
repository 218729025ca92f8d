pub mod constraint;
pub mod destination;

pub use constraint::{
    sort_for_evaluation, ConstraintOperator, ConstraintScope, ConstraintType, FormationConstraint,
    TargetOperation,
};
pub use destination::{DestinationKind, DestinationRecord};
