pub mod assignment;

pub use assignment::{
    non_empty_config, AssignmentOperation, AssignmentState, FormationAssignment,
};
