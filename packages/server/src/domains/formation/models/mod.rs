pub mod formation;
pub mod formation_template;
pub mod status;

pub use formation::{Formation, FormationState, LifecycleOperation};
pub use formation_template::FormationTemplate;
pub use status::{FormationCondition, FormationStatus, FormationStatusError};
