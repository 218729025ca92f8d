//! Auth domain - Status API caller authentication and authorization
//!
//! Responsibilities:
//! - JWT creation and verification for Status API consumers
//! - Ownership checks of the caller against assignment participants

pub mod authorize;
pub mod jwt;

pub use authorize::{authorize_assignment_caller, authorize_formation_caller};
pub use jwt::{Claims, ConsumerType, JwtService};
