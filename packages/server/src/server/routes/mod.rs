// HTTP routes
pub mod formations;
pub mod health;
pub mod status;

pub use health::*;
