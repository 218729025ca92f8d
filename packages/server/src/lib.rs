// Formation Assignment Notification Engine - Core
//
// Works out the pairwise notifications owed to participants when they join or
// leave a formation, dispatches them through participant webhooks and tracks
// every pair through its assignment state machine.
//
// Domains live under domains/*; infrastructure behind traits in kernel/.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::*;
