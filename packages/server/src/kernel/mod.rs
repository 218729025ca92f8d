//! Kernel module - server infrastructure and dependencies.

pub mod deps;
pub mod locks;
pub mod store;
pub mod test_dependencies;
pub mod traits;
pub mod webhook_client;

pub use deps::{DestinationAdapter, EngineSettings, ServerDeps, UnconfiguredDestinationService};
pub use locks::FormationLocks;
pub use store::{BaseFormationStore, InMemoryFormationStore, PostgresFormationStore};
pub use test_dependencies::{MockDestinationService, MockWebhookClient, TestDependencies};
pub use traits::*;
pub use webhook_client::HttpWebhookClient;
