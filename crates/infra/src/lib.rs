//! Infrastructure layer: credential stores, configuration, background workers.

pub mod config;
pub mod store;
pub mod workers;

mod integration_tests;

pub use config::{ConfigError, Settings};
pub use store::{InMemoryCredentialStore, PostgresCredentialStore};
pub use workers::{SweeperHandle, TokenSweeper};
