/**
 * Typed requests for the backup and room
 *  endpoints, and the client that sends them.
 */
pub mod api;
/**
 * TOML configuration.
 */
pub mod config;
/**
 * Wiring of stores, vault and remotes from a
 *  loaded configuration.
 */
pub mod context;
pub mod error;
/**
 * Tracing subscriber setup.
 */
pub mod logging;
/**
 * `BackupRemote` and `GroupKeyDistribution`
 *  over HTTP.
 */
pub mod remote;

pub use api::ApiClient;
pub use config::{Config, ConfigError};
pub use context::{ContextError, KeyContext};
pub use error::ApiError;
pub use logging::init_tracing;
pub use remote::{HttpBackupRemote, HttpDistribution};
