//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! optional TOML file (--config)
//!     → loader.rs (parse & deserialize)
//!     → loader.rs (environment overrides: DB_*, API_URL, ...)
//!     → validation.rs (semantic checks for the selected tier)
//!     → StackConfig (validated, immutable)
//! ```
//!
//! # Design Decisions
//! - Every section has defaults so an empty file (or no file) is valid
//! - Environment variables win over the file, matching container deployments
//! - Validation is tier-aware: the API tier never needs `web.api_url`

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{apply_env_overrides, load_config, parse_config, ConfigError};
pub use schema::{
    ApiConfig, LogFormat, ObservabilityConfig, PostgresConfig, ShutdownConfig, SqliteConfig,
    SslMode, StackConfig, StoreBackend, StoreConfig, Tier, WebConfig,
};
pub use validation::{validate_config, ValidationError};
