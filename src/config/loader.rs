//! Configuration loading from disk and the environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::{SslMode, StackConfig, StoreBackend, Tier};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value '{value}' for {key}")]
    Env { key: &'static str, value: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load, override and validate configuration for the given tier.
///
/// Without a path the defaults are used as the base layer.
pub fn load_config(path: Option<&Path>, tier: Tier) -> Result<StackConfig, ConfigError> {
    let mut config = match path {
        Some(path) => parse_config(&fs::read_to_string(path)?)?,
        None => StackConfig::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate_config(&config, tier).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Parse a TOML document without validating it.
pub fn parse_config(content: &str) -> Result<StackConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Overlay environment variables onto `config`.
///
/// Empty values are treated as unset.
pub fn apply_env_overrides<F>(config: &mut StackConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|value| !value.is_empty());

    if let Some(value) = get("API_BIND_ADDRESS") {
        config.api.bind_address = value;
    }
    if let Some(value) = get("WEB_BIND_ADDRESS") {
        config.web.bind_address = value;
    }
    if let Some(value) = get("API_URL") {
        config.web.api_url = value;
    }
    if let Some(value) = get("STATIC_DIR") {
        config.web.static_dir = value;
    }

    if let Some(value) = get("STORE_BACKEND") {
        config.store.backend = match value.to_ascii_lowercase().as_str() {
            "postgres" => StoreBackend::Postgres,
            "sqlite" => StoreBackend::Sqlite,
            _ => {
                return Err(ConfigError::Env {
                    key: "STORE_BACKEND",
                    value,
                })
            }
        };
    }

    let pg = &mut config.store.postgres;
    if let Some(value) = get("DB_USERNAME") {
        pg.username = value;
    }
    if let Some(value) = get("DB_PASSWORD") {
        pg.password = value;
    }
    if let Some(value) = get("DB_URL") {
        pg.host = value;
    }
    if let Some(value) = get("DB_NAME") {
        pg.dbname = value;
    }
    if let Some(value) = get("DB_SSLMODE") {
        pg.sslmode = match value.to_ascii_lowercase().as_str() {
            "disable" => SslMode::Disable,
            "require" => SslMode::Require,
            "verify-full" => SslMode::VerifyFull,
            _ => {
                return Err(ConfigError::Env {
                    key: "DB_SSLMODE",
                    value,
                })
            }
        };
    }
    if let Some(value) = get("SQLITE_PATH") {
        config.store.sqlite.path = value;
    }

    Ok(())
}
