//! Configuration validation.
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: (StackConfig, Tier) → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::{StackConfig, StoreBackend, Tier};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: '{value}' is not a valid socket address")]
    InvalidAddress { field: &'static str, value: String },

    #[error("web.api_url must be set (API_URL)")]
    MissingApiUrl,

    #[error("web.api_url '{value}' is not usable: {reason}")]
    InvalidApiUrl { value: String, reason: String },

    #[error("{0} must be set")]
    MissingField(&'static str),

    #[error("shutdown.drain_timeout_secs must be greater than zero")]
    ZeroDrainTimeout,
}

/// Validate the parts of `config` the given tier depends on.
pub fn validate_config(config: &StackConfig, tier: Tier) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.shutdown.drain_timeout_secs == 0 {
        errors.push(ValidationError::ZeroDrainTimeout);
    }

    match tier {
        Tier::Api => {
            check_address("api.bind_address", &config.api.bind_address, &mut errors);
            if config.store.backend == StoreBackend::Postgres {
                let pg = &config.store.postgres;
                if pg.host.is_empty() {
                    errors.push(ValidationError::MissingField("store.postgres.host (DB_URL)"));
                }
                if pg.dbname.is_empty() {
                    errors.push(ValidationError::MissingField("store.postgres.dbname (DB_NAME)"));
                }
            } else if config.store.sqlite.path.is_empty() {
                errors.push(ValidationError::MissingField("store.sqlite.path"));
            }
        }
        Tier::Web => {
            check_address("web.bind_address", &config.web.bind_address, &mut errors);
            if let Err(e) = check_api_url(&config.web.api_url) {
                errors.push(e);
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(field: &'static str, value: &str, errors: &mut Vec<ValidationError>) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

fn check_api_url(value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::MissingApiUrl);
    }

    let invalid = |reason: String| ValidationError::InvalidApiUrl {
        value: value.to_string(),
        reason,
    };

    let url = Url::parse(value).map_err(|e| invalid(e.to_string()))?;
    if url.scheme() != "http" {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    Ok(())
}
