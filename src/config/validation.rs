//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses and the downstream URL
//! - Validate value ranges (parallelism > 0, retry delays ordered)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: FrontendConfig → Result<(), Vec<ValidationError>>
//! - Cache backend problems are left to pipeline assembly, which owns cache construction

use std::net::SocketAddr;

use url::Url;

use crate::config::schema::FrontendConfig;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("downstream.url: {0}")]
    InvalidDownstreamUrl(String),

    #[error("{field} must be greater than zero")]
    MustBePositive { field: &'static str },

    #[error("query_range.retry_base_delay_ms ({base}) exceeds retry_max_delay_ms ({max})")]
    RetryDelayOrder { base: u64, max: u64 },
}

/// Validate a parsed configuration.
pub fn validate_config(config: &FrontendConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    match Url::parse(&config.downstream.url) {
        Ok(url) if url.scheme() != "http" => errors.push(ValidationError::InvalidDownstreamUrl(
            format!("unsupported scheme {:?}", url.scheme()),
        )),
        Ok(url) if url.host_str().is_none() => {
            errors.push(ValidationError::InvalidDownstreamUrl("missing host".to_string()))
        }
        Ok(_) => {}
        Err(e) => errors.push(ValidationError::InvalidDownstreamUrl(e.to_string())),
    }

    if config.downstream.max_body_bytes == 0 {
        errors.push(ValidationError::MustBePositive {
            field: "downstream.max_body_bytes",
        });
    }

    if config.limits.max_query_parallelism == 0 {
        errors.push(ValidationError::MustBePositive {
            field: "limits.max_query_parallelism",
        });
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::MustBePositive {
            field: "timeouts.request_secs",
        });
    }

    let qr = &config.query_range;
    if qr.retry_base_delay_ms > qr.retry_max_delay_ms {
        errors.push(ValidationError::RetryDelayOrder {
            base: qr.retry_base_delay_ms,
            max: qr.retry_max_delay_ms,
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
