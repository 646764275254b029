//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, port numeric, status codes)
//! - Check that URLs and file paths are usable
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;

use crate::config::schema::ServerConfig;

/// One semantic problem, tagged with the offending field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Check a parsed config, collecting every problem.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.port.parse::<u16>().is_err() {
        errors.push(ValidationError::new(
            "port",
            format!("'{}' is not a valid port number", config.port),
        ));
    }
    if config.max_connections == 0 {
        errors.push(ValidationError::new("max_connections", "must be greater than 0"));
    }
    if config.max_body_bytes == 0 {
        errors.push(ValidationError::new("max_body_bytes", "must be greater than 0"));
    }
    if config.shutdown_timeout_secs == 0 {
        errors.push(ValidationError::new("shutdown_timeout_secs", "must be greater than 0"));
    }

    if let Some(tls) = &config.tls {
        if tls.cert_path.trim().is_empty() {
            errors.push(ValidationError::new("tls.cert_path", "must not be empty"));
        }
        if tls.key_path.trim().is_empty() {
            errors.push(ValidationError::new("tls.key_path", "must not be empty"));
        }
    }

    let middleware = &config.middleware;
    if let Some(timeout) = &middleware.timeout {
        if timeout.timeout.is_zero() {
            errors.push(ValidationError::new("middleware.timeout.timeout_ms", "must be greater than 0"));
        }
    }
    if let Some(handler) = &middleware.error_handler {
        if !(400..=599).contains(&handler.default_status_code) {
            errors.push(ValidationError::new(
                "middleware.error_handler.default_status_code",
                format!("{} is not an error status (400-599)", handler.default_status_code),
            ));
        }
    }
    if let Some(logging) = &middleware.logging {
        if logging.logging_to_remote {
            if let Err(err) = url::Url::parse(&logging.remote_url) {
                errors.push(ValidationError::new(
                    "middleware.logging.remote_url",
                    format!("'{}' is not a valid URL: {err}", logging.remote_url),
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
