//! Static API key check on the `x-api-key` header.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::core::{ContextExt, Ctx, HandlerFunc};
use crate::errors::ErrorResponse;
use crate::middleware::MiddlewareConfigError;

pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiKeyConfig {
    /// Expected header value. Must not be empty.
    pub api_key: String,
    pub unauthorized_message: String,
}

impl Default for ApiKeyConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            unauthorized_message: "Unauthorized: Invalid or missing API key".to_string(),
        }
    }
}

/// API key middleware. Missing or wrong keys get a 401 envelope.
pub fn api_key(config: ApiKeyConfig) -> Result<HandlerFunc, MiddlewareConfigError> {
    if config.api_key.is_empty() {
        return Err(MiddlewareConfigError::MissingApiKey);
    }
    let config = Arc::new(config);

    Ok(HandlerFunc::named("api_key", move |c: Ctx| {
        let config = config.clone();
        async move {
            let presented = c.get_header(API_KEY_HEADER);
            let valid = !presented.is_empty()
                && bool::from(presented.as_bytes().ct_eq(config.api_key.as_bytes()));
            if !valid {
                tracing::debug!(path = c.request().path(), "Rejected request with invalid API key");
                let response = ErrorResponse::unauthorized(config.unauthorized_message.clone());
                c.json(response.status(), &response);
                c.abort();
                return;
            }
            c.next().await;
        }
    }))
}

/// API key middleware with the default message.
pub fn default_api_key(key: impl Into<String>) -> Result<HandlerFunc, MiddlewareConfigError> {
    api_key(ApiKeyConfig {
        api_key: key.into(),
        ..ApiKeyConfig::default()
    })
}
