//! Middleware.
//!
//! Every middleware is a plain function that closes over an immutable
//! configuration and returns a [`HandlerFunc`](crate::core::HandlerFunc).
//! Pre-processing runs before `next().await`, post-processing after; a
//! middleware that does not call `next()` ends the chain.
//!
//! # Recommended order
//! ```text
//! error_handler → timeout → cors → logging → auth → app middleware → route
//! ```

pub mod api_key;
pub mod auth;
pub mod cors;
pub mod duplicate;
pub mod error_handler;
pub mod jwt;
pub mod logging;
pub mod skip;
pub mod timeout;

use thiserror::Error;

pub use api_key::{api_key, default_api_key, ApiKeyConfig, API_KEY_HEADER};
pub use auth::{
    auth, default_basic_auth, default_jwt_auth, user_from_context, AuthConfig, AuthError, AuthType,
    BasicAuthUserLookup, JwtUserLookup, USER_CONTEXT_KEY,
};
pub use cors::{cors, default_cors, CorsConfig};
pub use duplicate::{
    duplicate_request, BodyHashGenerator, DuplicateRequestConfig, MemoryRequestIdStorage, RequestIdGenerator,
    RequestIdStorage, StorageError,
};
pub use error_handler::{default_error_handler, error_handler, ErrorHandlerConfig};
pub use jwt::{parse_jwt, sign_hs256, JwtError, MapClaims};
pub use logging::{
    default_console_logging, default_logging, logging, ApiLog, ConsoleSink, LogSink, LoggingConfig, RemoteSink,
};
pub use skip::is_skip_path;
pub use timeout::{default_timeout, timeout, TimeoutConfig, DEFAULT_TIMEOUT};

/// Invalid middleware configuration, reported at setup time.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MiddlewareConfigError {
    #[error("basic authentication requires a BasicAuthUserLookup")]
    MissingBasicLookup,

    #[error("JWT authentication requires a JwtUserLookup")]
    MissingJwtLookup,

    #[error("JWT authentication requires a non-empty secret")]
    MissingJwtSecret,

    #[error("invalid auth type: {0}")]
    InvalidAuthType(String),

    #[error("API key middleware requires a non-empty key")]
    MissingApiKey,
}
