//! Basic and Bearer (HS256 JWT) authentication.
//!
//! # Data Flow
//! ```text
//! path in skip list? ──yes──► next()
//!     │ no
//! Authorization: "<scheme> <credentials>"
//!     │
//!     ├─ Basic  → base64 "user:pass" → BasicAuthUserLookup
//!     └─ Bearer → parse_jwt (HS256)  → JwtUserLookup
//!     │
//! user stored under USER_CONTEXT_KEY ──► next()
//! ```
//!
//! Rejections are written directly as the JSON envelope (401, or 403 when
//! the lookup reports [`AuthError::Forbidden`]) and stop the chain.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{Context, ContextExt, Ctx, HandlerFunc, Value};
use crate::errors::ErrorResponse;
use crate::middleware::jwt::{parse_jwt, JwtError, MapClaims};
use crate::middleware::skip::is_skip_path;
use crate::middleware::MiddlewareConfigError;

/// Key under which the authenticated user is stored on the context.
pub const USER_CONTEXT_KEY: &str = "user";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    Basic,
    #[default]
    Jwt,
}

impl FromStr for AuthType {
    type Err = MiddlewareConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "basic" => Ok(AuthType::Basic),
            "jwt" => Ok(AuthType::Jwt),
            other => Err(MiddlewareConfigError::InvalidAuthType(other.to_string())),
        }
    }
}

/// Failure reported by a user lookup.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Authenticated but not allowed; answered with 403.
    #[error("forbidden")]
    Forbidden,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("user not found")]
    UserNotFound,

    #[error("{0}")]
    Other(String),
}

/// Resolves a user from Basic credentials.
pub trait BasicAuthUserLookup: Send + Sync {
    fn lookup_user_by_basic_auth(&self, username: &str, password: &str) -> Result<Value, AuthError>;
}

/// Resolves a user from verified token claims.
pub trait JwtUserLookup: Send + Sync {
    fn lookup_user_by_jwt(&self, claims: &MapClaims) -> Result<Value, AuthError>;
}

#[derive(Clone)]
pub struct AuthConfig {
    pub auth_type: AuthType,
    pub basic_lookup: Option<Arc<dyn BasicAuthUserLookup>>,
    pub jwt_lookup: Option<Arc<dyn JwtUserLookup>>,
    /// HMAC secret; required for [`AuthType::Jwt`].
    pub jwt_secret: String,
    pub unauthorized_message: String,
    pub forbidden_message: String,
    /// Paths that bypass authentication (exact, glob, or `:param` patterns).
    pub skip_paths: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            auth_type: AuthType::Jwt,
            basic_lookup: None,
            jwt_lookup: None,
            jwt_secret: String::new(),
            unauthorized_message: "Unauthorized".to_string(),
            forbidden_message: "Forbidden".to_string(),
            skip_paths: Vec::new(),
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("auth_type", &self.auth_type)
            .field("basic_lookup", &self.basic_lookup.is_some())
            .field("jwt_lookup", &self.jwt_lookup.is_some())
            .field("jwt_secret", &"[REDACTED]")
            .field("unauthorized_message", &self.unauthorized_message)
            .field("forbidden_message", &self.forbidden_message)
            .field("skip_paths", &self.skip_paths)
            .finish()
    }
}

/// Why a request was turned away.
#[derive(Debug)]
enum Rejection {
    Unauthorized(String),
    Forbidden,
}

/// Collaborator chosen at construction time.
enum Verifier {
    Basic(Arc<dyn BasicAuthUserLookup>),
    Jwt {
        lookup: Arc<dyn JwtUserLookup>,
        secret: Vec<u8>,
    },
}

impl Verifier {
    fn scheme(&self) -> &'static str {
        match self {
            Verifier::Basic(_) => "Basic",
            Verifier::Jwt { .. } => "Bearer",
        }
    }

    fn wrong_scheme_message(&self) -> &'static str {
        match self {
            Verifier::Basic(_) => "Basic authentication required",
            Verifier::Jwt { .. } => "Bearer token required",
        }
    }

    fn authenticate(&self, credentials: &str, config: &AuthConfig) -> Result<Value, Rejection> {
        let looked_up = match self {
            Verifier::Basic(lookup) => {
                let (username, password) = decode_basic(credentials).ok_or_else(|| {
                    tracing::debug!("Malformed basic credentials");
                    Rejection::Unauthorized(config.unauthorized_message.clone())
                })?;
                lookup.lookup_user_by_basic_auth(&username, &password)
            }
            Verifier::Jwt { lookup, secret } => {
                let claims = parse_jwt(credentials, secret).map_err(|err: JwtError| {
                    tracing::debug!(error = %err, "Rejected bearer token");
                    Rejection::Unauthorized(config.unauthorized_message.clone())
                })?;
                lookup.lookup_user_by_jwt(&claims)
            }
        };

        looked_up.map_err(|err| {
            tracing::debug!(error = %err, "User lookup failed");
            match err {
                AuthError::Forbidden => Rejection::Forbidden,
                _ => Rejection::Unauthorized(config.unauthorized_message.clone()),
            }
        })
    }
}

fn decode_basic(credentials: &str) -> Option<(String, String)> {
    let decoded = STANDARD.decode(credentials).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (username, password) = text.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

/// Authentication middleware.
///
/// Fails when the selected mode has no lookup collaborator or, for JWT,
/// no secret.
pub fn auth(config: AuthConfig) -> Result<HandlerFunc, MiddlewareConfigError> {
    let verifier = match config.auth_type {
        AuthType::Basic => Verifier::Basic(
            config
                .basic_lookup
                .clone()
                .ok_or(MiddlewareConfigError::MissingBasicLookup)?,
        ),
        AuthType::Jwt => {
            let lookup = config
                .jwt_lookup
                .clone()
                .ok_or(MiddlewareConfigError::MissingJwtLookup)?;
            if config.jwt_secret.is_empty() {
                return Err(MiddlewareConfigError::MissingJwtSecret);
            }
            Verifier::Jwt {
                lookup,
                secret: config.jwt_secret.as_bytes().to_vec(),
            }
        }
    };
    let shared = Arc::new((config, verifier));

    Ok(HandlerFunc::named("auth", move |c: Ctx| {
        let shared = shared.clone();
        async move {
            let (config, verifier) = &*shared;
            if is_skip_path(c.request().path(), &config.skip_paths) {
                c.next().await;
                return;
            }

            match check(&c, config, verifier) {
                Ok(user) => {
                    c.set(USER_CONTEXT_KEY, user);
                    c.next().await;
                }
                Err(rejection) => {
                    let response = match rejection {
                        Rejection::Unauthorized(message) => ErrorResponse::unauthorized(message),
                        Rejection::Forbidden => {
                            ErrorResponse::forbidden(config.forbidden_message.clone())
                        }
                    };
                    tracing::debug!(
                        path = c.request().path(),
                        status = response.error.code,
                        "Authentication rejected"
                    );
                    c.json(response.status(), &response);
                    c.abort();
                }
            }
        }
    }))
}

fn check(c: &Ctx, config: &AuthConfig, verifier: &Verifier) -> Result<Value, Rejection> {
    let header = c.get_header("Authorization");
    if header.is_empty() {
        return Err(Rejection::Unauthorized(config.unauthorized_message.clone()));
    }
    let Some((scheme, credentials)) = header.split_once(' ') else {
        return Err(Rejection::Unauthorized(
            "Invalid authorization format".to_string(),
        ));
    };
    if scheme != verifier.scheme() {
        return Err(Rejection::Unauthorized(
            verifier.wrong_scheme_message().to_string(),
        ));
    }
    verifier.authenticate(credentials, config)
}

/// JWT authentication with default messages.
pub fn default_jwt_auth(
    lookup: Arc<dyn JwtUserLookup>,
    secret: impl Into<String>,
) -> Result<HandlerFunc, MiddlewareConfigError> {
    auth(AuthConfig {
        auth_type: AuthType::Jwt,
        jwt_lookup: Some(lookup),
        jwt_secret: secret.into(),
        ..AuthConfig::default()
    })
}

/// Basic authentication with default messages.
pub fn default_basic_auth(
    lookup: Arc<dyn BasicAuthUserLookup>,
) -> Result<HandlerFunc, MiddlewareConfigError> {
    auth(AuthConfig {
        auth_type: AuthType::Basic,
        basic_lookup: Some(lookup),
        ..AuthConfig::default()
    })
}

/// The user stored by the auth middleware, if any.
pub fn user_from_context(c: &dyn Context) -> Option<Value> {
    c.get(USER_CONTEXT_KEY)
}
