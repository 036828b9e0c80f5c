//! Room admin tokens and HTTP Basic authentication for operator routes

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{header, request::Parts, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::convert::Infallible;
use std::sync::Arc;

/// Header carrying a room's admin token
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";
/// Query parameter form, as used in the admin URL `/rooms/{id}?admin=<token>`
pub const ADMIN_TOKEN_PARAM: &str = "admin";

const ADMIN_TOKEN_BYTES: usize = 24;

/// Generate a fresh capability token (24 random bytes, hex encoded)
pub fn generate_admin_token() -> String {
    let bytes: [u8; ADMIN_TOKEN_BYTES] = rand::random();
    hex::encode(bytes)
}

/// Admin URL path handed out once when a room is created
pub fn admin_url(room_id: &str, token: &str) -> String {
    format!("/rooms/{}?{}={}", room_id, ADMIN_TOKEN_PARAM, token)
}

/// Constant-time byte comparison to prevent timing attacks
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

fn query_param(query: Option<&str>, key: &str) -> Option<String> {
    query?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v.to_string())
}

/// Extractor: the admin token presented with a request, if any.
/// The header wins over the query parameter.
#[derive(Debug, Clone, Default)]
pub struct AdminToken(pub Option<String>);

impl AdminToken {
    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl<S> FromRequestParts<S> for AdminToken
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let from_header = parts
            .headers
            .get(ADMIN_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim().to_string());

        let token = from_header
            .or_else(|| query_param(parts.uri.query(), ADMIN_TOKEN_PARAM))
            .filter(|t| !t.is_empty());

        Ok(AdminToken(token))
    }
}

/// Operator credentials for destructive routes
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Operator username (None = operator routes disabled)
    pub username: Option<String>,
    pub password: Option<String>,
}

impl AuthConfig {
    /// Load auth config from environment variables.
    /// OPERATOR_USERNAME and OPERATOR_PASSWORD must both be set to enable operator routes.
    pub fn from_env() -> Self {
        let username = crate::config::env_non_empty("OPERATOR_USERNAME");
        let password = crate::config::env_non_empty("OPERATOR_PASSWORD");

        if username.is_some() && password.is_some() {
            tracing::info!("Operator authentication enabled");
            Self { username, password }
        } else {
            if username.is_some() || password.is_some() {
                tracing::warn!(
                    "OPERATOR_USERNAME and OPERATOR_PASSWORD must both be set to enable operator routes"
                );
            }
            tracing::warn!("Operator routes DISABLED - room deletion is unavailable");
            Self::disabled()
        }
    }

    pub fn disabled() -> Self {
        Self {
            username: None,
            password: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }

    /// Validate credentials. Always false while disabled.
    pub fn validate(&self, username: &str, password: &str) -> bool {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => {
                constant_time_eq(u.as_bytes(), username.as_bytes())
                    & constant_time_eq(p.as_bytes(), password.as_bytes())
            }
            _ => false,
        }
    }
}

/// Decode `Authorization: Basic ...` into (username, password)
fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = String::from_utf8(STANDARD.decode(encoded.trim()).ok()?).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

/// Middleware for HTTP Basic Authentication on operator routes
pub async fn operator_auth_middleware(
    State(auth_config): State<Arc<AuthConfig>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !auth_config.is_enabled() {
        tracing::warn!(
            "Operator route {} requested but operator credentials are not configured",
            request.uri().path()
        );
    } else if let Some((username, password)) = basic_credentials(request.headers()) {
        if auth_config.validate(&username, &password) {
            return next.run(request).await;
        }
    }

    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Basic realm=\"TOHYO Operator\"")],
        "Unauthorized",
    )
        .into_response()
}
