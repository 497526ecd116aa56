//! HTTP Basic authentication gate.
//!
//! Credentials are checked against `onvif.username` / `onvif.password` with
//! constant-time comparison. When `onvif.auth_enabled` is false or no
//! username is configured, every request passes anonymously.

use base64::Engine;
use constant_time_eq::constant_time_eq;

use crate::config::ConfigRuntime;

/// Parsed Basic credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

impl BasicCredentials {
    /// Parse an `Authorization` header value.
    pub fn from_header(value: &str) -> Option<Self> {
        let encoded = value.strip_prefix("Basic ").or_else(|| value.strip_prefix("basic "))?;
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .ok()?;
        let text = String::from_utf8(decoded).ok()?;
        let (username, password) = text.split_once(':')?;
        Some(Self {
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    /// Constant-time comparison against the expected pair.
    pub fn matches(&self, username: &str, password: &str) -> bool {
        let user_ok = constant_time_eq(self.username.as_bytes(), username.as_bytes());
        let pass_ok = constant_time_eq(self.password.as_bytes(), password.as_bytes());
        user_ok && pass_ok
    }
}

/// Outcome of the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthDecision {
    /// Request may proceed.
    Allowed,
    /// Missing or wrong credentials; respond 401.
    Denied,
}

/// Validate a request's `Authorization` header against the configuration.
pub fn check_basic_auth(config: &ConfigRuntime, authorization: Option<&str>) -> AuthDecision {
    let enabled = config.get_bool("onvif", "auth_enabled").unwrap_or(false);
    let expected_user = config.get_str("onvif", "username").unwrap_or_default();

    if !enabled || expected_user.is_empty() {
        return AuthDecision::Allowed;
    }

    let expected_pass = config.get_str("onvif", "password").unwrap_or_default();

    match authorization.and_then(BasicCredentials::from_header) {
        Some(credentials) if credentials.matches(&expected_user, &expected_pass) => {
            AuthDecision::Allowed
        }
        Some(_) => {
            tracing::debug!("authentication failed: wrong credentials");
            AuthDecision::Denied
        }
        None => AuthDecision::Denied,
    }
}
