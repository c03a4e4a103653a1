//! Core types shared across Hoptcha components.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of CAPTCHA the provider should display.
///
/// - Sliding: drag a piece into place
/// - Pointing: click the requested points
/// - Random: let the provider pick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeKind {
    Sliding,
    Pointing,
    #[default]
    Random,
}

impl ChallengeKind {
    /// Resolve a configured kind, case-insensitively.
    ///
    /// Anything other than `sliding` or `pointing` (including nothing at all)
    /// resolves to `Random`.
    pub fn resolve(value: Option<&str>) -> Self {
        match value.map(str::to_ascii_lowercase).as_deref() {
            Some("sliding") => Self::Sliding,
            Some("pointing") => Self::Pointing,
            _ => Self::Random,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sliding => "sliding",
            Self::Pointing => "pointing",
            Self::Random => "random",
        }
    }
}

impl fmt::Display for ChallengeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for ChallengeKind {
    fn from(value: &str) -> Self {
        Self::resolve(Some(value))
    }
}

/// Challenge payload returned instead of the protected response.
///
/// Always sent with HTTP 200; clients look at `captcha` to tell it apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengePayload {
    /// Always `true`
    pub captcha: bool,

    /// Provider URL with `client_key`, `timestamp` (epoch ms) and `type`
    pub url: String,
}

impl ChallengePayload {
    /// Build a payload pointing at `provider_url`.
    pub fn new(provider_url: &str, client_key: &str, timestamp_ms: i64, kind: ChallengeKind) -> Self {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("client_key", client_key)
            .append_pair("timestamp", &timestamp_ms.to_string())
            .append_pair("type", kind.as_str())
            .finish();

        Self {
            captcha: true,
            url: format!("{}?{}", provider_url, query),
        }
    }

    /// Build a payload stamped with the current time
    pub fn issue(provider_url: &str, client_key: &str, kind: ChallengeKind) -> Self {
        Self::new(
            provider_url,
            client_key,
            chrono::Utc::now().timestamp_millis(),
            kind,
        )
    }
}

/// Body POSTed to the verification endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyRequest {
    pub token: String,
    pub client_key: String,
    pub client_secret: String,
}

/// Verification endpoint reply
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerifyResponse {
    /// Missing means not verified
    #[serde(default)]
    pub success: bool,
}
