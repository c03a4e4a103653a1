//! Process-wide provider settings.
//!
//! Read once from the environment (`HOPTCHA_URL`, `HOPTCHA_VERIFY_URL`,
//! `HOPTCHA_CLIENT_ID`, `HOPTCHA_CLIENT_SECRET`, `DEBUG`) and shared by the
//! gate, the verifier and the HTML helpers.

use serde::Deserialize;
use std::fmt;

use hoptcha_common::HoptchaError;
use hoptcha_common::constants::{DEFAULT_CAPTCHA_URL, DEFAULT_VERIFY_URL, env};

/// CAPTCHA provider settings
#[derive(Clone, Deserialize)]
pub struct Settings {
    /// Provider URL the challenge iframe is loaded from
    #[serde(default = "default_captcha_url")]
    pub captcha_url: String,

    /// Token verification endpoint
    #[serde(default = "default_verify_url")]
    pub verify_url: String,

    /// Public client identifier (`client_key` on the wire)
    #[serde(default)]
    pub client_id: String,

    /// Client secret sent along with verification requests
    #[serde(default)]
    pub client_secret: String,

    /// Framework debug flag; gates skip enforcement unless told otherwise
    #[serde(default)]
    pub debug: bool,
}

fn default_captcha_url() -> String { DEFAULT_CAPTCHA_URL.to_string() }
fn default_verify_url() -> String { DEFAULT_VERIFY_URL.to_string() }

impl Settings {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            ..Self::default()
        }
    }

    /// Load settings from the process environment
    pub fn from_env() -> Result<Self, HoptchaError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load settings through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, HoptchaError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let settings = config::Config::builder()
            .set_default("captcha_url", DEFAULT_CAPTCHA_URL)
            .and_then(|b| b.set_default("verify_url", DEFAULT_VERIFY_URL))
            .and_then(|b| b.set_default("client_id", ""))
            .and_then(|b| b.set_default("client_secret", ""))
            .and_then(|b| b.set_default("debug", false))
            .and_then(|b| b.set_override_option("captcha_url", lookup(env::CAPTCHA_URL)))
            .and_then(|b| b.set_override_option("verify_url", lookup(env::VERIFY_URL)))
            .and_then(|b| b.set_override_option("client_id", lookup(env::CLIENT_ID)))
            .and_then(|b| b.set_override_option("client_secret", lookup(env::CLIENT_SECRET)))
            .and_then(|b| b.set_override_option("debug", lookup(env::DEBUG).map(parse_flag)))
            .and_then(|b| b.build())
            .map_err(|e| HoptchaError::Config(format!("Failed to load settings: {e}")))?;

        settings
            .try_deserialize()
            .map_err(|e| HoptchaError::Config(format!("Failed to parse settings: {e}")))
    }

    pub fn with_captcha_url(mut self, url: impl Into<String>) -> Self {
        self.captcha_url = url.into();
        self
    }

    pub fn with_verify_url(mut self, url: impl Into<String>) -> Self {
        self.verify_url = url.into();
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

// Django-style truthiness: "1", "true", "yes", "on"
fn parse_flag(value: String) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            captcha_url: default_captcha_url(),
            verify_url: default_verify_url(),
            client_id: String::new(),
            client_secret: String::new(),
            debug: false,
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("captcha_url", &self.captcha_url)
            .field("verify_url", &self.verify_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("debug", &self.debug)
            .finish()
    }
}
