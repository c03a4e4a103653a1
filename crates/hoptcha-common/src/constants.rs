//! Shared constants for Hoptcha components.

/// Default CAPTCHA provider URL (the challenge iframe lives here)
pub const DEFAULT_CAPTCHA_URL: &str = "https://hoptcha.com/api/v1/captcha/";

/// Default token verification endpoint
pub const DEFAULT_VERIFY_URL: &str = "https://hoptcha.com/api/v1/captcha/validate/";

/// Default Redis connection URL
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Default demo server listen address
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8000";

/// Verifier request timeout (seconds)
pub const VERIFY_TIMEOUT_SECS: u64 = 5;

/// Tracked attempts allowed before a challenge is required
pub const DEFAULT_THRESHOLD: u64 = 5;

/// Attempt counter window (5 minutes)
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// HTTP methods tracked unless configured otherwise
pub const DEFAULT_METHODS: &[&str] = &["POST"];

/// Largest request body buffered while looking for a token (64 KiB)
pub const DEFAULT_BODY_LIMIT: usize = 64 * 1024;

/// Field carrying the CAPTCHA token in forms, query strings and JSON bodies
pub const TOKEN_FIELD: &str = "captcha_token";

/// Identity used by the `ip` strategy when the peer address is unknown
pub const UNKNOWN_IP: &str = "unknown-ip";

/// Identity used when a key strategy yields nothing
pub const ANONYMOUS_IDENTITY: &str = "anonymous";

/// Counter store key prefixes
pub mod store_keys {
    /// Attempt counter: hoptcha-attempts:{identity}[:{path}]
    pub const ATTEMPTS_PREFIX: &str = "hoptcha-attempts:";
}

/// Environment variables read by `Settings`
pub mod env {
    pub const CAPTCHA_URL: &str = "HOPTCHA_URL";
    pub const VERIFY_URL: &str = "HOPTCHA_VERIFY_URL";
    pub const CLIENT_ID: &str = "HOPTCHA_CLIENT_ID";
    pub const CLIENT_SECRET: &str = "HOPTCHA_CLIENT_SECRET";

    /// Framework-wide debug flag
    pub const DEBUG: &str = "DEBUG";
}

/// Static asset paths used by the HTML helpers
pub mod assets {
    /// Where the demo serves the bundled client script
    pub const CLIENT_SCRIPT_PATH: &str = "/static/hoptcha.js";

    /// Element the client script renders the challenge iframe into
    pub const CONTAINER_ID: &str = "hoptcha-container";
}
