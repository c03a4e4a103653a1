//! The attempt gate.
//!
//! Counts tracked requests per identity and, once the threshold is reached,
//! lets a request through only with a CAPTCHA token the verifier accepts.
//!
//! Per counter:
//! ```text
//! Absent -> Counting(1) -> ... -> Counting(threshold) --verified--> Absent
//!    ^                                                                |
//!    +------------------------- TTL expiry ---------------------------+
//! ```

use axum::http::Method;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use hoptcha_common::constants::{
    ANONYMOUS_IDENTITY, DEFAULT_METHODS, DEFAULT_THRESHOLD, DEFAULT_TIMEOUT_SECS,
    store_keys::ATTEMPTS_PREFIX,
};
use hoptcha_common::{ChallengeKind, ChallengePayload, HoptchaError};

use crate::identity::{KeyStrategy, RequestContext};
use crate::settings::Settings;
use crate::store::CounterStore;
use crate::verifier::TokenVerifier;

/// Predicate deciding whether a request skips the gate
pub type ExemptFn = Arc<dyn Fn(&RequestContext) -> bool + Send + Sync>;

/// Backoff factor caps at 2^31
const MAX_BACKOFF_SHIFT: u64 = 31;

/// Gate configuration
#[derive(Clone)]
pub struct GateConfig {
    /// Tracked attempts allowed before a challenge is required
    pub threshold: u64,

    /// Base attempt counter lifetime
    pub timeout: Duration,

    /// Identity strategy
    pub key: KeyStrategy,

    /// Tracked HTTP methods
    pub methods: HashSet<Method>,

    /// Requests matching this skip the gate
    pub exempt: Option<ExemptFn>,

    /// Grow the counter lifetime exponentially past the threshold
    pub backoff: bool,

    /// One counter for every path instead of one per path
    pub shared: bool,

    /// Challenge kind asked of the provider
    pub kind: ChallengeKind,

    /// Keep enforcing while the debug flag is on
    pub enforce_in_debug: bool,
}

impl GateConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn threshold(mut self, threshold: u64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn key(mut self, key: KeyStrategy) -> Self {
        self.key = key;
        self
    }

    pub fn methods<I>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = Method>,
    {
        self.methods = methods.into_iter().collect();
        self
    }

    pub fn exempt_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&RequestContext) -> bool + Send + Sync + 'static,
    {
        self.exempt = Some(Arc::new(predicate));
        self
    }

    /// Remove the exempt predicate, staff included
    pub fn no_exemptions(mut self) -> Self {
        self.exempt = None;
        self
    }

    pub fn backoff(mut self, backoff: bool) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn shared(mut self, shared: bool) -> Self {
        self.shared = shared;
        self
    }

    pub fn kind(mut self, kind: ChallengeKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn enforce_in_debug(mut self, enforce: bool) -> Self {
        self.enforce_in_debug = enforce;
        self
    }

    /// Build from file/env options, validating names
    pub fn from_options(options: &GateOptions) -> Result<Self, HoptchaError> {
        let methods = options
            .methods
            .iter()
            .map(|name| {
                Method::from_bytes(name.to_ascii_uppercase().as_bytes())
                    .map_err(|_| HoptchaError::InvalidMethod(name.clone()))
            })
            .collect::<Result<HashSet<_>, _>>()?;

        Ok(Self {
            threshold: options.threshold,
            timeout: Duration::from_secs(options.timeout_secs),
            key: KeyStrategy::from_name(&options.key)?,
            methods,
            backoff: options.backoff,
            shared: options.shared,
            kind: ChallengeKind::resolve(options.kind.as_deref()),
            enforce_in_debug: options.enforce_in_debug,
            ..Self::default()
        })
    }
}

// Staff and superusers skip the gate unless configured otherwise
fn default_exempt() -> ExemptFn {
    Arc::new(RequestContext::is_trusted)
}

fn default_methods() -> HashSet<Method> {
    DEFAULT_METHODS
        .iter()
        .filter_map(|name| Method::from_bytes(name.as_bytes()).ok())
        .collect()
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            key: KeyStrategy::default(),
            methods: default_methods(),
            exempt: Some(default_exempt()),
            backoff: false,
            shared: false,
            kind: ChallengeKind::default(),
            enforce_in_debug: false,
        }
    }
}

impl fmt::Debug for GateConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GateConfig")
            .field("threshold", &self.threshold)
            .field("timeout", &self.timeout)
            .field("key", &self.key)
            .field("methods", &self.methods)
            .field("exempt", &self.exempt.is_some())
            .field("backoff", &self.backoff)
            .field("shared", &self.shared)
            .field("kind", &self.kind)
            .field("enforce_in_debug", &self.enforce_in_debug)
            .finish()
    }
}

/// Serializable gate options (config files)
#[derive(Debug, Clone, Deserialize)]
pub struct GateOptions {
    #[serde(default = "default_threshold")]
    pub threshold: u64,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Built-in key strategy name
    #[serde(default = "default_key")]
    pub key: String,

    #[serde(default = "default_method_names")]
    pub methods: Vec<String>,

    #[serde(default)]
    pub backoff: bool,

    #[serde(default)]
    pub shared: bool,

    /// sliding, pointing or random
    #[serde(default)]
    pub kind: Option<String>,

    #[serde(default)]
    pub enforce_in_debug: bool,
}

fn default_threshold() -> u64 { DEFAULT_THRESHOLD }
fn default_timeout_secs() -> u64 { DEFAULT_TIMEOUT_SECS }
fn default_key() -> String { "ip".to_string() }
fn default_method_names() -> Vec<String> { DEFAULT_METHODS.iter().map(|m| m.to_string()).collect() }

impl Default for GateOptions {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            timeout_secs: default_timeout_secs(),
            key: default_key(),
            methods: default_method_names(),
            backoff: false,
            shared: false,
            kind: None,
            enforce_in_debug: false,
        }
    }
}

/// Outcome of running a request through the gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Debug mode, exempt or untracked method; the store was not touched
    Bypassed,
    /// Below threshold; the counter now holds `attempts`
    Counted { attempts: u64 },
    /// Token accepted and counter reset
    Verified,
    /// Counter unreadable; let through
    StoreUnavailable,
    /// CAPTCHA required
    Challenged(ChallengePayload),
}

impl Verdict {
    /// Whether the wrapped handler should run
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Self::Challenged(_))
    }

    pub fn challenge(&self) -> Option<&ChallengePayload> {
        match self {
            Self::Challenged(payload) => Some(payload),
            _ => None,
        }
    }
}

/// Attempt gate
pub struct AttemptGate {
    config: GateConfig,
    settings: Arc<Settings>,
    store: Arc<dyn CounterStore>,
    verifier: Arc<dyn TokenVerifier>,
}

impl AttemptGate {
    pub fn new(
        config: GateConfig,
        settings: Arc<Settings>,
        store: Arc<dyn CounterStore>,
        verifier: Arc<dyn TokenVerifier>,
    ) -> Self {
        Self {
            config,
            settings,
            store,
            verifier,
        }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Debug mode, exempt requests and untracked methods skip the gate
    pub fn should_bypass(&self, ctx: &RequestContext) -> bool {
        if self.settings.debug && !self.config.enforce_in_debug {
            return true;
        }

        if self.config.exempt.as_ref().is_some_and(|exempt| exempt(ctx)) {
            return true;
        }

        !self.config.methods.contains(&ctx.method)
    }

    /// Store key of the counter tracking `ctx`
    pub fn counter_key(&self, ctx: &RequestContext) -> String {
        let identity = self
            .config
            .key
            .identify(ctx)
            .unwrap_or_else(|| ANONYMOUS_IDENTITY.to_string());

        if self.config.shared {
            format!("{}{}", ATTEMPTS_PREFIX, identity)
        } else {
            format!("{}{}:{}", ATTEMPTS_PREFIX, identity, ctx.path)
        }
    }

    /// Counter lifetime for a write made at `attempts`.
    ///
    /// With backoff on and `attempts` at or past the threshold the base
    /// timeout doubles per extra attempt. Writes only happen below the
    /// threshold, so in practice this is always the base timeout.
    pub fn attempt_ttl(&self, attempts: u64) -> Duration {
        if self.config.backoff && attempts >= self.config.threshold {
            let shift = (attempts - self.config.threshold).min(MAX_BACKOFF_SHIFT) as u32;
            self.config.timeout.saturating_mul(1 << shift)
        } else {
            self.config.timeout
        }
    }

    /// Fresh challenge payload
    pub fn challenge(&self) -> ChallengePayload {
        ChallengePayload::issue(
            &self.settings.captcha_url,
            &self.settings.client_id,
            self.config.kind,
        )
    }

    /// Run a request through the gate.
    ///
    /// `token` is only invoked once the threshold has been reached, so
    /// requests below it never pay for body buffering.
    pub async fn evaluate<F, Fut>(&self, ctx: &RequestContext, token: F) -> Verdict
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<String>>,
    {
        if self.should_bypass(ctx) {
            return Verdict::Bypassed;
        }

        let key = self.counter_key(ctx);

        let attempts = match self.store.get(&key).await {
            Ok(attempts) => attempts,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Attempt counter unavailable, letting request through");
                return Verdict::StoreUnavailable;
            }
        };

        if attempts >= self.config.threshold {
            let verified = match token().await {
                Some(token) => self.verifier.verify(&token).await,
                None => false,
            };

            if !verified {
                tracing::debug!(key = %key, attempts, "CAPTCHA required");
                return Verdict::Challenged(self.challenge());
            }

            if let Err(e) = self.store.delete(&key).await {
                tracing::warn!(key = %key, error = %e, "Failed to reset attempt counter");
            }
            tracing::debug!(key = %key, "CAPTCHA passed, counter reset");
            return Verdict::Verified;
        }

        let next = attempts + 1;
        if let Err(e) = self.store.set(&key, next, self.attempt_ttl(attempts)).await {
            tracing::warn!(key = %key, error = %e, "Failed to record attempt");
        }

        Verdict::Counted { attempts: next }
    }
}

impl fmt::Debug for AttemptGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttemptGate")
            .field("config", &self.config)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
