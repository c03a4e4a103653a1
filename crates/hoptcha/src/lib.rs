//! # Hoptcha
//!
//! Puts state-changing routes behind a CAPTCHA once a client has made too
//! many attempts.
//!
//! Each tracked request bumps a counter keyed by the client's identity. Past
//! the threshold the request has to carry a `captcha_token`, which is checked
//! against the provider; a valid token resets the counter, anything else gets
//! a `{"captcha": true, "url": ...}` challenge instead of the handler.
//!
//! ## Modules
//! - `gate` - Attempt counting and the pass/challenge decision
//! - `layer` - Tower middleware wrapping axum routes
//! - `identity` - Request context and counter key strategies
//! - `store` - Counter storage (in-memory, Redis)
//! - `token` - Finding the CAPTCHA token in a request
//! - `verifier` - Remote token verification
//! - `settings` - Provider settings from the environment
//! - `tags` - HTML snippets for embedding the challenge

pub mod gate;
pub mod identity;
pub mod layer;
pub mod settings;
pub mod store;
pub mod tags;
pub mod token;
pub mod verifier;

#[cfg(test)]
mod testing;

pub use gate::{AttemptGate, GateConfig, GateOptions, Verdict};
pub use hoptcha_common::{ChallengeKind, ChallengePayload, HoptchaError};
pub use identity::{AuthenticatedUser, KeyStrategy, RequestContext, SessionKey};
pub use layer::{HoptchaLayer, HoptchaService};
pub use settings::Settings;
pub use store::{CounterStore, MemoryStore, RedisStore};
pub use verifier::{RemoteVerifier, TokenVerifier};
