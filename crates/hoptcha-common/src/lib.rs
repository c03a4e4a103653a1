//! # Hoptcha Common
//!
//! Shared types, constants, and errors used across Hoptcha components.
//!
//! ## Modules
//! - `types` - Wire types (ChallengePayload, VerifyRequest, ChallengeKind, etc.)
//! - `error` - Common error types
//! - `constants` - Shared defaults and names

pub mod constants;
pub mod error;
pub mod types;

pub use error::HoptchaError;
pub use types::*;
