//! Test doubles shared by the unit tests.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::verifier::TokenVerifier;

/// Accepts exactly one token, recording every call
pub struct FakeVerifier {
    valid: &'static str,
    calls: Mutex<Vec<String>>,
}

impl FakeVerifier {
    pub fn new(valid: &'static str) -> Arc<Self> {
        Arc::new(Self {
            valid,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TokenVerifier for FakeVerifier {
    async fn verify(&self, token: &str) -> bool {
        self.calls.lock().unwrap().push(token.to_string());
        token == self.valid
    }
}
