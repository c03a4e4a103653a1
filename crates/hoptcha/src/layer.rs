//! Tower middleware putting routes behind the attempt gate.
//!
//! ```ignore
//! let app = Router::new()
//!     .route("/submit/", post(submit))
//!     .route_layer(HoptchaLayer::new(gate));
//! ```

use axum::body::Body;
use axum::http::Request;
use axum::response::{IntoResponse, Json, Response};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

use hoptcha_common::ChallengePayload;
use hoptcha_common::constants::DEFAULT_BODY_LIMIT;

use crate::gate::{AttemptGate, Verdict};
use crate::identity::RequestContext;
use crate::token;

/// Builds the response sent instead of the protected one
pub type ChallengeResponder = Arc<dyn Fn(&RequestContext, ChallengePayload) -> Response + Send + Sync>;

#[derive(Clone)]
pub struct HoptchaLayer {
    gate: Arc<AttemptGate>,
    responder: Option<ChallengeResponder>,
    body_limit: usize,
}

impl HoptchaLayer {
    pub fn new(gate: AttemptGate) -> Self {
        Self::from_shared(Arc::new(gate))
    }

    pub fn from_shared(gate: Arc<AttemptGate>) -> Self {
        Self {
            gate,
            responder: None,
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    /// Replace the default JSON challenge response
    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&RequestContext, ChallengePayload) -> Response + Send + Sync + 'static,
    {
        self.responder = Some(Arc::new(responder));
        self
    }

    /// Largest body searched for a token
    pub fn body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    pub fn gate(&self) -> &Arc<AttemptGate> {
        &self.gate
    }
}

impl<S> Layer<S> for HoptchaLayer {
    type Service = HoptchaService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        HoptchaService {
            inner,
            gate: self.gate.clone(),
            responder: self.responder.clone(),
            body_limit: self.body_limit,
        }
    }
}

#[derive(Clone)]
pub struct HoptchaService<S> {
    inner: S,
    gate: Arc<AttemptGate>,
    responder: Option<ChallengeResponder>,
    body_limit: usize,
}

impl<S> Service<Request<Body>> for HoptchaService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        // Use the instance that was polled ready, leave a fresh clone behind
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let gate = self.gate.clone();
        let responder = self.responder.clone();
        let body_limit = self.body_limit;

        Box::pin(async move {
            let (parts, mut body) = req.into_parts();
            let ctx = RequestContext::from_parts(&parts);

            let verdict = {
                let head = &parts;
                let body = &mut body;
                gate.evaluate(&ctx, move || token::extract(head, body, body_limit))
                    .await
            };

            if let Verdict::Challenged(payload) = verdict {
                let response = match responder {
                    Some(respond) => respond(&ctx, payload),
                    None => Json(payload).into_response(),
                };
                return Ok(response);
            }

            inner.call(Request::from_parts(parts, body)).await
        })
    }
}
