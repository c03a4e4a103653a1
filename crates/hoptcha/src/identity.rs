//! Identity key derivation.
//!
//! A `RequestContext` is a snapshot of the request head holding everything a
//! key strategy or exempt predicate may look at. Strategies map it to the
//! identity an attempt counter is scoped to.

use axum::extract::ConnectInfo;
use axum::http::{Method, request::Parts};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use hoptcha_common::HoptchaError;
use hoptcha_common::constants::UNKNOWN_IP;

/// Authenticated principal, inserted as a request extension by the
/// application's auth layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: String,
    pub is_staff: bool,
    pub is_superuser: bool,
}

impl AuthenticatedUser {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_staff: false,
            is_superuser: false,
        }
    }

    pub fn staff(mut self) -> Self {
        self.is_staff = true;
        self
    }

    pub fn superuser(mut self) -> Self {
        self.is_superuser = true;
        self
    }
}

/// Session key, inserted as a request extension by the session layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionKey(pub String);

/// What the gate knows about a request
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    pub path: String,
    pub remote_ip: Option<IpAddr>,
    pub user: Option<AuthenticatedUser>,
    pub session_key: Option<String>,
}

impl RequestContext {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            remote_ip: None,
            user: None,
            session_key: None,
        }
    }

    /// Snapshot a request head
    pub fn from_parts(parts: &Parts) -> Self {
        let remote_ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());

        Self {
            method: parts.method.clone(),
            path: parts.uri.path().to_string(),
            remote_ip,
            user: parts.extensions.get::<AuthenticatedUser>().cloned(),
            session_key: parts
                .extensions
                .get::<SessionKey>()
                .map(|SessionKey(key)| key.clone())
                .filter(|key| !key.is_empty()),
        }
    }

    pub fn with_remote_ip(mut self, ip: IpAddr) -> Self {
        self.remote_ip = Some(ip);
        self
    }

    pub fn with_user(mut self, user: AuthenticatedUser) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_session_key(mut self, key: impl Into<String>) -> Self {
        self.session_key = Some(key.into());
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    /// Staff and superusers are trusted
    pub fn is_trusted(&self) -> bool {
        self.user
            .as_ref()
            .is_some_and(|user| user.is_staff || user.is_superuser)
    }
}

/// Custom identity function
pub type KeyFn = Arc<dyn Fn(&RequestContext) -> Option<String> + Send + Sync>;

/// How the identity part of a counter key is derived
#[derive(Clone, Default)]
pub enum KeyStrategy {
    /// Remote IP, or `unknown-ip`
    #[default]
    Ip,
    /// Authenticated user id
    User,
    /// User id, then session key, then remote IP
    UserOrSession,
    /// User id, then `Ip`
    UserOrIp,
    /// Caller-supplied function
    Custom(KeyFn),
}

impl KeyStrategy {
    /// Look up a built-in strategy by name.
    ///
    /// Unknown names fail here, at configuration time.
    pub fn from_name(name: &str) -> Result<Self, HoptchaError> {
        match name {
            "ip" => Ok(Self::Ip),
            "user" => Ok(Self::User),
            "user_or_session" => Ok(Self::UserOrSession),
            "user_or_ip" => Ok(Self::UserOrIp),
            other => Err(HoptchaError::UnknownKeyStrategy(other.to_string())),
        }
    }

    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&RequestContext) -> Option<String> + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }

    pub fn identify(&self, ctx: &RequestContext) -> Option<String> {
        match self {
            Self::Ip => Some(by_ip(ctx)),
            Self::User => by_user(ctx),
            Self::UserOrSession => by_user(ctx)
                .or_else(|| ctx.session_key.clone())
                .or_else(|| ctx.remote_ip.map(|ip| ip.to_string())),
            Self::UserOrIp => by_user(ctx).or_else(|| Some(by_ip(ctx))),
            Self::Custom(f) => f(ctx),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Ip => "ip",
            Self::User => "user",
            Self::UserOrSession => "user_or_session",
            Self::UserOrIp => "user_or_ip",
            Self::Custom(_) => "custom",
        }
    }
}

impl fmt::Debug for KeyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyStrategy({})", self.name())
    }
}

impl TryFrom<&str> for KeyStrategy {
    type Error = HoptchaError;

    fn try_from(name: &str) -> Result<Self, Self::Error> {
        Self::from_name(name)
    }
}

fn by_ip(ctx: &RequestContext) -> String {
    ctx.remote_ip
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| UNKNOWN_IP.to_string())
}

fn by_user(ctx: &RequestContext) -> Option<String> {
    ctx.user.as_ref().map(|user| user.id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;

    fn ctx() -> RequestContext {
        RequestContext::new(Method::POST, "/submit/")
    }

    #[test]
    fn test_ip_strategy() {
        let ip: IpAddr = "1.2.3.4".parse().unwrap();
        assert_eq!(KeyStrategy::Ip.identify(&ctx().with_remote_ip(ip)).as_deref(), Some("1.2.3.4"));
        assert_eq!(KeyStrategy::Ip.identify(&ctx()).as_deref(), Some(UNKNOWN_IP));
    }

    #[test]
    fn test_user_strategy() {
        assert_eq!(KeyStrategy::User.identify(&ctx()), None);
        let c = ctx().with_user(AuthenticatedUser::new("42"));
        assert_eq!(KeyStrategy::User.identify(&c).as_deref(), Some("42"));
    }

    #[test]
    fn test_user_or_session_preference() {
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        let strategy = KeyStrategy::UserOrSession;

        let full = ctx()
            .with_remote_ip(ip)
            .with_session_key("abc")
            .with_user(AuthenticatedUser::new("7"));
        assert_eq!(strategy.identify(&full).as_deref(), Some("7"));

        let session = ctx().with_remote_ip(ip).with_session_key("abc");
        assert_eq!(strategy.identify(&session).as_deref(), Some("abc"));

        let ip_only = ctx().with_remote_ip(ip);
        assert_eq!(strategy.identify(&ip_only).as_deref(), Some("10.0.0.1"));

        assert_eq!(strategy.identify(&ctx()), None);
    }

    #[test]
    fn test_user_or_ip() {
        let strategy = KeyStrategy::UserOrIp;
        assert_eq!(strategy.identify(&ctx()).as_deref(), Some(UNKNOWN_IP));
        let c = ctx().with_user(AuthenticatedUser::new("9"));
        assert_eq!(strategy.identify(&c).as_deref(), Some("9"));
    }

    #[test]
    fn test_custom_strategy() {
        let strategy = KeyStrategy::custom(|ctx| Some(format!("tenant-{}", ctx.path.len())));
        assert_eq!(strategy.identify(&ctx()).as_deref(), Some("tenant-8"));
        assert_eq!(strategy.name(), "custom");
    }

    #[test]
    fn test_unknown_name_fails_fast() {
        let err = KeyStrategy::from_name("cookie").unwrap_err();
        assert!(matches!(err, HoptchaError::UnknownKeyStrategy(ref n) if n == "cookie"));
        assert!(KeyStrategy::try_from("user_or_ip").is_ok());
    }

    #[test]
    fn test_context_from_parts() {
        let addr: SocketAddr = "1.2.3.4:5555".parse().unwrap();
        let req = Request::builder()
            .method("POST")
            .uri("/submit/?x=1")
            .extension(ConnectInfo(addr))
            .extension(AuthenticatedUser::new("5").staff())
            .extension(SessionKey(String::new()))
            .body(Body::empty())
            .unwrap();
        let (parts, _) = req.into_parts();

        let ctx = RequestContext::from_parts(&parts);
        assert_eq!(ctx.method, Method::POST);
        assert_eq!(ctx.path, "/submit/");
        assert_eq!(ctx.remote_ip, Some("1.2.3.4".parse().unwrap()));
        assert!(ctx.is_trusted());
        assert_eq!(ctx.session_key, None);
    }
}
