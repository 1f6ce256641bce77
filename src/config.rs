//! Session configuration.
//!
//! `SessionConfig` holds what every request of a [`Session`](crate::Session)
//! shares: default headers, certificate policy, timeout and the transport
//! used to reach the network.
//!
//! `SessionConfig` provides sensible defaults via [`Default`] and a fluent
//! [`SessionConfig::builder()`] for customization with validation.
//!
//! # Examples
//!
//! ## Use defaults
//! ```rust
//! use baas_transport::config::{SessionConfig, Transport};
//! let cfg = SessionConfig::default();
//! assert_eq!(cfg.transport, Transport::Direct);
//! assert!(cfg.verify);
//! ```
//!
//! ## Customize with the builder
//! ```rust
//! use std::time::Duration;
//! use baas_transport::config::{SessionConfig, Transport};
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cfg = SessionConfig::builder()
//!     .user_agent("scores-sync/2.1")
//!     .header("X-Application-Id", "4f1c9a")
//!     .timeout(Duration::from_secs(15))
//!     .transport(Transport::SandboxedRpc)
//!     .build()?; // returns Result<SessionConfig, SessionConfigError>
//! # Ok(()) }
//! ```
//!
//! # Fields (summary)
//! - `user_agent`: `User-Agent` sent with every request.
//! - `accept_encoding`: `Accept-Encoding` sent with every request
//!   (default: `gzip, deflate`, the encodings responses can undo).
//! - `accept`: `Accept` header (default: `*/*`).
//! - `headers`: extra default headers, applied after the three above.
//! - `timeout`: default request timeout (`None` waits indefinitely).
//! - `verify`: validate TLS certificates (default: `true`).
//! - `transport`: which adapter serves `http://` and `https://`.
//! - `max_response_bytes`: reply size cap for the sandboxed transport.
//! - `use_system_proxy`: honour the `HTTP(S)_PROXY` environment variables.
//!
//! # Errors
//!
//! Builder validation can return [`SessionConfigError`] if values are invalid
//! (e.g. an empty user agent, a header that cannot be sent, or a zero
//! timeout).

use std::fmt;
use std::time::Duration;

use http::header::{HeaderName, HeaderValue, ACCEPT, ACCEPT_ENCODING, USER_AGENT};
use http::HeaderMap;

pub const DEFAULT_USER_AGENT: &str = concat!("baas-transport/", env!("CARGO_PKG_VERSION"));

/// Which adapter a session mounts for `http://` and `https://`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transport {
    /// Blocking client straight onto the network.
    #[default]
    Direct,
    /// Every fetch goes through a platform fetch service.
    SandboxedRpc,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub user_agent: String,
    pub accept_encoding: String,
    pub accept: String,
    pub headers: Vec<(String, String)>,
    pub timeout: Option<Duration>,
    pub verify: bool,
    pub transport: Transport,
    pub max_response_bytes: usize,
    pub use_system_proxy: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_encoding: "gzip, deflate".to_string(),
            accept: "*/*".to_string(),
            headers: Vec::new(),
            timeout: None,
            verify: true,
            transport: Transport::Direct,
            max_response_bytes: 32 * 1024 * 1024,
            use_system_proxy: true,
        }
    }
}

impl SessionConfig {
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }

    /// The default header map every request starts from.
    pub fn default_headers(&self) -> Result<HeaderMap, SessionConfigError> {
        let mut map = HeaderMap::new();
        map.insert(USER_AGENT, header_value("User-Agent", &self.user_agent)?);
        map.insert(ACCEPT_ENCODING, header_value("Accept-Encoding", &self.accept_encoding)?);
        map.insert(ACCEPT, header_value("Accept", &self.accept)?);

        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| SessionConfigError::InvalidHeaderName(name.clone()))?;
            let value = header_value(name.as_str(), value)?;
            map.insert(name, value);
        }
        Ok(map)
    }
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, SessionConfigError> {
    HeaderValue::from_str(value).map_err(|_| SessionConfigError::InvalidHeaderValue(name.to_string()))
}

/// Builder for [`SessionConfig`].
#[derive(Debug, Clone, Default)]
pub struct SessionConfigBuilder {
    inner: SessionConfig,
}

impl SessionConfigBuilder {
    #[inline]
    fn map(mut self, f: impl FnOnce(&mut SessionConfig)) -> Self {
        f(&mut self.inner);
        self
    }

    pub fn user_agent<S: Into<String>>(self, ua: S) -> Self { self.map(|c| c.user_agent = ua.into()) }
    pub fn accept_encoding<S: Into<String>>(self, enc: S) -> Self { self.map(|c| c.accept_encoding = enc.into()) }
    pub fn accept<S: Into<String>>(self, accept: S) -> Self { self.map(|c| c.accept = accept.into()) }
    pub fn header<K: Into<String>, V: Into<String>>(self, name: K, value: V) -> Self {
        self.map(|c| c.headers.push((name.into(), value.into())))
    }
    pub fn timeout(self, timeout: Duration) -> Self { self.map(|c| c.timeout = Some(timeout)) }
    pub fn verify(self, on: bool) -> Self { self.map(|c| c.verify = on) }
    pub fn transport(self, transport: Transport) -> Self { self.map(|c| c.transport = transport) }
    pub fn max_response_bytes(self, n: usize) -> Self { self.map(|c| c.max_response_bytes = n) }
    pub fn use_system_proxy(self, on: bool) -> Self { self.map(|c| c.use_system_proxy = on) }

    /// Apply multiple changes in one go.
    pub fn with(self, f: impl FnOnce(&mut SessionConfig)) -> Self { self.map(f) }

    /// Validate and build the final config.
    pub fn build(self) -> Result<SessionConfig, SessionConfigError> {
        validate(&self.inner)?;
        Ok(self.inner)
    }
}

// ---------- Validation ----------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionConfigError {
    EmptyUserAgent,
    InvalidHeaderName(String),
    InvalidHeaderValue(String),
    ZeroTimeout,
    ZeroResponseLimit,
}

impl fmt::Display for SessionConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionConfigError::EmptyUserAgent => write!(f, "user_agent must not be empty"),
            SessionConfigError::InvalidHeaderName(name) => write!(f, "{name:?} is not a valid header name"),
            SessionConfigError::InvalidHeaderValue(name) => write!(f, "value of header {name} cannot be sent"),
            SessionConfigError::ZeroTimeout => write!(f, "timeout must be greater than zero"),
            SessionConfigError::ZeroResponseLimit => write!(f, "max_response_bytes must be at least 1"),
        }
    }
}
impl std::error::Error for SessionConfigError {}

fn validate(c: &SessionConfig) -> Result<(), SessionConfigError> {
    if c.user_agent.trim().is_empty() {
        return Err(SessionConfigError::EmptyUserAgent);
    }
    if c.timeout == Some(Duration::ZERO) {
        return Err(SessionConfigError::ZeroTimeout);
    }
    if c.max_response_bytes == 0 {
        return Err(SessionConfigError::ZeroResponseLimit);
    }
    c.default_headers()?;
    Ok(())
}
