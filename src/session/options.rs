//! Per-request options layered over the session defaults.

use std::time::Duration;

use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;

use crate::cookies::{Cookie, CookieJar};
use crate::errors::{Error, Result};
use crate::net::Body;

/// Options for a single session request.
///
/// ```rust
/// use std::time::Duration;
/// use baas_transport::RequestOptions;
///
/// let options = RequestOptions::new()
///     .header("X-Session-Token", "r:8f2e")
///     .unset_header("Accept-Encoding")
///     .form([("limit", "10")])
///     .timeout(Duration::from_secs(5));
/// ```
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// `None` deletes the session default of that name.
    headers: Vec<(HeaderName, Option<HeaderValue>)>,
    pub(crate) body: Option<Body>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) verify: Option<bool>,
    pub(crate) cookies: CookieJar,
    invalid: Option<String>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a header, replacing the session default of the same name
    /// (names compare case-insensitively).
    pub fn header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        let name = name.as_ref();
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value.as_ref()),
        ) {
            (Ok(n), Ok(v)) => self.headers.push((n, Some(v))),
            _ => self.record_invalid(format!("invalid header {name:?}")),
        }
        self
    }

    /// Removes a session default header for this request only.
    pub fn unset_header(mut self, name: impl AsRef<str>) -> Self {
        let name = name.as_ref();
        match HeaderName::from_bytes(name.as_bytes()) {
            Ok(n) => self.headers.push((n, None)),
            Err(_) => self.record_invalid(format!("invalid header name {name:?}")),
        }
        self
    }

    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Form-encodes `pairs` as the body.
    pub fn form<I, K, V>(self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.body(Body::form(pairs))
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn verify(mut self, verify: bool) -> Self {
        self.verify = Some(verify);
        self
    }

    /// Adds a request-local cookie; it overrides a session cookie with the
    /// same identity for this request only.
    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.set_cookie(Cookie::new(name, value));
        self
    }

    pub fn cookies(mut self, jar: &CookieJar) -> Self {
        self.cookies.update(jar);
        self
    }

    /// Applies the local headers on top of `defaults`.
    pub(crate) fn merge_headers(&self, defaults: &HeaderMap) -> HeaderMap {
        let mut merged = defaults.clone();
        for (name, value) in &self.headers {
            match value {
                Some(value) => {
                    merged.insert(name.clone(), value.clone());
                }
                None => {
                    merged.remove(name);
                }
            }
        }
        merged
    }

    pub(crate) fn check(&self) -> Result<()> {
        match &self.invalid {
            Some(message) => Err(Error::Request(message.clone())),
            None => Ok(()),
        }
    }

    fn record_invalid(&mut self, message: String) {
        log::warn!("{message}");
        self.invalid.get_or_insert(message);
    }
}
