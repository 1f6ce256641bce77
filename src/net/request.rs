//! Outgoing request model.
//!
//! ```rust
//! use baas_transport::net::{Body, Method, Request};
//!
//! let prepared = Request::new(Method::Get, "https://api.example.com/1/classes/Score")
//!     .with_body(Body::form([("limit", "10")]))
//!     .prepare()
//!     .unwrap();
//!
//! assert_eq!(prepared.url.as_str(), "https://api.example.com/1/classes/Score?limit=10");
//! assert!(prepared.payload.is_none());
//! ```

use std::fmt;
use std::str::FromStr;

use http::header::{HeaderValue, COOKIE};
use http::HeaderMap;
use url::Url;

use crate::classify;
use crate::cookies::CookieJar;
use crate::errors::{Error, Result};

/// The four verbs the transport layer speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }

    /// True for the verbs whose body is sent as the request payload.
    pub fn carries_payload(&self) -> bool {
        matches!(self, Method::Post | Method::Put)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            other => Err(Error::Request(format!("unsupported method {other}"))),
        }
    }
}

impl From<Method> for http::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => http::Method::GET,
            Method::Post => http::Method::POST,
            Method::Put => http::Method::PUT,
            Method::Delete => http::Method::DELETE,
        }
    }
}

/// Request body: opaque bytes or an already encoded string (typically a
/// form-encoded query or a JSON document).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Bytes(Vec<u8>),
    Text(String),
}

impl Body {
    /// Form-encodes `pairs` (`a=1&b=two+words`).
    pub fn form<I, K, V>(pairs: I) -> Body
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (key, value) in pairs {
            serializer.append_pair(key.as_ref(), value.as_ref());
        }
        Body::Text(serializer.finish())
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Body::Bytes(bytes) => bytes,
            Body::Text(text) => text.as_bytes(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Body::Bytes(bytes) => bytes,
            Body::Text(text) => text.into_bytes(),
        }
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Text(text)
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Body::Text(text.to_string())
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::Bytes(bytes)
    }
}

impl From<&[u8]> for Body {
    fn from(bytes: &[u8]) -> Self {
        Body::Bytes(bytes.to_vec())
    }
}

/// A request as handed to an adapter. Adapters take it by value, so it can
/// no longer change once dispatched.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Body>,
    /// Cookies to attach; only those matching the URL are sent.
    pub cookies: CookieJar,
}

impl Request {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
            cookies: CookieJar::new(),
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_cookies(mut self, cookies: CookieJar) -> Self {
        self.cookies = cookies;
        self
    }

    /// Validates the URL and lays the request out for the wire.
    ///
    /// - `GET`: a non-empty body is appended to the URL as `?<body>`.
    /// - `POST`/`PUT`: the body becomes the payload.
    /// - `DELETE`: the body is dropped.
    ///
    /// A `Cookie` header is added from the jar unless one is already set.
    pub fn prepare(self) -> Result<PreparedRequest> {
        let mut url = classify::parse_url(&self.url)?;
        let mut payload = None;

        match (self.method, self.body) {
            (Method::Get, Some(body)) if !body.is_empty() => {
                let query = String::from_utf8_lossy(body.as_bytes()).into_owned();
                let joined = format!("{}?{}", self.url, query);
                url = classify::parse_url(&joined)?;
            }
            (method, Some(body)) if method.carries_payload() => payload = Some(body.into_bytes()),
            (Method::Delete, Some(body)) if !body.is_empty() => {
                log::debug!("dropping {} byte body of DELETE {}", body.as_bytes().len(), url);
            }
            _ => {}
        }

        let mut headers = self.headers;
        if !headers.contains_key(COOKIE) {
            if let Some(cookie) = self.cookies.cookie_header(&url) {
                let value = HeaderValue::from_str(&cookie)
                    .map_err(|e| Error::Request(format!("invalid cookie header: {e}")))?;
                headers.insert(COOKIE, value);
            }
        }

        Ok(PreparedRequest {
            method: self.method,
            url,
            headers,
            payload,
        })
    }
}

/// A validated request ready to be written to the wire.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub payload: Option<Vec<u8>>,
}
