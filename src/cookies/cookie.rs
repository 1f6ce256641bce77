//! Cookie core type and `Set-Cookie` parsing.
//!
//! The [`Cookie`] struct is used both for cookies a caller sets by hand and
//! for cookies extracted from responses. It can be (de)serialized via `serde`.
//!
//! ```rust
//! use baas_transport::cookies::Cookie;
//!
//! let c = Cookie::new("session", "abc123");
//! assert_eq!(c.domain, "");
//! assert_eq!(c.path, "/");
//! assert!(c.discard);
//! ```

use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};
use url::Url;

/// A cookie as stored by a [`CookieJar`](super::CookieJar).
///
/// Identity inside a jar is the `(name, domain, path)` triple; two cookies
/// with the same name may coexist when they differ in domain or path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    /// Cookie name (case-sensitive).
    pub name: String,

    /// Raw cookie value (not URL-decoded).
    pub value: String,

    /// Domain scoping. An empty domain is sent with every request.
    pub domain: String,

    /// Path scoping (e.g., `"/"`).
    pub path: String,

    /// Cookie version attribute (0 for Netscape-style cookies).
    pub version: u8,

    /// If `true`, cookie is sent only over HTTPS.
    pub secure: bool,

    /// Expiry as a Unix timestamp (`Max-Age` wins over `Expires`). Session
    /// cookies have `None`.
    pub expires: Option<i64>,

    /// If `true`, cookie carried the `HttpOnly` attribute.
    pub http_only: bool,

    /// Discard at the end of the session.
    pub discard: bool,
}

impl Cookie {
    /// Creates a cookie from a bare name/value pair.
    ///
    /// Defaults: version 0, domain `""`, path `/`, not secure, no expiry,
    /// discarded at session end.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: String::new(),
            path: "/".to_string(),
            version: 0,
            secure: false,
            expires: None,
            http_only: false,
            discard: true,
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// True once the expiry has passed. Session cookies never expire.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(OffsetDateTime::now_utc().unix_timestamp())
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires.is_some_and(|expires| expires <= now)
    }

    /// True when `(name, domain, path)` equals the other cookie's triple.
    pub fn same_identity(&self, other: &Cookie) -> bool {
        self.name == other.name && self.domain == other.domain && self.path == other.path
    }

    /// Parses one `Set-Cookie` header value received for `url`.
    ///
    /// Handles `Domain` (leading dot stripped), `Path`, `Expires`,
    /// `Max-Age`, `Version`, `Secure` and `HttpOnly`. Without `Path` the
    /// directory of the request path is used; without `Domain` the request
    /// host is used. Returns `None` for headers without a `name=value` pair
    /// and for a `Domain` the request host does not belong to.
    ///
    /// A cookie whose `Max-Age` is not positive, or whose `Expires` lies in
    /// the past, comes back already expired so the caller can drop it.
    pub fn parse(header: &str, url: &Url) -> Option<Cookie> {
        let mut parts = header.split(';');
        let (name, value) = parts.next()?.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
        let mut cookie = Cookie::new(name, value.trim().trim_matches('"'));
        cookie.domain = host.clone();
        cookie.path = default_path(url).to_string();

        let mut expires = None;
        let mut max_age = None;

        for part in parts {
            let part = part.trim();
            match part.split_once('=') {
                Some((k, v)) => {
                    let v = v.trim();
                    match k.trim().to_ascii_lowercase().as_str() {
                        "path" if v.starts_with('/') => cookie.path = v.to_string(),
                        "domain" if !v.is_empty() => {
                            cookie.domain = v.trim_start_matches('.').to_ascii_lowercase()
                        }
                        "expires" => expires = Some(v.to_string()),
                        "max-age" => max_age = Some(v.to_string()),
                        "version" => cookie.version = v.trim_matches('"').parse().unwrap_or(0),
                        _ => {}
                    }
                }
                None => {
                    if part.eq_ignore_ascii_case("secure") {
                        cookie.secure = true;
                    } else if part.eq_ignore_ascii_case("httponly") {
                        cookie.http_only = true;
                    }
                }
            }
        }

        if !domain_match(&host, &cookie.domain) {
            log::debug!("rejecting cookie {} for domain {} set by {}", cookie.name, cookie.domain, host);
            return None;
        }

        let now = OffsetDateTime::now_utc().unix_timestamp();
        cookie.expires = max_age
            .and_then(|v| v.parse::<i64>().ok())
            .map(|seconds| now.saturating_add(seconds))
            .or_else(|| expires.as_deref().and_then(parse_http_date));
        cookie.discard = cookie.expires.is_none();
        Some(cookie)
    }

    /// Returns true when this cookie should be sent with a request to `url`.
    pub fn matches(&self, url: &Url) -> bool {
        let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
        let domain_ok = self.domain.is_empty() || domain_match(&host, &self.domain.to_ascii_lowercase());
        let secure_ok = !self.secure || url.scheme() == "https";

        domain_ok && path_match(url.path(), &self.path) && secure_ok && !self.is_expired()
    }
}

/// `host` is `domain` itself or one of its subdomains.
fn domain_match(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// `/api` covers `/api` and `/api/x` but not `/apiary`.
fn path_match(request_path: &str, cookie_path: &str) -> bool {
    match request_path.strip_prefix(cookie_path) {
        Some(rest) => rest.is_empty() || cookie_path.ends_with('/') || rest.starts_with('/'),
        None => false,
    }
}

/// Parses an `Expires` date in either the RFC 1123 form or the older
/// dash-separated cookie form.
fn parse_http_date(value: &str) -> Option<i64> {
    let rfc1123 = format_description!(
        "[weekday repr:short case_sensitive:false], [day] [month repr:short case_sensitive:false] [year] [hour]:[minute]:[second] GMT"
    );
    let netscape = format_description!(
        "[weekday repr:short case_sensitive:false], [day]-[month repr:short case_sensitive:false]-[year] [hour]:[minute]:[second] GMT"
    );

    let value = value.trim();
    PrimitiveDateTime::parse(value, rfc1123)
        .or_else(|_| PrimitiveDateTime::parse(value, netscape))
        .map(|date| date.assume_utc().unix_timestamp())
        .map_err(|e| log::debug!("ignoring unparseable cookie expiry {value:?}: {e}"))
        .ok()
}

fn default_path(url: &Url) -> &str {
    url.path()
        .rsplit_once('/')
        .map_or("/", |(dir, _)| if dir.is_empty() { "/" } else { dir })
}
