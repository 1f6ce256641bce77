//! Dict-like, multi-domain cookie jar.
//!
//! A [`CookieJar`] holds cookies for any number of domains and paths. The
//! dict-style accessors ([`CookieJar::get`], [`CookieJar::set`]) look cookies
//! up by name, optionally narrowed by domain and path. When a name alone is
//! ambiguous the lookup fails with [`Error::CookieConflict`] rather than
//! picking one arbitrarily.
//!
//! ## Notes
//! - Iteration follows insertion order. Replacing a cookie with the same
//!   `(name, domain, path)` keeps its position; removals shift later entries.
//! - This type is **not** internally synchronized. Sessions share it as a
//!   [`CookieJarHandle`] (`Arc<RwLock<CookieJar>>`).
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use http::HeaderMap;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::cookies::Cookie;
use crate::errors::{Error, Result};

/// A handle to a cookie jar shared between a session and its in-flight
/// callback requests.
pub type CookieJarHandle = Arc<RwLock<CookieJar>>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CookieJar {
    cookies: Vec<Cookie>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a jar from scalar name/value pairs using [`Cookie::new`] defaults.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut jar = Self::new();
        for (name, value) in pairs {
            jar.set_cookie(Cookie::new(name, value));
        }
        jar
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Cookie> {
        self.cookies.iter()
    }

    /// Dict-like lookup. Returns `Ok(None)` when nothing matches and
    /// [`Error::CookieConflict`] when more than one cookie matches; pass a
    /// domain and/or path to disambiguate.
    pub fn get(&self, name: &str, domain: Option<&str>, path: Option<&str>) -> Result<Option<&str>> {
        match self.find_no_duplicates(name, domain, path) {
            Ok(cookie) => Ok(Some(cookie.value.as_str())),
            Err(Error::CookieNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Like [`CookieJar::get`], falling back to `default` when nothing matches.
    pub fn get_or<'a>(
        &'a self,
        name: &str,
        domain: Option<&str>,
        path: Option<&str>,
        default: &'a str,
    ) -> Result<&'a str> {
        Ok(self.get(name, domain, path)?.unwrap_or(default))
    }

    /// Dict-like set. A `None` value removes every matching cookie instead of
    /// storing one and returns `None`; otherwise the stored cookie is returned.
    ///
    /// Without an explicit domain the cookie gets domain `""` and is sent
    /// with every request; without a path it gets `/`.
    pub fn set(
        &mut self,
        name: &str,
        value: Option<&str>,
        domain: Option<&str>,
        path: Option<&str>,
    ) -> Option<Cookie> {
        let Some(value) = value else {
            self.remove(name, domain, path);
            return None;
        };

        let mut cookie = Cookie::new(name, value);
        if let Some(domain) = domain {
            cookie.domain = domain.to_string();
        }
        if let Some(path) = path {
            cookie.path = path.to_string();
        }
        self.set_cookie(cookie.clone());
        Some(cookie)
    }

    /// Stores `cookie`, replacing any cookie with the same `(name, domain, path)`.
    pub fn set_cookie(&mut self, cookie: Cookie) {
        match self.cookies.iter_mut().find(|c| c.same_identity(&cookie)) {
            Some(existing) => *existing = cookie,
            None => self.cookies.push(cookie),
        }
    }

    /// Removes cookies named `name`, over all domains and paths unless
    /// narrowed. Returns how many were removed.
    pub fn remove(&mut self, name: &str, domain: Option<&str>, path: Option<&str>) -> usize {
        let before = self.cookies.len();
        self.cookies
            .retain(|c| !(c.name == name && filter_matches(c, domain, path)));
        before - self.cookies.len()
    }

    pub fn clear(&mut self) {
        self.cookies.clear();
    }

    /// Merges `other` into this jar; cookies with the same identity are
    /// overwritten by the incoming ones.
    pub fn update(&mut self, other: &CookieJar) {
        for cookie in other.iter() {
            self.set_cookie(cookie.clone());
        }
    }

    /// Returns the single cookie matching `name` and the optional filters.
    pub fn find_no_duplicates(
        &self,
        name: &str,
        domain: Option<&str>,
        path: Option<&str>,
    ) -> Result<&Cookie> {
        let mut found: Option<&Cookie> = None;

        for cookie in self
            .cookies
            .iter()
            .filter(|c| c.name == name && filter_matches(c, domain, path))
        {
            if found.is_some() {
                return Err(Error::CookieConflict {
                    name: name.to_string(),
                });
            }
            found = Some(cookie);
        }

        found.ok_or_else(|| Error::CookieNotFound {
            name: name.to_string(),
            domain: domain.map(str::to_string),
            path: path.map(str::to_string),
        })
    }

    pub fn keys(&self) -> Vec<&str> {
        self.cookies.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn values(&self) -> Vec<&str> {
        self.cookies.iter().map(|c| c.value.as_str()).collect()
    }

    pub fn items(&self) -> Vec<(&str, &str)> {
        self.cookies
            .iter()
            .map(|c| (c.name.as_str(), c.value.as_str()))
            .collect()
    }

    pub fn list_domains(&self) -> Vec<&str> {
        let mut domains: Vec<&str> = Vec::new();
        for cookie in &self.cookies {
            if !domains.contains(&cookie.domain.as_str()) {
                domains.push(&cookie.domain);
            }
        }
        domains
    }

    pub fn list_paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = Vec::new();
        for cookie in &self.cookies {
            if !paths.contains(&cookie.path.as_str()) {
                paths.push(&cookie.path);
            }
        }
        paths
    }

    pub fn multiple_domains(&self) -> bool {
        self.list_domains().len() > 1
    }

    /// Plain name/value map of the cookies matching the optional filters.
    /// Later cookies win on duplicate names.
    pub fn get_dict(&self, domain: Option<&str>, path: Option<&str>) -> HashMap<String, String> {
        self.cookies
            .iter()
            .filter(|c| filter_matches(c, domain, path))
            .map(|c| (c.name.clone(), c.value.clone()))
            .collect()
    }

    /// Applies the `Set-Cookie` headers of a reply to `url`.
    ///
    /// An already expired cookie removes the stored cookie with the same
    /// `(name, domain, path)` instead of being stored.
    pub fn extract_from_headers(&mut self, url: &Url, headers: &HeaderMap) {
        for header in headers.get_all(http::header::SET_COOKIE) {
            let Ok(header) = header.to_str() else {
                continue;
            };
            match Cookie::parse(header, url) {
                Some(cookie) if cookie.is_expired() => {
                    self.cookies.retain(|c| !c.same_identity(&cookie));
                }
                Some(cookie) => self.set_cookie(cookie),
                None => log::debug!("ignoring Set-Cookie header from {}", url),
            }
        }
    }

    /// Returns the `Cookie` request header value to send to `url`, if any.
    pub fn cookie_header(&self, url: &Url) -> Option<String> {
        let header = self
            .cookies
            .iter()
            .filter(|c| c.matches(url))
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ");

        if header.is_empty() {
            None
        } else {
            Some(header)
        }
    }
}

impl<'a> IntoIterator for &'a CookieJar {
    type Item = &'a Cookie;
    type IntoIter = std::slice::Iter<'a, Cookie>;

    fn into_iter(self) -> Self::IntoIter {
        self.cookies.iter()
    }
}

impl FromIterator<Cookie> for CookieJar {
    fn from_iter<T: IntoIterator<Item = Cookie>>(iter: T) -> Self {
        let mut jar = CookieJar::new();
        for cookie in iter {
            jar.set_cookie(cookie);
        }
        jar
    }
}

impl From<CookieJar> for CookieJarHandle {
    fn from(jar: CookieJar) -> Self {
        Arc::new(RwLock::new(jar))
    }
}

fn filter_matches(cookie: &Cookie, domain: Option<&str>, path: Option<&str>) -> bool {
    domain.map_or(true, |d| cookie.domain == d) && path.map_or(true, |p| cookie.path == p)
}
