//! Request session: default headers, a persistent cookie jar and a table of
//! transport adapters keyed by URL prefix.
//!
//! ```rust,no_run
//! use baas_transport::{RequestOptions, Session};
//!
//! # fn main() -> baas_transport::Result<()> {
//! let session = Session::new()?;
//! let mut response = session.get(
//!     "https://api.example.com/1/classes/GameScore",
//!     RequestOptions::new().form([("limit", "10")]),
//! )?;
//! println!("{}", response.text()?);
//! # Ok(()) }
//! ```
//!
//! ## Cookies
//! Cookies set by a response, including an error response, are merged into
//! the session jar once the request finishes, in callback mode before the
//! caller's callback runs. Concurrent callback requests merge in completion
//! order and the last writer wins per cookie identity; there is no ordering
//! between them beyond that.

use std::sync::{Arc, PoisonError};

use http::header::SET_COOKIE;
use http::HeaderMap;

use crate::adapter::{
    Adapter, AsyncHandle, Callback, DirectAdapter, SandboxAdapter, SendOptions, TokioRpcService,
};
use crate::classify;
use crate::config::{SessionConfig, Transport};
use crate::cookies::{CookieJar, CookieJarHandle};
use crate::errors::{Error, Result};
use crate::net::{Method, Request, Response};

mod options;

pub use options::RequestOptions;

pub struct Session {
    config: SessionConfig,
    headers: HeaderMap,
    cookies: CookieJarHandle,
    adapters: Vec<(String, Arc<dyn Adapter>)>,
}

impl Session {
    /// A session with the default configuration and the direct transport.
    pub fn new() -> Result<Self> {
        Self::with_config(SessionConfig::default())
    }

    /// A session whose `http://` and `https://` adapter is chosen by
    /// `config.transport`.
    pub fn with_config(config: SessionConfig) -> Result<Self> {
        let adapter: Arc<dyn Adapter> = match config.transport {
            Transport::Direct => Arc::new(DirectAdapter::with_system_proxy(config.use_system_proxy)),
            Transport::SandboxedRpc => {
                let service =
                    TokioRpcService::with_system_proxy(config.max_response_bytes, config.use_system_proxy)?;
                Arc::new(SandboxAdapter::new(Arc::new(service)))
            }
        };
        Self::with_adapter(config, adapter)
    }

    /// A session with `adapter` mounted for both `http://` and `https://`.
    pub fn with_adapter(config: SessionConfig, adapter: Arc<dyn Adapter>) -> Result<Self> {
        let headers = config
            .default_headers()
            .map_err(|e| Error::Request(e.to_string()))?;

        let mut session = Self {
            config,
            headers,
            cookies: CookieJarHandle::from(CookieJar::new()),
            adapters: Vec::new(),
        };
        session.mount("http://", Arc::clone(&adapter));
        session.mount("https://", adapter);
        Ok(session)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Default headers sent with every request.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn set_verify(&mut self, verify: bool) {
        self.config.verify = verify;
    }

    /// The shared jar; callback requests hold a clone of this handle.
    pub fn cookie_jar(&self) -> CookieJarHandle {
        Arc::clone(&self.cookies)
    }

    /// A snapshot of the session cookies.
    pub fn cookies(&self) -> CookieJar {
        self.cookies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Registers `adapter` for URLs starting with `prefix`. Re-mounting an
    /// existing prefix replaces its adapter in place; new prefixes are tried
    /// after the existing ones.
    pub fn mount(&mut self, prefix: impl Into<String>, adapter: Arc<dyn Adapter>) {
        let prefix = prefix.into();
        match self.adapters.iter_mut().find(|(p, _)| *p == prefix) {
            Some(slot) => slot.1 = adapter,
            None => self.adapters.push((prefix, adapter)),
        }
    }

    /// The first mounted adapter whose prefix starts `url`.
    pub fn get_adapter(&self, url: &str) -> Result<&Arc<dyn Adapter>> {
        self.adapters
            .iter()
            .find(|(prefix, _)| url.starts_with(prefix.as_str()))
            .map(|(_, adapter)| adapter)
            .ok_or_else(|| Error::InvalidSchema(format!("no adapter mounted for {url}")))
    }

    /// Sends a request and blocks until the response body has been read.
    ///
    /// A non-2xx reply fails with [`Error::Http`]; its cookies are merged
    /// into the session jar all the same.
    pub fn request(&self, method: Method, url: &str, options: RequestOptions) -> Result<Response> {
        let (request, send_options) = self.build_request(method, url, options)?;
        let adapter = self.get_adapter(url)?;

        let outcome = adapter.send(request, &send_options);
        absorb_cookies(&self.cookies, &outcome);
        outcome
    }

    /// Schedules a request and returns immediately.
    ///
    /// URL validation happens here: a malformed URL fails this call and
    /// `callback` is never invoked. Otherwise `callback` runs exactly once
    /// with the outcome, after response cookies have been merged.
    pub fn request_with_callback<F>(
        &self,
        method: Method,
        url: &str,
        options: RequestOptions,
        callback: F,
    ) -> Result<AsyncHandle>
    where
        F: FnOnce(Result<Response>) + Send + 'static,
    {
        let (request, send_options) = self.build_request(method, url, options)?;
        let adapter = self.get_adapter(url)?;

        let jar = Arc::clone(&self.cookies);
        let wrapped: Callback = Box::new(move |outcome| {
            absorb_cookies(&jar, &outcome);
            callback(outcome);
        });
        adapter.send_with_callback(request, &send_options, wrapped)
    }

    pub fn get(&self, url: &str, options: RequestOptions) -> Result<Response> {
        self.request(Method::Get, url, options)
    }

    pub fn post(&self, url: &str, options: RequestOptions) -> Result<Response> {
        self.request(Method::Post, url, options)
    }

    pub fn put(&self, url: &str, options: RequestOptions) -> Result<Response> {
        self.request(Method::Put, url, options)
    }

    pub fn delete(&self, url: &str, options: RequestOptions) -> Result<Response> {
        self.request(Method::Delete, url, options)
    }

    /// Closes every mounted adapter.
    pub fn close(&self) {
        for (_, adapter) in &self.adapters {
            adapter.close();
        }
    }

    fn build_request(
        &self,
        method: Method,
        url: &str,
        options: RequestOptions,
    ) -> Result<(Request, SendOptions)> {
        options.check()?;
        // scheme problems must surface before adapter lookup
        classify::parse_url(url)?;

        let mut cookies = self.cookies();
        cookies.update(&options.cookies);

        let mut request = Request::new(method, url)
            .with_headers(options.merge_headers(&self.headers))
            .with_cookies(cookies);
        request.body = options.body;

        let send_options = SendOptions {
            timeout: options.timeout.or(self.config.timeout),
            verify: options.verify.unwrap_or(self.config.verify),
        };
        Ok((request, send_options))
    }
}

/// Merges the cookies of a finished request into the session jar.
fn absorb_cookies(jar: &CookieJarHandle, outcome: &Result<Response>) {
    let response = match outcome {
        Ok(response) => Some(response),
        Err(e) => e.response(),
    };
    // the headers are applied again so that expired cookies reach the session jar
    if let Some(response) = response {
        if response.headers.contains_key(SET_COOKIE) {
            log::trace!("storing {} cookie(s) from {}", response.cookies.len(), response.url);
            jar.write()
                .unwrap_or_else(PoisonError::into_inner)
                .extract_from_headers(&response.url, &response.headers);
        }
    }
}

/// One-shot request through a fresh default [`Session`].
pub fn request(method: Method, url: &str, options: RequestOptions) -> Result<Response> {
    let session = Session::new()?;
    let outcome = session.request(method, url, options);
    session.close();
    outcome
}

pub fn get(url: &str, options: RequestOptions) -> Result<Response> {
    request(Method::Get, url, options)
}

pub fn post(url: &str, options: RequestOptions) -> Result<Response> {
    request(Method::Post, url, options)
}

pub fn put(url: &str, options: RequestOptions) -> Result<Response> {
    request(Method::Put, url, options)
}

pub fn delete(url: &str, options: RequestOptions) -> Result<Response> {
    request(Method::Delete, url, options)
}
