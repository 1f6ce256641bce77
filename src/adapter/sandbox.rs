//! Adapter for sandboxed hosts that only allow outbound HTTP through a
//! platform fetch service.
//!
//! The service is abstracted as [`RpcService`]: a synchronous `fetch` and an
//! asynchronous `make_fetch_call` that reports through a completion and an
//! [`RpcHandle`] the caller can block on. [`TokioRpcService`] is the default
//! implementation, running fetches on a private tokio runtime.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use baas_transport::adapter::{Adapter, SandboxAdapter, SendOptions, TokioRpcService};
//! use baas_transport::net::{Method, Request};
//!
//! let service = Arc::new(TokioRpcService::new(4 * 1024 * 1024).unwrap());
//! let adapter = SandboxAdapter::new(service);
//! let response = adapter
//!     .send(Request::new(Method::Get, "https://api.example.com/1/health"), &SendOptions::default())
//!     .unwrap();
//! println!("{}", response.status);
//! ```

use std::io::Cursor;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use http::HeaderMap;
use tokio::runtime::{Handle, Runtime};
use tokio::sync::oneshot;
use url::Url;

use crate::adapter::handle::PendingTask;
use crate::adapter::{Adapter, AsyncHandle, Callback, SendOptions};
use crate::classify;
use crate::errors::{Error, Result};
use crate::net::{Method, PreparedRequest, Request, Response};

/// One fetch as submitted to the platform service.
#[derive(Debug, Clone)]
pub struct FetchCall {
    pub url: Url,
    pub method: Method,
    pub headers: HeaderMap,
    pub payload: Option<Vec<u8>>,
    pub deadline: Option<Duration>,
    pub validate_certificate: bool,
}

impl FetchCall {
    fn new(prepared: PreparedRequest, options: &SendOptions) -> Self {
        Self {
            url: prepared.url,
            method: prepared.method,
            headers: prepared.headers,
            payload: prepared.payload,
            deadline: options.timeout,
            validate_certificate: options.verify,
        }
    }
}

/// A fully buffered reply from the platform service.
#[derive(Debug, Clone)]
pub struct FetchReply {
    pub final_url: Url,
    pub status: u16,
    pub headers: HeaderMap,
    pub content: Vec<u8>,
}

/// Failures a platform fetch service reports.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("download failed: {0}")]
    Download(String),

    #[error("response too large")]
    ResponseTooLarge,

    #[error("certificate validation failed: {0}")]
    SslCertificate(String),

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("{0}")]
    Other(String),
}

/// Invoked by the service with the outcome of an asynchronous fetch.
pub type RpcCompletion =
    Box<dyn FnOnce(std::result::Result<FetchReply, RpcError>) + Send + 'static>;

/// Platform fetch service.
pub trait RpcService: Send + Sync {
    /// Performs a fetch and blocks until it completes.
    fn fetch(&self, call: FetchCall) -> std::result::Result<FetchReply, RpcError>;

    /// Starts a fetch and returns immediately. The service must invoke
    /// `completion` exactly once and then fire the [`RpcSignal`] paired with
    /// the returned handle.
    fn make_fetch_call(&self, call: FetchCall, completion: RpcCompletion) -> RpcHandle;

    /// Releases whatever the service holds. Fetches issued afterwards fail.
    fn close(&self) {}
}

/// Waits for an asynchronous fetch started by an [`RpcService`].
pub struct RpcHandle {
    done: oneshot::Receiver<()>,
    finished: bool,
}

/// Fired by the service once the completion has returned.
pub struct RpcSignal {
    done: oneshot::Sender<()>,
}

impl RpcHandle {
    pub fn pair() -> (RpcHandle, RpcSignal) {
        let (tx, rx) = oneshot::channel();
        (
            RpcHandle {
                done: rx,
                finished: false,
            },
            RpcSignal { done: tx },
        )
    }

    pub fn is_finished(&mut self) -> bool {
        if !self.finished {
            self.finished = match self.done.try_recv() {
                Ok(()) => true,
                Err(oneshot::error::TryRecvError::Empty) => false,
                Err(oneshot::error::TryRecvError::Closed) => true,
            };
        }
        self.finished
    }

    /// Blocks until the service fires the paired signal.
    ///
    /// Fails when the service dropped the signal without firing it.
    pub fn wait(mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        futures::executor::block_on(&mut self.done)
            .map_err(|_| Error::Request("fetch service dropped the call".to_string()))
    }
}

impl RpcSignal {
    pub fn complete(self) {
        // the handle may already be gone
        let _ = self.done.send(());
    }
}

pub struct SandboxAdapter {
    service: Arc<dyn RpcService>,
}

impl SandboxAdapter {
    pub fn new(service: Arc<dyn RpcService>) -> Self {
        Self { service }
    }
}

impl Adapter for SandboxAdapter {
    fn send(&self, request: Request, options: &SendOptions) -> Result<Response> {
        let raw_url = request.url.clone();
        let call = FetchCall::new(request.prepare()?, options);
        log::debug!("{} {} via fetch service", call.method, call.url);

        let started = Instant::now();
        let reply = self
            .service
            .fetch(call)
            .map_err(|e| classify::rpc_error(e, &raw_url))?;
        into_response(reply, started)
    }

    fn send_with_callback(
        &self,
        request: Request,
        options: &SendOptions,
        callback: Callback,
    ) -> Result<AsyncHandle> {
        let raw_url = request.url.clone();
        let call = FetchCall::new(request.prepare()?, options);
        log::debug!("{} {} via fetch service (callback)", call.method, call.url);

        let started = Instant::now();
        let completion: RpcCompletion = Box::new(move |outcome| {
            let result = outcome
                .map_err(|e| classify::rpc_error(e, &raw_url))
                .and_then(|reply| into_response(reply, started));
            callback(result);
        });

        let handle = self.service.make_fetch_call(call, completion);
        Ok(AsyncHandle::new(RpcTask { handle: Some(handle) }))
    }

    fn close(&self) {
        self.service.close();
    }
}

fn into_response(reply: FetchReply, started: Instant) -> Result<Response> {
    let mut response = Response::new(reply.final_url, reply.status, reply.headers, Cursor::new(reply.content))
        .with_elapsed(started.elapsed());
    response.content()?;
    classify::check_status(response)
}

struct RpcTask {
    handle: Option<RpcHandle>,
}

impl PendingTask for RpcTask {
    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_finished(&mut self) -> bool {
        self.handle.as_mut().map_or(true, RpcHandle::is_finished)
    }

    fn wait(mut self: Box<Self>) -> Result<()> {
        match self.handle.take() {
            Some(handle) => handle.wait(),
            None => Ok(()),
        }
    }
}

/// [`RpcService`] backed by an async `reqwest` client on a private tokio
/// runtime. Replies larger than `max_response_bytes` are rejected.
///
/// Closing the service stops the runtime; later fetches fail.
pub struct TokioRpcService {
    runtime: Mutex<Option<Runtime>>,
    verified: reqwest::Client,
    unverified: reqwest::Client,
    max_response_bytes: usize,
}

impl TokioRpcService {
    pub fn new(max_response_bytes: usize) -> Result<Self> {
        Self::with_system_proxy(max_response_bytes, true)
    }

    pub fn with_system_proxy(max_response_bytes: usize, use_system_proxy: bool) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("fetch-service")
            .build()
            .map_err(|e| Error::Request(format!("cannot start fetch runtime: {e}")))?;

        let build = |verify: bool| {
            let mut builder = reqwest::Client::builder().danger_accept_invalid_certs(!verify);
            if !use_system_proxy {
                builder = builder.no_proxy();
            }
            builder.build().map_err(classify::transport_error)
        };

        Ok(Self {
            runtime: Mutex::new(Some(runtime)),
            verified: build(true)?,
            unverified: build(false)?,
            max_response_bytes,
        })
    }

    fn runtime(&self) -> Option<Handle> {
        let runtime = self.runtime.lock().unwrap_or_else(PoisonError::into_inner);
        runtime.as_ref().map(|rt| rt.handle().clone())
    }

    /// Stops the runtime without waiting for in-flight fetches.
    fn shutdown(&self) {
        let runtime = self.runtime.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(runtime) = runtime {
            log::debug!("shutting down fetch service runtime");
            runtime.shutdown_background();
        }
    }

    fn client(&self, verify: bool) -> reqwest::Client {
        if verify {
            self.verified.clone()
        } else {
            self.unverified.clone()
        }
    }
}

impl RpcService for TokioRpcService {
    fn fetch(&self, call: FetchCall) -> std::result::Result<FetchReply, RpcError> {
        let Some(runtime) = self.runtime() else {
            return Err(RpcError::Other("fetch service is shut down".to_string()));
        };
        let client = self.client(call.validate_certificate);
        runtime.block_on(fetch_reply(client, call, self.max_response_bytes))
    }

    fn make_fetch_call(&self, call: FetchCall, completion: RpcCompletion) -> RpcHandle {
        let (handle, signal) = RpcHandle::pair();
        let Some(runtime) = self.runtime() else {
            completion(Err(RpcError::Other("fetch service is shut down".to_string())));
            signal.complete();
            return handle;
        };

        let client = self.client(call.validate_certificate);
        let max = self.max_response_bytes;
        runtime.spawn(async move {
            let outcome = fetch_reply(client, call, max).await;
            // completions may block or issue sync requests, so they run
            // outside the runtime
            let spawned = thread::Builder::new()
                .name("fetch-completion".to_string())
                .spawn(move || {
                    completion(outcome);
                    signal.complete();
                });
            if let Err(e) = spawned {
                log::error!("cannot run fetch completion: {}", e);
            }
        });
        handle
    }

    fn close(&self) {
        self.shutdown();
    }
}

impl Drop for TokioRpcService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn fetch_reply(
    client: reqwest::Client,
    call: FetchCall,
    max_response_bytes: usize,
) -> std::result::Result<FetchReply, RpcError> {
    let mut builder = client
        .request(call.method.into(), call.url)
        .headers(call.headers);
    if let Some(deadline) = call.deadline {
        builder = builder.timeout(deadline);
    }
    if let Some(payload) = call.payload {
        builder = builder.body(payload);
    }

    let mut reply = builder.send().await.map_err(rpc_failure)?;
    if reply
        .content_length()
        .is_some_and(|len| len > max_response_bytes as u64)
    {
        return Err(RpcError::ResponseTooLarge);
    }

    let status = reply.status().as_u16();
    let headers = reply.headers().clone();
    let final_url = reply.url().clone();

    let mut content = Vec::new();
    while let Some(chunk) = reply.chunk().await.map_err(rpc_failure)? {
        if content.len() + chunk.len() > max_response_bytes {
            return Err(RpcError::ResponseTooLarge);
        }
        content.extend_from_slice(&chunk);
    }

    Ok(FetchReply {
        final_url,
        status,
        headers,
        content,
    })
}

fn rpc_failure(err: reqwest::Error) -> RpcError {
    if err.is_timeout() {
        RpcError::DeadlineExceeded
    } else if classify::is_tls_failure(&err) {
        RpcError::SslCertificate(err.to_string())
    } else if err.is_builder() {
        RpcError::InvalidUrl(err.to_string())
    } else {
        RpcError::Download(err.to_string())
    }
}
