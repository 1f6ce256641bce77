//! Adapter that talks to the network directly with a blocking client.
//!
//! Callback-mode requests run on a dedicated thread that is spawned lazily:
//! nothing goes on the wire until [`AsyncHandle::start`] or
//! [`AsyncHandle::wait`] is called.

use std::sync::{Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use reqwest::blocking::Client;

use crate::adapter::handle::PendingTask;
use crate::adapter::{Adapter, AsyncHandle, Callback, SendOptions};
use crate::classify;
use crate::errors::{Error, Result};
use crate::net::{PreparedRequest, Request, Response};

pub struct DirectAdapter {
    use_system_proxy: bool,
    verified: Mutex<Option<Client>>,
    unverified: Mutex<Option<Client>>,
}

impl DirectAdapter {
    pub fn new() -> Self {
        Self::with_system_proxy(true)
    }

    /// Like [`DirectAdapter::new`]; with `false` the `HTTP(S)_PROXY`
    /// environment variables are ignored.
    pub fn with_system_proxy(use_system_proxy: bool) -> Self {
        Self {
            use_system_proxy,
            verified: Mutex::new(None),
            unverified: Mutex::new(None),
        }
    }

    /// Returns the pooled client for the given certificate policy, building
    /// it on first use.
    fn client(&self, verify: bool) -> Result<Client> {
        let slot = if verify { &self.verified } else { &self.unverified };
        let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = guard.as_ref() {
            return Ok(client.clone());
        }

        let mut builder = Client::builder()
            .danger_accept_invalid_certs(!verify)
            .timeout(None::<Duration>);
        if !self.use_system_proxy {
            builder = builder.no_proxy();
        }
        let client = builder.build().map_err(classify::transport_error)?;
        *guard = Some(client.clone());
        Ok(client)
    }
}

impl Default for DirectAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl Adapter for DirectAdapter {
    fn send(&self, request: Request, options: &SendOptions) -> Result<Response> {
        let prepared = request.prepare()?;
        let client = self.client(options.verify)?;
        execute(&client, prepared, options.timeout)
    }

    fn send_with_callback(
        &self,
        request: Request,
        options: &SendOptions,
        callback: Callback,
    ) -> Result<AsyncHandle> {
        let prepared = request.prepare()?;
        let client = self.client(options.verify)?;
        let timeout = options.timeout;

        Ok(AsyncHandle::new(ThreadTask::deferred(Box::new(move || {
            callback(execute(&client, prepared, timeout));
        }))))
    }

    fn close(&self) {
        for slot in [&self.verified, &self.unverified] {
            slot.lock().unwrap_or_else(PoisonError::into_inner).take();
        }
    }
}

/// Sends `prepared`, reads the whole body and classifies the status.
fn execute(client: &Client, prepared: PreparedRequest, timeout: Option<Duration>) -> Result<Response> {
    log::debug!("{} {}", prepared.method, prepared.url);
    let started = Instant::now();

    let mut builder = client
        .request(prepared.method.into(), prepared.url.clone())
        .headers(prepared.headers);
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    if let Some(payload) = prepared.payload {
        builder = builder.body(payload);
    }

    let reply = builder.send().map_err(|e| {
        let err = classify::transport_error(e);
        log::warn!("{} {} failed: {}", prepared.method, prepared.url, err);
        err
    })?;

    let status = reply.status().as_u16();
    let headers = reply.headers().clone();
    let url = reply.url().clone();
    let mut response = Response::new(url, status, headers, reply).with_elapsed(started.elapsed());

    response.content()?;
    classify::check_status(response)
}

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A request job that runs on its own thread once started.
struct ThreadTask {
    job: Option<Job>,
    thread: Option<JoinHandle<()>>,
}

impl ThreadTask {
    fn deferred(job: Job) -> Self {
        Self {
            job: Some(job),
            thread: None,
        }
    }
}

impl PendingTask for ThreadTask {
    fn start(&mut self) -> Result<()> {
        let Some(job) = self.job.take() else {
            return Ok(());
        };
        let thread = thread::Builder::new()
            .name("direct-request".to_string())
            .spawn(job)
            .map_err(|e| Error::Request(format!("cannot spawn request thread: {e}")))?;
        self.thread = Some(thread);
        Ok(())
    }

    fn is_finished(&mut self) -> bool {
        match &self.thread {
            Some(thread) => thread.is_finished(),
            None => self.job.is_none(),
        }
    }

    fn wait(mut self: Box<Self>) -> Result<()> {
        self.start()?;
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| Error::Request("request thread panicked".to_string())),
            None => Ok(()),
        }
    }
}
