//! Transport adapters.
//!
//! An [`Adapter`] executes a prepared request in one of two modes:
//!
//! - **synchronous** ([`Adapter::send`]): blocks and returns the response,
//! - **callback** ([`Adapter::send_with_callback`]): returns an
//!   [`AsyncHandle`] right away and hands the outcome to a callback later.
//!
//! Two adapters ship with the crate: [`DirectAdapter`] talks to the network
//! with a blocking client; [`SandboxAdapter`] delegates every fetch to an
//! [`RpcService`] supplied by the host platform.
//!
//! In both modes URL validation happens before anything is dispatched, so a
//! malformed URL fails the call itself and the callback is never invoked.

use std::time::Duration;

use crate::errors::Result;
use crate::net::{Request, Response};

mod direct;
mod handle;
mod sandbox;

pub use direct::DirectAdapter;
pub use handle::AsyncHandle;
pub use sandbox::{
    FetchCall, FetchReply, RpcCompletion, RpcError, RpcHandle, RpcService, RpcSignal,
    SandboxAdapter, TokioRpcService,
};

/// Receives the outcome of a callback-mode request.
///
/// On a non-2xx reply the callback gets [`Error::Http`](crate::Error::Http),
/// which still carries the fully populated response.
pub type Callback = Box<dyn FnOnce(Result<Response>) + Send + 'static>;

/// Per-request transport options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOptions {
    /// Overall deadline for the request. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Validate the server's TLS certificate.
    pub verify: bool,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            verify: true,
        }
    }
}

pub trait Adapter: Send + Sync {
    /// Executes `request` and blocks until the body has been read.
    fn send(&self, request: Request, options: &SendOptions) -> Result<Response>;

    /// Validates `request` and schedules it. The callback runs exactly once,
    /// on an arbitrary thread, when the request finishes.
    fn send_with_callback(
        &self,
        request: Request,
        options: &SendOptions,
        callback: Callback,
    ) -> Result<AsyncHandle>;

    /// Releases pooled connections. Safe to call more than once.
    fn close(&self);
}
