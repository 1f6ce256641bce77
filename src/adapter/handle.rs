//! Handle to an in-flight callback-mode request.

use std::fmt;

use crate::errors::Result;

/// Work behind an [`AsyncHandle`]; one implementation per adapter.
pub(crate) trait PendingTask: Send {
    /// Dispatches the request if it has not been dispatched yet.
    fn start(&mut self) -> Result<()>;

    fn is_finished(&mut self) -> bool;

    /// Blocks until the callback has run.
    fn wait(self: Box<Self>) -> Result<()>;
}

/// Returned by [`Adapter::send_with_callback`](super::Adapter::send_with_callback).
///
/// Depending on the adapter the request may only be dispatched by
/// [`AsyncHandle::start`] or [`AsyncHandle::wait`]; [`DirectAdapter`]
/// behaves this way, while [`SandboxAdapter`] dispatches immediately.
/// Dropping a handle that was never started drops the request with it.
///
/// [`DirectAdapter`]: super::DirectAdapter
/// [`SandboxAdapter`]: super::SandboxAdapter
pub struct AsyncHandle {
    task: Box<dyn PendingTask>,
}

impl AsyncHandle {
    pub(crate) fn new(task: impl PendingTask + 'static) -> Self {
        Self {
            task: Box::new(task),
        }
    }

    /// Dispatches the request without waiting for it.
    pub fn start(&mut self) -> Result<()> {
        self.task.start()
    }

    /// True once the callback has returned.
    pub fn is_finished(&mut self) -> bool {
        self.task.is_finished()
    }

    /// Dispatches the request if needed and blocks until the callback has
    /// run.
    pub fn wait(self) -> Result<()> {
        self.task.wait()
    }
}

impl fmt::Debug for AsyncHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncHandle").finish_non_exhaustive()
    }
}
