//! Owned listener tasks with guaranteed teardown.
//!
//! Every long-lived callback (wallet events, session events, scroll
//! positions) runs as a spawned task owned by a [`Subscription`]. Dropping
//! the subscription aborts the task, so nothing fires after the consuming
//! view is gone, whichever way it exits.

use std::future::Future;

use tokio::task::JoinHandle;
use tracing::debug;

/// Handle to a spawned listener task. Aborts the task on drop.
#[derive(Debug)]
pub struct Subscription {
    name: &'static str,
    handle: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Spawn `listener` on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn<F>(name: &'static str, listener: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        debug!(name, "Subscription attached");
        Self {
            name,
            handle: Some(tokio::spawn(listener)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether the listener task is still running
    pub fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Detach explicitly. Equivalent to dropping the subscription.
    pub fn unsubscribe(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            debug!(name = self.name, "Subscription detached");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.teardown();
    }
}
