//! # Completion Waiter
//!
//! Bridges the native facility's completion callbacks to blocking calls.
//! A waiter runs an action that issues exactly one asynchronous native
//! operation, then parks the calling thread until the completion of the
//! expected status arrives or the caller's [`Context`] is cancelled.
//!
//! Per status, the waiter keeps the error and result metadata of the most
//! recent completion so the caller can interpret the outcome after the wait.

mod waiter;

pub use crate::native::CompletionSink;
pub use waiter::ActionWaiter;

use crate::context::Context;
use crate::native::{CompletionResult, CompletionStatus, NativeErrorCode, RawSocket};
use crate::websocket::TransportResult;
use std::sync::Arc;

/// Blocking wait on native completions.
pub trait CompletionWaiter: Send + Sync {
    /// Enable completion notifications for `socket`.
    ///
    /// Returns `false` if the native facility refused or the waiter already
    /// serves a different socket.
    fn register(&self, socket: RawSocket) -> bool;

    /// Run `action` and block until a completion with `expected` status
    /// arrives or `context` is cancelled.
    ///
    /// Returns `Ok(true)` if the completion arrived without error, and
    /// `Ok(false)` if it carried an error or the context was cancelled; in
    /// the latter case the native operation may still be in flight. If the
    /// context is cancelled on entry, `action` is not run and the stowed
    /// error for `expected` is reset. An error returned by `action` is passed
    /// through and nothing is awaited.
    ///
    /// # Errors
    ///
    /// Returns the action's error, or [`TransportError::WaitInProgress`] if a
    /// wait for `expected` is already outstanding.
    ///
    /// [`TransportError::WaitInProgress`]: crate::websocket::TransportError::WaitInProgress
    fn wait_for(
        &self,
        action: &mut dyn FnMut() -> TransportResult<()>,
        expected: CompletionStatus,
        context: &Context,
    ) -> TransportResult<bool>;

    /// Error carried by the most recent completion of `status`.
    fn stowed_error(&self, status: CompletionStatus) -> NativeErrorCode;

    /// Metadata of the most recent completion of `status`.
    fn last_result(&self, status: CompletionStatus) -> Option<CompletionResult>;

    /// Sink the native facility should deliver completions to.
    fn sink(&self) -> Arc<dyn CompletionSink>;
}
