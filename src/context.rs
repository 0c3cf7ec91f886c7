//! Cancellable operation context.
//!
//! Every blocking transport call takes a [`Context`]. Contexts form a tree:
//! cancelling one cancels everything derived from it, and a child may carry a
//! deadline after which it counts as cancelled on its own.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Why a context stopped being active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// [`Context::cancel`] was called on the context or an ancestor.
    Requested,
    /// The context's deadline, or an ancestor's, has passed.
    DeadlineExceeded,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => write!(f, "cancellation requested"),
            Self::DeadlineExceeded => write!(f, "deadline exceeded"),
        }
    }
}

#[derive(Debug)]
struct ContextInner {
    cancelled: AtomicBool,
    deadline: Option<Instant>,
    parent: Option<Context>,
}

/// Cheaply cloneable cancellation handle.
#[derive(Debug, Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    /// Create a root context with no deadline.
    #[must_use]
    pub fn new() -> Self {
        Self::derive(None, None)
    }

    fn derive(parent: Option<Context>, deadline: Option<Instant>) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                cancelled: AtomicBool::new(false),
                deadline,
                parent,
            }),
        }
    }

    /// Create a child that can be cancelled independently of this context.
    #[must_use]
    pub fn child(&self) -> Self {
        Self::derive(Some(self.clone()), None)
    }

    /// Create a child that expires at `deadline`.
    #[must_use]
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        Self::derive(Some(self.clone()), Some(deadline))
    }

    /// Create a child that expires `timeout` from now.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Cancel this context and every context derived from it.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
    }

    /// Reason this context is no longer active, if it isn't.
    #[must_use]
    pub fn cancel_reason(&self) -> Option<CancelReason> {
        let mut current = Some(self);
        while let Some(context) = current {
            if context.inner.cancelled.load(Ordering::Acquire) {
                return Some(CancelReason::Requested);
            }
            if context
                .inner
                .deadline
                .is_some_and(|deadline| Instant::now() >= deadline)
            {
                return Some(CancelReason::DeadlineExceeded);
            }
            current = context.inner.parent.as_ref();
        }
        None
    }

    /// Returns `true` once the context or an ancestor is cancelled or expired.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_reason().is_some()
    }

    /// Fail with the cancellation reason if the context is no longer active.
    ///
    /// # Errors
    ///
    /// Returns the [`CancelReason`] when cancelled or expired.
    pub fn check(&self) -> Result<(), CancelReason> {
        match self.cancel_reason() {
            Some(reason) => Err(reason),
            None => Ok(()),
        }
    }

    /// Earliest deadline along the ancestor chain.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        let own = self.inner.deadline;
        let inherited = self.inner.parent.as_ref().and_then(Context::deadline);
        match (own, inherited) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Time left until the earliest deadline, `None` if there is none.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline()
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
