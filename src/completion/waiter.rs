//! Condition-variable completion waiter.

use super::CompletionWaiter;
use crate::context::Context;
use crate::native::{
    Completion, CompletionResult, CompletionSink, CompletionStatus, NativeErrorCode,
    NativeWebSocketApi, RawSocket,
};
use crate::websocket::{TransportError, TransportResult};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, trace};

/// Progress of an armed wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Waiting,
    Completed,
}

#[derive(Debug, Default)]
struct WaiterState {
    socket: Option<RawSocket>,
    slots: HashMap<CompletionStatus, Slot>,
    stowed_errors: HashMap<CompletionStatus, NativeErrorCode>,
    last_results: HashMap<CompletionStatus, CompletionResult>,
}

#[derive(Debug, Default)]
struct WaiterShared {
    state: Mutex<WaiterState>,
    completed: Condvar,
}

impl WaiterShared {
    fn lock(&self) -> MutexGuard<'_, WaiterState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl CompletionSink for WaiterShared {
    fn on_completion(&self, socket: RawSocket, completion: Completion) {
        let mut state = self.lock();
        if state.socket.is_some_and(|registered| registered != socket) {
            debug!(
                socket = %socket,
                status = %completion.status,
                "Ignoring completion for unregistered socket"
            );
            return;
        }

        trace!(
            socket = %socket,
            status = %completion.status,
            error = %completion.error,
            bytes = completion.bytes_transferred,
            "Completion received"
        );
        state
            .stowed_errors
            .insert(completion.status, completion.error);
        state
            .last_results
            .insert(completion.status, completion.result());
        if let Some(slot) = state.slots.get_mut(&completion.status) {
            *slot = Slot::Completed;
        }
        drop(state);
        self.completed.notify_all();
    }
}

/// Waiter that parks the calling thread on a condition variable.
///
/// A waiter serves one socket: once registered, registering a different
/// socket is refused. Clones share that binding.
///
/// While parked it wakes every `poll_interval`, or sooner if the context has
/// a nearer deadline, to re-check the context for cancellation.
#[derive(Clone)]
pub struct ActionWaiter {
    native: Arc<dyn NativeWebSocketApi>,
    shared: Arc<WaiterShared>,
    poll_interval: Duration,
}

impl ActionWaiter {
    /// Create a waiter for sockets of `native`.
    pub fn new(native: Arc<dyn NativeWebSocketApi>, poll_interval: Duration) -> Self {
        Self {
            native,
            shared: Arc::new(WaiterShared::default()),
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }

    /// Interval at which parked threads re-check cancellation.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    fn disarm(&self, status: CompletionStatus) {
        self.shared.lock().slots.remove(&status);
    }
}

impl CompletionWaiter for ActionWaiter {
    fn register(&self, socket: RawSocket) -> bool {
        let previous = {
            let mut state = self.shared.lock();
            let previous = state.socket;
            match previous {
                Some(bound) if bound != socket => {
                    debug!(
                        socket = %socket,
                        bound = %bound,
                        "Waiter already bound to another socket"
                    );
                    return false;
                },
                _ => state.socket = Some(socket),
            }
            previous
        };

        match self.native.set_status_callback(socket) {
            Ok(()) => true,
            Err(code) => {
                debug!(socket = %socket, code = %code, "Status callback registration refused");
                let mut state = self.shared.lock();
                if state.socket == Some(socket) {
                    state.socket = previous;
                }
                false
            },
        }
    }

    fn wait_for(
        &self,
        action: &mut dyn FnMut() -> TransportResult<()>,
        expected: CompletionStatus,
        context: &Context,
    ) -> TransportResult<bool> {
        {
            let mut state = self.shared.lock();
            if state.slots.get(&expected) == Some(&Slot::Waiting) {
                return Err(TransportError::WaitInProgress { status: expected });
            }
            if context.is_cancelled() {
                // Nothing issued: drop any earlier failure.
                state
                    .stowed_errors
                    .insert(expected, NativeErrorCode::SUCCESS);
                return Ok(false);
            }
            state.slots.insert(expected, Slot::Waiting);
            state
                .stowed_errors
                .insert(expected, NativeErrorCode::SUCCESS);
        }

        if let Err(e) = action() {
            self.disarm(expected);
            return Err(e);
        }

        let mut state = self.shared.lock();
        loop {
            if state.slots.get(&expected) == Some(&Slot::Completed) {
                state.slots.remove(&expected);
                let error = state
                    .stowed_errors
                    .get(&expected)
                    .copied()
                    .unwrap_or_default();
                return Ok(error.is_success());
            }

            if let Some(reason) = context.cancel_reason() {
                trace!(status = %expected, reason = %reason, "Wait abandoned");
                state.slots.remove(&expected);
                return Ok(false);
            }

            let timeout = context
                .remaining()
                .map_or(self.poll_interval, |remaining| {
                    remaining.min(self.poll_interval)
                });
            state = match self.shared.completed.wait_timeout(state, timeout) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    fn stowed_error(&self, status: CompletionStatus) -> NativeErrorCode {
        self.shared
            .lock()
            .stowed_errors
            .get(&status)
            .copied()
            .unwrap_or_default()
    }

    fn last_result(&self, status: CompletionStatus) -> Option<CompletionResult> {
        self.shared.lock().last_results.get(&status).copied()
    }

    fn sink(&self) -> Arc<dyn CompletionSink> {
        Arc::clone(&self.shared) as Arc<dyn CompletionSink>
    }
}

impl fmt::Debug for ActionWaiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionWaiter")
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}
