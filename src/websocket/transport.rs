//! Blocking WebSocket transport over the native completion facility.

use super::error::{ErrorKind, TransportError, TransportResult};
use super::frame::{CloseCode, CloseInformation, Frame, FrameType, MAX_CLOSE_REASON_LENGTH};
use super::stats::TransportStats;
use crate::completion::{ActionWaiter, CompletionWaiter};
use crate::config::{CloseStatusCheck, TransportConfig};
use crate::context::Context;
use crate::native::{
    CompletionStatus, NativeErrorCode, NativeWebSocketApi, RawSocket, ReceiveBuffer,
    RequestHandle, SocketHandle,
};
use bytes::Bytes;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, ThreadId};
use tracing::{debug, info, trace, warn};

/// Lifecycle state of a [`WebSocketTransport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// Created, not yet bound to a socket.
    Unupgraded,
    /// Socket is usable for send and receive.
    Open,
    /// Handle release is in progress.
    Closing,
    /// Handle has been released.
    Closed,
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unupgraded => write!(f, "unupgraded"),
            Self::Open => write!(f, "open"),
            Self::Closing => write!(f, "closing"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Non-reentrant lock serializing one direction of traffic.
///
/// Remembers which thread holds it for diagnostics.
struct PathLock {
    gate: Mutex<()>,
    owner: Mutex<Option<ThreadId>>,
}

struct PathGuard<'a> {
    lock: &'a PathLock,
    _gate: MutexGuard<'a, ()>,
}

impl PathLock {
    fn new() -> Self {
        Self {
            gate: Mutex::new(()),
            owner: Mutex::new(None),
        }
    }

    fn acquire(&self) -> PathGuard<'_> {
        let gate = self.gate.lock().unwrap_or_else(|e| e.into_inner());
        *self.owner.lock().unwrap_or_else(|e| e.into_inner()) = Some(thread::current().id());
        PathGuard {
            lock: self,
            _gate: gate,
        }
    }

    fn owner(&self) -> Option<ThreadId> {
        *self.owner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for PathGuard<'_> {
    fn drop(&mut self) {
        *self.lock.owner.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

/// Synchronous, thread-safe WebSocket transport.
///
/// Every call blocks the calling thread until the native facility reports
/// the matching completion, or until the supplied [`Context`] is cancelled.
/// At most one send and one receive are outstanding at a time; a send and a
/// receive may run concurrently.
///
/// Dropping the transport releases the socket as [`close`](Self::close) does.
pub struct WebSocketTransport {
    native: Arc<dyn NativeWebSocketApi>,
    waiter: Arc<dyn CompletionWaiter>,
    config: TransportConfig,
    state: Mutex<TransportState>,
    socket: Mutex<Option<SocketHandle>>,
    send_lock: PathLock,
    receive_lock: PathLock,
    stats: Arc<TransportStats>,
}

impl WebSocketTransport {
    /// Create a transport waiting on completions with an [`ActionWaiter`].
    pub fn new(native: Arc<dyn NativeWebSocketApi>, config: TransportConfig) -> Self {
        let waiter = ActionWaiter::new(Arc::clone(&native), config.wait_poll_interval);
        Self::with_waiter(native, Arc::new(waiter), config)
    }

    /// Create a transport using the given completion waiter.
    pub fn with_waiter(
        native: Arc<dyn NativeWebSocketApi>,
        waiter: Arc<dyn CompletionWaiter>,
        config: TransportConfig,
    ) -> Self {
        Self {
            native,
            waiter,
            config,
            state: Mutex::new(TransportState::Unupgraded),
            socket: Mutex::new(None),
            send_lock: PathLock::new(),
            receive_lock: PathLock::new(),
            stats: Arc::new(TransportStats::default()),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> TransportState {
        *self.lock_state()
    }

    /// Transport statistics.
    #[must_use]
    pub fn stats(&self) -> Arc<TransportStats> {
        Arc::clone(&self.stats)
    }

    /// Transport configuration.
    #[must_use]
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// The native facility frames WebSocket traffic itself.
    #[must_use]
    pub fn has_native_websocket_support(&self) -> bool {
        true
    }

    /// Bind the transport to the socket of an upgraded HTTP request.
    ///
    /// Any failure leaves the transport closed; it must be discarded.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidState`] unless the transport is
    /// unupgraded, [`TransportError::Native`] if the facility refuses the
    /// upgrade and [`TransportError::Upgrade`] if completions cannot be
    /// registered.
    pub fn upgrade(&self, request: RequestHandle) -> TransportResult<()> {
        let mut state = self.lock_state();
        if *state != TransportState::Unupgraded {
            return Err(TransportError::InvalidState {
                operation: "upgrade",
                current: *state,
                expected: TransportState::Unupgraded,
            });
        }

        let raw = match self.native.complete_upgrade(request, self.waiter.sink()) {
            Ok(raw) => raw,
            Err(code) => {
                *state = TransportState::Closed;
                return Err(self.record(TransportError::native("complete_upgrade", code)));
            },
        };
        let handle = SocketHandle::new(raw, Arc::clone(&self.native));

        if !self.waiter.register(raw) {
            *state = TransportState::Closed;
            drop(handle);
            return Err(self.record(TransportError::Upgrade {
                message: format!("failed to register for completions on socket {raw}"),
            }));
        }

        *self.lock_socket() = Some(handle);
        *state = TransportState::Open;
        info!(socket = %raw, "WebSocket upgraded");
        Ok(())
    }

    /// Send one frame and wait until it has been written.
    ///
    /// Blocks while another thread is sending.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::UnsupportedFrameType`] for close frames,
    /// [`TransportError::InvalidState`] unless open,
    /// [`TransportError::Cancelled`] if `context` is cancelled first and
    /// [`TransportError::Native`] if the facility reports a failure.
    pub fn send(
        &self,
        frame_type: FrameType,
        payload: impl Into<Bytes>,
        context: &Context,
    ) -> TransportResult<()> {
        if !frame_type.is_sendable() {
            return Err(TransportError::UnsupportedFrameType(frame_type));
        }
        let buffer_type = frame_type.buffer_type();
        self.require_open("send")?;

        let payload = payload.into();
        let len = payload.len();
        let _guard = self.send_lock.acquire();
        let socket = self.raw_socket("send")?;

        let completed = self
            .waiter
            .wait_for(
                &mut || {
                    self.native
                        .send(socket, buffer_type, payload.clone())
                        .map_err(|code| TransportError::native("send", code))
                },
                CompletionStatus::WriteComplete,
                context,
            )
            .map_err(|e| self.record(e))?;
        if !completed {
            return Err(self.wait_failure("send", CompletionStatus::WriteComplete, context));
        }

        self.stats.frame_sent(len);
        trace!(
            socket = %socket,
            frame_type = %frame_type,
            bytes = len,
            owner = ?self.send_lock.owner(),
            "Frame sent"
        );
        Ok(())
    }

    /// Receive the next frame.
    ///
    /// At most `receive_buffer_size` bytes are returned per call; longer
    /// messages arrive as a run of fragment frames ending in a message frame.
    /// Blocks while another thread is receiving.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidState`] unless open,
    /// [`TransportError::Cancelled`] if `context` is cancelled first,
    /// [`TransportError::Native`] if the facility reports a failure and
    /// [`TransportError::UnknownBufferType`] for an unrecognized frame kind.
    pub fn receive(&self, context: &Context) -> TransportResult<Frame> {
        self.require_open("receive")?;

        let _guard = self.receive_lock.acquire();
        let socket = self.raw_socket("receive")?;
        let buffer = ReceiveBuffer::with_capacity(self.config.receive_buffer_size);

        let completed = self
            .waiter
            .wait_for(
                &mut || match self.native.receive(socket, buffer.clone()) {
                    Ok(()) | Err(NativeErrorCode::INSUFFICIENT_BUFFER) => Ok(()),
                    Err(code) => Err(TransportError::native("receive", code)),
                },
                CompletionStatus::ReadComplete,
                context,
            )
            .map_err(|e| self.record(e))?;
        if !completed {
            return Err(self.wait_failure("receive", CompletionStatus::ReadComplete, context));
        }

        let result = self
            .waiter
            .last_result(CompletionStatus::ReadComplete)
            .ok_or_else(|| {
                self.record(TransportError::Internal(
                    "read completion carried no result".to_string(),
                ))
            })?;
        let frame_type = FrameType::from_raw_buffer_type(result.buffer_type)
            .ok_or_else(|| self.record(TransportError::UnknownBufferType(result.buffer_type)))?;
        let payload = buffer.take_prefix(result.bytes_transferred);

        self.stats
            .frame_received(payload.len(), frame_type == FrameType::Close);
        trace!(
            socket = %socket,
            frame_type = %frame_type,
            bytes = payload.len(),
            owner = ?self.receive_lock.owner(),
            "Frame received"
        );
        Ok(Frame {
            frame_type,
            payload,
        })
    }

    /// Perform the close handshake and verify the peer's close status.
    ///
    /// A close completion cancelled by the facility is expected when other
    /// operations are in flight and is ignored. The peer's close status is
    /// then queried and compared with `status` according to the configured
    /// [`CloseStatusCheck`]. The socket stays open until [`close`](Self::close).
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidCloseStatus`] for statuses that may
    /// not appear on the wire,
    /// [`TransportError::CloseReasonTooLong`] for reasons over
    /// [`MAX_CLOSE_REASON_LENGTH`] bytes, [`TransportError::InvalidState`]
    /// unless open, [`TransportError::Native`] for close or query failures,
    /// [`TransportError::Cancelled`] if `context` is cancelled before the
    /// query and [`TransportError::CloseStatusMismatch`] when strict checking
    /// finds a different status.
    pub fn native_close_socket(
        &self,
        status: u16,
        reason: &str,
        context: &Context,
    ) -> TransportResult<CloseInformation> {
        if !CloseCode::from(status).is_valid() {
            return Err(TransportError::InvalidCloseStatus(status));
        }
        if reason.len() > MAX_CLOSE_REASON_LENGTH {
            return Err(TransportError::CloseReasonTooLong {
                length: reason.len(),
                max: MAX_CLOSE_REASON_LENGTH,
            });
        }
        self.require_open("native_close_socket")?;
        let socket = self.raw_socket("native_close_socket")?;
        let reason_bytes = (!reason.is_empty()).then(|| Bytes::copy_from_slice(reason.as_bytes()));

        debug!(socket = %socket, status, reason, "Sending close frame");
        let completed = self
            .waiter
            .wait_for(
                &mut || {
                    self.native
                        .close(socket, status, reason_bytes.clone())
                        .map_err(|code| TransportError::native("close", code))
                },
                CompletionStatus::CloseComplete,
                context,
            )
            .map_err(|e| self.record(e))?;
        self.stats.close_sent();

        if !completed {
            match self.waiter.stowed_error(CompletionStatus::CloseComplete) {
                NativeErrorCode::OPERATION_CANCELLED => {
                    debug!(socket = %socket, "Ignoring cancelled close completion");
                    self.stats.close_cancellation_ignored();
                },
                code if !code.is_success() => {
                    return Err(self.record(TransportError::native("close", code)));
                },
                _ => {},
            }
        }

        let info = self.query_close_info(context)?;
        if info.status_code != status {
            match self.config.close_status_check {
                CloseStatusCheck::Strict => {
                    return Err(self.record(TransportError::CloseStatusMismatch {
                        expected: status,
                        received: info.status_code,
                    }));
                },
                CloseStatusCheck::Advisory => warn!(
                    socket = %socket,
                    expected = status,
                    received = info.status_code,
                    "Peer closed with a different status"
                ),
                CloseStatusCheck::Disabled => {},
            }
        }

        info!(socket = %socket, status = info.status_code, "WebSocket close handshake complete");
        Ok(info)
    }

    /// Close status and reason reported by the peer.
    ///
    /// Valid once a receive has returned a close frame or a close handshake
    /// has completed.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Cancelled`] if `context` is already
    /// cancelled, [`TransportError::InvalidState`] without a socket and
    /// [`TransportError::Native`] if the query fails.
    pub fn query_close_info(&self, context: &Context) -> TransportResult<CloseInformation> {
        if let Err(reason) = context.check() {
            return Err(self.record(TransportError::cancelled("query_close_info", reason)));
        }
        let socket = self.raw_socket("query_close_info")?;

        let status = self
            .native
            .query_close_status(socket)
            .map_err(|code| self.record(TransportError::native("query_close_status", code)))?;
        Ok(CloseInformation::from_native(status.status, &status.reason))
    }

    /// Release the socket handle and wait until the facility confirms it.
    ///
    /// Only acts on an open transport; otherwise a no-op. Never fails:
    /// faults observed while closing are logged.
    pub fn close(&self) {
        {
            let mut state = self.lock_state();
            match *state {
                TransportState::Open => *state = TransportState::Closing,
                TransportState::Unupgraded => {
                    *state = TransportState::Closed;
                    return;
                },
                TransportState::Closing | TransportState::Closed => return,
            }
        }

        debug!("Closing WebSocket handle");
        let completed = self.waiter.wait_for(
            &mut || {
                let handle = self.lock_socket().take();
                drop(handle);
                Ok(())
            },
            CompletionStatus::HandleClosing,
            &Context::new(),
        );
        match completed {
            Ok(true) => {},
            Ok(false) => warn!(
                code = %self.waiter.stowed_error(CompletionStatus::HandleClosing),
                "Handle closing reported an error"
            ),
            Err(e) => {
                warn!(error = %e, "Waiting for handle closing failed");
                drop(self.lock_socket().take());
            },
        }

        *self.lock_state() = TransportState::Closed;
        debug!("WebSocket handle closed");
    }

    fn lock_state(&self) -> MutexGuard<'_, TransportState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_socket(&self) -> MutexGuard<'_, Option<SocketHandle>> {
        self.socket.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn require_open(&self, operation: &'static str) -> TransportResult<()> {
        let current = self.state();
        if current == TransportState::Open {
            Ok(())
        } else {
            Err(TransportError::InvalidState {
                operation,
                current,
                expected: TransportState::Open,
            })
        }
    }

    fn raw_socket(&self, operation: &'static str) -> TransportResult<RawSocket> {
        let socket = self.lock_socket().as_ref().map(SocketHandle::raw);
        socket.ok_or_else(|| TransportError::InvalidState {
            operation,
            current: self.state(),
            expected: TransportState::Open,
        })
    }

    /// Error for a wait that did not resolve to its completion.
    fn wait_failure(
        &self,
        operation: &'static str,
        status: CompletionStatus,
        context: &Context,
    ) -> TransportError {
        let error = match context.cancel_reason() {
            Some(reason) => TransportError::cancelled(operation, reason),
            None => TransportError::native(operation, self.waiter.stowed_error(status)),
        };
        self.record(error)
    }

    fn record(&self, error: TransportError) -> TransportError {
        match error.kind() {
            ErrorKind::Native => self.stats.native_error(),
            ErrorKind::Protocol => self.stats.protocol_error(),
            ErrorKind::Cancelled => self.stats.cancelled(),
            ErrorKind::Programmer => {},
        }
        debug!(error = %error, "Transport operation failed");
        error
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for WebSocketTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketTransport")
            .field("state", &self.state())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
