//! # Native Socket Facility
//!
//! Boundary to the platform facility that actually speaks WebSocket frames.
//! Every call here only *issues* an operation; its outcome is reported later,
//! on a thread owned by the facility, through the [`CompletionSink`] that was
//! supplied when the connection was upgraded.
//!
//! The one exception is [`NativeWebSocketApi::query_close_status`], which is
//! answered synchronously from state the facility already holds.
//!
//! ## Implementations
//!
//! - [`LoopbackNative`] - in-process facility pairing two sockets, used by the
//!   `r0n-ws-loopback` binary and the integration tests.

mod handle;
mod loopback;
mod types;

pub use handle::{RawSocket, ReceiveBuffer, RequestHandle, SocketHandle};
pub use loopback::LoopbackNative;
pub use types::{
    BufferType, Completion, CompletionResult, CompletionStatus, NativeCloseStatus,
    NativeErrorCode,
};

use bytes::Bytes;
use std::sync::Arc;

/// Receiver of completion notifications for one upgraded socket.
///
/// Invoked on an arbitrary facility-owned thread. Implementations must not
/// block for longer than it takes to record the completion.
pub trait CompletionSink: Send + Sync {
    /// Record that an operation issued on `socket` has finished.
    fn on_completion(&self, socket: RawSocket, completion: Completion);
}

/// Asynchronous WebSocket primitives offered by the native facility.
///
/// A call returning `Ok` means the operation was accepted and exactly one
/// completion of the matching status will follow. A call returning `Err`
/// means nothing was issued, except where noted.
pub trait NativeWebSocketApi: Send + Sync {
    /// Convert an upgraded HTTP request into a socket handle.
    ///
    /// Completions for the returned socket are routed to `sink`.
    fn complete_upgrade(
        &self,
        request: RequestHandle,
        sink: Arc<dyn CompletionSink>,
    ) -> Result<RawSocket, NativeErrorCode>;

    /// Enable completion notifications for `socket`.
    fn set_status_callback(&self, socket: RawSocket) -> Result<(), NativeErrorCode>;

    /// Send one frame. Completes with [`CompletionStatus::WriteComplete`].
    fn send(
        &self,
        socket: RawSocket,
        buffer_type: BufferType,
        data: Bytes,
    ) -> Result<(), NativeErrorCode>;

    /// Receive into `buffer`. Completes with [`CompletionStatus::ReadComplete`],
    /// reporting the bytes delivered and the raw buffer type.
    ///
    /// [`NativeErrorCode::INSUFFICIENT_BUFFER`] is not a failure: the read was
    /// still issued and its completion still follows.
    fn receive(&self, socket: RawSocket, buffer: ReceiveBuffer) -> Result<(), NativeErrorCode>;

    /// Start the close handshake. Completes with
    /// [`CompletionStatus::CloseComplete`].
    fn close(
        &self,
        socket: RawSocket,
        status: u16,
        reason: Option<Bytes>,
    ) -> Result<(), NativeErrorCode>;

    /// Close status and reason reported by the peer. Synchronous.
    fn query_close_status(&self, socket: RawSocket) -> Result<NativeCloseStatus, NativeErrorCode>;

    /// Release the handle. Completes with [`CompletionStatus::HandleClosing`];
    /// outstanding operations on the socket complete with
    /// [`NativeErrorCode::OPERATION_CANCELLED`].
    fn close_handle(&self, socket: RawSocket);
}
