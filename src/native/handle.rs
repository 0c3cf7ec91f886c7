//! Native handle types and the shared receive buffer.

use super::NativeWebSocketApi;
use bytes::Bytes;
use std::fmt;
use std::num::NonZeroU64;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Raw value of an upgraded socket handle.
///
/// Never null; ownership is tracked separately by [`SocketHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawSocket(NonZeroU64);

impl RawSocket {
    /// Wrap a raw handle value, rejecting null.
    #[must_use]
    pub fn new(value: u64) -> Option<Self> {
        NonZeroU64::new(value).map(Self)
    }

    /// Raw handle value.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl From<NonZeroU64> for RawSocket {
    fn from(value: NonZeroU64) -> Self {
        Self(value)
    }
}

impl fmt::Display for RawSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0.get())
    }
}

/// Handle of an HTTP request whose connection has completed the upgrade
/// handshake and can be converted into a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestHandle(NonZeroU64);

impl RequestHandle {
    /// Wrap a raw request handle value, rejecting null.
    #[must_use]
    pub fn new(value: u64) -> Option<Self> {
        NonZeroU64::new(value).map(Self)
    }

    /// Raw handle value.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl From<NonZeroU64> for RequestHandle {
    fn from(value: NonZeroU64) -> Self {
        Self(value)
    }
}

/// Exclusively owned socket handle.
///
/// Dropping it releases the native handle exactly once.
pub struct SocketHandle {
    raw: RawSocket,
    native: Arc<dyn NativeWebSocketApi>,
}

impl SocketHandle {
    /// Take ownership of `raw`, to be released through `native`.
    pub fn new(raw: RawSocket, native: Arc<dyn NativeWebSocketApi>) -> Self {
        Self { raw, native }
    }

    /// Raw handle value, valid for as long as this handle is alive.
    #[must_use]
    pub fn raw(&self) -> RawSocket {
        self.raw
    }
}

impl Drop for SocketHandle {
    fn drop(&mut self) {
        debug!(socket = %self.raw, "Releasing native socket handle");
        self.native.close_handle(self.raw);
    }
}

impl fmt::Debug for SocketHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketHandle")
            .field("raw", &self.raw)
            .finish()
    }
}

/// Fixed-size scratch buffer a native receive fills asynchronously.
///
/// The transport keeps one clone and hands another to the native facility;
/// once the read completion arrives the transport trims it to the number of
/// bytes the facility reported.
#[derive(Clone)]
pub struct ReceiveBuffer {
    data: Arc<Mutex<Vec<u8>>>,
    capacity: usize,
}

impl ReceiveBuffer {
    /// Allocate a zeroed buffer of `capacity` bytes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Arc::new(Mutex::new(vec![0; capacity])),
            capacity,
        }
    }

    /// Buffer size in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Copy as much of `src` as fits to the start of the buffer.
    ///
    /// Returns the number of bytes written.
    pub fn fill(&self, src: &[u8]) -> usize {
        let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        let n = src.len().min(data.len());
        data[..n].copy_from_slice(&src[..n]);
        n
    }

    /// Take the first `transferred` bytes, leaving the buffer empty.
    ///
    /// Counts beyond the capacity are clamped.
    #[must_use]
    pub fn take_prefix(&self, transferred: usize) -> Bytes {
        let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        let mut taken = std::mem::take(&mut *data);
        taken.truncate(transferred.min(self.capacity));
        Bytes::from(taken)
    }
}

impl fmt::Debug for ReceiveBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceiveBuffer")
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_socket_rejects_null() {
        assert!(RawSocket::new(0).is_none());
        assert_eq!(RawSocket::new(7).map(RawSocket::get), Some(7));
        assert!(RequestHandle::new(0).is_none());
    }

    #[test]
    fn test_receive_buffer_fill_truncates() {
        let buffer = ReceiveBuffer::with_capacity(4);
        assert_eq!(buffer.fill(b"abcdef"), 4);
        assert_eq!(&buffer.take_prefix(4)[..], b"abcd");
    }

    #[test]
    fn test_receive_buffer_take_prefix() {
        let buffer = ReceiveBuffer::with_capacity(128);
        let shared = buffer.clone();
        shared.fill(b"hello");

        let payload = buffer.take_prefix(5);
        assert_eq!(&payload[..], b"hello");
        assert_eq!(buffer.capacity(), 128);
    }

    #[test]
    fn test_receive_buffer_clamps_count() {
        let buffer = ReceiveBuffer::with_capacity(3);
        buffer.fill(b"xyz");
        assert_eq!(buffer.take_prefix(10).len(), 3);
    }
}
