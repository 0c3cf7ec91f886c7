//! # WebSocket Transport
//!
//! Synchronous WebSocket send, receive and close on top of a native facility
//! that completes every operation asynchronously.
//!
//! ## Features
//!
//! - Blocking calls with cooperative cancellation through [`Context`]
//! - Independent send and receive paths, each serialized
//! - Five-way frame type mapping shared by send and receive
//! - Two-phase close with configurable close-status verification
//! - Guaranteed, confirmed release of the native handle on close or drop
//!
//! ## Example Configuration
//!
//! ```toml
//! [transport]
//! receive_buffer_size = 128
//! wait_poll_interval = "10ms"
//! close_status_check = "strict"
//! ```
//!
//! [`Context`]: crate::context::Context

mod error;
mod frame;
mod stats;
mod transport;

pub use error::{ErrorKind, TransportError, TransportResult};
pub use frame::{
    CloseCode, CloseInformation, Frame, FrameType, FRAME_BUFFER_TABLE, MAX_CLOSE_REASON_LENGTH,
};
pub use stats::{StatsSnapshot, TransportStats};
pub use transport::{TransportState, WebSocketTransport};
