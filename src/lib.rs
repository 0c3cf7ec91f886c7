//! # R0N WebSocket Transport
//!
//! A synchronous, thread-safe and cancellable WebSocket transport on top of a
//! native socket facility that reports every operation through asynchronous
//! completion callbacks.
//!
//! ## Features
//!
//! - Blocking send, receive and close with cooperative cancellation
//! - At most one outstanding send and one outstanding receive, independently
//! - Native error codes surfaced with the failing call's name
//! - Two-phase close with verification of the peer's close status
//! - In-process loopback facility for testing and demos
//!
//! ## Architecture
//!
//! [`websocket::WebSocketTransport`] owns the native socket handle and issues
//! operations through [`native::NativeWebSocketApi`]. Each operation is
//! turned into a blocking call by a [`completion::CompletionWaiter`], which
//! parks the caller until the matching completion arrives or its
//! [`context::Context`] is cancelled.

pub mod completion;
pub mod config;
pub mod context;
pub mod logging;
pub mod native;
pub mod websocket;
