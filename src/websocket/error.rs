//! Transport error types.

use super::frame::FrameType;
use super::transport::TransportState;
use crate::context::CancelReason;
use crate::native::{CompletionStatus, NativeErrorCode};
use thiserror::Error;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Broad class of a [`TransportError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller misused the transport. Never retryable.
    Programmer,
    /// The native facility reported a failure.
    Native,
    /// The peer violated the protocol.
    Protocol,
    /// The caller's context was cancelled or expired.
    Cancelled,
}

/// Errors that can occur during transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Operation invoked in the wrong state.
    #[error("{operation} is not valid in state {current} (expected {expected})")]
    InvalidState {
        /// Operation that was attempted.
        operation: &'static str,
        /// State the transport was in.
        current: TransportState,
        /// State the operation requires.
        expected: TransportState,
    },

    /// Frame type cannot be sent.
    #[error("unsupported frame type for send: {0}")]
    UnsupportedFrameType(FrameType),

    /// Close reason exceeds the protocol limit.
    #[error("close reason too long: {length} bytes (max {max})")]
    CloseReasonTooLong {
        /// Actual length in bytes.
        length: usize,
        /// Maximum allowed length.
        max: usize,
    },

    /// Close status may not be sent in a close frame.
    #[error("close status {0} cannot be sent")]
    InvalidCloseStatus(u16),

    /// A wait for this completion status is already outstanding.
    #[error("a wait for {status} is already in progress")]
    WaitInProgress {
        /// Status that was already awaited.
        status: CompletionStatus,
    },

    /// Native call failed.
    #[error("{operation} failed with native error {code}")]
    Native {
        /// Name of the failing call.
        operation: &'static str,
        /// Native error code.
        code: NativeErrorCode,
    },

    /// Upgrade could not be completed.
    #[error("upgrade failed: {message}")]
    Upgrade {
        /// Failure description.
        message: String,
    },

    /// Native facility reported a buffer type outside the known set.
    #[error("unknown frame type reported by native facility: {0}")]
    UnknownBufferType(u32),

    /// Peer did not echo the close status that was sent.
    #[error("close status mismatch: expected {expected}, received {received}")]
    CloseStatusMismatch {
        /// Status sent by this side.
        expected: u16,
        /// Status reported by the peer.
        received: u16,
    },

    /// Context was cancelled before the operation completed.
    #[error("{operation} cancelled: {reason}")]
    Cancelled {
        /// Operation that was cancelled.
        operation: &'static str,
        /// Why the context stopped.
        reason: CancelReason,
    },

    /// Native facility broke its contract.
    #[error("internal error: {0}")]
    Internal(String),
}

impl TransportError {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidState { .. }
            | Self::UnsupportedFrameType(_)
            | Self::CloseReasonTooLong { .. }
            | Self::InvalidCloseStatus(_)
            | Self::WaitInProgress { .. } => ErrorKind::Programmer,
            Self::Native { .. } | Self::Upgrade { .. } | Self::Internal(_) => ErrorKind::Native,
            Self::UnknownBufferType(_) | Self::CloseStatusMismatch { .. } => ErrorKind::Protocol,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    /// Native error code carried by this error, if any.
    #[must_use]
    pub fn native_code(&self) -> Option<NativeErrorCode> {
        match self {
            Self::Native { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Check if this error reports a cancelled context.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::Cancelled
    }

    pub(crate) fn native(operation: &'static str, code: NativeErrorCode) -> Self {
        Self::Native { operation, code }
    }

    pub(crate) fn cancelled(operation: &'static str, reason: CancelReason) -> Self {
        Self::Cancelled { operation, reason }
    }
}
