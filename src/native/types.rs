//! Status codes, error codes and buffer kinds reported by the native facility.

use std::fmt;

/// Kind of asynchronous operation a completion reports.
///
/// The raw values match the status-callback flags of the native facility so
/// they can be correlated with its own diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompletionStatus {
    /// A receive has delivered data into the caller's buffer.
    ReadComplete,
    /// A send has been written to the wire.
    WriteComplete,
    /// A close handshake initiated on this socket has finished.
    CloseComplete,
    /// The socket handle is being torn down and may be released.
    HandleClosing,
}

impl CompletionStatus {
    /// All statuses, in raw-value order.
    pub const ALL: [CompletionStatus; 4] = [
        Self::HandleClosing,
        Self::ReadComplete,
        Self::WriteComplete,
        Self::CloseComplete,
    ];

    /// Raw status flag.
    #[must_use]
    pub const fn as_raw(self) -> u32 {
        match self {
            Self::HandleClosing => 0x0000_0800,
            Self::ReadComplete => 0x0008_0000,
            Self::WriteComplete => 0x0010_0000,
            Self::CloseComplete => 0x0200_0000,
        }
    }

    /// Parse a raw status flag.
    #[must_use]
    pub fn from_raw(raw: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_raw() == raw)
    }
}

impl fmt::Display for CompletionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadComplete => write!(f, "read-complete"),
            Self::WriteComplete => write!(f, "write-complete"),
            Self::CloseComplete => write!(f, "close-complete"),
            Self::HandleClosing => write!(f, "handle-closing"),
        }
    }
}

/// Numeric error code reported by the native facility.
///
/// Zero means success. A few well-known codes have names; everything else is
/// carried through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NativeErrorCode(pub u32);

impl NativeErrorCode {
    /// No error.
    pub const SUCCESS: Self = Self(0);
    /// The handle is not (or no longer) valid.
    pub const INVALID_HANDLE: Self = Self(6);
    /// The supplied buffer was smaller than the available data.
    pub const INSUFFICIENT_BUFFER: Self = Self(122);
    /// The call is not valid in the socket's current state.
    pub const INVALID_OPERATION: Self = Self(4317);
    /// The operation was cancelled, usually because the handle was closed.
    pub const OPERATION_CANCELLED: Self = Self(12017);
    /// The connection to the peer was reset or aborted.
    pub const CONNECTION_ERROR: Self = Self(12030);

    /// Raw code value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Returns `true` for the success code.
    #[must_use]
    pub const fn is_success(self) -> bool {
        self.0 == 0
    }

    /// Symbolic name for well-known codes.
    #[must_use]
    pub fn name(self) -> Option<&'static str> {
        match self {
            Self::SUCCESS => Some("SUCCESS"),
            Self::INVALID_HANDLE => Some("INVALID_HANDLE"),
            Self::INSUFFICIENT_BUFFER => Some("INSUFFICIENT_BUFFER"),
            Self::INVALID_OPERATION => Some("INVALID_OPERATION"),
            Self::OPERATION_CANCELLED => Some("OPERATION_CANCELLED"),
            Self::CONNECTION_ERROR => Some("CONNECTION_ERROR"),
            _ => None,
        }
    }
}

impl fmt::Display for NativeErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({name})", self.0),
            None => write!(f, "{}", self.0),
        }
    }
}

/// Buffer kinds understood by the native send and receive calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferType {
    /// A complete binary message.
    BinaryMessage,
    /// Part of a binary message; more parts follow.
    BinaryFragment,
    /// A complete UTF-8 message.
    Utf8Message,
    /// Part of a UTF-8 message; more parts follow.
    Utf8Fragment,
    /// The peer sent a close frame.
    Close,
}

impl BufferType {
    /// Raw buffer type value.
    #[must_use]
    pub const fn as_raw(self) -> u32 {
        match self {
            Self::BinaryMessage => 0,
            Self::BinaryFragment => 1,
            Self::Utf8Message => 2,
            Self::Utf8Fragment => 3,
            Self::Close => 4,
        }
    }

    /// Parse a raw buffer type value.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::BinaryMessage),
            1 => Some(Self::BinaryFragment),
            2 => Some(Self::Utf8Message),
            3 => Some(Self::Utf8Fragment),
            4 => Some(Self::Close),
            _ => None,
        }
    }

    /// Fragment kind carrying the same payload class.
    #[must_use]
    pub const fn as_fragment(self) -> Self {
        match self {
            Self::BinaryMessage | Self::BinaryFragment => Self::BinaryFragment,
            Self::Utf8Message | Self::Utf8Fragment => Self::Utf8Fragment,
            Self::Close => Self::Close,
        }
    }
}

/// A single completion notification delivered by the native facility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    /// Which kind of operation finished.
    pub status: CompletionStatus,
    /// Error the operation finished with, `SUCCESS` if none.
    pub error: NativeErrorCode,
    /// Bytes moved by the operation.
    pub bytes_transferred: usize,
    /// Raw buffer type reported for receives, zero otherwise.
    pub buffer_type: u32,
}

impl Completion {
    /// A successful completion with no payload metadata.
    #[must_use]
    pub fn success(status: CompletionStatus) -> Self {
        Self {
            status,
            error: NativeErrorCode::SUCCESS,
            bytes_transferred: 0,
            buffer_type: 0,
        }
    }

    /// A completion that finished with `error`.
    #[must_use]
    pub fn failed(status: CompletionStatus, error: NativeErrorCode) -> Self {
        Self {
            error,
            ..Self::success(status)
        }
    }

    /// A successful write of `bytes`.
    #[must_use]
    pub fn write(bytes: usize) -> Self {
        Self {
            bytes_transferred: bytes,
            ..Self::success(CompletionStatus::WriteComplete)
        }
    }

    /// A successful read of `bytes` with the given raw buffer type.
    #[must_use]
    pub fn read(bytes: usize, buffer_type: u32) -> Self {
        Self {
            bytes_transferred: bytes,
            buffer_type,
            ..Self::success(CompletionStatus::ReadComplete)
        }
    }

    /// Metadata retained by a waiter after the completion is consumed.
    #[must_use]
    pub fn result(&self) -> CompletionResult {
        CompletionResult {
            bytes_transferred: self.bytes_transferred,
            buffer_type: self.buffer_type,
        }
    }
}

/// Result metadata of the most recent completion for a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompletionResult {
    /// Bytes moved by the operation.
    pub bytes_transferred: usize,
    /// Raw buffer type reported by the operation.
    pub buffer_type: u32,
}

/// Close status as reported by the native close query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeCloseStatus {
    /// Close status code.
    pub status: u16,
    /// Raw reason bytes, possibly NUL padded.
    pub reason: Vec<u8>,
}
