//! Frame types and close information.
//!
//! The native facility reports frames by buffer type; callers see them as
//! [`FrameType`]. Both directions of that mapping go through
//! [`FRAME_BUFFER_TABLE`].

use crate::native::BufferType;
use bytes::Bytes;
use std::fmt;

/// Maximum length in bytes of a close reason (125-byte control payload minus
/// the 2-byte status code).
pub const MAX_CLOSE_REASON_LENGTH: usize = 123;

/// Kind of a WebSocket frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    /// A complete UTF-8 text message.
    Text,
    /// A complete binary message.
    Binary,
    /// Part of a text message; more parts follow.
    TextFragment,
    /// Part of a binary message; more parts follow.
    BinaryFragment,
    /// The peer has closed its side of the connection.
    Close,
}

/// The single mapping between frame types and native buffer types.
pub const FRAME_BUFFER_TABLE: [(FrameType, BufferType); 5] = [
    (FrameType::Text, BufferType::Utf8Message),
    (FrameType::Binary, BufferType::BinaryMessage),
    (FrameType::TextFragment, BufferType::Utf8Fragment),
    (FrameType::BinaryFragment, BufferType::BinaryFragment),
    (FrameType::Close, BufferType::Close),
];

impl FrameType {
    /// Native buffer type carrying this frame type.
    #[must_use]
    pub fn buffer_type(self) -> BufferType {
        FRAME_BUFFER_TABLE
            .iter()
            .find(|(frame_type, _)| *frame_type == self)
            .map_or(BufferType::Close, |(_, buffer_type)| *buffer_type)
    }

    /// Frame type reported for a native buffer type.
    #[must_use]
    pub fn from_buffer_type(buffer_type: BufferType) -> Self {
        FRAME_BUFFER_TABLE
            .iter()
            .find(|(_, candidate)| *candidate == buffer_type)
            .map_or(Self::Close, |(frame_type, _)| *frame_type)
    }

    /// Frame type reported for a raw native buffer type value.
    #[must_use]
    pub fn from_raw_buffer_type(raw: u32) -> Option<Self> {
        BufferType::from_raw(raw).map(Self::from_buffer_type)
    }

    /// Check if more parts of the same message follow.
    #[must_use]
    pub fn is_fragment(self) -> bool {
        matches!(self, Self::TextFragment | Self::BinaryFragment)
    }

    /// Check if this frame type can be passed to a send.
    ///
    /// Close frames are only ever produced by the close handshake.
    #[must_use]
    pub fn is_sendable(self) -> bool {
        self != Self::Close
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Binary => write!(f, "binary"),
            Self::TextFragment => write!(f, "text-fragment"),
            Self::BinaryFragment => write!(f, "binary-fragment"),
            Self::Close => write!(f, "close"),
        }
    }
}

/// A frame returned by a receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Kind of frame.
    pub frame_type: FrameType,
    /// Bytes actually transferred by the native facility.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(frame_type: FrameType, payload: impl Into<Bytes>) -> Self {
        Self {
            frame_type,
            payload: payload.into(),
        }
    }

    /// Check if this is a close frame.
    #[must_use]
    pub fn is_close(&self) -> bool {
        self.frame_type == FrameType::Close
    }

    /// Payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Check if the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// WebSocket close codes as defined in RFC 6455.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCode {
    /// Normal closure.
    Normal,
    /// Endpoint going away.
    GoingAway,
    /// Protocol error.
    Protocol,
    /// Unsupported data type.
    Unsupported,
    /// No status received.
    NoStatus,
    /// Abnormal closure.
    Abnormal,
    /// Invalid frame payload data.
    InvalidData,
    /// Policy violation.
    PolicyViolation,
    /// Message too big.
    MessageTooBig,
    /// Missing extension.
    MissingExtension,
    /// Internal server error.
    InternalError,
    /// TLS handshake failure.
    TlsHandshake,
    /// Application or library defined code.
    Custom(u16),
}

impl CloseCode {
    /// Check if the code may appear in a close frame on the wire.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        let code: u16 = (*self).into();
        matches!(code, 1000..=1003 | 1007..=1011 | 3000..=4999)
    }
}

impl From<u16> for CloseCode {
    fn from(value: u16) -> Self {
        match value {
            1000 => Self::Normal,
            1001 => Self::GoingAway,
            1002 => Self::Protocol,
            1003 => Self::Unsupported,
            1005 => Self::NoStatus,
            1006 => Self::Abnormal,
            1007 => Self::InvalidData,
            1008 => Self::PolicyViolation,
            1009 => Self::MessageTooBig,
            1010 => Self::MissingExtension,
            1011 => Self::InternalError,
            1015 => Self::TlsHandshake,
            code => Self::Custom(code),
        }
    }
}

impl From<CloseCode> for u16 {
    fn from(value: CloseCode) -> Self {
        match value {
            CloseCode::Normal => 1000,
            CloseCode::GoingAway => 1001,
            CloseCode::Protocol => 1002,
            CloseCode::Unsupported => 1003,
            CloseCode::NoStatus => 1005,
            CloseCode::Abnormal => 1006,
            CloseCode::InvalidData => 1007,
            CloseCode::PolicyViolation => 1008,
            CloseCode::MessageTooBig => 1009,
            CloseCode::MissingExtension => 1010,
            CloseCode::InternalError => 1011,
            CloseCode::TlsHandshake => 1015,
            CloseCode::Custom(code) => code,
        }
    }
}

/// Close status reported for a socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInformation {
    /// Close status code.
    pub status_code: u16,
    /// Close reason, at most [`MAX_CLOSE_REASON_LENGTH`] bytes.
    pub reason: String,
}

impl CloseInformation {
    /// Build close information from a native status and raw reason bytes.
    ///
    /// The reason stops at the first NUL and at [`MAX_CLOSE_REASON_LENGTH`]
    /// bytes, and is decoded lossily.
    #[must_use]
    pub fn from_native(status_code: u16, reason: &[u8]) -> Self {
        let bounded = &reason[..reason.len().min(MAX_CLOSE_REASON_LENGTH)];
        let end = bounded
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(bounded.len());
        Self {
            status_code,
            reason: String::from_utf8_lossy(&bounded[..end]).into_owned(),
        }
    }

    /// Close code classification of the status.
    #[must_use]
    pub fn code(&self) -> CloseCode {
        CloseCode::from(self.status_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_buffer_mapping() {
        for (frame_type, buffer_type) in FRAME_BUFFER_TABLE {
            assert_eq!(frame_type.buffer_type(), buffer_type);
            assert_eq!(FrameType::from_buffer_type(buffer_type), frame_type);
        }
    }

    #[test]
    fn test_raw_buffer_type_mapping() {
        assert_eq!(FrameType::from_raw_buffer_type(0), Some(FrameType::Binary));
        assert_eq!(FrameType::from_raw_buffer_type(2), Some(FrameType::Text));
        assert_eq!(
            FrameType::from_raw_buffer_type(3),
            Some(FrameType::TextFragment)
        );
        assert_eq!(FrameType::from_raw_buffer_type(4), Some(FrameType::Close));
        assert_eq!(FrameType::from_raw_buffer_type(99), None);
    }

    #[test]
    fn test_frame_type_predicates() {
        assert!(FrameType::BinaryFragment.is_fragment());
        assert!(!FrameType::Binary.is_fragment());
        assert!(!FrameType::Close.is_sendable());
        assert!(FrameType::TextFragment.is_sendable());
    }

    #[test]
    fn test_close_code_conversion() {
        assert_eq!(CloseCode::from(1000), CloseCode::Normal);
        assert_eq!(u16::from(CloseCode::GoingAway), 1001);
        assert_eq!(CloseCode::from(4001), CloseCode::Custom(4001));
        assert!(CloseCode::Normal.is_valid());
        assert!(!CloseCode::NoStatus.is_valid());
        assert!(!CloseCode::Abnormal.is_valid());
        assert!(CloseCode::Custom(4001).is_valid());
        assert!(!CloseCode::Custom(2999).is_valid());
    }

    #[test]
    fn test_close_information_truncates_at_nul() {
        let info = CloseInformation::from_native(1000, b"bye\0\0\0");
        assert_eq!(info.reason, "bye");
        assert_eq!(info.code(), CloseCode::Normal);
    }

    #[test]
    fn test_close_information_bounds_reason() {
        let info = CloseInformation::from_native(1001, &[b'x'; 200]);
        assert_eq!(info.reason.len(), MAX_CLOSE_REASON_LENGTH);
    }

    #[test]
    fn test_frame_accessors() {
        let frame = Frame::new(FrameType::Binary, vec![1u8, 2, 3]);
        assert_eq!(frame.len(), 3);
        assert!(!frame.is_close());
        assert!(Frame::new(FrameType::Close, Bytes::new()).is_empty());
    }
}
