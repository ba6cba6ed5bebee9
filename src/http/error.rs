//! Error types for the HTTP codec

use std::fmt;

/// Result type alias for codec operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Malformed or unsupported wire input.
///
/// Every variant except [`ProtocolError::Incomplete`] is final: feeding more
/// bytes will not make the message valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The buffer ends before the message does
    Incomplete,

    /// Request or status line does not have three parts
    InvalidStartLine(String),

    /// Method is not in the supported table
    UnknownMethod(String),

    /// Anything other than HTTP/1.1
    UnsupportedVersion(String),

    /// Header line without `: ` at the first colon
    InvalidHeader(String),

    /// Two fields whose names only differ by case
    DuplicateField(String),

    /// Content-Length value is not acceptable
    InvalidContentLength(String),

    /// Transfer-Encoding other than `chunked`
    UnsupportedTransferEncoding(String),

    /// Content-Length and Transfer-Encoding on the same message
    ConflictingFraming,

    /// Chunk size line or chunk terminator is malformed
    InvalidChunk(String),

    /// Status code outside the supported table
    UnknownStatus(String),

    /// Reason phrase does not match the one for the status code
    ReasonMismatch { code: u16, reason: String },

    /// Percent escape or UTF-8 sequence is broken
    InvalidEncoding(String),

    /// Bytes left over after a complete message
    TrailingData(usize),

    /// Message exceeds the accepted size
    TooLarge(usize),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::Incomplete => write!(f, "incomplete message"),
            ProtocolError::InvalidStartLine(line) => write!(f, "invalid start line \"{line}\""),
            ProtocolError::UnknownMethod(method) => write!(f, "unknown HTTP method \"{method}\""),
            ProtocolError::UnsupportedVersion(version) => {
                write!(f, "unknown protocol \"{version}\"")
            }
            ProtocolError::InvalidHeader(line) => write!(f, "invalid header field \"{line}\""),
            ProtocolError::DuplicateField(name) => write!(f, "field \"{name}\" already exists"),
            ProtocolError::InvalidContentLength(value) => {
                write!(f, "invalid Content-Length \"{value}\"")
            }
            ProtocolError::UnsupportedTransferEncoding(value) => {
                write!(f, "unsupported Transfer-Encoding \"{value}\"")
            }
            ProtocolError::ConflictingFraming => {
                write!(f, "Content-Length and Transfer-Encoding are mutually exclusive")
            }
            ProtocolError::InvalidChunk(msg) => write!(f, "invalid chunk: {msg}"),
            ProtocolError::UnknownStatus(code) => write!(f, "unknown status code \"{code}\""),
            ProtocolError::ReasonMismatch { code, reason } => {
                write!(f, "reason phrase \"{reason}\" does not match status {code}")
            }
            ProtocolError::InvalidEncoding(msg) => write!(f, "invalid encoding: {msg}"),
            ProtocolError::TrailingData(count) => {
                write!(f, "{count} unexpected bytes after message")
            }
            ProtocolError::TooLarge(size) => write!(f, "message exceeds {size} bytes"),
        }
    }
}

impl std::error::Error for ProtocolError {}
