//! The three error families, each with stable integer codes.
//!
//! Transport errors bubble into protocol errors unchanged; protocol errors
//! abort the current message. Application errors are the only family that
//! crosses the wire, as an EXCEPTION message body.

use thiserror::Error;

/// Failures at the byte-channel layer.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport failure: {0}")]
    Unknown(String),
    #[error("transport not open")]
    NotOpen,
    #[error("transport already open")]
    AlreadyOpen,
    #[error("transport timed out")]
    TimedOut,
    /// The channel ended before the requested bytes arrived. `bytes_read`
    /// is how many of them did.
    #[error("end of file after {bytes_read} bytes")]
    EndOfFile { bytes_read: usize },
}

impl TransportError {
    /// End-of-file with nothing consumed.
    pub const fn eof() -> Self {
        TransportError::EndOfFile { bytes_read: 0 }
    }

    pub const fn is_eof(&self) -> bool {
        matches!(self, TransportError::EndOfFile { .. })
    }

    /// Stable wire/diagnostic code for this family.
    pub const fn code(&self) -> i32 {
        match self {
            TransportError::Unknown(_) => 0,
            TransportError::NotOpen => 1,
            TransportError::AlreadyOpen => 2,
            TransportError::TimedOut => 3,
            TransportError::EndOfFile { .. } => 4,
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::UnexpectedEof => TransportError::eof(),
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                TransportError::TimedOut
            }
            std::io::ErrorKind::NotConnected => TransportError::NotOpen,
            _ => TransportError::Unknown(e.to_string()),
        }
    }
}

/// Failures at the encoder/decoder layer.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("protocol failure: {0}")]
    Unknown(String),
    #[error("invalid data: {0}")]
    InvalidData(String),
    #[error("negative size: {0}")]
    NegativeSize(i64),
    #[error("size {0} exceeds limit")]
    SizeLimit(usize),
    #[error("bad version: {0}")]
    BadVersion(String),
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),
    #[error("nesting depth limit exceeded")]
    DepthLimit,
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ProtocolError {
    /// Stable code for this family. The transparent transport variant keeps
    /// its own family's code space and reports UNKNOWN here.
    pub const fn code(&self) -> i32 {
        match self {
            ProtocolError::Unknown(_) | ProtocolError::Transport(_) => 0,
            ProtocolError::InvalidData(_) => 1,
            ProtocolError::NegativeSize(_) => 2,
            ProtocolError::SizeLimit(_) => 3,
            ProtocolError::BadVersion(_) => 4,
            ProtocolError::NotImplemented(_) => 5,
            ProtocolError::DepthLimit => 6,
        }
    }

    /// True when the underlying transport reported end-of-file.
    pub const fn is_eof(&self) -> bool {
        matches!(self, ProtocolError::Transport(t) if t.is_eof())
    }
}

/// Error kinds surfaced on the wire as an EXCEPTION message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ApplicationErrorKind {
    Unknown = 0,
    UnknownMethod = 1,
    InvalidMessageType = 2,
    WrongMethodName = 3,
    BadSequenceId = 4,
    MissingResult = 5,
    InternalError = 6,
}

impl ApplicationErrorKind {
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// Decode a kind from its wire code, falling back to `Unknown`.
    pub const fn from_code(code: i32) -> Self {
        match code {
            1 => ApplicationErrorKind::UnknownMethod,
            2 => ApplicationErrorKind::InvalidMessageType,
            3 => ApplicationErrorKind::WrongMethodName,
            4 => ApplicationErrorKind::BadSequenceId,
            5 => ApplicationErrorKind::MissingResult,
            6 => ApplicationErrorKind::InternalError,
            _ => ApplicationErrorKind::Unknown,
        }
    }
}

/// An application-level failure, delivered to the peer in an EXCEPTION
/// envelope whose body is a struct with field 1 = message, field 2 = code.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ApplicationError {
    pub kind: ApplicationErrorKind,
    pub message: String,
}

impl ApplicationError {
    pub fn new(kind: ApplicationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unknown_method(name: &str) -> Self {
        Self::new(
            ApplicationErrorKind::UnknownMethod,
            format!("unknown method {name}"),
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ApplicationErrorKind::InternalError, message)
    }
}
