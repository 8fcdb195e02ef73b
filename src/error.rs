//! Unified error types for cdp-sock

use serde::Deserialize;
use std::fmt;
use thiserror::Error;

/// Unified Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Structured error object returned by the browser for a command
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteError {
    /// Error code (e.g. -32601 for an unknown method)
    pub code: i64,
    /// Error message
    #[serde(default)]
    pub message: String,
    /// Additional error data
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code: {})", self.message, self.code)?;
        if let Some(data) = &self.data {
            write!(f, " {}", data)?;
        }
        Ok(())
    }
}

impl std::error::Error for RemoteError {}

/// Coarse classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The command never got an answer because the connection failed
    Transport,
    /// The browser answered with an error object
    Remote,
    /// No reply before the deadline
    Timeout,
    /// A payload did not match the expected shape
    Decode,
    /// Parameters could not be serialized
    Encode,
    /// An event subscriber failed
    Handler,
    /// Invalid configuration
    Configuration,
}

/// Unified error type for cdp-sock
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// The connection could not be established or was lost
    #[error("Connection error: {0}")]
    Connection(String),

    /// A frame could not be written
    #[error("Write error: {0}")]
    Write(String),

    /// The connection closed while the command was outstanding
    #[error("Connection closed")]
    ConnectionClosed,

    /// No reply arrived before the deadline
    #[error("Command {id} ({method}) timed out")]
    Timeout {
        /// Command ID
        id: u64,
        /// Command method
        method: String,
    },

    /// The browser returned an error object
    #[error("Remote error: {0}")]
    Remote(RemoteError),

    /// A payload could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Parameters could not be encoded
    #[error("Encode error: {0}")]
    Encode(String),

    /// An event handler failed
    #[error("Handler error: {0}")]
    Handler(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Endpoint discovery over HTTP failed
    #[error("HTTP error: {0}")]
    Http(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Create a new connection error
    pub fn connection<S: Into<String>>(msg: S) -> Self {
        Error::Connection(msg.into())
    }

    /// Create a new write error
    pub fn write<S: Into<String>>(msg: S) -> Self {
        Error::Write(msg.into())
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(id: u64, method: S) -> Self {
        Error::Timeout {
            id,
            method: method.into(),
        }
    }

    /// Create a new decode error
    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Error::Decode(msg.into())
    }

    /// Create a new encode error
    pub fn encode<S: Into<String>>(msg: S) -> Self {
        Error::Encode(msg.into())
    }

    /// Create a new handler error
    pub fn handler<S: Into<String>>(msg: S) -> Self {
        Error::Handler(msg.into())
    }

    /// Create a new HTTP error
    pub fn http<S: Into<String>>(msg: S) -> Self {
        Error::Http(msg.into())
    }

    /// Create a new configuration error
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Error::Configuration(msg.into())
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Connection(_)
            | Error::Write(_)
            | Error::ConnectionClosed
            | Error::Io(_)
            | Error::Http(_) => ErrorKind::Transport,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::Remote(_) => ErrorKind::Remote,
            Error::Decode(_) => ErrorKind::Decode,
            Error::Encode(_) => ErrorKind::Encode,
            Error::Handler(_) => ErrorKind::Handler,
            Error::Configuration(_) => ErrorKind::Configuration,
        }
    }

    /// The remote error object, if the browser rejected the command
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            Error::Remote(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Error::Remote(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Error::ConnectionClosed)
    }
}

impl From<RemoteError> for Error {
    fn from(err: RemoteError) -> Self {
        Error::Remote(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Http(err.to_string())
    }
}
