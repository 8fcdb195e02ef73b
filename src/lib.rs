//! cdp-sock: Chrome DevTools Protocol socket layer
//!
//! This library multiplexes CDP commands and events over a single WebSocket
//! connection, and carries a sample of typed domain bindings built on top of it.

pub mod config;
pub mod error;

pub mod cdp;
pub mod protocol;

// Re-exports
pub use error::{Error, ErrorKind, RemoteError, Result};

/// cdp-sock library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
