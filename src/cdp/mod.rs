//! # Chrome DevTools Protocol (CDP) socket layer
//!
//! One WebSocket connection to a browser debugging endpoint, shared by any number of
//! concurrent callers.
//!
//! ## Main features
//! - **Command correlation**: every command gets a unique ID; replies are matched by
//!   ID regardless of arrival order
//! - **Event dispatch**: unsolicited events fan out to subscribers by exact name
//! - **Timeouts**: per-call deadlines, with per-method defaults from configuration
//! - **Teardown**: closing (or losing) the connection resolves every pending command
//!
//! ## Module structure
//! - `types`: wire envelopes and inbound classification
//! - `transport`: WebSocket stream and read loop
//! - `correlator`: pending-command table
//! - `dispatcher`: event subscription table
//! - `command`: the `Command` value used by domain bindings
//! - `traits`: the `CdpConnection` seam
//! - `connection`: `CdpSocket`, the real connection
//! - `browser`: HTTP endpoint discovery
//! - `mock`: in-memory connection for testing
//!
//! ## Example
//! ```rust,no_run
//! use cdp_sock::cdp::{call, CdpConnection, CdpSocket};
//! use serde_json::{json, Value};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let socket = CdpSocket::connect_to("http://localhost:9222").await?;
//!
//! let version: Value = call(&*socket, "Browser.getVersion", &json!({})).await?;
//! println!("Connected to {}", version["product"]);
//!
//! socket.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod browser;
pub mod command;
pub mod connection;
pub mod correlator;
pub mod dispatcher;
pub mod mock;
pub mod traits;
pub mod transport;
pub mod types;

pub use browser::{BrowserEndpoint, BrowserVersion, TargetInfo};
pub use command::{call, call_unit, call_without_params, subscribe_typed, CdpEventKind, Command};
pub use connection::{CdpSocket, ConnectionState};
pub use dispatcher::{
    EventDispatcher, EventHandler, EventStream, HandlerFailure, SubscriptionHandle,
    SubscriptionId, WILDCARD,
};
pub use traits::CdpConnection;
pub use types::{CdpEvent, InboundMessage};

// Re-export mock for development/testing
pub use mock::MockCdpConnection;
