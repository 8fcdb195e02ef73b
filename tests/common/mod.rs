//! Common test utilities
//!
//! Shared helpers for connecting sockets to the mock server.

#![allow(dead_code)]

use cdp_sock::cdp::{CdpConnection, CdpSocket};
use cdp_sock::config::Config;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Config pointing at `url` with short deadlines
pub fn test_config(url: &str) -> Config {
    let mut config = Config::with_endpoint(url);
    config.connect_timeout_secs = 2;
    config.timeouts.default_timeout_secs = 5;
    config
}

/// Open a socket to `url`
pub async fn connect(url: &str) -> Arc<CdpSocket> {
    CdpSocket::open(test_config(url))
        .await
        .expect("failed to connect to mock server")
}

/// Round-trip one command in auto-reply mode.
///
/// Frames are handled in arrival order, so once this returns every frame the server
/// pushed before the reply has been dispatched.
pub async fn sync(socket: &CdpSocket) {
    socket
        .send_raw("Test.sync", Value::Null, None)
        .await
        .expect("sync command failed");
}

/// Poll `condition` until it holds or two seconds pass
pub async fn eventually<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
