//! # cdp-probe
//!
//! Connects to a browser debugging endpoint, prints the browser product string and,
//! optionally, logs every event the browser pushes for a while.
//!
//! ## Environment variables
//! - `CDP_SOCK_ENDPOINT`: debugging endpoint (default: ws://127.0.0.1:9222)
//! - `CDP_SOCK_WATCH_SECS`: seconds to log events before closing (default: 0)
//! - `RUST_LOG`: log filter (default: `CDP_SOCK_LOG_LEVEL`, then "info")

use anyhow::Context;
use cdp_sock::{
    cdp::{call, CdpConnection, CdpEvent, CdpSocket, WILDCARD},
    config::Config,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// `Browser.getVersion` result
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetVersionResult {
    protocol_version: String,
    product: String,
    user_agent: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .context("invalid log filter")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("cdp-probe v{}", cdp_sock::VERSION);

    let watch = std::env::var("CDP_SOCK_WATCH_SECS")
        .ok()
        .map(|v| v.parse::<u64>())
        .transpose()
        .context("CDP_SOCK_WATCH_SECS must be a number of seconds")?
        .unwrap_or(0);

    let socket = CdpSocket::open(config)
        .await
        .context("failed to connect to the debugging endpoint")?;

    let version: GetVersionResult = call(&*socket, "Browser.getVersion", &json!({})).await?;
    println!("{}", version.product);
    info!(
        "Protocol {} ({})",
        version.protocol_version, version.user_agent
    );

    if watch > 0 {
        watch_events(&socket, Duration::from_secs(watch)).await?;
    }

    socket.close().await?;
    Ok(())
}

async fn watch_events(socket: &Arc<CdpSocket>, duration: Duration) -> anyhow::Result<()> {
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);

    let handle = socket.subscribe(
        WILDCARD,
        Arc::new(move |event: &CdpEvent| -> anyhow::Result<()> {
            counter.fetch_add(1, Ordering::Relaxed);
            info!("event {}", event.method);
            Ok(())
        }),
    )?;

    info!("Watching events for {:?}", duration);
    tokio::select! {
        _ = tokio::time::sleep(duration) => {}
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted");
        }
    }

    socket.unsubscribe(&handle);
    info!("Saw {} events", seen.load(Ordering::Relaxed));
    Ok(())
}
