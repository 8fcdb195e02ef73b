//! Debugging endpoint discovery
//!
//! A browser started with `--remote-debugging-port` serves `/json/version` and
//! `/json/list` over HTTP. These name the WebSocket URLs a socket connects to.

use crate::{Error, Result};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

/// Browser version information from `/json/version`
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserVersion {
    /// Product name
    #[serde(rename = "Browser", default)]
    pub product: String,
    /// Protocol version
    #[serde(rename = "Protocol-Version", default)]
    pub protocol_version: String,
    /// User agent
    #[serde(rename = "User-Agent", default)]
    pub user_agent: String,
    /// JavaScript engine version
    #[serde(rename = "V8-Version", default)]
    pub js_version: String,
    /// Browser-level WebSocket endpoint
    #[serde(rename = "webSocketDebuggerUrl", default)]
    pub web_socket_debugger_url: String,
}

/// Target information (page, worker, etc.) from `/json/list`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetInfo {
    /// Target ID
    #[serde(rename = "id")]
    pub target_id: String,
    /// Target type
    #[serde(rename = "type")]
    pub target_type: String,
    /// Target title
    #[serde(default)]
    pub title: String,
    /// Target URL
    #[serde(default)]
    pub url: String,
    /// WebSocket endpoint of the target (absent when another client is attached)
    #[serde(default)]
    pub web_socket_debugger_url: Option<String>,
}

/// HTTP side of a browser debugging endpoint
#[derive(Debug, Clone)]
pub struct BrowserEndpoint {
    /// Base URL, e.g. "http://127.0.0.1:9222"
    http_base: String,
    client: reqwest::Client,
}

impl BrowserEndpoint {
    /// Create a discovery client for `endpoint` (ws, wss, http or https)
    pub fn new<S: AsRef<str>>(endpoint: S) -> Result<Self> {
        Self::with_timeout(endpoint, Duration::from_secs(10))
    }

    pub fn with_timeout<S: AsRef<str>>(endpoint: S, timeout: Duration) -> Result<Self> {
        // Debugging ports are local; an ambient HTTP_PROXY must not capture them
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .map_err(|e| Error::http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_base: http_base(endpoint.as_ref()),
            client,
        })
    }

    pub fn http_base(&self) -> &str {
        &self.http_base
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.http_base, path);
        debug!("Fetching {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::connection(format!("Failed to reach {}: {}", url, e)))?
            .error_for_status()?;

        response
            .json()
            .await
            .map_err(|e| Error::decode(format!("Failed to parse {}: {}", url, e)))
    }

    /// Get browser version
    pub async fn version(&self) -> Result<BrowserVersion> {
        self.get_json("/json/version").await
    }

    /// List all targets (pages, workers, etc.)
    pub async fn targets(&self) -> Result<Vec<TargetInfo>> {
        self.get_json("/json/list").await
    }
}

/// Convert any accepted endpoint form to its HTTP base URL
fn http_base(endpoint: &str) -> String {
    let converted = if let Some(rest) = endpoint.strip_prefix("ws://") {
        format!("http://{}", rest)
    } else if let Some(rest) = endpoint.strip_prefix("wss://") {
        format!("https://{}", rest)
    } else {
        endpoint.to_string()
    };

    // Keep scheme://host:port only
    match converted.find("://") {
        Some(idx) => {
            let authority_start = idx + 3;
            match converted[authority_start..].find('/') {
                Some(slash) => converted[..authority_start + slash].to_string(),
                None => converted,
            }
        }
        None => converted,
    }
}

/// Whether `endpoint` already names a WebSocket debugging target
pub fn is_websocket_target(endpoint: &str) -> bool {
    (endpoint.starts_with("ws://") || endpoint.starts_with("wss://"))
        && endpoint.contains("/devtools/")
}

/// Resolve `endpoint` to a WebSocket URL the transport can connect to.
///
/// `/devtools/` WebSocket URLs are returned unchanged; anything else is looked up
/// through `/json/version`.
pub async fn resolve_websocket_url(endpoint: &str, timeout: Duration) -> Result<String> {
    if is_websocket_target(endpoint) {
        return Ok(endpoint.to_string());
    }

    info!("Resolving debugger URL via {}", endpoint);
    let version = BrowserEndpoint::with_timeout(endpoint, timeout)?
        .version()
        .await?;

    if version.web_socket_debugger_url.is_empty() {
        return Err(Error::connection(format!(
            "No webSocketDebuggerUrl advertised by {}",
            endpoint
        )));
    }

    debug!("Resolved {} to {}", endpoint, version.web_socket_debugger_url);
    Ok(version.web_socket_debugger_url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_base_conversion() {
        assert_eq!(http_base("ws://localhost:9222"), "http://localhost:9222");
        assert_eq!(http_base("wss://remote.example.com:9222"), "https://remote.example.com:9222");
        assert_eq!(
            http_base("ws://127.0.0.1:9222/devtools/browser/abc"),
            "http://127.0.0.1:9222"
        );
        assert_eq!(http_base("http://127.0.0.1:9222/"), "http://127.0.0.1:9222");
    }

    #[test]
    fn test_is_websocket_target() {
        assert!(is_websocket_target("ws://127.0.0.1:9222/devtools/page/ABC123"));
        assert!(!is_websocket_target("ws://127.0.0.1:9222"));
        assert!(!is_websocket_target("http://127.0.0.1:9222/devtools/page/ABC123"));
    }

    #[test]
    fn test_version_deserialization() {
        let version: BrowserVersion = serde_json::from_value(serde_json::json!({
            "Browser": "Chrome/120.0.6099.109",
            "Protocol-Version": "1.3",
            "User-Agent": "Mozilla/5.0 (Test)",
            "V8-Version": "12.0.267.8",
            "webSocketDebuggerUrl": "ws://127.0.0.1:9222/devtools/browser/xyz"
        }))
        .unwrap();

        assert_eq!(version.product, "Chrome/120.0.6099.109");
        assert_eq!(version.protocol_version, "1.3");
        assert!(version.web_socket_debugger_url.ends_with("/devtools/browser/xyz"));
    }

    #[tokio::test]
    async fn test_resolve_passes_through_target_urls() {
        let url = "ws://127.0.0.1:1/devtools/page/ABC";
        assert_eq!(resolve_websocket_url(url, Duration::from_secs(1)).await.unwrap(), url);
    }
}
