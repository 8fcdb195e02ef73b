//! WebSocket transport
//!
//! Owns the physical stream to the debugging endpoint. The write half sits behind an
//! async mutex shared by all senders; the read half is moved into the read loop,
//! which is its only reader. No protocol knowledge lives here.

use crate::{Error, Result};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, trace, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Read half of the WebSocket, owned by the read loop
pub type WsSource = SplitStream<WsStream>;

/// Why the read loop stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadLoopExit {
    /// `close()` was requested locally
    Shutdown,
    /// The browser sent a close frame
    RemoteClosed,
    /// The stream ended without a close frame
    StreamEnded,
    /// Reading failed
    Failed(String),
}

/// Write side of a WebSocket connection
pub struct WsTransport {
    url: String,
    sink: Mutex<Option<SplitSink<WsStream, Message>>>,
}

impl std::fmt::Debug for WsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsTransport").field("url", &self.url).finish()
    }
}

impl WsTransport {
    /// Perform the WebSocket handshake.
    ///
    /// Returns the transport (write side) and the read half for the read loop.
    pub async fn connect(url: &str, timeout: Duration) -> Result<(Self, WsSource)> {
        info!("Connecting to WebSocket: {}", url);

        let (stream, _) = tokio::time::timeout(timeout, connect_async(url))
            .await
            .map_err(|_| Error::connection(format!("Handshake with {} timed out", url)))?
            .map_err(|e| Error::connection(format!("Failed to connect to {}: {}", url, e)))?;

        let (sink, source) = stream.split();
        info!("WebSocket connection established");

        Ok((
            Self {
                url: url.to_string(),
                sink: Mutex::new(Some(sink)),
            },
            source,
        ))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send one text frame
    pub async fn write(&self, frame: String) -> Result<()> {
        trace!("WebSocket: sending {}", frame);
        self.send(Message::Text(frame)).await
    }

    async fn send(&self, message: Message) -> Result<()> {
        let mut sink = self.sink.lock().await;
        let sink = sink
            .as_mut()
            .ok_or_else(|| Error::write("WebSocket is closed"))?;

        sink.send(message)
            .await
            .map_err(|e| Error::write(format!("Failed to send message: {}", e)))
    }

    /// Send a close frame (best effort) and release the write half
    pub async fn shutdown(&self) {
        let mut sink = self.sink.lock().await;
        if let Some(mut sink) = sink.take() {
            if let Err(e) = sink.close().await {
                debug!("Close frame not delivered: {}", e);
            }
        }
    }

    /// Release the write half without a close handshake
    pub async fn release(&self) {
        self.sink.lock().await.take();
    }
}

/// Read frames until the stream ends or `shutdown` fires.
///
/// Text frames, and binary frames holding UTF-8, are passed to `on_frame`.
pub async fn read_loop<F>(
    mut source: WsSource,
    transport: &WsTransport,
    mut shutdown: oneshot::Receiver<()>,
    mut on_frame: F,
) -> ReadLoopExit
where
    F: FnMut(&str),
{
    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => return ReadLoopExit::Shutdown,
            next = source.next() => match next {
                Some(Ok(Message::Text(text))) => on_frame(&text),
                Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                    Ok(text) => on_frame(text),
                    Err(_) => warn!("Dropping non UTF-8 binary frame ({} bytes)", data.len()),
                },
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = transport.send(Message::Pong(data)).await {
                        debug!("Failed to send pong: {}", e);
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    info!("WebSocket close frame received: {:?}", frame);
                    return ReadLoopExit::RemoteClosed;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!("WebSocket error: {}", e);
                    return ReadLoopExit::Failed(e.to_string());
                }
                None => {
                    warn!("WebSocket stream closed");
                    return ReadLoopExit::StreamEnded;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_refused_is_connection_error() {
        // Bind then drop to get a port with nothing listening
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = WsTransport::connect(&format!("ws://{}", addr), Duration::from_secs(2)).await;
        assert!(matches!(result, Err(Error::Connection(_))));
    }
}
