//! CDP WebSocket connection implementation
//!
//! [`CdpSocket`] owns one WebSocket, its pending-command table and its event
//! subscription table. A single background task reads the socket and routes each
//! frame to the correlator (replies) or the dispatcher (events); any number of
//! callers may send concurrently.

use super::browser::resolve_websocket_url;
use super::correlator::Correlator;
use super::dispatcher::EventDispatcher;
use super::traits::CdpConnection;
use super::transport::{self, ReadLoopExit, WsTransport};
use super::types::{self, CdpRequest, InboundMessage};
use crate::config::Config;
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, trace, warn, Instrument};
use uuid::Uuid;

/// Connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closing,
    Closed,
}

/// State shared with the read loop task
#[derive(Debug)]
struct Shared {
    state: RwLock<ConnectionState>,
    is_active: AtomicBool,
    transport: RwLock<Option<Arc<WsTransport>>>,
    correlator: Correlator,
    dispatcher: Arc<EventDispatcher>,
}

impl Shared {
    /// Route one inbound frame
    fn handle_frame(&self, text: &str) {
        trace!("Received frame: {}", text);

        match InboundMessage::from_text(text) {
            Ok(InboundMessage::Reply { id, outcome }) => {
                if !self.correlator.resolve(id, outcome.map_err(Error::Remote)) {
                    warn!("Received response for unknown command ID: {}", id);
                }
            }
            Ok(InboundMessage::Event(event)) => {
                debug!("Received event: {}", event.method);
                self.dispatcher.dispatch(&event);
            }
            Err(e) => match types::reply_id(text) {
                // Undecodable reply: fail its command now instead of at the deadline
                Some(id) => {
                    warn!("Malformed reply for command {}: {}", id, e);
                    if !self.correlator.resolve(id, Err(e)) {
                        warn!("Received response for unknown command ID: {}", id);
                    }
                }
                None => warn!("Dropping unrecognized frame: {}", e),
            },
        }
    }

    /// Resolve everything still pending, stop event delivery, release the socket.
    ///
    /// Safe to run more than once.
    async fn teardown(&self) {
        self.is_active.store(false, Ordering::SeqCst);
        {
            let mut state = self.state.write().await;
            if *state != ConnectionState::Closed {
                *state = ConnectionState::Closing;
            }
        }

        let flushed = self.correlator.close_all(Error::ConnectionClosed);
        if flushed > 0 {
            info!("Resolved {} pending commands with connection-closed", flushed);
        }
        self.dispatcher.close();

        if let Some(transport) = self.transport.write().await.take() {
            transport.release().await;
        }

        *self.state.write().await = ConnectionState::Closed;
    }
}

/// Run `write` unless `deadline` passes first, which is a `Timeout` for command `id`
async fn within_deadline<F>(deadline: Instant, id: u64, method: &str, write: F) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    tokio::time::timeout_at(deadline, write)
        .await
        .map_err(|_| Error::timeout(id, method))?
}

/// Handle on the running read loop
#[derive(Debug)]
struct ReadLoop {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// CDP WebSocket connection
#[derive(Debug)]
pub struct CdpSocket {
    /// Socket ID (for logging)
    id: Uuid,
    config: Config,
    shared: Arc<Shared>,
    reader: Mutex<Option<ReadLoop>>,
}

impl CdpSocket {
    /// Create a disconnected socket
    pub fn new(config: Config) -> Self {
        let dispatcher = Arc::new(EventDispatcher::new(config.event_buffer, config.failure_buffer));

        Self {
            id: Uuid::new_v4(),
            config,
            shared: Arc::new(Shared {
                state: RwLock::new(ConnectionState::Disconnected),
                is_active: AtomicBool::new(false),
                transport: RwLock::new(None),
                correlator: Correlator::new(),
                dispatcher,
            }),
            reader: Mutex::new(None),
        }
    }

    /// Create a socket and connect it
    pub async fn open(config: Config) -> Result<Arc<Self>> {
        let socket = Arc::new(Self::new(config));
        socket.connect().await?;
        Ok(socket)
    }

    /// Connect to `url` with default settings
    ///
    /// # Arguments
    /// * `url` - WebSocket URL (e.g., "ws://localhost:9222/devtools/page/ABC123")
    pub async fn connect_to<S: Into<String>>(url: S) -> Result<Arc<Self>> {
        Self::open(Config::with_endpoint(url)).await
    }

    /// Establish the WebSocket connection and start the read loop.
    ///
    /// On an open socket this is a no-op, or a `Connection` error with
    /// `strict_connect`. A socket that has been closed cannot be reopened.
    pub async fn connect(&self) -> Result<()> {
        let mut state = self.shared.state.write().await;
        match *state {
            ConnectionState::Disconnected => {}
            ConnectionState::Open if !self.config.strict_connect => return Ok(()),
            ConnectionState::Open | ConnectionState::Connecting => {
                return Err(Error::connection("Connection is already open"));
            }
            ConnectionState::Closing | ConnectionState::Closed => {
                return Err(Error::ConnectionClosed);
            }
        }
        *state = ConnectionState::Connecting;

        let (transport, source) = match self.establish().await {
            Ok(connected) => connected,
            Err(e) => {
                *state = ConnectionState::Disconnected;
                return Err(e);
            }
        };

        let transport = Arc::new(transport);
        *self.shared.transport.write().await = Some(Arc::clone(&transport));
        self.shared.is_active.store(true, Ordering::SeqCst);

        let (shutdown, shutdown_rx) = oneshot::channel();
        let shared = Arc::clone(&self.shared);
        let span = info_span!("cdp_read_loop", socket = %self.id);

        let task = tokio::spawn(
            async move {
                info!("Read loop started");
                let exit = transport::read_loop(source, &transport, shutdown_rx, |text| {
                    shared.handle_frame(text)
                })
                .await;

                match &exit {
                    ReadLoopExit::Shutdown => info!("Read loop stopped"),
                    other => warn!("Read loop ended: {:?}", other),
                }
                shared.teardown().await;
            }
            .instrument(span),
        );

        *self.reader.lock().await = Some(ReadLoop { shutdown, task });
        *state = ConnectionState::Open;

        info!("CDP socket {} open", self.id);
        Ok(())
    }

    async fn establish(&self) -> Result<(WsTransport, transport::WsSource)> {
        let timeout = self.config.connect_timeout();
        let url = resolve_websocket_url(&self.config.endpoint, timeout).await?;
        WsTransport::connect(&url, timeout).await
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn state(&self) -> ConnectionState {
        *self.shared.state.read().await
    }

    /// Number of commands sent and not yet resolved
    pub fn pending_commands(&self) -> usize {
        self.shared.correlator.pending_count()
    }
}

#[async_trait]
impl CdpConnection for CdpSocket {
    fn next_command_id(&self) -> u64 {
        self.shared.correlator.next_id()
    }

    async fn send_with_id(
        &self,
        id: u64,
        method: &str,
        params: Value,
        timeout: Option<Duration>,
    ) -> Result<Bytes> {
        if !self.is_active() {
            return Err(Error::write("Connection is not open"));
        }

        let frame = CdpRequest::new(id, method, &params).to_frame()?;

        let transport = self
            .shared
            .transport
            .read()
            .await
            .clone()
            .ok_or_else(|| Error::write("Connection is not open"))?;

        let timeout = timeout.unwrap_or_else(|| self.config.timeouts.timeout_for(method));
        let deadline = Instant::now() + timeout;

        // Registered before the write so a fast reply always finds its slot
        let slot = self.shared.correlator.register(id, method)?;

        debug!("Sending CDP command {}: {}", id, method);
        within_deadline(deadline, id, method, transport.write(frame)).await?;

        slot.wait_until(deadline).await
    }

    fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.shared.dispatcher
    }

    /// Close the connection.
    ///
    /// Returns after the read loop has exited, every pending command has been
    /// resolved, and the socket has been released.
    async fn close(&self) -> Result<()> {
        {
            let mut state = self.shared.state.write().await;
            if *state == ConnectionState::Closed {
                return Ok(());
            }
            *state = ConnectionState::Closing;
        }

        info!("Closing CDP socket {}", self.id);
        self.shared.is_active.store(false, Ordering::SeqCst);

        let transport = self.shared.transport.read().await.clone();
        if let Some(transport) = transport {
            transport.shutdown().await;
        }

        if let Some(reader) = self.reader.lock().await.take() {
            let _ = reader.shutdown.send(());
            if let Err(e) = reader.task.await {
                warn!("Read loop task failed: {}", e);
            }
        }

        self.shared.teardown().await;
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.shared.is_active.load(Ordering::SeqCst)
    }
}

impl Drop for CdpSocket {
    fn drop(&mut self) {
        // Without an explicit close, stop the read loop; it tears down on exit.
        if let Some(reader) = self.reader.get_mut().take() {
            let _ = reader.shutdown.send(());
        }
    }
}
