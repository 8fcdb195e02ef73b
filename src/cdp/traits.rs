//! CDP connection trait
//!
//! The seam between the socket layer and domain bindings. Domain code only ever
//! sees a method name, a serializable parameter value and a raw result payload.

use super::command::Command;
use super::dispatcher::{EventDispatcher, EventHandler, EventStream, HandlerFailure, SubscriptionHandle};
use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// CDP connection trait
///
/// Represents one connection to a Chrome DevTools Protocol target.
#[async_trait]
pub trait CdpConnection: Send + Sync + std::fmt::Debug {
    /// Allocate a command ID that is unique for the life of the connection
    fn next_command_id(&self) -> u64;

    /// Send a command under `id` and wait for its result payload.
    ///
    /// `timeout` overrides the configured per-method deadline.
    async fn send_with_id(
        &self,
        id: u64,
        method: &str,
        params: Value,
        timeout: Option<Duration>,
    ) -> Result<Bytes>;

    /// Send a command and wait for its result payload
    async fn send_raw(&self, method: &str, params: Value, timeout: Option<Duration>) -> Result<Bytes> {
        let id = self.next_command_id();
        self.send_with_id(id, method, params, timeout).await
    }

    /// Send a prepared command and record the outcome on it.
    ///
    /// Commands whose parameters failed to serialize are not sent.
    async fn send_command(&self, command: &mut Command) {
        if command.is_resolved() {
            return;
        }

        let id = self.next_command_id();
        command.assign_id(id);
        let params = command.take_params();
        let timeout = command.timeout();
        let outcome = self.send_with_id(id, command.method(), params, timeout).await;
        command.resolve(outcome);
    }

    /// Event subscription table of this connection
    fn dispatcher(&self) -> &Arc<EventDispatcher>;

    /// Register a handler for an exact event name (or `"*"`).
    ///
    /// The handler runs on the read loop and must not block; use [`Self::events`]
    /// for slow consumers.
    fn subscribe(&self, event: &str, handler: EventHandler) -> Result<SubscriptionHandle> {
        self.dispatcher().subscribe_handler(event, handler)
    }

    /// Remove one registration
    fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        self.dispatcher().unsubscribe(handle)
    }

    /// Buffered stream of events named `event`
    fn events(&self, event: &str) -> Result<EventStream> {
        self.dispatcher().events(event)
    }

    /// Reports of event handlers that failed
    fn handler_failures(&self) -> broadcast::Receiver<HandlerFailure> {
        self.dispatcher().failures()
    }

    /// Close the connection
    async fn close(&self) -> Result<()>;

    /// Check if connection is active
    fn is_active(&self) -> bool;
}
