//! Mock CDP implementation for testing
//!
//! [`MockCdpConnection`] answers commands from a script instead of a browser and
//! feeds events straight into a real [`EventDispatcher`], so domain bindings and
//! event subscribers can be exercised without a socket.

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::cdp::dispatcher::EventDispatcher;
use crate::cdp::traits::CdpConnection;
use crate::cdp::types::CdpEvent;
use crate::error::RemoteError;
use crate::{Error, Result};

/// A command observed by the mock
#[derive(Debug, Clone, PartialEq)]
pub struct SentCommand {
    pub id: u64,
    pub method: String,
    pub params: Value,
}

#[derive(Debug, Default)]
struct Script {
    replies: HashMap<String, std::result::Result<Value, RemoteError>>,
    sent: Vec<SentCommand>,
}

/// Mock CDP connection
#[derive(Debug)]
pub struct MockCdpConnection {
    is_active: AtomicBool,
    next_id: AtomicU64,
    script: Mutex<Script>,
    dispatcher: Arc<EventDispatcher>,
}

impl MockCdpConnection {
    /// Create a new mock CDP connection
    pub fn new() -> Self {
        Self {
            is_active: AtomicBool::new(true),
            next_id: AtomicU64::new(1),
            script: Mutex::new(Script::default()),
            dispatcher: Arc::new(EventDispatcher::new(100, 64)),
        }
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Answer `method` with `result`
    pub fn respond_with(&self, method: &str, result: Value) -> &Self {
        self.script().replies.insert(method.to_string(), Ok(result));
        self
    }

    /// Answer `method` with a remote error object
    pub fn fail_with(&self, method: &str, code: i64, message: &str) -> &Self {
        self.script().replies.insert(
            method.to_string(),
            Err(RemoteError {
                code,
                message: message.to_string(),
                data: None,
            }),
        );
        self
    }

    /// Commands sent so far, in order
    pub fn sent(&self) -> Vec<SentCommand> {
        self.script().sent.clone()
    }

    /// Parameters of the most recent command named `method`
    pub fn last_params(&self, method: &str) -> Option<Value> {
        self.script()
            .sent
            .iter()
            .rev()
            .find(|c| c.method == method)
            .map(|c| c.params.clone())
    }

    /// Deliver an event as if the browser had sent it
    pub fn emit(&self, method: &str, params: Value) -> usize {
        self.dispatcher.dispatch(&CdpEvent::new(method, params))
    }
}

impl Default for MockCdpConnection {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CdpConnection for MockCdpConnection {
    fn next_command_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn send_with_id(
        &self,
        id: u64,
        method: &str,
        params: Value,
        _timeout: Option<Duration>,
    ) -> Result<Bytes> {
        if !self.is_active() {
            return Err(Error::write("Connection is not open"));
        }

        let mut script = self.script();
        script.sent.push(SentCommand {
            id,
            method: method.to_string(),
            params,
        });

        match script.replies.get(method) {
            Some(Ok(result)) => serde_json::to_vec(result)
                .map(Bytes::from)
                .map_err(|e| Error::decode(e.to_string())),
            Some(Err(remote)) => Err(Error::Remote(remote.clone())),
            None => Err(Error::Remote(RemoteError {
                code: -32601,
                message: format!("'{}' wasn't found", method),
                data: None,
            })),
        }
    }

    fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    async fn close(&self) -> Result<()> {
        self.is_active.store(false, Ordering::Relaxed);
        self.dispatcher.close();
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.is_active.load(Ordering::Relaxed)
    }
}
