//! Command registry and reply correlation
//!
//! Every outgoing command gets a fresh ID and a one-shot resolution slot. The read
//! loop resolves slots by ID; connection teardown resolves whatever is left.

use crate::{Error, Result};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, trace};

/// Terminal outcome delivered to a waiting caller
pub type Outcome = Result<Bytes>;

/// Pending command response
#[derive(Debug)]
struct PendingCommand {
    /// Response channel sender
    sender: oneshot::Sender<Outcome>,
    /// Command method (for logging)
    method: String,
    /// When the command was registered
    registered_at: Instant,
}

#[derive(Debug, Default)]
struct PendingTable {
    /// Set once by `close_all`; no registrations afterwards
    closed: bool,
    commands: HashMap<u64, PendingCommand>,
}

/// Tracks outstanding commands for one connection
#[derive(Debug)]
pub struct Correlator {
    /// Next command ID
    next_id: AtomicU64,
    /// Pending commands (ID -> response sender). Never held across `.await`.
    table: Mutex<PendingTable>,
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

impl Correlator {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            table: Mutex::new(PendingTable::default()),
        }
    }

    fn table(&self) -> MutexGuard<'_, PendingTable> {
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Allocate the next command ID
    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Register a resolution slot for `id`.
    ///
    /// Must be called before the command frame is written.
    pub fn register(&self, id: u64, method: &str) -> Result<PendingSlot<'_>> {
        let (sender, receiver) = oneshot::channel();

        let mut table = self.table();
        if table.closed {
            return Err(Error::ConnectionClosed);
        }
        table.commands.insert(
            id,
            PendingCommand {
                sender,
                method: method.to_string(),
                registered_at: Instant::now(),
            },
        );
        drop(table);

        trace!("Registered command {} ({})", id, method);

        Ok(PendingSlot {
            correlator: self,
            id,
            method: method.to_string(),
            receiver,
        })
    }

    /// Resolve slot `id`. Returns `false` when no such command is pending.
    pub fn resolve(&self, id: u64, outcome: Outcome) -> bool {
        let pending = self.table().commands.remove(&id);

        match pending {
            Some(pending) => {
                debug!(
                    "Resolved command {} ({}) after {:?}",
                    id,
                    pending.method,
                    pending.registered_at.elapsed()
                );
                // The caller may have gone away; nothing to do then.
                let _ = pending.sender.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Drop slot `id` without resolving it
    pub fn cancel(&self, id: u64) -> bool {
        self.table().commands.remove(&id).is_some()
    }

    /// Close the table and resolve every pending command with `error`.
    ///
    /// Returns the number of commands that were flushed.
    pub fn close_all(&self, error: Error) -> usize {
        let mut table = self.table();
        table.closed = true;

        let drained: Vec<_> = table.commands.drain().collect();
        for (id, pending) in &drained {
            trace!("Flushing command {} ({})", id, pending.method);
        }
        let count = drained.len();
        for (_, pending) in drained {
            let _ = pending.sender.send(Err(error.clone()));
        }
        count
    }

    pub fn is_closed(&self) -> bool {
        self.table().closed
    }

    /// Number of commands sent and not yet resolved
    pub fn pending_count(&self) -> usize {
        self.table().commands.len()
    }
}

/// The caller's side of a registered command.
///
/// Dropping the slot (e.g. when the caller's future is cancelled) unregisters it.
#[derive(Debug)]
pub struct PendingSlot<'a> {
    correlator: &'a Correlator,
    id: u64,
    method: String,
    receiver: oneshot::Receiver<Outcome>,
}

impl PendingSlot<'_> {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Suspend until the command is resolved or `timeout` elapses
    pub async fn wait(self, timeout: Duration) -> Outcome {
        self.wait_until(tokio::time::Instant::now() + timeout).await
    }

    /// Suspend until the command is resolved or `deadline` passes
    pub async fn wait_until(mut self, deadline: tokio::time::Instant) -> Outcome {
        match tokio::time::timeout_at(deadline, &mut self.receiver).await {
            Ok(Ok(outcome)) => outcome,
            // Sender dropped without a value: the slot was torn down
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                if self.correlator.cancel(self.id) {
                    return Err(Error::timeout(self.id, self.method.as_str()));
                }
                // Resolved between the deadline and the cancel; the reply won.
                match self.receiver.try_recv() {
                    Ok(outcome) => outcome,
                    Err(_) => Err(Error::timeout(self.id, self.method.as_str())),
                }
            }
        }
    }
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        self.correlator.cancel(self.id);
    }
}
