//! Change notification types and ChangeBus
//!
//! Models the push feed of insert/update/delete events on the watched board
//! tables. A DELETE carries the prior row snapshot only when the store knows
//! which row went away; bulk clears arrive without one.
//!
//! The bus is per process. Stores shared between processes persist each
//! event and replay it onto every process's bus.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::models::RequestId;

/// Tables a client subscribes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchedTable {
    /// The request ledger (cataloged and free-text requests)
    Requests,
    /// Operator-maintained hidden set
    HiddenSongs,
    /// Song catalog
    Songs,
}

impl WatchedTable {
    /// Table name as stored in the change log
    pub fn as_str(&self) -> &'static str {
        match self {
            WatchedTable::Requests => "requests",
            WatchedTable::HiddenSongs => "hidden_songs",
            WatchedTable::Songs => "songs",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "requests" => Some(WatchedTable::Requests),
            "hidden_songs" => Some(WatchedTable::HiddenSongs),
            "songs" => Some(WatchedTable::Songs),
            _ => None,
        }
    }
}

impl std::fmt::Display for WatchedTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row-level change type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Insert => "INSERT",
            ChangeKind::Update => "UPDATE",
            ChangeKind::Delete => "DELETE",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "INSERT" => Some(ChangeKind::Insert),
            "UPDATE" => Some(ChangeKind::Update),
            "DELETE" => Some(ChangeKind::Delete),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the row before the change
///
/// Stores may deliver a snapshot with no identifying columns at all, so
/// `id` is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OldRow {
    #[serde(default)]
    pub id: Option<RequestId>,
}

/// One notification from the change channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: WatchedTable,
    pub kind: ChangeKind,
    /// Prior row snapshot, when the store provides one
    #[serde(default)]
    pub old: Option<OldRow>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ChangeEvent {
    /// Build an event stamped with the current time
    pub fn new(table: WatchedTable, kind: ChangeKind, old: Option<OldRow>) -> Self {
        Self {
            table,
            kind,
            old,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Identifier of the removed/changed row, if the payload carries one
    pub fn old_id(&self) -> Option<RequestId> {
        self.old.as_ref().and_then(|old| old.id)
    }
}

/// Change notification bus
///
/// Uses tokio::broadcast internally:
/// - Non-blocking publish (slow subscribers don't block writers)
/// - Multiple concurrent subscribers
/// - Lagged subscribers detect missed events via `RecvError::Lagged`
///
/// Missed events are tolerable: every client also refreshes on a timer.
#[derive(Clone)]
pub struct ChangeBus {
    tx: broadcast::Sender<ChangeEvent>,
    capacity: usize,
}

impl ChangeBus {
    /// Creates a new ChangeBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future change events
    ///
    /// Events published before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }

    /// Publish an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: ChangeEvent,
    ) -> Result<usize, broadcast::error::SendError<ChangeEvent>> {
        self.tx.send(event)
    }

    /// Publish an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: ChangeEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
