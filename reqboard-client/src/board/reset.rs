//! Global reset detection
//!
//! The store has no explicit "all requests cleared" marker. A bulk delete
//! arrives as a DELETE on the requests table without a prior-row snapshot
//! (or with a snapshot that lacks an id), while a row-scoped delete names
//! the removed row. That payload shape is the only reset signal.
//!
//! This is a heuristic: a store that omits old rows for ordinary deletes
//! would trigger spurious resets.
//!
//! A client that was not listening when the clear happened (a one-shot
//! command, a lagged subscriber) catches up by comparing the store's last
//! clear time with the time of its oldest remembered submission.

use crate::board::backend::BoardBackend;
use crate::board::ledger::LocalLedger;
use crate::board::reconcile::Reconciler;
use chrono::{DateTime, Utc};
use reqboard_common::events::{ChangeEvent, ChangeKind, WatchedTable};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

/// How one notification was interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Operator cleared every request
    GlobalReset,
    /// Ordinary insert/update/delete on the requests table
    SingleRowChange,
    /// Change on another watched table
    OtherTable,
}

/// Detector phase, per notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetPhase {
    Idle,
    Classifying,
}

/// Classify a notification by payload shape alone
pub fn classify(event: &ChangeEvent) -> Classification {
    match (event.table, event.kind) {
        (WatchedTable::Requests, ChangeKind::Delete) if event.old_id().is_none() => {
            Classification::GlobalReset
        }
        (WatchedTable::Requests, _) => Classification::SingleRowChange,
        _ => Classification::OtherTable,
    }
}

/// Reacts to global resets by wiping this client's local state
pub struct ResetDetector<B: BoardBackend> {
    ledger: Arc<Mutex<LocalLedger>>,
    reconciler: Arc<Reconciler<B>>,
    phase: Mutex<ResetPhase>,
    resets_seen: AtomicU64,
}

impl<B: BoardBackend> ResetDetector<B> {
    pub fn new(ledger: Arc<Mutex<LocalLedger>>, reconciler: Arc<Reconciler<B>>) -> Self {
        Self {
            ledger,
            reconciler,
            phase: Mutex::new(ResetPhase::Idle),
            resets_seen: AtomicU64::new(0),
        }
    }

    pub async fn phase(&self) -> ResetPhase {
        *self.phase.lock().await
    }

    /// Number of global resets handled since startup
    pub fn resets_seen(&self) -> u64 {
        self.resets_seen.load(Ordering::Relaxed)
    }

    /// Handle one notification
    ///
    /// On a global reset: clear the ledger and its persisted copy, cancel
    /// the highlight, show the reset placeholder and discard any refresh in
    /// flight. Other classifications change nothing here.
    pub async fn handle(&self, event: &ChangeEvent) -> Classification {
        let mut phase = self.phase.lock().await;
        *phase = ResetPhase::Classifying;

        let classification = classify(event);
        debug!(
            "Notification {} {} classified as {:?}",
            event.kind, event.table, classification
        );

        if classification == Classification::GlobalReset {
            info!("Global reset detected, clearing local submissions");
            self.reset_local_state().await;
        }

        *phase = ResetPhase::Idle;
        classification
    }

    /// Apply a clear that happened at `reset_at` if this client missed it
    ///
    /// Submissions remembered since before `reset_at` were wiped on the
    /// server, so local state is reset exactly as for a notification.
    /// Returns whether a reset was applied.
    pub async fn catch_up(&self, reset_at: DateTime<Utc>) -> bool {
        let mut phase = self.phase.lock().await;
        *phase = ResetPhase::Classifying;

        let since = self.ledger.lock().await.since();
        let missed = since.is_some_and(|since| reset_at > since);
        if missed {
            info!("Missed global reset at {}, clearing local submissions", reset_at);
            self.reset_local_state().await;
        }

        *phase = ResetPhase::Idle;
        missed
    }

    async fn reset_local_state(&self) {
        let mut ledger = self.ledger.lock().await;
        if let Err(e) = ledger.clear_all() {
            error!("Failed to erase persisted ledger: {}", e);
        }
        drop(ledger);

        self.reconciler.apply_reset().await;
        self.resets_seen.fetch_add(1, Ordering::Relaxed);
    }
}
