//! Reconciliation engine
//!
//! Combines the hidden set, the catalog with counts and the free-text queue
//! with this client's local ledger into one ordered view.
//!
//! Refreshes may overlap (timer tick, notification, post-submit). Each
//! refresh takes a sequence number before reading; its result is applied
//! only if no newer refresh or reset has been applied in the meantime.

use crate::board::backend::BoardBackend;
use crate::board::ledger::{LedgerEntry, LocalLedger, SubmittedIds};
use crate::error::Result;
use reqboard_common::config::BoardConfig;
use reqboard_common::models::{CatalogEntry, CustomRequest, SongId};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;
use tracing::{debug, warn};

/// One row of the reconciled list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewEntry {
    pub key: LedgerEntry,
    pub title: String,
    pub artist: Option<String>,
    /// Ledger-derived count; always 1 for a free-text entry
    pub request_count: u64,
    /// This client has this item in its local ledger
    pub requested_by_me: bool,
    /// This client's own last submission, inside the highlight window
    pub newly_submitted: bool,
}

impl ViewEntry {
    pub fn is_custom(&self) -> bool {
        matches!(self.key, LedgerEntry::Custom(_))
    }

    /// Case-insensitive substring match on title or artist
    pub fn matches(&self, term: &str) -> bool {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return true;
        }
        self.title.to_lowercase().contains(&term)
            || self
                .artist
                .as_ref()
                .is_some_and(|artist| artist.to_lowercase().contains(&term))
    }
}

/// Result of one successful refresh
///
/// `==` compares `seq` too, so two refreshes of an unchanged board are not
/// equal. Use [`ReconciledView::same_content`] to compare what is shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciledView {
    /// Sequence number of the refresh that produced this view
    pub seq: u64,
    /// Free-text entries first (newest first), then songs by popularity
    pub entries: Vec<ViewEntry>,
    /// All request rows, cataloged and free-text, hidden songs included
    pub total_requests: u64,
}

impl ReconciledView {
    /// Same entries and total, whichever refresh produced them
    pub fn same_content(&self, other: &Self) -> bool {
        self.entries == other.entries && self.total_requests == other.total_requests
    }

    /// Entries matching a search term (all entries for an empty term)
    pub fn filtered(&self, term: &str) -> Vec<&ViewEntry> {
        self.entries.iter().filter(|e| e.matches(term)).collect()
    }

    pub fn song(&self, song_id: SongId) -> Option<&ViewEntry> {
        self.entries
            .iter()
            .find(|e| e.key == LedgerEntry::Song(song_id))
    }

    pub fn custom_entries(&self) -> impl Iterator<Item = &ViewEntry> {
        self.entries.iter().filter(|e| e.is_custom())
    }

    pub fn song_entries(&self) -> impl Iterator<Item = &ViewEntry> {
        self.entries.iter().filter(|e| !e.is_custom())
    }
}

/// What the presentation layer should show
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardView {
    /// No refresh has completed yet
    Loading,
    /// A global reset was detected; waiting for the next refresh
    Resetting,
    Ready(Arc<ReconciledView>),
}

impl BoardView {
    pub fn ready(&self) -> Option<&Arc<ReconciledView>> {
        match self {
            BoardView::Ready(view) => Some(view),
            _ => None,
        }
    }
}

/// Outcome of a refresh whose reads succeeded
#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    /// The view was replaced
    Applied(Arc<ReconciledView>),
    /// A newer refresh or a reset was applied first; result dropped
    Discarded { seq: u64 },
}

impl RefreshOutcome {
    pub fn view(&self) -> Option<&Arc<ReconciledView>> {
        match self {
            RefreshOutcome::Applied(view) => Some(view),
            RefreshOutcome::Discarded { .. } => None,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, RefreshOutcome::Applied(_))
    }
}

#[derive(Debug, Clone, Copy)]
struct Highlight {
    key: LedgerEntry,
    since: Instant,
}

/// Owns the displayed view and produces new ones
pub struct Reconciler<B: BoardBackend> {
    backend: Arc<B>,
    ledger: Arc<Mutex<LocalLedger>>,
    custom_enabled: bool,
    highlight_window: Duration,
    next_seq: AtomicU64,
    /// Sequence number of the last applied refresh or reset
    applied_seq: Mutex<u64>,
    highlight: Mutex<Option<Highlight>>,
    view_tx: watch::Sender<BoardView>,
}

impl<B: BoardBackend> Reconciler<B> {
    pub fn new(backend: Arc<B>, ledger: Arc<Mutex<LocalLedger>>, config: &BoardConfig) -> Self {
        let (view_tx, _) = watch::channel(BoardView::Loading);
        Self {
            backend,
            ledger,
            custom_enabled: config.custom_requests_enabled,
            highlight_window: config.highlight_window(),
            next_seq: AtomicU64::new(0),
            applied_seq: Mutex::new(0),
            highlight: Mutex::new(None),
            view_tx,
        }
    }

    /// Current view snapshot
    pub fn view(&self) -> BoardView {
        self.view_tx.borrow().clone()
    }

    /// Receiver notified whenever the displayed view changes
    pub fn subscribe(&self) -> watch::Receiver<BoardView> {
        self.view_tx.subscribe()
    }

    fn take_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Read current server state and rebuild the view
    ///
    /// On a read failure the displayed view is left untouched and the error
    /// is returned for the caller to log or retry.
    pub async fn refresh(&self) -> Result<RefreshOutcome> {
        let seq = self.take_seq();
        debug!("Refresh {} started", seq);

        let custom_reads = async {
            if self.custom_enabled {
                self.backend.custom_queue().await
            } else {
                Ok(Vec::new())
            }
        };

        let (hidden, catalog, custom) = match tokio::try_join!(
            self.backend.hidden_song_ids(),
            self.backend.catalog_with_counts(),
            custom_reads,
        ) {
            Ok(reads) => reads,
            Err(e) => {
                warn!("Refresh {} failed, keeping previous view: {}", seq, e);
                return Err(e);
            }
        };

        let mine = self.ledger.lock().await.snapshot();
        let highlighted = self.active_highlight().await;

        let view = Arc::new(build_view(
            seq,
            &hidden,
            catalog,
            custom,
            &mine,
            highlighted,
        ));

        let mut applied = self.applied_seq.lock().await;
        if seq <= *applied {
            debug!("Refresh {} discarded (already at {})", seq, *applied);
            return Ok(RefreshOutcome::Discarded { seq });
        }
        *applied = seq;
        self.view_tx.send_replace(BoardView::Ready(Arc::clone(&view)));
        drop(applied);

        debug!("Refresh {} applied ({} entries)", seq, view.entries.len());
        Ok(RefreshOutcome::Applied(view))
    }

    /// Highlight this client's own submission for the configured window
    pub async fn mark_submitted(&self, key: LedgerEntry) {
        *self.highlight.lock().await = Some(Highlight {
            key,
            since: Instant::now(),
        });
    }

    pub async fn cancel_highlight(&self) {
        *self.highlight.lock().await = None;
    }

    async fn active_highlight(&self) -> Option<LedgerEntry> {
        let mut highlight = self.highlight.lock().await;
        match *highlight {
            Some(h) if h.since.elapsed() < self.highlight_window => Some(h.key),
            Some(_) => {
                *highlight = None;
                None
            }
            None => None,
        }
    }

    /// Show the reset placeholder and drop every refresh still in flight
    pub async fn apply_reset(&self) {
        self.cancel_highlight().await;

        let seq = self.take_seq();
        let mut applied = self.applied_seq.lock().await;
        *applied = seq;
        self.view_tx.send_replace(BoardView::Resetting);
        debug!("Reset applied at {}", seq);
    }
}

/// Merge server reads and local state into an ordered view
///
/// Hidden songs are dropped regardless of count. Free-text entries keep the
/// queue's newest-first order and come first; songs follow by descending
/// count, then title (case-insensitive), then id.
pub fn build_view(
    seq: u64,
    hidden: &HashSet<SongId>,
    catalog: Vec<CatalogEntry>,
    custom: Vec<CustomRequest>,
    mine: &SubmittedIds,
    highlighted: Option<LedgerEntry>,
) -> ReconciledView {
    let total_requests =
        catalog.iter().map(|e| e.request_count).sum::<u64>() + custom.len() as u64;

    let mut songs: Vec<ViewEntry> = catalog
        .into_iter()
        .filter(|entry| !hidden.contains(&entry.song.id))
        .map(|entry| {
            let key = LedgerEntry::Song(entry.song.id);
            ViewEntry {
                key,
                title: entry.song.title,
                artist: entry.song.artist,
                request_count: entry.request_count,
                requested_by_me: mine.contains(key),
                newly_submitted: highlighted == Some(key),
            }
        })
        .collect();

    songs.sort_by(|a, b| {
        b.request_count
            .cmp(&a.request_count)
            .then_with(|| a.title.to_lowercase().cmp(&b.title.to_lowercase()))
            .then_with(|| a.title.cmp(&b.title))
            .then_with(|| a.key.cmp(&b.key))
    });

    let mut entries: Vec<ViewEntry> = custom
        .into_iter()
        .map(|request| {
            let key = LedgerEntry::Custom(request.id);
            ViewEntry {
                key,
                title: request.title,
                artist: request.artist,
                request_count: 1,
                requested_by_me: mine.contains(key),
                newly_submitted: highlighted == Some(key),
            }
        })
        .collect();
    entries.extend(songs);

    ReconciledView {
        seq,
        entries,
        total_requests,
    }
}
