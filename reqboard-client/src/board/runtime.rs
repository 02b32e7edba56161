//! Board client runtime
//!
//! Wires the local ledger, reconciler, submission controller and reset
//! detector together, and drives refreshes from two independent sources:
//! the backstop timer and the change notification channel. Neither source
//! suppresses the other; overlapping refreshes are resolved by the
//! reconciler's sequence check. Backstop refreshes first check the store
//! for a reset the notification channel did not deliver.

use crate::board::backend::BoardBackend;
use crate::board::ledger::{LedgerStore, LocalLedger, SubmittedIds};
use crate::board::reconcile::{BoardView, Reconciler, RefreshOutcome};
use crate::board::reset::{Classification, ResetDetector};
use crate::board::submission::{RequestTarget, Submission, Submitter};
use crate::error::{Result, SubmitError};
use reqboard_common::config::BoardConfig;
use reqboard_common::events::ChangeEvent;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// One anonymous client of the request board
pub struct BoardClient<B: BoardBackend> {
    config: BoardConfig,
    ledger: Arc<Mutex<LocalLedger>>,
    reconciler: Arc<Reconciler<B>>,
    submitter: Submitter<B>,
    reset: ResetDetector<B>,
    backend: Arc<B>,
}

impl<B: BoardBackend> BoardClient<B> {
    /// Create a client, loading its persisted ledger from `store`
    pub fn new(backend: Arc<B>, store: Box<dyn LedgerStore>, config: BoardConfig) -> Self {
        let ledger = Arc::new(Mutex::new(LocalLedger::load(store, config.ledger_key.clone())));
        let reconciler = Arc::new(Reconciler::new(
            Arc::clone(&backend),
            Arc::clone(&ledger),
            &config,
        ));
        let submitter = Submitter::new(Arc::clone(&backend), Arc::clone(&ledger), &config);
        let reset = ResetDetector::new(Arc::clone(&ledger), Arc::clone(&reconciler));

        Self {
            config,
            ledger,
            reconciler,
            submitter,
            reset,
            backend,
        }
    }

    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Current view snapshot
    pub fn view(&self) -> BoardView {
        self.reconciler.view()
    }

    /// Receiver notified whenever the displayed view changes
    pub fn subscribe_view(&self) -> watch::Receiver<BoardView> {
        self.reconciler.subscribe()
    }

    pub async fn ledger_size(&self) -> usize {
        self.ledger.lock().await.size()
    }

    pub async fn ledger_snapshot(&self) -> SubmittedIds {
        self.ledger.lock().await.snapshot()
    }

    /// Requests this client may still make
    pub async fn remaining_quota(&self) -> usize {
        (self.config.max_requests_per_user as usize).saturating_sub(self.ledger_size().await)
    }

    /// Number of global resets handled since startup
    pub fn resets_seen(&self) -> u64 {
        self.reset.resets_seen()
    }

    /// Whether the control for `target` is currently disabled
    pub fn is_pending(&self, target: &RequestTarget) -> bool {
        self.submitter.is_pending(target)
    }

    /// Rebuild the view from current server state
    pub async fn refresh(&self) -> Result<RefreshOutcome> {
        self.reconciler.refresh().await
    }

    /// Submit a request, then highlight and refresh on success
    ///
    /// A failed post-submit refresh is logged only; the submission itself
    /// already succeeded and the timer will catch up.
    pub async fn submit(&self, target: RequestTarget) -> std::result::Result<Submission, SubmitError> {
        let submission = self.submitter.submit(target).await?;

        self.reconciler.mark_submitted(submission.entry).await;
        if let Err(e) = self.reconciler.refresh().await {
            warn!("Post-submit refresh failed: {}", e);
        }

        Ok(submission)
    }

    /// Apply a global reset this client was not notified of
    ///
    /// Asks the store when requests were last cleared. Returns whether a
    /// reset was applied; the caller refreshes afterwards.
    pub async fn catch_up_resets(&self) -> Result<bool> {
        match self.backend.last_reset_at().await? {
            Some(reset_at) => Ok(self.reset.catch_up(reset_at).await),
            None => Ok(false),
        }
    }

    /// React to one change notification
    ///
    /// Resets are handled first; every notification then triggers a
    /// refresh. A failed refresh is logged and left to the next trigger.
    pub async fn handle_change(&self, event: &ChangeEvent) -> Classification {
        let classification = self.reset.handle(event).await;

        if let Err(e) = self.reconciler.refresh().await {
            warn!("Refresh after {} {} failed: {}", event.kind, event.table, e);
        }

        classification
    }

    /// Run the refresh loop until `shutdown` completes
    ///
    /// Performs an initial refresh, then refreshes on every timer tick and
    /// every notification. If the notification channel closes, the timer
    /// keeps the view converging.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) {
        let mut changes = self.backend.subscribe();
        let mut changes_open = true;

        let mut timer = interval(self.config.refresh_interval());
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "Board client running (refresh every {}s, limit {} requests)",
            self.config.refresh_interval_secs, self.config.max_requests_per_user
        );

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Board client stopping");
                    break;
                }
                _ = timer.tick() => {
                    debug!("Timer refresh");
                    self.backstop_refresh("timer").await;
                }
                received = changes.recv(), if changes_open => {
                    match received {
                        Ok(event) => {
                            self.handle_change(&event).await;
                        }
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            // A missed event may have been a reset
                            warn!("Missed {} change notifications, refreshing", missed);
                            self.backstop_refresh("lag").await;
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            warn!("Change notification channel closed, relying on timer");
                            changes_open = false;
                        }
                    }
                }
            }
        }
    }

    /// Catch up on missed resets, then refresh
    async fn backstop_refresh(&self, trigger: &str) {
        if let Err(e) = self.catch_up_resets().await {
            warn!("Reset check after {} failed: {}", trigger, e);
        }
        if let Err(e) = self.reconciler.refresh().await {
            warn!("Refresh after {} failed: {}", trigger, e);
        }
    }
}
