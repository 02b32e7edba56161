//! Submission controller
//!
//! Gates one request attempt on input validity, quota and duplicate rules,
//! writes it to the request ledger, and records it locally only after the
//! store confirms the write.
//!
//! Quota and dedup are enforced purely from client-held state. Clearing
//! that state bypasses them; the store does not second-guess clients.

use crate::board::backend::BoardBackend;
use crate::board::ledger::{LedgerEntry, LocalLedger};
use crate::error::SubmitError;
use reqboard_common::config::BoardConfig;
use reqboard_common::models::{NewRequest, RequestId, SongId};
use std::collections::HashSet;
use std::sync::{Arc, PoisonError};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// What the user asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestTarget {
    Song(SongId),
    Custom {
        title: String,
        artist: Option<String>,
    },
}

impl RequestTarget {
    pub fn custom(title: impl Into<String>, artist: Option<&str>) -> Self {
        RequestTarget::Custom {
            title: title.into(),
            artist: artist.map(str::to_string),
        }
    }
}

/// A confirmed submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    /// Entry recorded in the local ledger
    pub entry: LedgerEntry,
    /// Request row created in the store
    pub request_id: RequestId,
    /// Local ledger size after recording
    pub ledger_size: usize,
}

/// The control a submission comes from; one attempt per control at a time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Control {
    SongButton(SongId),
    CustomForm,
}

/// Marks a control busy; re-enables it on every exit path
struct InFlightGuard<'a> {
    pending: &'a std::sync::Mutex<HashSet<Control>>,
    control: Control,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.control);
    }
}

/// Executes request attempts for one client
pub struct Submitter<B: BoardBackend> {
    backend: Arc<B>,
    ledger: Arc<Mutex<LocalLedger>>,
    max_requests: u32,
    one_request_per_song: bool,
    custom_enabled: bool,
    min_custom_title_chars: usize,
    pending: std::sync::Mutex<HashSet<Control>>,
}

impl<B: BoardBackend> Submitter<B> {
    pub fn new(backend: Arc<B>, ledger: Arc<Mutex<LocalLedger>>, config: &BoardConfig) -> Self {
        Self {
            backend,
            ledger,
            max_requests: config.max_requests_per_user,
            one_request_per_song: config.one_request_per_song,
            custom_enabled: config.custom_requests_enabled,
            min_custom_title_chars: config.min_custom_title_chars,
            pending: std::sync::Mutex::new(HashSet::new()),
        }
    }

    /// Whether a submission from the control for `target` is in flight
    pub fn is_pending(&self, target: &RequestTarget) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&control_for(target))
    }

    /// Attempt one submission
    ///
    /// Checks, in order: input validity, quota (in-flight attempts count
    /// against it), per-song duplicate. Nothing is written and nothing is
    /// recorded unless all checks pass.
    pub async fn submit(&self, target: RequestTarget) -> Result<Submission, SubmitError> {
        let control = control_for(&target);
        let request = self.validate(target)?;

        let _guard = self.reserve(&request, control).await?;

        let request_id = match self.backend.insert_request(request.clone()).await {
            Ok(id) => id,
            Err(e) => {
                warn!("Request write failed, nothing recorded: {}", e);
                return Err(SubmitError::Failed(e));
            }
        };

        let entry = match request {
            NewRequest::Song { song_id } => LedgerEntry::Song(song_id),
            NewRequest::Custom { .. } => LedgerEntry::Custom(request_id),
        };

        let mut ledger = self.ledger.lock().await;
        if let Err(e) = ledger.append(entry) {
            // The store already has the row; keep the in-memory record
            error!("Request {} stored but ledger not persisted: {}", request_id, e);
        }
        let ledger_size = ledger.size();
        drop(ledger);

        info!(
            "Request {} submitted ({:?}), {}/{} used",
            request_id, entry, ledger_size, self.max_requests
        );

        Ok(Submission {
            entry,
            request_id,
            ledger_size,
        })
    }

    fn validate(&self, target: RequestTarget) -> Result<NewRequest, SubmitError> {
        match target {
            RequestTarget::Song(song_id) => Ok(NewRequest::Song { song_id }),
            RequestTarget::Custom { title, artist } => {
                if !self.custom_enabled {
                    return Err(SubmitError::InvalidInput(
                        "custom requests are disabled".to_string(),
                    ));
                }

                let title = title.trim();
                if title.is_empty() {
                    return Err(SubmitError::InvalidInput("title is empty".to_string()));
                }
                if title.chars().count() < self.min_custom_title_chars {
                    return Err(SubmitError::InvalidInput(format!(
                        "title must be at least {} characters",
                        self.min_custom_title_chars
                    )));
                }

                let artist = artist
                    .map(|a| a.trim().to_string())
                    .filter(|a| !a.is_empty());

                Ok(NewRequest::Custom {
                    title: title.to_string(),
                    artist,
                })
            }
        }
    }

    /// Quota and duplicate checks, then mark the control busy
    async fn reserve(
        &self,
        request: &NewRequest,
        control: Control,
    ) -> Result<InFlightGuard<'_>, SubmitError> {
        let ledger = self.ledger.lock().await;
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);

        if ledger.size() + pending.len() >= self.max_requests as usize {
            info!(
                "Request rejected: limit of {} reached ({} recorded, {} in flight)",
                self.max_requests,
                ledger.size(),
                pending.len()
            );
            return Err(SubmitError::QuotaExceeded {
                limit: self.max_requests,
            });
        }

        if let NewRequest::Song { song_id } = request {
            if self.one_request_per_song && ledger.contains(LedgerEntry::Song(*song_id)) {
                info!("Request rejected: song {} already requested", song_id);
                return Err(SubmitError::Duplicate(*song_id));
            }
        }

        if !pending.insert(control) {
            return Err(SubmitError::InFlight);
        }

        Ok(InFlightGuard {
            pending: &self.pending,
            control,
        })
    }
}

fn control_for(target: &RequestTarget) -> Control {
    match target {
        RequestTarget::Song(song_id) => Control::SongButton(*song_id),
        RequestTarget::Custom { .. } => Control::CustomForm,
    }
}
