//! Error types for reqboard-client
//!
//! Store and persistence failures use the shared `reqboard_common::Error`.
//! Submission attempts get their own taxonomy so callers can tell a
//! rejected request (no retry needed) from a failed write (retry later).

use reqboard_common::models::SongId;
use thiserror::Error;

pub use reqboard_common::{Error, Result};

/// Outcome of a rejected or failed submission attempt
///
/// Every variant guarantees that neither the local ledger nor the
/// request ledger was modified.
#[derive(Error, Debug)]
pub enum SubmitError {
    /// Free text empty/too short, or free text disabled
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// This client already used its whole quota
    #[error("Request limit reached ({limit} requests per user)")]
    QuotaExceeded { limit: u32 },

    /// Song already requested by this client (one-request-per-song mode)
    #[error("Song {0} already requested")]
    Duplicate(SongId),

    /// The same control already has a submission in flight
    #[error("A submission for this item is already in progress")]
    InFlight,

    /// Write rejected or store unreachable
    #[error("Submission failed: {0}")]
    Failed(#[source] Error),
}

impl SubmitError {
    /// Whether the same submission may succeed if attempted again later
    pub fn is_retryable(&self) -> bool {
        matches!(self, SubmitError::Failed(_) | SubmitError::InFlight)
    }
}
