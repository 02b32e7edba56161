//! Board store interface
//!
//! Everything the client core needs from the shared store: three reads,
//! one append, a change subscription and the time of the last bulk clear. The store itself performs no
//! validation of who submits what.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqboard_common::events::ChangeEvent;
use reqboard_common::models::{CatalogEntry, CustomRequest, NewRequest, RequestId, SongId};
use std::collections::HashSet;
use tokio::sync::broadcast;

/// Shared store seen by every client
#[async_trait]
pub trait BoardBackend: Send + Sync + 'static {
    /// Identifiers of songs the operator has hidden
    async fn hidden_song_ids(&self) -> Result<HashSet<SongId>>;

    /// All cataloged songs with their ledger-derived request counts
    async fn catalog_with_counts(&self) -> Result<Vec<CatalogEntry>>;

    /// Pending free-text requests, newest first
    async fn custom_queue(&self) -> Result<Vec<CustomRequest>>;

    /// Append a request row and return its identifier once confirmed
    async fn insert_request(&self, request: NewRequest) -> Result<RequestId>;

    /// Subscribe to change notifications on the watched tables
    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent>;

    /// When the requests were last cleared in bulk, if the store keeps
    /// that history
    ///
    /// Lets a client that was not listening at the time notice a reset.
    async fn last_reset_at(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(None)
    }
}
