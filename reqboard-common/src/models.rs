//! Request board data models
//!
//! Rows as they are read from (and written to) the shared board store.
//! Counts are always derived from the `requests` table, never stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Catalog song identifier
pub type SongId = i64;

/// Request row identifier
pub type RequestId = i64;

/// A cataloged song
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Song {
    pub id: SongId,
    pub title: String,
    pub artist: Option<String>,
}

/// A song together with the number of requests referencing it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub song: Song,
    pub request_count: u64,
}

/// A pending free-text request (a `requests` row whose `song_id` is null)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomRequest {
    pub id: RequestId,
    pub title: String,
    pub artist: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for the request ledger
///
/// Exactly one of a song reference or a custom title is carried, which the
/// enum shape enforces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NewRequest {
    Song {
        song_id: SongId,
    },
    Custom {
        title: String,
        artist: Option<String>,
    },
}

impl NewRequest {
    /// Column values in `(song_id, custom_title, custom_artist)` order
    pub fn columns(&self) -> (Option<SongId>, Option<&str>, Option<&str>) {
        match self {
            NewRequest::Song { song_id } => (Some(*song_id), None, None),
            NewRequest::Custom { title, artist } => (None, Some(title.as_str()), artist.as_deref()),
        }
    }
}
