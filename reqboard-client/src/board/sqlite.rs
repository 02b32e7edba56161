//! SQLite-backed board store
//!
//! Implements [`BoardBackend`] over the shared tables. Every write commits
//! together with a row in the `changes` log; the log is then replayed onto
//! this process's [`ChangeBus`]. Writes made by other processes sharing the
//! database file reach the bus through [`SqliteBoard::spawn_change_feed`],
//! which tails the same log. Also carries the operator actions (catalog
//! edits, hiding, request deletion and the bulk clear used as the reset
//! signal).

use crate::board::backend::BoardBackend;
use crate::db::{catalog, changes, hidden, requests};
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqboard_common::events::{ChangeBus, ChangeEvent, ChangeKind, WatchedTable};
use reqboard_common::models::{CatalogEntry, CustomRequest, NewRequest, RequestId, SongId};
use sqlx::{Pool, Sqlite};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Board store over a SQLite pool
#[derive(Clone)]
pub struct SqliteBoard {
    db: Pool<Sqlite>,
    bus: ChangeBus,
    /// Last change log entry published on `bus`
    cursor: Arc<Mutex<i64>>,
}

impl SqliteBoard {
    /// Create a store publishing on `bus`
    ///
    /// Only changes logged after this call are published; history already
    /// in the log is skipped.
    pub async fn new(db: Pool<Sqlite>, bus: ChangeBus) -> Result<Self> {
        let cursor = changes::latest_seq(&db).await?;
        debug!("Change log cursor starts at {}", cursor);
        Ok(Self {
            db,
            bus,
            cursor: Arc::new(Mutex::new(cursor)),
        })
    }

    /// Underlying connection pool
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.db
    }

    /// Change notification bus this store publishes on
    pub fn bus(&self) -> &ChangeBus {
        &self.bus
    }

    /// Publish change log entries not yet seen by this process
    ///
    /// Returns how many events were published.
    pub async fn pump_changes(&self) -> Result<usize> {
        let mut cursor = self.cursor.lock().await;
        let pending = changes::changes_after(&self.db, *cursor).await?;

        let count = pending.len();
        for (seq, event) in pending {
            debug!("Change notification {}: {} {}", seq, event.kind, event.table);
            self.bus.emit_lossy(event);
            *cursor = seq;
        }
        Ok(count)
    }

    /// Poll the change log every `every` until the handle is aborted
    ///
    /// Picks up writes made by other processes on the same database.
    pub fn spawn_change_feed(&self, every: Duration) -> JoinHandle<()> {
        let board = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match board.pump_changes().await {
                    Ok(0) => {}
                    Ok(n) => debug!("Change feed published {} events", n),
                    Err(e) => warn!("Change feed poll failed: {}", e),
                }
            }
        })
    }

    /// Publish after a committed write
    ///
    /// The write already succeeded, so a failed poll is only logged; the
    /// feed or the next write publishes the entry.
    async fn publish(&self) {
        if let Err(e) = self.pump_changes().await {
            warn!("Failed to publish change notification: {}", e);
        }
    }

    /// Operator: add a song to the catalog
    pub async fn add_song(&self, title: &str, artist: Option<&str>) -> Result<SongId> {
        let title = title.trim();
        if title.is_empty() {
            return Err(Error::InvalidInput("song title must not be empty".to_string()));
        }
        let artist = artist.map(str::trim).filter(|a| !a.is_empty());

        let mut tx = self.db.begin().await?;
        let id = catalog::insert_song(&mut tx, title, artist).await?;
        changes::record_change(&mut tx, WatchedTable::Songs, ChangeKind::Insert, None).await?;
        tx.commit().await?;

        info!("Added song {} ({})", id, title);
        self.publish().await;
        Ok(id)
    }

    /// Operator: hide a song from every client
    pub async fn hide_song(&self, song_id: SongId) -> Result<bool> {
        if !catalog::song_exists(&self.db, song_id).await? {
            return Err(Error::NotFound(format!("song {}", song_id)));
        }

        let mut tx = self.db.begin().await?;
        let changed = hidden::hide_song(&mut tx, song_id).await?;
        if changed {
            changes::record_change(&mut tx, WatchedTable::HiddenSongs, ChangeKind::Insert, None)
                .await?;
        }
        tx.commit().await?;

        if changed {
            info!("Song {} hidden", song_id);
            self.publish().await;
        }
        Ok(changed)
    }

    /// Operator: make a hidden song visible again
    pub async fn unhide_song(&self, song_id: SongId) -> Result<bool> {
        let mut tx = self.db.begin().await?;
        let changed = hidden::unhide_song(&mut tx, song_id).await?;
        if changed {
            changes::record_change(
                &mut tx,
                WatchedTable::HiddenSongs,
                ChangeKind::Delete,
                Some(song_id),
            )
            .await?;
        }
        tx.commit().await?;

        if changed {
            info!("Song {} unhidden", song_id);
            self.publish().await;
        }
        Ok(changed)
    }

    /// Operator: delete a single request row
    ///
    /// The notification carries the removed row's id, so clients treat it
    /// as an ordinary change.
    pub async fn delete_request(&self, request_id: RequestId) -> Result<bool> {
        let mut tx = self.db.begin().await?;
        let changed = requests::delete_request(&mut tx, request_id).await?;
        if changed {
            changes::record_change(
                &mut tx,
                WatchedTable::Requests,
                ChangeKind::Delete,
                Some(request_id),
            )
            .await?;
        }
        tx.commit().await?;

        if changed {
            info!("Request {} deleted", request_id);
            self.publish().await;
        }
        Ok(changed)
    }

    /// Operator: delete every request row
    ///
    /// Logs a DELETE without a prior-row id, the payload shape clients
    /// interpret as a global reset. Older log entries are pruned.
    pub async fn clear_requests(&self) -> Result<u64> {
        let mut tx = self.db.begin().await?;
        let removed = requests::clear_requests(&mut tx).await?;
        let seq =
            changes::record_change(&mut tx, WatchedTable::Requests, ChangeKind::Delete, None)
                .await?;
        let pruned = changes::prune_before(&mut tx, seq).await?;
        tx.commit().await?;

        info!(
            "Cleared all requests ({} rows, {} change log entries pruned)",
            removed, pruned
        );
        self.publish().await;
        Ok(removed)
    }

    /// Total number of request rows
    pub async fn total_requests(&self) -> Result<u64> {
        requests::count_requests(&self.db).await
    }
}

#[async_trait]
impl BoardBackend for SqliteBoard {
    async fn hidden_song_ids(&self) -> Result<HashSet<SongId>> {
        hidden::get_hidden_ids(&self.db).await
    }

    async fn catalog_with_counts(&self) -> Result<Vec<CatalogEntry>> {
        catalog::get_catalog_with_counts(&self.db).await
    }

    async fn custom_queue(&self) -> Result<Vec<CustomRequest>> {
        requests::get_custom_queue(&self.db).await
    }

    async fn insert_request(&self, request: NewRequest) -> Result<RequestId> {
        if let NewRequest::Song { song_id } = &request {
            if !catalog::song_exists(&self.db, *song_id).await? {
                return Err(Error::NotFound(format!("song {}", song_id)));
            }
        }

        let mut tx = self.db.begin().await?;
        let id = requests::insert_request(&mut tx, &request).await?;
        changes::record_change(&mut tx, WatchedTable::Requests, ChangeKind::Insert, None).await?;
        tx.commit().await?;

        debug!("Request {} stored", id);
        self.publish().await;
        Ok(id)
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.bus.subscribe()
    }

    async fn last_reset_at(&self) -> Result<Option<DateTime<Utc>>> {
        changes::last_reset_at(&self.db).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqboard_common::db::open_in_memory;

    async fn board() -> SqliteBoard {
        let pool = open_in_memory().await.unwrap();
        SqliteBoard::new(pool, ChangeBus::new(32)).await.unwrap()
    }

    #[tokio::test]
    async fn test_counts_follow_ledger() {
        let board = board().await;
        let a = board.add_song("Song A", None).await.unwrap();
        let b = board.add_song("Song B", Some("Band")).await.unwrap();

        for _ in 0..3 {
            board.insert_request(NewRequest::Song { song_id: a }).await.unwrap();
        }
        board.insert_request(NewRequest::Song { song_id: b }).await.unwrap();
        board
            .insert_request(NewRequest::Custom {
                title: "Happy Birthday".into(),
                artist: None,
            })
            .await
            .unwrap();

        let catalog = board.catalog_with_counts().await.unwrap();
        let count = |id| {
            catalog
                .iter()
                .find(|e| e.song.id == id)
                .map(|e| e.request_count)
                .unwrap()
        };
        assert_eq!(count(a), 3);
        assert_eq!(count(b), 1);
        // Free-text rows are not attributed to any song
        assert_eq!(board.total_requests().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_custom_queue_newest_first() {
        let board = board().await;
        let first = board
            .insert_request(NewRequest::Custom { title: "First".into(), artist: None })
            .await
            .unwrap();
        let second = board
            .insert_request(NewRequest::Custom {
                title: "Second".into(),
                artist: Some("Someone".into()),
            })
            .await
            .unwrap();

        let queue = board.custom_queue().await.unwrap();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue[0].id, second);
        assert_eq!(queue[0].artist.as_deref(), Some("Someone"));
        assert_eq!(queue[1].id, first);
    }

    #[tokio::test]
    async fn test_request_for_unknown_song_rejected() {
        let board = board().await;
        let result = board.insert_request(NewRequest::Song { song_id: 99 }).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
        assert_eq!(board.total_requests().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_clear_emits_delete_without_old_row() {
        let board = board().await;
        let song = board.add_song("Song A", None).await.unwrap();
        board.insert_request(NewRequest::Song { song_id: song }).await.unwrap();

        let mut rx = board.subscribe();
        assert_eq!(board.clear_requests().await.unwrap(), 1);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.table, WatchedTable::Requests);
        assert_eq!(event.kind, ChangeKind::Delete);
        assert!(event.old.is_none());
    }

    #[tokio::test]
    async fn test_single_delete_carries_old_id() {
        let board = board().await;
        let song = board.add_song("Song A", None).await.unwrap();
        let request = board.insert_request(NewRequest::Song { song_id: song }).await.unwrap();

        let mut rx = board.subscribe();
        assert!(board.delete_request(request).await.unwrap());

        let event = rx.recv().await.unwrap();
        assert_eq!(event.old_id(), Some(request));
        // Deleting again is a no-op without a notification
        assert!(!board.delete_request(request).await.unwrap());
    }

    #[tokio::test]
    async fn test_every_write_logged_once() {
        let board = board().await;
        let song = board.add_song("Song A", None).await.unwrap();
        let request = board.insert_request(NewRequest::Song { song_id: song }).await.unwrap();
        board.hide_song(song).await.unwrap();
        board.delete_request(request).await.unwrap();

        let logged = changes::changes_after(board.pool(), 0).await.unwrap();
        let shapes: Vec<_> = logged
            .iter()
            .map(|(_, e)| (e.table, e.kind, e.old_id()))
            .collect();
        assert_eq!(
            shapes,
            vec![
                (WatchedTable::Songs, ChangeKind::Insert, None),
                (WatchedTable::Requests, ChangeKind::Insert, None),
                (WatchedTable::HiddenSongs, ChangeKind::Insert, None),
                (WatchedTable::Requests, ChangeKind::Delete, Some(request)),
            ]
        );

        // Already published as they were written
        assert_eq!(board.pump_changes().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_clear_prunes_log_and_records_reset_time() {
        let board = board().await;
        assert!(board.last_reset_at().await.unwrap().is_none());

        let song = board.add_song("Song A", None).await.unwrap();
        board.insert_request(NewRequest::Song { song_id: song }).await.unwrap();
        let before = Utc::now();
        board.clear_requests().await.unwrap();

        let reset_at = board.last_reset_at().await.unwrap().unwrap();
        assert!(reset_at >= before);

        let logged = changes::changes_after(board.pool(), 0).await.unwrap();
        assert_eq!(logged.len(), 1);
        assert!(logged[0].1.old.is_none());
    }

    #[tokio::test]
    async fn test_new_store_skips_existing_history() {
        let board = board().await;
        board.add_song("Song A", None).await.unwrap();

        let second = SqliteBoard::new(board.pool().clone(), ChangeBus::new(8))
            .await
            .unwrap();
        let mut rx = second.subscribe();
        assert_eq!(second.pump_changes().await.unwrap(), 0);

        board.add_song("Song B", None).await.unwrap();
        assert_eq!(second.pump_changes().await.unwrap(), 1);
        assert_eq!(rx.recv().await.unwrap().table, WatchedTable::Songs);
    }

    #[tokio::test]
    async fn test_hide_and_unhide() {
        let board = board().await;
        let song = board.add_song("Song A", None).await.unwrap();

        assert!(board.hide_song(song).await.unwrap());
        assert!(!board.hide_song(song).await.unwrap());
        assert!(board.hidden_song_ids().await.unwrap().contains(&song));

        assert!(board.unhide_song(song).await.unwrap());
        assert!(board.hidden_song_ids().await.unwrap().is_empty());

        assert!(matches!(board.hide_song(1234).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_blank_song_title_rejected() {
        let board = board().await;
        assert!(matches!(
            board.add_song("   ", None).await,
            Err(Error::InvalidInput(_))
        ));
    }
}
