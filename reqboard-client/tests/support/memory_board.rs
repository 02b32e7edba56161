//! In-process board store with fault injection
//!
//! Mirrors SqliteBoard's notification behaviour (every write publishes a
//! ChangeEvent) without a database, so tests can fail reads or writes on
//! demand and hold a catalog read or a write open to create overlapping
//! refreshes and in-flight submissions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqboard_client::board::BoardBackend;
use reqboard_client::Error;
use reqboard_common::events::{ChangeBus, ChangeEvent, ChangeKind, OldRow, WatchedTable};
use reqboard_common::models::{CatalogEntry, CustomRequest, NewRequest, RequestId, Song, SongId};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, Notify};

struct RequestRow {
    id: RequestId,
    song_id: Option<SongId>,
    custom_title: Option<String>,
    custom_artist: Option<String>,
    created_at: chrono::DateTime<Utc>,
}

#[derive(Default)]
struct BoardData {
    songs: Vec<Song>,
    hidden: HashSet<SongId>,
    requests: Vec<RequestRow>,
    next_request_id: RequestId,
    last_reset: Option<DateTime<Utc>>,
}

/// Pauses one store call until released
pub struct ReadGate {
    /// Signalled once the held call has started
    pub entered: Notify,
    /// Notify to let the held call finish
    pub release: Notify,
}

pub struct MemoryBoard {
    data: Mutex<BoardData>,
    bus: ChangeBus,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    write_attempts: AtomicUsize,
    catalog_gate: Mutex<Option<Arc<ReadGate>>>,
    write_gate: Mutex<Option<Arc<ReadGate>>>,
}

impl MemoryBoard {
    pub fn new() -> Self {
        Self {
            data: Mutex::new(BoardData {
                next_request_id: 1000,
                ..BoardData::default()
            }),
            bus: ChangeBus::new(64),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            write_attempts: AtomicUsize::new(0),
            catalog_gate: Mutex::new(None),
            write_gate: Mutex::new(None),
        }
    }

    /// Board with songs `(id, title)` and no requests
    pub fn with_songs(songs: &[(SongId, &str)]) -> Self {
        let board = Self::new();
        for (id, title) in songs {
            board.add_song(*id, title, None);
        }
        board
    }

    pub fn add_song(&self, id: SongId, title: &str, artist: Option<&str>) {
        self.data.lock().unwrap().songs.push(Song {
            id,
            title: title.to_string(),
            artist: artist.map(str::to_string),
        });
    }

    /// Requests written by other clients (no notification)
    pub fn seed_requests(&self, song_id: SongId, count: usize) {
        let mut data = self.data.lock().unwrap();
        for _ in 0..count {
            let id = data.next_request_id;
            data.next_request_id += 1;
            data.requests.push(RequestRow {
                id,
                song_id: Some(song_id),
                custom_title: None,
                custom_artist: None,
                created_at: Utc::now(),
            });
        }
    }

    pub fn hide(&self, song_id: SongId) {
        self.data.lock().unwrap().hidden.insert(song_id);
        self.bus
            .emit_lossy(ChangeEvent::new(WatchedTable::HiddenSongs, ChangeKind::Insert, None));
    }

    /// Operator bulk clear: DELETE without old row
    pub fn clear_requests(&self) {
        self.clear_requests_unannounced();
        self.bus
            .emit_lossy(ChangeEvent::new(WatchedTable::Requests, ChangeKind::Delete, None));
    }

    /// Bulk clear whose notification never reaches this process
    pub fn clear_requests_unannounced(&self) {
        let mut data = self.data.lock().unwrap();
        data.requests.clear();
        data.last_reset = Some(Utc::now());
    }

    /// Publish an arbitrary notification
    pub fn emit(&self, event: ChangeEvent) {
        self.bus.emit_lossy(event);
    }

    pub fn delete_request(&self, id: RequestId) {
        self.data.lock().unwrap().requests.retain(|r| r.id != id);
        self.bus.emit_lossy(ChangeEvent::new(
            WatchedTable::Requests,
            ChangeKind::Delete,
            Some(OldRow { id: Some(id) }),
        ));
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Insert attempts that reached the store (failed ones included)
    pub fn write_attempts(&self) -> usize {
        self.write_attempts.load(Ordering::SeqCst)
    }

    pub fn request_rows(&self) -> usize {
        self.data.lock().unwrap().requests.len()
    }

    /// Hold the next catalog read until `release` is notified
    pub fn hold_next_catalog_read(&self) -> Arc<ReadGate> {
        let gate = Arc::new(ReadGate {
            entered: Notify::new(),
            release: Notify::new(),
        });
        *self.catalog_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    /// Hold the next request write until `release` is notified
    pub fn hold_next_write(&self) -> Arc<ReadGate> {
        let gate = Arc::new(ReadGate {
            entered: Notify::new(),
            release: Notify::new(),
        });
        *self.write_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    fn check_reads(&self) -> reqboard_client::Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::Internal("store unreachable".to_string()));
        }
        Ok(())
    }
}

impl Default for MemoryBoard {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BoardBackend for MemoryBoard {
    async fn hidden_song_ids(&self) -> reqboard_client::Result<HashSet<SongId>> {
        self.check_reads()?;
        Ok(self.data.lock().unwrap().hidden.clone())
    }

    async fn catalog_with_counts(&self) -> reqboard_client::Result<Vec<CatalogEntry>> {
        let gate = self.catalog_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        self.check_reads()?;
        let data = self.data.lock().unwrap();
        Ok(data
            .songs
            .iter()
            .map(|song| CatalogEntry {
                song: song.clone(),
                request_count: data
                    .requests
                    .iter()
                    .filter(|r| r.song_id == Some(song.id))
                    .count() as u64,
            })
            .collect())
    }

    async fn custom_queue(&self) -> reqboard_client::Result<Vec<CustomRequest>> {
        self.check_reads()?;
        let data = self.data.lock().unwrap();
        let mut queue: Vec<CustomRequest> = data
            .requests
            .iter()
            .filter_map(|r| {
                r.custom_title.as_ref().map(|title| CustomRequest {
                    id: r.id,
                    title: title.clone(),
                    artist: r.custom_artist.clone(),
                    created_at: r.created_at,
                })
            })
            .collect();
        queue.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(queue)
    }

    async fn insert_request(&self, request: NewRequest) -> reqboard_client::Result<RequestId> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        let gate = self.write_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Internal("write rejected".to_string()));
        }

        let id = {
            let mut data = self.data.lock().unwrap();
            let id = data.next_request_id;
            data.next_request_id += 1;
            let (song_id, title, artist) = request.columns();
            data.requests.push(RequestRow {
                id,
                song_id,
                custom_title: title.map(str::to_string),
                custom_artist: artist.map(str::to_string),
                created_at: Utc::now(),
            });
            id
        };

        self.bus
            .emit_lossy(ChangeEvent::new(WatchedTable::Requests, ChangeKind::Insert, None));
        Ok(id)
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.bus.subscribe()
    }

    async fn last_reset_at(&self) -> reqboard_client::Result<Option<DateTime<Utc>>> {
        self.check_reads()?;
        Ok(self.data.lock().unwrap().last_reset)
    }
}
