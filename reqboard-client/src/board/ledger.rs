//! Local submission ledger
//!
//! Client-resident record of what this client has already requested. It is
//! advisory only: it lets a client recognise its own submissions and
//! self-limit, and has no effect on other clients or on server counts.
//!
//! Every confirmed submission takes one entry, so repeat requests for the
//! same song each count against the quota.
//!
//! Every mutation is persisted synchronously before the call returns.
//! A missing or unparsable stored value loads as an empty ledger.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use reqboard_common::models::{RequestId, SongId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// One submission remembered by this client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum LedgerEntry {
    /// Cataloged song (keyed by song id)
    Song(SongId),
    /// Free-text request (keyed by its request row id)
    Custom(RequestId),
}

/// Submitted identifiers, split by kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedIds {
    /// One element per confirmed song submission, repeats included
    #[serde(default)]
    pub songs: Vec<SongId>,
    #[serde(default)]
    pub custom: BTreeSet<RequestId>,
    /// When the first entry after the last clear was recorded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,
}

impl SubmittedIds {
    pub fn len(&self) -> usize {
        self.songs.len() + self.custom.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, entry: LedgerEntry) -> bool {
        match entry {
            LedgerEntry::Song(id) => self.songs.contains(&id),
            LedgerEntry::Custom(id) => self.custom.contains(&id),
        }
    }
}

/// Accepted stored shapes; a bare array is a list of song ids
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredLedger {
    Current(SubmittedIds),
    SongsOnly(Vec<SongId>),
}

impl From<StoredLedger> for SubmittedIds {
    fn from(stored: StoredLedger) -> Self {
        match stored {
            StoredLedger::Current(ids) => ids,
            StoredLedger::SongsOnly(songs) => SubmittedIds {
                songs,
                ..SubmittedIds::default()
            },
        }
    }
}

/// Durable client-local key-value storage
pub trait LedgerStore: Send + Sync {
    /// Read the stored value, `None` if nothing is stored under `key`
    fn read(&self, key: &str) -> Result<Option<String>>;

    /// Replace the stored value
    fn write(&self, key: &str, value: &str) -> Result<()>;

    /// Erase the stored value (no error if absent)
    fn remove(&self, key: &str) -> Result<()>;
}

/// One JSON file per key inside a state directory
#[derive(Debug, Clone)]
pub struct FileLedgerStore {
    dir: PathBuf,
}

impl FileLedgerStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl LedgerStore for FileLedgerStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        // Write-then-rename so a crash never leaves a half-written ledger
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process store; clones share the same values
#[derive(Debug, Clone, Default)]
pub struct MemoryLedgerStore {
    values: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn values(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.values
            .lock()
            .map_err(|_| Error::Internal("ledger store lock poisoned".to_string()))
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values()?.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        self.values()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.values()?.remove(key);
        Ok(())
    }
}

/// This client's memory of its own submissions
pub struct LocalLedger {
    key: String,
    ids: SubmittedIds,
    store: Box<dyn LedgerStore>,
}

impl std::fmt::Debug for LocalLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalLedger")
            .field("key", &self.key)
            .field("ids", &self.ids)
            .finish()
    }
}

impl LocalLedger {
    /// Load the ledger stored under `key`
    ///
    /// Never fails: unreadable or corrupt state is treated as empty.
    pub fn load(store: Box<dyn LedgerStore>, key: impl Into<String>) -> Self {
        let key = key.into();
        let ids = match store.read(&key) {
            Ok(Some(raw)) => match serde_json::from_str::<StoredLedger>(&raw) {
                Ok(stored) => stored.into(),
                Err(e) => {
                    warn!("Stored ledger '{}' is corrupt ({}), starting empty", key, e);
                    SubmittedIds::default()
                }
            },
            Ok(None) => SubmittedIds::default(),
            Err(e) => {
                warn!("Could not read ledger '{}' ({}), starting empty", key, e);
                SubmittedIds::default()
            }
        };

        debug!("Loaded ledger '{}' with {} entries", key, ids.len());
        Self { key, ids, store }
    }

    /// Record a confirmed submission
    ///
    /// The in-memory copy is updated even if persisting fails, so this
    /// session never under-counts its own usage.
    pub fn append(&mut self, entry: LedgerEntry) -> Result<()> {
        match entry {
            LedgerEntry::Song(id) => self.ids.songs.push(id),
            LedgerEntry::Custom(id) => {
                self.ids.custom.insert(id);
            }
        }
        if self.ids.since.is_none() {
            self.ids.since = Some(Utc::now());
        }
        self.persist()
    }

    /// Forget every submission and erase the persisted copy
    pub fn clear_all(&mut self) -> Result<()> {
        self.ids = SubmittedIds::default();
        self.store.remove(&self.key)
    }

    /// When the oldest entry still remembered was recorded
    pub fn since(&self) -> Option<DateTime<Utc>> {
        self.ids.since
    }

    /// Number of remembered submissions (songs and free text)
    pub fn size(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, entry: LedgerEntry) -> bool {
        self.ids.contains(entry)
    }

    /// Copy of the remembered identifiers
    pub fn snapshot(&self) -> SubmittedIds {
        self.ids.clone()
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    fn persist(&self) -> Result<()> {
        let encoded = serde_json::to_string(&self.ids)?;
        self.store
            .write(&self.key, &encoded)
            .map_err(|e| Error::Persistence(format!("ledger '{}': {}", self.key, e)))
    }
}
