//! Request board client core
//!
//! - `ledger`: what this client has requested (persisted locally)
//! - `reconcile`: merged, ordered view of server state
//! - `submission`: quota/dedup gate in front of the request ledger
//! - `reset`: global reset detection from notification payloads
//! - `runtime`: timer + notification driven client
//! - `backend` / `sqlite`: the shared store interface and its SQLite implementation

pub mod backend;
pub mod ledger;
pub mod reconcile;
pub mod reset;
pub mod runtime;
pub mod sqlite;
pub mod submission;

pub use backend::BoardBackend;
pub use ledger::{FileLedgerStore, LedgerEntry, LedgerStore, LocalLedger, MemoryLedgerStore, SubmittedIds};
pub use reconcile::{BoardView, ReconciledView, Reconciler, RefreshOutcome, ViewEntry};
pub use reset::{classify, Classification, ResetDetector, ResetPhase};
pub use runtime::BoardClient;
pub use sqlite::SqliteBoard;
pub use submission::{RequestTarget, Submission, Submitter};
