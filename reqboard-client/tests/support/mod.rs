//! Test support for reqboard-client integration tests
//!
//! - MemoryBoard: in-process board store with fault injection
//! - Client builders over any board, with an inspectable ledger store

pub mod memory_board;

pub use memory_board::{MemoryBoard, ReadGate};

use reqboard_client::board::{BoardBackend, BoardClient, LedgerStore, MemoryLedgerStore, SqliteBoard};
use reqboard_common::config::BoardConfig;
use reqboard_common::db::{init_database, open_in_memory};
use reqboard_common::events::ChangeBus;
use std::path::Path;
use std::sync::Arc;

/// Config with the given quota and everything else at defaults
pub fn config_with_limit(max: u32) -> BoardConfig {
    BoardConfig {
        max_requests_per_user: max,
        ..BoardConfig::default()
    }
}

/// Client with an in-memory ledger store, returned for inspection
pub fn memory_client<B: BoardBackend>(
    board: Arc<B>,
    config: BoardConfig,
) -> (Arc<BoardClient<B>>, MemoryLedgerStore) {
    let store = MemoryLedgerStore::new();
    let client = BoardClient::new(board, Box::new(store.clone()) as Box<dyn LedgerStore>, config);
    (Arc::new(client), store)
}

/// SQLite board on a private in-memory database
pub async fn sqlite_board() -> Arc<SqliteBoard> {
    let pool = open_in_memory().await.expect("in-memory database");
    Arc::new(SqliteBoard::new(pool, ChangeBus::new(64)).await.expect("change log"))
}

/// SQLite board over a database file, as a separate process would open it
pub async fn sqlite_board_at(path: &Path) -> Arc<SqliteBoard> {
    let pool = init_database(path).await.expect("board database");
    Arc::new(SqliteBoard::new(pool, ChangeBus::new(64)).await.expect("change log"))
}
