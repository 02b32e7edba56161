//! End-to-end board scenarios
//!
//! Walks the client through the reference situations: hidden songs,
//! quota exhaustion, free-text requests and reset notifications, against
//! both the in-process board and the SQLite board.

#[allow(dead_code)]
mod support;

use reqboard_client::board::{
    Classification, LedgerEntry, LedgerStore, MemoryLedgerStore, RequestTarget,
};
use reqboard_client::SubmitError;
use reqboard_common::events::{ChangeEvent, ChangeKind, OldRow, WatchedTable};
use std::sync::Arc;
use support::{config_with_limit, memory_client, sqlite_board, MemoryBoard};

/// Hidden song never shows up, whatever its count
#[tokio::test]
async fn scenario_hidden_song_excluded() {
    let board = Arc::new(MemoryBoard::with_songs(&[(1, "Song A"), (2, "Song B")]));
    board.seed_requests(1, 3);
    board.seed_requests(2, 5);
    board.hide(2);

    let (client, _store) = memory_client(Arc::clone(&board), config_with_limit(50));
    let outcome = client.refresh().await.unwrap();
    let view = outcome.view().unwrap();

    let titles: Vec<&str> = view.entries.iter().map(|e| e.title.as_str()).collect();
    assert_eq!(titles, vec!["Song A"]);
    assert_eq!(view.entries[0].request_count, 3);
    assert!(view.song(2).is_none());
}

/// Quota of two: third submission is rejected without any write
#[tokio::test]
async fn scenario_quota_of_two() {
    let board = Arc::new(MemoryBoard::with_songs(&[(1, "One"), (2, "Two"), (3, "Three")]));
    let (client, _store) = memory_client(Arc::clone(&board), config_with_limit(2));

    let first = client.submit(RequestTarget::Song(1)).await.unwrap();
    assert_eq!(first.ledger_size, 1);
    assert_eq!(client.ledger_size().await, 1);

    let second = client.submit(RequestTarget::Song(2)).await.unwrap();
    assert_eq!(second.ledger_size, 2);

    let third = client.submit(RequestTarget::Song(3)).await;
    assert!(matches!(third, Err(SubmitError::QuotaExceeded { limit: 2 })));
    assert_eq!(client.ledger_size().await, 2);
    assert_eq!(board.write_attempts(), 2);
    assert_eq!(board.request_rows(), 2);
}

/// Free-text request gets its own identity and is listed as custom
#[tokio::test]
async fn scenario_free_text_request() {
    let board = Arc::new(MemoryBoard::with_songs(&[(1, "Song A")]));
    let (client, _store) = memory_client(Arc::clone(&board), config_with_limit(5));

    let submission = client
        .submit(RequestTarget::custom("Happy Birthday", Some("")))
        .await
        .unwrap();

    assert!(matches!(submission.entry, LedgerEntry::Custom(_)));
    assert_ne!(submission.entry, LedgerEntry::Song(submission.request_id));

    let view = client.view();
    let view = view.ready().expect("view refreshed after submit");
    let entry = &view.entries[0];
    assert!(entry.is_custom());
    assert_eq!(entry.title, "Happy Birthday");
    assert_eq!(entry.artist, None);
    assert!(entry.requested_by_me);
    assert!(entry.newly_submitted);
}

/// Bulk delete clears the ledger; a following row delete is harmless
#[tokio::test]
async fn scenario_reset_then_row_delete() {
    let board = Arc::new(MemoryBoard::with_songs(&[(1, "Song A"), (2, "Song B")]));
    let (client, store) = memory_client(Arc::clone(&board), config_with_limit(5));

    client.submit(RequestTarget::Song(1)).await.unwrap();
    client.submit(RequestTarget::Song(2)).await.unwrap();
    assert_eq!(client.ledger_size().await, 2);

    let reset = ChangeEvent::new(WatchedTable::Requests, ChangeKind::Delete, None);
    assert_eq!(client.handle_change(&reset).await, Classification::GlobalReset);
    assert_eq!(client.ledger_size().await, 0);
    assert!(store_is_empty(&store));

    let row_delete = ChangeEvent::new(
        WatchedTable::Requests,
        ChangeKind::Delete,
        Some(OldRow { id: Some(42) }),
    );
    assert_eq!(
        client.handle_change(&row_delete).await,
        Classification::SingleRowChange
    );
    assert_eq!(client.ledger_size().await, 0);
    assert_eq!(client.resets_seen(), 1);
}

/// Row-scoped delete leaves the ledger untouched
#[tokio::test]
async fn row_delete_keeps_ledger() {
    let board = Arc::new(MemoryBoard::with_songs(&[(1, "Song A")]));
    let (client, _store) = memory_client(Arc::clone(&board), config_with_limit(5));

    let submission = client.submit(RequestTarget::Song(1)).await.unwrap();
    board.delete_request(submission.request_id);

    let event = ChangeEvent::new(
        WatchedTable::Requests,
        ChangeKind::Delete,
        Some(OldRow {
            id: Some(submission.request_id),
        }),
    );
    client.handle_change(&event).await;

    assert_eq!(client.ledger_size().await, 1);
    assert_eq!(client.resets_seen(), 0);
}

/// Same walk-through against the SQLite store
#[tokio::test]
async fn scenario_sqlite_board() {
    let board = sqlite_board().await;
    let a = board.add_song("Song A", None).await.unwrap();
    let b = board.add_song("Song B", Some("Band")).await.unwrap();
    let (client, _store) = memory_client(Arc::clone(&board), config_with_limit(2));

    let mut changes = board.bus().subscribe();

    client.submit(RequestTarget::Song(a)).await.unwrap();
    client.submit(RequestTarget::Song(b)).await.unwrap();
    assert!(matches!(
        client.submit(RequestTarget::Song(a)).await,
        Err(SubmitError::QuotaExceeded { .. })
    ));

    board.hide_song(b).await.unwrap();
    client.refresh().await.unwrap();
    let view = client.view();
    let view = view.ready().unwrap();
    assert!(view.song(b).is_none());
    assert_eq!(view.song(a).unwrap().request_count, 1);
    assert!(view.song(a).unwrap().requested_by_me);

    board.clear_requests().await.unwrap();

    // Drain notifications: two inserts, the hide, then the clear
    let mut last = None;
    while let Ok(event) = changes.try_recv() {
        last = Some(event);
    }
    let clear = last.expect("clear notification");
    assert_eq!(client.handle_change(&clear).await, Classification::GlobalReset);
    assert_eq!(client.ledger_size().await, 0);

    // Quota is available again after the reset
    client.submit(RequestTarget::Song(a)).await.unwrap();
    assert_eq!(client.ledger_size().await, 1);
}

fn store_is_empty(store: &MemoryLedgerStore) -> bool {
    store.read("my_requested_songs").unwrap().is_none()
}
