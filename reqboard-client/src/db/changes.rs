//! Change log queries
//!
//! Each board write appends a row to `changes` inside its own transaction,
//! so a committed write always has exactly one log entry. Every process
//! tails the log from its own cursor and replays new rows onto its
//! in-process bus.

use crate::error::Result;
use chrono::{DateTime, Utc};
use reqboard_common::events::{ChangeEvent, ChangeKind, OldRow, WatchedTable};
use sqlx::{Pool, Row, Sqlite};
use tracing::warn;

/// Append a change entry, returning its sequence number
pub async fn record_change(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    table: WatchedTable,
    kind: ChangeKind,
    old_id: Option<i64>,
) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO changes (table_name, kind, old_id, created_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(table.as_str())
    .bind(kind.as_str())
    .bind(old_id)
    .bind(Utc::now())
    .execute(&mut **tx)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Drop entries older than `seq`
///
/// Sequence numbers are never reused, so cursors held by other processes
/// stay valid.
pub async fn prune_before(tx: &mut sqlx::Transaction<'_, Sqlite>, seq: i64) -> Result<u64> {
    let result = sqlx::query("DELETE FROM changes WHERE seq < ?")
        .bind(seq)
        .execute(&mut **tx)
        .await?;

    Ok(result.rows_affected())
}

/// Get entries after `after`, oldest first
///
/// Rows naming an unknown table or kind are skipped with a warning.
pub async fn changes_after(db: &Pool<Sqlite>, after: i64) -> Result<Vec<(i64, ChangeEvent)>> {
    let rows = sqlx::query(
        r#"
        SELECT seq, table_name, kind, old_id, created_at
        FROM changes
        WHERE seq > ?
        ORDER BY seq ASC
        "#,
    )
    .bind(after)
    .fetch_all(db)
    .await?;

    let mut events = Vec::with_capacity(rows.len());
    for row in rows {
        let seq: i64 = row.get("seq");
        let table_name: String = row.get("table_name");
        let kind_name: String = row.get("kind");

        let (Some(table), Some(kind)) = (
            WatchedTable::from_name(&table_name),
            ChangeKind::from_name(&kind_name),
        ) else {
            warn!("Skipping change {}: unknown {} {}", seq, kind_name, table_name);
            continue;
        };

        let old_id: Option<i64> = row.get("old_id");
        events.push((
            seq,
            ChangeEvent {
                table,
                kind,
                old: old_id.map(|id| OldRow { id: Some(id) }),
                timestamp: row.get::<DateTime<Utc>, _>("created_at"),
            },
        ));
    }

    Ok(events)
}

/// Highest sequence number written so far (0 for an empty log)
pub async fn latest_seq(db: &Pool<Sqlite>) -> Result<i64> {
    let seq: Option<i64> = sqlx::query_scalar("SELECT MAX(seq) FROM changes")
        .fetch_one(db)
        .await?;

    Ok(seq.unwrap_or(0))
}

/// When the most recent bulk clear of the requests table happened
pub async fn last_reset_at(db: &Pool<Sqlite>) -> Result<Option<DateTime<Utc>>> {
    let at: Option<DateTime<Utc>> = sqlx::query_scalar(
        r#"
        SELECT created_at
        FROM changes
        WHERE table_name = 'requests' AND kind = 'DELETE' AND old_id IS NULL
        ORDER BY seq DESC
        LIMIT 1
        "#,
    )
    .fetch_optional(db)
    .await?;

    Ok(at)
}
