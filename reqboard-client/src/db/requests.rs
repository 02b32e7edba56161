//! Request ledger queries
//!
//! Rows are append-only from a client's point of view. Deletion is an
//! operator action (single row or bulk clear).

use crate::error::Result;
use chrono::{DateTime, Utc};
use reqboard_common::models::{CustomRequest, NewRequest, RequestId};
use sqlx::{Pool, Row, Sqlite};

/// Append a request row, returning the new row identifier
pub async fn insert_request(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    request: &NewRequest,
) -> Result<RequestId> {
    let (song_id, custom_title, custom_artist) = request.columns();

    let result = sqlx::query(
        r#"
        INSERT INTO requests (song_id, custom_title, custom_artist, created_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(song_id)
    .bind(custom_title)
    .bind(custom_artist)
    .bind(Utc::now())
    .execute(&mut **tx)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Get pending free-text requests, newest first
pub async fn get_custom_queue(db: &Pool<Sqlite>) -> Result<Vec<CustomRequest>> {
    let rows = sqlx::query(
        r#"
        SELECT id, custom_title, custom_artist, created_at
        FROM requests
        WHERE song_id IS NULL
        ORDER BY created_at DESC, id DESC
        "#,
    )
    .fetch_all(db)
    .await?;

    let queue = rows
        .into_iter()
        .map(|row| CustomRequest {
            id: row.get("id"),
            title: row.get("custom_title"),
            artist: row.get("custom_artist"),
            created_at: row.get::<DateTime<Utc>, _>("created_at"),
        })
        .collect();

    Ok(queue)
}

/// Delete one request row; returns false if it did not exist
pub async fn delete_request(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    request_id: RequestId,
) -> Result<bool> {
    let result = sqlx::query("DELETE FROM requests WHERE id = ?")
        .bind(request_id)
        .execute(&mut **tx)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Delete every request row, returning how many were removed
pub async fn clear_requests(tx: &mut sqlx::Transaction<'_, Sqlite>) -> Result<u64> {
    let result = sqlx::query("DELETE FROM requests").execute(&mut **tx).await?;

    Ok(result.rows_affected())
}

/// Total number of request rows (cataloged and free-text)
pub async fn count_requests(db: &Pool<Sqlite>) -> Result<u64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM requests")
        .fetch_one(db)
        .await?;

    Ok(count.max(0) as u64)
}
