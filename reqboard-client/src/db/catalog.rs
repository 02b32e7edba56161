//! Catalog queries
//!
//! Request counts are aggregated from the `requests` table on every read,
//! so they can never drift from the ledger.

use crate::error::Result;
use reqboard_common::models::{CatalogEntry, Song, SongId};
use sqlx::{Pool, Row, Sqlite};

/// Get every cataloged song with its current request count
///
/// Hidden songs are included; filtering is the reader's job.
pub async fn get_catalog_with_counts(db: &Pool<Sqlite>) -> Result<Vec<CatalogEntry>> {
    let rows = sqlx::query(
        r#"
        SELECT s.id, s.title, s.artist, COUNT(r.id) AS request_count
        FROM songs s
        LEFT JOIN requests r ON r.song_id = s.id
        GROUP BY s.id, s.title, s.artist
        ORDER BY s.title ASC, s.id ASC
        "#,
    )
    .fetch_all(db)
    .await?;

    let entries = rows
        .into_iter()
        .map(|row| CatalogEntry {
            song: Song {
                id: row.get("id"),
                title: row.get("title"),
                artist: row.get("artist"),
            },
            request_count: row.get::<i64, _>("request_count").max(0) as u64,
        })
        .collect();

    Ok(entries)
}

/// Insert a song into the catalog, returning its identifier
pub async fn insert_song(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    title: &str,
    artist: Option<&str>,
) -> Result<SongId> {
    let result = sqlx::query("INSERT INTO songs (title, artist) VALUES (?, ?)")
        .bind(title)
        .bind(artist)
        .execute(&mut **tx)
        .await?;

    Ok(result.last_insert_rowid())
}

/// Check whether a song identifier exists in the catalog
pub async fn song_exists(db: &Pool<Sqlite>, song_id: SongId) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM songs WHERE id = ?")
        .bind(song_id)
        .fetch_optional(db)
        .await?;

    Ok(found.is_some())
}
