//! Hidden-set queries

use crate::error::Result;
use reqboard_common::models::SongId;
use sqlx::{Pool, Sqlite};
use std::collections::HashSet;

/// Get identifiers of every hidden song
pub async fn get_hidden_ids(db: &Pool<Sqlite>) -> Result<HashSet<SongId>> {
    let ids: Vec<i64> = sqlx::query_scalar("SELECT song_id FROM hidden_songs")
        .fetch_all(db)
        .await?;

    Ok(ids.into_iter().collect())
}

/// Hide a song; returns false if it was already hidden
pub async fn hide_song(tx: &mut sqlx::Transaction<'_, Sqlite>, song_id: SongId) -> Result<bool> {
    let result = sqlx::query("INSERT OR IGNORE INTO hidden_songs (song_id) VALUES (?)")
        .bind(song_id)
        .execute(&mut **tx)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Unhide a song; returns false if it was not hidden
pub async fn unhide_song(tx: &mut sqlx::Transaction<'_, Sqlite>, song_id: SongId) -> Result<bool> {
    let result = sqlx::query("DELETE FROM hidden_songs WHERE song_id = ?")
        .bind(song_id)
        .execute(&mut **tx)
        .await?;

    Ok(result.rows_affected() > 0)
}
