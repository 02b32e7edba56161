//! # Request Board Client Library (reqboard-client)
//!
//! Client core for a live song request board: many anonymous clients browse
//! a shared catalog, submit requests and watch aggregate popularity, while
//! an operator hides songs or resets all requests.
//!
//! **Purpose:** Reconcile per-client local state (what this client has
//! requested, its quota) with a shared, push-updated server view, including
//! detection of operator-initiated global resets.
//!
//! **Architecture:** Store access behind the `BoardBackend` trait (SQLite
//! implementation included), refreshes driven by a backstop timer plus the
//! change notification channel.

pub mod board;
pub mod db;
pub mod error;
pub mod render;

pub use board::{BoardClient, BoardView, RequestTarget, SqliteBoard};
pub use error::{Error, Result, SubmitError};
