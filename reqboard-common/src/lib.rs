//! # Request Board Common Library
//!
//! Shared code for the request board crates including:
//! - Data models (songs, requests, hidden entries)
//! - Change notification types and the ChangeBus
//! - Configuration loading
//! - Database schema initialization

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod models;

pub use error::{Error, Result};
