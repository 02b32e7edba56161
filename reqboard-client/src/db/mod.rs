//! Database access layer
//!
//! Queries against the shared board tables: catalog, hidden set, request
//! ledger and the change log. Writes take a transaction so the change log
//! entry commits with the row it describes.

pub mod catalog;
pub mod changes;
pub mod hidden;
pub mod requests;
