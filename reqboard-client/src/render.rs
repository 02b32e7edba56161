//! Plain-text rendering of the board view for the CLI

use crate::board::ledger::LedgerEntry;
use crate::board::reconcile::{BoardView, ViewEntry};
use std::fmt::Write;

fn plural(count: u64) -> &'static str {
    if count == 1 {
        "request"
    } else {
        "requests"
    }
}

fn render_entry(out: &mut String, entry: &ViewEntry) {
    let id = match entry.key {
        LedgerEntry::Song(id) => format!("#{}", id),
        LedgerEntry::Custom(id) => format!("c{}", id),
    };

    let mut tags = Vec::new();
    if entry.is_custom() {
        tags.push("custom");
    }
    if entry.requested_by_me {
        tags.push("mine");
    }
    if entry.newly_submitted {
        tags.push("new");
    }

    let _ = write!(out, "{:>6}  {}", id, entry.title);
    if let Some(artist) = &entry.artist {
        let _ = write!(out, " - {}", artist);
    }
    if entry.is_custom() {
        let _ = write!(out, "  [{}]", tags.join(", "));
    } else {
        let _ = write!(out, "  ({} {})", entry.request_count, plural(entry.request_count));
        if !tags.is_empty() {
            let _ = write!(out, " [{}]", tags.join(", "));
        }
    }
    out.push('\n');
}

/// Render the view, filtered by `search`
pub fn render_view(view: &BoardView, search: &str) -> String {
    let view = match view {
        BoardView::Loading => return "Loading...\n".to_string(),
        BoardView::Resetting => return "Requests were reset, reloading...\n".to_string(),
        BoardView::Ready(view) => view,
    };

    let entries = view.filtered(search);
    if entries.is_empty() {
        return "No songs available\n".to_string();
    }

    let mut out = String::new();
    for entry in entries {
        render_entry(&mut out, entry);
    }
    let _ = writeln!(
        out,
        "{} {} in total",
        view.total_requests,
        plural(view.total_requests)
    );
    out
}
