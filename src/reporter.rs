use serde::Serialize;

use crate::controller::Snapshot;
use crate::types::Page;

/// One JSON line per loaded page.
#[derive(Serialize)]
struct PageReport<'a, T> {
    timestamp: String,
    kind: crate::types::ResourceKind,
    page: usize,
    limit: u32,
    min_close_ts: Option<i64>,
    max_close_ts: Option<i64>,
    has_next: bool,
    cursor: &'a str,
    items: &'a [T],
}

/// Emit a loaded page as a single JSON line to stdout.
pub fn report_page<T: Serialize>(snapshot: &Snapshot, page: &Page<T>) {
    let report = PageReport {
        timestamp: chrono::Utc::now().to_rfc3339(),
        kind: snapshot.kind,
        page: snapshot.page_index,
        limit: snapshot.filter.limit,
        min_close_ts: snapshot.filter.min_close_ts,
        max_close_ts: snapshot.filter.max_close_ts,
        has_next: snapshot.has_next,
        cursor: &page.cursor,
        items: &page.items,
    };
    if let Ok(json) = serde_json::to_string(&report) {
        println!("{json}");
    }
}

/// Emit any value as pretty-printed JSON to stdout.
pub fn report_value<T: Serialize>(value: &T) {
    if let Ok(json) = serde_json::to_string_pretty(value) {
        println!("{json}");
    }
}
