//! Shared connection handling for the `SQLite` stores.

use crate::{Error, Result};
use rusqlite::Connection;
use std::path::Path;
use std::time::Instant;

/// Opens a connection at `path`, or in memory when `path` is `None`, and
/// applies the pragmas every store relies on.
pub(super) fn open(path: Option<&Path>, store: &str) -> Result<Connection> {
    let conn = match path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| Error::OperationFailed {
                    operation: format!("create_{store}_dir"),
                    cause: format!("{}: {e}", parent.display()),
                })?;
            }
            Connection::open(path)
        },
        None => Connection::open_in_memory(),
    }
    .map_err(db_error(&format!("open_{store}")))?;

    configure(&conn);
    Ok(conn)
}

/// WAL for concurrent readers, NORMAL sync, 5s busy timeout.
///
/// `journal_mode` returns a row, so pragma failures are ignored rather than
/// aborting the open. In-memory databases silently stay in `memory` mode.
fn configure(conn: &Connection) {
    let _ = conn.pragma_update(None, "journal_mode", "WAL");
    let _ = conn.pragma_update(None, "synchronous", "NORMAL");
    let _ = conn.pragma_update(None, "busy_timeout", "5000");
}

/// Maps a rusqlite error into [`Error::OperationFailed`] for `operation`.
pub(super) fn db_error(operation: &str) -> impl Fn(rusqlite::Error) -> Error + '_ {
    move |e| Error::OperationFailed {
        operation: operation.to_string(),
        cause: e.to_string(),
    }
}

/// Records the outcome and duration of a store operation.
pub(super) fn record_operation(
    store: &'static str,
    operation: &'static str,
    start: Instant,
    ok: bool,
) {
    let status = if ok { "success" } else { "error" };
    metrics::counter!(
        "storage_operations_total",
        "store" => store,
        "operation" => operation,
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        "storage_operation_duration_ms",
        "store" => store,
        "operation" => operation
    )
    .record(start.elapsed().as_secs_f64() * 1000.0);
}
