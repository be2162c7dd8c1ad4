//! Test data helpers.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use notecard_core::FieldMap;

static NEXT_DB: AtomicUsize = AtomicUsize::new(0);

pub fn fields(pairs: &[(&str, &str)]) -> FieldMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Unique database path per call, so parallel tests never share a file.
pub fn temp_db_path(name: &str) -> PathBuf {
    let n = NEXT_DB.fetch_add(1, Ordering::SeqCst);
    let path = std::env::temp_dir().join(format!(
        "notecards-test-{}-{}-{}.db",
        std::process::id(),
        name,
        n
    ));
    let _ = std::fs::remove_file(&path);
    path
}

/// Note row whose field data is not valid JSON.
pub const CORRUPT_NOTE_SQL: &str = "INSERT INTO notes (id, type_name, field_map, tags, created_at, modified_at, usn) \
     VALUES (?1, ?2, '{broken', '[]', '2024-01-01T00:00:00+00:00', '2024-01-01T00:00:00+00:00', 0)";
