//! SQLite schema definitions.

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Complete schema for the collection database.
pub const SCHEMA: &str = r#"
-- Key/value collection metadata (schema version, last USN)
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS decks (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);

-- fields, templates and field_options are JSON
CREATE TABLE IF NOT EXISTS note_types (
    name TEXT PRIMARY KEY,
    fields TEXT NOT NULL,
    templates TEXT NOT NULL,
    sort_field_index INTEGER NOT NULL DEFAULT 0,
    field_options TEXT NOT NULL DEFAULT '{}'
);

-- field_map and tags are JSON
CREATE TABLE IF NOT EXISTS notes (
    id INTEGER PRIMARY KEY,
    type_name TEXT NOT NULL,
    field_map TEXT NOT NULL,
    tags TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    modified_at TEXT NOT NULL,
    usn INTEGER NOT NULL
);

-- scheduling is JSON; due mirrors its due_date in Unix milliseconds
CREATE TABLE IF NOT EXISTS cards (
    id INTEGER PRIMARY KEY,
    note_id INTEGER NOT NULL REFERENCES notes(id),
    deck_id INTEGER NOT NULL REFERENCES decks(id),
    template_name TEXT NOT NULL,
    ordinal INTEGER NOT NULL,
    front TEXT NOT NULL,
    back TEXT NOT NULL,
    scheduling TEXT NOT NULL,
    flag INTEGER NOT NULL DEFAULT 0,
    marked INTEGER NOT NULL DEFAULT 0,
    suspended INTEGER NOT NULL DEFAULT 0,
    due INTEGER,
    usn INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS revlog (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    card_id INTEGER NOT NULL REFERENCES cards(id),
    rating INTEGER NOT NULL,
    reviewed_at TEXT NOT NULL,
    status_before TEXT NOT NULL,
    interval_before REAL NOT NULL,
    interval_after REAL NOT NULL,
    ease_before REAL NOT NULL,
    ease_after REAL NOT NULL,
    time_taken_ms INTEGER
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_notes_type ON notes(type_name);
CREATE UNIQUE INDEX IF NOT EXISTS idx_cards_identity ON cards(note_id, template_name, ordinal);
CREATE INDEX IF NOT EXISTS idx_cards_due ON cards(deck_id, due);
CREATE INDEX IF NOT EXISTS idx_revlog_card ON revlog(card_id);
"#;

/// Seed metadata rows if not present.
pub const INIT_METADATA: &str = r#"
INSERT OR IGNORE INTO metadata (key, value) VALUES ('schema_version', '1');
INSERT OR IGNORE INTO metadata (key, value) VALUES ('usn', '0');
"#;
