//! Shared setup for collection integration tests.
//!
//! Each context owns a SQLite collection seeded with the stock note types and
//! a `Default` deck. File-backed contexts let a test reach the database through
//! a second connection, e.g. to plant rows the repository would never write.

pub mod fixtures;

use std::path::PathBuf;

use chrono::Utc;
use notecard_core::service::{add_note, seed_builtins, AddedNote};
use notecard_core::DeckId;

use notecards_cli::commands::App;
use notecards_cli::config::AppConfig;
use notecards_cli::db::SqliteRepository;

pub struct TestContext {
    pub app: App,
    pub deck: DeckId,
    pub db_path: Option<PathBuf>,
    _cleanup: Option<TempDb>,
}

/// Removes the database file when the test ends.
struct TempDb(PathBuf);

impl Drop for TempDb {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

impl TestContext {
    /// In-memory collection.
    pub fn new() -> Self {
        let repo = SqliteRepository::open_in_memory().expect("open in-memory collection");
        Self::seeded(repo, None)
    }

    /// Collection stored in a fresh file under the temp dir.
    pub fn on_disk(name: &str) -> Self {
        let path = fixtures::temp_db_path(name);
        let repo = SqliteRepository::open(&path).expect("open collection file");
        Self::seeded(repo, Some(path))
    }

    fn seeded(mut repo: SqliteRepository, db_path: Option<PathBuf>) -> Self {
        let deck = seed_builtins(&mut repo, "Default").expect("seed builtins");
        let config = AppConfig {
            db_path: db_path.clone().unwrap_or_else(|| PathBuf::from(":memory:")),
            default_deck: "Default".to_string(),
            scheduler: "sm2".to_string(),
        };
        let app = App::new(repo, config).expect("build app");
        Self {
            app,
            deck,
            _cleanup: db_path.clone().map(TempDb),
            db_path,
        }
    }

    /// Add a note to the default deck.
    pub fn add(&mut self, note_type: &str, fields: &[(&str, &str)]) -> AddedNote {
        add_note(
            &mut self.app.repo,
            self.app.scheduler.as_ref(),
            note_type,
            self.deck,
            fixtures::fields(fields),
            Vec::new(),
            Utc::now(),
        )
        .expect("add note")
    }
}
