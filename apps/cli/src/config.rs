//! Runtime configuration from environment variables.

use std::path::PathBuf;

pub const DB_PATH_VAR: &str = "NOTECARDS_DB";
pub const DEFAULT_DECK_VAR: &str = "NOTECARDS_DEFAULT_DECK";
pub const SCHEDULER_VAR: &str = "NOTECARDS_SCHEDULER";

const DEFAULT_DECK: &str = "Default";
const DEFAULT_SCHEDULER: &str = "sm2";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub db_path: PathBuf,
    /// Deck new notes land in when no deck is given.
    pub default_deck: String,
    pub scheduler: String,
}

impl AppConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, so tests don't have to touch the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        Self {
            db_path: non_blank(DB_PATH_VAR)
                .map(PathBuf::from)
                .unwrap_or_else(default_db_path),
            default_deck: non_blank(DEFAULT_DECK_VAR).unwrap_or_else(|| DEFAULT_DECK.to_string()),
            scheduler: non_blank(SCHEDULER_VAR).unwrap_or_else(|| DEFAULT_SCHEDULER.to_string()),
        }
    }

    pub fn with_db_path(mut self, path: Option<PathBuf>) -> Self {
        if let Some(path) = path {
            self.db_path = path;
        }
        self
    }
}

/// `<local data dir>/notecards/notecards.db`, or the working directory when
/// the platform has no data dir.
pub fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("notecards")
        .join("notecards.db")
}
