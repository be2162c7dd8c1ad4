use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "notecards")]
#[command(about = "Note-to-card compiler and collection tool", long_about = None)]
pub struct Cli {
    /// Collection database (defaults to $NOTECARDS_DB or the local data dir)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the collection, stock note types and the default deck
    Init,

    /// List note type names
    NoteTypes,

    /// Print one note type as JSON
    NoteType {
        name: String,
    },

    /// List decks
    Decks,

    /// Add a note and generate its cards
    AddNote {
        /// Note type name (e.g. Basic, Cloze)
        #[arg(long = "type")]
        note_type: String,

        /// Deck name; created if missing. Defaults to the configured deck.
        #[arg(long)]
        deck: Option<String>,

        /// Field value as NAME=VALUE, repeatable
        #[arg(long = "field", value_name = "NAME=VALUE")]
        fields: Vec<String>,

        /// Comma separated tags
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
    },

    /// Change field values of a note and reconcile its cards
    EditNote {
        note_id: i64,

        #[arg(long = "field", value_name = "NAME=VALUE")]
        fields: Vec<String>,

        /// Replace the note's tags (comma separated)
        #[arg(long, value_delimiter = ',')]
        tags: Option<Vec<String>>,
    },

    /// Apply a structural edit to a note type and regenerate its cards
    EditType {
        name: String,

        /// Edit as inline JSON, e.g. {"op":"rename_field","old_name":"Front","new_name":"Question"}
        #[arg(long)]
        edit: Option<String>,

        /// Path to a file containing the edit JSON
        #[arg(long)]
        edit_file: Option<String>,
    },

    /// Recompile and reconcile every note of a note type
    Regenerate {
        name: String,
    },

    /// List the cards of a note
    Cards {
        note_id: i64,
    },

    /// Find notes whose field matches a value
    Duplicates {
        #[arg(long = "type")]
        note_type: String,

        #[arg(long)]
        field: String,

        #[arg(long)]
        value: String,

        /// Only notes with a card in this deck
        #[arg(long)]
        deck: Option<String>,
    },

    /// Find cards whose generating content is gone
    EmptyCards {
        /// Limit the sweep to one note type
        #[arg(long = "type")]
        note_type: Option<String>,

        /// Delete what was found
        #[arg(long, default_value_t = false)]
        delete: bool,
    },

    /// Answer a card and record the review
    Answer {
        card_id: i64,

        /// again | hard | good | easy, or 1-4
        #[arg(long)]
        rating: String,

        #[arg(long)]
        time_ms: Option<u32>,
    },

    /// Cards due for study, earliest first
    Due {
        /// Deck name; all decks when omitted
        #[arg(long)]
        deck: Option<String>,

        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Card counts by learning status
    DeckStats {
        /// Deck name; the whole collection when omitted
        #[arg(long)]
        deck: Option<String>,
    },

    /// Review history of a card
    Reviews {
        card_id: i64,
    },

    /// Set the flag, marked or suspended state of a card
    Flag {
        card_id: i64,

        /// 0 clears the flag
        #[arg(long)]
        flag: Option<u8>,

        #[arg(long)]
        marked: Option<bool>,

        #[arg(long)]
        suspended: Option<bool>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_add_note() {
        let cli = Cli::try_parse_from([
            "notecards",
            "add-note",
            "--type",
            "Basic",
            "--field",
            "Front=hola",
            "--field",
            "Back=hello",
            "--tags",
            "es,greetings",
        ])
        .unwrap();
        match cli.cmd {
            Commands::AddNote {
                note_type,
                deck,
                fields,
                tags,
            } => {
                assert_eq!(note_type, "Basic");
                assert_eq!(deck, None);
                assert_eq!(fields, vec!["Front=hola", "Back=hello"]);
                assert_eq!(tags, vec!["es", "greetings"]);
            }
            _ => panic!("expected add-note"),
        }
    }

    #[test]
    fn global_db_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["notecards", "cards", "3", "--db", "/tmp/x.db"]).unwrap();
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/x.db")));
        assert!(matches!(cli.cmd, Commands::Cards { note_id: 3 }));
    }

    #[test]
    fn due_limit_defaults_to_ten() {
        let cli = Cli::try_parse_from(["notecards", "due", "--deck", "Spanish"]).unwrap();
        match cli.cmd {
            Commands::Due { deck, limit } => {
                assert_eq!(deck.as_deref(), Some("Spanish"));
                assert_eq!(limit, 10);
            }
            _ => panic!("expected due"),
        }
    }

    #[test]
    fn edit_note_tags_absent_means_keep() {
        let cli = Cli::try_parse_from(["notecards", "edit-note", "1", "--field", "Back=x"]).unwrap();
        match cli.cmd {
            Commands::EditNote { tags, .. } => assert_eq!(tags, None),
            _ => panic!("expected edit-note"),
        }
    }
}
