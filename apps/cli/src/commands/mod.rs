//! Command handlers.
//!
//! Every handler returns the JSON document printed on stdout. Shared parsing
//! helpers live here.

pub mod cards;
pub mod collection;
pub mod note_types;
pub mod notes;

use std::fs;

use anyhow::{Context, Result};
use notecard_core::scheduler::get_scheduler;
use notecard_core::store::DeckRepository;
use notecard_core::{DeckId, FieldMap, NoteTypeEdit, Rating, Scheduler};
use serde_json::Value;

use crate::cli::Commands;
use crate::config::AppConfig;
use crate::db::SqliteRepository;

/// Everything a command needs: the open collection, config and scheduler.
pub struct App {
    pub repo: SqliteRepository,
    pub config: AppConfig,
    pub scheduler: Box<dyn Scheduler>,
}

impl App {
    pub fn new(repo: SqliteRepository, config: AppConfig) -> Result<Self> {
        let scheduler = get_scheduler(&config.scheduler)
            .with_context(|| format!("unknown scheduler '{}'. expected: sm2", config.scheduler))?;
        Ok(Self {
            repo,
            config,
            scheduler,
        })
    }
}

pub async fn dispatch(cmd: Commands, mut app: App) -> Result<Value> {
    match cmd {
        Commands::Init => collection::init(&mut app),
        Commands::NoteTypes => collection::note_types(&app),
        Commands::NoteType { name } => collection::note_type(&app, &name),
        Commands::Decks => collection::decks(&app),
        Commands::AddNote {
            note_type,
            deck,
            fields,
            tags,
        } => notes::add(&mut app, &note_type, deck.as_deref(), &fields, tags),
        Commands::EditNote {
            note_id,
            fields,
            tags,
        } => notes::edit(&mut app, note_id, &fields, tags),
        Commands::Cards { note_id } => notes::cards(&app, note_id),
        Commands::Duplicates {
            note_type,
            field,
            value,
            deck,
        } => notes::duplicates(&app, &note_type, &field, &value, deck.as_deref()),
        Commands::EditType {
            name,
            edit,
            edit_file,
        } => {
            let edit = load_edit(edit, edit_file)?;
            let (_, report) = note_types::edit(app, name, edit).await?;
            Ok(serde_json::to_value(report)?)
        }
        Commands::Regenerate { name } => {
            let (_, report) = note_types::regenerate(app, name).await?;
            Ok(serde_json::to_value(report)?)
        }
        Commands::EmptyCards { note_type, delete } => {
            cards::empty_cards(&mut app, note_type.as_deref(), delete)
        }
        Commands::Answer {
            card_id,
            rating,
            time_ms,
        } => cards::answer(&mut app, card_id, parse_rating(&rating)?, time_ms),
        Commands::Due { deck, limit } => cards::due(&app, deck.as_deref(), limit),
        Commands::DeckStats { deck } => cards::deck_stats(&app, deck.as_deref()),
        Commands::Reviews { card_id } => cards::reviews(&app, card_id),
        Commands::Flag {
            card_id,
            flag,
            marked,
            suspended,
        } => cards::flag(&mut app, card_id, flag, marked, suspended),
    }
}

/// Resolve an optional deck name without creating it.
pub fn lookup_deck(app: &App, name: Option<&str>) -> Result<Option<DeckId>> {
    let Some(name) = name else {
        return Ok(None);
    };
    let id = app
        .repo
        .deck_id_by_name(name)?
        .with_context(|| format!("deck not found: {name}"))?;
    Ok(Some(id))
}

/// Parse repeated `NAME=VALUE` arguments. The value may itself contain `=`.
pub fn parse_fields(assignments: &[String]) -> Result<FieldMap> {
    let mut fields = FieldMap::new();
    for raw in assignments {
        let (name, value) = raw
            .split_once('=')
            .with_context(|| format!("invalid --field '{raw}'. expected NAME=VALUE"))?;
        let name = name.trim();
        if name.is_empty() {
            anyhow::bail!("invalid --field '{raw}': field name is empty");
        }
        fields.insert(name.to_string(), value.to_string());
    }
    Ok(fields)
}

pub fn parse_rating(raw: &str) -> Result<Rating> {
    match raw.trim().to_lowercase().as_str() {
        "again" | "1" => Ok(Rating::Again),
        "hard" | "2" => Ok(Rating::Hard),
        "good" | "3" => Ok(Rating::Good),
        "easy" | "4" => Ok(Rating::Easy),
        other => anyhow::bail!(
            "invalid --rating '{}'. expected one of: again | hard | good | easy (or 1-4)",
            other
        ),
    }
}

/// Load a note type edit from inline JSON or a file. The file wins when both
/// are given.
pub fn load_edit(edit: Option<String>, edit_file: Option<String>) -> Result<NoteTypeEdit> {
    if let Some(path) = edit_file {
        let raw = fs::read_to_string(&path).with_context(|| format!("read edit-file failed: {path}"))?;
        let raw = raw.trim_start_matches('\u{feff}').trim();
        return serde_json::from_str(raw).context("edit-file must contain a valid note type edit");
    }

    let raw = edit.context("must provide --edit or --edit-file")?;
    serde_json::from_str(raw.trim()).context("--edit must be a valid note type edit")
}
