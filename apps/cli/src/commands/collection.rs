use anyhow::{Context, Result};
use notecard_core::service::seed_builtins;
use notecard_core::store::{DeckRepository, NoteTypeRepository};
use serde_json::{json, Value};

use super::App;

pub fn init(app: &mut App) -> Result<Value> {
    let deck_id = seed_builtins(&mut app.repo, &app.config.default_deck)?;
    let note_types: Vec<String> = app
        .repo
        .list_note_types()?
        .into_iter()
        .map(|nt| nt.name)
        .collect();

    tracing::info!(db = %app.config.db_path.display(), "collection ready");
    Ok(json!({
        "db": app.config.db_path.display().to_string(),
        "default_deck": { "id": deck_id, "name": app.config.default_deck },
        "note_types": note_types,
    }))
}

pub fn note_types(app: &App) -> Result<Value> {
    let names: Vec<String> = app
        .repo
        .list_note_types()?
        .into_iter()
        .map(|nt| nt.name)
        .collect();
    Ok(json!(names))
}

pub fn note_type(app: &App, name: &str) -> Result<Value> {
    let note_type = app
        .repo
        .get_note_type(name)?
        .with_context(|| format!("unknown note type: {name}"))?;
    Ok(serde_json::to_value(note_type)?)
}

pub fn decks(app: &App) -> Result<Value> {
    Ok(serde_json::to_value(app.repo.list_decks()?)?)
}
