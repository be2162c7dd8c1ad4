use anyhow::{Context, Result};
use chrono::Utc;
use notecard_core::service::{add_note, check_duplicate, update_note};
use notecard_core::store::{CardRepository, NoteRepository};
use notecard_core::Store;
use serde_json::{json, Value};

use super::{lookup_deck, parse_fields, App};

pub fn add(
    app: &mut App,
    note_type: &str,
    deck: Option<&str>,
    fields: &[String],
    tags: Vec<String>,
) -> Result<Value> {
    let fields = parse_fields(fields)?;
    let deck_name = deck.unwrap_or(&app.config.default_deck);
    let deck_id = app.repo.ensure_deck(deck_name)?;

    let added = add_note(
        &mut app.repo,
        app.scheduler.as_ref(),
        note_type,
        deck_id,
        fields,
        tags,
        Utc::now(),
    )?;
    Ok(serde_json::to_value(added)?)
}

pub fn edit(app: &mut App, note_id: i64, fields: &[String], tags: Option<Vec<String>>) -> Result<Value> {
    let fields = parse_fields(fields)?;
    let default_deck = app.repo.ensure_deck(&app.config.default_deck)?;

    let plan = update_note(
        &mut app.repo,
        app.scheduler.as_ref(),
        note_id,
        fields,
        tags,
        default_deck,
        Utc::now(),
    )?;
    Ok(json!({
        "note_id": note_id,
        "created": plan.to_create.iter().map(|c| c.id).collect::<Vec<_>>(),
        "updated": plan.to_update.iter().map(|c| c.id).collect::<Vec<_>>(),
        "deleted": plan.to_delete,
        "unchanged": plan.unchanged,
    }))
}

pub fn cards(app: &App, note_id: i64) -> Result<Value> {
    app.repo
        .get_note(note_id)?
        .with_context(|| format!("note not found: {note_id}"))?;
    Ok(serde_json::to_value(app.repo.get_cards_by_note(note_id)?)?)
}

pub fn duplicates(
    app: &App,
    note_type: &str,
    field: &str,
    value: &str,
    deck: Option<&str>,
) -> Result<Value> {
    let deck_id = lookup_deck(app, deck)?;
    let matches = check_duplicate(&app.repo, note_type, field, value, deck_id)?;
    Ok(serde_json::to_value(matches)?)
}
