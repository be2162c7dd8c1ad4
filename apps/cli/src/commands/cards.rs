use anyhow::Result;
use chrono::Utc;
use notecard_core::service::{
    answer_card, deck_stats as collect_deck_stats, delete_cards, due_cards, find_empty_cards,
    update_card_flags, CardFlagsUpdate,
};
use notecard_core::store::CardRepository;
use notecard_core::Rating;
use serde_json::{json, Value};

use super::{lookup_deck, App};

pub fn empty_cards(app: &mut App, note_type: Option<&str>, delete: bool) -> Result<Value> {
    let empty = find_empty_cards(&app.repo, note_type)?;
    if !delete {
        return Ok(serde_json::to_value(empty)?);
    }

    let ids: Vec<i64> = empty.iter().map(|card| card.card_id).collect();
    let report = delete_cards(&mut app.repo, &ids)?;
    tracing::info!(deleted = report.deleted, failed = report.failed.len(), "empty cards removed");
    Ok(json!({
        "found": empty,
        "deletion": report,
    }))
}

pub fn answer(app: &mut App, card_id: i64, rating: Rating, time_ms: Option<u32>) -> Result<Value> {
    let entry = answer_card(
        &mut app.repo,
        app.scheduler.as_ref(),
        card_id,
        rating,
        Utc::now(),
        time_ms,
    )?;
    let card = app.repo.get_card(card_id)?;
    Ok(json!({
        "review": entry,
        "scheduling": card.map(|c| c.scheduling),
    }))
}

pub fn due(app: &App, deck: Option<&str>, limit: usize) -> Result<Value> {
    let deck_id = lookup_deck(app, deck)?;
    let cards = due_cards(&app.repo, deck_id, Utc::now(), limit)?;
    tracing::debug!(due = cards.len(), "due cards loaded");
    Ok(serde_json::to_value(cards)?)
}

pub fn deck_stats(app: &App, deck: Option<&str>) -> Result<Value> {
    let deck_id = lookup_deck(app, deck)?;
    Ok(serde_json::to_value(collect_deck_stats(&app.repo, deck_id, Utc::now())?)?)
}

pub fn reviews(app: &App, card_id: i64) -> Result<Value> {
    Ok(serde_json::to_value(app.repo.get_reviews(card_id)?)?)
}

pub fn flag(
    app: &mut App,
    card_id: i64,
    flag: Option<u8>,
    marked: Option<bool>,
    suspended: Option<bool>,
) -> Result<Value> {
    let update = CardFlagsUpdate {
        flag,
        marked,
        suspended,
    };
    let card = update_card_flags(&mut app.repo, card_id, &update)?;
    Ok(serde_json::to_value(card)?)
}
