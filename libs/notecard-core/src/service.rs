//! Collection-level operations over a [`Store`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::builtins::builtins;
use crate::cloze::extract_ordinals;
use crate::compiler::{compile, CLOZE_SOURCE_FIELD};
use crate::duplicates::{find_duplicates, DuplicateQuery};
use crate::editor::{NoteTypeEdit, NoteTypeEditor};
use crate::error::{CompileError, Result, ServiceError};
use crate::reconcile::{reconcile, ReconcileContext, ReconcilePlan};
use crate::regenerate::{regenerate_note_type, NoteRegenerator, RegenerationOptions, RegenerationReport};
use crate::scheduler::Scheduler;
use crate::store::Store;
use crate::types::{
    Card, CardId, CardStatus, DeckId, FieldMap, IdSequence, Note, NoteBrief, NoteId, NoteType,
    Rating, ReviewLogEntry,
};

/// Highest flag value (0 = no flag).
pub const MAX_FLAG: u8 = 7;

/// Save any missing stock note types and make sure `deck_name` exists.
///
/// Returns the deck's id. Existing note types are left alone.
pub fn seed_builtins<S: Store + ?Sized>(store: &mut S, deck_name: &str) -> Result<DeckId> {
    for note_type in builtins() {
        if store.get_note_type(&note_type.name)?.is_none() {
            tracing::info!(note_type = %note_type.name, "seeding note type");
            store.save_note_type(&note_type)?;
        }
    }
    Ok(store.ensure_deck(deck_name)?)
}

fn load_note_type<S: Store + ?Sized>(store: &S, name: &str) -> Result<NoteType> {
    store
        .get_note_type(name)?
        .ok_or_else(|| CompileError::UnknownNoteType(name.to_string()).into())
}

/// A freshly created note and its cards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddedNote {
    pub note: Note,
    pub cards: Vec<Card>,
}

/// Create a note and one new card per compiled draft.
pub fn add_note<S: Store + ?Sized>(
    store: &mut S,
    scheduler: &dyn Scheduler,
    type_name: &str,
    deck_id: DeckId,
    fields: FieldMap,
    tags: Vec<String>,
    now: DateTime<Utc>,
) -> Result<AddedNote> {
    let note_type = load_note_type(store, type_name)?;
    if store.get_deck(deck_id)?.is_none() {
        return Err(ServiceError::DeckNotFound(deck_id));
    }

    let usn = store.next_usn()?;
    let note = Note {
        id: store.next_note_id()?,
        type_name: type_name.to_string(),
        field_map: fields,
        tags,
        created_at: now,
        modified_at: now,
        usn,
    };
    let drafts = compile(&note_type, &note)?;

    // No existing cards, so every draft becomes a new card.
    let deck_names = store.deck_name_map()?;
    let ctx = ReconcileContext {
        note_id: note.id,
        default_deck: deck_id,
        usn,
        now,
        scheduler,
        deck_overrides: &deck_names,
    };
    let mut ids = IdSequence::starting_at(store.next_card_id()?);
    let plan = reconcile(Vec::new(), drafts, &note_type, &ctx, &mut ids);
    store.apply_note_plan(&note, &plan)?;

    tracing::info!(note_id = note.id, cards = plan.to_create.len(), "note added");
    Ok(AddedNote {
        note,
        cards: plan.to_create,
    })
}

/// Replace the given field values (and tags, if provided) and reconcile the
/// note's cards. Cards whose identity survives keep their scheduling.
pub fn update_note<S: Store + ?Sized>(
    store: &mut S,
    scheduler: &dyn Scheduler,
    note_id: NoteId,
    fields: FieldMap,
    tags: Option<Vec<String>>,
    default_deck: DeckId,
    now: DateTime<Utc>,
) -> Result<ReconcilePlan> {
    let mut note = store
        .get_note(note_id)?
        .ok_or(ServiceError::NoteNotFound(note_id))?;
    let note_type = load_note_type(store, &note.type_name)?;

    let usn = store.next_usn()?;
    note.field_map.extend(fields);
    if let Some(tags) = tags {
        note.tags = tags;
    }
    note.modified_at = now;
    note.usn = usn;

    let regenerator = NoteRegenerator {
        scheduler,
        deck_names: store.deck_name_map()?,
        default_deck,
        usn,
        now,
    };
    let plan = regenerator.plan(&*store, &note_type, &note)?;
    store.apply_note_plan(&note, &plan)?;
    Ok(plan)
}

/// Apply `edit` to a note type, carry field renames and removals into the
/// stored notes, then regenerate cards when the edit can change them.
///
/// The note type and any rewritten notes are saved together, so a failed
/// write leaves both as they were.
pub fn apply_note_type_edit<S: Store + ?Sized>(
    store: &mut S,
    scheduler: &dyn Scheduler,
    type_name: &str,
    edit: &NoteTypeEdit,
    options: &RegenerationOptions,
) -> Result<RegenerationReport> {
    let mut note_type = load_note_type(store, type_name)?;
    NoteTypeEditor::new(&mut note_type).apply(edit)?;

    let rewritten = match edit {
        NoteTypeEdit::RenameField { old_name, new_name } => {
            rewrite_note_fields(store, type_name, |fields| {
                if let Some(value) = fields.remove(old_name) {
                    fields.insert(new_name.clone(), value);
                }
            })?
        }
        NoteTypeEdit::RemoveField { name } => rewrite_note_fields(store, type_name, |fields| {
            fields.remove(name);
        })?,
        _ => Vec::new(),
    };

    store.save_note_type_with_notes(&note_type, &rewritten)?;
    tracing::info!(note_type = type_name, ?edit, "note type edited");

    if !edit.affects_cards() {
        return Ok(RegenerationReport {
            note_type: type_name.to_string(),
            ..Default::default()
        });
    }
    regenerate_note_type(store, scheduler, type_name, options)
}

/// Notes of `type_name` with `rewrite` applied, ready to be saved.
fn rewrite_note_fields<S, F>(store: &S, type_name: &str, rewrite: F) -> Result<Vec<Note>>
where
    S: Store + ?Sized,
    F: Fn(&mut FieldMap),
{
    let usn = store.next_usn()?;
    let mut notes = Vec::new();
    for entry in store.get_notes_by_type(type_name)? {
        let mut note = match entry {
            Ok(note) => note,
            Err(e) => {
                tracing::warn!(error = %e, "skipping undecodable note while rewriting fields");
                continue;
            }
        };
        rewrite(&mut note.field_map);
        note.usn = usn;
        notes.push(note);
    }
    Ok(notes)
}

/// A card whose generating content has gone away.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmptyCard {
    pub card_id: CardId,
    pub note_id: NoteId,
    pub deck_id: DeckId,
    pub template_name: String,
    pub ordinal: u32,
    pub front: String,
    pub back: String,
    pub reason: String,
}

impl EmptyCard {
    fn new(card: &Card, reason: String) -> Self {
        Self {
            card_id: card.id,
            note_id: card.note_id,
            deck_id: card.deck_id,
            template_name: card.template_name.clone(),
            ordinal: card.ordinal,
            front: card.front.clone(),
            back: card.back.clone(),
            reason,
        }
    }
}

/// Sweep for cloze cards whose ordinal no longer appears in the cloze field and
/// for non-cloze cards with a blank front and back.
///
/// Limited to one note type when `type_name` is given. Notes or card listings
/// that fail to load are skipped.
pub fn find_empty_cards<S: Store + ?Sized>(store: &S, type_name: Option<&str>) -> Result<Vec<EmptyCard>> {
    let note_types = match type_name {
        Some(name) => vec![load_note_type(store, name)?],
        None => store.list_note_types()?,
    };

    let mut empty = Vec::new();
    for note_type in &note_types {
        for entry in store.get_notes_by_type(&note_type.name)? {
            let Ok(note) = entry else { continue };
            let cards = match store.get_cards_by_note(note.id) {
                Ok(cards) => cards,
                Err(e) => {
                    tracing::warn!(note_id = note.id, error = %e, "failed to load cards");
                    continue;
                }
            };

            let ordinals = extract_ordinals(note.field(CLOZE_SOURCE_FIELD));
            for card in &cards {
                let is_cloze = note_type
                    .template(&card.template_name)
                    .is_some_and(|t| t.is_cloze);
                if is_cloze {
                    if !ordinals.contains(&card.ordinal) {
                        empty.push(EmptyCard::new(
                            card,
                            format!("Cloze deletion c{} no longer exists in note", card.ordinal),
                        ));
                    }
                } else if card.front.trim().is_empty() && card.back.trim().is_empty() {
                    empty.push(EmptyCard::new(
                        card,
                        "Card has no content (both front and back are empty)".to_string(),
                    ));
                }
            }
        }
    }
    Ok(empty)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionReport {
    pub deleted: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<String>,
}

/// Delete the given cards one by one, collecting failures instead of stopping.
pub fn delete_cards<S: Store + ?Sized>(store: &mut S, card_ids: &[CardId]) -> Result<DeletionReport> {
    let mut report = DeletionReport::default();
    for &id in card_ids {
        match store.delete_card(id) {
            Ok(()) => report.deleted += 1,
            Err(e) => {
                tracing::warn!(card_id = id, error = %e, "failed to delete card");
                report.failed.push(format!("card {id}: {e}"));
            }
        }
    }
    Ok(report)
}

/// Notes of `type_name` whose `field_name` matches `value`, optionally limited
/// to notes with a card in `deck_id`.
pub fn check_duplicate<S: Store + ?Sized>(
    store: &S,
    type_name: &str,
    field_name: &str,
    value: &str,
    deck_id: Option<DeckId>,
) -> Result<Vec<NoteBrief>> {
    let notes = store.get_notes_by_type(type_name)?;
    let query = DuplicateQuery {
        field_name,
        value,
        deck_id,
    };
    Ok(find_duplicates(notes, &query, |note_id, deck| {
        match store.get_cards_by_note(note_id) {
            Ok(cards) => cards.iter().any(|card| card.deck_id == deck),
            Err(e) => {
                tracing::warn!(note_id, error = %e, "failed to load cards for duplicate check");
                false
            }
        }
    }))
}

fn check_deck<S: Store + ?Sized>(store: &S, deck_id: Option<DeckId>) -> Result<()> {
    if let Some(id) = deck_id {
        if store.get_deck(id)?.is_none() {
            return Err(ServiceError::DeckNotFound(id));
        }
    }
    Ok(())
}

/// Unsuspended cards due at `now`, earliest first, across every deck when
/// `deck_id` is `None`.
pub fn due_cards<S: Store + ?Sized>(
    store: &S,
    deck_id: Option<DeckId>,
    now: DateTime<Utc>,
    limit: usize,
) -> Result<Vec<Card>> {
    check_deck(store, deck_id)?;
    Ok(store.get_due_cards(deck_id, now, limit)?)
}

/// Card counts by learning status for one deck or the whole collection.
///
/// Suspended cards count toward `total_cards` and `suspended_cards` only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeckStats {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deck_id: Option<DeckId>,
    pub total_cards: usize,
    pub new_cards: usize,
    pub learning_cards: usize,
    pub review_cards: usize,
    pub relearning_cards: usize,
    pub suspended_cards: usize,
    pub due_cards: usize,
}

pub fn deck_stats<S: Store + ?Sized>(
    store: &S,
    deck_id: Option<DeckId>,
    now: DateTime<Utc>,
) -> Result<DeckStats> {
    check_deck(store, deck_id)?;

    let mut stats = DeckStats {
        deck_id,
        ..Default::default()
    };
    for card in store.get_cards_by_deck(deck_id)? {
        stats.total_cards += 1;
        if card.suspended {
            stats.suspended_cards += 1;
            continue;
        }
        match card.scheduling.status {
            CardStatus::New => stats.new_cards += 1,
            CardStatus::Learning => stats.learning_cards += 1,
            CardStatus::Review => stats.review_cards += 1,
            CardStatus::Relearning => stats.relearning_cards += 1,
        }
        if card.scheduling.is_due(now) {
            stats.due_cards += 1;
        }
    }
    Ok(stats)
}

/// Record a review: scheduler transition, card write-back and review log.
pub fn answer_card<S: Store + ?Sized>(
    store: &mut S,
    scheduler: &dyn Scheduler,
    card_id: CardId,
    rating: Rating,
    now: DateTime<Utc>,
    time_taken_ms: Option<u32>,
) -> Result<ReviewLogEntry> {
    let mut card = store
        .get_card(card_id)?
        .ok_or(ServiceError::CardNotFound(card_id))?;

    let (next, mut entry) = scheduler.answer(&card.scheduling, rating, now);
    entry.time_taken_ms = time_taken_ms;

    let usn = store.next_usn()?;
    card.scheduling = next;
    card.usn = usn;
    store.update_card(&card)?;
    store.add_review(card_id, &entry)?;
    store.record_usn(usn)?;

    tracing::debug!(card_id, rating = rating.to_value(), "card answered");
    Ok(entry)
}

/// Partial update of a card's user flags. `None` leaves a flag alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardFlagsUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspended: Option<bool>,
}

pub fn update_card_flags<S: Store + ?Sized>(
    store: &mut S,
    card_id: CardId,
    update: &CardFlagsUpdate,
) -> Result<Card> {
    if let Some(flag) = update.flag.filter(|flag| *flag > MAX_FLAG) {
        return Err(ServiceError::InvalidFlag(flag));
    }
    let mut card = store
        .get_card(card_id)?
        .ok_or(ServiceError::CardNotFound(card_id))?;

    if let Some(flag) = update.flag {
        card.flag = flag;
    }
    if let Some(marked) = update.marked {
        card.marked = marked;
    }
    if let Some(suspended) = update.suspended {
        card.suspended = suspended;
    }

    let usn = store.next_usn()?;
    card.usn = usn;
    store.update_card(&card)?;
    store.record_usn(usn)?;
    Ok(card)
}
