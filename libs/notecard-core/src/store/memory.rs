//! In-memory store for tests and embedding without a database.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};

use super::{CardRepository, DeckRepository, NoteRepository, NoteTypeRepository, Store};
use crate::error::StoreError;
use crate::reconcile::ReconcilePlan;
use crate::types::{Card, CardId, Deck, DeckId, Note, NoteId, NoteType, ReviewLogEntry};

type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Clone)]
enum StoredNote {
    Valid(Note),
    /// Stands in for a row whose field data no longer decodes.
    Corrupt { type_name: String, reason: String },
}

/// Map-backed [`Store`]. Failures can be injected per note to exercise the
/// batch paths.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    note_types: BTreeMap<String, NoteType>,
    notes: BTreeMap<NoteId, StoredNote>,
    cards: BTreeMap<CardId, Card>,
    decks: BTreeMap<DeckId, Deck>,
    reviews: Vec<(CardId, ReviewLogEntry)>,
    usn: i64,
    failing_notes: HashSet<NoteId>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a note row that fails to decode on read.
    pub fn insert_corrupt_note(&mut self, id: NoteId, type_name: &str, reason: &str) {
        self.notes.insert(
            id,
            StoredNote::Corrupt {
                type_name: type_name.to_string(),
                reason: reason.to_string(),
            },
        );
    }

    /// Make card reads and note or plan writes for `note_id` fail with a
    /// backend error.
    pub fn fail_note(&mut self, note_id: NoteId) {
        self.failing_notes.insert(note_id);
    }

    fn check_note(&self, note_id: NoteId) -> Result<()> {
        if self.failing_notes.contains(&note_id) {
            return Err(StoreError::Backend(format!("injected failure for note {note_id}")));
        }
        Ok(())
    }

    fn check_plan(&self, plan: &ReconcilePlan) -> Result<()> {
        self.check_note(plan.note_id)?;
        if let Some(missing) = plan
            .to_update
            .iter()
            .find(|card| !self.cards.contains_key(&card.id))
        {
            return Err(StoreError::not_found("card", missing.id));
        }
        if let Some(missing) = plan.to_delete.iter().find(|id| !self.cards.contains_key(id)) {
            return Err(StoreError::not_found("card", *missing));
        }
        Ok(())
    }

    /// Write a plan that already passed [`Self::check_plan`].
    fn write_plan(&mut self, plan: &ReconcilePlan) {
        for card in plan.to_create.iter().chain(&plan.to_update) {
            self.cards.insert(card.id, card.clone());
        }
        for id in &plan.to_delete {
            self.cards.remove(id);
            self.reviews.retain(|(card_id, _)| card_id != id);
        }
        if !plan.is_noop() {
            self.usn = self.usn.max(plan.usn);
        }
    }
}

impl NoteTypeRepository for MemoryStore {
    fn get_note_type(&self, name: &str) -> Result<Option<NoteType>> {
        Ok(self.note_types.get(name).cloned())
    }

    fn list_note_types(&self) -> Result<Vec<NoteType>> {
        Ok(self.note_types.values().cloned().collect())
    }

    fn save_note_type(&mut self, note_type: &NoteType) -> Result<()> {
        self.note_types
            .insert(note_type.name.clone(), note_type.clone());
        Ok(())
    }
}

impl NoteRepository for MemoryStore {
    fn get_note(&self, id: NoteId) -> Result<Option<Note>> {
        match self.notes.get(&id) {
            None => Ok(None),
            Some(StoredNote::Valid(note)) => Ok(Some(note.clone())),
            Some(StoredNote::Corrupt { reason, .. }) => {
                Err(StoreError::Corrupt(format!("note {id}: {reason}")))
            }
        }
    }

    fn get_notes_by_type(&self, type_name: &str) -> Result<Vec<Result<Note>>> {
        Ok(self
            .notes
            .iter()
            .filter_map(|(id, stored)| match stored {
                StoredNote::Valid(note) if note.type_name == type_name => Some(Ok(note.clone())),
                StoredNote::Corrupt { type_name: t, reason } if t == type_name => {
                    Some(Err(StoreError::Corrupt(format!("note {id}: {reason}"))))
                }
                _ => None,
            })
            .collect())
    }

    fn create_note(&mut self, note: &Note) -> Result<()> {
        self.check_note(note.id)?;
        self.notes.insert(note.id, StoredNote::Valid(note.clone()));
        Ok(())
    }

    fn update_note(&mut self, note: &Note) -> Result<()> {
        self.check_note(note.id)?;
        if !self.notes.contains_key(&note.id) {
            return Err(StoreError::not_found("note", note.id));
        }
        self.notes.insert(note.id, StoredNote::Valid(note.clone()));
        Ok(())
    }

    fn next_note_id(&self) -> Result<NoteId> {
        Ok(self.notes.keys().next_back().map_or(1, |id| id + 1))
    }
}

impl CardRepository for MemoryStore {
    fn get_card(&self, id: CardId) -> Result<Option<Card>> {
        Ok(self.cards.get(&id).cloned())
    }

    fn get_cards_by_note(&self, note_id: NoteId) -> Result<Vec<Card>> {
        self.check_note(note_id)?;
        Ok(self
            .cards
            .values()
            .filter(|card| card.note_id == note_id)
            .cloned()
            .collect())
    }

    fn get_cards_by_deck(&self, deck_id: Option<DeckId>) -> Result<Vec<Card>> {
        Ok(self
            .cards
            .values()
            .filter(|card| deck_id.map_or(true, |id| card.deck_id == id))
            .cloned()
            .collect())
    }

    fn get_due_cards(&self, deck_id: Option<DeckId>, now: DateTime<Utc>, limit: usize) -> Result<Vec<Card>> {
        let mut due: Vec<Card> = self
            .get_cards_by_deck(deck_id)?
            .into_iter()
            .filter(|card| !card.suspended && card.scheduling.is_due(now))
            .collect();
        due.sort_by_key(|card| (card.scheduling.due_date, card.id));
        due.truncate(limit);
        Ok(due)
    }

    fn create_card(&mut self, card: &Card) -> Result<()> {
        self.cards.insert(card.id, card.clone());
        Ok(())
    }

    fn update_card(&mut self, card: &Card) -> Result<()> {
        match self.cards.get_mut(&card.id) {
            Some(existing) => {
                *existing = card.clone();
                Ok(())
            }
            None => Err(StoreError::not_found("card", card.id)),
        }
    }

    fn delete_card(&mut self, id: CardId) -> Result<()> {
        if self.cards.remove(&id).is_none() {
            return Err(StoreError::not_found("card", id));
        }
        self.reviews.retain(|(card_id, _)| *card_id != id);
        Ok(())
    }

    fn next_card_id(&self) -> Result<CardId> {
        Ok(self.cards.keys().next_back().map_or(1, |id| id + 1))
    }

    fn add_review(&mut self, card_id: CardId, entry: &ReviewLogEntry) -> Result<()> {
        self.reviews.push((card_id, entry.clone()));
        Ok(())
    }

    fn get_reviews(&self, card_id: CardId) -> Result<Vec<ReviewLogEntry>> {
        Ok(self
            .reviews
            .iter()
            .filter(|(id, _)| *id == card_id)
            .map(|(_, entry)| entry.clone())
            .collect())
    }
}

impl DeckRepository for MemoryStore {
    fn get_deck(&self, id: DeckId) -> Result<Option<Deck>> {
        Ok(self.decks.get(&id).cloned())
    }

    fn deck_id_by_name(&self, name: &str) -> Result<Option<DeckId>> {
        Ok(self
            .decks
            .values()
            .find(|deck| deck.name == name)
            .map(|deck| deck.id))
    }

    fn create_deck(&mut self, name: &str) -> Result<Deck> {
        let id = self.decks.keys().next_back().map_or(1, |id| id + 1);
        let deck = Deck {
            id,
            name: name.to_string(),
        };
        self.decks.insert(id, deck.clone());
        Ok(deck)
    }

    fn list_decks(&self) -> Result<Vec<Deck>> {
        Ok(self.decks.values().cloned().collect())
    }
}

impl Store for MemoryStore {
    fn current_usn(&self) -> Result<i64> {
        Ok(self.usn)
    }

    fn record_usn(&mut self, usn: i64) -> Result<()> {
        self.usn = self.usn.max(usn);
        Ok(())
    }

    /// Validates the whole plan before touching anything.
    fn apply_plan(&mut self, plan: &ReconcilePlan) -> Result<()> {
        self.check_plan(plan)?;
        self.write_plan(plan);
        Ok(())
    }

    fn apply_note_plan(&mut self, note: &Note, plan: &ReconcilePlan) -> Result<()> {
        self.check_note(note.id)?;
        self.check_plan(plan)?;
        self.notes.insert(note.id, StoredNote::Valid(note.clone()));
        self.write_plan(plan);
        self.usn = self.usn.max(note.usn);
        Ok(())
    }

    fn save_note_type_with_notes(&mut self, note_type: &NoteType, notes: &[Note]) -> Result<()> {
        for note in notes {
            self.check_note(note.id)?;
            if !self.notes.contains_key(&note.id) {
                return Err(StoreError::not_found("note", note.id));
            }
        }
        for note in notes {
            self.notes.insert(note.id, StoredNote::Valid(note.clone()));
            self.usn = self.usn.max(note.usn);
        }
        self.note_types
            .insert(note_type.name.clone(), note_type.clone());
        Ok(())
    }
}
