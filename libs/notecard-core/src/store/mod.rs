//! Repository pattern for collection storage.
//!
//! Services are generic over [`Store`]; the CLI backs it with SQLite and tests
//! use [`memory::MemoryStore`].

pub mod memory;

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::reconcile::ReconcilePlan;
use crate::types::{Card, CardId, Deck, DeckId, Note, NoteId, NoteType, ReviewLogEntry};

type Result<T> = std::result::Result<T, StoreError>;

/// Repository for note type operations.
pub trait NoteTypeRepository {
    fn get_note_type(&self, name: &str) -> Result<Option<NoteType>>;
    fn list_note_types(&self) -> Result<Vec<NoteType>>;
    /// Insert or replace by name.
    fn save_note_type(&mut self, note_type: &NoteType) -> Result<()>;
}

/// Repository for note operations.
pub trait NoteRepository {
    fn get_note(&self, id: NoteId) -> Result<Option<Note>>;
    /// Notes of one type in id order. A note whose stored data cannot be decoded
    /// comes back as an `Err` entry instead of failing the whole listing.
    fn get_notes_by_type(&self, type_name: &str) -> Result<Vec<Result<Note>>>;
    fn create_note(&mut self, note: &Note) -> Result<()>;
    fn update_note(&mut self, note: &Note) -> Result<()>;
    fn next_note_id(&self) -> Result<NoteId>;
}

/// Repository for card operations.
pub trait CardRepository {
    fn get_card(&self, id: CardId) -> Result<Option<Card>>;
    fn get_cards_by_note(&self, note_id: NoteId) -> Result<Vec<Card>>;
    /// Cards of one deck, or of every deck when `deck_id` is `None`, in id order.
    fn get_cards_by_deck(&self, deck_id: Option<DeckId>) -> Result<Vec<Card>>;
    /// Unsuspended cards due at or before `now`, earliest first.
    fn get_due_cards(&self, deck_id: Option<DeckId>, now: DateTime<Utc>, limit: usize) -> Result<Vec<Card>>;
    fn create_card(&mut self, card: &Card) -> Result<()>;
    fn update_card(&mut self, card: &Card) -> Result<()>;
    fn delete_card(&mut self, id: CardId) -> Result<()>;
    fn next_card_id(&self) -> Result<CardId>;
    fn add_review(&mut self, card_id: CardId, entry: &ReviewLogEntry) -> Result<()>;
    fn get_reviews(&self, card_id: CardId) -> Result<Vec<ReviewLogEntry>>;
}

/// Repository for deck operations.
pub trait DeckRepository {
    fn get_deck(&self, id: DeckId) -> Result<Option<Deck>>;
    fn deck_id_by_name(&self, name: &str) -> Result<Option<DeckId>>;
    fn create_deck(&mut self, name: &str) -> Result<Deck>;
    fn list_decks(&self) -> Result<Vec<Deck>>;
}

/// Everything the collection services need from storage.
pub trait Store: NoteTypeRepository + NoteRepository + CardRepository + DeckRepository {
    /// Highest USN written so far.
    fn current_usn(&self) -> Result<i64>;
    fn record_usn(&mut self, usn: i64) -> Result<()>;

    /// Persist one note's reconciliation result.
    ///
    /// Implementations backed by a transactional store should override this so
    /// the plan is applied all-or-nothing.
    fn apply_plan(&mut self, plan: &ReconcilePlan) -> Result<()> {
        for card in &plan.to_create {
            self.create_card(card)?;
        }
        for card in &plan.to_update {
            self.update_card(card)?;
        }
        for id in &plan.to_delete {
            self.delete_card(*id)?;
        }
        if !plan.is_noop() {
            self.record_usn(plan.usn)?;
        }
        Ok(())
    }

    /// Persist a created or edited note together with its card plan.
    ///
    /// Transactional stores should override this so a failure leaves neither
    /// the note nor its cards changed.
    fn apply_note_plan(&mut self, note: &Note, plan: &ReconcilePlan) -> Result<()> {
        match self.get_note(note.id)? {
            Some(_) => self.update_note(note)?,
            None => self.create_note(note)?,
        }
        self.apply_plan(plan)?;
        self.record_usn(note.usn)
    }

    /// Save an edited note type along with the notes whose fields the edit
    /// rewrote. Transactional stores should override this to write both or
    /// neither.
    fn save_note_type_with_notes(&mut self, note_type: &NoteType, notes: &[Note]) -> Result<()> {
        for note in notes {
            self.update_note(note)?;
        }
        self.save_note_type(note_type)?;
        match notes.iter().map(|note| note.usn).max() {
            Some(usn) => self.record_usn(usn),
            None => Ok(()),
        }
    }

    fn next_usn(&self) -> Result<i64> {
        Ok(self.current_usn()? + 1)
    }

    /// Deck name -> id for resolving template deck overrides.
    fn deck_name_map(&self) -> Result<HashMap<String, DeckId>> {
        Ok(self
            .list_decks()?
            .into_iter()
            .map(|deck| (deck.name, deck.id))
            .collect())
    }

    fn ensure_deck(&mut self, name: &str) -> Result<DeckId> {
        match self.deck_id_by_name(name)? {
            Some(id) => Ok(id),
            None => Ok(self.create_deck(name)?.id),
        }
    }
}
