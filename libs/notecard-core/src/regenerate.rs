//! Batch regeneration of every note of a note type after a template or field edit.
//!
//! Notes are processed one at a time. Compile, reconcile and persist for a
//! single note is one unit; cancellation is only observed between notes, and a
//! failing note is recorded in the report without stopping the batch.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::compiler::compile;
use crate::error::{CompileError, Result};
use crate::reconcile::{reconcile, ReconcileContext, ReconcilePlan};
use crate::scheduler::Scheduler;
use crate::store::Store;
use crate::types::{DeckId, IdSequence, Note, NoteId, NoteType};

/// Shared cancellation signal, checked between notes.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct RegenerationOptions {
    /// Deck for new cards of notes that have no cards to infer a deck from.
    pub default_deck: DeckId,
    pub now: DateTime<Utc>,
    pub cancel: CancelFlag,
}

impl RegenerationOptions {
    pub fn new(default_deck: DeckId, now: DateTime<Utc>) -> Self {
        Self {
            default_deck,
            now,
            cancel: CancelFlag::new(),
        }
    }
}

/// A note that could not be regenerated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteFailure {
    /// Absent when the stored note could not even be decoded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note_id: Option<NoteId>,
    pub error: String,
}

/// Outcome of a batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegenerationReport {
    pub note_type: String,
    pub notes_total: usize,
    pub notes_succeeded: usize,
    pub notes_failed: usize,
    pub cards_created: usize,
    pub cards_updated: usize,
    pub cards_deleted: usize,
    pub failures: Vec<NoteFailure>,
    pub cancelled: bool,
}

impl RegenerationReport {
    fn record_plan(&mut self, plan: &ReconcilePlan) {
        self.notes_succeeded += 1;
        self.cards_created += plan.to_create.len();
        self.cards_updated += plan.to_update.len();
        self.cards_deleted += plan.to_delete.len();
    }

    fn record_failure(&mut self, note_id: Option<NoteId>, error: String) {
        self.notes_failed += 1;
        self.failures.push(NoteFailure { note_id, error });
    }
}

/// Per-batch inputs for regenerating single notes.
pub(crate) struct NoteRegenerator<'a> {
    pub scheduler: &'a dyn Scheduler,
    pub deck_names: HashMap<String, DeckId>,
    pub default_deck: DeckId,
    pub usn: i64,
    pub now: DateTime<Utc>,
}

impl NoteRegenerator<'_> {
    /// Compile, reconcile and persist one note.
    pub fn run<S: Store + ?Sized>(
        &self,
        store: &mut S,
        note_type: &NoteType,
        note: &Note,
    ) -> Result<ReconcilePlan> {
        let plan = self.plan(&*store, note_type, note)?;
        store.apply_plan(&plan)?;
        Ok(plan)
    }

    /// Compile and reconcile one note without writing anything.
    pub fn plan<S: Store + ?Sized>(
        &self,
        store: &S,
        note_type: &NoteType,
        note: &Note,
    ) -> Result<ReconcilePlan> {
        let drafts = compile(note_type, note)?;
        let existing = store.get_cards_by_note(note.id)?;
        let default_deck = existing
            .first()
            .map_or(self.default_deck, |card| card.deck_id);

        let ctx = ReconcileContext {
            note_id: note.id,
            default_deck,
            usn: self.usn,
            now: self.now,
            scheduler: self.scheduler,
            deck_overrides: &self.deck_names,
        };
        let mut ids = IdSequence::starting_at(store.next_card_id()?);
        Ok(reconcile(existing, drafts, note_type, &ctx, &mut ids))
    }
}

/// Recompile and reconcile every note of `type_name`.
///
/// Fails only when the note type or the note listing cannot be loaded; any
/// per-note error ends up in the report.
pub fn regenerate_note_type<S: Store + ?Sized>(
    store: &mut S,
    scheduler: &dyn Scheduler,
    type_name: &str,
    options: &RegenerationOptions,
) -> Result<RegenerationReport> {
    let note_type = store
        .get_note_type(type_name)?
        .ok_or_else(|| CompileError::UnknownNoteType(type_name.to_string()))?;
    let notes = store.get_notes_by_type(type_name)?;

    let regenerator = NoteRegenerator {
        scheduler,
        deck_names: store.deck_name_map()?,
        default_deck: options.default_deck,
        usn: store.next_usn()?,
        now: options.now,
    };

    let mut report = RegenerationReport {
        note_type: type_name.to_string(),
        notes_total: notes.len(),
        ..Default::default()
    };
    tracing::info!(note_type = type_name, notes = notes.len(), "regenerating cards");

    for entry in notes {
        if options.cancel.is_cancelled() {
            tracing::info!(
                note_type = type_name,
                processed = report.notes_succeeded + report.notes_failed,
                "regeneration cancelled"
            );
            report.cancelled = true;
            break;
        }

        let note = match entry {
            Ok(note) => note,
            Err(e) => {
                tracing::warn!(note_type = type_name, error = %e, "skipping undecodable note");
                report.record_failure(None, e.to_string());
                continue;
            }
        };

        match regenerator.run(&mut *store, &note_type, &note) {
            Ok(plan) => report.record_plan(&plan),
            Err(e) => {
                tracing::warn!(note_id = note.id, error = %e, "failed to regenerate note");
                report.record_failure(Some(note.id), e.to_string());
            }
        }
    }

    tracing::info!(
        note_type = type_name,
        succeeded = report.notes_succeeded,
        failed = report.notes_failed,
        created = report.cards_created,
        updated = report.cards_updated,
        deleted = report.cards_deleted,
        "regeneration finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::{NoteTypeEditor, TemplateUpdate};
    use crate::error::ServiceError;
    use crate::scheduler::Sm2;
    use crate::service::{add_note, seed_builtins};
    use crate::store::memory::MemoryStore;
    use crate::store::{CardRepository, NoteTypeRepository};
    use crate::types::{CardStatus, FieldMap, Rating};

    fn fields(pairs: &[(&str, &str)]) -> FieldMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn setup(notes: usize) -> (MemoryStore, DeckId, Vec<NoteId>) {
        let mut store = MemoryStore::new();
        let deck = seed_builtins(&mut store, "Default").unwrap();
        let ids = (0..notes)
            .map(|i| {
                let front = format!("front {i}");
                add_note(
                    &mut store,
                    &Sm2::default(),
                    "Basic",
                    deck,
                    fields(&[("Front", front.as_str()), ("Back", "back")]),
                    vec![],
                    Utc::now(),
                )
                .unwrap()
                .note
                .id
            })
            .collect();
        (store, deck, ids)
    }

    fn edit_front_template(store: &mut MemoryStore, q_fmt: &str) {
        let mut nt = store.get_note_type("Basic").unwrap().unwrap();
        NoteTypeEditor::new(&mut nt)
            .update_template(
                "Card 1",
                TemplateUpdate {
                    q_fmt: Some(q_fmt.to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        store.save_note_type(&nt).unwrap();
    }

    #[test]
    fn template_edit_updates_cards_and_keeps_history() {
        let (mut store, deck, ids) = setup(3);
        let sm2 = Sm2::default();
        let card = store.get_cards_by_note(ids[0]).unwrap().remove(0);
        let (reviewed, _) = sm2.answer(&card.scheduling, Rating::Good, Utc::now());
        store
            .update_card(&crate::types::Card {
                scheduling: reviewed.clone(),
                ..card.clone()
            })
            .unwrap();

        edit_front_template(&mut store, "Question: {{Front}}");
        let report = regenerate_note_type(&mut store, &sm2, "Basic", &RegenerationOptions::new(deck, Utc::now())).unwrap();

        assert_eq!(report.notes_total, 3);
        assert_eq!(report.notes_succeeded, 3);
        assert_eq!(report.cards_updated, 3);
        assert_eq!(report.cards_created, 0);
        assert_eq!(report.cards_deleted, 0);

        let after = store.get_card(card.id).unwrap().unwrap();
        assert_eq!(after.front, "Question: front 0");
        assert_eq!(after.scheduling, reviewed);
        assert_eq!(after.scheduling.status, CardStatus::Review);
    }

    #[test]
    fn second_run_is_a_noop() {
        let (mut store, deck, _) = setup(2);
        let opts = RegenerationOptions::new(deck, Utc::now());
        let report = regenerate_note_type(&mut store, &Sm2::default(), "Basic", &opts).unwrap();
        assert_eq!(report.notes_succeeded, 2);
        assert_eq!(report.cards_created + report.cards_updated + report.cards_deleted, 0);
    }

    #[test]
    fn failing_note_does_not_abort_batch() {
        let (mut store, deck, ids) = setup(3);
        store.fail_note(ids[1]);
        edit_front_template(&mut store, "Changed: {{Front}}");

        let report = regenerate_note_type(&mut store, &Sm2::default(), "Basic", &RegenerationOptions::new(deck, Utc::now())).unwrap();
        assert_eq!(report.notes_succeeded, 2);
        assert_eq!(report.notes_failed, 1);
        assert_eq!(report.failures[0].note_id, Some(ids[1]));
        assert!(!report.cancelled);
    }

    #[test]
    fn undecodable_note_is_counted_as_failure() {
        let (mut store, deck, _) = setup(1);
        store.insert_corrupt_note(99, "Basic", "bad field json");
        let report = regenerate_note_type(&mut store, &Sm2::default(), "Basic", &RegenerationOptions::new(deck, Utc::now())).unwrap();
        assert_eq!(report.notes_total, 2);
        assert_eq!(report.notes_succeeded, 1);
        assert_eq!(report.notes_failed, 1);
        assert_eq!(report.failures[0].note_id, None);
    }

    #[test]
    fn cancelled_before_start_processes_nothing() {
        let (mut store, deck, _) = setup(2);
        edit_front_template(&mut store, "Changed: {{Front}}");
        let opts = RegenerationOptions::new(deck, Utc::now());
        opts.cancel.cancel();

        let report = regenerate_note_type(&mut store, &Sm2::default(), "Basic", &opts).unwrap();
        assert!(report.cancelled);
        assert_eq!(report.notes_succeeded, 0);
        assert_eq!(report.cards_updated, 0);
    }

    #[test]
    fn removed_template_deletes_its_cards() {
        let mut store = MemoryStore::new();
        let deck = seed_builtins(&mut store, "Default").unwrap();
        let added = add_note(
            &mut store,
            &Sm2::default(),
            "Basic (and reversed card)",
            deck,
            fields(&[("Front", "F"), ("Back", "B")]),
            vec![],
            Utc::now(),
        )
        .unwrap();
        assert_eq!(added.cards.len(), 2);

        let mut nt = store.get_note_type("Basic (and reversed card)").unwrap().unwrap();
        NoteTypeEditor::new(&mut nt).remove_template("Card 2").unwrap();
        store.save_note_type(&nt).unwrap();

        let report = regenerate_note_type(
            &mut store,
            &Sm2::default(),
            "Basic (and reversed card)",
            &RegenerationOptions::new(deck, Utc::now()),
        )
        .unwrap();
        assert_eq!(report.cards_deleted, 1);
        let remaining = store.get_cards_by_note(added.note.id).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].template_name, "Card 1");
    }

    #[test]
    fn unknown_note_type_is_an_error() {
        let mut store = MemoryStore::new();
        let err = regenerate_note_type(&mut store, &Sm2::default(), "Nope", &RegenerationOptions::new(1, Utc::now()))
            .unwrap_err();
        assert!(matches!(err, ServiceError::Compile(CompileError::UnknownNoteType(_))));
    }
}
