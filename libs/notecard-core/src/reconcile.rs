//! Reconciliation of freshly compiled drafts against a note's persisted cards.
//!
//! Cards are matched on `(template_name, ordinal)`. A matched card keeps its
//! id, deck, scheduling state and user flags; only its rendered content moves.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scheduler::Scheduler;
use crate::types::{Card, CardDraft, CardId, CardIdentity, DeckId, IdSequence, NoteId, NoteType};

/// Inputs shared by every draft of one note.
pub struct ReconcileContext<'a> {
    pub note_id: NoteId,
    /// Deck for new cards whose template has no usable override.
    pub default_deck: DeckId,
    /// USN stamped on created cards and on cards whose content changed.
    pub usn: i64,
    pub now: DateTime<Utc>,
    pub scheduler: &'a dyn Scheduler,
    /// Deck name -> id, used to resolve template deck overrides.
    pub deck_overrides: &'a HashMap<String, DeckId>,
}

/// Create/update/delete sets for one note.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconcilePlan {
    pub note_id: NoteId,
    pub usn: i64,
    pub to_create: Vec<Card>,
    /// Matched cards whose front or back changed.
    pub to_update: Vec<Card>,
    pub to_delete: Vec<CardId>,
    /// Matched cards with identical content. Nothing to write.
    pub unchanged: Vec<CardId>,
}

impl ReconcilePlan {
    /// True when applying the plan would write nothing.
    pub fn is_noop(&self) -> bool {
        self.to_create.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }
}

/// Match `drafts` against `existing` and decide what to create, update and delete.
///
/// Running this twice on unchanged input yields a no-op plan the second time.
pub fn reconcile(
    existing: Vec<Card>,
    drafts: Vec<CardDraft>,
    note_type: &NoteType,
    ctx: &ReconcileContext<'_>,
    ids: &mut IdSequence,
) -> ReconcilePlan {
    let mut plan = ReconcilePlan {
        note_id: ctx.note_id,
        usn: ctx.usn,
        ..Default::default()
    };

    let mut existing = existing;
    existing.sort_by_key(|card| card.id);

    let mut index: BTreeMap<CardIdentity, Card> = BTreeMap::new();
    for card in existing {
        let identity = card.identity();
        if index.contains_key(&identity) {
            tracing::warn!(
                note_id = ctx.note_id,
                card_id = card.id,
                identity = %identity,
                "duplicate card identity, scheduling extra card for deletion"
            );
            plan.to_delete.push(card.id);
            continue;
        }
        index.insert(identity, card);
    }

    let mut seen = HashSet::new();
    for draft in drafts {
        let identity = draft.identity();
        if !seen.insert(identity.clone()) {
            tracing::debug!(note_id = ctx.note_id, identity = %identity, "duplicate draft skipped");
            continue;
        }

        match index.remove(&identity) {
            Some(card) if card.front == draft.front && card.back == draft.back => {
                plan.unchanged.push(card.id);
            }
            Some(mut card) => {
                card.front = draft.front;
                card.back = draft.back;
                card.usn = ctx.usn;
                plan.to_update.push(card);
            }
            None => {
                let deck_id = resolve_deck(note_type, &draft.template_name, ctx);
                plan.to_create.push(Card {
                    id: ids.allocate(),
                    note_id: ctx.note_id,
                    deck_id,
                    template_name: draft.template_name,
                    ordinal: draft.ordinal,
                    front: draft.front,
                    back: draft.back,
                    scheduling: ctx.scheduler.new_card(ctx.now),
                    flag: 0,
                    marked: false,
                    suspended: false,
                    usn: ctx.usn,
                });
            }
        }
    }

    plan.to_delete.extend(index.into_values().map(|card| card.id));
    plan.to_delete.sort_unstable();

    tracing::debug!(
        note_id = ctx.note_id,
        created = plan.to_create.len(),
        updated = plan.to_update.len(),
        deleted = plan.to_delete.len(),
        unchanged = plan.unchanged.len(),
        "reconciled note"
    );
    plan
}

fn resolve_deck(note_type: &NoteType, template_name: &str, ctx: &ReconcileContext<'_>) -> DeckId {
    let Some(name) = note_type
        .template(template_name)
        .and_then(|template| template.deck_override_name())
    else {
        return ctx.default_deck;
    };

    match ctx.deck_overrides.get(name) {
        Some(id) => *id,
        None => {
            tracing::warn!(
                template = template_name,
                deck = name,
                "deck override does not resolve, using default deck"
            );
            ctx.default_deck
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::builtins;
    use crate::compiler::compile;
    use crate::scheduler::Sm2;
    use crate::types::{CardStatus, CardTemplate, FieldMap, Note, SchedulingState};
    use pretty_assertions::assert_eq;

    struct Fixture {
        types: Vec<NoteType>,
        scheduler: Sm2,
        overrides: HashMap<String, DeckId>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                types: builtins(),
                scheduler: Sm2::default(),
                overrides: HashMap::new(),
            }
        }

        fn ctx(&self, usn: i64) -> ReconcileContext<'_> {
            ReconcileContext {
                note_id: 1,
                default_deck: 1,
                usn,
                now: Utc::now(),
                scheduler: &self.scheduler,
                deck_overrides: &self.overrides,
            }
        }

        fn note_type(&self, name: &str) -> &NoteType {
            self.types.iter().find(|nt| nt.name == name).unwrap()
        }

        fn run(&self, note: &Note, existing: Vec<Card>, usn: i64, ids: &mut IdSequence) -> ReconcilePlan {
            let drafts = compile(&self.types, note).unwrap();
            reconcile(existing, drafts, self.note_type(&note.type_name), &self.ctx(usn), ids)
        }
    }

    fn note(type_name: &str, pairs: &[(&str, &str)]) -> Note {
        Note {
            id: 1,
            type_name: type_name.to_string(),
            field_map: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<FieldMap>(),
            tags: vec![],
            created_at: Utc::now(),
            modified_at: Utc::now(),
            usn: 0,
        }
    }

    /// Cards as they would exist after `plan` was persisted.
    fn applied(mut existing: Vec<Card>, plan: &ReconcilePlan) -> Vec<Card> {
        existing.retain(|c| !plan.to_delete.contains(&c.id));
        for updated in &plan.to_update {
            if let Some(card) = existing.iter_mut().find(|c| c.id == updated.id) {
                *card = updated.clone();
            }
        }
        existing.extend(plan.to_create.iter().cloned());
        existing
    }

    #[test]
    fn first_run_creates_everything() {
        let fx = Fixture::new();
        let mut ids = IdSequence::starting_at(1);
        let plan = fx.run(&note("Cloze", &[("Text", "{{c1::a}} {{c2::b}}")]), vec![], 1, &mut ids);
        assert_eq!(plan.to_create.len(), 2);
        assert_eq!(plan.to_create[0].id, 1);
        assert_eq!(plan.to_create[1].id, 2);
        assert_eq!(plan.to_create[0].scheduling.status, CardStatus::New);
        assert!(plan.to_update.is_empty());
        assert!(plan.to_delete.is_empty());
    }

    #[test]
    fn reconcile_is_idempotent() {
        let fx = Fixture::new();
        let mut ids = IdSequence::starting_at(1);
        let n = note("Basic (and reversed card)", &[("Front", "F"), ("Back", "B")]);

        let first = fx.run(&n, vec![], 1, &mut ids);
        let cards = applied(vec![], &first);

        let second = fx.run(&n, cards.clone(), 2, &mut ids);
        assert!(second.is_noop());
        assert_eq!(second.unchanged.len(), 2);

        let third = fx.run(&n, cards, 3, &mut ids);
        assert!(third.is_noop());
    }

    #[test]
    fn content_change_updates_in_place() {
        let fx = Fixture::new();
        let mut ids = IdSequence::starting_at(1);
        let first = fx.run(&note("Basic", &[("Front", "F"), ("Back", "B")]), vec![], 1, &mut ids);
        let mut cards = applied(vec![], &first);
        cards[0].scheduling = SchedulingState {
            status: CardStatus::Review,
            interval_days: 12.0,
            ..Default::default()
        };
        cards[0].flag = 3;

        let plan = fx.run(&note("Basic", &[("Front", "F2"), ("Back", "B")]), cards.clone(), 7, &mut ids);
        assert!(plan.to_create.is_empty());
        assert!(plan.to_delete.is_empty());
        let updated = &plan.to_update[0];
        assert_eq!(updated.id, cards[0].id);
        assert_eq!(updated.front, "Q: F2");
        assert_eq!(updated.usn, 7);
        assert_eq!(updated.scheduling, cards[0].scheduling);
        assert_eq!(updated.flag, 3);
    }

    #[test]
    fn unchanged_card_keeps_usn() {
        let fx = Fixture::new();
        let mut ids = IdSequence::starting_at(1);
        let n = note("Basic", &[("Front", "F"), ("Back", "B")]);
        let cards = applied(vec![], &fx.run(&n, vec![], 1, &mut ids));
        let plan = fx.run(&n, cards, 9, &mut ids);
        assert!(plan.to_update.is_empty());
        assert_eq!(plan.unchanged, vec![1]);
    }

    #[test]
    fn removed_cloze_deletes_only_that_ordinal() {
        let fx = Fixture::new();
        let mut ids = IdSequence::starting_at(1);
        let text = "The {{c1::capital}} of {{c2::France}} is Paris";
        let cards = applied(vec![], &fx.run(&note("Cloze", &[("Text", text)]), vec![], 1, &mut ids));
        let ord1 = cards.iter().find(|c| c.ordinal == 1).unwrap().clone();
        let ord2 = cards.iter().find(|c| c.ordinal == 2).unwrap().clone();

        let plan = fx.run(
            &note("Cloze", &[("Text", "The {{c1::capital}} of France is Paris")]),
            cards,
            2,
            &mut ids,
        );
        assert_eq!(plan.to_delete, vec![ord2.id]);
        assert!(plan.to_create.is_empty());
        let kept = plan
            .to_update
            .iter()
            .find(|c| c.id == ord1.id)
            .cloned()
            .unwrap_or(ord1.clone());
        assert_eq!(kept.scheduling, ord1.scheduling);
    }

    #[test]
    fn blank_gate_deletes_gated_card() {
        let fx = Fixture::new();
        let mut ids = IdSequence::starting_at(1);
        let name = "Basic (optional reversed card)";
        let cards = applied(
            vec![],
            &fx.run(&note(name, &[("Front", "F"), ("Back", "B"), ("Add Reverse", "y")]), vec![], 1, &mut ids),
        );
        assert_eq!(cards.len(), 2);
        let reverse_id = cards.iter().find(|c| c.template_name == "Card 2 (optional reverse)").unwrap().id;

        let plan = fx.run(&note(name, &[("Front", "F"), ("Back", "B")]), cards, 2, &mut ids);
        assert_eq!(plan.to_delete, vec![reverse_id]);
    }

    #[test]
    fn duplicate_existing_identity_keeps_lowest_id() {
        let fx = Fixture::new();
        let mut ids = IdSequence::starting_at(1);
        let n = note("Basic", &[("Front", "F"), ("Back", "B")]);
        let mut cards = applied(vec![], &fx.run(&n, vec![], 1, &mut ids));
        let mut dup = cards[0].clone();
        dup.id = 50;
        cards.insert(0, dup);

        let plan = fx.run(&n, cards, 2, &mut ids);
        assert_eq!(plan.to_delete, vec![50]);
        assert_eq!(plan.unchanged, vec![1]);
    }

    #[test]
    fn deck_override_resolves_by_name() {
        let mut fx = Fixture::new();
        fx.overrides.insert("Vocab".to_string(), 9);
        let nt = NoteType::new(
            "Split",
            &["Front", "Back"],
            vec![
                CardTemplate::new("Card 1", "{{Front}}", "{{Back}}"),
                CardTemplate::new("Card 2", "{{Back}}", "{{Front}}").with_deck_override("Vocab"),
                CardTemplate::new("Card 3", "{{Back}}", "{{Back}}").with_deck_override("Missing"),
            ],
        );
        let n = note("Split", &[("Front", "F"), ("Back", "B")]);
        let drafts = compile(&nt, &n).unwrap();
        let mut ids = IdSequence::starting_at(1);
        let plan = reconcile(vec![], drafts, &nt, &fx.ctx(1), &mut ids);
        let decks: Vec<_> = plan.to_create.iter().map(|c| c.deck_id).collect();
        assert_eq!(decks, vec![1, 9, 1]);
    }
}
