//! Core types for note types, notes and cards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type NoteId = i64;
pub type CardId = i64;
pub type DeckId = i64;

/// Field name -> value. Absent keys are treated as empty.
pub type FieldMap = BTreeMap<String, String>;

/// Per-field display metadata. Irrelevant to compilation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<u32>,
    #[serde(default)]
    pub rtl: bool,
    #[serde(default)]
    pub sticky: bool,
}

/// A card template belonging to a note type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardTemplate {
    pub name: String,
    pub q_fmt: String,
    pub a_fmt: String,
    #[serde(default)]
    pub styling: String,
    /// Gate field for non-cloze templates. Blank means unconditional.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub if_field_non_empty: Option<String>,
    #[serde(default)]
    pub is_cloze: bool,
    /// Deck name that generated cards are placed in, regardless of the note's deck.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deck_override: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser_q_fmt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser_a_fmt: Option<String>,
}

impl CardTemplate {
    pub fn new(name: impl Into<String>, q_fmt: impl Into<String>, a_fmt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            q_fmt: q_fmt.into(),
            a_fmt: a_fmt.into(),
            ..Default::default()
        }
    }

    pub fn gated_on(mut self, field: impl Into<String>) -> Self {
        self.if_field_non_empty = Some(field.into());
        self
    }

    pub fn cloze(mut self) -> Self {
        self.is_cloze = true;
        self
    }

    pub fn with_deck_override(mut self, deck: impl Into<String>) -> Self {
        self.deck_override = Some(deck.into());
        self
    }

    /// The gate field, if one is set and non-blank.
    pub fn gate_field(&self) -> Option<&str> {
        self.if_field_non_empty
            .as_deref()
            .filter(|name| !name.trim().is_empty())
    }

    /// The deck override name, if one is set and non-blank.
    pub fn deck_override_name(&self) -> Option<&str> {
        self.deck_override
            .as_deref()
            .filter(|name| !name.trim().is_empty())
    }
}

/// A note type: ordered fields plus the templates that turn notes into cards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteType {
    pub name: String,
    pub fields: Vec<String>,
    pub templates: Vec<CardTemplate>,
    /// Position in `fields`, not bound to a field name.
    #[serde(default)]
    pub sort_field_index: usize,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub field_options: BTreeMap<String, FieldOptions>,
}

impl NoteType {
    pub fn new(name: impl Into<String>, fields: &[&str], templates: Vec<CardTemplate>) -> Self {
        Self {
            name: name.into(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
            templates,
            sort_field_index: 0,
            field_options: BTreeMap::new(),
        }
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f == name)
    }

    pub fn template(&self, name: &str) -> Option<&CardTemplate> {
        self.templates.iter().find(|t| t.name == name)
    }

    /// The field currently at `sort_field_index`.
    pub fn sort_field(&self) -> Option<&str> {
        self.fields.get(self.sort_field_index).map(String::as_str)
    }
}

/// A user-entered note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub type_name: String,
    pub field_map: FieldMap,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub usn: i64,
}

impl Note {
    /// Field value, or empty string if the key is absent.
    pub fn field(&self, name: &str) -> &str {
        self.field_map.get(name).map(String::as_str).unwrap_or("")
    }
}

/// Short note view returned by duplicate checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteBrief {
    pub id: NoteId,
    pub type_name: String,
    pub field_map: FieldMap,
}

impl From<&Note> for NoteBrief {
    fn from(note: &Note) -> Self {
        Self {
            id: note.id,
            type_name: note.type_name.clone(),
            field_map: note.field_map.clone(),
        }
    }
}

/// Stable identity of a card within one note's card set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CardIdentity {
    pub template_name: String,
    pub ordinal: u32,
}

impl std::fmt::Display for CardIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.template_name, self.ordinal)
    }
}

/// Compiled card content without identity or scheduling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardDraft {
    pub template_name: String,
    /// 0 for non-cloze templates, the cloze number otherwise.
    pub ordinal: u32,
    pub front: String,
    pub back: String,
}

impl CardDraft {
    pub fn identity(&self) -> CardIdentity {
        CardIdentity {
            template_name: self.template_name.clone(),
            ordinal: self.ordinal,
        }
    }
}

/// A persisted card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: CardId,
    pub note_id: NoteId,
    pub deck_id: DeckId,
    pub template_name: String,
    pub ordinal: u32,
    pub front: String,
    pub back: String,
    pub scheduling: SchedulingState,
    /// 0 = none, 1-7 = color flags.
    #[serde(default)]
    pub flag: u8,
    #[serde(default)]
    pub marked: bool,
    #[serde(default)]
    pub suspended: bool,
    pub usn: i64,
}

impl Card {
    pub fn identity(&self) -> CardIdentity {
        CardIdentity {
            template_name: self.template_name.clone(),
            ordinal: self.ordinal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deck {
    pub id: DeckId,
    pub name: String,
}

/// Monotonic integer id allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdSequence {
    next: i64,
}

impl IdSequence {
    /// Sequence whose first id is `first`.
    pub fn starting_at(first: i64) -> Self {
        Self { next: first.max(1) }
    }

    pub fn allocate(&mut self) -> i64 {
        let id = self.next;
        self.next += 1;
        id
    }
}

/// Card learning status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardStatus {
    #[default]
    New,
    Learning,
    Review,
    Relearning,
}

impl CardStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Learning => "learning",
            Self::Review => "review",
            Self::Relearning => "relearning",
        }
    }
}

/// Rating for a review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rating {
    Again,
    Hard,
    Good,
    Easy,
}

impl Rating {
    /// Convert to 4-point numeric value (1-4).
    pub fn to_value(self) -> u8 {
        match self {
            Self::Again => 1,
            Self::Hard => 2,
            Self::Good => 3,
            Self::Easy => 4,
        }
    }

    /// Create from 4-point numeric value.
    pub fn from_value(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Again),
            2 => Some(Self::Hard),
            3 => Some(Self::Good),
            4 => Some(Self::Easy),
            _ => None,
        }
    }
}

/// Scheduling state owned by the scheduler. Opaque to compilation and reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulingState {
    pub status: CardStatus,
    pub interval_days: f64,
    pub ease_factor: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stability: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<f64>,
    pub lapses: u32,
    pub reviews_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
}

impl Default for SchedulingState {
    fn default() -> Self {
        Self {
            status: CardStatus::New,
            interval_days: 0.0,
            ease_factor: 2.5,
            stability: None,
            difficulty: None,
            lapses: 0,
            reviews_count: 0,
            due_date: None,
        }
    }
}

impl SchedulingState {
    /// Whether a card in this state should be studied at `now`. Cards with no
    /// due date are never due.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.due_date.is_some_and(|due| due <= now)
    }
}

/// One answered review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewLogEntry {
    pub rating: Rating,
    pub reviewed_at: DateTime<Utc>,
    pub status_before: CardStatus,
    pub interval_before: f64,
    pub interval_after: f64,
    pub ease_before: f64,
    pub ease_after: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_taken_ms: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_field_reads_as_empty() {
        let note = Note {
            id: 1,
            type_name: "Basic".to_string(),
            field_map: FieldMap::from([("Front".to_string(), "hi".to_string())]),
            tags: vec![],
            created_at: Utc::now(),
            modified_at: Utc::now(),
            usn: 0,
        };
        assert_eq!(note.field("Front"), "hi");
        assert_eq!(note.field("Back"), "");
    }

    #[test]
    fn blank_gate_counts_as_unset() {
        let template = CardTemplate::new("Card 1", "{{Front}}", "{{Back}}").gated_on("  ");
        assert_eq!(template.gate_field(), None);
        let template = template.gated_on("Add Reverse");
        assert_eq!(template.gate_field(), Some("Add Reverse"));
    }

    #[test]
    fn id_sequence_allocates_upward_from_one() {
        let mut ids = IdSequence::starting_at(8);
        assert_eq!(ids.allocate(), 8);
        assert_eq!(ids.allocate(), 9);
        assert_eq!(IdSequence::starting_at(0).allocate(), 1);
        assert_eq!(CardStatus::default(), CardStatus::New);
    }

    #[test]
    fn due_includes_the_boundary() {
        let now = Utc::now();
        let mut state = SchedulingState::default();
        assert!(!state.is_due(now));
        state.due_date = Some(now);
        assert!(state.is_due(now));
        state.due_date = Some(now + chrono::Duration::seconds(1));
        assert!(!state.is_due(now));
    }

    #[test]
    fn identity_orders_by_template_then_ordinal() {
        let a = CardIdentity { template_name: "Cloze".to_string(), ordinal: 2 };
        let b = CardIdentity { template_name: "Cloze".to_string(), ordinal: 10 };
        assert!(a < b);
        assert_eq!(a.to_string(), "Cloze:2");
    }

    #[test]
    fn rating_round_trips_through_value() {
        assert_eq!(Rating::from_value(Rating::Hard.to_value()), Some(Rating::Hard));
        assert_eq!(Rating::from_value(0), None);
    }

    #[test]
    fn note_type_sort_field_is_positional() {
        let mut nt = NoteType::new("Basic", &["Front", "Back"], vec![]);
        assert_eq!(nt.sort_field(), Some("Front"));
        nt.fields.swap(0, 1);
        assert_eq!(nt.sort_field(), Some("Back"));
    }
}
