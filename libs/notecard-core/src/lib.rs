//! Note-to-card compilation library shared by the CLI and any embedding app.
//!
//! Provides:
//! - Template tokenizer with plain and cloze-aware substitution
//! - Card compiler (note + note type -> card drafts)
//! - Reconciliation of drafts against persisted cards, keeping scheduling history
//! - Duplicate detection and note type editing rules
//! - Repository traits, an in-memory store and batch regeneration
//! - Shared types (NoteType, Note, Card, SchedulingState, etc.)

pub mod builtins;
pub mod cloze;
pub mod compiler;
pub mod duplicates;
pub mod editor;
pub mod error;
pub mod reconcile;
pub mod regenerate;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod template;
pub mod types;

pub use compiler::{compile, NoteTypeLookup, CLOZE_SOURCE_FIELD};
pub use editor::{NoteTypeEdit, NoteTypeEditor, TemplateUpdate, RESERVED_FIELD_NAMES};
pub use error::{CompileError, EditError, ServiceError, StoreError};
pub use reconcile::{reconcile, ReconcileContext, ReconcilePlan};
pub use regenerate::{regenerate_note_type, CancelFlag, RegenerationOptions, RegenerationReport};
pub use scheduler::{Scheduler, Sm2};
pub use store::{memory::MemoryStore, Store};
pub use types::{
    Card, CardDraft, CardId, CardIdentity, CardStatus, CardTemplate, Deck, DeckId, FieldMap,
    FieldOptions, IdSequence, Note, NoteBrief, NoteId, NoteType, Rating, ReviewLogEntry,
    SchedulingState,
};
