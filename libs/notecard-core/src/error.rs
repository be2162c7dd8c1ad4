//! Error types for notecard-core.

use thiserror::Error;

use crate::types::{CardId, DeckId, NoteId};

/// Errors that can occur while compiling a note into card drafts.
///
/// Missing fields are never an error: absent keys render as empty strings.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompileError {
    #[error("unknown note type: {0}")]
    UnknownNoteType(String),
}

/// Errors raised by note type edits. Any of these leaves the note type untouched.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EditError {
    #[error("name must not be empty")]
    EmptyName,

    #[error("'{0}' is a reserved field name")]
    ReservedFieldName(String),

    #[error("field name already exists: {0}")]
    DuplicateField(String),

    #[error("field not found: {0}")]
    FieldNotFound(String),

    #[error("cannot remove the last field")]
    LastField,

    #[error("field order mismatch: {0}")]
    FieldOrderMismatch(String),

    #[error("invalid sort field index {index} for {len} fields")]
    InvalidSortField { index: usize, len: usize },

    #[error("gate field does not exist: {0}")]
    InvalidGateField(String),

    #[error("template not found: {0}")]
    TemplateNotFound(String),

    #[error("template name already exists: {0}")]
    DuplicateTemplate(String),

    #[error("cannot remove the last template")]
    LastTemplate,
}

/// Errors reported by repository implementations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("storage error: {0}")]
    Backend(String),

    #[error("corrupt stored data: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Errors from collection-level operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Edit(#[from] EditError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("note not found: {0}")]
    NoteNotFound(NoteId),

    #[error("card not found: {0}")]
    CardNotFound(CardId),

    #[error("deck not found: {0}")]
    DeckNotFound(DeckId),

    #[error("flag must be 0-7, got {0}")]
    InvalidFlag(u8),
}

/// Result type alias using ServiceError.
pub type Result<T> = std::result::Result<T, ServiceError>;
