//! Duplicate note detection on a single field.

use std::fmt::Display;

use crate::types::{DeckId, Note, NoteBrief, NoteId};

/// What to look for.
#[derive(Debug, Clone)]
pub struct DuplicateQuery<'a> {
    pub field_name: &'a str,
    pub value: &'a str,
    /// Only count notes with at least one card in this deck.
    pub deck_id: Option<DeckId>,
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Notes whose `field_name` equals `value` after trimming and lower-casing.
///
/// A blank query matches nothing. Entries that failed to decode are skipped.
/// `note_in_deck` is only consulted when the query names a deck.
pub fn find_duplicates<I, E, F>(notes: I, query: &DuplicateQuery<'_>, note_in_deck: F) -> Vec<NoteBrief>
where
    I: IntoIterator<Item = Result<Note, E>>,
    E: Display,
    F: Fn(NoteId, DeckId) -> bool,
{
    let wanted = normalize(query.value);
    if wanted.is_empty() {
        return Vec::new();
    }

    notes
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(note) => Some(note),
            Err(e) => {
                tracing::debug!(error = %e, "skipping undecodable note in duplicate scan");
                None
            }
        })
        .filter(|note| normalize(note.field(query.field_name)) == wanted)
        .filter(|note| query.deck_id.map_or(true, |deck| note_in_deck(note.id, deck)))
        .map(|note| NoteBrief::from(&note))
        .collect()
}
