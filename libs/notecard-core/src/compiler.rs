//! Card compiler: turns a note into card drafts using its note type's templates.

use std::collections::HashMap;

use crate::cloze::{extract_ordinals, ClozeSubstitution};
use crate::error::CompileError;
use crate::template::{expand, render, FieldSubstitution};
use crate::types::{CardDraft, CardTemplate, Note, NoteType};

/// Field whose text decides which cloze ordinals exist.
pub const CLOZE_SOURCE_FIELD: &str = "Text";

/// Anything that can resolve a note type by name.
pub trait NoteTypeLookup {
    fn note_type(&self, name: &str) -> Option<&NoteType>;
}

impl NoteTypeLookup for NoteType {
    fn note_type(&self, name: &str) -> Option<&NoteType> {
        (self.name == name).then_some(self)
    }
}

impl NoteTypeLookup for [NoteType] {
    fn note_type(&self, name: &str) -> Option<&NoteType> {
        self.iter().find(|nt| nt.name == name)
    }
}

impl NoteTypeLookup for Vec<NoteType> {
    fn note_type(&self, name: &str) -> Option<&NoteType> {
        self.as_slice().note_type(name)
    }
}

impl NoteTypeLookup for HashMap<String, NoteType> {
    fn note_type(&self, name: &str) -> Option<&NoteType> {
        self.get(name)
    }
}

/// Compile `note` into drafts, one pass over the note type's templates in order.
///
/// Drafts carry no id, deck or scheduling state; those are assigned when the
/// drafts are reconciled or persisted.
pub fn compile<L>(note_types: &L, note: &Note) -> Result<Vec<CardDraft>, CompileError>
where
    L: NoteTypeLookup + ?Sized,
{
    let note_type = note_types
        .note_type(&note.type_name)
        .ok_or_else(|| CompileError::UnknownNoteType(note.type_name.clone()))?;

    let mut drafts = Vec::new();
    for template in &note_type.templates {
        if template.is_cloze {
            compile_cloze(template, note, &mut drafts);
        } else if let Some(draft) = compile_plain(template, note) {
            drafts.push(draft);
        }
    }
    Ok(drafts)
}

fn compile_plain(template: &CardTemplate, note: &Note) -> Option<CardDraft> {
    if let Some(gate) = template.gate_field() {
        if note.field(gate).trim().is_empty() {
            return None;
        }
    }

    let front = render(&template.q_fmt, &note.field_map, None);
    let back = render(&template.a_fmt, &note.field_map, Some(&front));
    Some(CardDraft {
        template_name: template.name.clone(),
        ordinal: 0,
        front,
        back,
    })
}

fn compile_cloze(template: &CardTemplate, note: &Note, drafts: &mut Vec<CardDraft>) {
    for ordinal in extract_ordinals(note.field(CLOZE_SOURCE_FIELD)) {
        let front = expand(
            &template.q_fmt,
            &ClozeSubstitution {
                plain: FieldSubstitution::new(&note.field_map, None),
                target: ordinal,
                reveal: false,
            },
        );
        let back = expand(
            &template.a_fmt,
            &ClozeSubstitution {
                plain: FieldSubstitution::new(&note.field_map, Some(&front)),
                target: ordinal,
                reveal: true,
            },
        );
        drafts.push(CardDraft {
            template_name: template.name.clone(),
            ordinal,
            front,
            back,
        });
    }
}
