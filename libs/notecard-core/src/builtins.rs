//! Stock note types seeded into a new collection.

use crate::types::{CardTemplate, NoteType};

pub fn basic() -> NoteType {
    NoteType::new(
        "Basic",
        &["Front", "Back"],
        vec![CardTemplate::new("Card 1", "Q: {{Front}}", "A: {{Back}}")],
    )
}

pub fn basic_reversed() -> NoteType {
    NoteType::new(
        "Basic (and reversed card)",
        &["Front", "Back"],
        vec![
            CardTemplate::new("Card 1", "Q: {{Front}}", "A: {{Back}}"),
            CardTemplate::new("Card 2", "Q: {{Back}}", "A: {{Front}}"),
        ],
    )
}

/// Reverse card only when `Add Reverse` is filled in.
pub fn basic_optional_reversed() -> NoteType {
    NoteType::new(
        "Basic (optional reversed card)",
        &["Front", "Back", "Add Reverse"],
        vec![
            CardTemplate::new("Card 1", "Q: {{Front}}", "A: {{Back}}"),
            CardTemplate::new("Card 2 (optional reverse)", "Q: {{Back}}", "A: {{Front}}")
                .gated_on("Add Reverse"),
        ],
    )
}

pub fn basic_type_answer() -> NoteType {
    NoteType::new(
        "Basic (type in the answer)",
        &["Front", "Back"],
        vec![CardTemplate::new(
            "Card 1",
            "Q: {{Front}}\n\n{{type:Back}}",
            "A: {{Back}}",
        )],
    )
}

pub fn cloze() -> NoteType {
    NoteType::new(
        "Cloze",
        &["Text", "Extra"],
        vec![CardTemplate::new(
            "Cloze",
            "Q: {{cloze:Text}}",
            "A: {{cloze:Text}}\n\nExtra: {{Extra}}",
        )
        .cloze()],
    )
}

/// All stock note types, in display order.
pub fn builtins() -> Vec<NoteType> {
    vec![
        basic(),
        basic_reversed(),
        basic_optional_reversed(),
        basic_type_answer(),
        cloze(),
    ]
}
