//! Note type editing.
//!
//! Every edit runs against a copy of the note type and is committed only when
//! it succeeds, so a rejected edit never leaves a partial mutation behind.

use serde::{Deserialize, Serialize};

use crate::error::EditError;
use crate::template::rename_field_references;
use crate::types::{CardTemplate, FieldOptions, NoteType};

/// Field names that collide with built-in template tokens.
pub const RESERVED_FIELD_NAMES: [&str; 5] = ["Tags", "Type", "Deck", "Card", "FrontSide"];

type Result<T> = std::result::Result<T, EditError>;

/// Partial template update. `None` leaves a property alone; for the optional
/// properties an empty string clears them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub q_fmt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub a_fmt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub styling: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub if_field_non_empty: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deck_override: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser_q_fmt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser_a_fmt: Option<String>,
}

/// One edit to a note type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum NoteTypeEdit {
    AddField {
        name: String,
        /// Insert position; out of range or absent appends.
        #[serde(default)]
        position: Option<usize>,
    },
    RenameField {
        old_name: String,
        new_name: String,
    },
    RemoveField {
        name: String,
    },
    ReorderFields {
        fields: Vec<String>,
    },
    SetSortField {
        index: usize,
    },
    SetFieldOptions {
        field: String,
        options: FieldOptions,
    },
    UpdateTemplate {
        name: String,
        update: TemplateUpdate,
    },
    AddTemplate {
        template: CardTemplate,
    },
    RemoveTemplate {
        name: String,
    },
}

impl NoteTypeEdit {
    /// Whether existing cards may need regenerating after this edit.
    pub fn affects_cards(&self) -> bool {
        matches!(
            self,
            Self::RenameField { .. }
                | Self::RemoveField { .. }
                | Self::UpdateTemplate { .. }
                | Self::AddTemplate { .. }
                | Self::RemoveTemplate { .. }
        )
    }
}

/// Applies edits to a borrowed note type.
pub struct NoteTypeEditor<'a> {
    note_type: &'a mut NoteType,
}

impl<'a> NoteTypeEditor<'a> {
    pub fn new(note_type: &'a mut NoteType) -> Self {
        Self { note_type }
    }

    /// Apply `edit`, leaving the note type untouched on error.
    pub fn apply(&mut self, edit: &NoteTypeEdit) -> Result<()> {
        let mut candidate = self.note_type.clone();
        apply_edit(&mut candidate, edit)?;
        *self.note_type = candidate;
        Ok(())
    }

    pub fn add_field(&mut self, name: &str, position: Option<usize>) -> Result<()> {
        self.apply(&NoteTypeEdit::AddField {
            name: name.to_string(),
            position,
        })
    }

    pub fn rename_field(&mut self, old_name: &str, new_name: &str) -> Result<()> {
        self.apply(&NoteTypeEdit::RenameField {
            old_name: old_name.to_string(),
            new_name: new_name.to_string(),
        })
    }

    pub fn remove_field(&mut self, name: &str) -> Result<()> {
        self.apply(&NoteTypeEdit::RemoveField {
            name: name.to_string(),
        })
    }

    pub fn reorder_fields(&mut self, fields: &[&str]) -> Result<()> {
        self.apply(&NoteTypeEdit::ReorderFields {
            fields: fields.iter().map(|f| f.to_string()).collect(),
        })
    }

    pub fn set_sort_field(&mut self, index: usize) -> Result<()> {
        self.apply(&NoteTypeEdit::SetSortField { index })
    }

    pub fn set_field_options(&mut self, field: &str, options: FieldOptions) -> Result<()> {
        self.apply(&NoteTypeEdit::SetFieldOptions {
            field: field.to_string(),
            options,
        })
    }

    pub fn update_template(&mut self, name: &str, update: TemplateUpdate) -> Result<()> {
        self.apply(&NoteTypeEdit::UpdateTemplate {
            name: name.to_string(),
            update,
        })
    }

    pub fn add_template(&mut self, template: CardTemplate) -> Result<()> {
        self.apply(&NoteTypeEdit::AddTemplate { template })
    }

    pub fn remove_template(&mut self, name: &str) -> Result<()> {
        self.apply(&NoteTypeEdit::RemoveTemplate {
            name: name.to_string(),
        })
    }
}

fn apply_edit(nt: &mut NoteType, edit: &NoteTypeEdit) -> Result<()> {
    match edit {
        NoteTypeEdit::AddField { name, position } => add_field(nt, name, *position),
        NoteTypeEdit::RenameField { old_name, new_name } => rename_field(nt, old_name, new_name),
        NoteTypeEdit::RemoveField { name } => remove_field(nt, name),
        NoteTypeEdit::ReorderFields { fields } => reorder_fields(nt, fields),
        NoteTypeEdit::SetSortField { index } => {
            if *index >= nt.fields.len() {
                return Err(EditError::InvalidSortField {
                    index: *index,
                    len: nt.fields.len(),
                });
            }
            nt.sort_field_index = *index;
            Ok(())
        }
        NoteTypeEdit::SetFieldOptions { field, options } => {
            if !nt.has_field(field) {
                return Err(EditError::FieldNotFound(field.clone()));
            }
            nt.field_options.insert(field.clone(), options.clone());
            Ok(())
        }
        NoteTypeEdit::UpdateTemplate { name, update } => update_template(nt, name, update),
        NoteTypeEdit::AddTemplate { template } => add_template(nt, template),
        NoteTypeEdit::RemoveTemplate { name } => {
            let index = nt
                .templates
                .iter()
                .position(|t| &t.name == name)
                .ok_or_else(|| EditError::TemplateNotFound(name.clone()))?;
            if nt.templates.len() <= 1 {
                return Err(EditError::LastTemplate);
            }
            nt.templates.remove(index);
            Ok(())
        }
    }
}

fn check_new_field_name(nt: &NoteType, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(EditError::EmptyName);
    }
    if RESERVED_FIELD_NAMES.contains(&name) {
        return Err(EditError::ReservedFieldName(name.to_string()));
    }
    if nt.has_field(name) {
        return Err(EditError::DuplicateField(name.to_string()));
    }
    Ok(())
}

fn add_field(nt: &mut NoteType, name: &str, position: Option<usize>) -> Result<()> {
    check_new_field_name(nt, name)?;
    match position {
        Some(pos) if pos < nt.fields.len() => nt.fields.insert(pos, name.to_string()),
        _ => nt.fields.push(name.to_string()),
    }
    Ok(())
}

fn rename_field(nt: &mut NoteType, old_name: &str, new_name: &str) -> Result<()> {
    let index = nt
        .fields
        .iter()
        .position(|f| f == old_name)
        .ok_or_else(|| EditError::FieldNotFound(old_name.to_string()))?;
    if old_name == new_name {
        return Ok(());
    }
    check_new_field_name(nt, new_name)?;

    nt.fields[index] = new_name.to_string();

    for template in &mut nt.templates {
        template.q_fmt = rename_field_references(&template.q_fmt, old_name, new_name);
        template.a_fmt = rename_field_references(&template.a_fmt, old_name, new_name);
        for browser in [&mut template.browser_q_fmt, &mut template.browser_a_fmt] {
            if let Some(fmt) = browser.as_mut() {
                *fmt = rename_field_references(fmt, old_name, new_name);
            }
        }
        if template.if_field_non_empty.as_deref() == Some(old_name) {
            template.if_field_non_empty = Some(new_name.to_string());
        }
    }

    if let Some(options) = nt.field_options.remove(old_name) {
        nt.field_options.insert(new_name.to_string(), options);
    }
    Ok(())
}

fn remove_field(nt: &mut NoteType, name: &str) -> Result<()> {
    if nt.fields.len() <= 1 {
        return Err(EditError::LastField);
    }
    let index = nt
        .fields
        .iter()
        .position(|f| f == name)
        .ok_or_else(|| EditError::FieldNotFound(name.to_string()))?;

    nt.fields.remove(index);
    nt.field_options.remove(name);
    for template in &mut nt.templates {
        if template.if_field_non_empty.as_deref() == Some(name) {
            template.if_field_non_empty = None;
        }
    }
    if nt.sort_field_index >= nt.fields.len() {
        nt.sort_field_index = nt.fields.len() - 1;
    }
    Ok(())
}

/// `sort_field_index` is left as-is and may now point at a different field.
fn reorder_fields(nt: &mut NoteType, fields: &[String]) -> Result<()> {
    if fields.len() != nt.fields.len() {
        return Err(EditError::FieldOrderMismatch(format!(
            "expected {} fields, got {}",
            nt.fields.len(),
            fields.len()
        )));
    }

    let mut current: Vec<&str> = nt.fields.iter().map(String::as_str).collect();
    let mut candidate: Vec<&str> = fields.iter().map(String::as_str).collect();
    current.sort_unstable();
    candidate.sort_unstable();
    if current != candidate {
        return Err(EditError::FieldOrderMismatch(
            "fields must be a permutation of the current fields".to_string(),
        ));
    }

    nt.fields = fields.to_vec();
    Ok(())
}

fn check_gate(nt: &NoteType, gate: Option<&str>) -> Result<()> {
    match gate {
        Some(field) if !field.trim().is_empty() && !nt.has_field(field) => {
            Err(EditError::InvalidGateField(field.to_string()))
        }
        _ => Ok(()),
    }
}

fn non_blank(value: &str) -> Option<String> {
    (!value.trim().is_empty()).then(|| value.to_string())
}

fn update_template(nt: &mut NoteType, name: &str, update: &TemplateUpdate) -> Result<()> {
    check_gate(nt, update.if_field_non_empty.as_deref())?;
    let template = nt
        .templates
        .iter_mut()
        .find(|t| t.name == name)
        .ok_or_else(|| EditError::TemplateNotFound(name.to_string()))?;

    if let Some(q_fmt) = &update.q_fmt {
        template.q_fmt = q_fmt.clone();
    }
    if let Some(a_fmt) = &update.a_fmt {
        template.a_fmt = a_fmt.clone();
    }
    if let Some(styling) = &update.styling {
        template.styling = styling.clone();
    }
    if let Some(gate) = &update.if_field_non_empty {
        template.if_field_non_empty = non_blank(gate);
    }
    if let Some(deck) = &update.deck_override {
        template.deck_override = non_blank(deck);
    }
    if let Some(fmt) = &update.browser_q_fmt {
        template.browser_q_fmt = non_blank(fmt);
    }
    if let Some(fmt) = &update.browser_a_fmt {
        template.browser_a_fmt = non_blank(fmt);
    }
    Ok(())
}

fn add_template(nt: &mut NoteType, template: &CardTemplate) -> Result<()> {
    if template.name.trim().is_empty() {
        return Err(EditError::EmptyName);
    }
    if nt.template(&template.name).is_some() {
        return Err(EditError::DuplicateTemplate(template.name.clone()));
    }
    check_gate(nt, template.if_field_non_empty.as_deref())?;
    nt.templates.push(template.clone());
    Ok(())
}
