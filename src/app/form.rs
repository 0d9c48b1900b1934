use crate::app::TextInput;
use crate::domain::{
    TagUpdateMode, Task, TaskEdit, TimestampParseError, format_timestamp, parse_tags,
    parse_timestamp,
};
use crate::infra::{Mutation, TagField};
use crossterm::event::KeyEvent;
use thiserror::Error;
use time::UtcOffset;

const NOTE_CHAR_LIMIT: usize = 100;
const TIMESTAMP_PLACEHOLDER: &str = "2025-09-12 12:00:00";

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FieldRole {
    Tag(String),
    Note,
    Start,
    End,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FormField {
    pub label: String,
    pub role: FieldRole,
    pub input: TextInput,
}

#[derive(Debug, Error, Eq, PartialEq)]
pub enum FormError {
    #[error(transparent)]
    Timestamp(#[from] TimestampParseError),

    #[error("a completed task needs an end time")]
    EndRequired,
}

/// Tab-cycled inputs of the add and edit views. An edit form keeps the task
/// it was opened on.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TaskForm {
    pub fields: Vec<FormField>,
    pub focused: usize,
    pub original: Option<Task>,
}

impl TaskForm {
    pub fn add(tag_fields: &[TagField]) -> Self {
        let mut fields = tag_inputs(tag_fields, None);
        fields.push(note_field(""));
        Self {
            fields,
            focused: 0,
            original: None,
        }
    }

    pub fn edit(task: &Task, tag_fields: &[TagField], offset: UtcOffset) -> Self {
        let mut fields = tag_inputs(tag_fields, Some(task));
        fields.push(note_field(task.note()));
        fields.push(timestamp_field(
            "Start",
            FieldRole::Start,
            &format_timestamp(task.start(), offset),
        ));
        let end = task
            .end()
            .map(|end| format_timestamp(end, offset))
            .unwrap_or_default();
        fields.push(timestamp_field("End", FieldRole::End, &end));
        Self {
            fields,
            focused: 0,
            original: Some(task.clone()),
        }
    }

    pub fn is_last_focused(&self) -> bool {
        self.focused + 1 >= self.fields.len()
    }

    pub fn focus_next(&mut self) {
        if !self.fields.is_empty() {
            self.focused = (self.focused + 1) % self.fields.len();
        }
    }

    pub fn focus_prev(&mut self) {
        if !self.fields.is_empty() {
            self.focused = self.focused.checked_sub(1).unwrap_or(self.fields.len() - 1);
        }
    }

    pub fn clear(&mut self) {
        for field in &mut self.fields {
            field.input.clear();
            field.input.invalid = false;
        }
    }

    /// Feeds a key to the focused input, then re-checks the timestamps.
    pub fn handle_key(&mut self, key: KeyEvent, offset: UtcOffset) -> bool {
        let Some(field) = self.fields.get_mut(self.focused) else {
            return false;
        };
        let consumed = field.input.handle_key(key);
        self.validate(offset);
        consumed
    }

    pub fn validate(&mut self, offset: UtcOffset) {
        for field in &mut self.fields {
            if matches!(field.role, FieldRole::Start | FieldRole::End) {
                let value = field.input.value().trim();
                field.input.invalid = !value.is_empty() && parse_timestamp(value, offset).is_err();
            }
        }
    }

    pub fn has_invalid_input(&self) -> bool {
        self.fields.iter().any(|field| field.input.invalid)
    }

    fn value_of(&self, role: &FieldRole) -> &str {
        self.fields
            .iter()
            .find(|field| &field.role == role)
            .map(|field| field.input.value())
            .unwrap_or("")
    }

    /// `name:value` for every non-empty tag input, in form order.
    pub fn tag_texts(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter_map(|field| match &field.role {
                FieldRole::Tag(name) if !field.input.value().trim().is_empty() => {
                    Some(format!("{name}:{}", field.input.value().trim()))
                }
                _ => None,
            })
            .collect()
    }

    /// The mutation this form asks for. `None` means there is nothing to
    /// send: an empty add form or an edit that changes nothing.
    pub fn submit(&self, offset: UtcOffset) -> Result<Option<Mutation>, FormError> {
        let note = self.value_of(&FieldRole::Note).trim().to_string();
        let Some(original) = &self.original else {
            let tags = parse_tags(&self.tag_texts());
            if tags.is_empty() && note.is_empty() {
                return Ok(None);
            }
            return Ok(Some(Mutation::Create { tags, note }));
        };

        let end = self.value_of(&FieldRole::End).trim().to_string();
        if !original.is_running() && end.is_empty() {
            return Err(FormError::EndRequired);
        }

        let tags = self.edited_tags(original);
        let edit = TaskEdit {
            start: self.value_of(&FieldRole::Start).to_string(),
            end,
            note,
            tags,
        };
        let updated = original.update(&edit, TagUpdateMode::Replace, offset)?;
        if updated.same_content(original) {
            return Ok(None);
        }
        Ok(Some(Mutation::Update(updated)))
    }

    fn tag_input(&self, name: &str) -> Option<&str> {
        self.fields.iter().find_map(|field| match &field.role {
            FieldRole::Tag(key) if key == name => Some(field.input.value().trim()),
            _ => None,
        })
    }

    /// The task's tags in their original order. The first tag under each
    /// configured key takes the value of its input (or is removed when the
    /// input is empty); every other tag is kept as is. Inputs whose key the
    /// task did not have are appended.
    fn edited_tags(&self, task: &Task) -> Vec<String> {
        let mut bound: Vec<&str> = Vec::new();
        let mut tags = Vec::new();
        for tag in task.tags() {
            match self.tag_input(&tag.key) {
                Some(value) if !bound.contains(&tag.key.as_str()) => {
                    bound.push(tag.key.as_str());
                    if !value.is_empty() {
                        tags.push(format!("{}:{value}", tag.key));
                    }
                }
                _ => tags.push(tag.to_string()),
            }
        }
        for field in &self.fields {
            let FieldRole::Tag(name) = &field.role else {
                continue;
            };
            let value = field.input.value().trim();
            if !bound.contains(&name.as_str()) && !value.is_empty() {
                tags.push(format!("{name}:{value}"));
            }
        }
        tags
    }
}

fn tag_inputs(tag_fields: &[TagField], task: Option<&Task>) -> Vec<FormField> {
    tag_fields
        .iter()
        .map(|field| {
            let value = task
                .and_then(|task| task.tag_value(&field.name))
                .unwrap_or("");
            FormField {
                label: field.name.clone(),
                role: FieldRole::Tag(field.name.clone()),
                input: TextInput::new(&field.example, field.char_limit).with_value(value),
            }
        })
        .collect()
}

fn note_field(value: &str) -> FormField {
    FormField {
        label: "Note".to_string(),
        role: FieldRole::Note,
        input: TextInput::new("what are you working on", NOTE_CHAR_LIMIT).with_value(value),
    }
}

fn timestamp_field(label: &str, role: FieldRole, value: &str) -> FormField {
    FormField {
        label: label.to_string(),
        role,
        input: TextInput::new(TIMESTAMP_PLACEHOLDER, TIMESTAMP_PLACEHOLDER.len()).with_value(value),
    }
}
