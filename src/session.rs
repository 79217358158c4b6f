use crate::record::{RawFields, Record};
use crate::schema::Schema;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormMode {
    Adding,
    Editing,
}

/// Explicit presentation-session state: the draft field values being edited,
/// the current form mode, and the edit target when one exists. The caller
/// constructs it with defaults and passes it through each interaction; there
/// is no ambient session storage anywhere in the crate.
#[derive(Clone, Debug)]
pub struct SessionState {
    pub mode: FormMode,
    pub draft: Vec<String>,
    pub edit_target: Option<usize>,
}

impl SessionState {
    pub fn new(schema: &Schema) -> Self {
        Self {
            mode: FormMode::Adding,
            draft: vec![String::new(); schema.len()],
            edit_target: None,
        }
    }

    /// Switch to editing: the draft starts from the stored record so fields
    /// the user leaves alone keep their current values.
    pub fn begin_edit(&mut self, index: usize, record: &Record) {
        self.mode = FormMode::Editing;
        self.edit_target = Some(index);
        self.draft = record.values().to_vec();
    }

    pub fn set_field(&mut self, position: usize, value: &str) {
        if let Some(slot) = self.draft.get_mut(position) {
            *slot = value.to_string();
        }
    }

    pub fn raw_fields(&self) -> RawFields {
        RawFields::new(self.draft.clone())
    }

    /// Back to a blank add form.
    pub fn reset(&mut self, schema: &Schema) {
        *self = Self::new(schema);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::normalize;

    #[test]
    fn defaults_are_a_blank_add_form() {
        let schema = Schema::compact();
        let state = SessionState::new(&schema);
        assert_eq!(state.mode, FormMode::Adding);
        assert_eq!(state.edit_target, None);
        assert_eq!(state.draft.len(), schema.len());
        assert!(state.draft.iter().all(String::is_empty));
    }

    #[test]
    fn begin_edit_seeds_the_draft_from_the_record() {
        let schema = Schema::compact();
        let record = normalize(
            &schema,
            &RawFields::new(
                ["2024-01-01", "Acme", "Jane", "reporting", "notes", ""]
                    .iter()
                    .map(|value| value.to_string())
                    .collect(),
            ),
        )
        .unwrap();
        let mut state = SessionState::new(&schema);
        state.begin_edit(2, &record);
        assert_eq!(state.mode, FormMode::Editing);
        assert_eq!(state.edit_target, Some(2));
        assert_eq!(state.draft, record.values().to_vec());
        state.set_field(1, "Globex");
        assert_eq!(state.raw_fields().values()[1], "Globex");
        state.reset(&schema);
        assert_eq!(state.edit_target, None);
    }
}
