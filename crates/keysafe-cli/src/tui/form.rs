use crossterm::event::KeyCode;
use keysafe_core::credentials::CredentialRecord;
use ratatui::{
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};

const LABELS: [&str; 3] = ["Application", "Username", "Password"];
const PASSWORD_FIELD: usize = 2;

/// Three-field add/edit form. Tab and arrow keys move between fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryForm {
    editing: Option<usize>,
    fields: [String; 3],
    focus: usize,
}

impl EntryForm {
    pub fn blank() -> Self {
        Self {
            editing: None,
            fields: Default::default(),
            focus: 0,
        }
    }

    pub fn editing(index: usize, record: &CredentialRecord) -> Self {
        Self {
            editing: Some(index),
            fields: [
                record.app_name().to_string(),
                record.username().to_string(),
                record.password().to_string(),
            ],
            focus: 0,
        }
    }

    pub fn handle_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Tab | KeyCode::Down => self.focus = (self.focus + 1) % LABELS.len(),
            KeyCode::BackTab | KeyCode::Up => {
                self.focus = (self.focus + LABELS.len() - 1) % LABELS.len()
            }
            KeyCode::Backspace => {
                self.fields[self.focus].pop();
            }
            KeyCode::Char(c) => self.fields[self.focus].push(c),
            _ => {}
        }
    }

    /// Consume the form contents. Returns the index being edited, if any.
    pub fn submit(&mut self) -> (Option<usize>, CredentialRecord) {
        let [app, username, password] = std::mem::take(&mut self.fields);
        (self.editing, CredentialRecord::new(app, username, password))
    }

    pub fn widget(&self) -> Paragraph<'_> {
        let lines: Vec<Line> = LABELS
            .iter()
            .enumerate()
            .map(|(i, label)| {
                let value = if i == PASSWORD_FIELD {
                    "*".repeat(self.fields[i].chars().count())
                } else {
                    self.fields[i].clone()
                };
                let style = if i == self.focus {
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
                } else {
                    Style::default()
                };
                Line::from(vec![
                    Span::styled(format!("{label:>12}: "), style),
                    Span::raw(value),
                ])
            })
            .collect();

        let title = if self.editing.is_some() {
            "Edit entry"
        } else {
            "New entry"
        };
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(title))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn focus_wraps_both_ways() {
        let mut form = EntryForm::blank();
        form.handle_key(KeyCode::BackTab);
        assert_eq!(form.focus, 2);
        form.handle_key(KeyCode::Tab);
        assert_eq!(form.focus, 0);
    }

    #[test]
    fn submit_keeps_edit_index() {
        let record = CredentialRecord::new("Email", "alice", "p@ss1");
        let mut form = EntryForm::editing(4, &record);
        assert_eq!(form.submit(), (Some(4), record));
    }

    #[test]
    fn backspace_on_empty_field_is_noop() {
        let mut form = EntryForm::blank();
        form.handle_key(KeyCode::Backspace);
        assert_eq!(form, EntryForm::blank());
    }
}
