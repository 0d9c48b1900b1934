use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// Single-line input with a character cursor and an optional length cap.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TextInput {
    text: String,
    cursor: usize,
    pub placeholder: String,
    /// Zero means unlimited.
    pub char_limit: usize,
    pub invalid: bool,
}

impl TextInput {
    pub fn new(placeholder: &str, char_limit: usize) -> Self {
        Self {
            placeholder: placeholder.to_string(),
            char_limit,
            ..Self::default()
        }
    }

    pub fn with_value(mut self, value: &str) -> Self {
        self.set_value(value);
        self
    }

    pub fn value(&self) -> &str {
        &self.text
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn set_value(&mut self, value: &str) {
        self.text.clear();
        self.cursor = 0;
        self.insert_str(value);
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.cursor = 0;
    }

    pub fn insert_char(&mut self, ch: char) {
        let mut buffer = [0u8; 4];
        self.insert_str(ch.encode_utf8(&mut buffer));
    }

    pub fn insert_str(&mut self, text: &str) {
        let mut inserted = flatten_line(text);
        if self.char_limit > 0 {
            let room = self.char_limit.saturating_sub(self.text.chars().count());
            inserted = inserted.chars().take(room).collect();
        }
        if inserted.is_empty() {
            return;
        }

        let byte_index = byte_offset(&self.text, self.cursor);
        self.text.insert_str(byte_index, &inserted);
        self.cursor += inserted.chars().count();
    }

    pub fn backspace(&mut self) {
        if self.cursor == 0 {
            return;
        }
        self.cursor -= 1;
        let byte_index = byte_offset(&self.text, self.cursor);
        self.text.remove(byte_index);
    }

    pub fn delete_forward(&mut self) {
        if self.cursor >= self.text.chars().count() {
            return;
        }
        let byte_index = byte_offset(&self.text, self.cursor);
        self.text.remove(byte_index);
    }

    /// Applies an editing key. Returns whether the key was consumed.
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            return false;
        }
        match key.code {
            KeyCode::Char(ch) if !ch.is_control() => self.insert_char(ch),
            KeyCode::Backspace => self.backspace(),
            KeyCode::Delete => self.delete_forward(),
            KeyCode::Left => self.cursor = self.cursor.saturating_sub(1),
            KeyCode::Right => self.cursor = (self.cursor + 1).min(self.text.chars().count()),
            KeyCode::Home => self.cursor = 0,
            KeyCode::End => self.cursor = self.text.chars().count(),
            _ => return false,
        }
        true
    }
}

fn flatten_line(text: &str) -> String {
    text.chars()
        .map(|ch| match ch {
            '\n' | '\r' | '\t' => ' ',
            other => other,
        })
        .collect()
}

fn byte_offset(text: &str, char_index: usize) -> usize {
    text.char_indices()
        .nth(char_index)
        .map(|(index, _)| index)
        .unwrap_or(text.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn edits_in_the_middle_of_unicode_text() {
        let mut input = TextInput::new("", 0).with_value("aλc");
        assert_eq!(input.cursor(), 3);
        input.handle_key(key(KeyCode::Left));
        input.handle_key(key(KeyCode::Backspace));
        assert_eq!(input.value(), "ac");
        input.insert_char('b');
        assert_eq!(input.value(), "abc");
        input.handle_key(key(KeyCode::Home));
        input.handle_key(key(KeyCode::Delete));
        assert_eq!(input.value(), "bc");
    }

    #[test]
    fn char_limit_truncates_insertions() {
        let mut input = TextInput::new("AA-1234", 4);
        input.insert_str("abcdef");
        assert_eq!(input.value(), "abcd");
        input.insert_char('x');
        assert_eq!(input.value(), "abcd");
    }

    #[test]
    fn control_keys_are_left_to_the_caller() {
        let mut input = TextInput::new("", 0);
        let consumed = input.handle_key(KeyEvent::new(KeyCode::Char('w'), KeyModifiers::CONTROL));
        assert!(!consumed);
        assert!(input.is_empty());
        assert!(!input.handle_key(key(KeyCode::Enter)));
    }

    #[test]
    fn pasted_newlines_become_spaces() {
        let mut input = TextInput::new("", 0);
        input.insert_str("a\nb\tc");
        assert_eq!(input.value(), "a b c");
    }
}
