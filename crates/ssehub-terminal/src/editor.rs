//! Line editing with cursor tracking.
//!
//! The editor keeps the authoritative copy of the line being typed and
//! answers every key with the smallest control sequence that brings the
//! client's screen in line with it. The whole line is only rewritten when
//! history recall replaces it.

use crate::history::History;
use crate::key::Key;

/// Insert one blank at the cursor, shifting the rest of the line right.
const INSERT_CHAR: &str = "\x1b[1@";
/// Delete the character at the cursor, shifting the rest of the line left.
const DELETE_CHAR: &str = "\x1b[P";
/// Erase from the cursor to the end of the line.
const ERASE_TO_END: &str = "\x1b[K";
const CURSOR_LEFT: &str = "\x1b[D";
const CURSOR_RIGHT: &str = "\x1b[C";

/// Outcome of applying one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Edit {
    /// Write these bytes to the client screen
    Echo(String),
    /// Enter was pressed; the submitted line
    Submit(String),
    /// Ctrl-C; the line was discarded
    Interrupt,
    /// Ctrl-L; the client screen should be cleared and the line redrawn
    Clear,
    /// Nothing to do
    None,
}

/// Editable input line plus its history.
#[derive(Debug, Clone)]
pub struct LineEditor {
    buffer: Vec<char>,
    cursor: usize,
    history: History,
    /// Age of the history entry currently shown, while browsing
    browsing: Option<usize>,
}

impl LineEditor {
    /// Create an empty editor with a history of `history_capacity` lines.
    pub fn new(history_capacity: usize) -> Self {
        Self {
            buffer: Vec::new(),
            cursor: 0,
            history: History::new(history_capacity),
            browsing: None,
        }
    }

    /// Current line contents.
    pub fn line(&self) -> String {
        self.buffer.iter().collect()
    }

    /// Cursor offset in characters.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Submitted lines.
    pub fn history(&self) -> &History {
        &self.history
    }

    /// Put the cursor after the last character, as after a redraw.
    pub fn move_to_end(&mut self) {
        self.cursor = self.buffer.len();
    }

    /// Apply a key to the line.
    pub fn apply(&mut self, key: Key) -> Edit {
        if !matches!(key, Key::Up | Key::Down) {
            self.browsing = None;
        }

        match key {
            Key::Char(c) if is_printable(c) => self.insert(c),
            Key::Char(_) | Key::Control(_) => Edit::None,
            Key::Backspace => {
                if self.cursor == 0 {
                    return Edit::None;
                }
                self.cursor -= 1;
                self.buffer.remove(self.cursor);
                Edit::Echo(format!("\x08{DELETE_CHAR}"))
            }
            Key::Delete => {
                if self.cursor >= self.buffer.len() {
                    return Edit::None;
                }
                self.buffer.remove(self.cursor);
                Edit::Echo(DELETE_CHAR.to_string())
            }
            Key::Left => {
                if self.cursor == 0 {
                    return Edit::None;
                }
                self.cursor -= 1;
                Edit::Echo(CURSOR_LEFT.to_string())
            }
            Key::Right => {
                if self.cursor >= self.buffer.len() {
                    return Edit::None;
                }
                self.cursor += 1;
                Edit::Echo(CURSOR_RIGHT.to_string())
            }
            Key::Up => {
                let age = self.browsing.map_or(0, |age| age + 1);
                match self.history.get(age).map(str::to_string) {
                    Some(entry) => {
                        self.browsing = Some(age);
                        self.replace_line(&entry)
                    }
                    None => Edit::None,
                }
            }
            Key::Down => match self.browsing {
                None => Edit::None,
                Some(0) => {
                    self.browsing = None;
                    self.replace_line("")
                }
                Some(age) => {
                    let entry = self.history.get(age - 1).unwrap_or_default().to_string();
                    self.browsing = Some(age - 1);
                    self.replace_line(&entry)
                }
            },
            Key::Enter => {
                let line = self.line();
                self.history.push(&line);
                self.buffer.clear();
                self.cursor = 0;
                Edit::Submit(line)
            }
            Key::Interrupt => {
                self.buffer.clear();
                self.cursor = 0;
                Edit::Interrupt
            }
            Key::ClearScreen => Edit::Clear,
        }
    }

    fn insert(&mut self, c: char) -> Edit {
        let at_end = self.cursor == self.buffer.len();
        self.buffer.insert(self.cursor, c);
        self.cursor += 1;
        if at_end {
            Edit::Echo(c.to_string())
        } else {
            Edit::Echo(format!("{INSERT_CHAR}{c}"))
        }
    }

    fn replace_line(&mut self, entry: &str) -> Edit {
        let mut out = String::new();
        if self.cursor > 0 {
            out.push_str(&format!("\x1b[{}D", self.cursor));
        }
        if !self.buffer.is_empty() {
            out.push_str(ERASE_TO_END);
        }
        out.push_str(entry);

        self.buffer = entry.chars().collect();
        self.cursor = self.buffer.len();

        if out.is_empty() {
            Edit::None
        } else {
            Edit::Echo(out)
        }
    }
}

fn is_printable(c: char) -> bool {
    (' '..='~').contains(&c)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn type_str(editor: &mut LineEditor, text: &str) {
        for c in text.chars() {
            editor.apply(Key::Char(c));
        }
    }

    #[test]
    fn test_append_echoes_char() {
        let mut editor = LineEditor::new(16);
        assert_eq!(editor.apply(Key::Char('p')), Edit::Echo("p".into()));
        assert_eq!(editor.line(), "p");
        assert_eq!(editor.cursor(), 1);
    }

    #[test]
    fn test_insert_mid_line_shifts_tail() {
        let mut editor = LineEditor::new(16);
        type_str(&mut editor, "pig");
        editor.apply(Key::Left);
        editor.apply(Key::Left);
        assert_eq!(editor.apply(Key::Char('n')), Edit::Echo("\x1b[1@n".into()));
        assert_eq!(editor.line(), "pnig");
        assert_eq!(editor.cursor(), 2);
    }

    #[test]
    fn test_backspace() {
        let mut editor = LineEditor::new(16);
        assert_eq!(editor.apply(Key::Backspace), Edit::None);
        type_str(&mut editor, "ab");
        assert_eq!(editor.apply(Key::Backspace), Edit::Echo("\x08\x1b[P".into()));
        assert_eq!(editor.line(), "a");
    }

    #[test]
    fn test_delete_under_cursor() {
        let mut editor = LineEditor::new(16);
        type_str(&mut editor, "abc");
        assert_eq!(editor.apply(Key::Delete), Edit::None);
        editor.apply(Key::Left);
        editor.apply(Key::Left);
        assert_eq!(editor.apply(Key::Delete), Edit::Echo("\x1b[P".into()));
        assert_eq!(editor.line(), "ac");
        assert_eq!(editor.cursor(), 1);
    }

    #[test]
    fn test_cursor_is_clamped() {
        let mut editor = LineEditor::new(16);
        assert_eq!(editor.apply(Key::Left), Edit::None);
        assert_eq!(editor.apply(Key::Right), Edit::None);
        type_str(&mut editor, "x");
        assert_eq!(editor.apply(Key::Right), Edit::None);
        assert_eq!(editor.apply(Key::Left), Edit::Echo("\x1b[D".into()));
        assert_eq!(editor.apply(Key::Left), Edit::None);
        assert_eq!(editor.apply(Key::Right), Edit::Echo("\x1b[C".into()));
    }

    #[test]
    fn test_control_chars_ignored() {
        let mut editor = LineEditor::new(16);
        assert_eq!(editor.apply(Key::Control('\t')), Edit::None);
        assert_eq!(editor.apply(Key::Char('é')), Edit::None);
        assert_eq!(editor.line(), "");
    }

    #[test]
    fn test_submit_records_history() {
        let mut editor = LineEditor::new(16);
        type_str(&mut editor, "date");
        assert_eq!(editor.apply(Key::Enter), Edit::Submit("date".into()));
        assert_eq!(editor.line(), "");
        assert_eq!(editor.cursor(), 0);
        assert_eq!(editor.history().get(0), Some("date"));
    }

    #[test]
    fn test_up_with_empty_history_is_noop() {
        let mut editor = LineEditor::new(16);
        assert_eq!(editor.apply(Key::Up), Edit::None);
        assert_eq!(editor.apply(Key::Down), Edit::None);
    }

    #[test]
    fn test_history_navigation() {
        let mut editor = LineEditor::new(16);
        type_str(&mut editor, "ping");
        editor.apply(Key::Enter);
        type_str(&mut editor, "date");
        editor.apply(Key::Enter);

        type_str(&mut editor, "xy");
        assert_eq!(editor.apply(Key::Up), Edit::Echo("\x1b[2D\x1b[Kdate".into()));
        assert_eq!(editor.line(), "date");
        assert_eq!(editor.cursor(), 4);

        assert_eq!(editor.apply(Key::Up), Edit::Echo("\x1b[4D\x1b[Kping".into()));
        // Already at the oldest entry.
        assert_eq!(editor.apply(Key::Up), Edit::None);

        assert_eq!(editor.apply(Key::Down), Edit::Echo("\x1b[4D\x1b[Kdate".into()));
        assert_eq!(editor.apply(Key::Down), Edit::Echo("\x1b[4D\x1b[K".into()));
        assert_eq!(editor.line(), "");
        assert_eq!(editor.apply(Key::Down), Edit::None);
    }

    #[test]
    fn test_keystroke_resets_navigation() {
        let mut editor = LineEditor::new(16);
        for line in ["one", "two"] {
            type_str(&mut editor, line);
            editor.apply(Key::Enter);
        }
        editor.apply(Key::Up);
        editor.apply(Key::Char('!'));
        assert_eq!(editor.line(), "two!");
        // Navigation starts over from the newest entry.
        editor.apply(Key::Up);
        assert_eq!(editor.line(), "two");
    }

    #[test]
    fn test_interrupt_discards_line() {
        let mut editor = LineEditor::new(16);
        type_str(&mut editor, "ping");
        assert_eq!(editor.apply(Key::Interrupt), Edit::Interrupt);
        assert_eq!(editor.line(), "");
        assert!(editor.history().is_empty());
    }

    #[test]
    fn test_clear_keeps_line() {
        let mut editor = LineEditor::new(16);
        type_str(&mut editor, "pi");
        editor.apply(Key::Left);
        assert_eq!(editor.apply(Key::ClearScreen), Edit::Clear);
        assert_eq!(editor.line(), "pi");
        editor.move_to_end();
        assert_eq!(editor.cursor(), 2);
    }
}
