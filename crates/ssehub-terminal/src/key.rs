//! Keystroke decoding.
//!
//! Browsers post raw terminal input: printable characters, a handful of
//! control bytes and ANSI escape sequences for the arrow and delete keys.
//! [`KeyDecoder`] turns that character stream into [`Key`]s one character at
//! a time, so a sequence split across two requests still decodes.

/// A decoded keystroke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// Regular character
    Char(char),
    /// Backspace (`0x08` or `0x7F`)
    Backspace,
    /// Delete (`ESC [ 3 ~`)
    Delete,
    /// Carriage return
    Enter,
    /// Ctrl-C (`0x03`)
    Interrupt,
    /// Form feed / Ctrl-L (`0x0C`)
    ClearScreen,
    /// Up arrow (`ESC [ A`)
    Up,
    /// Down arrow (`ESC [ B`)
    Down,
    /// Right arrow (`ESC [ C`)
    Right,
    /// Left arrow (`ESC [ D`)
    Left,
    /// Any other control character
    Control(char),
}

/// Position inside an escape sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum DecodeState {
    #[default]
    Normal,
    EscSeen,
    BracketSeen,
    ExpectTilde,
}

/// Incremental decoder from characters to [`Key`]s.
#[derive(Debug, Default)]
pub struct KeyDecoder {
    state: DecodeState,
}

impl KeyDecoder {
    /// Create a decoder in the normal state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the decoder is in the middle of an escape sequence.
    pub fn is_pending(&self) -> bool {
        self.state != DecodeState::Normal
    }

    /// Feed one character.
    ///
    /// Returns a key once a complete keystroke has been seen. When an escape
    /// sequence turns out to be unknown, its terminating character is decoded
    /// again as ordinary input.
    pub fn feed(&mut self, ch: char) -> Option<Key> {
        match self.state {
            DecodeState::Normal => self.feed_normal(ch),
            DecodeState::EscSeen => {
                if ch == '[' {
                    self.state = DecodeState::BracketSeen;
                    None
                } else {
                    self.literal(ch)
                }
            }
            DecodeState::BracketSeen => match ch {
                'A' => self.finish(Key::Up),
                'B' => self.finish(Key::Down),
                'C' => self.finish(Key::Right),
                'D' => self.finish(Key::Left),
                '3' => {
                    self.state = DecodeState::ExpectTilde;
                    None
                }
                _ => self.literal(ch),
            },
            DecodeState::ExpectTilde => {
                if ch == '~' {
                    self.finish(Key::Delete)
                } else {
                    self.literal(ch)
                }
            }
        }
    }

    /// Decode a whole string, in order.
    pub fn feed_str(&mut self, input: &str) -> Vec<Key> {
        input.chars().filter_map(|ch| self.feed(ch)).collect()
    }

    fn feed_normal(&mut self, ch: char) -> Option<Key> {
        match ch {
            '\x1b' => {
                self.state = DecodeState::EscSeen;
                None
            }
            '\r' => Some(Key::Enter),
            '\x08' | '\x7f' => Some(Key::Backspace),
            '\x03' => Some(Key::Interrupt),
            '\x0c' => Some(Key::ClearScreen),
            c if c.is_control() => Some(Key::Control(c)),
            c => Some(Key::Char(c)),
        }
    }

    fn finish(&mut self, key: Key) -> Option<Key> {
        self.state = DecodeState::Normal;
        Some(key)
    }

    fn literal(&mut self, ch: char) -> Option<Key> {
        self.state = DecodeState::Normal;
        self.feed_normal(ch)
    }
}
