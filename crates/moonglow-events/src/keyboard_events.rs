//! Keyboard event types for hotkey handling
//!
//! Platform-agnostic key types so the scripting runtime does not depend on
//! any particular windowing or terminal backend. The host translates its
//! native key events into these before handing them to the runtime.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Represents a key on the keyboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyCode {
    /// A character key (a-z, 0-9, symbols)
    Char(char),
    /// Enter/Return key
    Enter,
    /// Tab key
    Tab,
    /// Backspace key
    Backspace,
    /// Escape key
    Escape,
    /// Space bar
    Space,
    /// Delete key
    Delete,
    /// Insert key
    Insert,
    /// Home key
    Home,
    /// End key
    End,
    /// Page Up key
    PageUp,
    /// Page Down key
    PageDown,
    /// Up arrow key
    Up,
    /// Down arrow key
    Down,
    /// Left arrow key
    Left,
    /// Right arrow key
    Right,
    /// Function keys F1-F12
    F(u8),
}

/// Modifier keys held during a key event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct KeyModifiers {
    /// Control key is held
    pub ctrl: bool,
    /// Alt/Option key is held
    pub alt: bool,
    /// Shift key is held
    pub shift: bool,
}

impl KeyModifiers {
    pub const NONE: KeyModifiers = KeyModifiers {
        ctrl: false,
        alt: false,
        shift: false,
    };
}

/// A key chord: one key plus its modifiers
///
/// Parses from and prints as the usual `ctrl+shift+f1` notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyCombo {
    pub code: KeyCode,
    pub modifiers: KeyModifiers,
}

impl KeyCombo {
    pub fn new(code: KeyCode, modifiers: KeyModifiers) -> Self {
        Self { code, modifiers }
    }

    /// A combo with no modifiers
    pub fn plain(code: KeyCode) -> Self {
        Self::new(code, KeyModifiers::NONE)
    }
}

/// Error parsing a key combo string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseKeyError(pub String);

impl fmt::Display for ParseKeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unrecognized key: {}", self.0)
    }
}

impl std::error::Error for ParseKeyError {}

fn parse_key_code(token: &str) -> Result<KeyCode, ParseKeyError> {
    let lower = token.to_ascii_lowercase();
    let code = match lower.as_str() {
        "enter" | "return" => KeyCode::Enter,
        "tab" => KeyCode::Tab,
        "backspace" => KeyCode::Backspace,
        "esc" | "escape" => KeyCode::Escape,
        "space" => KeyCode::Space,
        "delete" | "del" => KeyCode::Delete,
        "insert" | "ins" => KeyCode::Insert,
        "home" => KeyCode::Home,
        "end" => KeyCode::End,
        "pageup" => KeyCode::PageUp,
        "pagedown" => KeyCode::PageDown,
        "up" => KeyCode::Up,
        "down" => KeyCode::Down,
        "left" => KeyCode::Left,
        "right" => KeyCode::Right,
        _ => {
            if let Some(rest) = lower.strip_prefix('f') {
                if let Ok(n) = rest.parse::<u8>() {
                    if (1..=12).contains(&n) {
                        return Ok(KeyCode::F(n));
                    }
                }
            }
            let mut chars = lower.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => KeyCode::Char(c),
                _ => return Err(ParseKeyError(token.to_string())),
            }
        }
    };
    Ok(code)
}

impl FromStr for KeyCombo {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut modifiers = KeyModifiers::default();
        let mut code = None;
        for token in s.split('+').map(str::trim).filter(|t| !t.is_empty()) {
            match token.to_ascii_lowercase().as_str() {
                "ctrl" | "control" => modifiers.ctrl = true,
                "alt" => modifiers.alt = true,
                "shift" => modifiers.shift = true,
                _ => {
                    if code.is_some() {
                        return Err(ParseKeyError(s.to_string()));
                    }
                    code = Some(parse_key_code(token)?);
                }
            }
        }
        match code {
            Some(code) => Ok(KeyCombo { code, modifiers }),
            None => Err(ParseKeyError(s.to_string())),
        }
    }
}

impl fmt::Display for KeyCombo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.modifiers.ctrl {
            write!(f, "ctrl+")?;
        }
        if self.modifiers.alt {
            write!(f, "alt+")?;
        }
        if self.modifiers.shift {
            write!(f, "shift+")?;
        }
        match self.code {
            KeyCode::Char(c) => write!(f, "{c}"),
            KeyCode::F(n) => write!(f, "f{n}"),
            KeyCode::Enter => write!(f, "enter"),
            KeyCode::Tab => write!(f, "tab"),
            KeyCode::Backspace => write!(f, "backspace"),
            KeyCode::Escape => write!(f, "esc"),
            KeyCode::Space => write!(f, "space"),
            KeyCode::Delete => write!(f, "delete"),
            KeyCode::Insert => write!(f, "insert"),
            KeyCode::Home => write!(f, "home"),
            KeyCode::End => write!(f, "end"),
            KeyCode::PageUp => write!(f, "pageup"),
            KeyCode::PageDown => write!(f, "pagedown"),
            KeyCode::Up => write!(f, "up"),
            KeyCode::Down => write!(f, "down"),
            KeyCode::Left => write!(f, "left"),
            KeyCode::Right => write!(f, "right"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_character() {
        let combo: KeyCombo = "a".parse().unwrap();
        assert_eq!(combo, KeyCombo::plain(KeyCode::Char('a')));
    }

    #[test]
    fn parses_modified_function_key() {
        let combo: KeyCombo = "ctrl+shift+f5".parse().unwrap();
        assert_eq!(combo.code, KeyCode::F(5));
        assert!(combo.modifiers.ctrl);
        assert!(combo.modifiers.shift);
        assert!(!combo.modifiers.alt);
    }

    #[test]
    fn display_round_trips() {
        for s in ["ctrl+x", "alt+enter", "f12", "shift+pageup"] {
            let combo: KeyCombo = s.parse().unwrap();
            assert_eq!(combo.to_string(), s);
        }
    }

    #[test]
    fn rejects_garbage() {
        assert!("ctrl+".parse::<KeyCombo>().is_err());
        assert!("foo".parse::<KeyCombo>().is_err());
        assert!("f99".parse::<KeyCombo>().is_err());
    }
}
