use std::sync::Mutex;

use crate::error::{FlowError, Result};
use crate::logger;

/// Keys the engine needs to tap or chord.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Enter,
    Escape,
    Tab,
    Space,
    Backspace,
    Delete,
    PageDown,
    PageUp,
    Home,
    End,
    Up,
    Down,
    Left,
    Right,
}

impl Key {
    /// Parse a key name as written in macro scripts (`"pagedown"`, `"enter"`, `"a"`).
    pub fn parse(name: &str) -> Option<Key> {
        let lower = name.to_lowercase();
        let key = match lower.as_str() {
            "enter" | "return" => Key::Enter,
            "escape" | "esc" => Key::Escape,
            "tab" => Key::Tab,
            "space" => Key::Space,
            "backspace" => Key::Backspace,
            "delete" | "del" => Key::Delete,
            "pagedown" | "pgdn" => Key::PageDown,
            "pageup" | "pgup" => Key::PageUp,
            "home" => Key::Home,
            "end" => Key::End,
            "up" => Key::Up,
            "down" => Key::Down,
            "left" => Key::Left,
            "right" => Key::Right,
            _ => {
                let mut chars = name.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Key::Char(c),
                    _ => return None,
                }
            }
        };
        Some(key)
    }
}

/// Modifier held for a key chord.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    Control,
    Meta,
    Shift,
    Alt,
}

/// The platform's clipboard/select-all modifier (Cmd on macOS, Ctrl elsewhere).
pub fn command_modifier() -> Modifier {
    if cfg!(target_os = "macos") {
        Modifier::Meta
    } else {
        Modifier::Control
    }
}

/// Pointer and keyboard injection.
pub trait InputDriver {
    fn position(&mut self) -> Result<(i32, i32)>;
    fn move_to(&mut self, x: i32, y: i32) -> Result<()>;
    fn click(&mut self) -> Result<()>;
    fn tap(&mut self, key: Key) -> Result<()>;
    fn chord(&mut self, modifier: Modifier, key: Key) -> Result<()>;

    /// Deterministic move-then-click.
    fn click_at(&mut self, x: i32, y: i32) -> Result<()> {
        self.move_to(x, y)?;
        self.click()
    }
}

/// System clipboard access.
pub trait Clipboard {
    fn set_text(&mut self, text: &str) -> Result<()>;
    fn get_text(&mut self) -> Result<String>;
}

/// Serialises clipboard use across threads: one chunk's copy+paste pair holds it.
pub static CLIPBOARD_LOCK: Mutex<()> = Mutex::new(());

/// enigo-backed driver.
pub struct EnigoDriver {
    enigo: enigo::Enigo,
}

impl EnigoDriver {
    pub fn new() -> Result<Self> {
        let enigo = enigo::Enigo::new(&enigo::Settings::default())
            .map_err(|e| FlowError::Input(format!("cannot open input simulator: {}", e)))?;
        Ok(Self { enigo })
    }
}

fn enigo_key(key: Key) -> enigo::Key {
    match key {
        Key::Char(c) => enigo::Key::Unicode(c),
        Key::Enter => enigo::Key::Return,
        Key::Escape => enigo::Key::Escape,
        Key::Tab => enigo::Key::Tab,
        Key::Space => enigo::Key::Space,
        Key::Backspace => enigo::Key::Backspace,
        Key::Delete => enigo::Key::Delete,
        Key::PageDown => enigo::Key::PageDown,
        Key::PageUp => enigo::Key::PageUp,
        Key::Home => enigo::Key::Home,
        Key::End => enigo::Key::End,
        Key::Up => enigo::Key::UpArrow,
        Key::Down => enigo::Key::DownArrow,
        Key::Left => enigo::Key::LeftArrow,
        Key::Right => enigo::Key::RightArrow,
    }
}

fn enigo_modifier(modifier: Modifier) -> enigo::Key {
    match modifier {
        Modifier::Control => enigo::Key::Control,
        Modifier::Meta => enigo::Key::Meta,
        Modifier::Shift => enigo::Key::Shift,
        Modifier::Alt => enigo::Key::Alt,
    }
}

fn input_err(e: enigo::InputError) -> FlowError {
    FlowError::Input(e.to_string())
}

impl InputDriver for EnigoDriver {
    fn position(&mut self) -> Result<(i32, i32)> {
        use enigo::Mouse;
        self.enigo.location().map_err(input_err)
    }

    fn move_to(&mut self, x: i32, y: i32) -> Result<()> {
        use enigo::Mouse;
        self.enigo.move_mouse(x, y, enigo::Coordinate::Abs).map_err(input_err)
    }

    fn click(&mut self) -> Result<()> {
        use enigo::Mouse;
        self.enigo.button(enigo::Button::Left, enigo::Direction::Click).map_err(input_err)
    }

    fn tap(&mut self, key: Key) -> Result<()> {
        use enigo::Keyboard;
        self.enigo.key(enigo_key(key), enigo::Direction::Click).map_err(input_err)
    }

    fn chord(&mut self, modifier: Modifier, key: Key) -> Result<()> {
        use enigo::Keyboard;
        let m = enigo_modifier(modifier);
        self.enigo.key(m, enigo::Direction::Press).map_err(input_err)?;
        let res = self.enigo.key(enigo_key(key), enigo::Direction::Click).map_err(input_err);
        // Always release the modifier, even if the key itself failed
        let release = self.enigo.key(m, enigo::Direction::Release).map_err(input_err);
        res.and(release)
    }
}

/// arboard-backed clipboard.
pub struct SystemClipboard {
    inner: arboard::Clipboard,
}

impl SystemClipboard {
    pub fn new() -> Result<Self> {
        let inner = arboard::Clipboard::new().map_err(|e| FlowError::Input(format!("clipboard unavailable: {}", e)))?;
        logger::register_prefix("paste", logger::COLOR_GREEN);
        Ok(Self { inner })
    }
}

impl Clipboard for SystemClipboard {
    fn set_text(&mut self, text: &str) -> Result<()> {
        self.inner
            .set_text(text.to_string())
            .map_err(|e| FlowError::Input(format!("clipboard write failed: {}", e)))
    }

    fn get_text(&mut self) -> Result<String> {
        self.inner
            .get_text()
            .map_err(|e| FlowError::Input(format!("clipboard read failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_names() {
        assert_eq!(Key::parse("pagedown"), Some(Key::PageDown));
        assert_eq!(Key::parse("Enter"), Some(Key::Enter));
        assert_eq!(Key::parse("v"), Some(Key::Char('v')));
        assert_eq!(Key::parse("é"), Some(Key::Char('é')));
        assert_eq!(Key::parse("nope"), None);
        assert_eq!(Key::parse(""), None);
    }
}
