// Physical input simulation through enigo.
use enigo::{Button, Coordinate, Direction, Enigo, Key, Keyboard, Mouse, Settings};

use crate::errors::{PilotError, PilotResult};

/// Exclusive writer of input events to the host display.
pub trait InputDriver: Send {
    /// Absolute move, logical pixels.
    fn move_pointer(&mut self, x: i32, y: i32) -> PilotResult<()>;

    fn left_click(&mut self) -> PilotResult<()>;

    fn type_text(&mut self, text: &str) -> PilotResult<()>;

    /// Press every key in order, then release them in reverse.
    fn key_chord(&mut self, keys: &[Key]) -> PilotResult<()>;
}

/// enigo-backed driver. A connection is opened per call since `Enigo` is not
/// `Send` on every platform.
#[derive(Debug, Default)]
pub struct EnigoDriver;

impl EnigoDriver {
    pub fn new() -> Self {
        Self
    }
}

fn connect() -> PilotResult<Enigo> {
    Enigo::new(&Settings::default()).map_err(|e| PilotError::Execution(format!("input connection: {e}")))
}

fn input_err(what: &str, e: impl std::fmt::Display) -> PilotError {
    PilotError::Execution(format!("{what}: {e}"))
}

impl InputDriver for EnigoDriver {
    fn move_pointer(&mut self, x: i32, y: i32) -> PilotResult<()> {
        connect()?
            .move_mouse(x, y, Coordinate::Abs)
            .map_err(|e| input_err("move pointer", e))
    }

    fn left_click(&mut self) -> PilotResult<()> {
        connect()?
            .button(Button::Left, Direction::Click)
            .map_err(|e| input_err("click", e))
    }

    fn type_text(&mut self, text: &str) -> PilotResult<()> {
        connect()?.text(text).map_err(|e| input_err("type text", e))
    }

    fn key_chord(&mut self, keys: &[Key]) -> PilotResult<()> {
        let mut enigo = connect()?;
        let mut pressed: Vec<Key> = Vec::with_capacity(keys.len());
        let mut failure = None;

        for key in keys {
            match enigo.key(*key, Direction::Press) {
                Ok(()) => pressed.push(*key),
                Err(e) => {
                    failure = Some(input_err(&format!("press {key:?}"), e));
                    break;
                }
            }
        }
        // Always release what went down, even after a failed press.
        for key in pressed.iter().rev() {
            if let Err(e) = enigo.key(*key, Direction::Release) {
                tracing::warn!(key = ?key, error = %e, "key release failed");
            }
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Current pointer position in logical pixels.
pub fn pointer_location() -> PilotResult<(i32, i32)> {
    connect()?.location().map_err(|e| input_err("pointer location", e))
}

/// Map a key name from a decision reply to an enigo key. Single characters
/// become unicode keys; unknown names return `None`.
pub fn parse_key(name: &str) -> Option<Key> {
    let lower = name.trim().to_ascii_lowercase();
    let key = match lower.as_str() {
        "ctrl" | "control" => Key::Control,
        "shift" => Key::Shift,
        "alt" | "option" | "opt" => Key::Alt,
        "cmd" | "command" | "win" | "windows" | "super" | "meta" => Key::Meta,
        "enter" | "return" => Key::Return,
        "tab" => Key::Tab,
        "esc" | "escape" => Key::Escape,
        "space" | "spacebar" => Key::Space,
        "backspace" => Key::Backspace,
        "delete" | "del" => Key::Delete,
        "up" | "arrowup" => Key::UpArrow,
        "down" | "arrowdown" => Key::DownArrow,
        "left" | "arrowleft" => Key::LeftArrow,
        "right" | "arrowright" => Key::RightArrow,
        "home" => Key::Home,
        "end" => Key::End,
        "pageup" | "pgup" => Key::PageUp,
        "pagedown" | "pgdn" => Key::PageDown,
        "capslock" => Key::CapsLock,
        "f1" => Key::F1,
        "f2" => Key::F2,
        "f3" => Key::F3,
        "f4" => Key::F4,
        "f5" => Key::F5,
        "f6" => Key::F6,
        "f7" => Key::F7,
        "f8" => Key::F8,
        "f9" => Key::F9,
        "f10" => Key::F10,
        "f11" => Key::F11,
        "f12" => Key::F12,
        _ => {
            let mut chars = name.trim().chars();
            return match (chars.next(), chars.next()) {
                (Some(c), None) => Some(Key::Unicode(c.to_ascii_lowercase())),
                _ => None,
            };
        }
    };
    Some(key)
}

/// The key that opens the system launcher.
pub fn launcher_chord() -> Vec<Key> {
    if cfg!(target_os = "macos") {
        vec![Key::Meta, Key::Space]
    } else {
        vec![Key::Meta]
    }
}
