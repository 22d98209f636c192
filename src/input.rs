use std::collections::HashSet;

use glam::Vec2;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::game::Mode;

/// Pointer travel, in physical pixels, below which a press and release count as a click.
pub const CLICK_TOLERANCE: f32 = 4.0;

/// Identifier for a physical keyboard key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyCode {
    Named(NamedKey),
    Character(char),
    Digit(u8),
}

impl KeyCode {
    pub fn from_name(name: &str) -> Option<Self> {
        if let Some(key) = parse_named_key(name) {
            return Some(key);
        }
        let mut chars = name.chars();
        match (chars.next(), chars.next()) {
            (Some(ch), None) if ch.is_ascii_alphabetic() => {
                Some(Self::Character(ch.to_ascii_uppercase()))
            }
            (Some(ch), None) if ch.is_ascii_digit() => Some(Self::Digit(ch as u8 - b'0')),
            _ => None,
        }
    }
}

fn parse_named_key(name: &str) -> Option<KeyCode> {
    use NamedKey::*;
    let key = match name {
        "Space" => Space,
        "Enter" | "Return" => Enter,
        "Escape" | "Esc" => Escape,
        _ => return None,
    };
    Some(KeyCode::Named(key))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NamedKey {
    Space,
    Enter,
    Escape,
}

/// Identifier for a mouse button (left button is zero).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MouseButton(u8);

impl MouseButton {
    pub const LEFT: Self = Self(0);

    pub fn new(index: u8) -> Self {
        Self(index)
    }

    pub fn index(self) -> u8 {
        self.0
    }
}

/// What the keyboard can ask the application to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppCommand {
    /// Play from the menu, start a loaded session, or replay after victory.
    Confirm,
    Rules,
    SelectMode(Mode),
    /// Leave the rules or play screen.
    Back,
}

pub const KEY_BINDINGS: &[(&str, AppCommand)] = &[
    ("Enter", AppCommand::Confirm),
    ("Space", AppCommand::Confirm),
    ("R", AppCommand::Rules),
    ("1", AppCommand::SelectMode(Mode::Individual)),
    ("2", AppCommand::SelectMode(Mode::Grouped)),
    ("Escape", AppCommand::Back),
];

impl AppCommand {
    pub fn for_key(key: KeyCode) -> Option<Self> {
        KEY_BINDINGS
            .iter()
            .find(|(name, _)| KeyCode::from_name(name) == Some(key))
            .map(|(_, command)| *command)
    }
}

/// Result of releasing the left button.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerRelease {
    Click(Vec2),
    DragEnd,
}

/// Keyboard and pointer snapshot fed by the window's event loop.
#[derive(Debug, Default)]
pub struct InputState {
    keys: RwLock<HashSet<KeyCode>>,
    mouse_buttons: RwLock<HashSet<MouseButton>>,
    mouse_position: RwLock<Vec2>,
    press: RwLock<Option<Press>>,
}

#[derive(Debug, Clone, Copy)]
struct Press {
    origin: Vec2,
    dragging: bool,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` only for the first press, so held keys do not repeat commands.
    pub fn set_key_down(&self, key: KeyCode) -> bool {
        self.keys.write().insert(key)
    }

    pub fn set_key_up(&self, key: KeyCode) {
        self.keys.write().remove(&key);
    }

    pub fn is_key_down(&self, key: KeyCode) -> bool {
        self.keys.read().contains(&key)
    }

    pub fn set_mouse_button_down(&self, button: MouseButton) {
        self.mouse_buttons.write().insert(button);
        if button == MouseButton::LEFT {
            *self.press.write() = Some(Press {
                origin: self.mouse_position(),
                dragging: false,
            });
        }
    }

    pub fn set_mouse_button_up(&self, button: MouseButton) -> Option<PointerRelease> {
        self.mouse_buttons.write().remove(&button);
        if button != MouseButton::LEFT {
            return None;
        }
        let press = self.press.write().take()?;
        Some(if press.dragging {
            PointerRelease::DragEnd
        } else {
            PointerRelease::Click(self.mouse_position())
        })
    }

    /// Records the new position and returns the drag delta while the left button is held
    /// and the pointer has left the click tolerance.
    pub fn set_mouse_position(&self, position: Vec2) -> Option<Vec2> {
        let previous = std::mem::replace(&mut *self.mouse_position.write(), position);
        let mut press = self.press.write();
        let press = press.as_mut()?;
        if !press.dragging && position.distance(press.origin) > CLICK_TOLERANCE {
            press.dragging = true;
            return Some(position - press.origin);
        }
        press.dragging.then_some(position - previous)
    }

    pub fn is_mouse_button_down(&self, button: MouseButton) -> bool {
        self.mouse_buttons.read().contains(&button)
    }

    pub fn mouse_position(&self) -> Vec2 {
        *self.mouse_position.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_named_and_character_keys() {
        assert_eq!(
            KeyCode::from_name("Space"),
            Some(KeyCode::Named(NamedKey::Space))
        );
        assert_eq!(KeyCode::from_name("r"), Some(KeyCode::Character('R')));
        assert_eq!(KeyCode::from_name("2"), Some(KeyCode::Digit(2)));
        assert_eq!(KeyCode::from_name("F12"), None);
    }

    #[test]
    fn keys_map_to_commands() {
        assert_eq!(
            AppCommand::for_key(KeyCode::Named(NamedKey::Enter)),
            Some(AppCommand::Confirm)
        );
        assert_eq!(
            AppCommand::for_key(KeyCode::Digit(2)),
            Some(AppCommand::SelectMode(Mode::Grouped))
        );
        assert_eq!(AppCommand::for_key(KeyCode::Character('Q')), None);
    }

    #[test]
    fn held_keys_fire_once() {
        let state = InputState::new();
        assert!(state.set_key_down(KeyCode::Named(NamedKey::Space)));
        assert!(!state.set_key_down(KeyCode::Named(NamedKey::Space)));
        state.set_key_up(KeyCode::Named(NamedKey::Space));
        assert!(!state.is_key_down(KeyCode::Named(NamedKey::Space)));
    }

    #[test]
    fn small_movement_is_still_a_click() {
        let state = InputState::new();
        state.set_mouse_position(Vec2::new(100.0, 100.0));
        state.set_mouse_button_down(MouseButton::LEFT);
        assert_eq!(state.set_mouse_position(Vec2::new(102.0, 101.0)), None);
        assert_eq!(
            state.set_mouse_button_up(MouseButton::LEFT),
            Some(PointerRelease::Click(Vec2::new(102.0, 101.0)))
        );
    }

    #[test]
    fn large_movement_becomes_a_drag() {
        let state = InputState::new();
        state.set_mouse_position(Vec2::new(100.0, 100.0));
        state.set_mouse_button_down(MouseButton::LEFT);
        assert_eq!(
            state.set_mouse_position(Vec2::new(110.0, 100.0)),
            Some(Vec2::new(10.0, 0.0))
        );
        assert_eq!(
            state.set_mouse_position(Vec2::new(112.0, 100.0)),
            Some(Vec2::new(2.0, 0.0))
        );
        assert_eq!(
            state.set_mouse_button_up(MouseButton::LEFT),
            Some(PointerRelease::DragEnd)
        );
        assert_eq!(state.set_mouse_position(Vec2::new(0.0, 0.0)), None);
    }

    #[test]
    fn other_buttons_do_not_click() {
        let state = InputState::new();
        state.set_mouse_button_down(MouseButton::new(2));
        assert!(state.is_mouse_button_down(MouseButton::new(2)));
        assert_eq!(state.set_mouse_button_up(MouseButton::new(2)), None);
    }
}
