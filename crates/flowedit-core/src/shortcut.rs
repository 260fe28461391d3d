#![forbid(unsafe_code)]

//! Keyboard shortcuts for history navigation.
//!
//! | Chord                         | Action |
//! |-------------------------------|--------|
//! | `Ctrl+Z` / `Cmd+Z`            | Undo   |
//! | `Ctrl+Shift+Z` / `Cmd+Shift+Z`| Redo   |
//! | `Ctrl+Y` / `Cmd+Y`            | Redo   |
//!
//! Keys are matched case-insensitively, since holding Shift reports `Z`.

use bitflags::bitflags;

bitflags! {
    /// Modifier keys held during a key press.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Modifiers: u8 {
        const NONE  = 0b0000;
        const SHIFT = 0b0001;
        const ALT   = 0b0010;
        const CTRL  = 0b0100;
        /// Super/Meta/Command key.
        const SUPER = 0b1000;
    }
}

impl Default for Modifiers {
    fn default() -> Self {
        Self::NONE
    }
}

/// A key press plus its modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyChord {
    pub key: char,
    pub modifiers: Modifiers,
}

impl KeyChord {
    #[must_use]
    pub const fn new(key: char, modifiers: Modifiers) -> Self {
        Self { key, modifiers }
    }

    /// Either Ctrl or Cmd is held.
    #[must_use]
    pub fn has_command(&self) -> bool {
        self.modifiers.intersects(Modifiers::CTRL | Modifiers::SUPER)
    }
}

/// History action bound to a chord.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShortcutAction {
    Undo,
    Redo,
}

impl ShortcutAction {
    /// Resolve a chord to an action, if it is bound.
    #[must_use]
    pub fn from_chord(chord: &KeyChord) -> Option<Self> {
        if !chord.has_command() {
            return None;
        }
        let shift = chord.modifiers.contains(Modifiers::SHIFT);
        match chord.key.to_ascii_lowercase() {
            'z' if shift => Some(Self::Redo),
            'z' => Some(Self::Undo),
            'y' => Some(Self::Redo),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undo_with_ctrl_or_cmd() {
        for m in [Modifiers::CTRL, Modifiers::SUPER] {
            assert_eq!(
                ShortcutAction::from_chord(&KeyChord::new('z', m)),
                Some(ShortcutAction::Undo)
            );
        }
    }

    #[test]
    fn redo_bindings() {
        assert_eq!(
            ShortcutAction::from_chord(&KeyChord::new('Z', Modifiers::CTRL | Modifiers::SHIFT)),
            Some(ShortcutAction::Redo)
        );
        assert_eq!(
            ShortcutAction::from_chord(&KeyChord::new('y', Modifiers::SUPER)),
            Some(ShortcutAction::Redo)
        );
        assert_eq!(
            ShortcutAction::from_chord(&KeyChord::new('Y', Modifiers::CTRL)),
            Some(ShortcutAction::Redo)
        );
    }

    #[test]
    fn unbound_chords() {
        assert_eq!(ShortcutAction::from_chord(&KeyChord::new('z', Modifiers::NONE)), None);
        assert_eq!(ShortcutAction::from_chord(&KeyChord::new('z', Modifiers::ALT)), None);
        assert_eq!(ShortcutAction::from_chord(&KeyChord::new('x', Modifiers::CTRL)), None);
    }
}
