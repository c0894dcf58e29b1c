//! Keymap Module
//!
//! The keycode ↔ keysym table and modifier map, plus the modifier vocabulary
//! shared by key and mouse binding strings.

use x11rb::protocol::xproto::{KeyButMask, ModMask};

use crate::error::{Error, Result};
use crate::x::keysym::{self, Keysym, NO_SYMBOL};
use crate::x::{KeyboardMapping, ModifierMapping, XServer};

/// Parse one modifier token, case-insensitively
///
/// Recognises shift, lock, control, mod1..mod5 and any. With `buttons` set,
/// button1..button5 are accepted as well (mouse bindings only).
pub fn parse_modifier(token: &str, buttons: bool) -> Option<u16> {
    let mask = match token.to_lowercase().as_str() {
        "shift" => ModMask::SHIFT,
        "lock" => ModMask::LOCK,
        "control" => ModMask::CONTROL,
        "mod1" => ModMask::M1,
        "mod2" => ModMask::M2,
        "mod3" => ModMask::M3,
        "mod4" => ModMask::M4,
        "mod5" => ModMask::M5,
        "any" => ModMask::ANY,
        "button1" if buttons => return Some(u16::from(KeyButMask::BUTTON1)),
        "button2" if buttons => return Some(u16::from(KeyButMask::BUTTON2)),
        "button3" if buttons => return Some(u16::from(KeyButMask::BUTTON3)),
        "button4" if buttons => return Some(u16::from(KeyButMask::BUTTON4)),
        "button5" if buttons => return Some(u16::from(KeyButMask::BUTTON5)),
        _ => return None,
    };
    Some(u16::from(mask))
}

/// Parse a modifier-only string such as "lock-mod2"; the empty string is no
/// modifiers
pub fn parse_modifiers(s: &str) -> Result<u16> {
    if s.is_empty() {
        return Ok(0);
    }
    s.split('-').try_fold(0u16, |mods, token| {
        parse_modifier(token, false)
            .map(|m| mods | m)
            .ok_or_else(|| Error::InvalidModifier(s.to_string()))
    })
}

/// Current keyboard and modifier mapping of the server
#[derive(Debug, Clone, Default)]
pub struct Keymap {
    keyboard: KeyboardMapping,
    modifiers: ModifierMapping,
}

impl Keymap {
    pub fn new(keyboard: KeyboardMapping, modifiers: ModifierMapping) -> Self {
        Self {
            keyboard,
            modifiers,
        }
    }

    /// Fetch both maps from the server
    ///
    /// Every key binding depends on these, so failure is reported as
    /// [`Error::Keymap`] and callers treat it as fatal.
    pub fn load(server: &dyn XServer) -> Result<Self> {
        let keyboard = server
            .keyboard_mapping()
            .map_err(|e| Error::Keymap(Box::new(e)))?;
        let modifiers = server
            .modifier_mapping()
            .map_err(|e| Error::Keymap(Box::new(e)))?;
        Ok(Self::new(keyboard, modifiers))
    }

    pub fn min_keycode(&self) -> u8 {
        self.keyboard.min_keycode
    }

    pub fn max_keycode(&self) -> u8 {
        self.keyboard.max_keycode
    }

    /// Keysym in `column` of `keycode`, or NoSymbol
    pub fn keysym(&self, keycode: u8, column: u8) -> Keysym {
        let per = self.keyboard.keysyms_per_keycode;
        if keycode < self.keyboard.min_keycode || column >= per {
            return NO_SYMBOL;
        }
        let idx = (keycode - self.keyboard.min_keycode) as usize * per as usize + column as usize;
        self.keyboard.keysyms.get(idx).copied().unwrap_or(NO_SYMBOL)
    }

    /// Every keycode that produces `sym` in any column
    pub fn keycodes(&self, sym: Keysym) -> Vec<u8> {
        if sym == NO_SYMBOL {
            return Vec::new();
        }
        let per = self.keyboard.keysyms_per_keycode;
        (self.keyboard.min_keycode..=self.keyboard.max_keycode)
            .filter(|&kc| (0..per).any(|col| self.keysym(kc, col) == sym))
            .collect()
    }

    /// Keycodes for a key name from a binding string
    pub fn lookup(&self, name: &str) -> Vec<u8> {
        keysym::lookup(name)
            .map(|sym| self.keycodes(sym))
            .unwrap_or_default()
    }

    /// Modifier bit that `sym` is mapped to, or 0 if it is not a modifier
    pub fn modifier_for(&self, sym: Keysym) -> u16 {
        let codes = self.keycodes(sym);
        let per = self.modifiers.keycodes_per_modifier as usize;
        if per == 0 {
            return 0;
        }
        self.modifiers
            .keycodes
            .chunks(per)
            .enumerate()
            .take(8)
            .filter(|(_, row)| row.iter().any(|kc| *kc != 0 && codes.contains(kc)))
            .fold(0, |mask, (i, _)| mask | (1 << i))
    }
}
