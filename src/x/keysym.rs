//! Keysym names
//!
//! Name ↔ keysym table for the keys a desktop actually binds: Latin-1
//! printable characters, function keys, navigation and editing keys,
//! modifiers, the keypad and the XF86 multimedia keys.

use std::collections::HashMap;
use std::sync::OnceLock;

pub type Keysym = u32;

pub const NO_SYMBOL: Keysym = 0;

const NAMED: &[(&str, Keysym)] = &[
    ("space", 0x0020),
    ("exclam", 0x0021),
    ("quotedbl", 0x0022),
    ("numbersign", 0x0023),
    ("dollar", 0x0024),
    ("percent", 0x0025),
    ("ampersand", 0x0026),
    ("apostrophe", 0x0027),
    ("parenleft", 0x0028),
    ("parenright", 0x0029),
    ("asterisk", 0x002a),
    ("plus", 0x002b),
    ("comma", 0x002c),
    ("minus", 0x002d),
    ("period", 0x002e),
    ("slash", 0x002f),
    ("colon", 0x003a),
    ("semicolon", 0x003b),
    ("less", 0x003c),
    ("equal", 0x003d),
    ("greater", 0x003e),
    ("question", 0x003f),
    ("at", 0x0040),
    ("bracketleft", 0x005b),
    ("backslash", 0x005c),
    ("bracketright", 0x005d),
    ("asciicircum", 0x005e),
    ("underscore", 0x005f),
    ("grave", 0x0060),
    ("braceleft", 0x007b),
    ("bar", 0x007c),
    ("braceright", 0x007d),
    ("asciitilde", 0x007e),
    ("BackSpace", 0xff08),
    ("Tab", 0xff09),
    ("Linefeed", 0xff0a),
    ("Clear", 0xff0b),
    ("Return", 0xff0d),
    ("Pause", 0xff13),
    ("Scroll_Lock", 0xff14),
    ("Sys_Req", 0xff15),
    ("Escape", 0xff1b),
    ("Delete", 0xffff),
    ("Home", 0xff50),
    ("Left", 0xff51),
    ("Up", 0xff52),
    ("Right", 0xff53),
    ("Down", 0xff54),
    ("Prior", 0xff55),
    ("Page_Up", 0xff55),
    ("Next", 0xff56),
    ("Page_Down", 0xff56),
    ("End", 0xff57),
    ("Begin", 0xff58),
    ("Select", 0xff60),
    ("Print", 0xff61),
    ("Execute", 0xff62),
    ("Insert", 0xff63),
    ("Undo", 0xff65),
    ("Redo", 0xff66),
    ("Menu", 0xff67),
    ("Find", 0xff68),
    ("Cancel", 0xff69),
    ("Help", 0xff6a),
    ("Break", 0xff6b),
    ("Mode_switch", 0xff7e),
    ("Num_Lock", 0xff7f),
    ("KP_Space", 0xff80),
    ("KP_Tab", 0xff89),
    ("KP_Enter", 0xff8d),
    ("KP_Home", 0xff95),
    ("KP_Left", 0xff96),
    ("KP_Up", 0xff97),
    ("KP_Right", 0xff98),
    ("KP_Down", 0xff99),
    ("KP_Prior", 0xff9a),
    ("KP_Page_Up", 0xff9a),
    ("KP_Next", 0xff9b),
    ("KP_Page_Down", 0xff9b),
    ("KP_End", 0xff9c),
    ("KP_Begin", 0xff9d),
    ("KP_Insert", 0xff9e),
    ("KP_Delete", 0xff9f),
    ("KP_Equal", 0xffbd),
    ("KP_Multiply", 0xffaa),
    ("KP_Add", 0xffab),
    ("KP_Separator", 0xffac),
    ("KP_Subtract", 0xffad),
    ("KP_Decimal", 0xffae),
    ("KP_Divide", 0xffaf),
    ("Shift_L", 0xffe1),
    ("Shift_R", 0xffe2),
    ("Control_L", 0xffe3),
    ("Control_R", 0xffe4),
    ("Caps_Lock", 0xffe5),
    ("Shift_Lock", 0xffe6),
    ("Meta_L", 0xffe7),
    ("Meta_R", 0xffe8),
    ("Alt_L", 0xffe9),
    ("Alt_R", 0xffea),
    ("Super_L", 0xffeb),
    ("Super_R", 0xffec),
    ("Hyper_L", 0xffed),
    ("Hyper_R", 0xffee),
    ("ISO_Left_Tab", 0xfe20),
    ("XF86MonBrightnessUp", 0x1008ff02),
    ("XF86MonBrightnessDown", 0x1008ff03),
    ("XF86KbdBrightnessUp", 0x1008ff05),
    ("XF86KbdBrightnessDown", 0x1008ff06),
    ("XF86AudioLowerVolume", 0x1008ff11),
    ("XF86AudioMute", 0x1008ff12),
    ("XF86AudioRaiseVolume", 0x1008ff13),
    ("XF86AudioPlay", 0x1008ff14),
    ("XF86AudioStop", 0x1008ff15),
    ("XF86AudioPrev", 0x1008ff16),
    ("XF86AudioNext", 0x1008ff17),
    ("XF86HomePage", 0x1008ff18),
    ("XF86Mail", 0x1008ff19),
    ("XF86Search", 0x1008ff1b),
    ("XF86AudioRecord", 0x1008ff1c),
    ("XF86Calculator", 0x1008ff1d),
    ("XF86Calendar", 0x1008ff20),
    ("XF86PowerDown", 0x1008ff21),
    ("XF86Back", 0x1008ff26),
    ("XF86Forward", 0x1008ff27),
    ("XF86PowerOff", 0x1008ff2a),
    ("XF86Eject", 0x1008ff2c),
    ("XF86ScreenSaver", 0x1008ff2d),
    ("XF86Sleep", 0x1008ff2f),
    ("XF86AudioPause", 0x1008ff31),
    ("XF86Explorer", 0x1008ff5d),
    ("XF86TouchpadToggle", 0x1008ffa9),
    ("XF86AudioMicMute", 0x1008ffb2),
];

fn table() -> &'static HashMap<String, Keysym> {
    static TABLE: OnceLock<HashMap<String, Keysym>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut map: HashMap<String, Keysym> = NAMED
            .iter()
            .map(|(name, sym)| (name.to_string(), *sym))
            .collect();
        // letters and digits are named by themselves
        for c in ('a'..='z').chain('A'..='Z').chain('0'..='9') {
            map.insert(c.to_string(), c as Keysym);
        }
        // keypad digits and function keys are contiguous
        for i in 0..10u32 {
            map.insert(format!("KP_{}", i), 0xffb0 + i);
        }
        for i in 1..=35u32 {
            map.insert(format!("F{}", i), 0xffbe + i - 1);
        }
        map
    })
}

fn title_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Look up a keysym by exact name
pub fn from_name(name: &str) -> Option<Keysym> {
    table().get(name).copied()
}

/// Look up a keysym the way binding strings are resolved
///
/// Tries the name as given, then title case, lower case and upper case, so
/// "return", "RETURN" and "Return" all resolve.
pub fn lookup(name: &str) -> Option<Keysym> {
    from_name(name)
        .or_else(|| from_name(&title_case(name)))
        .or_else(|| from_name(&name.to_lowercase()))
        .or_else(|| from_name(&name.to_uppercase()))
}

/// Name of a keysym, if it is in the table
pub fn name(sym: Keysym) -> Option<&'static str> {
    table()
        .iter()
        .filter(|(_, s)| **s == sym)
        .map(|(n, _)| n.as_str())
        .min()
}
