// Glyphkeys Key Type
// Scan codes from linux/input-event-codes.h plus the character tables
// the interception path is built on.

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

/// A keyboard scan code.
///
/// Codes follow the kernel's KEY_* numbering, which is layout independent:
/// code 30 is the key labelled A on a QWERTY board regardless of the active
/// compositor layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyCode(u16);

impl KeyCode {
    pub const ESC: KeyCode = KeyCode(1);
    pub const ENTER: KeyCode = KeyCode(28);
    pub const LEFT_CTRL: KeyCode = KeyCode(29);
    pub const LEFT_SHIFT: KeyCode = KeyCode(42);
    pub const RIGHT_SHIFT: KeyCode = KeyCode(54);
    pub const LEFT_ALT: KeyCode = KeyCode(56);
    pub const SPACE: KeyCode = KeyCode(57);
    pub const CAPS_LOCK: KeyCode = KeyCode(58);
    pub const RIGHT_CTRL: KeyCode = KeyCode(97);
    pub const RIGHT_ALT: KeyCode = KeyCode(100);

    pub const fn new(code: u16) -> Self {
        KeyCode(code)
    }

    pub const fn code(self) -> u16 {
        self.0
    }

    /// Display name, or None for codes outside the named table.
    pub fn name(self) -> Option<&'static str> {
        name_table().get(&self.0).copied()
    }
}

impl From<u16> for KeyCode {
    fn from(code: u16) -> Self {
        KeyCode(code)
    }
}

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}", name),
            None => write!(f, "KEY_{}", self.0),
        }
    }
}

/// Try to parse a key name to a key code. Case insensitive. Accepts the
/// numeric `KEY_{n}` form that `Display` produces for unnamed codes.
pub fn key_from_name(name: &str) -> Option<KeyCode> {
    let upper = name.to_uppercase();
    if let Some(number) = upper.strip_prefix("KEY_") {
        if let Ok(code) = number.parse::<u16>() {
            return Some(KeyCode(code));
        }
    }
    name_table()
        .iter()
        .find(|(_, n)| **n == upper)
        .map(|(code, _)| KeyCode(*code))
}

/// Base character for a standard key: the unshifted, lowercase character
/// the key produces. Only letters, digits, and space count as standard;
/// everything else is outside the interceptable set.
pub fn key_to_char(key: KeyCode) -> Option<char> {
    static TABLE: OnceLock<HashMap<u16, char>> = OnceLock::new();
    TABLE
        .get_or_init(|| STANDARD_KEYS.iter().copied().collect())
        .get(&key.code())
        .copied()
}

/// Key code producing a character, folding letters to lowercase.
pub fn char_to_key(ch: char) -> Option<KeyCode> {
    static TABLE: OnceLock<HashMap<char, u16>> = OnceLock::new();
    TABLE
        .get_or_init(|| STANDARD_KEYS.iter().map(|(code, ch)| (*ch, *code)).collect())
        .get(&ch.to_ascii_lowercase())
        .copied()
        .map(KeyCode)
}

/// Whether the engine may intercept this key at all.
pub fn is_standard_key(key: KeyCode) -> bool {
    key_to_char(key).is_some()
}

/// QWERTY scan code to base character, one entry per standard key.
const STANDARD_KEYS: &[(u16, char)] = &[
    (2, '1'),
    (3, '2'),
    (4, '3'),
    (5, '4'),
    (6, '5'),
    (7, '6'),
    (8, '7'),
    (9, '8'),
    (10, '9'),
    (11, '0'),
    (16, 'q'),
    (17, 'w'),
    (18, 'e'),
    (19, 'r'),
    (20, 't'),
    (21, 'y'),
    (22, 'u'),
    (23, 'i'),
    (24, 'o'),
    (25, 'p'),
    (30, 'a'),
    (31, 's'),
    (32, 'd'),
    (33, 'f'),
    (34, 'g'),
    (35, 'h'),
    (36, 'j'),
    (37, 'k'),
    (38, 'l'),
    (44, 'z'),
    (45, 'x'),
    (46, 'c'),
    (47, 'v'),
    (48, 'b'),
    (49, 'n'),
    (50, 'm'),
    (57, ' '),
];

fn name_table() -> &'static HashMap<u16, &'static str> {
    static NAMES: OnceLock<HashMap<u16, &'static str>> = OnceLock::new();
    NAMES.get_or_init(|| {
        let mut names = HashMap::new();
        names.insert(1, "ESC");
        names.insert(2, "1");
        names.insert(3, "2");
        names.insert(4, "3");
        names.insert(5, "4");
        names.insert(6, "5");
        names.insert(7, "6");
        names.insert(8, "7");
        names.insert(9, "8");
        names.insert(10, "9");
        names.insert(11, "0");
        names.insert(12, "MINUS");
        names.insert(13, "EQUAL");
        names.insert(14, "BACKSPACE");
        names.insert(15, "TAB");
        names.insert(16, "Q");
        names.insert(17, "W");
        names.insert(18, "E");
        names.insert(19, "R");
        names.insert(20, "T");
        names.insert(21, "Y");
        names.insert(22, "U");
        names.insert(23, "I");
        names.insert(24, "O");
        names.insert(25, "P");
        names.insert(26, "LEFT_BRACE");
        names.insert(27, "RIGHT_BRACE");
        names.insert(28, "ENTER");
        names.insert(29, "LEFT_CTRL");
        names.insert(30, "A");
        names.insert(31, "S");
        names.insert(32, "D");
        names.insert(33, "F");
        names.insert(34, "G");
        names.insert(35, "H");
        names.insert(36, "J");
        names.insert(37, "K");
        names.insert(38, "L");
        names.insert(39, "SEMICOLON");
        names.insert(40, "APOSTROPHE");
        names.insert(41, "GRAVE");
        names.insert(42, "LEFT_SHIFT");
        names.insert(43, "BACKSLASH");
        names.insert(44, "Z");
        names.insert(45, "X");
        names.insert(46, "C");
        names.insert(47, "V");
        names.insert(48, "B");
        names.insert(49, "N");
        names.insert(50, "M");
        names.insert(51, "COMMA");
        names.insert(52, "DOT");
        names.insert(53, "SLASH");
        names.insert(54, "RIGHT_SHIFT");
        names.insert(55, "KPASTERISK");
        names.insert(56, "LEFT_ALT");
        names.insert(57, "SPACE");
        names.insert(58, "CAPSLOCK");
        names.insert(59, "F1");
        names.insert(60, "F2");
        names.insert(61, "F3");
        names.insert(62, "F4");
        names.insert(63, "F5");
        names.insert(64, "F6");
        names.insert(65, "F7");
        names.insert(66, "F8");
        names.insert(67, "F9");
        names.insert(68, "F10");
        names.insert(69, "NUMLOCK");
        names.insert(70, "SCROLLLOCK");
        names.insert(87, "F11");
        names.insert(88, "F12");
        names.insert(96, "KPENTER");
        names.insert(97, "RIGHT_CTRL");
        names.insert(99, "SYSRQ");
        names.insert(100, "RIGHT_ALT");
        names.insert(102, "HOME");
        names.insert(103, "UP");
        names.insert(104, "PAGE_UP");
        names.insert(105, "LEFT");
        names.insert(106, "RIGHT");
        names.insert(107, "END");
        names.insert(108, "DOWN");
        names.insert(109, "PAGE_DOWN");
        names.insert(110, "INSERT");
        names.insert(111, "DELETE");
        names.insert(119, "PAUSE");
        names.insert(125, "LEFT_META");
        names.insert(126, "RIGHT_META");
        names.insert(139, "MENU");
        names
    })
}
