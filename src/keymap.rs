//! Keymap registry
//!
//! Static description of every key the gateway can synthesize (virtual key,
//! hardware scan code, extended flag, display name) plus the symbolic names
//! used in the configuration file. [`Keymap::emit`] turns a key reference into
//! key-down / key-up actions for a [`KeySink`].
//!
//! Scan codes are keyboard set 1 codes. Arrows, PgUp/PgDown, Home and Del
//! need the extended flag.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::info;

use crate::inject::{KeyAction, KeySink};

/// Virtual key identifier (Windows virtual-key code)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId(pub u16);

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VK 0x{:02X}", self.0)
    }
}

/// Reference to a key from a rule. `None` is an intentionally unmapped slot.
pub type KeyRef = Option<KeyId>;

/// Virtual-key codes used by the built-in table
pub mod vk {
    use super::KeyId;

    pub const BACK: KeyId = KeyId(0x08);
    pub const TAB: KeyId = KeyId(0x09);
    pub const RETURN: KeyId = KeyId(0x0D);
    pub const SPACE: KeyId = KeyId(0x20);
    pub const PRIOR: KeyId = KeyId(0x21);
    pub const NEXT: KeyId = KeyId(0x22);
    pub const HOME: KeyId = KeyId(0x24);
    pub const LEFT: KeyId = KeyId(0x25);
    pub const UP: KeyId = KeyId(0x26);
    pub const RIGHT: KeyId = KeyId(0x27);
    pub const DOWN: KeyId = KeyId(0x28);
    pub const DELETE: KeyId = KeyId(0x2E);
    pub const NUMPAD0: KeyId = KeyId(0x60);
    pub const ADD: KeyId = KeyId(0x6B);
    pub const SUBTRACT: KeyId = KeyId(0x6D);
    pub const LSHIFT: KeyId = KeyId(0xA0);
    pub const LCONTROL: KeyId = KeyId(0xA2);
    pub const LMENU: KeyId = KeyId(0xA4);
    pub const OEM_COMMA: KeyId = KeyId(0xBC);
    pub const OEM_PERIOD: KeyId = KeyId(0xBE);

    /// Digit or upper-case letter key (`b'0'..=b'9'`, `b'A'..=b'Z'`)
    pub const fn ch(c: u8) -> KeyId {
        KeyId(c as u16)
    }

    /// Numpad digit key, `n` in 0..=9
    pub const fn numpad(n: u8) -> KeyId {
        KeyId(NUMPAD0.0 + n as u16)
    }
}

/// One synthesizable key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDescriptor {
    pub id: KeyId,
    pub scan_code: u16,
    pub extended: bool,
    pub display_name: &'static str,
}

const fn key(id: KeyId, scan_code: u16, extended: bool, display_name: &'static str) -> KeyDescriptor {
    KeyDescriptor {
        id,
        scan_code,
        extended,
        display_name,
    }
}

const BUILTIN_KEYS: &[KeyDescriptor] = &[
    key(vk::DOWN, 0x50, true, "Down"),
    key(vk::NEXT, 0x51, true, "PgDown"),
    key(vk::LEFT, 0x4b, true, "Left"),
    key(vk::RIGHT, 0x4d, true, "Right"),
    key(vk::UP, 0x48, true, "Up"),
    key(vk::PRIOR, 0x49, true, "PgUp"),
    key(vk::HOME, 0x47, true, "Home"),
    key(vk::DELETE, 0x53, true, "Del"),
    // PICO-8 reads the main-row scan codes for these two
    key(vk::SUBTRACT, 0x0c, false, "-"),
    key(vk::ADD, 0x0d, false, "+"),
    key(vk::RETURN, 0x1c, false, "Enter"),
    key(vk::SPACE, 0x39, false, "Space"),
    key(vk::OEM_COMMA, 0x33, false, ","),
    key(vk::OEM_PERIOD, 0x34, false, "."),
    key(vk::LMENU, 0x38, false, "Alt"),
    key(vk::LCONTROL, 0x1d, false, "Ctrl"),
    key(vk::LSHIFT, 0x2a, false, "Shift"),
    key(vk::TAB, 0x0f, false, "Tab"),
    key(vk::BACK, 0x0e, false, "Backspace"),
    key(vk::numpad(0), 0x52, false, "Numpad0"),
    key(vk::numpad(1), 0x4f, false, "Numpad1"),
    key(vk::numpad(2), 0x50, false, "Numpad2"),
    key(vk::numpad(3), 0x51, false, "Numpad3"),
    key(vk::numpad(4), 0x4b, false, "Numpad4"),
    key(vk::numpad(5), 0x4c, false, "Numpad5"),
    key(vk::numpad(6), 0x4d, false, "Numpad6"),
    key(vk::numpad(7), 0x47, false, "Numpad7"),
    key(vk::numpad(8), 0x48, false, "Numpad8"),
    key(vk::numpad(9), 0x49, false, "Numpad9"),
    key(vk::ch(b'1'), 0x02, false, "1"),
    key(vk::ch(b'2'), 0x03, false, "2"),
    key(vk::ch(b'3'), 0x04, false, "3"),
    key(vk::ch(b'4'), 0x05, false, "4"),
    key(vk::ch(b'5'), 0x06, false, "5"),
    key(vk::ch(b'6'), 0x07, false, "6"),
    key(vk::ch(b'7'), 0x08, false, "7"),
    key(vk::ch(b'8'), 0x09, false, "8"),
    key(vk::ch(b'9'), 0x0a, false, "9"),
    key(vk::ch(b'0'), 0x0b, false, "0"),
    key(vk::ch(b'Q'), 0x10, false, "Q"),
    key(vk::ch(b'W'), 0x11, false, "W"),
    key(vk::ch(b'E'), 0x12, false, "E"),
    key(vk::ch(b'R'), 0x13, false, "R"),
    key(vk::ch(b'T'), 0x14, false, "T"),
    key(vk::ch(b'Y'), 0x15, false, "Y"),
    key(vk::ch(b'U'), 0x16, false, "U"),
    key(vk::ch(b'I'), 0x17, false, "I"),
    key(vk::ch(b'O'), 0x18, false, "O"),
    key(vk::ch(b'P'), 0x19, false, "P"),
    key(vk::ch(b'A'), 0x1e, false, "A"),
    key(vk::ch(b'S'), 0x1f, false, "S"),
    key(vk::ch(b'D'), 0x20, false, "D"),
    key(vk::ch(b'F'), 0x21, false, "F"),
    key(vk::ch(b'G'), 0x22, false, "G"),
    key(vk::ch(b'H'), 0x23, false, "H"),
    key(vk::ch(b'J'), 0x24, false, "J"),
    key(vk::ch(b'K'), 0x25, false, "K"),
    key(vk::ch(b'L'), 0x26, false, "L"),
    key(vk::ch(b'Z'), 0x2c, false, "Z"),
    key(vk::ch(b'X'), 0x2d, false, "X"),
    key(vk::ch(b'C'), 0x2e, false, "C"),
    key(vk::ch(b'V'), 0x2f, false, "V"),
    key(vk::ch(b'B'), 0x30, false, "B"),
    key(vk::ch(b'N'), 0x31, false, "N"),
    key(vk::ch(b'M'), 0x32, false, "M"),
];

/// Symbolic names accepted in the configuration file
const BUILTIN_NAMES: &[(&str, KeyId)] = &[
    ("1", vk::ch(b'1')),
    ("2", vk::ch(b'2')),
    ("3", vk::ch(b'3')),
    ("4", vk::ch(b'4')),
    ("5", vk::ch(b'5')),
    ("6", vk::ch(b'6')),
    ("7", vk::ch(b'7')),
    ("8", vk::ch(b'8')),
    ("9", vk::ch(b'9')),
    ("0", vk::ch(b'0')),
    ("-", vk::SUBTRACT),
    ("+", vk::ADD),
    ("q", vk::ch(b'Q')),
    ("w", vk::ch(b'W')),
    ("e", vk::ch(b'E')),
    ("r", vk::ch(b'R')),
    ("t", vk::ch(b'T')),
    ("y", vk::ch(b'Y')),
    ("u", vk::ch(b'U')),
    ("i", vk::ch(b'I')),
    ("o", vk::ch(b'O')),
    ("p", vk::ch(b'P')),
    ("a", vk::ch(b'A')),
    ("s", vk::ch(b'S')),
    ("d", vk::ch(b'D')),
    ("f", vk::ch(b'F')),
    ("g", vk::ch(b'G')),
    ("h", vk::ch(b'H')),
    ("j", vk::ch(b'J')),
    ("k", vk::ch(b'K')),
    ("l", vk::ch(b'L')),
    ("z", vk::ch(b'Z')),
    ("x", vk::ch(b'X')),
    ("c", vk::ch(b'C')),
    ("v", vk::ch(b'V')),
    ("b", vk::ch(b'B')),
    ("n", vk::ch(b'N')),
    ("m", vk::ch(b'M')),
    (",", vk::OEM_COMMA),
    (".", vk::OEM_PERIOD),
    ("down", vk::DOWN),
    ("pgdown", vk::NEXT),
    ("left", vk::LEFT),
    ("right", vk::RIGHT),
    ("up", vk::UP),
    ("pgup", vk::PRIOR),
    ("home", vk::HOME),
    ("del", vk::DELETE),
    ("return", vk::RETURN),
    ("space", vk::SPACE),
    ("alt", vk::LMENU),
    ("ctrl", vk::LCONTROL),
    ("shift", vk::LSHIFT),
    ("tab", vk::TAB),
    ("backspace", vk::BACK),
    ("numpad1", vk::numpad(1)),
    ("numpad2", vk::numpad(2)),
    ("numpad3", vk::numpad(3)),
    ("numpad4", vk::numpad(4)),
    ("numpad5", vk::numpad(5)),
    ("numpad6", vk::numpad(6)),
    ("numpad7", vk::numpad(7)),
    ("numpad8", vk::numpad(8)),
    ("numpad9", vk::numpad(9)),
    ("numpad0", vk::numpad(0)),
];

/// Name written for an unmapped slot; `""` is accepted as well when reading
pub const UNMAPPED_NAME: &str = "none";

static BUILTIN_TABLE: Lazy<Arc<KeyTable>> =
    Lazy::new(|| Arc::new(KeyTable::new(BUILTIN_KEYS.to_vec(), BUILTIN_NAMES)));

/// Key descriptors indexed by id, plus the symbolic name table
#[derive(Debug, Clone)]
pub struct KeyTable {
    keys: HashMap<KeyId, KeyDescriptor>,
    names: HashMap<String, KeyId>,
    reverse: HashMap<KeyId, String>,
}

impl KeyTable {
    /// Build a table from descriptors and `(name, id)` pairs.
    ///
    /// The first descriptor wins for a repeated id, and the first name listed
    /// for an id is the one used when writing configuration back out.
    pub fn new(descriptors: Vec<KeyDescriptor>, names: &[(&str, KeyId)]) -> Self {
        let mut keys = HashMap::with_capacity(descriptors.len());
        for descriptor in descriptors {
            keys.entry(descriptor.id).or_insert(descriptor);
        }

        let mut by_name = HashMap::with_capacity(names.len());
        let mut reverse = HashMap::with_capacity(names.len());
        for (name, id) in names {
            by_name.entry(name.to_string()).or_insert(*id);
            reverse.entry(*id).or_insert_with(|| name.to_string());
        }

        Self {
            keys,
            names: by_name,
            reverse,
        }
    }

    /// Shared built-in table
    pub fn builtin() -> Arc<KeyTable> {
        BUILTIN_TABLE.clone()
    }

    pub fn descriptor(&self, id: KeyId) -> Option<&KeyDescriptor> {
        self.keys.get(&id)
    }

    /// Resolve a configuration symbol.
    ///
    /// Returns `None` for an unknown name and `Some(None)` for the unmapped
    /// names (`""` and `"none"`). Matching ignores case and surrounding spaces.
    pub fn resolve(&self, name: &str) -> Option<KeyRef> {
        let name = name.trim().to_ascii_lowercase();
        if name.is_empty() || name == UNMAPPED_NAME {
            return Some(None);
        }
        self.names.get(&name).map(|id| Some(*id))
    }

    /// Configuration symbol for a key reference
    pub fn name_of(&self, key: KeyRef) -> &str {
        key.and_then(|id| self.reverse.get(&id))
            .map(String::as_str)
            .unwrap_or(UNMAPPED_NAME)
    }

    /// Numpad digit key for `digit` (0-9)
    pub fn numpad_digit(&self, digit: u8) -> KeyRef {
        (digit <= 9).then(|| vk::numpad(digit))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Key table bound to the sink that receives emitted actions
#[derive(Clone)]
pub struct Keymap {
    table: Arc<KeyTable>,
    sink: Arc<dyn KeySink>,
}

impl Keymap {
    pub fn new(table: Arc<KeyTable>, sink: Arc<dyn KeySink>) -> Self {
        Self { table, sink }
    }

    pub fn table(&self) -> &KeyTable {
        &self.table
    }

    /// Emit a key-down (if `press`) and a key-up (if `release`), in that order.
    ///
    /// Returns `false` without touching the sink when nothing is requested or
    /// the reference is unset, unknown or has no scan code.
    pub fn emit(&self, key: KeyRef, press: bool, release: bool) -> bool {
        if !press && !release {
            return false;
        }
        let Some(id) = key else {
            return false;
        };
        let Some(descriptor) = self.table.descriptor(id) else {
            return false;
        };
        if descriptor.scan_code == 0 {
            return false;
        }

        let action = |key_up| KeyAction {
            virtual_key: descriptor.id,
            scan_code: descriptor.scan_code,
            extended: descriptor.extended,
            key_up,
        };

        if press {
            self.sink.send(action(false));
        }
        if release {
            self.sink.send(action(true));
        }

        match (press, release) {
            (true, true) => info!("hit {}", descriptor.display_name),
            (true, false) => info!("press {}", descriptor.display_name),
            _ => info!("release {}", descriptor.display_name),
        }

        true
    }
}

impl fmt::Debug for Keymap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keymap")
            .field("keys", &self.table.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inject::RecordingSink;
    use std::collections::HashSet;

    fn keymap() -> (Keymap, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        (Keymap::new(KeyTable::builtin(), sink.clone()), sink)
    }

    #[test]
    fn test_builtin_ids_are_unique() {
        let ids: HashSet<_> = BUILTIN_KEYS.iter().map(|k| k.id).collect();
        assert_eq!(ids.len(), BUILTIN_KEYS.len());
    }

    #[test]
    fn test_every_name_has_a_descriptor() {
        let table = KeyTable::builtin();
        for (name, id) in BUILTIN_NAMES {
            let descriptor = table
                .descriptor(*id)
                .unwrap_or_else(|| panic!("no descriptor for '{}'", name));
            assert_ne!(descriptor.scan_code, 0, "'{}' has no scan code", name);
        }
    }

    #[test]
    fn test_resolve_names() {
        let table = KeyTable::builtin();
        assert_eq!(table.resolve("z"), Some(Some(vk::ch(b'Z'))));
        assert_eq!(table.resolve(" Z "), Some(Some(vk::ch(b'Z'))));
        assert_eq!(table.resolve("pgdown"), Some(Some(vk::NEXT)));
        assert_eq!(table.resolve(""), Some(None));
        assert_eq!(table.resolve("none"), Some(None));
        assert_eq!(table.resolve("f13"), None);
    }

    #[test]
    fn test_name_of_round_trips() {
        let table = KeyTable::builtin();
        for (name, id) in BUILTIN_NAMES {
            assert_eq!(table.name_of(Some(*id)), *name);
        }
        assert_eq!(table.name_of(None), UNMAPPED_NAME);
    }

    #[test]
    fn test_emit_unset_is_noop() {
        let (keymap, sink) = keymap();
        assert!(!keymap.emit(None, true, true));
        assert!(sink.take().is_empty());
    }

    #[test]
    fn test_emit_nothing_requested_is_noop() {
        let (keymap, sink) = keymap();
        assert!(!keymap.emit(Some(vk::ch(b'Z')), false, false));
        assert!(sink.take().is_empty());
    }

    #[test]
    fn test_emit_zero_scan_code_is_noop() {
        let sink = Arc::new(RecordingSink::new());
        let table = KeyTable::new(
            vec![key(KeyId(0x99), 0, false, "Dead")],
            &[("dead", KeyId(0x99))],
        );
        let keymap = Keymap::new(Arc::new(table), sink.clone());

        assert!(!keymap.emit(Some(KeyId(0x99)), true, true));
        assert!(!keymap.emit(Some(KeyId(0x42)), true, true));
        assert!(sink.take().is_empty());
    }

    #[test]
    fn test_emit_hit_sends_down_then_up() {
        let (keymap, sink) = keymap();
        assert!(keymap.emit(Some(vk::ch(b'Z')), true, true));

        let actions = sink.take();
        assert_eq!(actions.len(), 2);
        assert!(!actions[0].key_up);
        assert!(actions[1].key_up);
        assert_eq!(actions[0].virtual_key, vk::ch(b'Z'));
        assert_eq!(actions[0].scan_code, 0x2c);
        assert!(!actions[0].extended);
    }

    #[test]
    fn test_emit_extended_key() {
        let (keymap, sink) = keymap();
        assert!(keymap.emit(Some(vk::LEFT), false, true));

        let actions = sink.take();
        assert_eq!(
            actions,
            vec![KeyAction {
                virtual_key: vk::LEFT,
                scan_code: 0x4b,
                extended: true,
                key_up: true,
            }]
        );
    }

    #[test]
    fn test_numpad_digit() {
        let table = KeyTable::builtin();
        assert_eq!(table.numpad_digit(0), Some(vk::NUMPAD0));
        assert_eq!(table.numpad_digit(7), Some(KeyId(0x67)));
        assert_eq!(table.numpad_digit(10), None);
    }
}
