//! Compiled mapping rules
//!
//! Rules are built once from the configuration file and looked up by trigger
//! (the data-1 byte: note number or controller number) within their table.

use crate::keymap::KeyRef;

/// Common view of a rule: the data-1 byte that selects it
pub trait Rule {
    fn trigger(&self) -> u8;
}

/// Note or pad rule: direct press/release of one key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRule {
    pub trigger: u8,
    pub key: KeyRef,
}

pub type NoteRule = KeyRule;
pub type PadRule = KeyRule;

impl Rule for KeyRule {
    fn trigger(&self) -> u8 {
        self.trigger
    }
}

/// What a button does when its logical state changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ButtonAction {
    /// Press/release a key; `alt_key` replaces it while alternate inputs are held
    Key { key: KeyRef, alt_key: Option<KeyRef> },
    /// Hold to switch every button to its alternate key
    AltToggle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonRule {
    pub trigger: u8,
    pub action: ButtonAction,
    /// Latched mode: the button is "down" while the value is `>= threshold`,
    /// and only edges produce key actions.
    pub threshold: Option<u8>,
}

impl Rule for ButtonRule {
    fn trigger(&self) -> u8 {
        self.trigger
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KnobRule {
    /// Endless encoder: `<= threshold` is minus, above is plus.
    /// `threshold` overrides the router-wide value.
    Relative {
        trigger: u8,
        key_minus: KeyRef,
        key_plus: KeyRef,
        threshold: Option<u8>,
    },
    /// Absolute knob: direction from the change since `last_value`, ties go to minus
    Absolute {
        trigger: u8,
        key_minus: KeyRef,
        key_plus: KeyRef,
        last_value: u8,
    },
    /// Sets the virtual register to `value mod (modulus + 1)`
    RegisterSet { trigger: u8, modulus: u8 },
    /// Types the register as a numpad digit
    RegisterSend { trigger: u8 },
}

impl Rule for KnobRule {
    fn trigger(&self) -> u8 {
        match self {
            KnobRule::Relative { trigger, .. }
            | KnobRule::Absolute { trigger, .. }
            | KnobRule::RegisterSet { trigger, .. }
            | KnobRule::RegisterSend { trigger } => *trigger,
        }
    }
}

/// Ordered rule table with at most one rule per trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleTable<R> {
    rules: Vec<R>,
}

impl<R> Default for RuleTable<R> {
    fn default() -> Self {
        Self { rules: Vec::new() }
    }
}

impl<R: Rule> RuleTable<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule. A rule whose trigger is already taken is handed back
    /// and the existing one stays.
    pub fn insert(&mut self, rule: R) -> Result<(), R> {
        if self.get(rule.trigger()).is_some() {
            return Err(rule);
        }
        self.rules.push(rule);
        Ok(())
    }

    pub fn get(&self, trigger: u8) -> Option<&R> {
        self.rules.iter().find(|r| r.trigger() == trigger)
    }

    pub fn get_mut(&mut self, trigger: u8) -> Option<&mut R> {
        self.rules.iter_mut().find(|r| r.trigger() == trigger)
    }

    pub fn iter(&self) -> impl Iterator<Item = &R> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
