//! Router module - classification and translation of MIDI messages into keys
//!
//! The Router owns everything that changes while the gateway runs:
//! - the active pad bank (switched by a dedicated controller)
//! - the alternate-inputs modifier
//! - the virtual numpad register
//! - latch state of threshold buttons, per controller number
//! - the last value of every absolute knob (kept inside the knob rule)
//!
//! All of it sits behind one mutex held for the whole of [`Router::handle`],
//! so messages are applied one at a time even if the transport calls in
//! from several threads.

pub mod rules;


use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info};

use crate::keymap::{KeyRef, Keymap};
use crate::midi::{Echo, RawMessage};
pub use rules::{ButtonAction, ButtonRule, KeyRule, KnobRule, NoteRule, PadRule, Rule, RuleTable};

/// Status bytes of the Axiom 25 in its default setup
pub const DEFAULT_NOTE_STATUS: u8 = 0x90;
pub const DEFAULT_PAD_STATUS: u8 = 0x99;
pub const DEFAULT_BUTTON_STATUS: u8 = 0xBF;
pub const DEFAULT_KNOB_STATUS: u8 = 0xB0;
pub const DEFAULT_KNOB_THRESHOLD: u8 = 64;

/// Message category, selected by exact status byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Note,
    Pad,
    Button,
    Knob,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Note => write!(f, "note"),
            Category::Pad => write!(f, "pad"),
            Category::Button => write!(f, "button"),
            Category::Knob => write!(f, "cc"),
        }
    }
}

/// Immutable routing configuration, compiled from the config file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterConfig {
    pub note_status: u8,
    /// Extra status byte routed to the note table as a release
    pub note_off_status: Option<u8>,
    pub pad_status: u8,
    pub button_status: u8,
    pub knob_status: u8,
    /// Button controller that selects the pad bank
    pub bank_switch: Option<u8>,
    /// Default direction threshold for relative knobs
    pub knob_threshold: u8,
    pub log_midi_messages: bool,
    pub notes: RuleTable<NoteRule>,
    pub pads: [RuleTable<PadRule>; 2],
    pub buttons: RuleTable<ButtonRule>,
    pub knobs: RuleTable<KnobRule>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            note_status: DEFAULT_NOTE_STATUS,
            note_off_status: None,
            pad_status: DEFAULT_PAD_STATUS,
            button_status: DEFAULT_BUTTON_STATUS,
            knob_status: DEFAULT_KNOB_STATUS,
            bank_switch: None,
            knob_threshold: DEFAULT_KNOB_THRESHOLD,
            log_midi_messages: false,
            notes: RuleTable::new(),
            pads: [RuleTable::new(), RuleTable::new()],
            buttons: RuleTable::new(),
            knobs: RuleTable::new(),
        }
    }
}

impl RouterConfig {
    /// Category of a status byte. The four categories are checked in order,
    /// so a byte configured twice goes to the first one.
    pub fn classify(&self, status: u8) -> Option<Category> {
        if status == self.note_status {
            Some(Category::Note)
        } else if status == self.pad_status {
            Some(Category::Pad)
        } else if status == self.button_status {
            Some(Category::Button)
        } else if status == self.knob_status {
            Some(Category::Knob)
        } else {
            None
        }
    }
}

/// What a message did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Key actions were submitted
    Emitted,
    /// A rule matched but its key is unmapped
    Unmapped,
    /// The category matched but no rule has this trigger
    Unresolved { category: Category, trigger: u8 },
    /// The bank-switch controller was used
    BankSelected { bank: u8, changed: bool },
    /// The alternate-inputs button changed state
    AltInputs { active: bool },
    /// The virtual register was written
    RegisterSet { value: u8, changed: bool },
    /// A latched button stayed on the same side of its threshold
    Held,
    /// Unknown status byte or empty message
    Ignored,
}

/// Per-session mutable state
#[derive(Debug)]
struct Session {
    bank: u8,
    alt_inputs: bool,
    register: u8,
    latches: HashMap<u8, bool>,
    knobs: RuleTable<KnobRule>,
}

impl Session {
    fn new(config: &RouterConfig) -> Self {
        Self {
            bank: 0,
            alt_inputs: false,
            register: 0,
            latches: HashMap::new(),
            knobs: config.knobs.clone(),
        }
    }
}

/// Translates MIDI messages into key actions
pub struct Router {
    config: RouterConfig,
    keymap: Keymap,
    session: Mutex<Session>,
}

impl Router {
    pub fn new(config: RouterConfig, keymap: Keymap) -> Self {
        let session = Mutex::new(Session::new(&config));
        Self {
            config,
            keymap,
            session,
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Route a three-byte message
    pub fn handle(&self, status: u8, data1: u8, data2: u8) -> Outcome {
        let message = RawMessage::new(status, data1, data2);
        self.dispatch(&message, &message.bytes())
    }

    /// Route a message as delivered by the transport.
    /// Missing data bytes read as 0; an empty message is ignored.
    pub fn handle_bytes(&self, bytes: &[u8]) -> Outcome {
        match RawMessage::from_bytes(bytes) {
            Some(message) => self.dispatch(&message, bytes),
            None => Outcome::Ignored,
        }
    }

    fn dispatch(&self, message: &RawMessage, raw: &[u8]) -> Outcome {
        let mut session = self.session.lock();
        let outcome = self.route(&mut session, message);
        drop(session);

        if self.config.log_midi_messages {
            info!("{}", Echo(raw));
        }

        outcome
    }

    fn route(&self, session: &mut Session, message: &RawMessage) -> Outcome {
        let RawMessage {
            status,
            data1,
            data2,
            ..
        } = *message;

        match self.config.classify(status) {
            Some(Category::Note) => self.on_key(Category::Note, &self.config.notes, data1, data2 != 0),
            Some(Category::Pad) => {
                let pads = &self.config.pads[usize::from(session.bank)];
                self.on_key(Category::Pad, pads, data1, data2 != 0)
            }
            Some(Category::Button) => self.on_button(session, data1, data2),
            Some(Category::Knob) => self.on_knob(session, data1, data2),
            None if self.config.note_off_status == Some(status) => {
                self.on_key(Category::Note, &self.config.notes, data1, false)
            }
            None => Outcome::Ignored,
        }
    }

    fn on_key(&self, category: Category, table: &RuleTable<KeyRule>, trigger: u8, press: bool) -> Outcome {
        match table.get(trigger) {
            Some(rule) => self.emit(category, trigger, rule.key, press, !press),
            None => {
                info!("{} {}", category, trigger);
                Outcome::Unresolved { category, trigger }
            }
        }
    }

    fn on_button(&self, session: &mut Session, data1: u8, data2: u8) -> Outcome {
        if self.config.bank_switch == Some(data1) {
            let bank = u8::from(data2 != 0);
            let changed = session.bank != bank;
            if changed {
                session.bank = bank;
                if bank == 1 {
                    info!("pads in number mode");
                } else {
                    info!("pads in cursor mode");
                }
            }
            return Outcome::BankSelected { bank, changed };
        }

        let Some(rule) = self.config.buttons.get(data1) else {
            info!("button {}", data1);
            return Outcome::Unresolved {
                category: Category::Button,
                trigger: data1,
            };
        };

        let (press, release) = match rule.threshold {
            None => (data2 != 0, data2 == 0),
            Some(threshold) => {
                let on = data2 >= threshold;
                match session.latches.insert(data1, on) {
                    // First message on this controller: only a press counts
                    None => (on, false),
                    Some(was_on) if was_on != on => (on, !on),
                    Some(_) => (false, false),
                }
            }
        };

        if !press && !release {
            return Outcome::Held;
        }

        match rule.action {
            ButtonAction::AltToggle => {
                session.alt_inputs = press;
                info!("alt inputs {}", if press { "ON" } else { "OFF" });
                Outcome::AltInputs { active: press }
            }
            ButtonAction::Key { key, alt_key } => {
                let key = match alt_key {
                    Some(alt) if session.alt_inputs => alt,
                    _ => key,
                };
                self.emit(Category::Button, data1, key, press, release)
            }
        }
    }

    fn on_knob(&self, session: &mut Session, data1: u8, data2: u8) -> Outcome {
        let Session {
            knobs, register, ..
        } = session;

        let Some(rule) = knobs.get_mut(data1) else {
            info!("cc {} val {}", data1, data2);
            return Outcome::Unresolved {
                category: Category::Knob,
                trigger: data1,
            };
        };

        match rule {
            KnobRule::RegisterSet { modulus, .. } => {
                let value = data2 % (*modulus + 1);
                let changed = value != *register;
                if changed {
                    *register = value;
                    info!("virtual numpad set to {}", value);
                }
                Outcome::RegisterSet { value, changed }
            }
            KnobRule::RegisterSend { .. } => {
                let key = self.keymap.table().numpad_digit(*register);
                self.emit(Category::Knob, data1, key, true, true)
            }
            KnobRule::Absolute {
                key_minus,
                key_plus,
                last_value,
                ..
            } => {
                let key = if data2 <= *last_value {
                    *key_minus
                } else {
                    *key_plus
                };
                *last_value = data2;
                self.emit(Category::Knob, data1, key, true, true)
            }
            KnobRule::Relative {
                key_minus,
                key_plus,
                threshold,
                ..
            } => {
                let threshold = threshold.unwrap_or(self.config.knob_threshold);
                let key = if data2 <= threshold {
                    *key_minus
                } else {
                    *key_plus
                };
                self.emit(Category::Knob, data1, key, true, true)
            }
        }
    }

    fn emit(&self, category: Category, trigger: u8, key: KeyRef, press: bool, release: bool) -> Outcome {
        if self.keymap.emit(key, press, release) {
            Outcome::Emitted
        } else {
            debug!("{} {} is unmapped", category, trigger);
            Outcome::Unmapped
        }
    }

    /// Active pad bank (0 or 1)
    pub fn bank(&self) -> u8 {
        self.session.lock().bank
    }

    /// Whether alternate inputs are currently held
    pub fn alt_inputs(&self) -> bool {
        self.session.lock().alt_inputs
    }

    /// Current value of the virtual register
    pub fn register(&self) -> u8 {
        self.session.lock().register
    }

    /// Last value seen by an absolute knob
    pub fn knob_last_value(&self, trigger: u8) -> Option<u8> {
        match self.session.lock().knobs.get(trigger) {
            Some(KnobRule::Absolute { last_value, .. }) => Some(*last_value),
            _ => None,
        }
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("config", &self.config)
            .field("session", &*self.session.lock())
            .finish()
    }
}
