//! Configuration management for midi2pico8
//!
//! Handles loading, compiling and writing back the mapping file. The file is
//! read once at startup; anything wrong with it falls back to the built-in
//! note layout so the gateway always starts.

pub mod jsonc;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;
use tokio::fs;
use tracing::{info, warn};

use crate::keymap::{vk, KeyRef, KeyTable};
use crate::router::{
    ButtonAction, ButtonRule, KeyRule, KnobRule, Rule, RouterConfig, RuleTable,
    DEFAULT_BUTTON_STATUS, DEFAULT_KNOB_STATUS, DEFAULT_KNOB_THRESHOLD, DEFAULT_NOTE_STATUS,
    DEFAULT_PAD_STATUS,
};

/// Config file read when none is given on the command line
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Knob `input-` value that turns the knob into the register setter
pub const NUMPAD_SET: &str = "numpadset";
/// Knob `input-` value that turns the knob into the register sender
pub const NUMPAD_SEND: &str = "numpadsend";
/// Button `input` value for the alternate-inputs modifier
pub const SWITCH_TO_ALT_INPUTS: &str = "switch_to_alt_inputs";

/// Highest register value when a `numpadset` knob has no `modulus`
pub const DEFAULT_MODULUS: u8 = 7;
/// The register is typed as a single numpad digit
pub const MAX_MODULUS: u8 = 9;

/// Built-in layout: two octaves of the piano mapped like a tracker keyboard
const BUILTIN_FIRST_NOTE: u8 = 48;
const BUILTIN_NOTE_KEYS: &str = "ZSXDCVGBHNJMQ2W3ER5T6Y7UI9O0P";

const NOTE_TABLE: &str = "note_inputs";
const PAD_TABLES: [&str; 2] = ["pad0_inputs", "pad1_inputs"];
const BUTTON_TABLE: &str = "btn_inputs";
const KNOB_TABLE: &str = "knob_inputs";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("unknown input '{name}' for data {trigger} in {table}")]
    UnknownKey {
        table: &'static str,
        trigger: u8,
        name: String,
    },

    #[error("modulus {modulus} for data {trigger} in {table} is out of range (must be 0-9)")]
    InvalidModulus {
        table: &'static str,
        trigger: u8,
        modulus: u8,
    },

    #[error("missing '{field}' for data {trigger} in {table}")]
    MissingField {
        table: &'static str,
        trigger: u8,
        field: &'static str,
    },
}

/// Authoring problems that do not prevent loading
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// Same trigger twice in one table; the first definition is kept
    DuplicateRule { table: &'static str, trigger: u8 },
    /// Two categories share a status byte; the first in note, pad, button, knob order
    /// wins and a note-off byte equal to any of them is never seen
    SharedStatus { status: u8 },
    /// `threshold` on an absolute knob, which has no use for it
    IgnoredThreshold { trigger: u8 },
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigWarning::DuplicateRule { table, trigger } => write!(
                f,
                "data {} is defined more than once in {}, keeping the first definition",
                trigger, table
            ),
            ConfigWarning::SharedStatus { status } => write!(
                f,
                "status byte {} is used by more than one category",
                status
            ),
            ConfigWarning::IgnoredThreshold { trigger } => write!(
                f,
                "threshold of absolute knob {} in {} is ignored",
                trigger, KNOB_TABLE
            ),
        }
    }
}

/// On-disk format, chosen from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                ConfigFormat::Yaml
            }
            _ => ConfigFormat::Json,
        }
    }
}

/// Root of the mapping file
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ConfigFile {
    pub log_midi_messages: bool,
    pub note_status: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note_off_status: Option<u8>,
    pub pad_status: u8,
    pub button_status: u8,
    pub knob_status: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bank_switch: Option<u8>,
    pub knob_threshold: u8,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub note_inputs: Vec<KeyInput>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pad0_inputs: Vec<KeyInput>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pad1_inputs: Vec<KeyInput>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub btn_inputs: Vec<ButtonInput>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub knob_inputs: Vec<KnobInput>,
}

/// Note or pad entry
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct KeyInput {
    #[serde(alias = "note")]
    pub data: u8,
    pub input: String,
}

/// Button entry
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ButtonInput {
    #[serde(alias = "cc")]
    pub data: u8,
    pub input: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<u8>,
}

/// Knob entry
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct KnobInput {
    #[serde(alias = "cc")]
    pub data: u8,
    #[serde(rename = "input-")]
    pub input_minus: String,
    #[serde(rename = "input+", default, skip_serializing_if = "Option::is_none")]
    pub input_plus: Option<String>,
    #[serde(default, skip_serializing_if = "KnobMode::is_relative")]
    pub mode: KnobMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modulus: Option<u8>,
}

/// How a knob reports direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KnobMode {
    /// Endless encoder, values around a threshold
    #[default]
    #[serde(alias = "infinite")]
    Relative,
    /// Position 0-127, direction from the change
    #[serde(alias = "finite")]
    Absolute,
}

impl KnobMode {
    fn is_relative(&self) -> bool {
        *self == KnobMode::Relative
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            log_midi_messages: false,
            note_status: DEFAULT_NOTE_STATUS,
            note_off_status: None,
            pad_status: DEFAULT_PAD_STATUS,
            button_status: DEFAULT_BUTTON_STATUS,
            knob_status: DEFAULT_KNOB_STATUS,
            bank_switch: None,
            knob_threshold: DEFAULT_KNOB_THRESHOLD,
            note_inputs: Vec::new(),
            pad0_inputs: Vec::new(),
            pad1_inputs: Vec::new(),
            btn_inputs: Vec::new(),
            knob_inputs: Vec::new(),
        }
    }
}

impl ConfigFile {
    /// Load configuration from file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })?;

        Self::parse(&contents, ConfigFormat::from_path(path))
    }

    /// Parse configuration text
    pub fn parse(contents: &str, format: ConfigFormat) -> Result<Self, ConfigError> {
        // Notepad and friends may save a byte order mark
        let contents = contents.strip_prefix('\u{feff}').unwrap_or(contents);

        match format {
            ConfigFormat::Json => Ok(serde_json::from_str(&jsonc::strip(contents))?),
            ConfigFormat::Yaml => Ok(serde_yaml::from_str(contents)?),
        }
    }

    /// Serialize configuration
    pub fn to_string(&self, format: ConfigFormat) -> Result<String, ConfigError> {
        match format {
            ConfigFormat::Json => Ok(serde_json::to_string_pretty(self)?),
            ConfigFormat::Yaml => Ok(serde_yaml::to_string(self)?),
        }
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        self.to_string(ConfigFormat::Json)
    }

    /// Save configuration to file
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let text = self.to_string(ConfigFormat::from_path(path))?;

        fs::write(path, text)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })
    }

    /// The fallback mapping, as a file
    pub fn builtin(keys: &KeyTable) -> Self {
        Self::from_router_config(&builtin_router_config(), keys)
    }

    /// Resolve key names and build the rule tables
    pub fn compile(&self, keys: &KeyTable) -> Result<(RouterConfig, Vec<ConfigWarning>), ConfigError> {
        let mut warnings = Vec::new();
        let mut config = RouterConfig {
            note_status: self.note_status,
            note_off_status: self.note_off_status,
            pad_status: self.pad_status,
            button_status: self.button_status,
            knob_status: self.knob_status,
            bank_switch: self.bank_switch,
            knob_threshold: self.knob_threshold,
            log_midi_messages: self.log_midi_messages,
            ..RouterConfig::default()
        };

        let mut statuses = vec![
            self.note_status,
            self.pad_status,
            self.button_status,
            self.knob_status,
        ];
        statuses.extend(self.note_off_status);
        for (i, status) in statuses.iter().enumerate() {
            if statuses[..i].contains(status) {
                warnings.push(ConfigWarning::SharedStatus { status: *status });
            }
        }

        for input in &self.note_inputs {
            let rule = KeyRule {
                trigger: input.data,
                key: resolve(keys, NOTE_TABLE, input.data, &input.input)?,
            };
            add(&mut config.notes, rule, NOTE_TABLE, &mut warnings);
        }

        for (bank, inputs) in [&self.pad0_inputs, &self.pad1_inputs].into_iter().enumerate() {
            let table = PAD_TABLES[bank];
            for input in inputs {
                let rule = KeyRule {
                    trigger: input.data,
                    key: resolve(keys, table, input.data, &input.input)?,
                };
                add(&mut config.pads[bank], rule, table, &mut warnings);
            }
        }

        for input in &self.btn_inputs {
            let rule = compile_button(input, keys)?;
            add(&mut config.buttons, rule, BUTTON_TABLE, &mut warnings);
        }

        for input in &self.knob_inputs {
            let rule = compile_knob(input, keys)?;
            if matches!(rule, KnobRule::Absolute { .. }) && input.threshold.is_some() {
                warnings.push(ConfigWarning::IgnoredThreshold { trigger: input.data });
            }
            add(&mut config.knobs, rule, KNOB_TABLE, &mut warnings);
        }

        Ok((config, warnings))
    }

    /// Write compiled rules back out as a file
    pub fn from_router_config(config: &RouterConfig, keys: &KeyTable) -> Self {
        let key_inputs = |table: &RuleTable<KeyRule>| -> Vec<KeyInput> {
            table
                .iter()
                .map(|rule| KeyInput {
                    data: rule.trigger,
                    input: keys.name_of(rule.key).to_string(),
                })
                .collect()
        };

        let btn_inputs = config
            .buttons
            .iter()
            .map(|rule| {
                let (input, alt_input) = match rule.action {
                    ButtonAction::AltToggle => (SWITCH_TO_ALT_INPUTS.to_string(), None),
                    ButtonAction::Key { key, alt_key } => (
                        keys.name_of(key).to_string(),
                        alt_key.map(|alt| keys.name_of(alt).to_string()),
                    ),
                };
                ButtonInput {
                    data: rule.trigger,
                    input,
                    alt_input,
                    threshold: rule.threshold,
                }
            })
            .collect();

        let knob_inputs = config
            .knobs
            .iter()
            .map(|rule| knob_input(rule, keys))
            .collect();

        Self {
            log_midi_messages: config.log_midi_messages,
            note_status: config.note_status,
            note_off_status: config.note_off_status,
            pad_status: config.pad_status,
            button_status: config.button_status,
            knob_status: config.knob_status,
            bank_switch: config.bank_switch,
            knob_threshold: config.knob_threshold,
            note_inputs: key_inputs(&config.notes),
            pad0_inputs: key_inputs(&config.pads[0]),
            pad1_inputs: key_inputs(&config.pads[1]),
            btn_inputs,
            knob_inputs,
        }
    }
}

impl RouterConfig {
    /// Config file that compiles back to these rules
    pub fn to_file(&self, keys: &KeyTable) -> ConfigFile {
        ConfigFile::from_router_config(self, keys)
    }
}

/// The fallback mapping: notes only, no pads, buttons or knobs
pub fn builtin_router_config() -> RouterConfig {
    let mut config = RouterConfig::default();
    for (trigger, c) in (BUILTIN_FIRST_NOTE..).zip(BUILTIN_NOTE_KEYS.bytes()) {
        let inserted = config.notes.insert(KeyRule {
            trigger,
            key: Some(vk::ch(c)),
        });
        // Triggers are consecutive, so none can collide
        debug_assert!(inserted.is_ok());
    }
    config
}

/// Load and compile `path`, or fall back to the built-in mapping.
///
/// Never fails: every problem is logged and the gateway keeps going.
pub async fn load_or_default(path: impl AsRef<Path>, keys: &KeyTable) -> RouterConfig {
    let path = path.as_ref();
    info!("Loading '{}'...", path.display());

    match ConfigFile::load(path).await.and_then(|file| file.compile(keys)) {
        Ok((config, warnings)) => {
            for warning in &warnings {
                warn!("{}", warning);
            }
            info!(
                notes = config.notes.len(),
                pads = config.pads[0].len() + config.pads[1].len(),
                buttons = config.buttons.len(),
                knobs = config.knobs.len(),
                "Configuration loaded"
            );
            config
        }
        Err(e) => {
            warn!("{}", e);
            warn!("Could not load '{}', reverting to default config", path.display());
            builtin_router_config()
        }
    }
}

fn resolve(keys: &KeyTable, table: &'static str, trigger: u8, name: &str) -> Result<KeyRef, ConfigError> {
    keys.resolve(name).ok_or_else(|| ConfigError::UnknownKey {
        table,
        trigger,
        name: name.to_string(),
    })
}

fn add<R: Rule>(table: &mut RuleTable<R>, rule: R, name: &'static str, warnings: &mut Vec<ConfigWarning>) {
    if let Err(rejected) = table.insert(rule) {
        warnings.push(ConfigWarning::DuplicateRule {
            table: name,
            trigger: rejected.trigger(),
        });
    }
}

fn is_sentinel(name: &str, sentinel: &str) -> bool {
    name.trim().eq_ignore_ascii_case(sentinel)
}

fn compile_button(input: &ButtonInput, keys: &KeyTable) -> Result<ButtonRule, ConfigError> {
    let action = if is_sentinel(&input.input, SWITCH_TO_ALT_INPUTS) {
        ButtonAction::AltToggle
    } else {
        let key = resolve(keys, BUTTON_TABLE, input.data, &input.input)?;
        let alt_key = input
            .alt_input
            .as_deref()
            .map(|name| resolve(keys, BUTTON_TABLE, input.data, name))
            .transpose()?;
        ButtonAction::Key { key, alt_key }
    };

    Ok(ButtonRule {
        trigger: input.data,
        action,
        threshold: input.threshold,
    })
}

fn compile_knob(input: &KnobInput, keys: &KeyTable) -> Result<KnobRule, ConfigError> {
    let trigger = input.data;

    if is_sentinel(&input.input_minus, NUMPAD_SET) {
        let modulus = input.modulus.unwrap_or(DEFAULT_MODULUS);
        if modulus > MAX_MODULUS {
            return Err(ConfigError::InvalidModulus {
                table: KNOB_TABLE,
                trigger,
                modulus,
            });
        }
        return Ok(KnobRule::RegisterSet { trigger, modulus });
    }
    if is_sentinel(&input.input_minus, NUMPAD_SEND) {
        return Ok(KnobRule::RegisterSend { trigger });
    }

    let key_minus = resolve(keys, KNOB_TABLE, trigger, &input.input_minus)?;
    let plus = input.input_plus.as_deref().ok_or(ConfigError::MissingField {
        table: KNOB_TABLE,
        trigger,
        field: "input+",
    })?;
    let key_plus = resolve(keys, KNOB_TABLE, trigger, plus)?;

    Ok(match input.mode {
        KnobMode::Relative => KnobRule::Relative {
            trigger,
            key_minus,
            key_plus,
            threshold: input.threshold,
        },
        KnobMode::Absolute => KnobRule::Absolute {
            trigger,
            key_minus,
            key_plus,
            last_value: 0,
        },
    })
}

fn knob_input(rule: &KnobRule, keys: &KeyTable) -> KnobInput {
    let blank = |data: u8, input_minus: &str| KnobInput {
        data,
        input_minus: input_minus.to_string(),
        input_plus: None,
        mode: KnobMode::Relative,
        threshold: None,
        modulus: None,
    };

    match *rule {
        KnobRule::Relative {
            trigger,
            key_minus,
            key_plus,
            threshold,
        } => KnobInput {
            input_plus: Some(keys.name_of(key_plus).to_string()),
            threshold,
            ..blank(trigger, keys.name_of(key_minus))
        },
        KnobRule::Absolute {
            trigger,
            key_minus,
            key_plus,
            ..
        } => KnobInput {
            input_plus: Some(keys.name_of(key_plus).to_string()),
            mode: KnobMode::Absolute,
            ..blank(trigger, keys.name_of(key_minus))
        },
        KnobRule::RegisterSet { trigger, modulus } => KnobInput {
            modulus: Some(modulus),
            ..blank(trigger, NUMPAD_SET)
        },
        KnobRule::RegisterSend { trigger } => blank(trigger, NUMPAD_SEND),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
    {
        // Axiom 25, default preset
        "log_midi_messages": true,
        "bank_switch": 113,
        "note_inputs": [
            { "data": 48, "input": "z" },
            { "data": 49, "input": "s" },
        ],
        "pad0_inputs": [ { "data": 36, "input": "ctrl" } ],
        "pad1_inputs": [ { "data": 36, "input": "numpad0" } ],
        "btn_inputs": [
            { "data": 114, "input": "-", "alt_input": "+" },
            { "data": 20, "input": "switch_to_alt_inputs", "threshold": 64 },
        ],
        "knob_inputs": [
            { "data": 74, "input-": ",", "input+": ".", "mode": "finite" },
            { "data": 75, "input-": "numpadset" },
            { "data": 76, "input-": "numpadsend" },
            { "data": 77, "input-": "left", "input+": "right", "threshold": 63 },
        ],
    }
    "#;

    fn keys() -> std::sync::Arc<KeyTable> {
        KeyTable::builtin()
    }

    #[test]
    fn test_parse_sample() {
        let file = ConfigFile::parse(SAMPLE, ConfigFormat::Json).unwrap();
        assert!(file.log_midi_messages);
        assert_eq!(file.note_status, DEFAULT_NOTE_STATUS);
        assert_eq!(file.bank_switch, Some(113));
        assert_eq!(file.note_inputs.len(), 2);
        assert_eq!(file.knob_inputs[0].mode, KnobMode::Absolute);
        assert_eq!(file.knob_inputs[3].mode, KnobMode::Relative);
    }

    #[test]
    fn test_compile_sample() {
        let file = ConfigFile::parse(SAMPLE, ConfigFormat::Json).unwrap();
        let (config, warnings) = file.compile(&keys()).unwrap();
        assert!(warnings.is_empty());

        assert_eq!(config.notes.get(48).unwrap().key, Some(vk::ch(b'Z')));
        assert_eq!(config.pads[0].get(36).unwrap().key, Some(vk::LCONTROL));
        assert_eq!(config.pads[1].get(36).unwrap().key, Some(vk::numpad(0)));
        assert_eq!(
            config.buttons.get(114).unwrap().action,
            ButtonAction::Key {
                key: Some(vk::SUBTRACT),
                alt_key: Some(Some(vk::ADD)),
            }
        );
        assert_eq!(config.buttons.get(20).unwrap().action, ButtonAction::AltToggle);
        assert_eq!(config.buttons.get(20).unwrap().threshold, Some(64));
        assert_eq!(
            config.knobs.get(75),
            Some(&KnobRule::RegisterSet {
                trigger: 75,
                modulus: DEFAULT_MODULUS,
            })
        );
        assert_eq!(config.knobs.get(76), Some(&KnobRule::RegisterSend { trigger: 76 }));
        assert!(matches!(
            config.knobs.get(77),
            Some(KnobRule::Relative {
                threshold: Some(63),
                ..
            })
        ));
    }

    #[test]
    fn test_legacy_field_names() {
        let text = r#"{ "note_inputs": [ { "note": 60, "input": "q" } ],
                        "btn_inputs": [ { "cc": 10, "input": "space" } ] }"#;
        let file = ConfigFile::parse(text, ConfigFormat::Json).unwrap();
        assert_eq!(file.note_inputs[0].data, 60);
        assert_eq!(file.btn_inputs[0].data, 10);
    }

    #[test]
    fn test_unmapped_names() {
        let text = r#"{ "note_inputs": [ { "data": 60, "input": "" }, { "data": 61, "input": "none" } ] }"#;
        let (config, _) = ConfigFile::parse(text, ConfigFormat::Json)
            .unwrap()
            .compile(&keys())
            .unwrap();
        assert_eq!(config.notes.get(60).unwrap().key, None);
        assert_eq!(config.notes.get(61).unwrap().key, None);
    }

    #[test]
    fn test_duplicate_rule_warns_and_keeps_first() {
        let text = r#"{ "note_inputs": [ { "data": 48, "input": "z" }, { "data": 48, "input": "x" } ] }"#;
        let (config, warnings) = ConfigFile::parse(text, ConfigFormat::Json)
            .unwrap()
            .compile(&keys())
            .unwrap();

        assert_eq!(
            warnings,
            vec![ConfigWarning::DuplicateRule {
                table: "note_inputs",
                trigger: 48,
            }]
        );
        assert_eq!(config.notes.len(), 1);
        assert_eq!(config.notes.get(48).unwrap().key, Some(vk::ch(b'Z')));
    }

    #[test]
    fn test_shared_status_warns() {
        let text = r#"{ "pad_status": 144 }"#;
        let (_, warnings) = ConfigFile::parse(text, ConfigFormat::Json)
            .unwrap()
            .compile(&keys())
            .unwrap();
        assert_eq!(warnings, vec![ConfigWarning::SharedStatus { status: 144 }]);
    }

    #[test]
    fn test_note_off_status_sharing_warns() {
        let text = r#"{ "note_off_status": 176 }"#;
        let (_, warnings) = ConfigFile::parse(text, ConfigFormat::Json)
            .unwrap()
            .compile(&keys())
            .unwrap();
        assert_eq!(warnings, vec![ConfigWarning::SharedStatus { status: 176 }]);

        let text = r#"{ "note_off_status": 128 }"#;
        let (_, warnings) = ConfigFile::parse(text, ConfigFormat::Json)
            .unwrap()
            .compile(&keys())
            .unwrap();
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_absolute_knob_threshold_warns() {
        let text = r#"{ "knob_inputs": [
            { "data": 74, "input-": ",", "input+": ".", "mode": "absolute", "threshold": 40 },
            { "data": 77, "input-": "left", "input+": "right", "threshold": 40 }
        ] }"#;
        let (config, warnings) = ConfigFile::parse(text, ConfigFormat::Json)
            .unwrap()
            .compile(&keys())
            .unwrap();

        assert_eq!(warnings, vec![ConfigWarning::IgnoredThreshold { trigger: 74 }]);
        assert!(matches!(config.knobs.get(74), Some(KnobRule::Absolute { .. })));
    }

    #[test]
    fn test_bom_prefixed_config() {
        let text = "\u{feff}{ \"note_inputs\": [ { \"data\": 60, \"input\": \"q\" } ] }";
        let (config, _) = ConfigFile::parse(text, ConfigFormat::Json)
            .unwrap()
            .compile(&keys())
            .unwrap();
        assert_eq!(config.notes.get(60).unwrap().key, Some(vk::ch(b'Q')));

        let text = "\u{feff}note_inputs:\n  - data: 60\n    input: q\n";
        let file = ConfigFile::parse(text, ConfigFormat::Yaml).unwrap();
        assert_eq!(file.note_inputs[0].data, 60);
    }

    #[tokio::test]
    async fn test_bom_prefixed_file_loads() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(
            &path,
            "\u{feff}{ \"btn_inputs\": [ { \"data\": 20, \"input\": \"space\" } ] }",
        )
        .unwrap();

        let config = load_or_default(&path, &keys()).await;
        assert_eq!(config.buttons.len(), 1);
        assert!(config.notes.is_empty());
    }

    #[test]
    fn test_unknown_key_is_an_error() {
        let text = r#"{ "btn_inputs": [ { "data": 5, "input": "f13" } ] }"#;
        let err = ConfigFile::parse(text, ConfigFormat::Json)
            .unwrap()
            .compile(&keys())
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::UnknownKey { trigger: 5, ref name, .. } if name == "f13"
        ));
    }

    #[test]
    fn test_invalid_modulus_is_an_error() {
        let text = r#"{ "knob_inputs": [ { "data": 75, "input-": "numpadset", "modulus": 10 } ] }"#;
        let err = ConfigFile::parse(text, ConfigFormat::Json)
            .unwrap()
            .compile(&keys())
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidModulus { modulus: 10, .. }));
    }

    #[test]
    fn test_knob_without_plus_is_an_error() {
        let text = r#"{ "knob_inputs": [ { "data": 74, "input-": "left" } ] }"#;
        let err = ConfigFile::parse(text, ConfigFormat::Json)
            .unwrap()
            .compile(&keys())
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { field: "input+", .. }));
    }

    #[test]
    fn test_yaml_config() {
        let text = r#"
note_status: 144
note_inputs:
  - data: 48
    input: z
knob_inputs:
  - data: 74
    "input-": ","
    "input+": "."
    mode: absolute
"#;
        let (config, _) = ConfigFile::parse(text, ConfigFormat::Yaml)
            .unwrap()
            .compile(&keys())
            .unwrap();
        assert_eq!(config.notes.len(), 1);
        assert!(matches!(config.knobs.get(74), Some(KnobRule::Absolute { .. })));
    }

    #[test]
    fn test_example_file_compiles() {
        let text = include_str!("../../config.example.json");
        let (config, warnings) = ConfigFile::parse(text, ConfigFormat::Json)
            .unwrap()
            .compile(&keys())
            .unwrap();

        assert!(warnings.is_empty(), "{:?}", warnings);
        assert_eq!(config.notes.len(), 29);
        assert_eq!(config.bank_switch, Some(113));
        assert_eq!(config.pads[1].get(36).unwrap().key, Some(vk::numpad(1)));
    }

    #[test]
    fn test_builtin_is_notes_only() {
        let config = builtin_router_config();
        assert_eq!(config.notes.len(), 29);
        assert_eq!(config.notes.get(48).unwrap().key, Some(vk::ch(b'Z')));
        assert_eq!(config.notes.get(61).unwrap().key, Some(vk::ch(b'2')));
        assert_eq!(config.notes.get(76).unwrap().key, Some(vk::ch(b'P')));
        assert!(config.pads.iter().all(RuleTable::is_empty));
        assert!(config.buttons.is_empty());
        assert!(config.knobs.is_empty());
        assert!(!config.log_midi_messages);
    }

    #[test]
    fn test_builtin_file_compiles_back() {
        let keys = keys();
        let (config, warnings) = ConfigFile::builtin(&keys).compile(&keys).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(config, builtin_router_config());
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(ConfigFormat::from_path(Path::new("config.json")), ConfigFormat::Json);
        assert_eq!(ConfigFormat::from_path(Path::new("a/b.YML")), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path(Path::new("config")), ConfigFormat::Json);
    }

    #[tokio::test]
    async fn test_missing_file_falls_back() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("absent.json");

        let config = load_or_default(&path, &keys()).await;
        assert_eq!(config, builtin_router_config());
    }

    #[tokio::test]
    async fn test_malformed_file_falls_back() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(&path, "{ \"note_inputs\": [ { \"data\": 48, ").unwrap();

        let config = load_or_default(&path, &keys()).await;
        assert_eq!(config, builtin_router_config());
    }

    #[tokio::test]
    async fn test_unknown_key_falls_back() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(&path, r#"{ "note_inputs": [ { "data": 48, "input": "nope" } ] }"#).unwrap();

        let config = load_or_default(&path, &keys()).await;
        assert_eq!(config, builtin_router_config());
    }

    #[tokio::test]
    async fn test_save_and_load() -> Result<(), ConfigError> {
        let temp_dir = TempDir::new().unwrap();
        let keys = keys();
        let file = ConfigFile::parse(SAMPLE, ConfigFormat::Json)?;

        for name in ["saved.json", "saved.yaml"] {
            let path = temp_dir.path().join(name);
            file.save(&path).await?;
            let loaded = ConfigFile::load(&path).await?;
            assert_eq!(loaded.compile(&keys)?.0, file.compile(&keys)?.0);
        }

        Ok(())
    }
}
