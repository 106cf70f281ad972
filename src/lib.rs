//! midi2pico8 - play PICO-8 with a MIDI controller
//!
//! Notes, pads, buttons and knobs of a MIDI keyboard are translated into
//! synthetic key presses according to a mapping file.

pub mod config;
pub mod device;
pub mod inject;
pub mod keymap;
pub mod midi;
pub mod router;
