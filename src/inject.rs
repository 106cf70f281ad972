//! Synthetic keyboard delivery
//!
//! [`KeySink`] is the seam between the keymap and whatever actually types the
//! keys. On Windows, [`SendInputSink`] injects them with `SendInput`; the
//! [`LogSink`] only logs (dry runs, other platforms) and [`RecordingSink`]
//! keeps them in memory.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

use crate::keymap::KeyId;

/// One key-down or key-up submitted to the OS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyAction {
    pub virtual_key: KeyId,
    pub scan_code: u16,
    pub extended: bool,
    pub key_up: bool,
}

/// Receiver of key actions
///
/// Implementations must not block; failures are not reported back to the router.
pub trait KeySink: Send + Sync {
    fn send(&self, action: KeyAction);
}

/// Logs actions instead of injecting them
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl KeySink for LogSink {
    fn send(&self, action: KeyAction) {
        debug!(
            vk = action.virtual_key.0,
            scan = action.scan_code,
            extended = action.extended,
            "dry run: key {}",
            if action.key_up { "up" } else { "down" }
        );
    }
}

/// Keeps every action in memory, in submission order
#[derive(Debug, Default)]
pub struct RecordingSink {
    actions: Mutex<Vec<KeyAction>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded actions
    pub fn actions(&self) -> Vec<KeyAction> {
        self.actions.lock().clone()
    }

    /// Drain the recorded actions
    pub fn take(&self) -> Vec<KeyAction> {
        std::mem::take(&mut *self.actions.lock())
    }
}

impl KeySink for RecordingSink {
    fn send(&self, action: KeyAction) {
        self.actions.lock().push(action);
    }
}

/// Injects keystrokes through `SendInput`
#[cfg(windows)]
#[derive(Debug, Default, Clone, Copy)]
pub struct SendInputSink;

#[cfg(windows)]
impl KeySink for SendInputSink {
    fn send(&self, action: KeyAction) {
        use windows::Win32::UI::Input::KeyboardAndMouse::{
            SendInput, INPUT, INPUT_0, INPUT_KEYBOARD, KEYBDINPUT, KEYBD_EVENT_FLAGS,
            KEYEVENTF_EXTENDEDKEY, KEYEVENTF_KEYUP, VIRTUAL_KEY,
        };
        use windows::Win32::UI::WindowsAndMessaging::GetMessageExtraInfo;

        let mut flags = KEYBD_EVENT_FLAGS(0);
        let mut scan = action.scan_code;
        if action.extended {
            flags |= KEYEVENTF_EXTENDEDKEY;
            scan |= 0xE000;
        }
        if action.key_up {
            flags |= KEYEVENTF_KEYUP;
        }

        // SAFETY: plain Win32 calls on a fully initialized INPUT value.
        let sent = unsafe {
            let input = INPUT {
                r#type: INPUT_KEYBOARD,
                Anonymous: INPUT_0 {
                    ki: KEYBDINPUT {
                        wVk: VIRTUAL_KEY(action.virtual_key.0),
                        wScan: scan,
                        dwFlags: flags,
                        time: 0,
                        dwExtraInfo: GetMessageExtraInfo().0 as usize,
                    },
                },
            };
            SendInput(&[input], std::mem::size_of::<INPUT>() as i32)
        };

        if sent != 1 {
            debug!("SendInput rejected {:?}", action);
        }
    }
}

/// Sink for this platform: real injection on Windows unless `dry_run`
pub fn platform_sink(dry_run: bool) -> Arc<dyn KeySink> {
    #[cfg(windows)]
    {
        if !dry_run {
            return Arc::new(SendInputSink);
        }
    }
    #[cfg(not(windows))]
    {
        if !dry_run {
            tracing::warn!("Key injection is only available on Windows, running as a dry run");
        }
    }
    Arc::new(LogSink)
}
