//! PTZ position, preset, and movement state.
//!
//! Tracks the last commanded pose, the home pose, the preset table, and the
//! continuous-move watchdog handle. Hardware calls stay in the handlers;
//! this state is pure bookkeeping.

use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::onvif::error::{OnvifError, OnvifResult};
use crate::platform::PtzPosition;

/// Preset table capacity.
pub const MAX_PRESETS: usize = 16;

/// A stored preset.
#[derive(Debug, Clone, PartialEq)]
pub struct Preset {
    pub token: String,
    pub name: String,
    pub position: PtzPosition,
    /// Hardware preset slot backing this token.
    pub slot: u32,
}

/// Shared PTZ state.
pub struct PtzState {
    position: Mutex<PtzPosition>,
    home: Mutex<PtzPosition>,
    moving: Mutex<bool>,
    presets: Mutex<Vec<Preset>>,
    preset_counter: AtomicU32,
    watchdog: Mutex<Option<JoinHandle<()>>>,
}

impl PtzState {
    pub fn new() -> Self {
        Self {
            position: Mutex::new(PtzPosition::HOME),
            home: Mutex::new(PtzPosition::HOME),
            moving: Mutex::new(false),
            presets: Mutex::new(Vec::new()),
            preset_counter: AtomicU32::new(0),
            watchdog: Mutex::new(None),
        }
    }

    pub fn position(&self) -> PtzPosition {
        *self.position.lock()
    }

    pub fn set_position(&self, position: PtzPosition) {
        *self.position.lock() = position;
    }

    pub fn home_position(&self) -> PtzPosition {
        *self.home.lock()
    }

    pub fn set_home_position(&self, position: PtzPosition) {
        *self.home.lock() = position;
    }

    pub fn is_moving(&self) -> bool {
        *self.moving.lock()
    }

    pub fn set_moving(&self, moving: bool) {
        *self.moving.lock() = moving;
    }

    /// Presets in creation order.
    pub fn presets(&self) -> Vec<Preset> {
        self.presets.lock().clone()
    }

    /// Look up a preset by token.
    pub fn preset(&self, token: &str) -> Option<Preset> {
        self.presets.lock().iter().find(|p| p.token == token).cloned()
    }

    /// Store a preset. A known token overwrites in place; no token allocates
    /// a fresh one. Returns the stored preset.
    pub fn set_preset(
        &self,
        token: Option<&str>,
        name: Option<&str>,
        position: PtzPosition,
    ) -> OnvifResult<Preset> {
        let mut presets = self.presets.lock();

        if let Some(token) = token {
            let Some(existing) = presets.iter_mut().find(|p| p.token == token) else {
                return Err(OnvifError::NotFound(format!("preset '{}'", token)));
            };
            if let Some(name) = name {
                existing.name = name.to_string();
            }
            existing.position = position;
            return Ok(existing.clone());
        }

        if presets.len() >= MAX_PRESETS {
            return Err(OnvifError::invalid_arg(
                "TooManyPresets",
                format!("maximum number of presets ({}) reached", MAX_PRESETS),
            ));
        }

        let slot = self.preset_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let token = format!("Preset{}", slot);
        let preset = Preset {
            name: name
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| token.clone()),
            token,
            position,
            slot,
        };
        presets.push(preset.clone());
        Ok(preset)
    }

    /// Remove a preset by token.
    pub fn remove_preset(&self, token: &str) -> OnvifResult<Preset> {
        let mut presets = self.presets.lock();
        let index = presets
            .iter()
            .position(|p| p.token == token)
            .ok_or_else(|| OnvifError::NotFound(format!("preset '{}'", token)))?;
        Ok(presets.remove(index))
    }

    /// Install a continuous-move watchdog, aborting any previous one.
    pub fn install_watchdog(&self, handle: JoinHandle<()>) {
        if let Some(previous) = self.watchdog.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Abort the watchdog, if any. Called by Stop and at shutdown.
    pub fn clear_watchdog(&self) {
        if let Some(handle) = self.watchdog.lock().take() {
            handle.abort();
        }
    }
}

impl Default for PtzState {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PtzState {
    fn drop(&mut self) {
        self.clear_watchdog();
    }
}
