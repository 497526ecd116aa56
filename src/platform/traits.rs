//! Hardware facade trait.
//!
//! Everything the ONVIF core needs from the camera platform goes through
//! [`Hardware`]: video input lifecycle, VPSS image effects, day/night and IR
//! control, PTZ motion, and system information. Implementations wrap the
//! vendor SDK; the core never touches it directly.

use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use thiserror::Error;

/// Errors from platform operations.
#[derive(Debug, Error, Clone)]
pub enum HardwareError {
    #[error("hardware not available: {0}")]
    Unavailable(String),

    #[error("operation not supported: {0}")]
    NotSupported(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("hardware failure: {0}")]
    Failure(String),

    #[error("operation timed out")]
    Timeout,

    #[error("resource busy: {0}")]
    Busy(String),
}

/// Result type for platform operations.
pub type HwResult<T> = Result<T, HardwareError>;

/// VPSS image effect channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VpssEffect {
    Brightness,
    Contrast,
    Saturation,
    Sharpness,
    Hue,
}

/// Day/night sensor mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DayNightMode {
    #[default]
    Day,
    Night,
}

/// Infrared LED mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IrLedMode {
    Off,
    On,
    #[default]
    Auto,
}

/// PTZ pose in normalized coordinates (pan/tilt -1.0..1.0, zoom 0.0..1.0).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PtzPosition {
    pub pan: f32,
    pub tilt: f32,
    pub zoom: f32,
}

impl PtzPosition {
    pub fn new(pan: f32, tilt: f32, zoom: f32) -> Self {
        Self { pan, tilt, zoom }
    }

    /// Home pose: centered, no zoom.
    pub const HOME: PtzPosition = PtzPosition {
        pan: 0.0,
        tilt: 0.0,
        zoom: 0.0,
    };
}

/// PTZ speed / velocity vector, each axis in 0.0..1.0 (or -1.0..1.0 for
/// continuous velocities).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PtzSpeed {
    pub pan: f32,
    pub tilt: f32,
    pub zoom: f32,
}

impl PtzSpeed {
    pub fn new(pan: f32, tilt: f32, zoom: f32) -> Self {
        Self { pan, tilt, zoom }
    }

    /// Speed substituted when a move request omits one.
    pub const DEFAULT: PtzSpeed = PtzSpeed {
        pan: 0.5,
        tilt: 0.5,
        zoom: 0.0,
    };

    /// All-zero velocity.
    pub const STOP: PtzSpeed = PtzSpeed {
        pan: 0.0,
        tilt: 0.0,
        zoom: 0.0,
    };
}

/// System health counters for GetDeviceInformation-adjacent reporting.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemInfo {
    pub cpu_percent: f32,
    pub memory_total_kb: u64,
    pub memory_free_kb: u64,
    pub uptime_secs: u64,
}

/// The hardware facade consumed by the ONVIF services.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Hardware: Send + Sync {
    /// Open the video input pipeline.
    async fn vi_open(&self) -> HwResult<()>;

    /// Close the video input pipeline.
    async fn vi_close(&self) -> HwResult<()>;

    /// Apply one VPSS image effect at a platform-level intensity.
    async fn vpss_effect_set(&self, effect: VpssEffect, level: i32) -> HwResult<()>;

    /// Switch the sensor between day and night mode.
    async fn vi_switch_day_night(&self, mode: DayNightMode) -> HwResult<()>;

    /// Set image flip and mirror.
    async fn vi_set_flip_mirror(&self, flip: bool, mirror: bool) -> HwResult<()>;

    /// Current scene luminance estimate (0..255), used for auto day/night.
    async fn vi_get_luminance(&self) -> HwResult<f32>;

    /// Initialize the IR LED controller.
    async fn irled_init(&self) -> HwResult<()>;

    /// Set the IR LED mode.
    async fn irled_set_mode(&self, mode: IrLedMode) -> HwResult<()>;

    /// Read back the IR LED mode.
    async fn irled_get_status(&self) -> HwResult<IrLedMode>;

    /// Move to an absolute pose at the given speed.
    async fn ptz_absolute_move(&self, position: PtzPosition, speed: PtzSpeed) -> HwResult<()>;

    /// Move relative to the current pose at the given speed.
    async fn ptz_relative_move(&self, delta: PtzPosition, speed: PtzSpeed) -> HwResult<()>;

    /// Start moving at the given velocity until stopped.
    async fn ptz_continuous_move(&self, velocity: PtzSpeed) -> HwResult<()>;

    /// Stop all PTZ motion.
    async fn ptz_stop(&self) -> HwResult<()>;

    /// Store the current pose in a motor preset slot.
    async fn ptz_set_preset(&self, slot: u32) -> HwResult<()>;

    /// Drive to a stored motor preset slot.
    async fn ptz_goto_preset(&self, slot: u32) -> HwResult<()>;

    /// Erase a motor preset slot.
    async fn ptz_remove_preset(&self, slot: u32) -> HwResult<()>;

    /// CPU/memory/uptime counters.
    async fn get_system_info(&self) -> HwResult<SystemInfo>;

    /// Schedule a system reboot after `delay`. Returns immediately.
    async fn schedule_reboot(&self, delay: Duration) -> HwResult<()>;
}
