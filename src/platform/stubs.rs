//! Stub hardware for development hosts and tests.
//!
//! Every operation succeeds and records what it was asked to do, so tests
//! can assert on the exact calls the services issued.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::traits::{
    DayNightMode, Hardware, HwResult, IrLedMode, PtzPosition, PtzSpeed, SystemInfo, VpssEffect,
};

/// Recording stub implementation of [`Hardware`].
#[derive(Default)]
pub struct StubHardware {
    /// All VPSS effect calls, in order.
    pub effect_calls: Mutex<Vec<(VpssEffect, i32)>>,
    /// Last absolute move request.
    pub last_absolute_move: Mutex<Option<(PtzPosition, PtzSpeed)>>,
    /// Last relative move request.
    pub last_relative_move: Mutex<Option<(PtzPosition, PtzSpeed)>>,
    /// Last continuous move velocity.
    pub last_continuous_move: Mutex<Option<PtzSpeed>>,
    /// Number of stop calls.
    pub stop_calls: Mutex<u32>,
    /// Preset slot calls (set/goto/remove).
    pub preset_calls: Mutex<Vec<(&'static str, u32)>>,
    /// Current day/night mode.
    pub day_night: Mutex<DayNightMode>,
    /// Current IR LED mode.
    pub irled: Mutex<IrLedMode>,
    /// Last flip/mirror setting.
    pub flip_mirror: Mutex<(bool, bool)>,
    /// Whether a reboot was scheduled.
    pub reboot_scheduled: Mutex<Option<Duration>>,
    /// Luminance value returned by `vi_get_luminance`.
    pub luminance: Mutex<f32>,
}

impl StubHardware {
    pub fn new() -> Self {
        Self {
            luminance: Mutex::new(128.0),
            ..Default::default()
        }
    }
}

#[async_trait]
impl Hardware for StubHardware {
    async fn vi_open(&self) -> HwResult<()> {
        Ok(())
    }

    async fn vi_close(&self) -> HwResult<()> {
        Ok(())
    }

    async fn vpss_effect_set(&self, effect: VpssEffect, level: i32) -> HwResult<()> {
        self.effect_calls.lock().push((effect, level));
        Ok(())
    }

    async fn vi_switch_day_night(&self, mode: DayNightMode) -> HwResult<()> {
        *self.day_night.lock() = mode;
        Ok(())
    }

    async fn vi_set_flip_mirror(&self, flip: bool, mirror: bool) -> HwResult<()> {
        *self.flip_mirror.lock() = (flip, mirror);
        Ok(())
    }

    async fn vi_get_luminance(&self) -> HwResult<f32> {
        Ok(*self.luminance.lock())
    }

    async fn irled_init(&self) -> HwResult<()> {
        Ok(())
    }

    async fn irled_set_mode(&self, mode: IrLedMode) -> HwResult<()> {
        *self.irled.lock() = mode;
        Ok(())
    }

    async fn irled_get_status(&self) -> HwResult<IrLedMode> {
        Ok(*self.irled.lock())
    }

    async fn ptz_absolute_move(&self, position: PtzPosition, speed: PtzSpeed) -> HwResult<()> {
        *self.last_absolute_move.lock() = Some((position, speed));
        Ok(())
    }

    async fn ptz_relative_move(&self, delta: PtzPosition, speed: PtzSpeed) -> HwResult<()> {
        *self.last_relative_move.lock() = Some((delta, speed));
        Ok(())
    }

    async fn ptz_continuous_move(&self, velocity: PtzSpeed) -> HwResult<()> {
        *self.last_continuous_move.lock() = Some(velocity);
        Ok(())
    }

    async fn ptz_stop(&self) -> HwResult<()> {
        *self.stop_calls.lock() += 1;
        Ok(())
    }

    async fn ptz_set_preset(&self, slot: u32) -> HwResult<()> {
        self.preset_calls.lock().push(("set", slot));
        Ok(())
    }

    async fn ptz_goto_preset(&self, slot: u32) -> HwResult<()> {
        self.preset_calls.lock().push(("goto", slot));
        Ok(())
    }

    async fn ptz_remove_preset(&self, slot: u32) -> HwResult<()> {
        self.preset_calls.lock().push(("remove", slot));
        Ok(())
    }

    async fn get_system_info(&self) -> HwResult<SystemInfo> {
        Ok(SystemInfo {
            cpu_percent: 12.5,
            memory_total_kb: 65536,
            memory_free_kb: 40960,
            uptime_secs: 3600,
        })
    }

    async fn schedule_reboot(&self, delay: Duration) -> HwResult<()> {
        *self.reboot_scheduled.lock() = Some(delay);
        Ok(())
    }
}
