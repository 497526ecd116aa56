//! Automatic day/night switching.
//!
//! A small background task polls the sensor luminance and flips the sensor
//! mode and IR LEDs when it crosses the configured thresholds. Hysteresis
//! comes from having two thresholds: switching to night below
//! `night_threshold`, back to day above `day_threshold`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::config::ConfigRuntime;
use crate::platform::{DayNightMode, Hardware, IrLedMode};

/// Run the auto day/night loop until the shutdown signal fires.
pub async fn run(
    config: Arc<ConfigRuntime>,
    hardware: Arc<dyn Hardware>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut current = DayNightMode::Day;

    loop {
        let interval = config
            .get_int("auto_daynight", "check_interval")
            .unwrap_or(10)
            .max(1) as u64;

        tokio::select! {
            _ = shutdown.recv() => break,
            _ = tokio::time::sleep(Duration::from_secs(interval)) => {}
        }

        if !config.get_bool("auto_daynight", "enabled").unwrap_or(false) {
            continue;
        }

        let luminance = match hardware.vi_get_luminance().await {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!(error = %e, "luminance read failed");
                continue;
            }
        };

        let day_threshold = config
            .get_float("auto_daynight", "day_threshold")
            .unwrap_or(60.0) as f32;
        let night_threshold = config
            .get_float("auto_daynight", "night_threshold")
            .unwrap_or(20.0) as f32;

        let target = match current {
            DayNightMode::Day if luminance < night_threshold => DayNightMode::Night,
            DayNightMode::Night if luminance > day_threshold => DayNightMode::Day,
            _ => continue,
        };

        if let Err(e) = apply(hardware.as_ref(), target).await {
            tracing::warn!(error = %e, "day/night switch failed");
            continue;
        }

        tracing::info!(luminance = luminance, mode = ?target, "day/night mode switched");
        current = target;
    }
}

async fn apply(
    hardware: &dyn Hardware,
    mode: DayNightMode,
) -> Result<(), crate::platform::HardwareError> {
    hardware.vi_switch_day_night(mode).await?;
    let irled = match mode {
        DayNightMode::Day => IrLedMode::Off,
        DayNightMode::Night => IrLedMode::On,
    };
    hardware.irled_set_mode(irled).await
}
