//! Imaging settings store.
//!
//! Holds the ONVIF-level settings (0-100 sliders, hue in degrees), maps them
//! to the platform's VPSS ranges, and forwards only the fields that changed
//! since the last applied batch. One async mutex serializes batches so a
//! concurrent read never observes a half-applied set; the skipped/forwarded
//! counters make the diffing observable to tests.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::{ConfigRuntime, PersistenceHandle};
use crate::onvif::error::{OnvifError, OnvifResult};
use crate::platform::{Hardware, VpssEffect};

/// ONVIF-level imaging settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImagingSettings {
    /// 0..=100
    pub brightness: i32,
    /// 0..=100
    pub contrast: i32,
    /// 0..=100
    pub saturation: i32,
    /// 0..=100
    pub sharpness: i32,
    /// -180..=180 degrees
    pub hue: i32,
}

impl ImagingSettings {
    /// Range check at the ONVIF level.
    pub fn validate(&self) -> OnvifResult<()> {
        for (name, value) in [
            ("Brightness", self.brightness),
            ("Contrast", self.contrast),
            ("ColorSaturation", self.saturation),
            ("Sharpness", self.sharpness),
        ] {
            if !(0..=100).contains(&value) {
                return Err(OnvifError::out_of_range(name, 0, 100));
            }
        }
        if !(-180..=180).contains(&self.hue) {
            return Err(OnvifError::out_of_range("Hue", -180, 180));
        }
        Ok(())
    }
}

/// Batch-apply counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImagingStats {
    /// Parameters forwarded to the hardware facade.
    pub forwarded: u64,
    /// Parameters skipped because they matched the last applied batch.
    pub skipped: u64,
}

struct Inner {
    current: ImagingSettings,
    last_applied: Option<ImagingSettings>,
    stats: ImagingStats,
}

/// Thread-safe imaging settings store.
pub struct ImagingStore {
    inner: Mutex<Inner>,
    config: Arc<ConfigRuntime>,
    persistence: PersistenceHandle,
}

/// Map an ONVIF slider value to the platform range.
///
/// Brightness, contrast, saturation, and sharpness halve to 0..50; hue maps
/// -180..180 degrees onto -50..50.
fn to_platform(effect: VpssEffect, value: i32) -> i32 {
    match effect {
        VpssEffect::Hue => ((value as f32) / 3.6).round() as i32,
        _ => value / 2,
    }
}

impl ImagingStore {
    /// Load initial settings from the `imaging` config section.
    pub fn new(config: Arc<ConfigRuntime>, persistence: PersistenceHandle) -> Self {
        let get = |key: &str, fallback: i64| config.get_int("imaging", key).unwrap_or(fallback);
        let current = ImagingSettings {
            brightness: get("brightness", 50) as i32,
            contrast: get("contrast", 50) as i32,
            saturation: get("saturation", 50) as i32,
            sharpness: get("sharpness", 50) as i32,
            hue: get("hue", 0) as i32,
        };

        Self {
            inner: Mutex::new(Inner {
                current,
                last_applied: None,
                stats: ImagingStats::default(),
            }),
            config,
            persistence,
        }
    }

    /// Current settings. Takes the batch lock briefly so a concurrent apply
    /// is never observed halfway.
    pub async fn get(&self) -> ImagingSettings {
        self.inner.lock().await.current
    }

    /// Apply a settings batch, forwarding only changed fields.
    pub async fn apply(
        &self,
        hardware: &dyn Hardware,
        settings: ImagingSettings,
    ) -> OnvifResult<()> {
        settings.validate()?;

        let mut inner = self.inner.lock().await;

        let fields = [
            (VpssEffect::Brightness, settings.brightness, inner.last_applied.map(|l| l.brightness)),
            (VpssEffect::Contrast, settings.contrast, inner.last_applied.map(|l| l.contrast)),
            (VpssEffect::Saturation, settings.saturation, inner.last_applied.map(|l| l.saturation)),
            (VpssEffect::Sharpness, settings.sharpness, inner.last_applied.map(|l| l.sharpness)),
            (VpssEffect::Hue, settings.hue, inner.last_applied.map(|l| l.hue)),
        ];

        for (effect, value, last) in fields {
            if last == Some(value) {
                inner.stats.skipped += 1;
                continue;
            }
            hardware
                .vpss_effect_set(effect, to_platform(effect, value))
                .await?;
            inner.stats.forwarded += 1;
        }

        inner.current = settings;
        inner.last_applied = Some(settings);
        drop(inner);

        let set = |key: &str, value: i32| {
            let _ = self.config.set_int("imaging", key, value as i64);
        };
        set("brightness", settings.brightness);
        set("contrast", settings.contrast);
        set("saturation", settings.saturation);
        set("sharpness", settings.sharpness);
        set("hue", settings.hue);
        self.persistence.mark_dirty("imaging", "brightness");

        Ok(())
    }

    /// Forwarded/skipped counters.
    pub async fn stats(&self) -> ImagingStats {
        self.inner.lock().await.stats
    }
}
