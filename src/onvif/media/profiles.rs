//! Media profile storage over the four `stream_profile_N` config slots.
//!
//! Tokens are positional (`Profile1`..`Profile4`, encoders
//! `VideoEncoder1`..`VideoEncoder4`). A slot whose config section is enabled
//! holds a live profile; the built-in main/sub streams are marked fixed and
//! cannot be deleted. CreateProfile claims the first disabled slot.

use std::sync::Arc;

use crate::config::{ConfigRuntime, PersistenceHandle};
use crate::onvif::error::{OnvifError, OnvifResult};

/// Hard upper bound on profiles (matches the config slots).
pub const MAX_PROFILES: usize = 4;

/// Token of the single video source every profile references.
pub const VIDEO_SOURCE_TOKEN: &str = "VideoSource0";

/// Token of the single audio source.
pub const AUDIO_SOURCE_TOKEN: &str = "AudioSource0";

/// Video encoder settings for one profile slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoEncoderConfig {
    pub token: String,
    pub name: String,
    pub encoding: String,
    pub width: i64,
    pub height: i64,
    pub framerate: i64,
    pub bitrate: i64,
    pub gop: i64,
    pub quality: i64,
}

/// A live media profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaProfile {
    pub token: String,
    pub name: String,
    pub fixed: bool,
    pub slot: usize,
    pub encoder: VideoEncoderConfig,
}

/// Config-backed profile table.
pub struct ProfileStore {
    config: Arc<ConfigRuntime>,
    persistence: PersistenceHandle,
}

fn section(slot: usize) -> String {
    format!("stream_profile_{}", slot)
}

/// Profile token for a slot.
pub fn profile_token(slot: usize) -> String {
    format!("Profile{}", slot)
}

/// Encoder token for a slot.
pub fn encoder_token(slot: usize) -> String {
    format!("VideoEncoder{}", slot)
}

fn slot_of_profile(token: &str) -> Option<usize> {
    token
        .strip_prefix("Profile")
        .and_then(|n| n.parse::<usize>().ok())
        .filter(|n| (1..=MAX_PROFILES).contains(n))
}

fn slot_of_encoder(token: &str) -> Option<usize> {
    token
        .strip_prefix("VideoEncoder")
        .and_then(|n| n.parse::<usize>().ok())
        .filter(|n| (1..=MAX_PROFILES).contains(n))
}

impl ProfileStore {
    pub fn new(config: Arc<ConfigRuntime>, persistence: PersistenceHandle) -> Self {
        Self {
            config,
            persistence,
        }
    }

    fn read_slot(&self, slot: usize) -> Option<MediaProfile> {
        let section = section(slot);
        if !self.config.get_bool(&section, "enabled").unwrap_or(false) {
            return None;
        }

        let name = self.config.get_str(&section, "name").unwrap_or_default();
        Some(MediaProfile {
            token: profile_token(slot),
            name: if name.is_empty() {
                profile_token(slot)
            } else {
                name.clone()
            },
            fixed: self.config.get_bool(&section, "fixed").unwrap_or(false),
            slot,
            encoder: VideoEncoderConfig {
                token: encoder_token(slot),
                name: if name.is_empty() {
                    encoder_token(slot)
                } else {
                    name
                },
                encoding: self
                    .config
                    .get_str(&section, "encoding")
                    .unwrap_or_else(|_| "H264".to_string()),
                width: self.config.get_int(&section, "width").unwrap_or(1920),
                height: self.config.get_int(&section, "height").unwrap_or(1080),
                framerate: self.config.get_int(&section, "framerate").unwrap_or(25),
                bitrate: self.config.get_int(&section, "bitrate").unwrap_or(2048),
                gop: self.config.get_int(&section, "gop").unwrap_or(50),
                quality: self.config.get_int(&section, "quality").unwrap_or(70),
            },
        })
    }

    /// All live profiles in slot order.
    pub fn list(&self) -> Vec<MediaProfile> {
        (1..=MAX_PROFILES)
            .filter_map(|slot| self.read_slot(slot))
            .collect()
    }

    /// Look up a profile by token.
    pub fn get(&self, token: &str) -> Option<MediaProfile> {
        slot_of_profile(token).and_then(|slot| self.read_slot(slot))
    }

    /// Claim the first free slot for a new profile.
    pub fn create(&self, name: &str, requested_token: Option<&str>) -> OnvifResult<MediaProfile> {
        if let Some(token) = requested_token
            && self.get(token).is_some()
        {
            return Err(OnvifError::invalid_arg(
                "ProfileExists",
                format!("profile '{}' already exists", token),
            ));
        }

        let free_slot = (1..=MAX_PROFILES)
            .find(|&slot| self.read_slot(slot).is_none())
            .ok_or_else(|| {
                OnvifError::invalid_arg(
                    "MaxNVTProfiles",
                    format!("maximum number of profiles ({}) reached", MAX_PROFILES),
                )
            })?;

        let sec = section(free_slot);
        self.config.set_bool(&sec, "enabled", true)?;
        self.config.set_bool(&sec, "fixed", false)?;
        self.config.set_str(&sec, "name", name)?;
        self.persistence.mark_dirty(&sec, "enabled");

        self.read_slot(free_slot)
            .ok_or_else(|| OnvifError::Internal("profile slot vanished after enable".to_string()))
    }

    /// Delete a non-fixed profile, freeing its slot.
    pub fn delete(&self, token: &str) -> OnvifResult<()> {
        let profile = self
            .get(token)
            .ok_or_else(|| OnvifError::NotFound(format!("profile '{}'", token)))?;

        if profile.fixed {
            return Err(OnvifError::invalid_arg(
                "DeletionOfFixedProfile",
                format!("profile '{}' is fixed and cannot be deleted", token),
            ));
        }

        let sec = section(profile.slot);
        self.config.reset_section(&sec);
        self.persistence.mark_dirty(&sec, "enabled");
        Ok(())
    }

    /// All live encoder configurations.
    pub fn encoders(&self) -> Vec<VideoEncoderConfig> {
        self.list().into_iter().map(|p| p.encoder).collect()
    }

    /// Encoder configuration by token.
    pub fn encoder(&self, token: &str) -> Option<VideoEncoderConfig> {
        slot_of_encoder(token)
            .and_then(|slot| self.read_slot(slot))
            .map(|p| p.encoder)
    }

    /// Apply a validated encoder configuration, returning the profile token
    /// whose stream URIs must be invalidated.
    pub fn set_encoder(&self, cfg: &VideoEncoderConfig) -> OnvifResult<String> {
        let slot = slot_of_encoder(&cfg.token).ok_or_else(|| {
            OnvifError::NotFound(format!("video encoder configuration '{}'", cfg.token))
        })?;
        if self.read_slot(slot).is_none() {
            return Err(OnvifError::NotFound(format!(
                "video encoder configuration '{}'",
                cfg.token
            )));
        }

        let sec = section(slot);
        self.config.set_str(&sec, "encoding", &cfg.encoding)?;
        self.config.set_int(&sec, "width", cfg.width)?;
        self.config.set_int(&sec, "height", cfg.height)?;
        self.config.set_int(&sec, "framerate", cfg.framerate)?;
        self.config.set_int(&sec, "bitrate", cfg.bitrate)?;
        self.config.set_int(&sec, "gop", cfg.gop)?;
        self.config.set_int(&sec, "quality", cfg.quality)?;
        self.persistence.mark_dirty(&sec, "width");

        Ok(profile_token(slot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ProfileStore {
        ProfileStore::new(
            Arc::new(ConfigRuntime::with_defaults()),
            PersistenceHandle::disconnected(),
        )
    }

    #[test]
    fn test_builtin_profiles() {
        let store = store();
        let profiles = store.list();
        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles[0].token, "Profile1");
        assert!(profiles[0].fixed);
        assert_eq!(profiles[0].name, "MainStream");
        assert_eq!(profiles[1].name, "SubStream");
    }

    #[test]
    fn test_create_uses_free_slot() {
        let store = store();
        let created = store.create("Recording", None).unwrap();
        assert_eq!(created.token, "Profile3");
        assert!(!created.fixed);
        assert_eq!(store.list().len(), 3);
    }

    #[test]
    fn test_create_over_limit_mentions_maximum() {
        let store = store();
        store.create("A", None).unwrap();
        store.create("B", None).unwrap();

        let err = store.create("C", None).unwrap_err();
        let fault = err.to_soap_fault();
        assert!(fault.to_lowercase().contains("maximum"));
    }

    #[test]
    fn test_delete_fixed_profile_fails() {
        let store = store();
        let err = store.delete("Profile1").unwrap_err();
        assert!(matches!(err, OnvifError::InvalidArg { .. }));
    }

    #[test]
    fn test_create_delete_round_trip() {
        let store = store();
        let created = store.create("Temp", None).unwrap();
        store.delete(&created.token).unwrap();
        assert!(store.get(&created.token).is_none());
        assert_eq!(store.list().len(), 2);
    }

    #[test]
    fn test_delete_unknown_profile() {
        let store = store();
        assert!(matches!(
            store.delete("Profile9").unwrap_err(),
            OnvifError::NotFound(_)
        ));
    }

    #[test]
    fn test_encoder_lookup_and_update() {
        let store = store();
        let mut encoder = store.encoder("VideoEncoder1").unwrap();
        assert_eq!(encoder.width, 1920);

        encoder.width = 1280;
        encoder.height = 720;
        let invalidated = store.set_encoder(&encoder).unwrap();
        assert_eq!(invalidated, "Profile1");
        assert_eq!(store.encoder("VideoEncoder1").unwrap().width, 1280);
    }

    #[test]
    fn test_set_encoder_unknown_token() {
        let store = store();
        let cfg = VideoEncoderConfig {
            token: "VideoEncoder3".to_string(),
            name: "x".to_string(),
            encoding: "H264".to_string(),
            width: 640,
            height: 360,
            framerate: 15,
            bitrate: 512,
            gop: 50,
            quality: 70,
        };
        // Slot 3 is not enabled, so its encoder does not exist yet.
        assert!(matches!(
            store.set_encoder(&cfg).unwrap_err(),
            OnvifError::NotFound(_)
        ));
    }
}
