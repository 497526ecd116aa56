//! ONVIF Media service.

mod handlers;
mod profiles;

pub use handlers::{MediaService, OPERATIONS};
pub use profiles::{
    AUDIO_SOURCE_TOKEN, MAX_PROFILES, MediaProfile, ProfileStore, VIDEO_SOURCE_TOKEN,
    VideoEncoderConfig, encoder_token, profile_token,
};
