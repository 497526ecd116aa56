//! ONVIF PTZ service.

mod handlers;
mod state;

pub use handlers::{OPERATIONS, PtzService};
pub use state::{MAX_PRESETS, Preset, PtzState};
