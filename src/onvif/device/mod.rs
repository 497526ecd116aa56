//! ONVIF Device service.

mod handlers;

pub use handlers::{DeviceService, OPERATIONS};
