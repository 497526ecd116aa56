//! Platform abstraction: the hardware facade and its stub implementation.

mod stubs;
mod traits;

pub use stubs::StubHardware;
pub use traits::{
    DayNightMode, Hardware, HardwareError, HwResult, IrLedMode, PtzPosition, PtzSpeed, SystemInfo,
    VpssEffect,
};

#[cfg(test)]
pub use traits::MockHardware;
