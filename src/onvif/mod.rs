//! ONVIF core: SOAP handling, the service dispatcher, and the four
//! Profile-S services.

pub mod capabilities;
pub mod context;
pub mod device;
pub mod dispatcher;
pub mod error;
pub mod imaging;
pub mod media;
pub mod ptz;
pub mod soap;

pub use capabilities::{CapabilityFlags, CapabilitySnapshot, ONVIF_VERSION, ServiceCapability};
pub use context::SoapContext;
pub use dispatcher::{
    DispatchContext, MAX_SERVICES, RegistryError, ServiceDispatcher, ServiceHandler,
    ServiceRegistration,
};
pub use error::{FaultCode, OnvifError, OnvifResult};
