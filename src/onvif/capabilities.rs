//! Service capability metadata.
//!
//! Each registered service publishes a declarative [`ServiceCapability`];
//! the dispatcher snapshots these per dispatch so the Device service can
//! aggregate `GetCapabilities`/`GetServices` without reaching back into the
//! registry.

/// ONVIF version advertised by all services.
pub const ONVIF_VERSION: ServiceVersion = ServiceVersion { major: 2, minor: 5 };

/// WSDL version pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceVersion {
    pub major: u8,
    pub minor: u8,
}

/// Capability category flags, one per ONVIF service family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapabilityFlags {
    pub analytics: bool,
    pub device: bool,
    pub events: bool,
    pub imaging: bool,
    pub media: bool,
    pub ptz: bool,
}

/// Declarative capability record for one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceCapability {
    /// Registry name, lowercase.
    pub service_name: &'static str,
    /// WSDL namespace URI.
    pub namespace: &'static str,
    /// Path component of the service XAddr.
    pub xaddr_path: &'static str,
    /// Advertised version.
    pub version: ServiceVersion,
    /// Category flags for GetCapabilities aggregation.
    pub flags: CapabilityFlags,
}

impl ServiceCapability {
    /// Full XAddr for a given base URL (`http://ip:port`).
    pub fn xaddr(&self, base_url: &str) -> String {
        format!("{}{}", base_url, self.xaddr_path)
    }
}

/// Immutable registry snapshot handed to handlers with each dispatch.
#[derive(Debug, Clone, Default)]
pub struct CapabilitySnapshot {
    pub services: Vec<ServiceCapability>,
}

impl CapabilitySnapshot {
    /// Find a service's capability record by registry name.
    pub fn service(&self, name: &str) -> Option<&ServiceCapability> {
        self.services.iter().find(|s| s.service_name == name)
    }

    /// Union of all category flags across registered services.
    pub fn aggregate_flags(&self) -> CapabilityFlags {
        let mut flags = CapabilityFlags::default();
        for s in &self.services {
            flags.analytics |= s.flags.analytics;
            flags.device |= s.flags.device;
            flags.events |= s.flags.events;
            flags.imaging |= s.flags.imaging;
            flags.media |= s.flags.media;
            flags.ptz |= s.flags.ptz;
        }
        flags
    }
}
