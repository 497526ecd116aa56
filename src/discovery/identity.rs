//! Stable WS-Discovery endpoint identity.
//!
//! The endpoint address must be the same `urn:uuid:` for the daemon's whole
//! lifetime and across restarts, even when the IP changes — only the
//! advertised XAddr varies. A v5 UUID over the hostname gives exactly that.

use uuid::Uuid;

/// Endpoint identity advertised in Hello, Bye, and ProbeMatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointIdentity {
    /// Stable `urn:uuid:...` endpoint reference.
    pub uuid: String,
    /// Current IP used in XAddrs.
    pub ip: String,
    /// HTTP port of the device service.
    pub http_port: u16,
}

impl EndpointIdentity {
    /// Derive the identity from the hostname.
    pub fn from_hostname(hostname: &str, ip: String, http_port: u16) -> Self {
        let uuid = Uuid::new_v5(&Uuid::NAMESPACE_DNS, hostname.as_bytes());
        Self {
            uuid: format!("urn:uuid:{}", uuid),
            ip,
            http_port,
        }
    }

    /// Transport address of the device service.
    pub fn xaddr(&self) -> String {
        format!("http://{}:{}/onvif/device_service", self.ip, self.http_port)
    }
}
