//! WS-Discovery: endpoint identity and the multicast responder.

mod identity;
mod ws_discovery;

pub use identity::EndpointIdentity;
pub use ws_discovery::{
    APP_MAX_DELAY_MS, DiscoveryError, HELLO_INTERVAL, WS_DISCOVERY_MULTICAST, WS_DISCOVERY_PORT,
    WsDiscovery, WsDiscoveryHandle, WsDiscoveryMessage, extract_xml_element, is_probe_message,
    serialize_message,
};
