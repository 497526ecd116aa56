//! Local address resolution for advertised URLs.

use std::net::UdpSocket;

use crate::config::ConfigRuntime;

/// Determine the IP address to embed in XAddrs and stream URIs.
///
/// Precedence: `network.device_ip` when set, then autodetection via the
/// UDP connect trick, then loopback.
pub fn external_ip(config: &ConfigRuntime) -> String {
    if let Ok(ip) = config.get_str("network", "device_ip")
        && !ip.is_empty()
        && ip != "0.0.0.0"
    {
        return ip;
    }

    if let Some(ip) = detect_local_ip() {
        return ip;
    }

    "127.0.0.1".to_string()
}

fn detect_local_ip() -> Option<String> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    // No packet is sent; connect() only selects the outbound interface.
    socket.connect("8.8.8.8:80").ok()?;
    let addr = socket.local_addr().ok()?;
    let ip = addr.ip().to_string();
    (ip != "0.0.0.0").then_some(ip)
}
