//! WS-Discovery responder.
//!
//! One long-lived task bound to UDP 3702, joined to 239.255.255.250. It
//! broadcasts Hello on startup and every 300 seconds, answers Probe with a
//! unicast ProbeMatch after the OASIS-mandated random application delay,
//! and sends
//! Bye at shutdown. Socket errors are logged and retried; a failed
//! multicast join degrades to answering unicast probes only. The discovery
//! mode is read live from configuration, so SetDiscoveryMode takes effect
//! without restarting the task.
//!
//! Message templates follow the 2005/04 WS-Discovery namespace, which is
//! what ONVIF clients actually speak.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use rand::Rng;
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::ConfigRuntime;

use super::identity::EndpointIdentity;

/// WS-Discovery multicast group.
pub const WS_DISCOVERY_MULTICAST: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);

/// WS-Discovery port (IANA registered).
pub const WS_DISCOVERY_PORT: u16 = 3702;

/// Upper bound of the random application-level transmission delay.
pub const APP_MAX_DELAY_MS: u64 = 500;

/// Interval between periodic Hello announcements.
pub const HELLO_INTERVAL: Duration = Duration::from_secs(300);

/// Maximum accepted datagram size.
const MAX_MESSAGE_SIZE: usize = 4096;

/// Retry delay after a socket error.
const SOCKET_RETRY_DELAY: Duration = Duration::from_secs(1);

const WSD_NS: &str = "http://schemas.xmlsoap.org/ws/2005/04/discovery";
const WSA_NS: &str = "http://schemas.xmlsoap.org/ws/2004/08/addressing";
const SOAP_NS: &str = "http://www.w3.org/2003/05/soap-envelope";
const ONVIF_NW_NS: &str = "http://www.onvif.org/ver10/network/wsdl";
const WSD_MULTICAST_TO: &str = "urn:schemas-xmlsoap-org:ws:2005:04:discovery";
const WSA_ANONYMOUS: &str = "http://schemas.xmlsoap.org/ws/2004/08/addressing/role/anonymous";

/// Type advertised for a network video transmitter.
const ONVIF_NVT_TYPE: &str = "tdn:NetworkVideoTransmitter";

/// Discovery failures.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("socket error: {0}")]
    Socket(#[from] std::io::Error),

    #[error("discovery service already running")]
    AlreadyRunning,
}

/// Outgoing announcement payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum WsDiscoveryMessage {
    Hello {
        message_id: String,
        endpoint: String,
        scopes: String,
        xaddrs: String,
        message_number: u32,
        instance_id: u32,
    },
    Bye {
        message_id: String,
        endpoint: String,
        message_number: u32,
        instance_id: u32,
    },
    ProbeMatch {
        message_id: String,
        relates_to: String,
        endpoint: String,
        scopes: String,
        xaddrs: String,
        message_number: u32,
        instance_id: u32,
    },
}

/// Serialize an announcement to SOAP-over-UDP XML.
pub fn serialize_message(message: &WsDiscoveryMessage) -> String {
    match message {
        WsDiscoveryMessage::Hello {
            message_id,
            endpoint,
            scopes,
            xaddrs,
            message_number,
            instance_id,
        } => format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="{SOAP_NS}" xmlns:a="{WSA_NS}" xmlns:d="{WSD_NS}" xmlns:tdn="{ONVIF_NW_NS}">
  <s:Header>
    <a:Action>{WSD_NS}/Hello</a:Action>
    <a:MessageID>{message_id}</a:MessageID>
    <a:To>{WSD_MULTICAST_TO}</a:To>
    <d:AppSequence InstanceId="{instance_id}" MessageNumber="{message_number}"/>
  </s:Header>
  <s:Body>
    <d:Hello>
      <a:EndpointReference><a:Address>{endpoint}</a:Address></a:EndpointReference>
      <d:Types>{ONVIF_NVT_TYPE}</d:Types>
      <d:Scopes>{scopes}</d:Scopes>
      <d:XAddrs>{xaddrs}</d:XAddrs>
      <d:MetadataVersion>1</d:MetadataVersion>
    </d:Hello>
  </s:Body>
</s:Envelope>"#
        ),
        WsDiscoveryMessage::Bye {
            message_id,
            endpoint,
            message_number,
            instance_id,
        } => format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="{SOAP_NS}" xmlns:a="{WSA_NS}" xmlns:d="{WSD_NS}">
  <s:Header>
    <a:Action>{WSD_NS}/Bye</a:Action>
    <a:MessageID>{message_id}</a:MessageID>
    <a:To>{WSD_MULTICAST_TO}</a:To>
    <d:AppSequence InstanceId="{instance_id}" MessageNumber="{message_number}"/>
  </s:Header>
  <s:Body>
    <d:Bye>
      <a:EndpointReference><a:Address>{endpoint}</a:Address></a:EndpointReference>
    </d:Bye>
  </s:Body>
</s:Envelope>"#
        ),
        WsDiscoveryMessage::ProbeMatch {
            message_id,
            relates_to,
            endpoint,
            scopes,
            xaddrs,
            message_number,
            instance_id,
        } => format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="{SOAP_NS}" xmlns:a="{WSA_NS}" xmlns:d="{WSD_NS}" xmlns:tdn="{ONVIF_NW_NS}">
  <s:Header>
    <a:Action>{WSD_NS}/ProbeMatches</a:Action>
    <a:MessageID>{message_id}</a:MessageID>
    <a:RelatesTo>{relates_to}</a:RelatesTo>
    <a:To>{WSA_ANONYMOUS}</a:To>
    <d:AppSequence InstanceId="{instance_id}" MessageNumber="{message_number}"/>
  </s:Header>
  <s:Body>
    <d:ProbeMatches>
      <d:ProbeMatch>
        <a:EndpointReference><a:Address>{endpoint}</a:Address></a:EndpointReference>
        <d:Types>{ONVIF_NVT_TYPE}</d:Types>
        <d:Scopes>{scopes}</d:Scopes>
        <d:XAddrs>{xaddrs}</d:XAddrs>
        <d:MetadataVersion>1</d:MetadataVersion>
      </d:ProbeMatch>
    </d:ProbeMatches>
  </s:Body>
</s:Envelope>"#
        ),
    }
}

/// Whether a datagram carries a WS-Discovery Probe.
pub fn is_probe_message(data: &[u8]) -> bool {
    let Ok(text) = std::str::from_utf8(data) else {
        return false;
    };
    text.contains("Probe")
        && (text.contains(WSD_NS) || text.contains("ws-dd/ns/discovery"))
        && !text.contains("ProbeMatches")
}

/// Pull one element's text out of a raw datagram without a full parse.
pub fn extract_xml_element(text: &str, name: &str) -> Option<String> {
    let open = format!("{}>", name);
    let start = text.find(&open)? + open.len();
    let rest = &text[start..];
    let end = rest.find("</")?;
    Some(rest[..end].trim().to_string())
}

/// Build the advertised scope list from configuration.
fn scopes_string(config: &ConfigRuntime) -> String {
    let name = config.get_str("onvif", "scope_name").unwrap_or_default();
    let location = config.get_str("onvif", "scope_location").unwrap_or_default();
    format!(
        "onvif://www.onvif.org/type/video_encoder \
         onvif://www.onvif.org/type/ptz \
         onvif://www.onvif.org/Profile/Streaming \
         onvif://www.onvif.org/name/{} \
         onvif://www.onvif.org/location/{}",
        name, location
    )
}

fn discoverable(config: &ConfigRuntime) -> bool {
    config
        .get_str("onvif", "discovery_mode")
        .map(|m| m != "NonDiscoverable")
        .unwrap_or(true)
}

/// Create the discovery socket: reuse-addr, bound to the discovery port,
/// joined to the multicast group when the network allows it.
fn create_discovery_socket(port: u16) -> Result<UdpSocket, DiscoveryError> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port).into())?;

    if let Err(e) = socket.join_multicast_v4(&WS_DISCOVERY_MULTICAST, &Ipv4Addr::UNSPECIFIED) {
        // Common in containers without multicast routing. Unicast probes
        // are still answered.
        tracing::warn!(error = %e, "multicast join failed, continuing unicast-only");
    }

    socket.set_nonblocking(true)?;
    Ok(UdpSocket::from_std(socket.into())?)
}

/// Control handle for a running responder.
#[derive(Clone)]
pub struct WsDiscoveryHandle {
    socket: Arc<UdpSocket>,
    identity: EndpointIdentity,
    config: Arc<ConfigRuntime>,
    running: Arc<AtomicBool>,
    message_number: Arc<AtomicU32>,
    instance_id: u32,
}

impl WsDiscoveryHandle {
    /// Announce departure and stop the responder loop.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        if discoverable(&self.config) {
            let bye = WsDiscoveryMessage::Bye {
                message_id: format!("urn:uuid:{}", Uuid::new_v4()),
                endpoint: self.identity.uuid.clone(),
                message_number: self.message_number.fetch_add(1, Ordering::SeqCst) + 1,
                instance_id: self.instance_id,
            };
            let target = SocketAddrV4::new(WS_DISCOVERY_MULTICAST, WS_DISCOVERY_PORT);
            if let Err(e) = self
                .socket
                .send_to(serialize_message(&bye).as_bytes(), target)
                .await
            {
                tracing::warn!(error = %e, "failed to send Bye");
            } else {
                tracing::info!(endpoint = %self.identity.uuid, "WS-Discovery Bye sent");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// The WS-Discovery responder.
pub struct WsDiscovery {
    identity: EndpointIdentity,
    config: Arc<ConfigRuntime>,
    port: u16,
}

impl WsDiscovery {
    pub fn new(identity: EndpointIdentity, config: Arc<ConfigRuntime>) -> Self {
        Self {
            identity,
            config,
            port: WS_DISCOVERY_PORT,
        }
    }

    /// Bind to a different port (tests).
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Start the responder task. Returns a control handle and the task.
    pub async fn run(self) -> Result<(WsDiscoveryHandle, JoinHandle<()>), DiscoveryError> {
        let socket = Arc::new(create_discovery_socket(self.port)?);
        let running = Arc::new(AtomicBool::new(true));
        let message_number = Arc::new(AtomicU32::new(0));

        // Instance id must grow across restarts (application sequencing).
        let instance_id = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(1);

        let handle = WsDiscoveryHandle {
            socket: Arc::clone(&socket),
            identity: self.identity.clone(),
            config: Arc::clone(&self.config),
            running: Arc::clone(&running),
            message_number: Arc::clone(&message_number),
            instance_id,
        };

        let responder = Responder {
            socket,
            identity: self.identity,
            config: self.config,
            running,
            message_number,
            instance_id,
        };

        let task = tokio::spawn(responder.serve());
        Ok((handle, task))
    }
}

struct Responder {
    socket: Arc<UdpSocket>,
    identity: EndpointIdentity,
    config: Arc<ConfigRuntime>,
    running: Arc<AtomicBool>,
    message_number: Arc<AtomicU32>,
    instance_id: u32,
}

impl Responder {
    fn next_message_number(&self) -> u32 {
        self.message_number.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn serve(self) {
        tracing::info!(
            endpoint = %self.identity.uuid,
            xaddrs = %self.identity.xaddr(),
            "WS-Discovery responder started"
        );

        self.send_hello().await;

        let mut buf = [0u8; MAX_MESSAGE_SIZE];
        let mut last_hello = tokio::time::Instant::now();
        let mut tick = tokio::time::interval(Duration::from_secs(1));

        while self.running.load(Ordering::SeqCst) {
            tokio::select! {
                received = self.socket.recv_from(&mut buf) => {
                    match received {
                        Ok((len, src)) => self.handle_datagram(&buf[..len], src).await,
                        Err(e) => {
                            if self.running.load(Ordering::SeqCst) {
                                tracing::warn!(error = %e, "discovery receive error");
                                tokio::time::sleep(SOCKET_RETRY_DELAY).await;
                            }
                        }
                    }
                }
                _ = tick.tick() => {
                    if last_hello.elapsed() >= HELLO_INTERVAL {
                        self.send_hello().await;
                        last_hello = tokio::time::Instant::now();
                    }
                }
            }
        }

        tracing::info!("WS-Discovery responder stopped");
    }

    async fn send_hello(&self) {
        if !discoverable(&self.config) {
            return;
        }

        let hello = WsDiscoveryMessage::Hello {
            message_id: format!("urn:uuid:{}", Uuid::new_v4()),
            endpoint: self.identity.uuid.clone(),
            scopes: scopes_string(&self.config),
            xaddrs: self.identity.xaddr(),
            message_number: self.next_message_number(),
            instance_id: self.instance_id,
        };

        apply_transmission_delay().await;

        let target = SocketAddrV4::new(WS_DISCOVERY_MULTICAST, WS_DISCOVERY_PORT);
        match self
            .socket
            .send_to(serialize_message(&hello).as_bytes(), target)
            .await
        {
            Ok(_) => tracing::debug!(endpoint = %self.identity.uuid, "Hello announced"),
            Err(e) => tracing::warn!(error = %e, "failed to send Hello"),
        }
    }

    async fn handle_datagram(&self, data: &[u8], src: SocketAddr) {
        if !discoverable(&self.config) {
            return;
        }
        if !is_probe_message(data) {
            return;
        }

        let text = String::from_utf8_lossy(data);
        let relates_to = extract_xml_element(&text, "MessageID")
            .unwrap_or_else(|| format!("urn:uuid:{}", Uuid::new_v4()));

        tracing::info!(src = %src, "WS-Discovery Probe received");

        let probe_match = WsDiscoveryMessage::ProbeMatch {
            message_id: format!("urn:uuid:{}", Uuid::new_v4()),
            relates_to,
            endpoint: self.identity.uuid.clone(),
            scopes: scopes_string(&self.config),
            xaddrs: self.identity.xaddr(),
            message_number: self.next_message_number(),
            instance_id: self.instance_id,
        };

        apply_transmission_delay().await;

        if let Err(e) = self
            .socket
            .send_to(serialize_message(&probe_match).as_bytes(), src)
            .await
        {
            tracing::warn!(error = %e, src = %src, "failed to send ProbeMatch");
        }
    }
}

/// Random 0..APP_MAX_DELAY wait before announcements, to avoid storms when
/// many devices answer the same probe.
async fn apply_transmission_delay() {
    let delay_ms = rand::rng().random_range(0..=APP_MAX_DELAY_MS);
    if delay_ms > 0 {
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> EndpointIdentity {
        EndpointIdentity::from_hostname("test-cam", "192.168.1.20".to_string(), 8080)
    }

    #[test]
    fn test_hello_serialization() {
        let xml = serialize_message(&WsDiscoveryMessage::Hello {
            message_id: "urn:uuid:m1".to_string(),
            endpoint: identity().uuid,
            scopes: "onvif://www.onvif.org/type/video_encoder".to_string(),
            xaddrs: identity().xaddr(),
            message_number: 1,
            instance_id: 7,
        });

        assert!(xml.contains("<d:Hello>"));
        assert!(xml.contains(&identity().uuid));
        assert!(xml.contains("http://192.168.1.20:8080/onvif/device_service"));
        assert!(xml.contains("InstanceId=\"7\""));
        assert!(xml.contains(ONVIF_NVT_TYPE));
    }

    #[test]
    fn test_probe_match_relates_to() {
        let xml = serialize_message(&WsDiscoveryMessage::ProbeMatch {
            message_id: "urn:uuid:m2".to_string(),
            relates_to: "urn:uuid:probe-1".to_string(),
            endpoint: identity().uuid,
            scopes: String::new(),
            xaddrs: identity().xaddr(),
            message_number: 2,
            instance_id: 7,
        });

        assert!(xml.contains("<a:RelatesTo>urn:uuid:probe-1</a:RelatesTo>"));
        assert!(xml.contains("<d:ProbeMatches>"));
        assert!(xml.contains(WSA_ANONYMOUS));
    }

    #[test]
    fn test_bye_serialization() {
        let xml = serialize_message(&WsDiscoveryMessage::Bye {
            message_id: "urn:uuid:m3".to_string(),
            endpoint: identity().uuid,
            message_number: 3,
            instance_id: 7,
        });
        assert!(xml.contains("<d:Bye>"));
        assert!(xml.contains(&identity().uuid));
    }

    #[test]
    fn test_probe_detection() {
        let probe = format!(
            r#"<s:Envelope xmlns:s="{SOAP_NS}" xmlns:d="{WSD_NS}">
               <s:Header><a:MessageID>urn:uuid:p1</a:MessageID>
               <a:Action>{WSD_NS}/Probe</a:Action></s:Header>
               <s:Body><d:Probe/></s:Body></s:Envelope>"#
        );
        assert!(is_probe_message(probe.as_bytes()));
        assert!(!is_probe_message(b"random datagram"));
        assert!(!is_probe_message(&[0xff, 0xfe]));

        // Our own ProbeMatch must not look like a probe.
        let own = serialize_message(&WsDiscoveryMessage::ProbeMatch {
            message_id: "m".to_string(),
            relates_to: "r".to_string(),
            endpoint: "e".to_string(),
            scopes: String::new(),
            xaddrs: String::new(),
            message_number: 1,
            instance_id: 1,
        });
        assert!(!is_probe_message(own.as_bytes()));
    }

    #[test]
    fn test_extract_message_id() {
        let text = r#"<a:MessageID>urn:uuid:abc-123</a:MessageID>"#;
        assert_eq!(
            extract_xml_element(text, "MessageID"),
            Some("urn:uuid:abc-123".to_string())
        );
        assert_eq!(extract_xml_element(text, "RelatesTo"), None);
    }

    #[test]
    fn test_scopes_from_config() {
        let config = ConfigRuntime::with_defaults();
        config.set_str("onvif", "scope_name", "Porch").unwrap();
        config.set_str("onvif", "scope_location", "Yard").unwrap();

        let scopes = scopes_string(&config);
        assert!(scopes.contains("onvif://www.onvif.org/name/Porch"));
        assert!(scopes.contains("onvif://www.onvif.org/location/Yard"));
        assert!(scopes.contains("onvif://www.onvif.org/type/video_encoder"));
    }

    #[tokio::test]
    async fn test_unicast_probe_gets_probe_match() {
        let config = Arc::new(ConfigRuntime::with_defaults());
        let identity = identity();
        let expected_uuid = identity.uuid.clone();

        // Ephemeral port keeps the test independent of 3702.
        let probe_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let responder_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let responder_addr = responder_socket.local_addr().unwrap();
        drop(responder_socket);

        let (handle, task) = WsDiscovery::new(identity, config)
            .with_port(responder_addr.port())
            .run()
            .await
            .unwrap();

        let probe = format!(
            r#"<s:Envelope xmlns:s="{SOAP_NS}" xmlns:a="{WSA_NS}" xmlns:d="{WSD_NS}">
               <s:Header><a:MessageID>urn:uuid:probe-42</a:MessageID>
               <a:Action>{WSD_NS}/Probe</a:Action></s:Header>
               <s:Body><d:Probe><d:Types>tdn:NetworkVideoTransmitter</d:Types></d:Probe></s:Body>
               </s:Envelope>"#
        );
        probe_socket
            .send_to(probe.as_bytes(), ("127.0.0.1", responder_addr.port()))
            .await
            .unwrap();

        let mut buf = [0u8; 4096];
        let (len, _) = tokio::time::timeout(
            Duration::from_secs(2),
            probe_socket.recv_from(&mut buf),
        )
        .await
        .expect("ProbeMatch within the deadline")
        .unwrap();

        let reply = String::from_utf8_lossy(&buf[..len]);
        assert!(reply.contains("ProbeMatch"));
        assert!(reply.contains(&expected_uuid));
        assert!(reply.contains("<a:RelatesTo>urn:uuid:probe-42</a:RelatesTo>"));

        handle.stop().await;
        let _ = tokio::time::timeout(Duration::from_secs(3), task).await;
    }

    #[tokio::test]
    async fn test_non_discoverable_ignores_probe() {
        let config = Arc::new(ConfigRuntime::with_defaults());
        config
            .set_str("onvif", "discovery_mode", "NonDiscoverable")
            .unwrap();

        let probe_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let placeholder = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let responder_addr = placeholder.local_addr().unwrap();
        drop(placeholder);

        let (handle, task) = WsDiscovery::new(identity(), config)
            .with_port(responder_addr.port())
            .run()
            .await
            .unwrap();

        let probe = format!(r#"<d:Probe xmlns:d="{WSD_NS}"/>"#);
        probe_socket
            .send_to(probe.as_bytes(), ("127.0.0.1", responder_addr.port()))
            .await
            .unwrap();

        let mut buf = [0u8; 256];
        let reply = tokio::time::timeout(
            Duration::from_millis(800),
            probe_socket.recv_from(&mut buf),
        )
        .await;
        assert!(reply.is_err(), "silent mode must not answer probes");

        handle.stop().await;
        let _ = tokio::time::timeout(Duration::from_secs(3), task).await;
    }
}
