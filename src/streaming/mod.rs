//! Streaming facade: stream and snapshot URI construction.
//!
//! The RTSP engine itself lives outside the core; the ONVIF Media service
//! only needs URIs for it. URIs are cached per `(profile token, protocol)`
//! and invalidated whenever a profile mutates, so repeated `GetStreamUri`
//! calls for an unchanged profile never rebuild the string.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::config::ConfigRuntime;
use crate::net::external_ip;

/// Transport protocol requested in GetStreamUri.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamProtocol {
    Rtsp,
    Udp,
    Http,
}

impl StreamProtocol {
    /// Parse the ONVIF protocol token. Unknown values fall back to RTSP.
    pub fn parse(s: &str) -> Self {
        match s {
            "UDP" => StreamProtocol::Udp,
            "HTTP" => StreamProtocol::Http,
            _ => StreamProtocol::Rtsp,
        }
    }
}

/// URI cache hit/miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UriCacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Streaming facade consumed by the Media service.
pub trait Streaming: Send + Sync {
    /// Build (or fetch from cache) the stream URI for a profile.
    fn build_stream_uri(&self, profile_token: &str, protocol: StreamProtocol) -> String;

    /// Build the snapshot URI for a profile.
    fn build_snapshot_uri(&self, profile_token: &str) -> String;

    /// Drop cached URIs for a profile after it mutates.
    fn invalidate(&self, profile_token: &str);

    /// Cache statistics.
    fn cache_stats(&self) -> UriCacheStats;
}

/// Default engine rendering `rtsp://{ip}:{port}/{token}` style URIs from
/// the network configuration.
pub struct UriBuilder {
    config: Arc<ConfigRuntime>,
    cache: Mutex<HashMap<(String, StreamProtocol), String>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl UriBuilder {
    pub fn new(config: Arc<ConfigRuntime>) -> Self {
        Self {
            config,
            cache: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn render(&self, profile_token: &str, protocol: StreamProtocol) -> String {
        let ip = external_ip(&self.config);
        match protocol {
            StreamProtocol::Rtsp | StreamProtocol::Udp => {
                let port = self.config.get_int("onvif", "rtsp_port").unwrap_or(554);
                format!("rtsp://{}:{}/{}", ip, port, profile_token)
            }
            StreamProtocol::Http => {
                let port = self.config.get_int("onvif", "http_port").unwrap_or(8080);
                format!("http://{}:{}/stream/{}", ip, port, profile_token)
            }
        }
    }
}

impl Streaming for UriBuilder {
    fn build_stream_uri(&self, profile_token: &str, protocol: StreamProtocol) -> String {
        let key = (profile_token.to_string(), protocol);

        if let Some(uri) = self.cache.lock().get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return uri.clone();
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let uri = self.render(profile_token, protocol);
        self.cache.lock().insert(key, uri.clone());
        uri
    }

    fn build_snapshot_uri(&self, profile_token: &str) -> String {
        let ip = external_ip(&self.config);
        let port = self.config.get_int("onvif", "http_port").unwrap_or(8080);
        format!("http://{}:{}/snapshot/{}", ip, port, profile_token)
    }

    fn invalidate(&self, profile_token: &str) {
        self.cache
            .lock()
            .retain(|(token, _), _| token != profile_token);
    }

    fn cache_stats(&self) -> UriCacheStats {
        UriCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
