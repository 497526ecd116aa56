//! Daemon lifecycle.
//!
//! All formerly-global state (registry, buffer pool, facades, tasks) is
//! owned by [`Daemon`], constructed in `start()` and torn down in reverse
//! order by `shutdown()`. Bootstrap order: config, logging, hardware,
//! facades, dispatcher and service registrations (Device first), HTTP
//! server, WS-Discovery, auxiliary tasks.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::buffer::BufferPool;
use crate::config::{
    ConfigRuntime, ConfigStorage, DEFAULT_SAVE_DELAY, PersistenceHandle, PersistenceService,
    StorageError,
};
use crate::daynight;
use crate::discovery::{DiscoveryError, EndpointIdentity, WsDiscovery, WsDiscoveryHandle};
use crate::http::{HttpServer, HttpServerConfig, ServerState};
use crate::logging;
use crate::net::external_ip;
use crate::onvif::device::DeviceService;
use crate::onvif::imaging::ImagingService;
use crate::onvif::media::MediaService;
use crate::onvif::ptz::PtzService;
use crate::onvif::{RegistryError, ServiceDispatcher, ServiceRegistration};
use crate::platform::{Hardware, StubHardware};
use crate::streaming::{Streaming, UriBuilder};

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/onvifd/config.toml";

/// Budget for joining background tasks at shutdown.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Startup failures.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration: {0}")]
    Config(#[from] StorageError),

    #[error("HTTP bind failed: {0}")]
    Bind(#[from] std::io::Error),

    #[error("service registration failed: {0}")]
    Registry(#[from] RegistryError),

    #[error("discovery startup failed: {0}")]
    Discovery(#[from] DiscoveryError),
}

/// How shutdown went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownStatus {
    Success,
    Timeout,
}

/// Shutdown summary.
#[derive(Debug)]
pub struct ShutdownReport {
    pub status: ShutdownStatus,
    pub duration: Duration,
}

/// Construction options. `Default` matches production behavior.
pub struct DaemonOptions {
    pub config_path: String,
    /// Hardware facade; the recording stub when absent (dev hosts, tests).
    pub hardware: Option<Arc<dyn Hardware>>,
    /// Override `onvif.http_port`; 0 binds an ephemeral port (tests).
    pub http_port: Option<u16>,
    /// WS-Discovery responder on/off.
    pub enable_discovery: bool,
}

impl Default for DaemonOptions {
    fn default() -> Self {
        Self {
            config_path: DEFAULT_CONFIG_PATH.to_string(),
            hardware: None,
            http_port: None,
            enable_discovery: true,
        }
    }
}

/// The running daemon.
pub struct Daemon {
    config: Arc<ConfigRuntime>,
    dispatcher: Arc<ServiceDispatcher>,
    pool: Arc<BufferPool>,
    server: Arc<HttpServer>,
    local_addr: SocketAddr,
    discovery: Option<WsDiscoveryHandle>,
    persistence_handle: Option<PersistenceHandle>,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
    started_at: Instant,
}

impl Daemon {
    /// Start with defaults.
    pub async fn start(config_path: &str) -> Result<Self, StartupError> {
        Self::start_with(DaemonOptions {
            config_path: config_path.to_string(),
            ..Default::default()
        })
        .await
    }

    /// Start with explicit options.
    pub async fn start_with(options: DaemonOptions) -> Result<Self, StartupError> {
        let started_at = Instant::now();

        // Config comes first; everything else reads through it.
        let storage = ConfigStorage::new(&options.config_path);
        let values = storage.load_or_default()?;
        let config = Arc::new(ConfigRuntime::new(values));
        logging::init(&config);

        let (persistence_service, persistence_handle) =
            PersistenceService::new(Arc::clone(&config), storage, DEFAULT_SAVE_DELAY);
        let persistence_task = tokio::spawn(persistence_service.run());

        let hardware = options
            .hardware
            .unwrap_or_else(|| Arc::new(StubHardware::new()) as Arc<dyn Hardware>);

        // Degraded operation is better than no daemon: hardware init
        // failures are logged, not fatal.
        if let Err(e) = hardware.vi_open().await {
            tracing::warn!(error = %e, "video input open failed, running degraded");
        }
        if let Err(e) = hardware.irled_init().await {
            tracing::warn!(error = %e, "IR LED init failed");
        }

        let streaming: Arc<dyn Streaming> = Arc::new(UriBuilder::new(Arc::clone(&config)));
        let pool = Arc::new(BufferPool::new());

        let dispatcher = Arc::new(ServiceDispatcher::new());
        dispatcher.init();

        dispatcher
            .register_service(ServiceRegistration::new(Arc::new(DeviceService::new(
                Arc::clone(&config),
                Arc::clone(&hardware),
                persistence_handle.clone(),
            ))))
            .await?;
        dispatcher
            .register_service(ServiceRegistration::new(Arc::new(MediaService::new(
                Arc::clone(&config),
                Arc::clone(&streaming),
                persistence_handle.clone(),
            ))))
            .await?;
        dispatcher
            .register_service(ServiceRegistration::new(Arc::new(ImagingService::new(
                Arc::clone(&config),
                Arc::clone(&hardware),
                persistence_handle.clone(),
            ))))
            .await?;
        dispatcher
            .register_service(ServiceRegistration::new(Arc::new(PtzService::new(
                Arc::clone(&config),
                Arc::clone(&hardware),
            ))))
            .await?;

        let http_port = options
            .http_port
            .unwrap_or_else(|| config.get_int("onvif", "http_port").unwrap_or(8080) as u16);
        let server = Arc::new(HttpServer::new(
            HttpServerConfig {
                port: http_port,
                ..Default::default()
            },
            ServerState {
                dispatcher: Arc::clone(&dispatcher),
                pool: Arc::clone(&pool),
                config: Arc::clone(&config),
            },
        ));
        let listener = server.bind().await?;
        let local_addr = listener.local_addr()?;

        let mut tasks: Vec<(&'static str, JoinHandle<()>)> = Vec::new();
        let server_task = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.run(listener).await })
        };
        tasks.push(("http", server_task));
        tasks.push(("persistence", persistence_task));

        let (shutdown_tx, _) = broadcast::channel(1);

        let discovery = if options.enable_discovery {
            let hostname = config
                .get_str("network", "hostname")
                .unwrap_or_else(|_| "onvif-camera".to_string());
            let identity = EndpointIdentity::from_hostname(
                &hostname,
                external_ip(&config),
                local_addr.port(),
            );
            match WsDiscovery::new(identity, Arc::clone(&config)).run().await {
                Ok((handle, task)) => {
                    tasks.push(("discovery", task));
                    Some(handle)
                }
                Err(e) => {
                    // The responder must never take the daemon down.
                    tracing::warn!(error = %e, "WS-Discovery unavailable");
                    None
                }
            }
        } else {
            None
        };

        let daynight_task = tokio::spawn(daynight::run(
            Arc::clone(&config),
            Arc::clone(&hardware),
            shutdown_tx.subscribe(),
        ));
        tasks.push(("daynight", daynight_task));

        tracing::info!(
            addr = %local_addr,
            services = ?dispatcher.list_services(),
            startup_ms = started_at.elapsed().as_millis() as u64,
            "daemon started"
        );

        Ok(Self {
            config,
            dispatcher,
            pool,
            server,
            local_addr,
            discovery,
            persistence_handle: Some(persistence_handle),
            shutdown_tx,
            tasks,
            started_at,
        })
    }

    /// Bound HTTP address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn config(&self) -> &Arc<ConfigRuntime> {
        &self.config
    }

    pub fn dispatcher(&self) -> &Arc<ServiceDispatcher> {
        &self.dispatcher
    }

    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Block until SIGINT/SIGTERM.
    pub async fn run(&self) {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "signal wait failed");
        }
        tracing::info!("shutdown signal received");
    }

    /// Tear everything down in reverse start order.
    pub async fn shutdown(mut self) -> ShutdownReport {
        let begin = Instant::now();
        let mut status = ShutdownStatus::Success;

        // Auxiliary tasks first, then the announcement, then the frontend.
        let _ = self.shutdown_tx.send(());

        if let Some(discovery) = &self.discovery {
            discovery.stop().await;
        }
        self.server.shutdown();

        // Unregistering the services drops their persistence handles; the
        // daemon's own clone goes last so the persistence task can flush
        // and exit.
        self.dispatcher.cleanup().await;
        self.persistence_handle.take();

        for (name, task) in self.tasks.drain(..) {
            if tokio::time::timeout(SHUTDOWN_TIMEOUT, task).await.is_err() {
                tracing::warn!(task = name, "task did not stop within the timeout");
                status = ShutdownStatus::Timeout;
            }
        }

        let report = ShutdownReport {
            status,
            duration: begin.elapsed(),
        };
        tracing::info!(status = ?report.status, duration_ms = report.duration.as_millis() as u64, "daemon stopped");
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_options(dir: &tempfile::TempDir) -> DaemonOptions {
        DaemonOptions {
            config_path: dir
                .path()
                .join("config.toml")
                .to_string_lossy()
                .to_string(),
            hardware: None,
            http_port: Some(0),
            enable_discovery: false,
        }
    }

    #[tokio::test]
    async fn test_start_registers_all_services() {
        let dir = tempfile::tempdir().unwrap();
        let daemon = Daemon::start_with(test_options(&dir)).await.unwrap();

        let services = daemon.dispatcher().list_services();
        assert_eq!(services, vec!["device", "media", "imaging", "ptz"]);
        assert_ne!(daemon.local_addr().port(), 0);

        let report = daemon.shutdown().await;
        assert_eq!(report.status, ShutdownStatus::Success);
    }

    #[tokio::test]
    async fn test_shutdown_clears_registry_and_pool() {
        let dir = tempfile::tempdir().unwrap();
        let daemon = Daemon::start_with(test_options(&dir)).await.unwrap();

        let dispatcher = Arc::clone(daemon.dispatcher());
        let pool = Arc::clone(daemon.pool());

        let report = daemon.shutdown().await;
        assert_eq!(report.status, ShutdownStatus::Success);
        assert!(dispatcher.list_services().is_empty());
        assert_eq!(pool.stats().current_used, 0);
    }

    #[tokio::test]
    async fn test_two_daemons_use_distinct_ports() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        let a = Daemon::start_with(test_options(&dir_a)).await.unwrap();
        let b = Daemon::start_with(test_options(&dir_b)).await.unwrap();

        assert_ne!(a.local_addr(), b.local_addr());
        a.shutdown().await;
        b.shutdown().await;
    }
}
