//! Library root for the ONVIF camera daemon core.
//!
//! The crate implements an ONVIF 2.5 Profile-S request pipeline: a
//! hand-rolled HTTP/1.1 frontend with pooled response buffers, a
//! capability-based service dispatcher, the Device/Media/Imaging/PTZ
//! services, and a WS-Discovery responder. Hardware access, configuration,
//! and RTSP streaming sit behind facades.
//!
//! # Quick start
//!
//! ```ignore
//! use onvifd::app::Daemon;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let daemon = Daemon::start("/etc/onvifd/config.toml").await?;
//!     daemon.run().await;
//!     daemon.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Module organization
//!
//! - [`app`] - daemon lifecycle, ordered startup and shutdown
//! - [`buffer`] - fixed pool of recyclable response buffers
//! - [`config`] - configuration facade (schema, runtime, persistence)
//! - [`daynight`] - automatic day/night switching task
//! - [`discovery`] - WS-Discovery responder
//! - [`http`] - HTTP parser, auth gate, response builder, acceptor
//! - [`onvif`] - SOAP context, dispatcher, and the four services
//! - [`platform`] - hardware facade
//! - [`streaming`] - stream/snapshot URI facade

pub mod app;
pub mod buffer;
pub mod config;
pub mod daynight;
pub mod discovery;
pub mod http;
pub mod logging;
pub mod net;
pub mod onvif;
pub mod platform;
pub mod streaming;
pub mod users;

pub use app::{Daemon, DaemonOptions, ShutdownReport, ShutdownStatus, StartupError};
