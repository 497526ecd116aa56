//! ONVIF service integration tests, driven through the dispatcher.

mod device_service;
mod dispatch;
mod imaging_service;
mod media_service;
mod ptz_service;

use std::sync::Arc;

use onvifd::config::{ConfigRuntime, PersistenceHandle};
use onvifd::onvif::device::DeviceService;
use onvifd::onvif::imaging::ImagingService;
use onvifd::onvif::media::MediaService;
use onvifd::onvif::ptz::PtzService;
use onvifd::onvif::{ServiceDispatcher, ServiceRegistration, SoapContext};
use onvifd::platform::{Hardware, StubHardware};
use onvifd::streaming::{Streaming, UriBuilder};

use crate::test_utils::envelope;

/// A dispatcher with all four services registered over stub facades.
pub struct Harness {
    pub dispatcher: ServiceDispatcher,
    pub config: Arc<ConfigRuntime>,
    pub hardware: Arc<StubHardware>,
    pub streaming: Arc<UriBuilder>,
}

pub async fn harness() -> Harness {
    let config = Arc::new(ConfigRuntime::with_defaults());
    config.set_str("network", "device_ip", "192.168.1.80").unwrap();
    let hardware = Arc::new(StubHardware::new());
    let streaming = Arc::new(UriBuilder::new(Arc::clone(&config)));
    let persistence = PersistenceHandle::disconnected();

    let dispatcher = ServiceDispatcher::new();
    dispatcher.init();
    dispatcher
        .register_service(ServiceRegistration::new(Arc::new(DeviceService::new(
            Arc::clone(&config),
            hardware.clone() as Arc<dyn Hardware>,
            persistence.clone(),
        ))))
        .await
        .unwrap();
    dispatcher
        .register_service(ServiceRegistration::new(Arc::new(MediaService::new(
            Arc::clone(&config),
            streaming.clone() as Arc<dyn Streaming>,
            persistence.clone(),
        ))))
        .await
        .unwrap();
    dispatcher
        .register_service(ServiceRegistration::new(Arc::new(ImagingService::new(
            Arc::clone(&config),
            hardware.clone() as Arc<dyn Hardware>,
            persistence.clone(),
        ))))
        .await
        .unwrap();
    dispatcher
        .register_service(ServiceRegistration::new(Arc::new(PtzService::new(
            Arc::clone(&config),
            hardware.clone() as Arc<dyn Hardware>,
        ))))
        .await
        .unwrap();

    Harness {
        dispatcher,
        config,
        hardware,
        streaming,
    }
}

impl Harness {
    /// Dispatch an operation fragment; return the response envelope.
    pub async fn call(&self, service: &str, body: &str) -> String {
        let mut ctx = SoapContext::parse(envelope(body).as_bytes()).unwrap();
        let operation = ctx.operation().to_string();
        let _ = self.dispatcher.dispatch(service, &operation, &mut ctx).await;
        ctx.response_data().to_string()
    }
}
