//! Dispatcher-level properties over the real service set.

use onvifd::onvif::{MAX_SERVICES, SoapContext};

use crate::test_utils::envelope;

use super::harness;

#[tokio::test]
async fn test_all_four_services_registered() {
    let h = harness().await;
    assert_eq!(
        h.dispatcher.list_services(),
        vec!["device", "media", "imaging", "ptz"]
    );
    assert!(h.dispatcher.list_services().len() <= MAX_SERVICES);
}

#[tokio::test]
async fn test_dispatch_equals_direct_handler_call() {
    // dispatch(service, op, ctx) must be observationally equivalent to
    // invoking the handler directly.
    let h = harness().await;

    let via_dispatcher = h.call("device", "<tds:GetHostname/>").await;

    let mut ctx = SoapContext::parse(envelope("<tds:GetHostname/>").as_bytes()).unwrap();
    use onvifd::config::PersistenceHandle;
    use onvifd::onvif::device::DeviceService;
    use onvifd::onvif::{DispatchContext, ServiceHandler};
    use onvifd::platform::Hardware;
    use std::sync::Arc;

    let direct_service = DeviceService::new(
        Arc::clone(&h.config),
        h.hardware.clone() as Arc<dyn Hardware>,
        PersistenceHandle::disconnected(),
    );
    let dispatch = DispatchContext {
        capabilities: h.dispatcher.capability_snapshot(),
    };
    direct_service
        .handle_operation("GetHostname", &mut ctx, &dispatch)
        .await
        .unwrap();

    assert_eq!(via_dispatcher, ctx.response_data());
}

#[tokio::test]
async fn test_unknown_service_and_operation_fault() {
    let h = harness().await;

    let mut ctx = SoapContext::parse(envelope("<tds:GetHostname/>").as_bytes()).unwrap();
    let err = h
        .dispatcher
        .dispatch("events", "GetHostname", &mut ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, onvifd::onvif::OnvifError::NotFound(_)));

    let response = h.call("device", "<tds:NotARealOperation/>").await;
    assert!(response.contains("ter:ActionNotSupported"));
}

#[tokio::test]
async fn test_unregister_restores_pre_registration_state() {
    let h = harness().await;
    let before = h.dispatcher.list_services();

    h.dispatcher.unregister_service("ptz").await.unwrap();
    assert!(!h.dispatcher.is_registered("ptz"));
    assert_eq!(h.dispatcher.list_services().len(), before.len() - 1);

    let response = h.call("ptz", "<tptz:GetNodes/>").await;
    assert!(response.contains("ter:NotFound"));
}

#[tokio::test]
async fn test_capabilities_aggregate_over_registry() {
    let h = harness().await;
    let response = h.call("device", "<tds:GetCapabilities/>").await;

    // All four categories advertised while all four services are present.
    assert!(response.contains("<tt:Device>"));
    assert!(response.contains("<tt:Media>"));
    assert!(response.contains("<tt:Imaging>"));
    assert!(response.contains("<tt:PTZ>"));

    // Dropping a service drops its capability section.
    h.dispatcher.unregister_service("ptz").await.unwrap();
    let response = h.call("device", "<tds:GetCapabilities/>").await;
    assert!(!response.contains("<tt:PTZ>"));
}

#[tokio::test]
async fn test_get_services_lists_namespaces() {
    let h = harness().await;
    let response = h.call("device", "<tds:GetServices/>").await;

    assert!(response.contains("http://www.onvif.org/ver10/device/wsdl"));
    assert!(response.contains("http://www.onvif.org/ver10/media/wsdl"));
    assert!(response.contains("http://www.onvif.org/ver20/imaging/wsdl"));
    assert!(response.contains("http://www.onvif.org/ver20/ptz/wsdl"));
    assert!(response.contains("<tt:Major>2</tt:Major>"));
    assert!(response.contains("<tt:Minor>5</tt:Minor>"));
}
