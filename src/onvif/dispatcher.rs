//! Service registry and dispatcher.
//!
//! The dispatcher owns the process-wide [`ServiceRegistry`] and routes
//! `(service, operation)` pairs to the registered handler. The registry is
//! a plain vector scanned linearly: with at most [`MAX_SERVICES`] entries
//! and registration happening only at startup/shutdown, the constant factor
//! beats any hash structure and the registry itself never allocates on the
//! dispatch path.
//!
//! Registration is transactional: the entry is visible if and only if the
//! handler's `init` succeeded. Cleanup runs in reverse registration order.
//! A panicking handler is caught at the dispatch boundary and surfaces as
//! an internal fault; the connection that carried the request stays alive.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::RwLock;
use thiserror::Error;

use super::capabilities::{CapabilitySnapshot, ServiceCapability};
use super::context::SoapContext;
use super::error::{OnvifError, OnvifResult};

/// Maximum number of registered services.
pub const MAX_SERVICES: usize = 8;

/// Registration and lookup failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("service '{0}' is already registered")]
    Duplicate(String),

    #[error("invalid registration: {0}")]
    InvalidParameters(String),

    #[error("service registry is full ({MAX_SERVICES} entries)")]
    RegistryFull,

    #[error("service '{0}' is not registered")]
    NotFound(String),

    #[error("service '{service}' init failed: {reason}")]
    InitFailed { service: String, reason: String },
}

/// Per-dispatch context handed to handlers.
///
/// Carries the registry capability snapshot so services that aggregate
/// (Device) never hold a reference back into the registry.
#[derive(Debug, Clone, Default)]
pub struct DispatchContext {
    pub capabilities: CapabilitySnapshot,
}

/// A service able to process SOAP operations.
///
/// The optional lifecycle slots of the original registration record map to
/// default trait methods: a service that needs no init or cleanup simply
/// leaves them alone.
#[async_trait]
pub trait ServiceHandler: Send + Sync {
    /// Registry name, lowercase ASCII (e.g. "device").
    fn service_name(&self) -> &'static str;

    /// WSDL namespace URI.
    fn namespace(&self) -> &'static str;

    /// Operation names this service accepts, for diagnostics and
    /// capability listing.
    fn operations(&self) -> &'static [&'static str];

    /// Declarative capability record for GetCapabilities aggregation.
    fn capability(&self) -> ServiceCapability;

    /// Startup hook, run inside `register_service`.
    async fn init(&self) -> OnvifResult<()> {
        Ok(())
    }

    /// Shutdown hook, run by `unregister_service` and `cleanup`.
    async fn cleanup(&self) {}

    /// Process one operation. On success the handler has written the
    /// response into the context; on error the dispatcher writes the fault.
    async fn handle_operation(
        &self,
        operation: &str,
        ctx: &mut SoapContext,
        dispatch: &DispatchContext,
    ) -> OnvifResult<()>;
}

/// One registry entry.
#[derive(Clone)]
pub struct ServiceRegistration {
    pub service_name: String,
    pub namespace_uri: String,
    pub handler: Arc<dyn ServiceHandler>,
}

impl ServiceRegistration {
    /// Build a registration from a handler's own metadata.
    pub fn new(handler: Arc<dyn ServiceHandler>) -> Self {
        Self {
            service_name: handler.service_name().to_string(),
            namespace_uri: handler.namespace().to_string(),
            handler,
        }
    }

    fn validate(&self) -> Result<(), RegistryError> {
        if self.service_name.is_empty() {
            return Err(RegistryError::InvalidParameters(
                "service name is empty".to_string(),
            ));
        }
        if !self
            .service_name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
        {
            return Err(RegistryError::InvalidParameters(format!(
                "service name '{}' is not lowercase ASCII",
                self.service_name
            )));
        }
        if self.namespace_uri.is_empty() {
            return Err(RegistryError::InvalidParameters(
                "namespace URI is empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// The process-wide service dispatcher.
pub struct ServiceDispatcher {
    registry: RwLock<Vec<ServiceRegistration>>,
    initialized: AtomicBool,
}

impl ServiceDispatcher {
    pub fn new() -> Self {
        Self {
            registry: RwLock::new(Vec::new()),
            initialized: AtomicBool::new(false),
        }
    }

    /// Prepare the registry. Idempotent.
    pub fn init(&self) {
        if !self.initialized.swap(true, Ordering::SeqCst) {
            tracing::debug!("service dispatcher initialized");
        }
    }

    /// Unregister everything in reverse registration order. Idempotent.
    pub async fn cleanup(&self) {
        let drained: Vec<ServiceRegistration> = {
            let mut registry = self.registry.write();
            registry.drain(..).collect()
        };

        for registration in drained.into_iter().rev() {
            registration.handler.cleanup().await;
            tracing::debug!(service = %registration.service_name, "service unregistered");
        }
        self.initialized.store(false, Ordering::SeqCst);
    }

    /// Register a service. Transactional: on handler init failure the entry
    /// is rolled back and the registry is unchanged.
    pub async fn register_service(
        &self,
        registration: ServiceRegistration,
    ) -> Result<(), RegistryError> {
        registration.validate()?;

        let name = registration.service_name.clone();
        let handler = Arc::clone(&registration.handler);

        {
            let mut registry = self.registry.write();
            if registry.iter().any(|r| r.service_name == name) {
                return Err(RegistryError::Duplicate(name));
            }
            if registry.len() >= MAX_SERVICES {
                return Err(RegistryError::RegistryFull);
            }
            registry.push(registration);
        }

        if let Err(e) = handler.init().await {
            self.registry.write().retain(|r| r.service_name != name);
            return Err(RegistryError::InitFailed {
                service: name,
                reason: e.to_string(),
            });
        }

        tracing::info!(
            service = %name,
            operations = handler.operations().len(),
            "service registered"
        );
        Ok(())
    }

    /// Remove a service, running its cleanup hook.
    pub async fn unregister_service(&self, service_name: &str) -> Result<(), RegistryError> {
        let removed = {
            let mut registry = self.registry.write();
            match registry.iter().position(|r| r.service_name == service_name) {
                Some(index) => registry.remove(index),
                None => return Err(RegistryError::NotFound(service_name.to_string())),
            }
        };

        removed.handler.cleanup().await;
        tracing::info!(service = %service_name, "service unregistered");
        Ok(())
    }

    /// Whether a service is registered.
    pub fn is_registered(&self, service_name: &str) -> bool {
        self.registry
            .read()
            .iter()
            .any(|r| r.service_name == service_name)
    }

    /// Snapshot of registered service names, in registration order.
    pub fn list_services(&self) -> Vec<String> {
        self.registry
            .read()
            .iter()
            .map(|r| r.service_name.clone())
            .collect()
    }

    /// Capability snapshot across all registered services.
    pub fn capability_snapshot(&self) -> CapabilitySnapshot {
        CapabilitySnapshot {
            services: self
                .registry
                .read()
                .iter()
                .map(|r| r.handler.capability())
                .collect(),
        }
    }

    /// Route one operation to its service.
    ///
    /// On any error the fault envelope is written into the context before
    /// returning, so the caller always has a response to send.
    pub async fn dispatch(
        &self,
        service_name: &str,
        operation: &str,
        ctx: &mut SoapContext,
    ) -> OnvifResult<()> {
        let handler = {
            let registry = self.registry.read();
            registry
                .iter()
                .find(|r| r.service_name == service_name)
                .map(|r| Arc::clone(&r.handler))
        };

        let Some(handler) = handler else {
            let error = OnvifError::NotFound(format!("service '{}'", service_name));
            ctx.generate_fault(error.clone());
            return Err(error);
        };

        let dispatch = DispatchContext {
            capabilities: self.capability_snapshot(),
        };

        let outcome = AssertUnwindSafe(handler.handle_operation(operation, ctx, &dispatch))
            .catch_unwind()
            .await;

        let result = match outcome {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(
                    "[{}::{}] handler panicked",
                    handler.service_name(),
                    operation
                );
                Err(OnvifError::Internal("handler panicked".to_string()))
            }
        };

        if let Err(error) = &result {
            tracing::warn!(
                "[{}::{}] {}",
                handler.service_name(),
                operation,
                error
            );
            ctx.generate_fault(error.clone());
        }

        result
    }
}

impl Default for ServiceDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onvif::capabilities::{CapabilityFlags, ONVIF_VERSION};

    struct TestHandler {
        name: &'static str,
        fail_init: bool,
        panic_on_handle: bool,
    }

    impl TestHandler {
        fn named(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                fail_init: false,
                panic_on_handle: false,
            })
        }
    }

    #[async_trait]
    impl ServiceHandler for TestHandler {
        fn service_name(&self) -> &'static str {
            self.name
        }

        fn namespace(&self) -> &'static str {
            "http://www.onvif.org/ver10/device/wsdl"
        }

        fn operations(&self) -> &'static [&'static str] {
            &["GetThing"]
        }

        fn capability(&self) -> ServiceCapability {
            ServiceCapability {
                service_name: self.name,
                namespace: "http://www.onvif.org/ver10/device/wsdl",
                xaddr_path: "/onvif/device_service",
                version: ONVIF_VERSION,
                flags: CapabilityFlags {
                    device: true,
                    ..Default::default()
                },
            }
        }

        async fn init(&self) -> OnvifResult<()> {
            if self.fail_init {
                Err(OnvifError::Internal("init refused".to_string()))
            } else {
                Ok(())
            }
        }

        async fn handle_operation(
            &self,
            operation: &str,
            ctx: &mut SoapContext,
            _dispatch: &DispatchContext,
        ) -> OnvifResult<()> {
            if self.panic_on_handle {
                panic!("handler bug");
            }
            match operation {
                "GetThing" => {
                    ctx.generate_response_with(|out| out.push_str("<GetThingResponse/>"));
                    Ok(())
                }
                other => Err(OnvifError::ActionNotSupported(other.to_string())),
            }
        }
    }

    fn soap_request(operation: &str) -> SoapContext {
        let xml = format!(
            r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope">
                 <s:Body><{op}/></s:Body>
               </s:Envelope>"#,
            op = operation
        );
        SoapContext::parse(xml.as_bytes()).unwrap()
    }

    #[tokio::test]
    async fn test_register_and_dispatch() {
        let dispatcher = ServiceDispatcher::new();
        dispatcher.init();
        dispatcher
            .register_service(ServiceRegistration::new(TestHandler::named("device")))
            .await
            .unwrap();

        assert!(dispatcher.is_registered("device"));

        let mut ctx = soap_request("GetThing");
        dispatcher.dispatch("device", "GetThing", &mut ctx).await.unwrap();
        assert!(ctx.response_data().contains("GetThingResponse"));
    }

    #[tokio::test]
    async fn test_duplicate_registration_rejected() {
        let dispatcher = ServiceDispatcher::new();
        dispatcher
            .register_service(ServiceRegistration::new(TestHandler::named("device")))
            .await
            .unwrap();

        let err = dispatcher
            .register_service(ServiceRegistration::new(TestHandler::named("device")))
            .await
            .unwrap_err();
        assert_eq!(err, RegistryError::Duplicate("device".to_string()));
    }

    #[tokio::test]
    async fn test_registry_capacity() {
        let dispatcher = ServiceDispatcher::new();
        let names: [&'static str; 9] = [
            "s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7", "s8",
        ];
        for name in &names[..MAX_SERVICES] {
            dispatcher
                .register_service(ServiceRegistration::new(TestHandler::named(name)))
                .await
                .unwrap();
        }

        let err = dispatcher
            .register_service(ServiceRegistration::new(TestHandler::named(names[8])))
            .await
            .unwrap_err();
        assert_eq!(err, RegistryError::RegistryFull);
        assert_eq!(dispatcher.list_services().len(), MAX_SERVICES);
    }

    #[tokio::test]
    async fn test_failed_init_rolls_back() {
        let dispatcher = ServiceDispatcher::new();
        let handler = Arc::new(TestHandler {
            name: "device",
            fail_init: true,
            panic_on_handle: false,
        });

        let err = dispatcher
            .register_service(ServiceRegistration::new(handler))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::InitFailed { .. }));
        assert!(!dispatcher.is_registered("device"));
        assert!(dispatcher.list_services().is_empty());
    }

    #[tokio::test]
    async fn test_register_then_unregister_restores_state() {
        let dispatcher = ServiceDispatcher::new();
        let before = dispatcher.list_services();

        dispatcher
            .register_service(ServiceRegistration::new(TestHandler::named("media")))
            .await
            .unwrap();
        dispatcher.unregister_service("media").await.unwrap();

        assert_eq!(dispatcher.list_services(), before);
        assert!(!dispatcher.is_registered("media"));
    }

    #[tokio::test]
    async fn test_unregister_unknown() {
        let dispatcher = ServiceDispatcher::new();
        assert_eq!(
            dispatcher.unregister_service("ghost").await.unwrap_err(),
            RegistryError::NotFound("ghost".to_string())
        );
    }

    #[tokio::test]
    async fn test_dispatch_unknown_service_faults() {
        let dispatcher = ServiceDispatcher::new();
        let mut ctx = soap_request("GetThing");

        let err = dispatcher
            .dispatch("nope", "GetThing", &mut ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, OnvifError::NotFound(_)));
        assert!(ctx.response_data().contains("s:Fault"));
    }

    #[tokio::test]
    async fn test_dispatch_unknown_operation_faults() {
        let dispatcher = ServiceDispatcher::new();
        dispatcher
            .register_service(ServiceRegistration::new(TestHandler::named("device")))
            .await
            .unwrap();

        let mut ctx = soap_request("GetUnknown");
        let err = dispatcher
            .dispatch("device", "GetUnknown", &mut ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, OnvifError::ActionNotSupported(_)));
        assert!(ctx.response_data().contains("ter:ActionNotSupported"));
    }

    #[tokio::test]
    async fn test_handler_panic_becomes_internal_fault() {
        let dispatcher = ServiceDispatcher::new();
        dispatcher
            .register_service(ServiceRegistration::new(Arc::new(TestHandler {
                name: "device",
                fail_init: false,
                panic_on_handle: true,
            })))
            .await
            .unwrap();

        let mut ctx = soap_request("GetThing");
        let err = dispatcher
            .dispatch("device", "GetThing", &mut ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, OnvifError::Internal(_)));
        assert!(ctx.response_data().contains("s:Receiver"));

        // The dispatcher survives and keeps serving.
        assert!(dispatcher.is_registered("device"));
    }

    #[tokio::test]
    async fn test_init_idempotent() {
        let dispatcher = ServiceDispatcher::new();
        dispatcher.init();
        dispatcher.init();
        dispatcher
            .register_service(ServiceRegistration::new(TestHandler::named("device")))
            .await
            .unwrap();
        assert_eq!(dispatcher.list_services(), vec!["device".to_string()]);
    }

    #[tokio::test]
    async fn test_cleanup_idempotent_and_clears() {
        let dispatcher = ServiceDispatcher::new();
        dispatcher
            .register_service(ServiceRegistration::new(TestHandler::named("device")))
            .await
            .unwrap();

        dispatcher.cleanup().await;
        dispatcher.cleanup().await;
        assert!(dispatcher.list_services().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_name_rejected() {
        let dispatcher = ServiceDispatcher::new();
        let err = dispatcher
            .register_service(ServiceRegistration::new(TestHandler::named("Device")))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidParameters(_)));
    }

    #[tokio::test]
    async fn test_capability_snapshot_aggregates() {
        let dispatcher = ServiceDispatcher::new();
        dispatcher
            .register_service(ServiceRegistration::new(TestHandler::named("device")))
            .await
            .unwrap();

        let snapshot = dispatcher.capability_snapshot();
        assert_eq!(snapshot.services.len(), 1);
        assert!(snapshot.aggregate_flags().device);
    }
}
