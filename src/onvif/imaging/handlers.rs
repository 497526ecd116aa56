//! Imaging service operation handlers.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{ConfigRuntime, PersistenceHandle};
use crate::onvif::capabilities::{CapabilityFlags, ONVIF_VERSION, ServiceCapability};
use crate::onvif::context::SoapContext;
use crate::onvif::dispatcher::{DispatchContext, ServiceHandler};
use crate::onvif::error::{OnvifError, OnvifResult};
use crate::onvif::media::VIDEO_SOURCE_TOKEN;
use crate::onvif::soap::{TIMG_NS, XmlElement};
use crate::platform::Hardware;

use super::store::{ImagingSettings, ImagingStore};

/// Operations accepted by the Imaging service.
pub const OPERATIONS: &[&str] = &["GetImagingSettings", "SetImagingSettings", "GetOptions"];

/// ONVIF Imaging service.
pub struct ImagingService {
    hardware: Arc<dyn Hardware>,
    store: ImagingStore,
}

impl ImagingService {
    pub fn new(
        config: Arc<ConfigRuntime>,
        hardware: Arc<dyn Hardware>,
        persistence: PersistenceHandle,
    ) -> Self {
        Self {
            store: ImagingStore::new(config, persistence),
            hardware,
        }
    }

    /// Direct store access for tests and diagnostics.
    pub fn store(&self) -> &ImagingStore {
        &self.store
    }

    fn require_source(payload: &XmlElement) -> OnvifResult<()> {
        let token = payload
            .child_text("VideoSourceToken")
            .ok_or_else(|| OnvifError::missing_arg("VideoSourceToken"))?;
        if token != VIDEO_SOURCE_TOKEN {
            return Err(OnvifError::NotFound(format!("video source '{}'", token)));
        }
        Ok(())
    }

    async fn get_imaging_settings(
        &self,
        payload: &XmlElement,
        out: &mut String,
    ) -> OnvifResult<()> {
        Self::require_source(payload)?;
        let settings = self.store.get().await;

        out.push_str(&format!(
            "<timg:GetImagingSettingsResponse><timg:ImagingSettings>\
             <tt:Brightness>{}</tt:Brightness>\
             <tt:ColorSaturation>{}</tt:ColorSaturation>\
             <tt:Contrast>{}</tt:Contrast>\
             <tt:Sharpness>{}</tt:Sharpness>\
             <tt:Extension><tt:Hue>{}</tt:Hue></tt:Extension>\
             </timg:ImagingSettings></timg:GetImagingSettingsResponse>",
            settings.brightness,
            settings.saturation,
            settings.contrast,
            settings.sharpness,
            settings.hue,
        ));
        Ok(())
    }

    async fn set_imaging_settings(
        &self,
        payload: &XmlElement,
        out: &mut String,
    ) -> OnvifResult<()> {
        Self::require_source(payload)?;
        let element = payload
            .child("ImagingSettings")
            .ok_or_else(|| OnvifError::missing_arg("ImagingSettings"))?;

        let current = self.store.get().await;
        let settings = parse_settings(element, current)?;

        self.store.apply(self.hardware.as_ref(), settings).await?;

        out.push_str("<timg:SetImagingSettingsResponse/>");
        Ok(())
    }

    fn get_options(&self, payload: &XmlElement, out: &mut String) -> OnvifResult<()> {
        Self::require_source(payload)?;

        out.push_str(
            "<timg:GetOptionsResponse><timg:ImagingOptions>\
             <tt:Brightness><tt:Min>0</tt:Min><tt:Max>100</tt:Max></tt:Brightness>\
             <tt:ColorSaturation><tt:Min>0</tt:Min><tt:Max>100</tt:Max></tt:ColorSaturation>\
             <tt:Contrast><tt:Min>0</tt:Min><tt:Max>100</tt:Max></tt:Contrast>\
             <tt:Sharpness><tt:Min>0</tt:Min><tt:Max>100</tt:Max></tt:Sharpness>\
             <tt:Extension><tt:Hue><tt:Min>-180</tt:Min><tt:Max>180</tt:Max></tt:Hue></tt:Extension>\
             </timg:ImagingOptions></timg:GetOptionsResponse>",
        );
        Ok(())
    }
}

/// Parse a settings batch. Absent fields keep their current values, so a
/// partial update only touches what the client sent.
fn parse_settings(
    element: &XmlElement,
    current: ImagingSettings,
) -> OnvifResult<ImagingSettings> {
    let field = |name: &str, current: i32| -> OnvifResult<i32> {
        match element.child_text(name) {
            None => Ok(current),
            Some(text) => text
                .parse::<f32>()
                .map(|v| v.round() as i32)
                .map_err(|_| {
                    OnvifError::invalid_arg(
                        "InvalidArgVal",
                        format!("'{}' is not a number", name),
                    )
                }),
        }
    };

    let hue = match element.child("Extension").and_then(|e| e.child_text("Hue")) {
        None => current.hue,
        Some(text) => text.parse::<f32>().map(|v| v.round() as i32).map_err(|_| {
            OnvifError::invalid_arg("InvalidArgVal", "'Hue' is not a number")
        })?,
    };

    Ok(ImagingSettings {
        brightness: field("Brightness", current.brightness)?,
        contrast: field("Contrast", current.contrast)?,
        saturation: field("ColorSaturation", current.saturation)?,
        sharpness: field("Sharpness", current.sharpness)?,
        hue,
    })
}

#[async_trait]
impl ServiceHandler for ImagingService {
    fn service_name(&self) -> &'static str {
        "imaging"
    }

    fn namespace(&self) -> &'static str {
        TIMG_NS
    }

    fn operations(&self) -> &'static [&'static str] {
        OPERATIONS
    }

    fn capability(&self) -> ServiceCapability {
        ServiceCapability {
            service_name: "imaging",
            namespace: TIMG_NS,
            xaddr_path: "/onvif/imaging_service",
            version: ONVIF_VERSION,
            flags: CapabilityFlags {
                imaging: true,
                ..Default::default()
            },
        }
    }

    async fn handle_operation(
        &self,
        operation: &str,
        ctx: &mut SoapContext,
        _dispatch: &DispatchContext,
    ) -> OnvifResult<()> {
        let payload = ctx.payload().clone();
        let mut body = String::new();

        match operation {
            "GetImagingSettings" => self.get_imaging_settings(&payload, &mut body).await?,
            "SetImagingSettings" => self.set_imaging_settings(&payload, &mut body).await?,
            "GetOptions" => self.get_options(&payload, &mut body)?,
            other => return Err(OnvifError::ActionNotSupported(other.to_string())),
        }

        ctx.generate_response_with(|out| out.push_str(&body));
        Ok(())
    }
}
