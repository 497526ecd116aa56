//! PTZ service operation handlers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::config::ConfigRuntime;
use crate::onvif::capabilities::{CapabilityFlags, ONVIF_VERSION, ServiceCapability};
use crate::onvif::context::SoapContext;
use crate::onvif::dispatcher::{DispatchContext, ServiceHandler};
use crate::onvif::error::{OnvifError, OnvifResult};
use crate::onvif::soap::{TPTZ_NS, XmlElement, xml_escape};
use crate::platform::{Hardware, PtzPosition, PtzSpeed};

use super::state::{MAX_PRESETS, PtzState};

/// Operations accepted by the PTZ service.
pub const OPERATIONS: &[&str] = &[
    "GetNodes",
    "GetNode",
    "GetConfiguration",
    "GetConfigurations",
    "GetStatus",
    "AbsoluteMove",
    "RelativeMove",
    "ContinuousMove",
    "Stop",
    "GetPresets",
    "SetPreset",
    "GotoPreset",
    "RemovePreset",
    "GotoHomePosition",
    "SetHomePosition",
];

const NODE_TOKEN: &str = "PTZNode0";
const CONFIG_TOKEN: &str = "PTZConfig0";

/// ONVIF PTZ service.
pub struct PtzService {
    hardware: Arc<dyn Hardware>,
    state: Arc<PtzState>,
    config: Arc<ConfigRuntime>,
}

impl PtzService {
    pub fn new(config: Arc<ConfigRuntime>, hardware: Arc<dyn Hardware>) -> Self {
        Self {
            hardware,
            state: Arc::new(PtzState::new()),
            config,
        }
    }

    /// Shared state handle for tests and diagnostics.
    pub fn state(&self) -> &Arc<PtzState> {
        &self.state
    }

    fn default_move_timeout(&self) -> Duration {
        let secs = self.config.get_int("onvif", "ptz_move_timeout").unwrap_or(10);
        Duration::from_secs(secs.max(1) as u64)
    }

    // ========================================================================
    // Nodes and configurations
    // ========================================================================

    fn write_node(out: &mut String) {
        out.push_str(&format!(
            "<tptz:PTZNode token=\"{NODE_TOKEN}\" FixedHomePosition=\"false\">\
             <tt:Name>{NODE_TOKEN}</tt:Name>\
             <tt:SupportedPTZSpaces>\
             <tt:AbsolutePanTiltPositionSpace>\
             <tt:URI>http://www.onvif.org/ver10/tptz/PanTiltSpaces/PositionGenericSpace</tt:URI>\
             <tt:XRange><tt:Min>-1.0</tt:Min><tt:Max>1.0</tt:Max></tt:XRange>\
             <tt:YRange><tt:Min>-1.0</tt:Min><tt:Max>1.0</tt:Max></tt:YRange>\
             </tt:AbsolutePanTiltPositionSpace>\
             <tt:AbsoluteZoomPositionSpace>\
             <tt:URI>http://www.onvif.org/ver10/tptz/ZoomSpaces/PositionGenericSpace</tt:URI>\
             <tt:XRange><tt:Min>0.0</tt:Min><tt:Max>1.0</tt:Max></tt:XRange>\
             </tt:AbsoluteZoomPositionSpace>\
             <tt:ContinuousPanTiltVelocitySpace>\
             <tt:URI>http://www.onvif.org/ver10/tptz/PanTiltSpaces/VelocityGenericSpace</tt:URI>\
             <tt:XRange><tt:Min>-1.0</tt:Min><tt:Max>1.0</tt:Max></tt:XRange>\
             <tt:YRange><tt:Min>-1.0</tt:Min><tt:Max>1.0</tt:Max></tt:YRange>\
             </tt:ContinuousPanTiltVelocitySpace>\
             </tt:SupportedPTZSpaces>\
             <tt:MaximumNumberOfPresets>{MAX_PRESETS}</tt:MaximumNumberOfPresets>\
             <tt:HomeSupported>true</tt:HomeSupported>\
             </tptz:PTZNode>"
        ));
    }

    fn get_nodes(&self, out: &mut String) -> OnvifResult<()> {
        out.push_str("<tptz:GetNodesResponse>");
        Self::write_node(out);
        out.push_str("</tptz:GetNodesResponse>");
        Ok(())
    }

    fn get_node(&self, payload: &XmlElement, out: &mut String) -> OnvifResult<()> {
        let token = payload
            .child_text("NodeToken")
            .ok_or_else(|| OnvifError::missing_arg("NodeToken"))?;
        if token != NODE_TOKEN {
            return Err(OnvifError::NotFound(format!("PTZ node '{}'", token)));
        }

        out.push_str("<tptz:GetNodeResponse>");
        Self::write_node(out);
        out.push_str("</tptz:GetNodeResponse>");
        Ok(())
    }

    fn write_configuration(&self, out: &mut String) {
        let timeout = self.default_move_timeout().as_secs();
        out.push_str(&format!(
            "<tptz:PTZConfiguration token=\"{CONFIG_TOKEN}\">\
             <tt:Name>{CONFIG_TOKEN}</tt:Name><tt:UseCount>1</tt:UseCount>\
             <tt:NodeToken>{NODE_TOKEN}</tt:NodeToken>\
             <tt:DefaultPTZSpeed>\
             <tt:PanTilt x=\"{pan}\" y=\"{tilt}\"/><tt:Zoom x=\"{zoom}\"/>\
             </tt:DefaultPTZSpeed>\
             <tt:DefaultPTZTimeout>PT{timeout}S</tt:DefaultPTZTimeout>\
             </tptz:PTZConfiguration>",
            pan = PtzSpeed::DEFAULT.pan,
            tilt = PtzSpeed::DEFAULT.tilt,
            zoom = PtzSpeed::DEFAULT.zoom,
            timeout = timeout,
        ));
    }

    fn get_configurations(&self, out: &mut String) -> OnvifResult<()> {
        out.push_str("<tptz:GetConfigurationsResponse>");
        self.write_configuration(out);
        out.push_str("</tptz:GetConfigurationsResponse>");
        Ok(())
    }

    fn get_configuration(&self, payload: &XmlElement, out: &mut String) -> OnvifResult<()> {
        let token = payload
            .child_text("PTZConfigurationToken")
            .ok_or_else(|| OnvifError::missing_arg("PTZConfigurationToken"))?;
        if token != CONFIG_TOKEN {
            return Err(OnvifError::NotFound(format!("PTZ configuration '{}'", token)));
        }

        out.push_str("<tptz:GetConfigurationResponse>");
        self.write_configuration(out);
        out.push_str("</tptz:GetConfigurationResponse>");
        Ok(())
    }

    fn get_status(&self, payload: &XmlElement, out: &mut String) -> OnvifResult<()> {
        require_profile_token(payload)?;
        let position = self.state.position();
        let move_status = if self.state.is_moving() { "MOVING" } else { "IDLE" };

        out.push_str(&format!(
            "<tptz:GetStatusResponse><tptz:PTZStatus>\
             <tt:Position><tt:PanTilt x=\"{pan}\" y=\"{tilt}\"/><tt:Zoom x=\"{zoom}\"/></tt:Position>\
             <tt:MoveStatus><tt:PanTilt>{status}</tt:PanTilt><tt:Zoom>{status}</tt:Zoom></tt:MoveStatus>\
             <tt:UtcTime>{utc}</tt:UtcTime>\
             </tptz:PTZStatus></tptz:GetStatusResponse>",
            pan = position.pan,
            tilt = position.tilt,
            zoom = position.zoom,
            status = move_status,
            utc = Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
        ));
        Ok(())
    }

    // ========================================================================
    // Movement
    // ========================================================================

    async fn absolute_move(&self, payload: &XmlElement, out: &mut String) -> OnvifResult<()> {
        require_profile_token(payload)?;
        let position = parse_position(
            payload
                .child("Position")
                .ok_or_else(|| OnvifError::missing_arg("Position"))?,
            self.state.position(),
        )?;
        validate_position(&position)?;
        let speed = parse_speed(payload.child("Speed"))?;

        self.hardware.ptz_absolute_move(position, speed).await?;
        self.state.set_position(position);

        out.push_str("<tptz:AbsoluteMoveResponse/>");
        Ok(())
    }

    async fn relative_move(&self, payload: &XmlElement, out: &mut String) -> OnvifResult<()> {
        require_profile_token(payload)?;
        let delta = parse_position(
            payload
                .child("Translation")
                .ok_or_else(|| OnvifError::missing_arg("Translation"))?,
            PtzPosition::default(),
        )?;
        let speed = parse_speed(payload.child("Speed"))?;

        self.hardware.ptz_relative_move(delta, speed).await?;

        let current = self.state.position();
        self.state.set_position(PtzPosition {
            pan: (current.pan + delta.pan).clamp(-1.0, 1.0),
            tilt: (current.tilt + delta.tilt).clamp(-1.0, 1.0),
            zoom: (current.zoom + delta.zoom).clamp(0.0, 1.0),
        });

        out.push_str("<tptz:RelativeMoveResponse/>");
        Ok(())
    }

    async fn continuous_move(&self, payload: &XmlElement, out: &mut String) -> OnvifResult<()> {
        require_profile_token(payload)?;
        let velocity = parse_velocity(
            payload
                .child("Velocity")
                .ok_or_else(|| OnvifError::missing_arg("Velocity"))?,
        )?;

        let timeout = match payload.child_text("Timeout") {
            Some(text) => parse_iso_duration(text).ok_or_else(|| {
                OnvifError::invalid_arg("InvalidArgVal", format!("bad Timeout '{}'", text))
            })?,
            None => self.default_move_timeout(),
        };

        self.hardware.ptz_continuous_move(velocity).await?;
        self.state.set_moving(true);

        // Unattended continuous moves stop themselves after the timeout.
        let hardware = Arc::clone(&self.hardware);
        let state = Arc::clone(&self.state);
        let watchdog = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Err(e) = hardware.ptz_stop().await {
                tracing::warn!("[PTZ::ContinuousMove] watchdog stop failed: {}", e);
            }
            state.set_moving(false);
        });
        self.state.install_watchdog(watchdog);

        out.push_str("<tptz:ContinuousMoveResponse/>");
        Ok(())
    }

    async fn stop(&self, payload: &XmlElement, out: &mut String) -> OnvifResult<()> {
        require_profile_token(payload)?;

        self.state.clear_watchdog();
        self.hardware.ptz_stop().await?;
        self.state.set_moving(false);

        out.push_str("<tptz:StopResponse/>");
        Ok(())
    }

    // ========================================================================
    // Presets and home
    // ========================================================================

    fn get_presets(&self, payload: &XmlElement, out: &mut String) -> OnvifResult<()> {
        require_profile_token(payload)?;

        out.push_str("<tptz:GetPresetsResponse>");
        for preset in self.state.presets() {
            let position = preset.position;
            out.push_str(&format!(
                "<tptz:Preset token=\"{}\"><tt:Name>{}</tt:Name>\
                 <tt:PTZPosition><tt:PanTilt x=\"{}\" y=\"{}\"/><tt:Zoom x=\"{}\"/></tt:PTZPosition>\
                 </tptz:Preset>",
                preset.token,
                xml_escape(&preset.name),
                position.pan,
                position.tilt,
                position.zoom,
            ));
        }
        out.push_str("</tptz:GetPresetsResponse>");
        Ok(())
    }

    async fn set_preset(&self, payload: &XmlElement, out: &mut String) -> OnvifResult<()> {
        require_profile_token(payload)?;
        let token = payload.child_text("PresetToken").filter(|t| !t.is_empty());
        let name = payload.child_text("PresetName").filter(|n| !n.is_empty());

        let preset = self
            .state
            .set_preset(token, name, self.state.position())?;
        self.hardware.ptz_set_preset(preset.slot).await?;

        out.push_str(&format!(
            "<tptz:SetPresetResponse><tptz:PresetToken>{}</tptz:PresetToken></tptz:SetPresetResponse>",
            preset.token
        ));
        Ok(())
    }

    async fn goto_preset(&self, payload: &XmlElement, out: &mut String) -> OnvifResult<()> {
        require_profile_token(payload)?;
        let token = payload
            .child_text("PresetToken")
            .ok_or_else(|| OnvifError::missing_arg("PresetToken"))?;
        let preset = self
            .state
            .preset(token)
            .ok_or_else(|| OnvifError::NotFound(format!("preset '{}'", token)))?;
        let speed = parse_speed(payload.child("Speed"))?;

        self.hardware.ptz_goto_preset(preset.slot).await?;
        self.hardware
            .ptz_absolute_move(preset.position, speed)
            .await?;
        self.state.set_position(preset.position);

        out.push_str("<tptz:GotoPresetResponse/>");
        Ok(())
    }

    async fn remove_preset(&self, payload: &XmlElement, out: &mut String) -> OnvifResult<()> {
        require_profile_token(payload)?;
        let token = payload
            .child_text("PresetToken")
            .ok_or_else(|| OnvifError::missing_arg("PresetToken"))?;

        let preset = self.state.remove_preset(token)?;
        self.hardware.ptz_remove_preset(preset.slot).await?;

        out.push_str("<tptz:RemovePresetResponse/>");
        Ok(())
    }

    async fn goto_home_position(&self, payload: &XmlElement, out: &mut String) -> OnvifResult<()> {
        require_profile_token(payload)?;
        let speed = parse_speed(payload.child("Speed"))?;
        let home = self.state.home_position();

        self.hardware.ptz_absolute_move(home, speed).await?;
        self.state.set_position(home);

        out.push_str("<tptz:GotoHomePositionResponse/>");
        Ok(())
    }

    fn set_home_position(&self, payload: &XmlElement, out: &mut String) -> OnvifResult<()> {
        require_profile_token(payload)?;
        self.state.set_home_position(self.state.position());
        out.push_str("<tptz:SetHomePositionResponse/>");
        Ok(())
    }
}

fn require_profile_token(payload: &XmlElement) -> OnvifResult<()> {
    payload
        .child_text("ProfileToken")
        .filter(|t| !t.is_empty())
        .map(|_| ())
        .ok_or_else(|| OnvifError::missing_arg("ProfileToken"))
}

/// Parse a PTZVector element (Position or Translation). Missing axes keep
/// the fallback's values.
fn parse_position(element: &XmlElement, fallback: PtzPosition) -> OnvifResult<PtzPosition> {
    let mut position = fallback;

    if let Some(pan_tilt) = element.child("PanTilt") {
        position.pan = pan_tilt
            .attr_parse("x")
            .ok_or_else(|| OnvifError::invalid_arg("InvalidArgVal", "PanTilt.x is not a number"))?;
        position.tilt = pan_tilt
            .attr_parse("y")
            .ok_or_else(|| OnvifError::invalid_arg("InvalidArgVal", "PanTilt.y is not a number"))?;
    }
    if let Some(zoom) = element.child("Zoom") {
        position.zoom = zoom
            .attr_parse("x")
            .ok_or_else(|| OnvifError::invalid_arg("InvalidArgVal", "Zoom.x is not a number"))?;
    }

    Ok(position)
}

fn validate_position(position: &PtzPosition) -> OnvifResult<()> {
    if !(-1.0..=1.0).contains(&position.pan) || !(-1.0..=1.0).contains(&position.tilt) {
        return Err(OnvifError::out_of_range("PanTilt", -1.0, 1.0));
    }
    if !(0.0..=1.0).contains(&position.zoom) {
        return Err(OnvifError::out_of_range("Zoom", 0.0, 1.0));
    }
    Ok(())
}

/// Parse an optional Speed element; a missing element yields the default
/// speed (0.5, 0.5, 0.0).
fn parse_speed(element: Option<&XmlElement>) -> OnvifResult<PtzSpeed> {
    let Some(element) = element else {
        return Ok(PtzSpeed::DEFAULT);
    };

    let mut speed = PtzSpeed::DEFAULT;
    if let Some(pan_tilt) = element.child("PanTilt") {
        speed.pan = pan_tilt.attr_parse("x").unwrap_or(PtzSpeed::DEFAULT.pan);
        speed.tilt = pan_tilt.attr_parse("y").unwrap_or(PtzSpeed::DEFAULT.tilt);
    }
    if let Some(zoom) = element.child("Zoom") {
        speed.zoom = zoom.attr_parse("x").unwrap_or(PtzSpeed::DEFAULT.zoom);
    }

    if speed.pan.abs() > 1.0 || speed.tilt.abs() > 1.0 || speed.zoom.abs() > 1.0 {
        return Err(OnvifError::out_of_range("Speed", -1.0, 1.0));
    }
    Ok(speed)
}

fn parse_velocity(element: &XmlElement) -> OnvifResult<PtzSpeed> {
    let mut velocity = PtzSpeed::STOP;
    if let Some(pan_tilt) = element.child("PanTilt") {
        velocity.pan = pan_tilt.attr_parse("x").unwrap_or(0.0);
        velocity.tilt = pan_tilt.attr_parse("y").unwrap_or(0.0);
    }
    if let Some(zoom) = element.child("Zoom") {
        velocity.zoom = zoom.attr_parse("x").unwrap_or(0.0);
    }

    if velocity.pan.abs() > 1.0 || velocity.tilt.abs() > 1.0 || velocity.zoom.abs() > 1.0 {
        return Err(OnvifError::out_of_range("Velocity", -1.0, 1.0));
    }
    Ok(velocity)
}

/// Parse the `PT{seconds}S` subset of xs:duration used by PTZ timeouts.
fn parse_iso_duration(text: &str) -> Option<Duration> {
    let seconds: f64 = text.strip_prefix("PT")?.strip_suffix('S')?.parse().ok()?;
    (seconds > 0.0).then(|| Duration::from_secs_f64(seconds))
}

#[async_trait]
impl ServiceHandler for PtzService {
    fn service_name(&self) -> &'static str {
        "ptz"
    }

    fn namespace(&self) -> &'static str {
        TPTZ_NS
    }

    fn operations(&self) -> &'static [&'static str] {
        OPERATIONS
    }

    fn capability(&self) -> ServiceCapability {
        ServiceCapability {
            service_name: "ptz",
            namespace: TPTZ_NS,
            xaddr_path: "/onvif/ptz_service",
            version: ONVIF_VERSION,
            flags: CapabilityFlags {
                ptz: true,
                ..Default::default()
            },
        }
    }

    async fn cleanup(&self) {
        self.state.clear_watchdog();
        let _ = self.hardware.ptz_stop().await;
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
            "GetNodes" => self.get_nodes(&mut body)?,
            "GetNode" => self.get_node(&payload, &mut body)?,
            "GetConfiguration" => self.get_configuration(&payload, &mut body)?,
            "GetConfigurations" => self.get_configurations(&mut body)?,
            "GetStatus" => self.get_status(&payload, &mut body)?,
            "AbsoluteMove" => self.absolute_move(&payload, &mut body).await?,
            "RelativeMove" => self.relative_move(&payload, &mut body).await?,
            "ContinuousMove" => self.continuous_move(&payload, &mut body).await?,
            "Stop" => self.stop(&payload, &mut body).await?,
            "GetPresets" => self.get_presets(&payload, &mut body)?,
            "SetPreset" => self.set_preset(&payload, &mut body).await?,
            "GotoPreset" => self.goto_preset(&payload, &mut body).await?,
            "RemovePreset" => self.remove_preset(&payload, &mut body).await?,
            "GotoHomePosition" => self.goto_home_position(&payload, &mut body).await?,
            "SetHomePosition" => self.set_home_position(&payload, &mut body)?,
            other => return Err(OnvifError::ActionNotSupported(other.to_string())),
        }

        ctx.generate_response_with(|out| out.push_str(&body));
        Ok(())
    }
}
