//! Device service operation handlers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use chrono::{Datelike, Timelike, Utc};

use crate::config::{ConfigRuntime, PersistenceHandle, parse_toml, render_toml};
use crate::net::external_ip;
use crate::onvif::capabilities::{
    CapabilityFlags, CapabilitySnapshot, ONVIF_VERSION, ServiceCapability,
};
use crate::onvif::context::SoapContext;
use crate::onvif::dispatcher::{DispatchContext, ServiceHandler};
use crate::onvif::error::{OnvifError, OnvifResult};
use crate::onvif::soap::{TDS_NS, XmlElement, xml_escape};
use crate::platform::Hardware;
use crate::users::{User, UserError, UserLevel, UserStore};

/// Seconds between SystemReboot's reply and the platform reboot.
const REBOOT_DELAY: Duration = Duration::from_secs(2);

/// Operations accepted by the Device service.
pub const OPERATIONS: &[&str] = &[
    "GetDeviceInformation",
    "GetCapabilities",
    "GetSystemDateAndTime",
    "SetSystemDateAndTime",
    "GetServices",
    "GetDNS",
    "GetHostname",
    "SetHostname",
    "GetNetworkInterfaces",
    "GetNetworkProtocols",
    "SystemReboot",
    "SetSystemFactoryDefault",
    "GetSystemBackup",
    "RestoreSystem",
    "GetUsers",
    "CreateUsers",
    "DeleteUsers",
    "SetUser",
    "GetScopes",
    "SetScopes",
    "GetDiscoveryMode",
    "SetDiscoveryMode",
];

/// ONVIF Device service.
pub struct DeviceService {
    config: Arc<ConfigRuntime>,
    hardware: Arc<dyn Hardware>,
    users: UserStore,
    persistence: PersistenceHandle,
}

impl DeviceService {
    pub fn new(
        config: Arc<ConfigRuntime>,
        hardware: Arc<dyn Hardware>,
        persistence: PersistenceHandle,
    ) -> Self {
        let users = UserStore::new(Arc::clone(&config), persistence.clone());
        Self {
            config,
            hardware,
            users,
            persistence,
        }
    }

    fn base_url(&self) -> String {
        let port = self.config.get_int("onvif", "http_port").unwrap_or(8080);
        format!("http://{}:{}", external_ip(&self.config), port)
    }

    // ========================================================================
    // Information and capabilities
    // ========================================================================

    fn get_device_information(&self, out: &mut String) -> OnvifResult<()> {
        let get = |key: &str| self.config.get_str("device", key).unwrap_or_default();

        out.push_str(&format!(
            "<tds:GetDeviceInformationResponse>\
             <tds:Manufacturer>{}</tds:Manufacturer>\
             <tds:Model>{}</tds:Model>\
             <tds:FirmwareVersion>{}</tds:FirmwareVersion>\
             <tds:SerialNumber>{}</tds:SerialNumber>\
             <tds:HardwareId>{}</tds:HardwareId>\
             </tds:GetDeviceInformationResponse>",
            xml_escape(&get("manufacturer")),
            xml_escape(&get("model")),
            xml_escape(&get("firmware_version")),
            xml_escape(&get("serial_number")),
            xml_escape(&get("hardware_id")),
        ));
        Ok(())
    }

    /// Aggregate capabilities across the registry snapshot. Sections are
    /// selected by the services' capability flags, not by hard-coded names.
    fn get_capabilities(
        &self,
        snapshot: &CapabilitySnapshot,
        out: &mut String,
    ) -> OnvifResult<()> {
        let base = self.base_url();
        out.push_str("<tds:GetCapabilitiesResponse><tds:Capabilities>");

        if let Some(device) = snapshot.services.iter().find(|s| s.flags.device) {
            out.push_str(&format!(
                "<tt:Device><tt:XAddr>{}</tt:XAddr>\
                 <tt:Network><tt:IPFilter>false</tt:IPFilter><tt:ZeroConfiguration>false</tt:ZeroConfiguration>\
                 <tt:IPVersion6>false</tt:IPVersion6><tt:DynDNS>false</tt:DynDNS></tt:Network>\
                 <tt:System><tt:DiscoveryResolve>false</tt:DiscoveryResolve><tt:DiscoveryBye>true</tt:DiscoveryBye>\
                 <tt:RemoteDiscovery>false</tt:RemoteDiscovery><tt:SystemBackup>true</tt:SystemBackup>\
                 <tt:SystemLogging>false</tt:SystemLogging><tt:FirmwareUpgrade>false</tt:FirmwareUpgrade>\
                 <tt:SupportedVersions><tt:Major>{}</tt:Major><tt:Minor>{}</tt:Minor></tt:SupportedVersions>\
                 </tt:System></tt:Device>",
                device.xaddr(&base),
                device.version.major,
                device.version.minor,
            ));
        }

        if let Some(media) = snapshot.services.iter().find(|s| s.flags.media) {
            out.push_str(&format!(
                "<tt:Media><tt:XAddr>{}</tt:XAddr>\
                 <tt:StreamingCapabilities><tt:RTPMulticast>false</tt:RTPMulticast>\
                 <tt:RTP_TCP>true</tt:RTP_TCP><tt:RTP_RTSP_TCP>true</tt:RTP_RTSP_TCP>\
                 </tt:StreamingCapabilities></tt:Media>",
                media.xaddr(&base),
            ));
        }

        if let Some(imaging) = snapshot.services.iter().find(|s| s.flags.imaging) {
            out.push_str(&format!(
                "<tt:Imaging><tt:XAddr>{}</tt:XAddr></tt:Imaging>",
                imaging.xaddr(&base),
            ));
        }

        if let Some(ptz) = snapshot.services.iter().find(|s| s.flags.ptz) {
            out.push_str(&format!(
                "<tt:PTZ><tt:XAddr>{}</tt:XAddr></tt:PTZ>",
                ptz.xaddr(&base),
            ));
        }

        out.push_str("</tds:Capabilities></tds:GetCapabilitiesResponse>");
        Ok(())
    }

    fn get_services(
        &self,
        snapshot: &CapabilitySnapshot,
        out: &mut String,
    ) -> OnvifResult<()> {
        let base = self.base_url();
        out.push_str("<tds:GetServicesResponse>");
        for service in &snapshot.services {
            out.push_str(&format!(
                "<tds:Service><tds:Namespace>{}</tds:Namespace><tds:XAddr>{}</tds:XAddr>\
                 <tds:Version><tt:Major>{}</tt:Major><tt:Minor>{}</tt:Minor></tds:Version></tds:Service>",
                service.namespace,
                service.xaddr(&base),
                service.version.major,
                service.version.minor,
            ));
        }
        out.push_str("</tds:GetServicesResponse>");
        Ok(())
    }

    // ========================================================================
    // Date and time
    // ========================================================================

    fn get_system_date_and_time(&self, out: &mut String) -> OnvifResult<()> {
        let now = Utc::now();
        let datetime_type = self
            .config
            .get_str("device", "datetime_type")
            .unwrap_or_else(|_| "Manual".to_string());
        let dst = self.config.get_bool("device", "daylight_savings").unwrap_or(false);
        let tz = self
            .config
            .get_str("device", "timezone")
            .unwrap_or_else(|_| "UTC".to_string());

        out.push_str(&format!(
            "<tds:GetSystemDateAndTimeResponse><tds:SystemDateAndTime>\
             <tt:DateTimeType>{}</tt:DateTimeType>\
             <tt:DaylightSavings>{}</tt:DaylightSavings>\
             <tt:TimeZone><tt:TZ>{}</tt:TZ></tt:TimeZone>\
             <tt:UTCDateTime>\
             <tt:Time><tt:Hour>{}</tt:Hour><tt:Minute>{}</tt:Minute><tt:Second>{}</tt:Second></tt:Time>\
             <tt:Date><tt:Year>{}</tt:Year><tt:Month>{}</tt:Month><tt:Day>{}</tt:Day></tt:Date>\
             </tt:UTCDateTime>\
             </tds:SystemDateAndTime></tds:GetSystemDateAndTimeResponse>",
            datetime_type,
            dst,
            xml_escape(&tz),
            now.hour(),
            now.minute(),
            now.second(),
            now.year(),
            now.month(),
            now.day(),
        ));
        Ok(())
    }

    fn set_system_date_and_time(
        &self,
        payload: &XmlElement,
        out: &mut String,
    ) -> OnvifResult<()> {
        let datetime_type = payload
            .child_text("DateTimeType")
            .ok_or_else(|| OnvifError::missing_arg("DateTimeType"))?;
        if datetime_type != "Manual" && datetime_type != "NTP" {
            return Err(OnvifError::invalid_arg(
                "InvalidDateTime",
                format!("unknown DateTimeType '{}'", datetime_type),
            ));
        }

        let dst = payload
            .child_text("DaylightSavings")
            .map(|v| v == "true")
            .unwrap_or(false);

        if datetime_type == "Manual" {
            let utc = payload
                .child("UTCDateTime")
                .ok_or_else(|| OnvifError::missing_arg("UTCDateTime"))?;
            validate_utc_date_time(utc)?;
            // The platform has no clock facade op; the validated value is
            // acknowledged and the zone settings are stored.
        }

        if let Some(tz) = payload.child("TimeZone").and_then(|t| t.child_text("TZ")) {
            self.config.set_str("device", "timezone", tz)?;
        }
        self.config.set_str("device", "datetime_type", datetime_type)?;
        self.config.set_bool("device", "daylight_savings", dst)?;
        self.persistence.mark_dirty("device", "datetime_type");

        out.push_str("<tds:SetSystemDateAndTimeResponse/>");
        Ok(())
    }

    // ========================================================================
    // Network
    // ========================================================================

    fn get_dns(&self, out: &mut String) -> OnvifResult<()> {
        let dns = self.config.get_str("network", "dns_server").unwrap_or_default();
        out.push_str("<tds:GetDNSResponse><tds:DNSInformation><tt:FromDHCP>false</tt:FromDHCP>");
        if !dns.is_empty() {
            out.push_str(&format!(
                "<tt:DNSManual><tt:Type>IPv4</tt:Type><tt:IPv4Address>{}</tt:IPv4Address></tt:DNSManual>",
                xml_escape(&dns)
            ));
        }
        out.push_str("</tds:DNSInformation></tds:GetDNSResponse>");
        Ok(())
    }

    fn get_hostname(&self, out: &mut String) -> OnvifResult<()> {
        let hostname = self
            .config
            .get_str("network", "hostname")
            .unwrap_or_else(|_| "onvif-camera".to_string());
        out.push_str(&format!(
            "<tds:GetHostnameResponse><tds:HostnameInformation>\
             <tt:FromDHCP>false</tt:FromDHCP><tt:Name>{}</tt:Name>\
             </tds:HostnameInformation></tds:GetHostnameResponse>",
            xml_escape(&hostname)
        ));
        Ok(())
    }

    fn set_hostname(&self, payload: &XmlElement, out: &mut String) -> OnvifResult<()> {
        let name = payload
            .child_text("Name")
            .ok_or_else(|| OnvifError::missing_arg("Name"))?;

        if name.is_empty()
            || name.len() > 63
            || !name
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-')
            || name.starts_with('-')
            || name.ends_with('-')
        {
            return Err(OnvifError::invalid_arg(
                "InvalidHostname",
                format!("'{}' is not a valid hostname", name),
            ));
        }

        self.config.set_str("network", "hostname", name)?;
        self.persistence.mark_dirty("network", "hostname");
        out.push_str("<tds:SetHostnameResponse/>");
        Ok(())
    }

    fn get_network_interfaces(&self, out: &mut String) -> OnvifResult<()> {
        let interface = self
            .config
            .get_str("network", "interface")
            .unwrap_or_else(|_| "eth0".to_string());
        let mac = self.config.get_str("network", "mac_address").unwrap_or_default();
        let mtu = self.config.get_int("network", "mtu").unwrap_or(1500);
        let ip = external_ip(&self.config);

        out.push_str(&format!(
            "<tds:GetNetworkInterfacesResponse>\
             <tds:NetworkInterfaces token=\"{iface}\">\
             <tt:Enabled>true</tt:Enabled>\
             <tt:Info><tt:Name>{iface}</tt:Name><tt:HwAddress>{mac}</tt:HwAddress><tt:MTU>{mtu}</tt:MTU></tt:Info>\
             <tt:IPv4><tt:Enabled>true</tt:Enabled><tt:Config>\
             <tt:Manual><tt:Address>{ip}</tt:Address><tt:PrefixLength>24</tt:PrefixLength></tt:Manual>\
             <tt:DHCP>false</tt:DHCP>\
             </tt:Config></tt:IPv4>\
             </tds:NetworkInterfaces>\
             </tds:GetNetworkInterfacesResponse>",
            iface = xml_escape(&interface),
            mac = xml_escape(&mac),
            mtu = mtu,
            ip = ip,
        ));
        Ok(())
    }

    fn get_network_protocols(&self, out: &mut String) -> OnvifResult<()> {
        let http_port = self.config.get_int("onvif", "http_port").unwrap_or(8080);
        let rtsp_port = self.config.get_int("onvif", "rtsp_port").unwrap_or(554);

        out.push_str(&format!(
            "<tds:GetNetworkProtocolsResponse>\
             <tds:NetworkProtocols><tt:Name>HTTP</tt:Name><tt:Enabled>true</tt:Enabled><tt:Port>{}</tt:Port></tds:NetworkProtocols>\
             <tds:NetworkProtocols><tt:Name>RTSP</tt:Name><tt:Enabled>true</tt:Enabled><tt:Port>{}</tt:Port></tds:NetworkProtocols>\
             </tds:GetNetworkProtocolsResponse>",
            http_port, rtsp_port,
        ));
        Ok(())
    }

    // ========================================================================
    // System management
    // ========================================================================

    async fn system_reboot(&self, out: &mut String) -> OnvifResult<()> {
        self.hardware.schedule_reboot(REBOOT_DELAY).await?;
        out.push_str(&format!(
            "<tds:SystemRebootResponse><tds:Message>Rebooting in {} seconds</tds:Message></tds:SystemRebootResponse>",
            REBOOT_DELAY.as_secs()
        ));
        Ok(())
    }

    fn set_system_factory_default(
        &self,
        payload: &XmlElement,
        out: &mut String,
    ) -> OnvifResult<()> {
        let mode = payload
            .child_text("FactoryDefault")
            .ok_or_else(|| OnvifError::missing_arg("FactoryDefault"))?;

        let mut sections: Vec<String> = vec![
            "device".to_string(),
            "onvif".to_string(),
            "imaging".to_string(),
            "auto_daynight".to_string(),
        ];
        for n in 1..=4 {
            sections.push(format!("stream_profile_{}", n));
        }

        match mode {
            "Soft" => {}
            "Hard" => {
                sections.push("network".to_string());
                for n in 1..=8 {
                    sections.push(format!("user_{}", n));
                }
            }
            other => {
                return Err(OnvifError::invalid_arg(
                    "InvalidArgVal",
                    format!("unknown FactoryDefault mode '{}'", other),
                ));
            }
        }

        for section in &sections {
            self.config.reset_section(section);
        }
        self.persistence.mark_dirty("device", "manufacturer");
        tracing::info!(mode = mode, "factory defaults restored");

        out.push_str("<tds:SetSystemFactoryDefaultResponse/>");
        Ok(())
    }

    fn get_system_backup(&self, out: &mut String) -> OnvifResult<()> {
        let snapshot = self.config.snapshot();
        let values = snapshot
            .entries()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let toml_text = render_toml(&values);
        let encoded = base64::engine::general_purpose::STANDARD.encode(toml_text);

        out.push_str(&format!(
            "<tds:GetSystemBackupResponse><tds:BackupFiles>\
             <tt:Name>config.toml</tt:Name><tt:Data>{}</tt:Data>\
             </tds:BackupFiles></tds:GetSystemBackupResponse>",
            encoded
        ));
        Ok(())
    }

    fn restore_system(&self, payload: &XmlElement, out: &mut String) -> OnvifResult<()> {
        let data = payload
            .descendant("Data")
            .map(|d| d.text_trim().to_string())
            .filter(|d| !d.is_empty())
            .ok_or_else(|| OnvifError::missing_arg("BackupFiles.Data"))?;

        let decoded = base64::engine::general_purpose::STANDARD
            .decode(data.as_bytes())
            .map_err(|_| {
                OnvifError::invalid_arg("InvalidBackup", "backup data is not valid base64")
            })?;
        let text = String::from_utf8(decoded).map_err(|_| {
            OnvifError::invalid_arg("InvalidBackup", "backup data is not UTF-8")
        })?;
        let values = parse_toml(&text).map_err(|e| {
            OnvifError::invalid_arg("InvalidBackup", format!("backup is not valid TOML: {}", e))
        })?;

        self.config.replace_all(values);
        self.persistence.mark_dirty("device", "manufacturer");
        tracing::info!("system configuration restored from backup");

        out.push_str("<tds:RestoreSystemResponse/>");
        Ok(())
    }

    // ========================================================================
    // Users
    // ========================================================================

    fn get_users(&self, out: &mut String) -> OnvifResult<()> {
        out.push_str("<tds:GetUsersResponse>");
        for user in self.users.list() {
            out.push_str(&format!(
                "<tds:User><tt:Username>{}</tt:Username><tt:UserLevel>{}</tt:UserLevel></tds:User>",
                xml_escape(&user.username),
                user.level.as_str(),
            ));
        }
        out.push_str("</tds:GetUsersResponse>");
        Ok(())
    }

    fn create_users(&self, payload: &XmlElement, out: &mut String) -> OnvifResult<()> {
        let users = parse_user_list(payload)?;
        if users.is_empty() {
            return Err(OnvifError::missing_arg("User"));
        }

        for user in &users {
            self.users.create(user).map_err(user_error_to_fault)?;
        }
        out.push_str("<tds:CreateUsersResponse/>");
        Ok(())
    }

    fn delete_users(&self, payload: &XmlElement, out: &mut String) -> OnvifResult<()> {
        let usernames: Vec<&str> = payload
            .children_named("Username")
            .map(|u| u.text_trim())
            .collect();
        if usernames.is_empty() {
            return Err(OnvifError::missing_arg("Username"));
        }

        for username in usernames {
            self.users.delete(username).map_err(user_error_to_fault)?;
        }
        out.push_str("<tds:DeleteUsersResponse/>");
        Ok(())
    }

    fn set_user(&self, payload: &XmlElement, out: &mut String) -> OnvifResult<()> {
        let users = parse_user_list(payload)?;
        if users.is_empty() {
            return Err(OnvifError::missing_arg("User"));
        }

        for user in &users {
            self.users.update(user).map_err(user_error_to_fault)?;
        }
        out.push_str("<tds:SetUserResponse/>");
        Ok(())
    }

    // ========================================================================
    // Scopes and discovery
    // ========================================================================

    fn get_scopes(&self, out: &mut String) -> OnvifResult<()> {
        let name = self
            .config
            .get_str("onvif", "scope_name")
            .unwrap_or_default();
        let location = self
            .config
            .get_str("onvif", "scope_location")
            .unwrap_or_default();

        out.push_str("<tds:GetScopesResponse>");
        for item in [
            "onvif://www.onvif.org/type/video_encoder",
            "onvif://www.onvif.org/type/ptz",
            "onvif://www.onvif.org/Profile/Streaming",
        ] {
            out.push_str(&format!(
                "<tds:Scopes><tt:ScopeDef>Fixed</tt:ScopeDef><tt:ScopeItem>{}</tt:ScopeItem></tds:Scopes>",
                item
            ));
        }
        out.push_str(&format!(
            "<tds:Scopes><tt:ScopeDef>Configurable</tt:ScopeDef><tt:ScopeItem>onvif://www.onvif.org/name/{}</tt:ScopeItem></tds:Scopes>\
             <tds:Scopes><tt:ScopeDef>Configurable</tt:ScopeDef><tt:ScopeItem>onvif://www.onvif.org/location/{}</tt:ScopeItem></tds:Scopes>",
            xml_escape(&name),
            xml_escape(&location),
        ));
        out.push_str("</tds:GetScopesResponse>");
        Ok(())
    }

    fn set_scopes(&self, payload: &XmlElement, out: &mut String) -> OnvifResult<()> {
        let scopes: Vec<&str> = payload
            .children_named("Scopes")
            .map(|s| s.text_trim())
            .filter(|s| !s.is_empty())
            .collect();
        if scopes.is_empty() {
            return Err(OnvifError::missing_arg("Scopes"));
        }

        for scope in scopes {
            if let Some(name) = scope.strip_prefix("onvif://www.onvif.org/name/") {
                self.config.set_str("onvif", "scope_name", name)?;
                self.persistence.mark_dirty("onvif", "scope_name");
            } else if let Some(location) = scope.strip_prefix("onvif://www.onvif.org/location/") {
                self.config.set_str("onvif", "scope_location", location)?;
                self.persistence.mark_dirty("onvif", "scope_location");
            } else if !scope.starts_with("onvif://") {
                return Err(OnvifError::invalid_arg(
                    "InvalidScope",
                    format!("'{}' is not an onvif scope URI", scope),
                ));
            }
        }

        out.push_str("<tds:SetScopesResponse/>");
        Ok(())
    }

    fn get_discovery_mode(&self, out: &mut String) -> OnvifResult<()> {
        let mode = self
            .config
            .get_str("onvif", "discovery_mode")
            .unwrap_or_else(|_| "Discoverable".to_string());
        out.push_str(&format!(
            "<tds:GetDiscoveryModeResponse><tds:DiscoveryMode>{}</tds:DiscoveryMode></tds:GetDiscoveryModeResponse>",
            mode
        ));
        Ok(())
    }

    fn set_discovery_mode(&self, payload: &XmlElement, out: &mut String) -> OnvifResult<()> {
        let mode = payload
            .child_text("DiscoveryMode")
            .ok_or_else(|| OnvifError::missing_arg("DiscoveryMode"))?;
        if mode != "Discoverable" && mode != "NonDiscoverable" {
            return Err(OnvifError::invalid_arg(
                "InvalidArgVal",
                format!("unknown discovery mode '{}'", mode),
            ));
        }

        self.config.set_str("onvif", "discovery_mode", mode)?;
        self.persistence.mark_dirty("onvif", "discovery_mode");
        out.push_str("<tds:SetDiscoveryModeResponse/>");
        Ok(())
    }
}

fn validate_utc_date_time(utc: &XmlElement) -> OnvifResult<()> {
    let time = utc
        .child("Time")
        .ok_or_else(|| OnvifError::missing_arg("UTCDateTime.Time"))?;
    let date = utc
        .child("Date")
        .ok_or_else(|| OnvifError::missing_arg("UTCDateTime.Date"))?;

    let hour: u32 = time
        .child_parse("Hour")
        .ok_or_else(|| OnvifError::missing_arg("Hour"))?;
    let minute: u32 = time
        .child_parse("Minute")
        .ok_or_else(|| OnvifError::missing_arg("Minute"))?;
    let second: u32 = time
        .child_parse("Second")
        .ok_or_else(|| OnvifError::missing_arg("Second"))?;
    let year: i32 = date
        .child_parse("Year")
        .ok_or_else(|| OnvifError::missing_arg("Year"))?;
    let month: u32 = date
        .child_parse("Month")
        .ok_or_else(|| OnvifError::missing_arg("Month"))?;
    let day: u32 = date
        .child_parse("Day")
        .ok_or_else(|| OnvifError::missing_arg("Day"))?;

    let valid = chrono::NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(hour, minute, second))
        .is_some();
    if !valid {
        return Err(OnvifError::invalid_arg(
            "InvalidDateTime",
            "UTCDateTime fields do not form a valid instant",
        ));
    }
    Ok(())
}

fn parse_user_list(payload: &XmlElement) -> OnvifResult<Vec<User>> {
    let mut users = Vec::new();
    for element in payload.children_named("User") {
        let username = element
            .child_text("Username")
            .ok_or_else(|| OnvifError::missing_arg("Username"))?;
        let password = element.child_text("Password").unwrap_or_default();
        let level = element
            .child_text("UserLevel")
            .and_then(UserLevel::parse)
            .ok_or_else(|| OnvifError::missing_arg("UserLevel"))?;

        users.push(User {
            username: username.to_string(),
            password: password.to_string(),
            level,
        });
    }
    Ok(users)
}

fn user_error_to_fault(err: UserError) -> OnvifError {
    match err {
        UserError::NotFound(name) => OnvifError::NotFound(format!("user '{}'", name)),
        UserError::AlreadyExists(name) => {
            OnvifError::invalid_arg("UsernameClash", format!("user '{}' already exists", name))
        }
        UserError::TableFull => {
            OnvifError::invalid_arg("TooManyUsers", "maximum number of users reached")
        }
        UserError::InvalidUsername(msg) => OnvifError::invalid_arg("InvalidArgVal", msg),
    }
}

#[async_trait]
impl ServiceHandler for DeviceService {
    fn service_name(&self) -> &'static str {
        "device"
    }

    fn namespace(&self) -> &'static str {
        TDS_NS
    }

    fn operations(&self) -> &'static [&'static str] {
        OPERATIONS
    }

    fn capability(&self) -> ServiceCapability {
        ServiceCapability {
            service_name: "device",
            namespace: TDS_NS,
            xaddr_path: "/onvif/device_service",
            version: ONVIF_VERSION,
            flags: CapabilityFlags {
                device: true,
                ..Default::default()
            },
        }
    }

    async fn handle_operation(
        &self,
        operation: &str,
        ctx: &mut SoapContext,
        dispatch: &DispatchContext,
    ) -> OnvifResult<()> {
        let payload = ctx.payload().clone();
        let mut body = String::new();

        match operation {
            "GetDeviceInformation" => self.get_device_information(&mut body)?,
            "GetCapabilities" => self.get_capabilities(&dispatch.capabilities, &mut body)?,
            "GetSystemDateAndTime" => self.get_system_date_and_time(&mut body)?,
            "SetSystemDateAndTime" => self.set_system_date_and_time(&payload, &mut body)?,
            "GetServices" => self.get_services(&dispatch.capabilities, &mut body)?,
            "GetDNS" => self.get_dns(&mut body)?,
            "GetHostname" => self.get_hostname(&mut body)?,
            "SetHostname" => self.set_hostname(&payload, &mut body)?,
            "GetNetworkInterfaces" => self.get_network_interfaces(&mut body)?,
            "GetNetworkProtocols" => self.get_network_protocols(&mut body)?,
            "SystemReboot" => self.system_reboot(&mut body).await?,
            "SetSystemFactoryDefault" => self.set_system_factory_default(&payload, &mut body)?,
            "GetSystemBackup" => self.get_system_backup(&mut body)?,
            "RestoreSystem" => self.restore_system(&payload, &mut body)?,
            "GetUsers" => self.get_users(&mut body)?,
            "CreateUsers" => self.create_users(&payload, &mut body)?,
            "DeleteUsers" => self.delete_users(&payload, &mut body)?,
            "SetUser" => self.set_user(&payload, &mut body)?,
            "GetScopes" => self.get_scopes(&mut body)?,
            "SetScopes" => self.set_scopes(&payload, &mut body)?,
            "GetDiscoveryMode" => self.get_discovery_mode(&mut body)?,
            "SetDiscoveryMode" => self.set_discovery_mode(&payload, &mut body)?,
            other => return Err(OnvifError::ActionNotSupported(other.to_string())),
        }

        ctx.generate_response_with(|out| out.push_str(&body));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PersistenceHandle;
    use crate::platform::StubHardware;

    fn service() -> (DeviceService, Arc<ConfigRuntime>, Arc<StubHardware>) {
        let config = Arc::new(ConfigRuntime::with_defaults());
        let hardware = Arc::new(StubHardware::new());
        let service = DeviceService::new(
            Arc::clone(&config),
            hardware.clone() as Arc<dyn Hardware>,
            PersistenceHandle::disconnected(),
        );
        (service, config, hardware)
    }

    fn ctx(body: &str) -> SoapContext {
        let xml = format!(
            r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope"
                           xmlns:tds="http://www.onvif.org/ver10/device/wsdl"
                           xmlns:tt="http://www.onvif.org/ver10/schema">
                 <s:Body>{}</s:Body></s:Envelope>"#,
            body
        );
        SoapContext::parse(xml.as_bytes()).unwrap()
    }

    async fn run(service: &DeviceService, body: &str) -> OnvifResult<String> {
        let mut context = ctx(body);
        let operation = context.operation().to_string();
        let dispatch = DispatchContext {
            capabilities: CapabilitySnapshot {
                services: vec![service.capability()],
            },
        };
        service
            .handle_operation(&operation, &mut context, &dispatch)
            .await?;
        Ok(context.response_data().to_string())
    }

    #[tokio::test]
    async fn test_get_device_information_defaults() {
        let (service, _, _) = service();
        let response = run(&service, "<tds:GetDeviceInformation/>").await.unwrap();

        assert!(response.contains("<tds:Manufacturer>Anyka</tds:Manufacturer>"));
        assert!(response.contains("<tds:Model>AK3918 Camera</tds:Model>"));
        assert!(response.contains("<tds:FirmwareVersion>1.0.0</tds:FirmwareVersion>"));
        assert!(response.contains("<tds:SerialNumber>AK3918-001</tds:SerialNumber>"));
        assert!(response.contains("<tds:HardwareId>1.0</tds:HardwareId>"));
    }

    #[tokio::test]
    async fn test_set_then_get_hostname() {
        let (service, _, _) = service();
        run(&service, "<tds:SetHostname><tds:Name>cam-42</tds:Name></tds:SetHostname>")
            .await
            .unwrap();
        let response = run(&service, "<tds:GetHostname/>").await.unwrap();
        assert!(response.contains("<tt:Name>cam-42</tt:Name>"));
    }

    #[tokio::test]
    async fn test_set_hostname_rejects_invalid() {
        let (service, _, _) = service();
        let err = run(
            &service,
            "<tds:SetHostname><tds:Name>bad host!</tds:Name></tds:SetHostname>",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, OnvifError::InvalidArg { .. }));
    }

    #[tokio::test]
    async fn test_system_reboot_schedules() {
        let (service, _, hardware) = service();
        let response = run(&service, "<tds:SystemReboot/>").await.unwrap();
        assert!(response.contains("Rebooting in 2 seconds"));
        assert_eq!(*hardware.reboot_scheduled.lock(), Some(REBOOT_DELAY));
    }

    #[tokio::test]
    async fn test_scopes_round_trip() {
        let (service, _, _) = service();
        run(
            &service,
            "<tds:SetScopes>\
             <tds:Scopes>onvif://www.onvif.org/name/FrontDoor</tds:Scopes>\
             <tds:Scopes>onvif://www.onvif.org/location/Lobby</tds:Scopes>\
             </tds:SetScopes>",
        )
        .await
        .unwrap();

        let response = run(&service, "<tds:GetScopes/>").await.unwrap();
        assert!(response.contains("onvif://www.onvif.org/name/FrontDoor"));
        assert!(response.contains("onvif://www.onvif.org/location/Lobby"));
    }

    #[tokio::test]
    async fn test_user_lifecycle() {
        let (service, _, _) = service();
        run(
            &service,
            "<tds:CreateUsers><tds:User>\
             <tt:Username>viewer</tt:Username><tt:Password>pw</tt:Password>\
             <tt:UserLevel>User</tt:UserLevel></tds:User></tds:CreateUsers>",
        )
        .await
        .unwrap();

        let listing = run(&service, "<tds:GetUsers/>").await.unwrap();
        assert!(listing.contains("<tt:Username>viewer</tt:Username>"));

        run(
            &service,
            "<tds:DeleteUsers><tds:Username>viewer</tds:Username></tds:DeleteUsers>",
        )
        .await
        .unwrap();

        let listing = run(&service, "<tds:GetUsers/>").await.unwrap();
        assert!(!listing.contains("viewer"));
    }

    #[tokio::test]
    async fn test_delete_unknown_user_faults() {
        let (service, _, _) = service();
        let err = run(
            &service,
            "<tds:DeleteUsers><tds:Username>nobody</tds:Username></tds:DeleteUsers>",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, OnvifError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_backup_restore_round_trip() {
        let (service, config, _) = service();
        config.set_str("network", "hostname", "backup-me").unwrap();

        let backup = run(&service, "<tds:GetSystemBackup/>").await.unwrap();
        let data_start = backup.find("<tt:Data>").unwrap() + "<tt:Data>".len();
        let data_end = backup.find("</tt:Data>").unwrap();
        let blob = &backup[data_start..data_end];

        config.set_str("network", "hostname", "changed").unwrap();
        run(
            &service,
            &format!(
                "<tds:RestoreSystem><tds:BackupFiles><tt:Name>config.toml</tt:Name><tt:Data>{}</tt:Data></tds:BackupFiles></tds:RestoreSystem>",
                blob
            ),
        )
        .await
        .unwrap();

        assert_eq!(config.get_str("network", "hostname").unwrap(), "backup-me");
    }

    #[tokio::test]
    async fn test_get_capabilities_aggregates_registered_services() {
        let (service, _, _) = service();
        let response = run(&service, "<tds:GetCapabilities/>").await.unwrap();

        // Only the device service is registered in this harness.
        assert!(response.contains("<tt:Device>"));
        assert!(!response.contains("<tt:Media>"));
        assert!(response.contains("/onvif/device_service"));
    }

    #[tokio::test]
    async fn test_set_system_date_and_time_validates() {
        let (service, config, _) = service();
        run(
            &service,
            "<tds:SetSystemDateAndTime>\
             <tds:DateTimeType>Manual</tds:DateTimeType>\
             <tds:DaylightSavings>false</tds:DaylightSavings>\
             <tds:TimeZone><tt:TZ>CET-1</tt:TZ></tds:TimeZone>\
             <tds:UTCDateTime>\
             <tt:Time><tt:Hour>12</tt:Hour><tt:Minute>0</tt:Minute><tt:Second>0</tt:Second></tt:Time>\
             <tt:Date><tt:Year>2025</tt:Year><tt:Month>6</tt:Month><tt:Day>1</tt:Day></tt:Date>\
             </tds:UTCDateTime>\
             </tds:SetSystemDateAndTime>",
        )
        .await
        .unwrap();
        assert_eq!(config.get_str("device", "timezone").unwrap(), "CET-1");

        let err = run(
            &service,
            "<tds:SetSystemDateAndTime>\
             <tds:DateTimeType>Manual</tds:DateTimeType>\
             <tds:UTCDateTime>\
             <tt:Time><tt:Hour>25</tt:Hour><tt:Minute>0</tt:Minute><tt:Second>0</tt:Second></tt:Time>\
             <tt:Date><tt:Year>2025</tt:Year><tt:Month>6</tt:Month><tt:Day>1</tt:Day></tt:Date>\
             </tds:UTCDateTime>\
             </tds:SetSystemDateAndTime>",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, OnvifError::InvalidArg { .. }));
    }

    #[tokio::test]
    async fn test_discovery_mode_round_trip() {
        let (service, _, _) = service();
        run(
            &service,
            "<tds:SetDiscoveryMode><tds:DiscoveryMode>NonDiscoverable</tds:DiscoveryMode></tds:SetDiscoveryMode>",
        )
        .await
        .unwrap();
        let response = run(&service, "<tds:GetDiscoveryMode/>").await.unwrap();
        assert!(response.contains("NonDiscoverable"));
    }

    #[tokio::test]
    async fn test_unknown_operation() {
        let (service, _, _) = service();
        let err = run(&service, "<tds:GetGadgets/>").await.unwrap_err();
        assert!(matches!(err, OnvifError::ActionNotSupported(_)));
    }

    #[tokio::test]
    async fn test_factory_default_soft_keeps_network() {
        let (service, config, _) = service();
        config.set_str("network", "hostname", "keep-me").unwrap();
        config.set_str("device", "manufacturer", "Custom").unwrap();

        run(
            &service,
            "<tds:SetSystemFactoryDefault><tds:FactoryDefault>Soft</tds:FactoryDefault></tds:SetSystemFactoryDefault>",
        )
        .await
        .unwrap();

        assert_eq!(config.get_str("network", "hostname").unwrap(), "keep-me");
        assert_eq!(config.get_str("device", "manufacturer").unwrap(), "Anyka");
    }
}
