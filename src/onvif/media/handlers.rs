//! Media service operation handlers.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{ConfigRuntime, PersistenceHandle};
use crate::onvif::capabilities::{CapabilityFlags, ONVIF_VERSION, ServiceCapability};
use crate::onvif::context::SoapContext;
use crate::onvif::dispatcher::{DispatchContext, ServiceHandler};
use crate::onvif::error::{OnvifError, OnvifResult};
use crate::onvif::soap::{TRT_NS, XmlElement, xml_escape};
use crate::streaming::{StreamProtocol, Streaming};

use super::profiles::{
    AUDIO_SOURCE_TOKEN, MediaProfile, ProfileStore, VIDEO_SOURCE_TOKEN, VideoEncoderConfig,
};

/// Operations accepted by the Media service.
pub const OPERATIONS: &[&str] = &[
    "GetProfiles",
    "GetProfile",
    "CreateProfile",
    "DeleteProfile",
    "GetStreamUri",
    "GetSnapshotUri",
    "GetVideoSources",
    "GetAudioSources",
    "GetVideoEncoderConfigurations",
    "GetVideoEncoderConfiguration",
    "SetVideoEncoderConfiguration",
    "GetVideoEncoderConfigurationOptions",
    "GetMetadataConfigurations",
];

/// Resolutions offered in GetVideoEncoderConfigurationOptions.
const AVAILABLE_RESOLUTIONS: &[(i64, i64)] =
    &[(1920, 1080), (1280, 720), (640, 360), (320, 240)];

/// ONVIF Media service.
pub struct MediaService {
    profiles: ProfileStore,
    streaming: Arc<dyn Streaming>,
}

impl MediaService {
    pub fn new(
        config: Arc<ConfigRuntime>,
        streaming: Arc<dyn Streaming>,
        persistence: PersistenceHandle,
    ) -> Self {
        Self {
            profiles: ProfileStore::new(config, persistence),
            streaming,
        }
    }

    /// Direct access for tests and diagnostics.
    pub fn profile_store(&self) -> &ProfileStore {
        &self.profiles
    }

    fn require_profile(&self, token: &str) -> OnvifResult<MediaProfile> {
        self.profiles
            .get(token)
            .ok_or_else(|| OnvifError::NotFound(format!("profile '{}'", token)))
    }

    fn write_profile(&self, profile: &MediaProfile, out: &mut String) {
        out.push_str(&format!(
            "<trt:Profiles token=\"{}\" fixed=\"{}\"><tt:Name>{}</tt:Name>",
            profile.token,
            profile.fixed,
            xml_escape(&profile.name),
        ));
        out.push_str(&format!(
            "<tt:VideoSourceConfiguration token=\"VideoSourceConfig\">\
             <tt:Name>VideoSourceConfig</tt:Name><tt:UseCount>{}</tt:UseCount>\
             <tt:SourceToken>{}</tt:SourceToken>\
             <tt:Bounds x=\"0\" y=\"0\" width=\"{}\" height=\"{}\"/>\
             </tt:VideoSourceConfiguration>",
            self.profiles.list().len(),
            VIDEO_SOURCE_TOKEN,
            profile.encoder.width,
            profile.encoder.height,
        ));
        write_encoder(&profile.encoder, "tt:VideoEncoderConfiguration", out);
        out.push_str("</trt:Profiles>");
    }

    // ========================================================================
    // Profiles
    // ========================================================================

    fn get_profiles(&self, out: &mut String) -> OnvifResult<()> {
        out.push_str("<trt:GetProfilesResponse>");
        for profile in self.profiles.list() {
            self.write_profile(&profile, out);
        }
        out.push_str("</trt:GetProfilesResponse>");
        Ok(())
    }

    fn get_profile(&self, payload: &XmlElement, out: &mut String) -> OnvifResult<()> {
        let token = payload
            .child_text("ProfileToken")
            .ok_or_else(|| OnvifError::missing_arg("ProfileToken"))?;
        let profile = self.require_profile(token)?;

        out.push_str("<trt:GetProfileResponse>");
        // Single-profile responses use the singular element name.
        let mut fragment = String::new();
        self.write_profile(&profile, &mut fragment);
        out.push_str(&fragment.replacen("trt:Profiles", "trt:Profile", 2));
        out.push_str("</trt:GetProfileResponse>");
        Ok(())
    }

    fn create_profile(&self, payload: &XmlElement, out: &mut String) -> OnvifResult<()> {
        let name = payload
            .child_text("Name")
            .filter(|n| !n.is_empty())
            .ok_or_else(|| OnvifError::missing_arg("Name"))?;
        let token = payload.child_text("Token").filter(|t| !t.is_empty());

        let profile = self.profiles.create(name, token)?;
        self.streaming.invalidate(&profile.token);

        out.push_str("<trt:CreateProfileResponse>");
        let mut fragment = String::new();
        self.write_profile(&profile, &mut fragment);
        out.push_str(&fragment.replacen("trt:Profiles", "trt:Profile", 2));
        out.push_str("</trt:CreateProfileResponse>");
        Ok(())
    }

    fn delete_profile(&self, payload: &XmlElement, out: &mut String) -> OnvifResult<()> {
        let token = payload
            .child_text("ProfileToken")
            .ok_or_else(|| OnvifError::missing_arg("ProfileToken"))?;

        self.profiles.delete(token)?;
        self.streaming.invalidate(token);

        out.push_str("<trt:DeleteProfileResponse/>");
        Ok(())
    }

    // ========================================================================
    // Stream addresses
    // ========================================================================

    fn get_stream_uri(&self, payload: &XmlElement, out: &mut String) -> OnvifResult<()> {
        let token = payload
            .child_text("ProfileToken")
            .ok_or_else(|| OnvifError::missing_arg("ProfileToken"))?;
        self.require_profile(token)?;

        let protocol = payload
            .child("StreamSetup")
            .and_then(|s| s.child("Transport"))
            .and_then(|t| t.child_text("Protocol"))
            .map(StreamProtocol::parse)
            .unwrap_or(StreamProtocol::Rtsp);

        let uri = self.streaming.build_stream_uri(token, protocol);
        write_media_uri(&uri, "trt:GetStreamUriResponse", out);
        Ok(())
    }

    fn get_snapshot_uri(&self, payload: &XmlElement, out: &mut String) -> OnvifResult<()> {
        let token = payload
            .child_text("ProfileToken")
            .ok_or_else(|| OnvifError::missing_arg("ProfileToken"))?;
        self.require_profile(token)?;

        let uri = self.streaming.build_snapshot_uri(token);
        write_media_uri(&uri, "trt:GetSnapshotUriResponse", out);
        Ok(())
    }

    // ========================================================================
    // Sources and encoders
    // ========================================================================

    fn get_video_sources(&self, out: &mut String) -> OnvifResult<()> {
        // The sensor's native mode is the first (main stream) slot.
        let (width, height, framerate) = self
            .profiles
            .list()
            .first()
            .map(|p| (p.encoder.width, p.encoder.height, p.encoder.framerate))
            .unwrap_or((1920, 1080, 25));

        out.push_str(&format!(
            "<trt:GetVideoSourcesResponse>\
             <trt:VideoSources token=\"{}\">\
             <tt:Framerate>{}</tt:Framerate>\
             <tt:Resolution><tt:Width>{}</tt:Width><tt:Height>{}</tt:Height></tt:Resolution>\
             </trt:VideoSources>\
             </trt:GetVideoSourcesResponse>",
            VIDEO_SOURCE_TOKEN, framerate, width, height,
        ));
        Ok(())
    }

    fn get_audio_sources(&self, out: &mut String) -> OnvifResult<()> {
        out.push_str(&format!(
            "<trt:GetAudioSourcesResponse>\
             <trt:AudioSources token=\"{}\"><tt:Channels>1</tt:Channels></trt:AudioSources>\
             </trt:GetAudioSourcesResponse>",
            AUDIO_SOURCE_TOKEN,
        ));
        Ok(())
    }

    fn get_video_encoder_configurations(&self, out: &mut String) -> OnvifResult<()> {
        out.push_str("<trt:GetVideoEncoderConfigurationsResponse>");
        for encoder in self.profiles.encoders() {
            write_encoder(&encoder, "trt:Configurations", out);
        }
        out.push_str("</trt:GetVideoEncoderConfigurationsResponse>");
        Ok(())
    }

    fn get_video_encoder_configuration(
        &self,
        payload: &XmlElement,
        out: &mut String,
    ) -> OnvifResult<()> {
        let token = payload
            .child_text("ConfigurationToken")
            .ok_or_else(|| OnvifError::missing_arg("ConfigurationToken"))?;
        let encoder = self.profiles.encoder(token).ok_or_else(|| {
            OnvifError::NotFound(format!("video encoder configuration '{}'", token))
        })?;

        out.push_str("<trt:GetVideoEncoderConfigurationResponse>");
        write_encoder(&encoder, "trt:Configuration", out);
        out.push_str("</trt:GetVideoEncoderConfigurationResponse>");
        Ok(())
    }

    fn set_video_encoder_configuration(
        &self,
        payload: &XmlElement,
        out: &mut String,
    ) -> OnvifResult<()> {
        let configuration = payload
            .child("Configuration")
            .ok_or_else(|| OnvifError::missing_arg("Configuration"))?;
        let cfg = parse_encoder(configuration)?;
        validate_encoder(&cfg)?;

        let profile_token = self.profiles.set_encoder(&cfg)?;
        self.streaming.invalidate(&profile_token);

        out.push_str("<trt:SetVideoEncoderConfigurationResponse/>");
        Ok(())
    }

    fn get_video_encoder_configuration_options(&self, out: &mut String) -> OnvifResult<()> {
        out.push_str(
            "<trt:GetVideoEncoderConfigurationOptionsResponse><trt:Options>\
             <tt:QualityRange><tt:Min>0</tt:Min><tt:Max>100</tt:Max></tt:QualityRange>\
             <tt:H264>",
        );
        for (width, height) in AVAILABLE_RESOLUTIONS {
            out.push_str(&format!(
                "<tt:ResolutionsAvailable><tt:Width>{}</tt:Width><tt:Height>{}</tt:Height></tt:ResolutionsAvailable>",
                width, height
            ));
        }
        out.push_str(
            "<tt:GovLengthRange><tt:Min>1</tt:Min><tt:Max>300</tt:Max></tt:GovLengthRange>\
             <tt:FrameRateRange><tt:Min>1</tt:Min><tt:Max>30</tt:Max></tt:FrameRateRange>\
             <tt:EncodingIntervalRange><tt:Min>1</tt:Min><tt:Max>1</tt:Max></tt:EncodingIntervalRange>\
             <tt:H264ProfilesSupported>Baseline</tt:H264ProfilesSupported>\
             <tt:H264ProfilesSupported>Main</tt:H264ProfilesSupported>\
             <tt:H264ProfilesSupported>High</tt:H264ProfilesSupported>\
             </tt:H264></trt:Options></trt:GetVideoEncoderConfigurationOptionsResponse>",
        );
        Ok(())
    }

    fn get_metadata_configurations(&self, out: &mut String) -> OnvifResult<()> {
        out.push_str("<trt:GetMetadataConfigurationsResponse/>");
        Ok(())
    }
}

fn write_media_uri(uri: &str, wrapper: &str, out: &mut String) {
    out.push_str(&format!(
        "<{wrapper}><trt:MediaUri>\
         <tt:Uri>{uri}</tt:Uri>\
         <tt:InvalidAfterConnect>false</tt:InvalidAfterConnect>\
         <tt:InvalidAfterReboot>false</tt:InvalidAfterReboot>\
         <tt:Timeout>PT0S</tt:Timeout>\
         </trt:MediaUri></{wrapper}>",
        wrapper = wrapper,
        uri = xml_escape(uri),
    ));
}

fn write_encoder(encoder: &VideoEncoderConfig, element: &str, out: &mut String) {
    out.push_str(&format!(
        "<{element} token=\"{token}\">\
         <tt:Name>{name}</tt:Name><tt:UseCount>1</tt:UseCount>\
         <tt:Encoding>{encoding}</tt:Encoding>\
         <tt:Resolution><tt:Width>{width}</tt:Width><tt:Height>{height}</tt:Height></tt:Resolution>\
         <tt:Quality>{quality}</tt:Quality>\
         <tt:RateControl><tt:FrameRateLimit>{framerate}</tt:FrameRateLimit>\
         <tt:EncodingInterval>1</tt:EncodingInterval>\
         <tt:BitrateLimit>{bitrate}</tt:BitrateLimit></tt:RateControl>\
         <tt:H264><tt:GovLength>{gop}</tt:GovLength><tt:H264Profile>Main</tt:H264Profile></tt:H264>\
         </{element}>",
        element = element,
        token = encoder.token,
        name = xml_escape(&encoder.name),
        encoding = xml_escape(&encoder.encoding),
        width = encoder.width,
        height = encoder.height,
        quality = encoder.quality,
        framerate = encoder.framerate,
        bitrate = encoder.bitrate,
        gop = encoder.gop,
    ));
}

fn parse_encoder(configuration: &XmlElement) -> OnvifResult<VideoEncoderConfig> {
    let token = configuration
        .attr("token")
        .map(str::to_string)
        .or_else(|| configuration.child_text("Token").map(str::to_string))
        .ok_or_else(|| OnvifError::missing_arg("Configuration token"))?;

    let resolution = configuration
        .child("Resolution")
        .ok_or_else(|| OnvifError::missing_arg("Resolution"))?;

    let rate_control = configuration.child("RateControl");

    Ok(VideoEncoderConfig {
        name: configuration
            .child_text("Name")
            .unwrap_or(&token)
            .to_string(),
        encoding: configuration
            .child_text("Encoding")
            .unwrap_or("H264")
            .to_string(),
        width: resolution
            .child_parse("Width")
            .ok_or_else(|| OnvifError::missing_arg("Width"))?,
        height: resolution
            .child_parse("Height")
            .ok_or_else(|| OnvifError::missing_arg("Height"))?,
        framerate: rate_control
            .and_then(|r| r.child_parse("FrameRateLimit"))
            .unwrap_or(25),
        bitrate: rate_control
            .and_then(|r| r.child_parse("BitrateLimit"))
            .unwrap_or(2048),
        gop: configuration
            .child("H264")
            .and_then(|h| h.child_parse("GovLength"))
            .unwrap_or(50),
        quality: configuration.child_parse("Quality").unwrap_or(70),
        token,
    })
}

fn validate_encoder(cfg: &VideoEncoderConfig) -> OnvifResult<()> {
    if cfg.encoding != "H264" {
        return Err(OnvifError::invalid_arg(
            "InvalidArgVal",
            format!("encoding '{}' is not supported", cfg.encoding),
        ));
    }
    if !AVAILABLE_RESOLUTIONS.contains(&(cfg.width, cfg.height)) {
        return Err(OnvifError::invalid_arg(
            "InvalidArgVal",
            format!("resolution {}x{} is not supported", cfg.width, cfg.height),
        ));
    }
    if !(1..=30).contains(&cfg.framerate) {
        return Err(OnvifError::out_of_range("FrameRateLimit", 1, 30));
    }
    if !(32..=16384).contains(&cfg.bitrate) {
        return Err(OnvifError::out_of_range("BitrateLimit", 32, 16384));
    }
    if !(1..=300).contains(&cfg.gop) {
        return Err(OnvifError::out_of_range("GovLength", 1, 300));
    }
    if !(0..=100).contains(&cfg.quality) {
        return Err(OnvifError::out_of_range("Quality", 0, 100));
    }
    Ok(())
}

#[async_trait]
impl ServiceHandler for MediaService {
    fn service_name(&self) -> &'static str {
        "media"
    }

    fn namespace(&self) -> &'static str {
        TRT_NS
    }

    fn operations(&self) -> &'static [&'static str] {
        OPERATIONS
    }

    fn capability(&self) -> ServiceCapability {
        ServiceCapability {
            service_name: "media",
            namespace: TRT_NS,
            xaddr_path: "/onvif/media_service",
            version: ONVIF_VERSION,
            flags: CapabilityFlags {
                media: true,
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
            "GetProfiles" => self.get_profiles(&mut body)?,
            "GetProfile" => self.get_profile(&payload, &mut body)?,
            "CreateProfile" => self.create_profile(&payload, &mut body)?,
            "DeleteProfile" => self.delete_profile(&payload, &mut body)?,
            "GetStreamUri" => self.get_stream_uri(&payload, &mut body)?,
            "GetSnapshotUri" => self.get_snapshot_uri(&payload, &mut body)?,
            "GetVideoSources" => self.get_video_sources(&mut body)?,
            "GetAudioSources" => self.get_audio_sources(&mut body)?,
            "GetVideoEncoderConfigurations" => {
                self.get_video_encoder_configurations(&mut body)?
            }
            "GetVideoEncoderConfiguration" => {
                self.get_video_encoder_configuration(&payload, &mut body)?
            }
            "SetVideoEncoderConfiguration" => {
                self.set_video_encoder_configuration(&payload, &mut body)?
            }
            "GetVideoEncoderConfigurationOptions" => {
                self.get_video_encoder_configuration_options(&mut body)?
            }
            "GetMetadataConfigurations" => self.get_metadata_configurations(&mut body)?,
            other => return Err(OnvifError::ActionNotSupported(other.to_string())),
        }

        ctx.generate_response_with(|out| out.push_str(&body));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::UriBuilder;

    fn service() -> (MediaService, Arc<UriBuilder>) {
        let config = Arc::new(ConfigRuntime::with_defaults());
        config.set_str("network", "device_ip", "192.168.1.60").unwrap();
        let streaming = Arc::new(UriBuilder::new(Arc::clone(&config)));
        let service = MediaService::new(
            config,
            streaming.clone() as Arc<dyn Streaming>,
            PersistenceHandle::disconnected(),
        );
        (service, streaming)
    }

    fn ctx(body: &str) -> SoapContext {
        let xml = format!(
            r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope"
                           xmlns:trt="http://www.onvif.org/ver10/media/wsdl"
                           xmlns:tt="http://www.onvif.org/ver10/schema">
                 <s:Body>{}</s:Body></s:Envelope>"#,
            body
        );
        SoapContext::parse(xml.as_bytes()).unwrap()
    }

    async fn run(service: &MediaService, body: &str) -> OnvifResult<String> {
        let mut context = ctx(body);
        let operation = context.operation().to_string();
        service
            .handle_operation(&operation, &mut context, &DispatchContext::default())
            .await?;
        Ok(context.response_data().to_string())
    }

    #[tokio::test]
    async fn test_get_profiles_lists_builtins() {
        let (service, _) = service();
        let response = run(&service, "<trt:GetProfiles/>").await.unwrap();
        assert!(response.contains("token=\"Profile1\""));
        assert!(response.contains("token=\"Profile2\""));
        assert!(response.contains("fixed=\"true\""));
        assert!(response.contains("MainStream"));
    }

    #[tokio::test]
    async fn test_create_profile_appears_in_get_profiles() {
        let (service, _) = service();
        let created = run(
            &service,
            "<trt:CreateProfile><trt:Name>Recording</trt:Name></trt:CreateProfile>",
        )
        .await
        .unwrap();
        assert!(created.contains("token=\"Profile3\""));

        let listing = run(&service, "<trt:GetProfiles/>").await.unwrap();
        assert!(listing.contains("Recording"));
    }

    #[tokio::test]
    async fn test_create_profile_over_limit_faults_with_maximum() {
        let (service, _) = service();
        run(&service, "<trt:CreateProfile><trt:Name>A</trt:Name></trt:CreateProfile>")
            .await
            .unwrap();
        run(&service, "<trt:CreateProfile><trt:Name>B</trt:Name></trt:CreateProfile>")
            .await
            .unwrap();

        let mut context = ctx("<trt:CreateProfile><trt:Name>C</trt:Name></trt:CreateProfile>");
        let err = service
            .handle_operation("CreateProfile", &mut context, &DispatchContext::default())
            .await
            .unwrap_err();
        context.generate_fault(err);

        let fault = context.response_data().to_lowercase();
        assert!(fault.contains("s:sender"));
        assert!(fault.contains("maximum") || fault.contains("limit"));
    }

    #[tokio::test]
    async fn test_delete_fixed_profile_faults() {
        let (service, _) = service();
        let err = run(
            &service,
            "<trt:DeleteProfile><trt:ProfileToken>Profile1</trt:ProfileToken></trt:DeleteProfile>",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, OnvifError::InvalidArg { .. }));
    }

    #[tokio::test]
    async fn test_deleted_profile_gone_from_listing() {
        let (service, _) = service();
        run(&service, "<trt:CreateProfile><trt:Name>Gone</trt:Name></trt:CreateProfile>")
            .await
            .unwrap();
        run(
            &service,
            "<trt:DeleteProfile><trt:ProfileToken>Profile3</trt:ProfileToken></trt:DeleteProfile>",
        )
        .await
        .unwrap();

        let listing = run(&service, "<trt:GetProfiles/>").await.unwrap();
        assert!(!listing.contains("token=\"Profile3\""));
    }

    #[tokio::test]
    async fn test_get_stream_uri_cached() {
        let (service, streaming) = service();
        let request = "<trt:GetStreamUri>\
             <trt:StreamSetup><tt:Stream>RTP-Unicast</tt:Stream>\
             <tt:Transport><tt:Protocol>RTSP</tt:Protocol></tt:Transport></trt:StreamSetup>\
             <trt:ProfileToken>Profile1</trt:ProfileToken></trt:GetStreamUri>";

        let first = run(&service, request).await.unwrap();
        let second = run(&service, request).await.unwrap();

        assert!(first.contains("rtsp://192.168.1.60:554/Profile1"));
        assert_eq!(first, second);

        let stats = streaming.cache_stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
    }

    #[tokio::test]
    async fn test_get_stream_uri_unknown_profile() {
        let (service, _) = service();
        let err = run(
            &service,
            "<trt:GetStreamUri><trt:ProfileToken>Profile9</trt:ProfileToken></trt:GetStreamUri>",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, OnvifError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_get_snapshot_uri() {
        let (service, _) = service();
        let response = run(
            &service,
            "<trt:GetSnapshotUri><trt:ProfileToken>Profile1</trt:ProfileToken></trt:GetSnapshotUri>",
        )
        .await
        .unwrap();
        assert!(response.contains("http://192.168.1.60:8080/snapshot/Profile1"));
    }

    #[tokio::test]
    async fn test_set_encoder_configuration_invalidates_cache() {
        let (service, streaming) = service();
        streaming.build_stream_uri("Profile1", StreamProtocol::Rtsp);

        run(
            &service,
            "<trt:SetVideoEncoderConfiguration><trt:Configuration token=\"VideoEncoder1\">\
             <tt:Name>MainStream</tt:Name><tt:Encoding>H264</tt:Encoding>\
             <tt:Resolution><tt:Width>1280</tt:Width><tt:Height>720</tt:Height></tt:Resolution>\
             <tt:Quality>80</tt:Quality>\
             <tt:RateControl><tt:FrameRateLimit>30</tt:FrameRateLimit><tt:BitrateLimit>4096</tt:BitrateLimit></tt:RateControl>\
             <tt:H264><tt:GovLength>60</tt:GovLength></tt:H264>\
             </trt:Configuration></trt:SetVideoEncoderConfiguration>",
        )
        .await
        .unwrap();

        let encoder = service.profile_store().encoder("VideoEncoder1").unwrap();
        assert_eq!((encoder.width, encoder.height), (1280, 720));

        // The cached URI was dropped with the profile mutation.
        streaming.build_stream_uri("Profile1", StreamProtocol::Rtsp);
        assert_eq!(streaming.cache_stats().misses, 2);
    }

    #[tokio::test]
    async fn test_set_encoder_rejects_unknown_resolution() {
        let (service, _) = service();
        let err = run(
            &service,
            "<trt:SetVideoEncoderConfiguration><trt:Configuration token=\"VideoEncoder1\">\
             <tt:Resolution><tt:Width>123</tt:Width><tt:Height>45</tt:Height></tt:Resolution>\
             </trt:Configuration></trt:SetVideoEncoderConfiguration>",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, OnvifError::InvalidArg { .. }));
    }

    #[tokio::test]
    async fn test_encoder_options_listed() {
        let (service, _) = service();
        let response = run(&service, "<trt:GetVideoEncoderConfigurationOptions/>")
            .await
            .unwrap();
        assert!(response.contains("<tt:Width>1920</tt:Width>"));
        assert!(response.contains("H264ProfilesSupported"));
    }

    #[tokio::test]
    async fn test_sources() {
        let (service, _) = service();
        let video = run(&service, "<trt:GetVideoSources/>").await.unwrap();
        assert!(video.contains("token=\"VideoSource0\""));
        let audio = run(&service, "<trt:GetAudioSources/>").await.unwrap();
        assert!(audio.contains("token=\"AudioSource0\""));
    }
}
