//! Media service behavior through the dispatcher.

use onvifd::streaming::Streaming;

use super::harness;

#[tokio::test]
async fn test_profile_lifecycle_end_to_end() {
    let h = harness().await;

    // Two fixed built-ins at startup.
    let listing = h.call("media", "<trt:GetProfiles/>").await;
    assert!(listing.contains("token=\"Profile1\""));
    assert!(listing.contains("token=\"Profile2\""));
    assert!(!listing.contains("token=\"Profile3\""));

    // Create, observe, delete, observe.
    let created = h
        .call(
            "media",
            "<trt:CreateProfile><trt:Name>Patio</trt:Name></trt:CreateProfile>",
        )
        .await;
    assert!(created.contains("token=\"Profile3\""));

    let listing = h.call("media", "<trt:GetProfiles/>").await;
    assert!(listing.contains("Patio"));

    h.call(
        "media",
        "<trt:DeleteProfile><trt:ProfileToken>Profile3</trt:ProfileToken></trt:DeleteProfile>",
    )
    .await;
    let listing = h.call("media", "<trt:GetProfiles/>").await;
    assert!(!listing.contains("Patio"));
}

#[tokio::test]
async fn test_delete_fixed_profile_fault() {
    let h = harness().await;
    let response = h
        .call(
            "media",
            "<trt:DeleteProfile><trt:ProfileToken>Profile1</trt:ProfileToken></trt:DeleteProfile>",
        )
        .await;
    assert!(response.contains("s:Fault"));
    assert!(response.contains("s:Sender"));
    assert!(response.contains("fixed"));
}

#[tokio::test]
async fn test_stream_uri_cache_hit_counters() {
    let h = harness().await;
    let request = "<trt:GetStreamUri>\
        <trt:StreamSetup><tt:Stream>RTP-Unicast</tt:Stream>\
        <tt:Transport><tt:Protocol>RTSP</tt:Protocol></tt:Transport></trt:StreamSetup>\
        <trt:ProfileToken>Profile1</trt:ProfileToken></trt:GetStreamUri>";

    let first = h.call("media", request).await;
    let second = h.call("media", request).await;
    assert_eq!(first, second);

    let stats = h.streaming.cache_stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 1);
}

#[tokio::test]
async fn test_snapshot_uri() {
    let h = harness().await;
    let response = h
        .call(
            "media",
            "<trt:GetSnapshotUri><trt:ProfileToken>Profile2</trt:ProfileToken></trt:GetSnapshotUri>",
        )
        .await;
    assert!(response.contains("/snapshot/Profile2"));
}

#[tokio::test]
async fn test_encoder_configurations_listed() {
    let h = harness().await;
    let response = h.call("media", "<trt:GetVideoEncoderConfigurations/>").await;
    assert!(response.contains("token=\"VideoEncoder1\""));
    assert!(response.contains("<tt:Width>1920</tt:Width>"));
    assert!(response.contains("token=\"VideoEncoder2\""));
    assert!(response.contains("<tt:Width>640</tt:Width>"));
}

#[tokio::test]
async fn test_metadata_configurations_empty() {
    let h = harness().await;
    let response = h.call("media", "<trt:GetMetadataConfigurations/>").await;
    assert!(response.contains("<trt:GetMetadataConfigurationsResponse/>"));
}
