//! Device service behavior through the dispatcher.

use super::harness;

#[tokio::test]
async fn test_device_information_from_config_overrides() {
    let h = harness().await;
    h.config.set_str("device", "manufacturer", "Rebadged").unwrap();

    let response = h.call("device", "<tds:GetDeviceInformation/>").await;
    assert!(response.contains("<tds:Manufacturer>Rebadged</tds:Manufacturer>"));
}

#[tokio::test]
async fn test_scopes_set_then_get() {
    let h = harness().await;

    h.call(
        "device",
        "<tds:SetScopes>\
         <tds:Scopes>onvif://www.onvif.org/name/Warehouse</tds:Scopes>\
         <tds:Scopes>onvif://www.onvif.org/location/Dock4</tds:Scopes>\
         </tds:SetScopes>",
    )
    .await;

    let response = h.call("device", "<tds:GetScopes/>").await;
    assert!(response.contains("onvif://www.onvif.org/name/Warehouse"));
    assert!(response.contains("onvif://www.onvif.org/location/Dock4"));
}

#[tokio::test]
async fn test_create_delete_users_round_trip() {
    let h = harness().await;

    h.call(
        "device",
        "<tds:CreateUsers><tds:User>\
         <tt:Username>audit</tt:Username><tt:Password>pw1</tt:Password>\
         <tt:UserLevel>Operator</tt:UserLevel></tds:User></tds:CreateUsers>",
    )
    .await;

    let listing = h.call("device", "<tds:GetUsers/>").await;
    assert!(listing.contains("<tt:Username>audit</tt:Username>"));
    assert!(listing.contains("<tt:UserLevel>Operator</tt:UserLevel>"));
    // Passwords never echo back.
    assert!(!listing.contains("pw1"));

    h.call(
        "device",
        "<tds:DeleteUsers><tds:Username>audit</tds:Username></tds:DeleteUsers>",
    )
    .await;
    let listing = h.call("device", "<tds:GetUsers/>").await;
    assert!(!listing.contains("audit"));
}

#[tokio::test]
async fn test_system_date_and_time_shape() {
    let h = harness().await;
    let response = h.call("device", "<tds:GetSystemDateAndTime/>").await;

    assert!(response.contains("<tt:DateTimeType>Manual</tt:DateTimeType>"));
    assert!(response.contains("<tt:UTCDateTime>"));
    assert!(response.contains("<tt:Year>"));
}

#[tokio::test]
async fn test_network_protocols_reflect_config() {
    let h = harness().await;
    h.config.set_int("onvif", "rtsp_port", 8554).unwrap();

    let response = h.call("device", "<tds:GetNetworkProtocols/>").await;
    assert!(response.contains("<tt:Name>RTSP</tt:Name>"));
    assert!(response.contains("<tt:Port>8554</tt:Port>"));
}

#[tokio::test]
async fn test_network_interfaces_carry_address() {
    let h = harness().await;
    let response = h.call("device", "<tds:GetNetworkInterfaces/>").await;
    assert!(response.contains("<tt:Address>192.168.1.80</tt:Address>"));
    assert!(response.contains("<tt:MTU>1500</tt:MTU>"));
}

#[tokio::test]
async fn test_reboot_defers_to_hardware() {
    let h = harness().await;
    let response = h.call("device", "<tds:SystemReboot/>").await;
    assert!(response.contains("<tds:Message>"));
    assert!(h.hardware.reboot_scheduled.lock().is_some());
}
