//! PTZ service behavior through the dispatcher.

use onvifd::platform::PtzSpeed;

use super::harness;

#[tokio::test]
async fn test_set_preset_then_goto_succeeds() {
    let h = harness().await;

    h.call(
        "ptz",
        "<tptz:AbsoluteMove><tptz:ProfileToken>Profile1</tptz:ProfileToken>\
         <tptz:Position><tt:PanTilt x=\"0.25\" y=\"-0.5\"/><tt:Zoom x=\"0.3\"/></tptz:Position>\
         </tptz:AbsoluteMove>",
    )
    .await;

    let response = h
        .call(
            "ptz",
            "<tptz:SetPreset><tptz:ProfileToken>Profile1</tptz:ProfileToken>\
             <tptz:PresetName>Dock</tptz:PresetName></tptz:SetPreset>",
        )
        .await;
    let start = response.find("<tptz:PresetToken>").unwrap() + "<tptz:PresetToken>".len();
    let end = response.find("</tptz:PresetToken>").unwrap();
    let token = &response[start..end];

    let goto = h
        .call(
            "ptz",
            &format!(
                "<tptz:GotoPreset><tptz:ProfileToken>Profile1</tptz:ProfileToken>\
                 <tptz:PresetToken>{}</tptz:PresetToken></tptz:GotoPreset>",
                token
            ),
        )
        .await;
    assert!(goto.contains("<tptz:GotoPresetResponse/>"));
    assert!(!goto.contains("s:Fault"));
}

#[tokio::test]
async fn test_goto_unknown_preset_is_sender_fault() {
    let h = harness().await;
    let response = h
        .call(
            "ptz",
            "<tptz:GotoPreset><tptz:ProfileToken>Profile1</tptz:ProfileToken>\
             <tptz:PresetToken>Preset404</tptz:PresetToken></tptz:GotoPreset>",
        )
        .await;
    assert!(response.contains("s:Fault"));
    assert!(response.contains("s:Sender"));
    assert!(response.contains("ter:NotFound"));
}

#[tokio::test]
async fn test_relative_move_speed_defaults() {
    let h = harness().await;
    h.call(
        "ptz",
        "<tptz:RelativeMove><tptz:ProfileToken>Profile1</tptz:ProfileToken>\
         <tptz:Translation><tt:PanTilt x=\"0.1\" y=\"0.1\"/></tptz:Translation>\
         </tptz:RelativeMove>",
    )
    .await;

    let (_, speed) = h.hardware.last_relative_move.lock().unwrap();
    assert_eq!(speed, PtzSpeed::new(0.5, 0.5, 0.0));
}

#[tokio::test]
async fn test_continuous_move_and_stop() {
    let h = harness().await;

    h.call(
        "ptz",
        "<tptz:ContinuousMove><tptz:ProfileToken>Profile1</tptz:ProfileToken>\
         <tptz:Velocity><tt:PanTilt x=\"-0.3\" y=\"0.0\"/></tptz:Velocity>\
         </tptz:ContinuousMove>",
    )
    .await;
    assert_eq!(
        *h.hardware.last_continuous_move.lock(),
        Some(PtzSpeed::new(-0.3, 0.0, 0.0))
    );

    let status = h
        .call(
            "ptz",
            "<tptz:GetStatus><tptz:ProfileToken>Profile1</tptz:ProfileToken></tptz:GetStatus>",
        )
        .await;
    assert!(status.contains("MOVING"));

    h.call(
        "ptz",
        "<tptz:Stop><tptz:ProfileToken>Profile1</tptz:ProfileToken></tptz:Stop>",
    )
    .await;
    assert_eq!(*h.hardware.stop_calls.lock(), 1);

    let status = h
        .call(
            "ptz",
            "<tptz:GetStatus><tptz:ProfileToken>Profile1</tptz:ProfileToken></tptz:GetStatus>",
        )
        .await;
    assert!(status.contains("IDLE"));
}

#[tokio::test]
async fn test_remove_preset_round_trip() {
    let h = harness().await;

    h.call(
        "ptz",
        "<tptz:SetPreset><tptz:ProfileToken>Profile1</tptz:ProfileToken>\
         <tptz:PresetName>Temp</tptz:PresetName></tptz:SetPreset>",
    )
    .await;
    h.call(
        "ptz",
        "<tptz:RemovePreset><tptz:ProfileToken>Profile1</tptz:ProfileToken>\
         <tptz:PresetToken>Preset1</tptz:PresetToken></tptz:RemovePreset>",
    )
    .await;

    let listing = h
        .call(
            "ptz",
            "<tptz:GetPresets><tptz:ProfileToken>Profile1</tptz:ProfileToken></tptz:GetPresets>",
        )
        .await;
    assert!(!listing.contains("Temp"));
    assert!(h.hardware.preset_calls.lock().contains(&("remove", 1)));
}
