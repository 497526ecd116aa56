//! Imaging service behavior through the dispatcher.

use onvifd::platform::VpssEffect;

use super::harness;

#[tokio::test]
async fn test_set_settings_reach_hardware_with_mapped_ranges() {
    let h = harness().await;

    h.call(
        "imaging",
        "<timg:SetImagingSettings>\
         <timg:VideoSourceToken>VideoSource0</timg:VideoSourceToken>\
         <timg:ImagingSettings>\
         <tt:Brightness>100</tt:Brightness><tt:Contrast>0</tt:Contrast>\
         <tt:ColorSaturation>50</tt:ColorSaturation><tt:Sharpness>60</tt:Sharpness>\
         <tt:Extension><tt:Hue>-180</tt:Hue></tt:Extension>\
         </timg:ImagingSettings></timg:SetImagingSettings>",
    )
    .await;

    let calls = h.hardware.effect_calls.lock().clone();
    assert!(calls.contains(&(VpssEffect::Brightness, 50)));
    assert!(calls.contains(&(VpssEffect::Contrast, 0)));
    assert!(calls.contains(&(VpssEffect::Saturation, 25)));
    assert!(calls.contains(&(VpssEffect::Sharpness, 30)));
    assert!(calls.contains(&(VpssEffect::Hue, -50)));
}

#[tokio::test]
async fn test_second_identical_batch_forwards_nothing() {
    let h = harness().await;
    let request = "<timg:SetImagingSettings>\
        <timg:VideoSourceToken>VideoSource0</timg:VideoSourceToken>\
        <timg:ImagingSettings><tt:Brightness>64</tt:Brightness><tt:Contrast>64</tt:Contrast>\
        <tt:ColorSaturation>64</tt:ColorSaturation><tt:Sharpness>64</tt:Sharpness>\
        </timg:ImagingSettings></timg:SetImagingSettings>";

    h.call("imaging", request).await;
    let after_first = h.hardware.effect_calls.lock().len();

    h.call("imaging", request).await;
    assert_eq!(h.hardware.effect_calls.lock().len(), after_first);
}

#[tokio::test]
async fn test_out_of_range_batch_faults() {
    let h = harness().await;
    let response = h
        .call(
            "imaging",
            "<timg:SetImagingSettings>\
             <timg:VideoSourceToken>VideoSource0</timg:VideoSourceToken>\
             <timg:ImagingSettings><tt:Contrast>101</tt:Contrast></timg:ImagingSettings>\
             </timg:SetImagingSettings>",
        )
        .await;
    assert!(response.contains("s:Fault"));
    assert!(response.contains("s:Sender"));
}

#[tokio::test]
async fn test_options_advertise_onvif_ranges() {
    let h = harness().await;
    let response = h
        .call(
            "imaging",
            "<timg:GetOptions><timg:VideoSourceToken>VideoSource0</timg:VideoSourceToken></timg:GetOptions>",
        )
        .await;
    assert!(response.contains("<tt:Brightness><tt:Min>0</tt:Min><tt:Max>100</tt:Max></tt:Brightness>"));
}
