//! Configuration schema: known parameters, defaults, and validation.
//!
//! Every parameter the daemon reads is declared here with its section, key,
//! type, and default. Getters fall back to the default when the stored tree
//! has no entry, so a missing config file still yields a fully working
//! daemon.

use std::collections::HashMap;

use thiserror::Error;

/// Configuration value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Int,
    String,
    Bool,
    Float,
}

/// Validation failure for a configuration value.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("value for {section}.{key} is out of range [{min}, {max}]")]
    OutOfRange {
        section: String,
        key: String,
        min: f64,
        max: f64,
    },

    #[error("value for {section}.{key} is not a valid {expected}")]
    WrongType {
        section: String,
        key: String,
        expected: &'static str,
    },
}

/// One declared configuration parameter.
#[derive(Debug, Clone)]
pub struct Parameter {
    pub section: &'static str,
    pub key: &'static str,
    pub value_type: ValueType,
    pub default: String,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl Parameter {
    fn int(section: &'static str, key: &'static str, default: i64, min: i64, max: i64) -> Self {
        Self {
            section,
            key,
            value_type: ValueType::Int,
            default: default.to_string(),
            min: Some(min as f64),
            max: Some(max as f64),
        }
    }

    fn string(section: &'static str, key: &'static str, default: &str) -> Self {
        Self {
            section,
            key,
            value_type: ValueType::String,
            default: default.to_string(),
            min: None,
            max: None,
        }
    }

    fn bool(section: &'static str, key: &'static str, default: bool) -> Self {
        Self {
            section,
            key,
            value_type: ValueType::Bool,
            default: default.to_string(),
            min: None,
            max: None,
        }
    }

    fn float(section: &'static str, key: &'static str, default: f64, min: f64, max: f64) -> Self {
        Self {
            section,
            key,
            value_type: ValueType::Float,
            default: default.to_string(),
            min: Some(min),
            max: Some(max),
        }
    }
}

/// The full parameter table, indexed by `section.key`.
pub struct ConfigSchema {
    parameters: HashMap<String, Parameter>,
}

impl ConfigSchema {
    /// Build the daemon's schema.
    pub fn new() -> Self {
        let mut parameters = HashMap::new();

        let mut add = |p: Parameter| {
            parameters.insert(format!("{}.{}", p.section, p.key), p);
        };

        // Device identity.
        add(Parameter::string("device", "manufacturer", "Anyka"));
        add(Parameter::string("device", "model", "AK3918 Camera"));
        add(Parameter::string("device", "firmware_version", "1.0.0"));
        add(Parameter::string("device", "serial_number", "AK3918-001"));
        add(Parameter::string("device", "hardware_id", "1.0"));
        add(Parameter::string("device", "timezone", "UTC"));
        add(Parameter::bool("device", "daylight_savings", false));
        add(Parameter::string("device", "datetime_type", "Manual"));

        // Network.
        add(Parameter::string("network", "device_ip", ""));
        add(Parameter::string("network", "hostname", "onvif-camera"));
        add(Parameter::string("network", "interface", "eth0"));
        add(Parameter::string("network", "dns_server", ""));
        add(Parameter::string("network", "gateway", ""));
        add(Parameter::string("network", "mac_address", "00:55:7b:b5:7d:f7"));
        add(Parameter::int("network", "mtu", 1500, 576, 9000));

        // ONVIF frontend.
        add(Parameter::int("onvif", "http_port", 8080, 1, 65535));
        add(Parameter::int("onvif", "rtsp_port", 554, 1, 65535));
        add(Parameter::bool("onvif", "auth_enabled", false));
        add(Parameter::string("onvif", "username", ""));
        add(Parameter::string("onvif", "password", ""));
        add(Parameter::string("onvif", "scope_name", "OnvifCamera"));
        add(Parameter::string("onvif", "scope_location", "unknown"));
        add(Parameter::string("onvif", "discovery_mode", "Discoverable"));
        add(Parameter::int("onvif", "ptz_move_timeout", 10, 1, 300));
        add(Parameter::string("onvif", "log_level", "info"));
        add(Parameter::string("onvif", "log_file", ""));

        // Imaging defaults (ONVIF-level ranges).
        add(Parameter::int("imaging", "brightness", 50, 0, 100));
        add(Parameter::int("imaging", "contrast", 50, 0, 100));
        add(Parameter::int("imaging", "saturation", 50, 0, 100));
        add(Parameter::int("imaging", "sharpness", 50, 0, 100));
        add(Parameter::int("imaging", "hue", 0, -180, 180));

        // Automatic day/night switching.
        add(Parameter::bool("auto_daynight", "enabled", false));
        add(Parameter::int("auto_daynight", "check_interval", 10, 1, 3600));
        add(Parameter::float("auto_daynight", "day_threshold", 60.0, 0.0, 255.0));
        add(Parameter::float("auto_daynight", "night_threshold", 20.0, 0.0, 255.0));

        // Four stream profile slots. Slots 1 and 2 are the fixed built-in
        // main and sub streams; 3 and 4 are free for CreateProfile.
        for (n, enabled, name, w, h, fps, kbps) in [
            (1, true, "MainStream", 1920_i64, 1080_i64, 25_i64, 2048_i64),
            (2, true, "SubStream", 640, 360, 15, 512),
            (3, false, "", 640, 360, 15, 512),
            (4, false, "", 640, 360, 15, 512),
        ] {
            let section: &'static str = match n {
                1 => "stream_profile_1",
                2 => "stream_profile_2",
                3 => "stream_profile_3",
                _ => "stream_profile_4",
            };
            add(Parameter::bool(section, "enabled", enabled));
            add(Parameter::bool(section, "fixed", enabled));
            add(Parameter::string(section, "name", name));
            add(Parameter::int(section, "width", w, 160, 3840));
            add(Parameter::int(section, "height", h, 120, 2160));
            add(Parameter::int(section, "framerate", fps, 1, 60));
            add(Parameter::int(section, "bitrate", kbps, 32, 16384));
            add(Parameter::int(section, "gop", 50, 1, 300));
            add(Parameter::int(section, "quality", 70, 0, 100));
            add(Parameter::string(section, "encoding", "H264"));
        }

        // Eight user slots for the ONVIF user table.
        for n in 1..=8 {
            let section: &'static str = match n {
                1 => "user_1",
                2 => "user_2",
                3 => "user_3",
                4 => "user_4",
                5 => "user_5",
                6 => "user_6",
                7 => "user_7",
                _ => "user_8",
            };
            add(Parameter::string(section, "username", ""));
            add(Parameter::string(section, "password", ""));
            add(Parameter::string(section, "level", "User"));
        }

        Self { parameters }
    }

    /// Look up a parameter declaration.
    pub fn get(&self, section: &str, key: &str) -> Option<&Parameter> {
        self.parameters.get(&format!("{}.{}", section, key))
    }

    /// Default value for a parameter, if declared.
    pub fn default_value(&self, section: &str, key: &str) -> Option<&str> {
        self.get(section, key).map(|p| p.default.as_str())
    }

    /// Validate a candidate value against the declaration.
    ///
    /// Undeclared parameters pass: the tree may carry keys the core does not
    /// interpret (web UI settings survive round-trips untouched).
    pub fn validate(&self, section: &str, key: &str, value: &str) -> Result<(), SchemaError> {
        let Some(param) = self.get(section, key) else {
            return Ok(());
        };

        let numeric = match param.value_type {
            ValueType::Int => value.parse::<i64>().map(|v| v as f64).map_err(|_| {
                SchemaError::WrongType {
                    section: section.to_string(),
                    key: key.to_string(),
                    expected: "integer",
                }
            })?,
            ValueType::Float => value.parse::<f64>().map_err(|_| SchemaError::WrongType {
                section: section.to_string(),
                key: key.to_string(),
                expected: "float",
            })?,
            ValueType::Bool => {
                value.parse::<bool>().map_err(|_| SchemaError::WrongType {
                    section: section.to_string(),
                    key: key.to_string(),
                    expected: "boolean",
                })?;
                return Ok(());
            }
            ValueType::String => return Ok(()),
        };

        if let (Some(min), Some(max)) = (param.min, param.max)
            && (numeric < min || numeric > max)
        {
            return Err(SchemaError::OutOfRange {
                section: section.to_string(),
                key: key.to_string(),
                min,
                max,
            });
        }

        Ok(())
    }

    /// Iterate all declared parameters.
    pub fn parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.values()
    }
}

impl Default for ConfigSchema {
    fn default() -> Self {
        Self::new()
    }
}
