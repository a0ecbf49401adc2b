//! The loader-wide settings file.
//!
//! An optional JSON file lets a control panel decide per-layer activation,
//! add driver search paths, pick and order devices, and veto driver
//! environment variables. The file is read once per instance creation; the
//! instance keeps the snapshot so mid-lifetime edits cannot tear state.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::env;
use crate::log::LogBits;
use crate::manifest::read_manifest_dom;

pub const SETTINGS_FILE_NAME: &str = "vk_loader_settings.json";
const SETTINGS_DIR: &str = "vulkan/loader_settings.d";

/// Per-layer control value from the settings file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerControl {
    /// Force the layer on.
    On,
    /// Force the layer off; application requests for it fail.
    Off,
    /// Ordinary activation rules apply.
    Auto,
    /// Active per ordinary rules but exempt from settings ordering.
    Unordered,
}

impl LayerControl {
    fn parse(s: &str) -> LayerControl {
        match s {
            "on" => LayerControl::On,
            "off" => LayerControl::Off,
            "unordered_layer_location" | "unordered" => LayerControl::Unordered,
            _ => LayerControl::Auto,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SettingsLayer {
    pub name: String,
    pub control: LayerControl,
    pub treat_as_implicit: bool,
}

/// One preferred adapter, matched against drivers by UUID.
#[derive(Debug, Clone)]
pub struct DeviceConfiguration {
    pub device_name: String,
    pub device_uuid: [u8; 16],
    pub ordinal: u32,
}

#[derive(Debug, Clone, Default)]
pub struct LoaderSettings {
    /// Whether a settings file was found and parsed.
    pub active: bool,
    pub layers: Vec<SettingsLayer>,
    pub additional_driver_paths: Vec<PathBuf>,
    pub device_configurations: Vec<DeviceConfiguration>,
    pub allow_driver_env_vars: bool,
}

fn parse_uuid(s: &str) -> Option<[u8; 16]> {
    let hex: String = s.chars().filter(|c| *c != '-').collect();
    if hex.len() != 32 {
        return None;
    }
    let mut out = [0u8; 16];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok()?;
    }
    Some(out)
}

/// Picks the settings object that applies to this process: one whose
/// `app_keys` names the running executable wins over the keyless default.
fn select_settings_object<'v>(dom: &'v Value) -> Option<&'v Value> {
    let settings = dom.get("settings")?;
    let Some(array) = settings.as_array() else {
        return Some(settings);
    };
    let exe = env::executable_path();
    let mut keyless = None;
    for entry in array {
        let keys = entry.get("app_keys").and_then(Value::as_array);
        match keys {
            Some(keys) if !keys.is_empty() => {
                if let Some(exe) = exe.as_deref() {
                    if keys
                        .iter()
                        .filter_map(Value::as_str)
                        .any(|k| Path::new(k) == exe)
                    {
                        return Some(entry);
                    }
                }
            }
            _ => keyless = keyless.or(Some(entry)),
        }
    }
    keyless
}

impl LoaderSettings {
    pub fn inactive() -> LoaderSettings {
        LoaderSettings { allow_driver_env_vars: true, ..LoaderSettings::default() }
    }

    pub fn from_dom(dom: &Value) -> LoaderSettings {
        let mut out = LoaderSettings::inactive();
        let Some(settings) = select_settings_object(dom) else {
            return out;
        };
        out.active = true;

        if let Some(layers) = settings.get("layers").and_then(Value::as_array) {
            out.layers = layers
                .iter()
                .filter_map(|l| {
                    Some(SettingsLayer {
                        name: l.get("name")?.as_str()?.to_owned(),
                        control: LayerControl::parse(l.get("control")?.as_str()?),
                        treat_as_implicit: l
                            .get("treat_as_implicit_manifest")
                            .and_then(Value::as_bool)
                            .unwrap_or(false),
                    })
                })
                .collect();
        }

        if let Some(paths) = settings.get("additional_driver_paths").and_then(Value::as_array) {
            out.additional_driver_paths = paths
                .iter()
                .filter_map(Value::as_str)
                .map(PathBuf::from)
                .collect();
        }

        if let Some(devices) = settings.get("device_configurations").and_then(Value::as_array) {
            out.device_configurations = devices
                .iter()
                .filter_map(|d| {
                    Some(DeviceConfiguration {
                        device_name: d
                            .get("deviceName")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_owned(),
                        device_uuid: parse_uuid(d.get("deviceUUID")?.as_str()?)?,
                        ordinal: d.get("ordinal").and_then(Value::as_u64).unwrap_or(0) as u32,
                    })
                })
                .collect();
            out.device_configurations.sort_by_key(|d| d.ordinal);
        }

        if let Some(allow) = settings
            .get("allow_driver_environment_variables")
            .and_then(Value::as_bool)
        {
            out.allow_driver_env_vars = allow;
        }
        out
    }

    /// Candidate locations, per-user first.
    fn candidate_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(config) = env::xdg_config_home() {
            paths.push(config.join(SETTINGS_DIR).join(SETTINGS_FILE_NAME));
        }
        paths.push(
            Path::new(env::SYSCONFDIR).join(SETTINGS_DIR).join(SETTINGS_FILE_NAME),
        );
        paths
    }

    /// Reads the settings snapshot for this instance creation.
    pub fn load() -> LoaderSettings {
        for path in Self::candidate_paths() {
            if !path.is_file() {
                continue;
            }
            match read_manifest_dom(&path) {
                Ok(dom) => {
                    loader_log!(LogBits::INFO, "using loader settings file {}", path.display());
                    return LoaderSettings::from_dom(&dom);
                }
                Err(err) => {
                    loader_log!(
                        LogBits::WARN,
                        "failed to read settings file {}: {}",
                        path.display(),
                        err
                    );
                }
            }
        }
        LoaderSettings::inactive()
    }

    /// The control value and ordering rank the settings file assigns to a
    /// layer. Without a file everything is `Auto` and unranked.
    pub fn layer_control(&self, name: &str) -> (LayerControl, Option<usize>) {
        for (rank, layer) in self.layers.iter().enumerate() {
            if layer.name == name {
                let rank = match layer.control {
                    LayerControl::Unordered => None,
                    _ => Some(rank),
                };
                return (layer.control, rank);
            }
        }
        (LayerControl::Auto, None)
    }

    /// Whether driver discovery may honor `VK_DRIVER_FILES` and friends.
    pub fn driver_env_vars_allowed(&self) -> bool {
        !self.active || self.allow_driver_env_vars
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn layer_controls_and_ranks() {
        let dom = json!({
            "file_format_version": "1.0.0",
            "settings": {
                "layers": [
                    { "name": "VK_LAYER_first", "control": "on" },
                    { "name": "VK_LAYER_second", "control": "off" },
                    { "name": "VK_LAYER_loose", "control": "unordered_layer_location" },
                ]
            }
        });
        let s = LoaderSettings::from_dom(&dom);
        assert!(s.active);
        assert_eq!(s.layer_control("VK_LAYER_first"), (LayerControl::On, Some(0)));
        assert_eq!(s.layer_control("VK_LAYER_second"), (LayerControl::Off, Some(1)));
        assert_eq!(s.layer_control("VK_LAYER_loose"), (LayerControl::Unordered, None));
        assert_eq!(s.layer_control("VK_LAYER_absent"), (LayerControl::Auto, None));
    }

    #[test]
    fn device_configurations_sorted_by_ordinal() {
        let dom = json!({
            "settings": {
                "device_configurations": [
                    { "deviceName": "b", "deviceUUID": "00112233445566778899aabbccddeeff",
                      "ordinal": 1 },
                    { "deviceName": "a", "deviceUUID": "ffeeddccbbaa99887766554433221100",
                      "ordinal": 0 },
                    { "deviceName": "broken", "deviceUUID": "nope" },
                ]
            }
        });
        let s = LoaderSettings::from_dom(&dom);
        assert_eq!(s.device_configurations.len(), 2);
        assert_eq!(s.device_configurations[0].device_name, "a");
        assert_eq!(s.device_configurations[0].device_uuid[0], 0xff);
    }

    #[test]
    fn driver_env_vars_can_be_vetoed() {
        assert!(LoaderSettings::inactive().driver_env_vars_allowed());
        let s = LoaderSettings::from_dom(&json!({
            "settings": { "allow_driver_environment_variables": false }
        }));
        assert!(!s.driver_env_vars_allowed());
    }

    #[test]
    fn app_keyed_settings_fall_back_to_keyless() {
        let dom = json!({
            "settings": [
                { "app_keys": ["/nonexistent/binary"],
                  "layers": [{ "name": "VK_LAYER_keyed", "control": "on" }] },
                { "layers": [{ "name": "VK_LAYER_global", "control": "on" }] },
            ]
        });
        let s = LoaderSettings::from_dom(&dom);
        assert_eq!(s.layers.len(), 1);
        assert_eq!(s.layers[0].name, "VK_LAYER_global");
    }
}
