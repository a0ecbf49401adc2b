//! Layer manifest parsing.
//!
//! A manifest holds either a single `layer` object or a `layers` array; each
//! entry becomes a [`LayerProperties`] record. A record that fails validation
//! is dropped with a warning while the rest of the file still parses.

use std::path::{Path, PathBuf};

use serde_json::Value;

use super::{file_format_version, warn_unknown_format};
use crate::log::LogBits;
use crate::settings::LayerControl;
use crate::util::ApiVersion;

/// Well-known name of the override meta-layer.
pub const OVERRIDE_LAYER_NAME: &str = "VK_LAYER_LUNARG_override";
/// Conventional prefix for layer names; anything else draws a warning.
pub const LAYER_NAME_PREFIX: &str = "VK_LAYER_";

/// Manifest file-format version at which `pre_instance_functions` appeared.
const PRE_INSTANCE_FORMAT: (u32, u32, u32) = (1, 1, 2);

bitflags! {
    pub struct LayerType: u32 {
        const EXPLICIT = 0x1;
        const IMPLICIT = 0x2;
        const META     = 0x4;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibStatus {
    NotLoaded,
    Success,
    WrongBitType,
    OutOfMemory,
    FailedToLoad,
}

/// Which mechanism turned a layer on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnabledBy {
    Unset,
    Settings,
    Implicit,
    EnvVarInstanceLayers,
    EnvVarLayersEnable,
    Application,
    MetaLayer,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerExtension {
    pub name: String,
    pub spec_version: u32,
    pub entrypoints: Vec<String>,
}

/// Symbol names the loader resolves in the layer library; the manifest may
/// rename any of them.
#[derive(Debug, Clone)]
pub struct LayerFunctionNames {
    pub negotiate: String,
    pub get_instance_proc_addr: String,
    pub get_device_proc_addr: String,
}

impl Default for LayerFunctionNames {
    fn default() -> LayerFunctionNames {
        LayerFunctionNames {
            negotiate: "vkNegotiateLoaderLayerInterfaceVersion".to_owned(),
            get_instance_proc_addr: "vkGetInstanceProcAddr".to_owned(),
            get_device_proc_addr: "vkGetDeviceProcAddr".to_owned(),
        }
    }
}

/// One scanned layer, parse output plus the registry's runtime state.
#[derive(Debug, Clone)]
pub struct LayerProperties {
    pub name: String,
    pub description: String,
    pub spec_version: ApiVersion,
    pub implementation_version: u32,
    pub type_flags: LayerType,
    pub manifest_path: PathBuf,
    pub library_path: Option<PathBuf>,
    pub component_layers: Vec<String>,
    pub functions: LayerFunctionNames,
    pub instance_extensions: Vec<LayerExtension>,
    pub device_extensions: Vec<LayerExtension>,
    pub disable_env: Option<(String, String)>,
    pub enable_env: Option<(String, String)>,
    pub blacklisted_layers: Vec<String>,
    pub override_paths: Vec<String>,
    pub app_keys: Vec<String>,
    // Runtime state owned by the registry.
    pub control: LayerControl,
    pub settings_rank: Option<usize>,
    pub lib_status: LibStatus,
    pub enabled_by: EnabledBy,
}

impl LayerProperties {
    pub fn is_implicit(&self) -> bool {
        self.type_flags.contains(LayerType::IMPLICIT)
    }

    pub fn is_meta(&self) -> bool {
        self.type_flags.contains(LayerType::META)
    }

    pub fn is_override(&self) -> bool {
        self.is_meta() && self.name == OVERRIDE_LAYER_NAME
    }
}

fn pointer_width() -> u32 {
    (std::mem::size_of::<usize>() * 8) as u32
}

fn format_at_least(version: &str, wanted: (u32, u32, u32)) -> bool {
    let mut parts = version.split('.').map(|p| p.parse::<u32>().unwrap_or(0));
    let have = (
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
    );
    have >= wanted
}

fn string_or_number(value: &Value) -> Option<u32> {
    value
        .as_u64()
        .map(|n| n as u32)
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

/// The one-pair environment objects (`disable_environment`,
/// `enable_environment`).
fn parse_env_pair(value: Option<&Value>) -> Option<(String, String)> {
    let obj = value?.as_object()?;
    if obj.len() != 1 {
        return None;
    }
    let (k, v) = obj.iter().next()?;
    Some((k.clone(), v.as_str()?.to_owned()))
}

fn parse_string_array(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).map(str::to_owned).collect())
        .unwrap_or_default()
}

fn parse_extensions(value: Option<&Value>) -> Vec<LayerExtension> {
    let Some(list) = value.and_then(Value::as_array) else {
        return Vec::new();
    };
    list.iter()
        .filter_map(|e| {
            Some(LayerExtension {
                name: e.get("name")?.as_str()?.to_owned(),
                spec_version: e.get("spec_version").and_then(string_or_number).unwrap_or(1),
                entrypoints: parse_string_array(e.get("entrypoints")),
            })
        })
        .collect()
}

/// Parses one layer object from a manifest.
fn parse_layer_object(
    path: &Path,
    format: &str,
    layer: &Value,
    implicit: bool,
) -> Option<LayerProperties> {
    let warn_skip = |reason: &str| {
        loader_log!(
            LogBits::WARN | LogBits::LAYER,
            "layer manifest {}: {}, skipping record",
            path.display(),
            reason
        );
    };

    let Some(name) = layer.get("name").and_then(Value::as_str).filter(|s| !s.is_empty()) else {
        warn_skip("missing name");
        return None;
    };
    if !name.starts_with(LAYER_NAME_PREFIX) {
        loader_log!(
            LogBits::WARN | LogBits::LAYER,
            "layer manifest {}: name {} does not use the {} prefix",
            path.display(),
            name,
            LAYER_NAME_PREFIX
        );
    }

    match layer.get("type").and_then(Value::as_str) {
        Some("INSTANCE") | Some("GLOBAL") => {}
        Some("DEVICE") => {
            warn_skip("device-scope layers are not supported");
            return None;
        }
        _ => {
            warn_skip("missing or unrecognized type");
            return None;
        }
    }

    let Some(spec_version) =
        layer.get("api_version").and_then(Value::as_str).and_then(ApiVersion::parse)
    else {
        warn_skip("missing or malformed api_version");
        return None;
    };
    if spec_version.variant != 0 {
        warn_skip("unsupported API variant");
        return None;
    }

    let Some(implementation_version) =
        layer.get("implementation_version").and_then(string_or_number)
    else {
        warn_skip("missing implementation_version");
        return None;
    };

    let Some(description) = layer.get("description").and_then(Value::as_str) else {
        warn_skip("missing description");
        return None;
    };

    let library_path = layer.get("library_path").and_then(Value::as_str);
    let component_layers = parse_string_array(layer.get("component_layers"));
    let mut type_flags = if implicit { LayerType::IMPLICIT } else { LayerType::EXPLICIT };
    match (library_path, component_layers.is_empty()) {
        (Some(_), false) => {
            warn_skip("both library_path and component_layers present");
            return None;
        }
        (None, true) => {
            warn_skip("neither library_path nor component_layers present");
            return None;
        }
        (None, false) => type_flags |= LayerType::META,
        (Some(_), true) => {}
    }

    if let Some(arch) = layer.get("library_arch").and_then(Value::as_str) {
        if arch.parse::<u32>().ok() != Some(pointer_width()) {
            warn_skip("library_arch does not match the loader bit width");
            return None;
        }
    }

    let disable_env = parse_env_pair(layer.get("disable_environment"));
    let enable_env = parse_env_pair(layer.get("enable_environment"));
    if implicit && disable_env.is_none() && !type_flags.contains(LayerType::META) {
        warn_skip("implicit layer lacks a disable_environment pair");
        return None;
    }

    let mut functions = LayerFunctionNames::default();
    if let Some(f) = layer.get("functions").and_then(Value::as_object) {
        if let Some(v) = f.get("vkNegotiateLoaderLayerInterfaceVersion").and_then(Value::as_str) {
            functions.negotiate = v.to_owned();
        }
        if let Some(v) = f.get("vkGetInstanceProcAddr").and_then(Value::as_str) {
            functions.get_instance_proc_addr = v.to_owned();
        }
        if let Some(v) = f.get("vkGetDeviceProcAddr").and_then(Value::as_str) {
            functions.get_device_proc_addr = v.to_owned();
        }
    }

    if layer.get("pre_instance_functions").is_some()
        && !(implicit && format_at_least(format, PRE_INSTANCE_FORMAT))
    {
        loader_log!(
            LogBits::WARN | LogBits::LAYER,
            "layer manifest {}: pre_instance_functions requires an implicit layer and \
             file format {}.{}.{}; ignoring them",
            path.display(),
            PRE_INSTANCE_FORMAT.0,
            PRE_INSTANCE_FORMAT.1,
            PRE_INSTANCE_FORMAT.2
        );
    }

    let mut blacklisted_layers = parse_string_array(layer.get("blacklisted_layers"));
    let mut override_paths = parse_string_array(layer.get("override_paths"));
    let mut app_keys = parse_string_array(layer.get("app_keys"));
    if name != OVERRIDE_LAYER_NAME
        && (!blacklisted_layers.is_empty() || !override_paths.is_empty() || !app_keys.is_empty())
    {
        loader_log!(
            LogBits::WARN | LogBits::LAYER,
            "layer manifest {}: blacklisted_layers/override_paths/app_keys are reserved \
             for {}; ignoring them on {}",
            path.display(),
            OVERRIDE_LAYER_NAME,
            name
        );
        blacklisted_layers.clear();
        override_paths.clear();
        app_keys.clear();
    }

    Some(LayerProperties {
        name: name.to_owned(),
        description: description.to_owned(),
        spec_version,
        implementation_version,
        type_flags,
        manifest_path: path.to_owned(),
        library_path: library_path
            .map(|lp| super::driver::resolve_library_path(path, lp)),
        component_layers,
        functions,
        instance_extensions: parse_extensions(layer.get("instance_extensions")),
        device_extensions: parse_extensions(layer.get("device_extensions")),
        disable_env,
        enable_env,
        blacklisted_layers,
        override_paths,
        app_keys,
        control: LayerControl::Auto,
        settings_rank: None,
        lib_status: LibStatus::NotLoaded,
        enabled_by: EnabledBy::Unset,
    })
}

/// Parses every layer record in one manifest DOM.
pub fn parse_layer_manifest(path: &Path, dom: &Value, implicit: bool) -> Vec<LayerProperties> {
    let Some(format) = file_format_version(dom) else {
        loader_log!(
            LogBits::WARN | LogBits::LAYER,
            "layer manifest {}: missing file_format_version, skipping",
            path.display()
        );
        return Vec::new();
    };
    warn_unknown_format(path, format);

    if let Some(single) = dom.get("layer") {
        return parse_layer_object(path, format, single, implicit).into_iter().collect();
    }
    if let Some(list) = dom.get("layers").and_then(Value::as_array) {
        return list
            .iter()
            .filter_map(|l| parse_layer_object(path, format, l, implicit))
            .collect();
    }
    loader_log!(
        LogBits::WARN | LogBits::LAYER,
        "layer manifest {}: no layer or layers entry",
        path.display()
    );
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(v: Value, implicit: bool) -> Vec<LayerProperties> {
        parse_layer_manifest(Path::new("/layers/test.json"), &v, implicit)
    }

    fn basic_layer(name: &str) -> Value {
        json!({
            "name": name,
            "type": "INSTANCE",
            "api_version": "1.2.100",
            "implementation_version": "2",
            "description": "test layer",
            "library_path": "libtest_layer.so"
        })
    }

    #[test]
    fn single_layer_parses() {
        let got = parse(
            json!({ "file_format_version": "1.1.0", "layer": basic_layer("VK_LAYER_test_basic") }),
            false,
        );
        assert_eq!(got.len(), 1);
        let l = &got[0];
        assert_eq!(l.name, "VK_LAYER_test_basic");
        assert_eq!(l.implementation_version, 2);
        assert!(l.type_flags.contains(LayerType::EXPLICIT));
        assert!(!l.is_meta());
        assert_eq!(l.functions.negotiate, "vkNegotiateLoaderLayerInterfaceVersion");
    }

    #[test]
    fn bad_record_does_not_poison_siblings() {
        let mut broken = basic_layer("VK_LAYER_broken");
        broken.as_object_mut().unwrap().remove("description");
        let got = parse(
            json!({
                "file_format_version": "1.1.2",
                "layers": [broken, basic_layer("VK_LAYER_ok")]
            }),
            false,
        );
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].name, "VK_LAYER_ok");
    }

    #[test]
    fn device_type_is_rejected() {
        let mut l = basic_layer("VK_LAYER_dev");
        l["type"] = json!("DEVICE");
        assert!(parse(json!({ "file_format_version": "1.0.0", "layer": l }), false).is_empty());
    }

    #[test]
    fn implicit_requires_disable_environment() {
        let l = basic_layer("VK_LAYER_imp");
        assert!(parse(json!({ "file_format_version": "1.0.0", "layer": l }), true).is_empty());

        let mut l = basic_layer("VK_LAYER_imp");
        l["disable_environment"] = json!({ "DISABLE_IMP": "1" });
        l["enable_environment"] = json!({ "ENABLE_IMP": "1" });
        let got = parse(json!({ "file_format_version": "1.0.0", "layer": l }), true);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].disable_env, Some(("DISABLE_IMP".into(), "1".into())));
        assert_eq!(got[0].enable_env, Some(("ENABLE_IMP".into(), "1".into())));
        assert!(got[0].is_implicit());
    }

    #[test]
    fn meta_layer_needs_exactly_one_payload_source() {
        let mut both = basic_layer("VK_LAYER_meta");
        both["component_layers"] = json!(["VK_LAYER_a"]);
        assert!(parse(json!({ "file_format_version": "1.1.2", "layer": both }), false).is_empty());

        let mut meta = basic_layer("VK_LAYER_meta");
        meta.as_object_mut().unwrap().remove("library_path");
        meta["component_layers"] = json!(["VK_LAYER_a", "VK_LAYER_b"]);
        let got = parse(json!({ "file_format_version": "1.1.2", "layer": meta }), false);
        assert_eq!(got.len(), 1);
        assert!(got[0].is_meta());
        assert_eq!(got[0].component_layers, vec!["VK_LAYER_a", "VK_LAYER_b"]);
    }

    #[test]
    fn override_fields_reserved_for_override_layer() {
        let mut l = basic_layer("VK_LAYER_not_override");
        l["blacklisted_layers"] = json!(["VK_LAYER_bad"]);
        let got = parse(json!({ "file_format_version": "1.2.0", "layer": l }), false);
        assert!(got[0].blacklisted_layers.is_empty());

        let mut o = basic_layer(OVERRIDE_LAYER_NAME);
        o.as_object_mut().unwrap().remove("library_path");
        o["component_layers"] = json!(["VK_LAYER_a"]);
        o["blacklisted_layers"] = json!(["VK_LAYER_bad"]);
        o["override_paths"] = json!(["/opt/layers"]);
        o["app_keys"] = json!(["/usr/bin/game"]);
        let got = parse(json!({ "file_format_version": "1.2.0", "layer": o }), true);
        assert_eq!(got[0].blacklisted_layers, vec!["VK_LAYER_bad"]);
        assert_eq!(got[0].override_paths, vec!["/opt/layers"]);
        assert!(got[0].is_override());
    }

    #[test]
    fn extension_lists_carry_entrypoints() {
        let mut l = basic_layer("VK_LAYER_ext");
        l["device_extensions"] = json!([
            { "name": "VK_EXT_fake", "spec_version": "3",
              "entrypoints": ["vkFakeEXT", "vkFakeTwoEXT"] }
        ]);
        l["instance_extensions"] = json!([{ "name": "VK_EXT_surface_fake", "spec_version": 1 }]);
        let got = parse(json!({ "file_format_version": "1.1.0", "layer": l }), false);
        assert_eq!(got[0].device_extensions[0].entrypoints.len(), 2);
        assert_eq!(got[0].instance_extensions[0].name, "VK_EXT_surface_fake");
    }
}
