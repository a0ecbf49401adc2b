//! The layer registry: scanning, override arbitration, meta-layer
//! validation, blacklisting, and the activation rules applied at instance
//! creation.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::env;
use crate::error::{LoaderError, Result};
use crate::filter::LayerFilters;
use crate::log::LogBits;
use crate::manifest::discovery::{discover_manifests, ManifestKind};
use crate::manifest::layer::{parse_layer_manifest, EnabledBy, LayerProperties};
use crate::manifest::read_manifest_dom;
use crate::settings::{LayerControl, LoaderSettings};
use crate::util::ApiVersion;

/// The flat list of scanned layers after registry processing.
#[derive(Default)]
pub struct LayerList {
    pub layers: Vec<LayerProperties>,
}

impl LayerList {
    pub fn find(&self, name: &str) -> Option<&LayerProperties> {
        self.layers.iter().find(|l| l.name == name)
    }

    /// Layers visible to `vkEnumerateInstanceLayerProperties`: everything the
    /// settings file has not switched off.
    pub fn enumerable(&self) -> impl Iterator<Item = &LayerProperties> {
        self.layers.iter().filter(|l| l.control != LayerControl::Off)
    }
}

fn parse_manifests_of_kind(
    kind: ManifestKind,
    extra_paths: &[PathBuf],
    out: &mut Vec<LayerProperties>,
) {
    let implicit = kind == ManifestKind::ImplicitLayer;
    for path in discover_manifests(kind, None, extra_paths, false, true) {
        match read_manifest_dom(&path) {
            Ok(dom) => out.extend(parse_layer_manifest(&path, &dom, implicit)),
            Err(err) => loader_log!(
                LogBits::WARN | LogBits::LAYER,
                "layer manifest {} unreadable: {}",
                path.display(),
                err
            ),
        }
    }
}

/// Keeps at most one override layer: a keyed override matching the running
/// executable wins, then a keyless one; keyed non-matching overrides drop.
fn prune_override_layers(layers: &mut Vec<LayerProperties>) {
    let exe = env::executable_path();
    let mut keyed_match = None;
    let mut keyless = None;
    for (idx, layer) in layers.iter().enumerate() {
        if !layer.is_override() {
            continue;
        }
        if layer.app_keys.is_empty() {
            keyless = keyless.or(Some(idx));
        } else if let Some(exe) = exe.as_deref() {
            if layer.app_keys.iter().any(|k| std::path::Path::new(k) == exe) {
                keyed_match = keyed_match.or(Some(idx));
            }
        }
    }
    let winner = keyed_match.or(keyless);
    let mut idx = 0;
    layers.retain(|l| {
        let keep = !l.is_override() || Some(idx) == winner;
        idx += 1;
        keep
    });
}

/// First occurrence of each name wins; later duplicates (same layer found
/// through two search paths) are dropped with an info message.
fn dedup_by_name(layers: &mut Vec<LayerProperties>) {
    let mut seen: HashMap<String, ()> = HashMap::new();
    layers.retain(|l| {
        if seen.insert(l.name.clone(), ()).is_none() {
            true
        } else {
            loader_log!(
                LogBits::INFO | LogBits::LAYER,
                "duplicate layer {} from {} ignored",
                l.name,
                l.manifest_path.display()
            );
            false
        }
    });
}

#[derive(Clone, Copy, PartialEq)]
enum MetaState {
    Unvisited,
    InStack,
    Valid,
    Invalid,
}

/// Depth-first walk of one meta-layer: validates component existence and
/// version, detects reference cycles, and collects the component extension
/// lists for upward propagation.
fn visit_meta(
    idx: usize,
    layers: &[LayerProperties],
    by_name: &HashMap<String, usize>,
    states: &mut [MetaState],
    gathered: &mut Vec<(usize, Vec<crate::manifest::layer::LayerExtension>, Vec<crate::manifest::layer::LayerExtension>)>,
) -> bool {
    match states[idx] {
        MetaState::Valid => return true,
        MetaState::Invalid => return false,
        MetaState::InStack => {
            // A cycle: the caller unwinds marking every participant invalid.
            states[idx] = MetaState::Invalid;
            loader_log!(
                LogBits::ERROR | LogBits::LAYER,
                "meta-layer {} participates in a component cycle",
                layers[idx].name
            );
            return false;
        }
        MetaState::Unvisited => {}
    }
    if !layers[idx].is_meta() {
        states[idx] = MetaState::Valid;
        return true;
    }

    states[idx] = MetaState::InStack;
    let mut instance_exts = Vec::new();
    let mut device_exts = Vec::new();
    let mut valid = true;
    for component in &layers[idx].component_layers {
        if component == &layers[idx].name {
            loader_log!(
                LogBits::ERROR | LogBits::LAYER,
                "meta-layer {} lists itself as a component",
                layers[idx].name
            );
            valid = false;
            break;
        }
        let Some(&comp_idx) = by_name.get(component.as_str()) else {
            loader_log!(
                LogBits::WARN | LogBits::LAYER,
                "meta-layer {} component {} not found",
                layers[idx].name,
                component
            );
            valid = false;
            break;
        };
        if !visit_meta(comp_idx, layers, by_name, states, gathered) {
            valid = false;
            break;
        }
        let comp = &layers[comp_idx];
        if comp.spec_version < layers[idx].spec_version {
            loader_log!(
                LogBits::WARN | LogBits::LAYER,
                "meta-layer {} (API {}) uses component {} with older API {}",
                layers[idx].name,
                layers[idx].spec_version,
                comp.name,
                comp.spec_version
            );
        }
        instance_exts.extend(comp.instance_extensions.iter().cloned());
        device_exts.extend(comp.device_extensions.iter().cloned());
        // Nested meta-layers contribute what they already gathered.
        if let Some((_, inst, dev)) = gathered.iter().find(|(i, _, _)| *i == comp_idx) {
            instance_exts.extend(inst.iter().cloned());
            device_exts.extend(dev.iter().cloned());
        }
    }

    states[idx] = if valid { MetaState::Valid } else { MetaState::Invalid };
    if valid {
        gathered.push((idx, instance_exts, device_exts));
    }
    valid
}

/// Validates every meta-layer and propagates component extension lists
/// upward; invalid meta-layers are removed from the list.
fn verify_meta_layers(layers: &mut Vec<LayerProperties>) {
    let by_name: HashMap<String, usize> = layers
        .iter()
        .enumerate()
        .map(|(i, l)| (l.name.clone(), i))
        .collect();
    let mut states = vec![MetaState::Unvisited; layers.len()];
    let mut gathered = Vec::new();
    for idx in 0..layers.len() {
        visit_meta(idx, layers, &by_name, &mut states, &mut gathered);
    }

    for (idx, instance_exts, device_exts) in gathered {
        let layer = &mut layers[idx];
        for ext in instance_exts {
            if !layer.instance_extensions.iter().any(|e| e.name == ext.name) {
                layer.instance_extensions.push(ext);
            }
        }
        for ext in device_exts {
            if !layer.device_extensions.iter().any(|e| e.name == ext.name) {
                layer.device_extensions.push(ext);
            }
        }
    }

    let mut idx = 0;
    layers.retain(|_| {
        let keep = states[idx] != MetaState::Invalid;
        idx += 1;
        keep
    });
}

/// Removes every layer a valid override layer blacklists.
fn apply_blacklist(layers: &mut Vec<LayerProperties>) {
    let blacklist: Vec<String> = match layers.iter().find(|l| l.is_override()) {
        Some(ov) => ov.blacklisted_layers.clone(),
        None => return,
    };
    layers.retain(|l| {
        if !l.is_override() && blacklist.contains(&l.name) {
            loader_log!(
                LogBits::INFO | LogBits::LAYER,
                "layer {} removed by override layer blacklist",
                l.name
            );
            false
        } else {
            true
        }
    });
}

fn apply_settings(layers: &mut [LayerProperties], settings: &LoaderSettings) {
    for layer in layers.iter_mut() {
        let (control, rank) = settings.layer_control(&layer.name);
        layer.control = control;
        layer.settings_rank = rank;
    }
}

/// Scans every layer manifest and runs the registry pipeline: override
/// pruning, meta-layer validation, blacklist application, settings controls.
pub fn scan_layers(settings: &LoaderSettings) -> LayerList {
    let mut layers = Vec::new();
    parse_manifests_of_kind(ManifestKind::ImplicitLayer, &[], &mut layers);
    prune_override_layers(&mut layers);

    let override_paths: Vec<PathBuf> = layers
        .iter()
        .find(|l| l.is_override())
        .map(|l| l.override_paths.iter().map(PathBuf::from).collect())
        .unwrap_or_default();
    parse_manifests_of_kind(ManifestKind::ExplicitLayer, &override_paths, &mut layers);

    dedup_by_name(&mut layers);
    apply_settings(&mut layers, settings);
    verify_meta_layers(&mut layers);
    apply_blacklist(&mut layers);
    process_layer_list(layers)
}

/// The registry pipeline for an already-assembled flat list; [`scan_layers`]
/// and the tests share it.
pub fn process_layer_list(layers: Vec<LayerProperties>) -> LayerList {
    for layer in &layers {
        if layer.is_implicit() && !layer.is_meta() && layer.disable_env.is_none() {
            loader_log!(
                LogBits::WARN | LogBits::LAYER,
                "implicit layer {} has no disable environment variable",
                layer.name
            );
        }
    }
    LayerList { layers }
}

/// Runs the full registry pipeline over a caller-supplied flat list; used by
/// tests that bypass filesystem discovery.
pub fn build_registry(mut layers: Vec<LayerProperties>, settings: &LoaderSettings) -> LayerList {
    prune_override_layers(&mut layers);
    dedup_by_name(&mut layers);
    apply_settings(&mut layers, settings);
    verify_meta_layers(&mut layers);
    apply_blacklist(&mut layers);
    process_layer_list(layers)
}

/// Whether an implicit layer's own environment gates turn it on.
fn implicit_gates_pass(layer: &LayerProperties) -> bool {
    if let Some((var, _)) = &layer.disable_env {
        if let Some(value) = env::env_var(var) {
            if value != "0" && !value.eq_ignore_ascii_case("false") {
                return false;
            }
        }
    }
    match &layer.enable_env {
        None => true,
        Some((var, wanted)) => env::env_var(var).as_deref() == Some(wanted.as_str()),
    }
}

/// The ordered activation output: the composite list keeps meta-layers, the
/// expanded list resolves them to their components.
#[derive(Debug)]
pub struct ActivatedLayers {
    pub composite: Vec<LayerProperties>,
    pub expanded: Vec<LayerProperties>,
}

fn expand_into(
    layer: &LayerProperties,
    list: &LayerList,
    filters: &LayerFilters,
    out: &mut Vec<LayerProperties>,
) {
    if layer.is_meta() {
        for component in &layer.component_layers {
            let Some(comp) = list.find(component) else { continue };
            // The disable filter still applies to components, unless allow or
            // enable pull them back in.
            if filters.is_disabled(&comp.name, comp.is_implicit()) {
                continue;
            }
            let mut comp = comp.clone();
            comp.enabled_by = EnabledBy::MetaLayer;
            expand_into(&comp, list, filters, out);
        }
    } else {
        out.push(layer.clone());
    }
}

/// Deduplicates by name, last occurrence wins.
fn dedup_last_wins(layers: &mut Vec<LayerProperties>) {
    let mut kept: Vec<LayerProperties> = Vec::new();
    for layer in layers.drain(..) {
        kept.retain(|l| l.name != layer.name);
        kept.push(layer);
    }
    *layers = kept;
}

/// Computes the activated layer lists for one instance creation.
///
/// Order of accumulation: settings-forced layers, implicit layers, the
/// layers-enable filter, `VK_INSTANCE_LAYERS`, then the application's list;
/// later mentions of a name win the position.
pub fn compute_activated_layers(
    list: &LayerList,
    app_requested: &[String],
    filters: &LayerFilters,
    settings: &LoaderSettings,
    app_api_version: ApiVersion,
) -> Result<ActivatedLayers> {
    let mut composite: Vec<LayerProperties> = Vec::new();
    let mut push = |layer: &LayerProperties, enabled_by: EnabledBy, composite: &mut Vec<LayerProperties>| {
        let mut layer = layer.clone();
        layer.enabled_by = enabled_by;
        composite.push(layer);
    };

    for layer in &list.layers {
        if layer.control == LayerControl::On {
            push(layer, EnabledBy::Settings, &mut composite);
        } else if layer.control != LayerControl::Off
            && layer.is_implicit()
            && implicit_gates_pass(layer)
            && !filters.is_disabled(&layer.name, true)
        {
            push(layer, EnabledBy::Implicit, &mut composite);
        }
    }

    for layer in &list.layers {
        if layer.control != LayerControl::Off
            && filters.is_force_enabled(&layer.name, layer.is_implicit())
            && !composite.iter().any(|l| l.name == layer.name)
        {
            push(layer, EnabledBy::EnvVarLayersEnable, &mut composite);
        }
    }

    if let Some(value) = env::env_var(env::VK_INSTANCE_LAYERS_ENV_VAR) {
        for name in env::split_path_list(&value) {
            match list.find(&name) {
                Some(layer)
                    if layer.control != LayerControl::Off
                        && !filters.is_disabled(&layer.name, layer.is_implicit()) =>
                {
                    push(layer, EnabledBy::EnvVarInstanceLayers, &mut composite);
                }
                _ => loader_log!(
                    LogBits::WARN | LogBits::LAYER,
                    "VK_INSTANCE_LAYERS names unavailable layer {}",
                    name
                ),
            }
        }
    }

    for name in app_requested {
        let Some(layer) = list.find(name) else {
            return Err(LoaderError::LayerNotPresent(name.clone()));
        };
        if layer.control == LayerControl::Off {
            return Err(LoaderError::LayerNotPresent(name.clone()));
        }
        if filters.is_disabled(&layer.name, layer.is_implicit()) {
            return Err(LoaderError::LayerNotPresent(name.clone()));
        }
        push(layer, EnabledBy::Application, &mut composite);
    }

    dedup_last_wins(&mut composite);

    // Settings file ordering: ranked layers first in file order, the rest
    // keep their accumulated position.
    if settings.active && composite.iter().any(|l| l.settings_rank.is_some()) {
        composite.sort_by_key(|l| l.settings_rank.unwrap_or(usize::MAX));
    }

    for layer in &composite {
        if layer.spec_version < app_api_version {
            loader_log!(
                LogBits::WARN | LogBits::LAYER,
                "layer {} implements API {} but the application requested {}",
                layer.name,
                layer.spec_version,
                app_api_version
            );
        }
    }

    let mut expanded = Vec::new();
    for layer in &composite {
        expand_into(layer, list, filters, &mut expanded);
    }
    dedup_last_wins(&mut expanded);

    Ok(ActivatedLayers { composite, expanded })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::layer::{LayerFunctionNames, LayerType, LibStatus, OVERRIDE_LAYER_NAME};
    use std::path::PathBuf;

    fn layer(name: &str, ty: LayerType) -> LayerProperties {
        LayerProperties {
            name: name.to_owned(),
            description: "test".to_owned(),
            spec_version: ApiVersion::parse("1.1.0").unwrap(),
            implementation_version: 1,
            type_flags: ty,
            manifest_path: PathBuf::from("/test.json"),
            library_path: Some(PathBuf::from("libtest.so")),
            component_layers: Vec::new(),
            functions: LayerFunctionNames::default(),
            instance_extensions: Vec::new(),
            device_extensions: Vec::new(),
            disable_env: Some(("DISABLE_TEST".into(), "1".into())),
            enable_env: None,
            blacklisted_layers: Vec::new(),
            override_paths: Vec::new(),
            app_keys: Vec::new(),
            control: LayerControl::Auto,
            settings_rank: None,
            lib_status: LibStatus::NotLoaded,
            enabled_by: EnabledBy::Unset,
        }
    }

    fn meta(name: &str, components: &[&str]) -> LayerProperties {
        let mut l = layer(name, LayerType::IMPLICIT | LayerType::META);
        l.library_path = None;
        l.component_layers = components.iter().map(|s| s.to_string()).collect();
        l
    }

    fn no_filters() -> LayerFilters {
        LayerFilters {
            enable: crate::filter::FilterList::default(),
            disable: crate::filter::FilterList::default(),
            allow: crate::filter::FilterList::default(),
        }
    }

    #[test]
    fn meta_cycle_invalidates_participants() {
        let mut a = meta("VK_LAYER_meta_a", &["VK_LAYER_meta_b"]);
        a.type_flags = LayerType::EXPLICIT | LayerType::META;
        let mut b = meta("VK_LAYER_meta_b", &["VK_LAYER_meta_a"]);
        b.type_flags = LayerType::EXPLICIT | LayerType::META;
        let plain = layer("VK_LAYER_plain", LayerType::EXPLICIT);
        let registry =
            build_registry(vec![a, b, plain], &LoaderSettings::inactive());
        assert!(registry.find("VK_LAYER_meta_a").is_none());
        assert!(registry.find("VK_LAYER_meta_b").is_none());
        assert!(registry.find("VK_LAYER_plain").is_some());
    }

    #[test]
    fn meta_expansion_is_idempotent_and_propagates_extensions() {
        let mut comp_a = layer("VK_LAYER_comp_a", LayerType::EXPLICIT);
        comp_a.instance_extensions.push(crate::manifest::layer::LayerExtension {
            name: "VK_EXT_from_a".into(),
            spec_version: 1,
            entrypoints: Vec::new(),
        });
        let comp_b = layer("VK_LAYER_comp_b", LayerType::EXPLICIT);
        let m = meta("VK_LAYER_top_meta", &["VK_LAYER_comp_a", "VK_LAYER_comp_b"]);
        let registry = build_registry(
            vec![comp_a, comp_b, m],
            &LoaderSettings::inactive(),
        );
        let top = registry.find("VK_LAYER_top_meta").unwrap();
        assert!(top.instance_extensions.iter().any(|e| e.name == "VK_EXT_from_a"));

        let filters = no_filters();
        let activated = compute_activated_layers(
            &registry,
            &[],
            &filters,
            &LoaderSettings::inactive(),
            ApiVersion::V1_1,
        )
        .unwrap();
        let names: Vec<&str> = activated.expanded.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["VK_LAYER_comp_a", "VK_LAYER_comp_b"]);
        // Expanding a list that no longer holds meta-layers changes nothing.
        let mut re_expanded = Vec::new();
        for l in &activated.expanded {
            expand_into(l, &registry, &filters, &mut re_expanded);
        }
        dedup_last_wins(&mut re_expanded);
        let re_names: Vec<&str> = re_expanded.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(re_names, names);
    }

    #[test]
    fn missing_component_invalidates_meta() {
        let m = meta("VK_LAYER_lonely_meta", &["VK_LAYER_ghost"]);
        let registry = build_registry(vec![m], &LoaderSettings::inactive());
        assert!(registry.find("VK_LAYER_lonely_meta").is_none());
    }

    #[test]
    fn override_blacklist_removes_layer_and_app_request_fails() {
        let bad = layer("VK_LAYER_bad", LayerType::EXPLICIT);
        let good = layer("VK_LAYER_good", LayerType::EXPLICIT);
        let mut ov = meta(OVERRIDE_LAYER_NAME, &["VK_LAYER_good"]);
        ov.blacklisted_layers = vec!["VK_LAYER_bad".into()];
        let registry = build_registry(vec![bad, good, ov], &LoaderSettings::inactive());
        assert!(registry.find("VK_LAYER_bad").is_none());
        assert!(registry.enumerable().all(|l| l.name != "VK_LAYER_bad"));

        let err = compute_activated_layers(
            &registry,
            &["VK_LAYER_bad".to_owned()],
            &no_filters(),
            &LoaderSettings::inactive(),
            ApiVersion::V1_0,
        )
        .unwrap_err();
        assert!(matches!(err, LoaderError::LayerNotPresent(_)));
    }

    #[test]
    fn keyed_override_beats_keyless_only_when_exe_matches() {
        let mut keyed = meta(OVERRIDE_LAYER_NAME, &["VK_LAYER_a"]);
        keyed.app_keys = vec!["/no/such/binary".into()];
        let keyless = meta(OVERRIDE_LAYER_NAME, &["VK_LAYER_b"]);
        let a = layer("VK_LAYER_a", LayerType::EXPLICIT);
        let b = layer("VK_LAYER_b", LayerType::EXPLICIT);
        let registry = build_registry(
            vec![keyed, keyless, a, b],
            &LoaderSettings::inactive(),
        );
        let ov = registry
            .layers
            .iter()
            .find(|l| l.is_override())
            .expect("keyless override survives");
        assert_eq!(ov.component_layers, vec!["VK_LAYER_b"]);

        // With only a non-matching keyed override, no override remains.
        let mut keyed = meta(OVERRIDE_LAYER_NAME, &["VK_LAYER_a"]);
        keyed.app_keys = vec!["/no/such/binary".into()];
        let a = layer("VK_LAYER_a", LayerType::EXPLICIT);
        let registry = build_registry(vec![keyed, a], &LoaderSettings::inactive());
        assert!(registry.layers.iter().all(|l| !l.is_override()));
    }

    #[test]
    fn settings_off_fails_app_request_and_hides_from_enumeration() {
        let l = layer("VK_LAYER_managed", LayerType::EXPLICIT);
        let mut settings = LoaderSettings::inactive();
        settings.active = true;
        settings.layers.push(crate::settings::SettingsLayer {
            name: "VK_LAYER_managed".into(),
            control: LayerControl::Off,
            treat_as_implicit: false,
        });
        let registry = build_registry(vec![l], &settings);
        assert!(registry.enumerable().next().is_none());
        let err = compute_activated_layers(
            &registry,
            &["VK_LAYER_managed".to_owned()],
            &no_filters(),
            &settings,
            ApiVersion::V1_0,
        )
        .unwrap_err();
        assert!(matches!(err, LoaderError::LayerNotPresent(_)));
    }

    #[test]
    fn implicit_layer_enable_env_gating() {
        let mut l = layer("VK_LAYER_gated", LayerType::IMPLICIT);
        l.enable_env = Some(("VKL_TEST_ENABLE_GATED".into(), "1".into()));
        let registry = build_registry(vec![l], &LoaderSettings::inactive());
        let activate = |filters: &LayerFilters| {
            compute_activated_layers(
                &registry,
                &[],
                filters,
                &LoaderSettings::inactive(),
                ApiVersion::V1_0,
            )
            .unwrap()
        };

        // Variable unset, or set to the wrong value: inactive.
        std::env::remove_var("VKL_TEST_ENABLE_GATED");
        assert!(activate(&no_filters()).expanded.is_empty());
        std::env::set_var("VKL_TEST_ENABLE_GATED", "0");
        assert!(activate(&no_filters()).expanded.is_empty());

        // Exactly the configured value: active.
        std::env::set_var("VKL_TEST_ENABLE_GATED", "1");
        assert_eq!(activate(&no_filters()).expanded.len(), 1);

        // The disable filter wins over the enable gate.
        let mut filters = no_filters();
        filters.disable = crate::filter::FilterList::parse("VK_LAYER_gated");
        assert!(activate(&filters).expanded.is_empty());

        // And the allow filter pulls it back in.
        filters.allow = crate::filter::FilterList::parse("*gated");
        assert_eq!(activate(&filters).expanded.len(), 1);

        std::env::remove_var("VKL_TEST_ENABLE_GATED");
    }

    #[test]
    fn app_request_dedups_last_wins() {
        let a = layer("VK_LAYER_a", LayerType::EXPLICIT);
        let b = layer("VK_LAYER_b", LayerType::EXPLICIT);
        let registry = build_registry(vec![a, b], &LoaderSettings::inactive());
        let activated = compute_activated_layers(
            &registry,
            &["VK_LAYER_a".into(), "VK_LAYER_b".into(), "VK_LAYER_a".into()],
            &no_filters(),
            &LoaderSettings::inactive(),
            ApiVersion::V1_0,
        )
        .unwrap();
        let names: Vec<&str> = activated.composite.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["VK_LAYER_b", "VK_LAYER_a"]);
    }
}
