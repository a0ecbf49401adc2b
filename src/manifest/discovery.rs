//! Manifest discovery: assembles the ordered search path for each manifest
//! kind, then expands it to concrete `.json` files.
//!
//! No parsing happens here; the output is a deduplicated, ordered list of
//! absolute manifest paths.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::env;
use crate::log::LogBits;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestKind {
    Driver,
    ImplicitLayer,
    ExplicitLayer,
}

impl ManifestKind {
    /// Directory appended to every per-platform search root.
    fn relative_dir(self) -> &'static str {
        match self {
            ManifestKind::Driver => "vulkan/icd.d",
            ManifestKind::ImplicitLayer => "vulkan/implicit_layer.d",
            ManifestKind::ExplicitLayer => "vulkan/explicit_layer.d",
        }
    }

    /// The environment variable that replaces the search path wholesale.
    fn override_env_vars(self) -> &'static [&'static str] {
        match self {
            ManifestKind::Driver => {
                &[env::VK_DRIVER_FILES_ENV_VAR, env::VK_ICD_FILENAMES_ENV_VAR]
            }
            ManifestKind::ImplicitLayer => &[env::VK_IMPLICIT_LAYER_PATH_ENV_VAR],
            ManifestKind::ExplicitLayer => &[env::VK_LAYER_PATH_ENV_VAR],
        }
    }

    /// The environment variable whose paths are searched in addition.
    fn additional_env_var(self) -> &'static str {
        match self {
            ManifestKind::Driver => env::VK_ADD_DRIVER_FILES_ENV_VAR,
            ManifestKind::ImplicitLayer => env::VK_ADD_IMPLICIT_LAYER_PATH_ENV_VAR,
            ManifestKind::ExplicitLayer => env::VK_ADD_LAYER_PATH_ENV_VAR,
        }
    }
}

/// Per-platform search roots, most specific first, each already joined with
/// the kind-specific relative directory.
fn platform_search_roots(kind: ManifestKind) -> Vec<PathBuf> {
    let rel = kind.relative_dir();
    let mut roots = Vec::new();
    if let Some(home) = env::xdg_config_home() {
        roots.push(home.join(rel));
    }
    for dir in env::xdg_config_dirs() {
        roots.push(dir.join(rel));
    }
    roots.push(Path::new(env::SYSCONFDIR).join(rel));
    if let Some(extra) = env::env_var("EXTRASYSCONFDIR") {
        roots.push(Path::new(&extra).join(rel));
    }
    if let Some(data_home) = env::xdg_data_home() {
        roots.push(data_home.join(rel));
    }
    for dir in env::xdg_data_dirs() {
        roots.push(dir.join(rel));
    }
    // The macOS bundle Resources folder and the Windows registry store slot
    // in ahead of and after these respectively; neither is compiled here.
    roots
}

/// Expands one search entry: a `.json` path is taken at face value, a
/// directory is scanned for `*.json` files in name order.
fn expand_entry(entry: &Path, out: &mut Vec<PathBuf>) {
    if entry.extension().map(|e| e == "json").unwrap_or(false) && entry.is_file() {
        out.push(entry.to_owned());
        return;
    }
    let Ok(read) = fs::read_dir(entry) else {
        return;
    };
    let mut found: Vec<PathBuf> = read
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.ends_with(".json"))
                    .unwrap_or(false)
        })
        .collect();
    found.sort();
    out.extend(found);
}

/// Produces the ordered manifest list for `kind`.
///
/// `per_call_override` is exclusive of everything else. `extra_paths` carries
/// the override layer's `override_paths` (explicit layers) or the settings
/// file's additional driver paths. `use_first_found` stops after the first
/// source that yields any file; it is engaged only on platforms where the
/// application bundle is the first source. `honor_env` is cleared when the
/// settings file vetoes driver environment variables.
pub fn discover_manifests(
    kind: ManifestKind,
    per_call_override: Option<&[PathBuf]>,
    extra_paths: &[PathBuf],
    use_first_found: bool,
    honor_env: bool,
) -> Vec<PathBuf> {
    let mut sources: Vec<Vec<PathBuf>> = Vec::new();

    if let Some(paths) = per_call_override {
        sources.push(paths.to_vec());
    } else {
        let override_value = if honor_env {
            kind.override_env_vars().iter().find_map(|var| env::env_var(var))
        } else {
            None
        };
        match override_value {
            Some(value) => {
                sources.push(env::split_path_list(&value).into_iter().map(PathBuf::from).collect());
            }
            None => {
                if honor_env {
                    if let Some(value) = env::env_var(kind.additional_env_var()) {
                        sources.push(
                            env::split_path_list(&value).into_iter().map(PathBuf::from).collect(),
                        );
                    }
                }
                if !extra_paths.is_empty() {
                    sources.push(extra_paths.to_vec());
                }
                sources.push(platform_search_roots(kind));
            }
        }
    }

    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut manifests = Vec::new();
    for source in sources {
        let mut from_source = Vec::new();
        for entry in source {
            if seen.insert(entry.clone()) {
                expand_entry(&entry, &mut from_source);
            }
        }
        let non_empty = !from_source.is_empty();
        for path in from_source {
            if !manifests.contains(&path) {
                manifests.push(path);
            }
        }
        if use_first_found && non_empty {
            break;
        }
    }

    loader_log!(
        LogBits::DEBUG,
        "manifest discovery ({:?}): {} file(s)",
        kind,
        manifests.len()
    );
    manifests
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    fn touch_json(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = File::create(&path).unwrap();
        writeln!(f, "{{}}").unwrap();
        path
    }

    #[test]
    fn directory_scan_is_sorted_and_json_only() {
        let dir = tempfile::tempdir().unwrap();
        let b = touch_json(dir.path(), "b_icd.json");
        let a = touch_json(dir.path(), "a_icd.json");
        touch_json(dir.path(), "notes.txt");
        let found = discover_manifests(
            ManifestKind::Driver,
            Some(&[dir.path().to_owned()]),
            &[],
            false,
            true,
        );
        assert_eq!(found, vec![a, b]);
    }

    #[test]
    fn per_call_override_is_exclusive_and_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let a = touch_json(dir.path(), "one.json");
        let found = discover_manifests(
            ManifestKind::ExplicitLayer,
            Some(&[a.clone(), a.clone(), dir.path().to_owned()]),
            &[],
            false,
            true,
        );
        // The file is listed once even though it is reachable twice.
        assert_eq!(found, vec![a]);
    }

    #[test]
    fn first_found_stops_enumeration() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let a = touch_json(first.path(), "a.json");
        touch_json(second.path(), "b.json");
        let found = discover_manifests(
            ManifestKind::Driver,
            Some(&[first.path().to_owned(), second.path().to_owned()]),
            &[],
            true,
            true,
        );
        // Both entries share one source, so first-found applies per source,
        // not per entry.
        assert_eq!(found.len(), 2);
        assert_eq!(found[0], a);
    }
}
