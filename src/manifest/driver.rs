//! Driver (ICD) manifest parsing.
//!
//! A driver manifest names one shared library and the API version it
//! implements. Records that fail validation are skipped with a warning so
//! one bad manifest never takes down discovery.

use std::path::{Path, PathBuf};

use serde_json::Value;

use super::{file_format_version, warn_unknown_format};
use crate::log::LogBits;
use crate::util::ApiVersion;

/// A parsed, validated driver manifest.
#[derive(Debug, Clone)]
pub struct DriverManifest {
    pub manifest_path: PathBuf,
    pub library_path: PathBuf,
    pub api_version: ApiVersion,
    pub is_portability_driver: bool,
    pub library_arch: Option<u32>,
}

fn pointer_width() -> u32 {
    (std::mem::size_of::<usize>() * 8) as u32
}

/// Resolves a manifest `library_path`: absolute paths and bare file names
/// pass through (the latter defer to the system library search); anything
/// with a directory component is taken relative to the manifest's directory.
pub(crate) fn resolve_library_path(manifest_path: &Path, library_path: &str) -> PathBuf {
    let lib = Path::new(library_path);
    if lib.is_absolute() || lib.components().count() == 1 {
        return lib.to_owned();
    }
    match manifest_path.parent() {
        Some(dir) => dir.join(lib),
        None => lib.to_owned(),
    }
}

/// Parses one driver manifest DOM. `Ok(None)` means a well-formed record the
/// current process filters out (portability, architecture).
pub fn parse_driver_manifest(
    path: &Path,
    dom: &Value,
    portability_opt_in: bool,
) -> Option<DriverManifest> {
    let Some(version) = file_format_version(dom) else {
        loader_log!(
            LogBits::WARN | LogBits::DRIVER,
            "driver manifest {}: missing file_format_version, skipping",
            path.display()
        );
        return None;
    };
    warn_unknown_format(path, version);

    let Some(icd) = dom.get("ICD").filter(|v| v.is_object()) else {
        loader_log!(
            LogBits::WARN | LogBits::DRIVER,
            "driver manifest {}: missing ICD object, skipping",
            path.display()
        );
        return None;
    };

    let Some(library_path) = icd.get("library_path").and_then(Value::as_str).filter(|s| !s.is_empty())
    else {
        loader_log!(
            LogBits::WARN | LogBits::DRIVER,
            "driver manifest {}: missing ICD.library_path, skipping",
            path.display()
        );
        return None;
    };

    let api_version = icd
        .get("api_version")
        .and_then(Value::as_str)
        .and_then(ApiVersion::parse);
    let Some(api_version) = api_version else {
        loader_log!(
            LogBits::WARN | LogBits::DRIVER,
            "driver manifest {}: missing or malformed ICD.api_version, skipping",
            path.display()
        );
        return None;
    };
    if api_version.variant != 0 {
        loader_log!(
            LogBits::WARN | LogBits::DRIVER,
            "driver manifest {}: unsupported API variant {}, skipping",
            path.display(),
            api_version.variant
        );
        return None;
    }

    let library_arch = icd
        .get("library_arch")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<u32>().ok());
    if let Some(arch) = library_arch {
        if arch != pointer_width() {
            loader_log!(
                LogBits::WARN | LogBits::DRIVER,
                "driver manifest {}: library_arch {} does not match a {}-bit loader, skipping",
                path.display(),
                arch,
                pointer_width()
            );
            return None;
        }
    }

    let is_portability_driver = icd
        .get("is_portability_driver")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if is_portability_driver && !portability_opt_in {
        loader_log!(
            LogBits::INFO | LogBits::DRIVER,
            "driver manifest {}: portability driver skipped without portability enumeration",
            path.display()
        );
        return None;
    }

    Some(DriverManifest {
        manifest_path: path.to_owned(),
        library_path: resolve_library_path(path, library_path),
        api_version,
        is_portability_driver,
        library_arch,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manifest(v: Value) -> Option<DriverManifest> {
        parse_driver_manifest(Path::new("/test/dir/driver_icd.json"), &v, false)
    }

    #[test]
    fn minimal_manifest_parses() {
        let m = manifest(json!({
            "file_format_version": "1.0.0",
            "ICD": { "library_path": "libdriver.so", "api_version": "1.2.3" }
        }))
        .unwrap();
        assert_eq!(m.library_path, PathBuf::from("libdriver.so"));
        assert_eq!(m.api_version, ApiVersion { variant: 0, major: 1, minor: 2, patch: 3 });
        assert!(!m.is_portability_driver);
    }

    #[test]
    fn relative_path_resolves_against_manifest_dir() {
        let m = manifest(json!({
            "file_format_version": "1.0.0",
            "ICD": { "library_path": "./lib/libdriver.so", "api_version": "1.1.0" }
        }))
        .unwrap();
        assert_eq!(m.library_path, PathBuf::from("/test/dir/./lib/libdriver.so"));
        let m = manifest(json!({
            "file_format_version": "1.0.0",
            "ICD": { "library_path": "/abs/libdriver.so", "api_version": "1.1.0" }
        }))
        .unwrap();
        assert_eq!(m.library_path, PathBuf::from("/abs/libdriver.so"));
    }

    #[test]
    fn missing_required_fields_drop_record() {
        assert!(manifest(json!({ "ICD": { "library_path": "a", "api_version": "1.0.0" } })).is_none());
        assert!(manifest(json!({ "file_format_version": "1.0.0" })).is_none());
        assert!(manifest(json!({
            "file_format_version": "1.0.0",
            "ICD": { "api_version": "1.0.0" }
        }))
        .is_none());
    }

    #[test]
    fn nonzero_variant_is_rejected() {
        // A major of 128 spills into the variant bits of the packed version.
        assert!(manifest(json!({
            "file_format_version": "1.0.0",
            "ICD": { "library_path": "a.so", "api_version": "128.1.0" }
        }))
        .is_none());
    }

    #[test]
    fn wrong_arch_is_dropped() {
        let other = if cfg!(target_pointer_width = "64") { "32" } else { "64" };
        assert!(manifest(json!({
            "file_format_version": "1.0.0",
            "ICD": { "library_path": "a.so", "api_version": "1.0.0", "library_arch": other }
        }))
        .is_none());
    }

    #[test]
    fn portability_requires_opt_in() {
        let v = json!({
            "file_format_version": "1.0.0",
            "ICD": { "library_path": "a.so", "api_version": "1.3.0",
                     "is_portability_driver": true }
        });
        assert!(parse_driver_manifest(Path::new("/m.json"), &v, false).is_none());
        assert!(parse_driver_manifest(Path::new("/m.json"), &v, true).is_some());
    }
}
