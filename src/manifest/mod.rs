//! Manifest handling: where the JSON files live ([`discovery`]) and what
//! they say ([`driver`], [`layer`]).

pub mod discovery;
pub mod driver;
pub mod layer;

use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::error::Result;

/// File-format versions this loader has been taught. Anything else still
/// parses, with a warning, on the assumption that newer formats stay
/// backward compatible.
pub const KNOWN_FILE_FORMAT_VERSIONS: &[&str] =
    &["1.0.0", "1.0.1", "1.1.0", "1.1.1", "1.1.2", "1.2.0", "1.2.1"];

/// Reads one manifest file into the DOM the parsers consume.
pub fn read_manifest_dom(path: &Path) -> Result<Value> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

pub(crate) fn file_format_version(dom: &Value) -> Option<&str> {
    dom.get("file_format_version").and_then(Value::as_str)
}

pub(crate) fn warn_unknown_format(path: &Path, version: &str) {
    if !KNOWN_FILE_FORMAT_VERSIONS.contains(&version) {
        loader_log!(
            crate::log::LogBits::WARN,
            "manifest {}: unknown file format version {}, attempting to parse anyway",
            path.display(),
            version
        );
    }
}
