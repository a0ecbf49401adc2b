//! Environment variable contracts and the handful of process facts the
//! discovery and activation paths key off.
//!
//! The names here are ABI: applications and test harnesses set them, so they
//! are never renamed, only added to.

use std::env;
use std::path::PathBuf;

// Driver discovery.
pub const VK_DRIVER_FILES_ENV_VAR: &str = "VK_DRIVER_FILES";
pub const VK_ICD_FILENAMES_ENV_VAR: &str = "VK_ICD_FILENAMES"; // legacy alias
pub const VK_ADD_DRIVER_FILES_ENV_VAR: &str = "VK_ADD_DRIVER_FILES";
pub const VK_DRIVERS_SELECT_ENV_VAR: &str = "VK_LOADER_DRIVERS_SELECT";
pub const VK_DRIVERS_DISABLE_ENV_VAR: &str = "VK_LOADER_DRIVERS_DISABLE";

// Layer discovery.
pub const VK_LAYER_PATH_ENV_VAR: &str = "VK_LAYER_PATH";
pub const VK_ADD_LAYER_PATH_ENV_VAR: &str = "VK_ADD_LAYER_PATH";
pub const VK_IMPLICIT_LAYER_PATH_ENV_VAR: &str = "VK_IMPLICIT_LAYER_PATH";
pub const VK_ADD_IMPLICIT_LAYER_PATH_ENV_VAR: &str = "VK_ADD_IMPLICIT_LAYER_PATH";

// Layer activation.
pub const VK_INSTANCE_LAYERS_ENV_VAR: &str = "VK_INSTANCE_LAYERS";
pub const VK_LAYERS_ENABLE_ENV_VAR: &str = "VK_LOADER_LAYERS_ENABLE";
pub const VK_LAYERS_DISABLE_ENV_VAR: &str = "VK_LOADER_LAYERS_DISABLE";
pub const VK_LAYERS_ALLOW_ENV_VAR: &str = "VK_LOADER_LAYERS_ALLOW";

// Behavior toggles.
pub const VK_DISABLE_DYNAMIC_LIBRARY_UNLOADING_ENV_VAR: &str =
    "VK_LOADER_DISABLE_DYNAMIC_LIBRARY_UNLOADING";
pub const VK_DISABLE_INST_EXT_FILTER_ENV_VAR: &str = "VK_LOADER_DISABLE_INST_EXT_FILTER";
pub const VK_DISABLE_SELECT_ENV_VAR: &str = "VK_LOADER_DISABLE_SELECT";

#[cfg(windows)]
pub const PATH_LIST_SEPARATOR: char = ';';
#[cfg(not(windows))]
pub const PATH_LIST_SEPARATOR: char = ':';

pub fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

pub fn env_var_is_set(name: &str) -> bool {
    env_var(name).is_some()
}

/// Splits a `PATH`-style list, dropping empty segments.
pub fn split_path_list(value: &str) -> Vec<String> {
    value
        .split(PATH_LIST_SEPARATOR)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_owned())
        .collect()
}

/// Path of the running executable, used to match override-layer `app_keys`.
pub fn executable_path() -> Option<PathBuf> {
    env::current_exe().ok()
}

pub fn home_dir() -> Option<PathBuf> {
    env_var("HOME").map(PathBuf::from)
}

/// `$XDG_CONFIG_HOME`, defaulting to `~/.config`.
pub fn xdg_config_home() -> Option<PathBuf> {
    env_var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| home_dir().map(|h| h.join(".config")))
}

/// `$XDG_CONFIG_DIRS`, defaulting to `/etc/xdg`.
pub fn xdg_config_dirs() -> Vec<PathBuf> {
    match env_var("XDG_CONFIG_DIRS") {
        Some(v) => split_path_list(&v).into_iter().map(PathBuf::from).collect(),
        None => vec![PathBuf::from("/etc/xdg")],
    }
}

/// `$XDG_DATA_HOME`, defaulting to `~/.local/share`.
pub fn xdg_data_home() -> Option<PathBuf> {
    env_var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .or_else(|| home_dir().map(|h| h.join(".local/share")))
}

/// `$XDG_DATA_DIRS`, defaulting to `/usr/local/share:/usr/share`.
pub fn xdg_data_dirs() -> Vec<PathBuf> {
    match env_var("XDG_DATA_DIRS") {
        Some(v) => split_path_list(&v).into_iter().map(PathBuf::from).collect(),
        None => vec![PathBuf::from("/usr/local/share"), PathBuf::from("/usr/share")],
    }
}

pub const SYSCONFDIR: &str = "/etc";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_list_splitting() {
        let joined = format!("a{0}{0}b{0}c", PATH_LIST_SEPARATOR);
        assert_eq!(split_path_list(&joined), vec!["a", "b", "c"]);
        assert!(split_path_list("").is_empty());
    }
}
