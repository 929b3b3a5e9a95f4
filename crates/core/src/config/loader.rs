//! Config path resolution

use std::ffi::OsString;
use std::path::PathBuf;

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "TYPELIB_CONFIG";

/// Config file used when [`CONFIG_ENV`] is unset
pub const DEFAULT_CONFIG_FILE: &str = "typelib.toml";

/// Returns the config file path.
///
/// `$TYPELIB_CONFIG` when set and non-empty, otherwise `./typelib.toml`.
pub fn config_path() -> PathBuf {
    resolve_config_path(std::env::var_os(CONFIG_ENV))
}

/// Path resolution with the environment value passed in
pub fn resolve_config_path(env: Option<OsString>) -> PathBuf {
    match env {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => PathBuf::from(DEFAULT_CONFIG_FILE),
    }
}
