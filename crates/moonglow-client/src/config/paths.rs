//! Platform path resolution
//!
//! Follows XDG conventions on Unix-like systems and the usual AppData
//! locations on Windows, via the `directories` crate.

use std::path::PathBuf;

use directories::ProjectDirs;

const QUALIFIER: &str = "";
const ORGANIZATION: &str = "";
const APPLICATION: &str = "moonglow";

/// Resolved project directories, `None` when no home directory exists
fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
}

/// Directory for the settings file
pub fn config_dir() -> Option<PathBuf> {
    project_dirs().map(|d| d.config_dir().to_path_buf())
}

/// Directory for data (log files, script root default)
pub fn data_dir() -> Option<PathBuf> {
    project_dirs().map(|d| d.data_dir().to_path_buf())
}

/// Default path of the settings file
pub fn settings_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("settings.toml"))
}

/// Default script root directory
pub fn default_script_dir() -> Option<PathBuf> {
    data_dir().map(|d| d.join("scripts"))
}
