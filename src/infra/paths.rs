// src/infra/paths.rs — Config and data locations
//
// All paths respect the HABITUAL_HOME environment variable for isolation.
// When HABITUAL_HOME is set, config and data live under that directory.
// When unset, config uses ~/.habitual/ and data uses XDG_DATA_HOME/habitual.

use directories::{BaseDirs, ProjectDirs};
use std::path::PathBuf;

/// Returns the HABITUAL_HOME override, if set.
fn habitual_home() -> Option<PathBuf> {
    std::env::var_os("HABITUAL_HOME").map(PathBuf::from)
}

/// Configuration directory: $HABITUAL_HOME/ or ~/.habitual/
pub fn config_dir() -> PathBuf {
    if let Some(home) = habitual_home() {
        return home;
    }
    match BaseDirs::new() {
        Some(dirs) => dirs.home_dir().join(".habitual"),
        None => PathBuf::from(".habitual"),
    }
}

/// Data directory: $HABITUAL_HOME/data/ or ~/.local/share/habitual/
pub fn data_dir() -> PathBuf {
    if let Some(home) = habitual_home() {
        return home.join("data");
    }
    match ProjectDirs::from("", "", "habitual") {
        Some(dirs) => dirs.data_local_dir().to_path_buf(),
        None => config_dir().join("data"),
    }
}

/// Config file path
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Default location of the JSON model file
pub fn model_json_path() -> PathBuf {
    data_dir().join("model.json")
}

/// Default location of the SQLite model database
pub fn model_db_path() -> PathBuf {
    data_dir().join("habitual.db")
}
