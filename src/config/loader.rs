//! Configuration loading and saving.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Error, Result};

use super::{CycleConfig, RigConfig};

fn io_error(path: &Path, e: std::io::Error) -> Error {
    Error::Config(ConfigError::IoError(format!("{}: {}", path.display(), e)))
}

/// Load a cycle configuration from a JSON file.
///
/// # Errors
///
/// Returns an error if the file cannot be read, parsed, or validated.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CycleConfig> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| io_error(path, e))?;
    parse_config(&content)
}

/// Parse a cycle configuration from a JSON string.
///
/// # Errors
///
/// Returns an error if the JSON is invalid or fails validation.
pub fn parse_config(content: &str) -> Result<CycleConfig> {
    let config: CycleConfig = serde_json::from_str(content)
        .map_err(|e| Error::Config(ConfigError::ParseError(e.to_string())))?;

    super::validation::validate_config(&config)?;

    Ok(config)
}

/// Backup path used by [`save_config`]: `logic_a.json` → `logic_a.json.bak`.
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".bak");
    PathBuf::from(name)
}

/// Write a cycle configuration as pretty-printed JSON.
///
/// An existing file is first copied to [`backup_path`].
pub fn save_config<P: AsRef<Path>>(config: &CycleConfig, path: P) -> Result<()> {
    let path = path.as_ref();
    if path.exists() {
        let backup = backup_path(path);
        fs::copy(path, &backup).map_err(|e| io_error(&backup, e))?;
    }

    let mut content = serde_json::to_string_pretty(config)
        .map_err(|e| Error::Config(ConfigError::SerializeError(e.to_string())))?;
    content.push('\n');
    fs::write(path, content).map_err(|e| io_error(path, e))?;
    log::info!("saved configuration '{}' to {}", config.logic_name, path.display());
    Ok(())
}

/// Load the rig configuration from a TOML file.
///
/// Relative document paths are resolved against the file's directory.
pub fn load_rig_config<P: AsRef<Path>>(path: P) -> Result<RigConfig> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| io_error(path, e))?;
    let mut rig = parse_rig_config(&content)?;
    if let Some(base) = path.parent() {
        rig.resolve_paths(base);
    }
    Ok(rig)
}

/// Parse the rig configuration from a TOML string.
pub fn parse_rig_config(content: &str) -> Result<RigConfig> {
    toml::from_str(content).map_err(|e| Error::Config(ConfigError::ParseError(e.message().to_string())))
}
