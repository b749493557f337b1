//! Options File Storage
//!
//! Loads and saves the default [`ConnectOptions`] document.
//! Location: ~/.sshtool/options.json

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::ssh::ConnectOptions;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to determine config directory")]
    NoConfigDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Get the sshtool configuration directory (~/.sshtool)
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|home| home.join(".sshtool"))
        .ok_or(ConfigError::NoConfigDir)
}

/// Get the options file path
pub fn options_file() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("options.json"))
}

/// Load options from `path`
///
/// A missing file yields the defaults. A file that does not parse is an
/// error rather than silently ignored.
pub async fn load_options(path: &Path) -> Result<ConnectOptions, ConfigError> {
    match fs::read_to_string(path).await {
        Ok(contents) => {
            let options = serde_json::from_str(&contents)?;
            tracing::debug!("Loaded connect options from {:?}", path);
            Ok(options)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConnectOptions::default()),
        Err(e) => Err(ConfigError::Io(e)),
    }
}

/// Load options from the default location
pub async fn load_default_options() -> Result<ConnectOptions, ConfigError> {
    load_options(&options_file()?).await
}

/// Save options to `path`, creating the parent directory
pub async fn save_options(path: &Path, options: &ConnectOptions) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    // Write to temp file first, then rename (atomic write)
    let temp_path = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(options)?;

    let mut file = fs::File::create(&temp_path).await?;
    file.write_all(json.as_bytes()).await?;
    file.sync_all().await?;

    fs::rename(&temp_path, path).await?;

    Ok(())
}
