use std::path::{Path, PathBuf};

use lockstep_core::BrokerConfig;
use tracing::info;

/// Locations searched, in order, when no config path is given.
pub const DEFAULT_CONFIG_PATHS: [&str; 2] = ["lockstep.toml", "/etc/lockstep/lockstep.toml"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("error reading {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("error parsing {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Load the broker configuration from `explicit`, or from the first default
/// location that exists. Falls back to defaults when nothing is found.
pub fn load_config(explicit: Option<&Path>) -> Result<BrokerConfig, ConfigLoadError> {
    if let Some(path) = explicit {
        return read_config(path);
    }

    for path in DEFAULT_CONFIG_PATHS {
        let path = Path::new(path);
        if path.exists() {
            return read_config(path);
        }
    }

    info!("no config file found, using defaults");
    Ok(BrokerConfig::default())
}

fn read_config(path: &Path) -> Result<BrokerConfig, ConfigLoadError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigLoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config = toml::from_str(&contents).map_err(|source| ConfigLoadError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), "loaded configuration");
    Ok(config)
}
