use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories_next::ProjectDirs;
use viewconfig::ViewConfig;

pub const ENV_CONFIG_FILE: &str = "SHADERSMITH_CONFIG";
pub const CONFIG_FILE_NAME: &str = "shadersmith.toml";

const QUALIFIER: &str = "org";
const ORGANISATION: &str = "Shadersmith";
const APPLICATION: &str = "shadersmith";

/// Where the configuration is read from, and whether it has to exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLocation {
    pub path: PathBuf,
    pub required: bool,
}

/// `--config`, then `$SHADERSMITH_CONFIG`, then the user config directory.
pub fn locate_config(explicit: Option<&Path>) -> Option<ConfigLocation> {
    if let Some(path) = explicit {
        return Some(ConfigLocation {
            path: path.to_path_buf(),
            required: true,
        });
    }
    if let Some(path) = env_override(ENV_CONFIG_FILE) {
        return Some(ConfigLocation {
            path,
            required: true,
        });
    }
    ProjectDirs::from(QUALIFIER, ORGANISATION, APPLICATION).map(|dirs| ConfigLocation {
        path: dirs.config_dir().join(CONFIG_FILE_NAME),
        required: false,
    })
}

pub fn load_config(explicit: Option<&Path>) -> Result<ViewConfig> {
    let Some(location) = locate_config(explicit) else {
        tracing::debug!("no user config directory; using built-in defaults");
        return Ok(ViewConfig::default());
    };
    if !location.required && !location.path.exists() {
        tracing::debug!(path = %location.path.display(), "no config file; using built-in defaults");
        return Ok(ViewConfig::default());
    }

    let text = fs::read_to_string(&location.path)
        .with_context(|| format!("failed to read config at {}", location.path.display()))?;
    let config = ViewConfig::from_toml_str(&text)
        .with_context(|| format!("failed to load config at {}", location.path.display()))?;
    tracing::debug!(path = %location.path.display(), "loaded config");
    Ok(config)
}

fn env_override(name: &str) -> Option<PathBuf> {
    match env::var_os(name) {
        Some(value) if !value.is_empty() => Some(PathBuf::from(value)),
        _ => None,
    }
}
