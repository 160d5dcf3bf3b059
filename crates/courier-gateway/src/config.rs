use anyhow::{Context, Result};
use std::path::PathBuf;

use courier_types::config::CourierConfig;

/// Returns the Courier home directory (~/.courier/)
pub fn courier_home() -> PathBuf {
    dirs::home_dir()
        .expect("Could not determine home directory")
        .join(".courier")
}

/// Returns the path to the config file (~/.courier/config.toml)
pub fn config_path() -> PathBuf {
    courier_home().join("config.toml")
}

/// Load config from disk, creating default if it doesn't exist.
pub fn load_config() -> Result<CourierConfig> {
    let path = config_path();

    if !path.exists() {
        // Create ~/.courier/ and write default config
        let home = courier_home();
        std::fs::create_dir_all(&home)
            .with_context(|| format!("Failed to create {}", home.display()))?;

        let default = CourierConfig::default();
        let toml_str = toml::to_string_pretty(&default)
            .context("Failed to serialize default config")?;
        std::fs::write(&path, &toml_str)
            .with_context(|| format!("Failed to write default config to {}", path.display()))?;

        return Ok(default);
    }

    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    let config: CourierConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config at {}", path.display()))?;
    Ok(config)
}

/// Save config to disk, overwriting the existing file.
pub fn save_config(config: &CourierConfig) -> Result<()> {
    let path = config_path();
    let toml_str = toml::to_string_pretty(config)
        .context("Failed to serialize config")?;
    std::fs::write(&path, toml_str)
        .with_context(|| format!("Failed to write config to {}", path.display()))?;
    Ok(())
}
