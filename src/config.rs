/// Persisted launcher state.
///
/// Stored as `config.json` in the platform data directory
/// (%APPDATA%/ZapretLauncher/ on Windows). This is state, not
/// configuration: losing it is harmless, so loading is forgiving and
/// saving is best-effort. Profile definitions live elsewhere (see the
/// `profile` module) and are handled strictly.
use anyhow::{anyhow, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct AppConfig {
    /// Name of the profile that was last running (None = none).
    pub last_profile: Option<String>,
}

/// Get the application's data directory, creating it if needed.
pub fn get_data_directory() -> Result<PathBuf> {
    let project_dirs = ProjectDirs::from("", "", "ZapretLauncher")
        .ok_or_else(|| anyhow!("Failed to determine user data directory"))?;

    let data_dir = project_dirs.data_dir();

    fs::create_dir_all(data_dir)
        .map_err(|e| anyhow!("Failed to create data directory: {}", e))?;

    Ok(data_dir.to_path_buf())
}

/// Load the persisted state; defaults on any error.
pub fn load_config() -> AppConfig {
    let Ok(data_dir) = get_data_directory() else {
        return AppConfig::default();
    };

    let config_path = data_dir.join("config.json");

    if !config_path.exists() {
        return AppConfig::default();
    }

    let Ok(contents) = fs::read_to_string(&config_path) else {
        return AppConfig::default();
    };

    serde_json::from_str(&contents).unwrap_or_default()
}

/// Save the persisted state to config.json.
pub fn save_config(config: &AppConfig) -> Result<()> {
    let data_dir = get_data_directory()?;
    let config_path = data_dir.join("config.json");

    let json = serde_json::to_string_pretty(config)
        .map_err(|e| anyhow!("Failed to serialize config: {}", e))?;

    fs::write(&config_path, json)
        .map_err(|e| anyhow!("Failed to write config.json: {}", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.last_profile, None);
    }

    #[test]
    fn test_get_data_directory() {
        let result = get_data_directory();
        assert!(result.is_ok());

        let path = result.unwrap();
        assert!(path.to_string_lossy().contains("ZapretLauncher"));
    }

    #[test]
    fn test_config_roundtrip() {
        let config = AppConfig {
            last_profile: Some("general".to_string()),
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.last_profile.as_deref(), Some("general"));
    }
}
