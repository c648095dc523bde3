use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Where composed images are downloaded to (defaults to the Downloads folder)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,

    /// Directory the file picker opens in
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_directory: Option<PathBuf>,

    /// Desktop notifications after saving or on failure
    #[serde(default = "default_true")]
    pub notifications: bool,

    /// List dotfiles in the file picker
    #[serde(default)]
    pub show_hidden: bool,

    /// Color overrides, e.g. `accent = "#ffc107"`
    #[serde(default)]
    pub theme: BTreeMap<String, String>,
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            last_directory: None,
            notifications: true,
            show_hidden: false,
            theme: BTreeMap::new(),
        }
    }
}

impl AppConfig {
    /// Get the config file path
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?
            .join("ninegrid");

        if let Err(e) = std::fs::create_dir_all(&config_dir) {
            tracing::warn!("Could not create config directory: {}", e);
        }

        Ok(config_dir.join("config.toml"))
    }

    /// Load config from file, or create default
    pub fn load() -> Result<Self> {
        let path = match Self::config_path() {
            Ok(p) => p,
            Err(_) => return Ok(AppConfig::default()),
        };

        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(content) => {
                    match toml::from_str(&content) {
                        Ok(config) => return Ok(config),
                        Err(e) => tracing::warn!("Failed to parse config: {}", e),
                    }
                }
                Err(e) => tracing::warn!("Failed to read config: {}", e),
            }
        }

        let config = AppConfig::default();
        let _ = config.save();
        Ok(config)
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;

        // Drop directories that no longer exist so the picker never opens on a dead path
        let mut clean_config = self.clone();
        if clean_config.last_directory.as_ref().map(|d| !d.is_dir()).unwrap_or(false) {
            clean_config.last_directory = None;
        }

        let content = toml::to_string_pretty(&clean_config)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Resolved download directory: config, then Downloads, then home, then cwd
    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .or_else(dirs::download_dir)
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Starting directory for the file picker
    pub fn browse_dir(&self) -> PathBuf {
        self.last_directory
            .clone()
            .filter(|d| d.is_dir())
            .or_else(dirs::picture_dir)
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_serialization() {
        let mut theme = BTreeMap::new();
        theme.insert("accent".to_string(), "#ffc107".to_string());

        let config = AppConfig {
            output_dir: Some(PathBuf::from("/tmp/grids")),
            last_directory: None,
            notifications: false,
            show_hidden: true,
            theme,
        };

        let serialized = toml::to_string_pretty(&config).unwrap();
        let deserialized: AppConfig = toml::from_str(&serialized).unwrap();

        assert_eq!(config.output_dir, deserialized.output_dir);
        assert!(!deserialized.notifications);
        assert!(deserialized.show_hidden);
        assert_eq!(deserialized.theme.get("accent").map(String::as_str), Some("#ffc107"));
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert!(config.notifications);
        assert!(!config.show_hidden);
        assert!(config.output_dir.is_none());
        assert!(config.theme.is_empty());
    }

    #[test]
    fn test_output_dir_prefers_configured() {
        let config = AppConfig {
            output_dir: Some(PathBuf::from("/srv/out")),
            ..AppConfig::default()
        };
        assert_eq!(config.output_dir(), PathBuf::from("/srv/out"));
    }
}
