use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
    value::Uncased,
};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// File name used for persisted settings, matching the storage key.
pub const STORAGE_FILE: &str = "dockerLabsConfig.json";
/// Suggested file name for an exported settings document.
pub const EXPORT_FILE: &str = "docker-labs-config.json";
pub const ENV_PREFIX: &str = "DOCKLAB_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration file: {0}")]
    ConfigImportParseError(#[from] serde_json::Error),
    #[error("Failed to export settings: {0}")]
    Export(serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Failed to load settings: {0}")]
    Load(#[from] figment::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub docker_host: String,
    pub api_version: String,
    pub auto_refresh: bool,
    /// Seconds between refreshes when `auto_refresh` is on.
    pub refresh_interval: u32,
    pub notifications: bool,
    pub dark_mode: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            docker_host: "unix:///var/run/docker.sock".to_string(),
            api_version: "1.43".to_string(),
            auto_refresh: true,
            refresh_interval: 5,
            notifications: true,
            dark_mode: true,
        }
    }
}

// Any subset of the settings, as found in an imported document.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsPatch {
    docker_host: Option<String>,
    api_version: Option<String>,
    auto_refresh: Option<bool>,
    refresh_interval: Option<u32>,
    notifications: Option<bool>,
    dark_mode: Option<bool>,
}

// DOCKER_HOST -> dockerHost
fn env_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for (i, part) in key.split('_').filter(|p| !p.is_empty()).enumerate() {
        let part = part.to_ascii_lowercase();
        if i == 0 {
            out.push_str(&part);
            continue;
        }
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            out.push(first.to_ascii_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}

impl Settings {
    /// Defaults, overridden by the JSON file at `path` if it exists, then by
    /// `DOCKLAB_*` environment variables (e.g. `DOCKLAB_DOCKER_HOST`).
    pub fn load(path: &Path) -> Result<Settings, ConfigError> {
        let settings: Settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Json::file(path))
            .merge(
                // `map` turns lowercasing back on, so it is disabled after it
                Env::prefixed(ENV_PREFIX)
                    .map(|key| Uncased::new(env_key(key.as_str())))
                    .lowercase(false),
            )
            .extract()?;
        debug!("Loaded settings {settings:?}");
        Ok(settings)
    }

    pub fn export_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(ConfigError::Export)
    }

    /// Fields present in `text` replace the current ones. On a parse error
    /// nothing changes.
    pub fn import_json(&mut self, text: &str) -> Result<(), ConfigError> {
        let patch: SettingsPatch = serde_json::from_str(text)?;
        if let Some(v) = patch.docker_host {
            self.docker_host = v;
        }
        if let Some(v) = patch.api_version {
            self.api_version = v;
        }
        if let Some(v) = patch.auto_refresh {
            self.auto_refresh = v;
        }
        if let Some(v) = patch.refresh_interval {
            self.refresh_interval = v;
        }
        if let Some(v) = patch.notifications {
            self.notifications = v;
        }
        if let Some(v) = patch.dark_mode {
            self.dark_mode = v;
        }
        Ok(())
    }

    pub fn save(&self, dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(STORAGE_FILE);
        std::fs::write(&path, self.export_json()?)?;
        info!("Settings saved to {}", path.display());
        Ok(())
    }

    /// Settings persisted by [`Settings::save`] under `dir`, layered the same
    /// way as [`Settings::load`].
    pub fn load_saved(dir: &Path) -> Result<Settings, ConfigError> {
        Settings::load(&dir.join(STORAGE_FILE))
    }

    pub fn reset(&mut self) {
        *self = Settings::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_load_layers_file_and_env() {
        Jail::expect_with(|jail: &mut Jail| {
            jail.create_file(
                "settings.json",
                r#"{ "apiVersion": "1.44", "refreshInterval": 30, "darkMode": false }"#,
            )?;
            jail.set_env("DOCKLAB_DOCKER_HOST", "tcp://localhost:2375");
            jail.set_env("DOCKLAB_REFRESH_INTERVAL", "10");

            let settings = Settings::load("settings.json".as_ref()).unwrap();
            assert_eq!(settings.docker_host, "tcp://localhost:2375");
            assert_eq!(settings.api_version, "1.44");
            assert_eq!(settings.refresh_interval, 10);
            assert!(!settings.dark_mode);
            assert!(settings.notifications);
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_keep_field_case() {
        Jail::expect_with(|jail: &mut Jail| {
            jail.set_env("DOCKLAB_AUTO_REFRESH", "false");
            jail.set_env("DOCKLAB_API_VERSION", "1.45");

            let settings = Settings::load("missing.json".as_ref()).unwrap();
            assert!(!settings.auto_refresh);
            assert_eq!(settings.api_version, "1.45");
            assert_eq!(settings.docker_host, Settings::default().docker_host);
            Ok(())
        });
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        Jail::expect_with(|_jail: &mut Jail| {
            let settings = Settings::load("missing.json".as_ref()).unwrap();
            assert_eq!(settings, Settings::default());
            Ok(())
        });
    }

    #[test]
    fn test_import_is_partial() {
        let mut settings = Settings::default();
        settings
            .import_json(r#"{ "autoRefresh": false, "dockerHost": "tcp://remote:2376" }"#)
            .unwrap();
        assert!(!settings.auto_refresh);
        assert_eq!(settings.docker_host, "tcp://remote:2376");
        assert_eq!(settings.api_version, "1.43");
    }

    #[test]
    fn test_import_parse_error_leaves_settings() {
        let mut settings = Settings::default();
        settings.dark_mode = false;
        let before = settings.clone();
        let err = settings.import_json("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::ConfigImportParseError(_)));
        assert_eq!(settings, before);
    }

    #[test]
    fn test_export_uses_camel_case() {
        let json = Settings::default().export_json().unwrap();
        assert!(json.contains("\"dockerHost\": \"unix:///var/run/docker.sock\""));
        assert!(json.contains("\"refreshInterval\": 5"));
    }

    #[test]
    fn test_save_and_load_saved() {
        Jail::expect_with(|jail: &mut Jail| {
            let dir = jail.directory().join("state");
            assert_eq!(Settings::load_saved(&dir).unwrap(), Settings::default());

            let mut settings = Settings::default();
            settings.refresh_interval = 60;
            settings.save(&dir).unwrap();
            assert!(dir.join(STORAGE_FILE).exists());
            assert_eq!(Settings::load_saved(&dir).unwrap(), settings);

            // env overrides apply on top of what was saved
            jail.set_env("DOCKLAB_DARK_MODE", "false");
            let loaded = Settings::load_saved(&dir).unwrap();
            assert_eq!(loaded.refresh_interval, 60);
            assert!(!loaded.dark_mode);

            settings.reset();
            assert_eq!(settings, Settings::default());
            Ok(())
        });
    }

    #[test]
    fn test_env_key() {
        assert_eq!(env_key("DOCKER_HOST"), "dockerHost");
        assert_eq!(env_key("REFRESH_INTERVAL"), "refreshInterval");
        assert_eq!(env_key("NOTIFICATIONS"), "notifications");
    }
}
