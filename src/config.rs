use anyhow::Context;
use serde::Deserialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::resolver::DEFAULT_METADATA_BASE_URL;

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub sync: SyncConfig,
    pub http: HttpConfig,
    pub preferences: PreferencesConfig,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let mut candidates = Vec::new();

        if let Ok(current_dir) = env::current_dir() {
            candidates.push(current_dir.join("config.toml"));
            candidates.push(current_dir.join("config").join("config.toml"));
            candidates.push(current_dir.join("config").join("nowplaying.toml"));
        }

        if let Ok(exe) = env::current_exe() {
            if let Some(dir) = exe.parent() {
                candidates.push(dir.join("config.toml"));
                candidates.push(dir.join("config").join("config.toml"));
                candidates.push(dir.join("config").join("nowplaying.toml"));
            }
        }

        for path in candidates {
            if path.exists() {
                return Self::load_from(&path);
            }
        }

        Ok(Config::default())
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let doc: ConfigDocument = toml::from_str(&data)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;
        let mut config = Config::from(doc);
        if config.preferences.path.is_relative() {
            if let Some(dir) = path.parent() {
                config.preferences.path = dir.join(&config.preferences.path);
            }
        }
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub poll_interval_ms: u64,
    pub retry_interval_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            retry_interval_ms: 5_000,
        }
    }
}

impl SyncConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.clamp(100, 60_000))
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms.min(10 * 60_000))
    }
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub metadata_base_url: String,
    pub timeout_ms: u64,
    pub access_token: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            metadata_base_url: DEFAULT_METADATA_BASE_URL.to_owned(),
            timeout_ms: 10_000,
            access_token: None,
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.clamp(500, 120_000))
    }
}

#[derive(Debug, Clone)]
pub struct PreferencesConfig {
    pub path: PathBuf,
    pub watch: bool,
}

impl Default for PreferencesConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("preferences.toml"),
            watch: true,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigDocument {
    #[serde(default)]
    sync: SyncSection,
    #[serde(default)]
    http: HttpSection,
    #[serde(default)]
    preferences: PreferencesSection,
}

impl From<ConfigDocument> for Config {
    fn from(value: ConfigDocument) -> Self {
        let sync_defaults = SyncConfig::default();
        let http_defaults = HttpConfig::default();
        let prefs_defaults = PreferencesConfig::default();

        Config {
            sync: SyncConfig {
                poll_interval_ms: value
                    .sync
                    .poll_interval_ms
                    .unwrap_or(sync_defaults.poll_interval_ms),
                retry_interval_ms: value
                    .sync
                    .retry_interval_ms
                    .unwrap_or(sync_defaults.retry_interval_ms),
            },
            http: HttpConfig {
                metadata_base_url: value
                    .http
                    .metadata_base_url
                    .unwrap_or(http_defaults.metadata_base_url),
                timeout_ms: value.http.timeout_ms.unwrap_or(http_defaults.timeout_ms),
                access_token: value.http.access_token.filter(|t| !t.trim().is_empty()),
            },
            preferences: PreferencesConfig {
                path: value.preferences.path.unwrap_or(prefs_defaults.path),
                watch: value.preferences.watch.unwrap_or(prefs_defaults.watch),
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SyncSection {
    poll_interval_ms: Option<u64>,
    retry_interval_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct HttpSection {
    metadata_base_url: Option<String>,
    timeout_ms: Option<u64>,
    access_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PreferencesSection {
    path: Option<PathBuf>,
    watch: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() -> anyhow::Result<()> {
        let doc: ConfigDocument = toml::from_str("")?;
        let cfg = Config::from(doc);
        assert_eq!(cfg.sync.poll_interval(), Duration::from_secs(1));
        assert_eq!(cfg.http.metadata_base_url, DEFAULT_METADATA_BASE_URL);
        assert!(cfg.http.access_token.is_none());
        assert!(cfg.preferences.watch);
        Ok(())
    }

    #[test]
    fn parses_all_sections() -> anyhow::Result<()> {
        let doc: ConfigDocument = toml::from_str(
            r#"
[sync]
poll_interval_ms = 10
retry_interval_ms = 2500

[http]
metadata_base_url = "http://localhost:8080/v1"
timeout_ms = 3000
access_token = "  "

[preferences]
path = "/tmp/prefs.toml"
watch = false
"#,
        )?;
        let cfg = Config::from(doc);

        assert_eq!(cfg.sync.poll_interval(), Duration::from_millis(100));
        assert_eq!(cfg.sync.retry_interval(), Duration::from_millis(2500));
        assert_eq!(cfg.http.metadata_base_url, "http://localhost:8080/v1");
        assert_eq!(cfg.http.timeout(), Duration::from_secs(3));
        assert!(cfg.http.access_token.is_none());
        assert_eq!(cfg.preferences.path, PathBuf::from("/tmp/prefs.toml"));
        assert!(!cfg.preferences.watch);
        Ok(())
    }

    #[test]
    fn relative_preferences_path_follows_config_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.toml");
        fs::write(&path, "[http]\naccess_token = \"secret\"\n")?;

        let cfg = Config::load_from(&path)?;
        assert_eq!(cfg.preferences.path, dir.path().join("preferences.toml"));
        assert_eq!(cfg.http.access_token.as_deref(), Some("secret"));
        Ok(())
    }
}
