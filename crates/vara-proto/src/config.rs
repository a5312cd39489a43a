use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::platform;

/// Lower bound for the content-version poll interval.
pub const MIN_POLL_INTERVAL_MS: u64 = 3000;
/// Lower bound for the trigger-coalescing cooldown.
pub const MIN_COOLDOWN_MS: u64 = 1000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub content: ContentConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub loader: LoaderConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

/// Base URLs of the two external services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Catalog / analytics service.
    #[serde(default = "default_data_url")]
    pub data_url: String,
    /// Identity, billing, licensing and downloads.
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_license_timeout_secs")]
    pub license_timeout_secs: u64,
    #[serde(default = "default_trending_limit")]
    pub trending_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentConfig {
    #[serde(default = "default_version_path")]
    pub version_path: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    #[serde(default = "default_volume")]
    pub default_volume: f32,
    /// Play through an mpv child process. When false (or mpv is missing)
    /// the core runs with a silent sink.
    #[serde(default = "default_use_mpv")]
    pub use_mpv: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Delay between the header, hero and music-content reveal stages.
    #[serde(default = "default_stage_delay_ms")]
    pub stage_delay_ms: u64,
    /// Auto-hide for the global loading overlay.
    #[serde(default = "default_overlay_safety_secs")]
    pub overlay_safety_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "platform::default_downloads_dir")]
    pub downloads_dir: PathBuf,
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            data_url: default_data_url(),
            auth_url: default_auth_url(),
            request_timeout_secs: default_request_timeout_secs(),
            license_timeout_secs: default_license_timeout_secs(),
            trending_limit: default_trending_limit(),
        }
    }
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            version_path: default_version_path(),
            poll_interval_ms: default_poll_interval_ms(),
            cooldown_ms: default_cooldown_ms(),
        }
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            default_volume: default_volume(),
            use_mpv: default_use_mpv(),
        }
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            stage_delay_ms: default_stage_delay_ms(),
            overlay_safety_secs: default_overlay_safety_secs(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            downloads_dir: platform::default_downloads_dir(),
            state_file: default_state_file(),
        }
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn license_timeout(&self) -> Duration {
        Duration::from_secs(self.license_timeout_secs.max(1))
    }
}

impl ContentConfig {
    /// Poll interval, never below [`MIN_POLL_INTERVAL_MS`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(MIN_POLL_INTERVAL_MS))
    }

    /// Cooldown, never below [`MIN_COOLDOWN_MS`].
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms.max(MIN_COOLDOWN_MS))
    }
}

fn default_data_url() -> String {
    "http://127.0.0.1:5000".to_string()
}

fn default_auth_url() -> String {
    "http://127.0.0.1:5001".to_string()
}

fn default_request_timeout_secs() -> u64 {
    20
}

fn default_license_timeout_secs() -> u64 {
    6
}

fn default_trending_limit() -> usize {
    20
}

fn default_version_path() -> String {
    "/api/content/version".to_string()
}

fn default_poll_interval_ms() -> u64 {
    15_000
}

fn default_cooldown_ms() -> u64 {
    1500
}

fn default_volume() -> f32 {
    0.8
}

fn default_use_mpv() -> bool {
    true
}

fn default_stage_delay_ms() -> u64 {
    120
}

fn default_overlay_safety_secs() -> u64 {
    15
}

fn default_state_file() -> PathBuf {
    platform::data_dir().join("state.json")
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.backend.license_timeout(), Duration::from_secs(6));
        assert_eq!(config.content.version_path, "/api/content/version");
        assert_eq!(config.loader.overlay_safety_secs, 15);
        assert!(config.paths.state_file.ends_with("vara/state.json"));
    }

    #[test]
    fn test_poll_floors_apply() {
        let config = Config::from_toml_str(
            r#"
            [content]
            poll_interval_ms = 500
            cooldown_ms = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.content.poll_interval(), Duration::from_millis(3000));
        assert_eq!(config.content.cooldown(), Duration::from_millis(1000));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            [backend]
            data_url = "https://data.example"
            "#,
        )
        .unwrap();
        assert_eq!(config.backend.data_url, "https://data.example");
        assert_eq!(config.backend.auth_url, "http://127.0.0.1:5001");
        assert_eq!(config.backend.trending_limit, 20);
        assert!(config.player.use_mpv);
    }
}
