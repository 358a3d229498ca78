use anyhow::{Context, Result};
use fetchtv_core::DEFAULT_PORT;
use fetchtv_dlna::HttpConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings read from `config.toml`; every field is optional
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub port: u16,
    pub discovery_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub browse_page_size: u32,
    pub browse_concurrency: usize,
    pub download_concurrency: usize,
    pub download_deadline_secs: Option<u64>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            discovery_timeout_secs: 5,
            request_timeout_secs: 5,
            browse_page_size: 200,
            browse_concurrency: 4,
            download_concurrency: 2,
            download_deadline_secs: None,
        }
    }
}

impl AppConfig {
    /// Load `path`, or the default location if it exists, or fall back to defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: AppConfig = toml::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        tracing::debug!("Loaded config from {}: {:?}", path.display(), config);
        Ok(config)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.discovery_timeout_secs)
    }

    pub fn download_deadline(&self) -> Option<Duration> {
        self.download_deadline_secs.map(Duration::from_secs)
    }

    pub fn http_config(&self) -> HttpConfig {
        HttpConfig {
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            connect_timeout: Duration::from_secs(self.request_timeout_secs),
            browse_page_size: self.browse_page_size,
            browse_concurrency: self.browse_concurrency,
            download_concurrency: self.download_concurrency,
        }
    }
}

/// `<config dir>/fetchtv/config.toml` (platform-specific)
fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("fetchtv").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "port = 49153\ndownload_deadline_secs = 3600\n").unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.port, 49153);
        assert_eq!(config.download_deadline(), Some(Duration::from_secs(3600)));
        assert_eq!(config.browse_concurrency, 4);
        assert_eq!(config.discovery_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(AppConfig::load(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn test_bad_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "port = \"not a number\"").unwrap();
        assert!(AppConfig::load(Some(&path)).is_err());
    }

    #[test]
    fn test_http_config_mapping() {
        let config = AppConfig {
            request_timeout_secs: 9,
            browse_page_size: 50,
            ..Default::default()
        };
        let http = config.http_config();
        assert_eq!(http.request_timeout, Duration::from_secs(9));
        assert_eq!(http.browse_page_size, 50);
        assert_eq!(http.download_concurrency, 2);
    }
}
