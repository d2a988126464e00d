use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::download::{DownloadRequest, destination_for};
use crate::tasks::scrape::has_page_placeholder;
use crate::tasks::{Aria2Config, HosterConfig, ScrapeConfig, UnrestrictConfig};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub realdebrid: RealDebridConfig,
    #[serde(default)]
    pub aria2: Aria2Settings,
    #[serde(default)]
    pub download: DownloadSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_source_url")]
    pub source_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealDebridConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub api_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aria2Settings {
    #[serde(default = "default_rpc_host")]
    pub rpc_host: String,
    #[serde(default = "default_rpc_port")]
    pub rpc_port: u16,
    #[serde(default)]
    pub rpc_secret: String,
    #[serde(default)]
    pub rpc_username: String,
    #[serde(default)]
    pub rpc_password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadSettings {
    #[serde(default)]
    pub directory: Option<String>,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

// Default value functions
fn default_source_url() -> String {
    "https://example.org/category/tv-shows/page/%d/".to_string()
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0".to_string()
}
fn default_max_pages() -> u32 {
    10
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_max_concurrent_tasks() -> u8 {
    4
}
fn default_api_url() -> String {
    "https://api.real-debrid.com/rest/1.0".to_string()
}
fn default_rpc_host() -> String {
    "http://localhost".to_string()
}
fn default_rpc_port() -> u16 {
    6800
}
fn default_idle_timeout_secs() -> u64 {
    60
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            source_url: default_source_url(),
            user_agent: default_user_agent(),
            max_pages: default_max_pages(),
            request_timeout_secs: default_request_timeout_secs(),
            max_concurrent_tasks: default_max_concurrent_tasks(),
        }
    }
}

impl Default for RealDebridConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_token: String::new(),
        }
    }
}

impl Default for Aria2Settings {
    fn default() -> Self {
        Self {
            rpc_host: default_rpc_host(),
            rpc_port: default_rpc_port(),
            rpc_secret: String::new(),
            rpc_username: String::new(),
            rpc_password: String::new(),
        }
    }
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            directory: None,
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            realdebrid: RealDebridConfig::default(),
            aria2: Aria2Settings::default(),
            download: DownloadSettings::default(),
        }
    }
}

// Snapshots handed to tasks. Each call copies the current values, so editing
// the config afterwards never reaches a task that is already running.
impl Config {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.general.request_timeout_secs)
    }

    pub fn scrape_config(&self, max_pages: Option<u32>) -> ScrapeConfig {
        ScrapeConfig::new(
            self.general.source_url.clone(),
            self.general.user_agent.clone(),
            max_pages.unwrap_or(self.general.max_pages),
        )
    }

    pub fn hoster_config(&self, detail_url: &str) -> HosterConfig {
        HosterConfig::new(detail_url, self.general.user_agent.clone())
    }

    pub fn unrestrict_config(&self) -> UnrestrictConfig {
        UnrestrictConfig::new(
            self.realdebrid.api_url.clone(),
            self.realdebrid.api_token.clone(),
        )
        .with_user_agent(self.general.user_agent.clone())
    }

    pub fn aria2_config(&self) -> Aria2Config {
        Aria2Config::new(self.aria2.rpc_host.clone(), self.aria2.rpc_port)
            .with_secret(self.aria2.rpc_secret.clone())
            .with_credentials(
                self.aria2.rpc_username.clone(),
                self.aria2.rpc_password.clone(),
            )
    }

    /// Request for `url`; without an explicit `output` the file lands in the
    /// configured directory (or the current one) under the URL's file name.
    pub fn download_request(&self, url: &str, output: Option<PathBuf>) -> DownloadRequest {
        let output_path = output.unwrap_or_else(|| {
            let dir = self
                .download
                .directory
                .as_ref()
                .map(PathBuf::from)
                .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());
            destination_for(url, &dir)
        });

        DownloadRequest::new(url.to_string(), output_path)
            .with_user_agent(self.general.user_agent.clone())
            .with_idle_timeout(Duration::from_secs(self.download.idle_timeout_secs))
    }

    pub fn has_realdebrid_token(&self) -> bool {
        !self.realdebrid.api_token.trim().is_empty()
    }
}

pub struct ConfigManager {
    config_dir: PathBuf,
    config_file: PathBuf,
    config: Config,
}

impl ConfigManager {
    /// Load the config from the platform config directory, creating a default one if missing
    pub fn new() -> Result<Self> {
        let project_dirs =
            ProjectDirs::from("", "", "tvlinker").context("Failed to determine config directory")?;

        Self::with_file(project_dirs.config_dir().join("config.toml"))
    }

    /// Load the config from an explicit file, creating a default one if missing
    pub fn with_file(config_file: PathBuf) -> Result<Self> {
        let config_dir = config_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {:?}", config_dir))?;
        }

        let config = if config_file.exists() {
            Self::load_config(&config_file)?
        } else {
            let default_config = Config::default();
            Self::save_config(&config_file, &default_config)?;
            default_config
        };

        Ok(Self {
            config_dir,
            config_file,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn save(&self) -> Result<()> {
        Self::save_config(&self.config_file, &self.config)
    }

    pub fn reload(&mut self) -> Result<()> {
        self.config = Self::load_config(&self.config_file)?;
        Ok(())
    }

    /// Replace the in-memory config with defaults and write it out
    pub fn reset(&mut self) -> Result<()> {
        self.config = Config::default();
        self.save()
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    fn load_config(config_file: &Path) -> Result<Config> {
        let content = fs::read_to_string(config_file)
            .with_context(|| format!("Failed to read config file: {:?}", config_file))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", config_file))?;

        Ok(config)
    }

    fn save_config(config_file: &Path, config: &Config) -> Result<()> {
        let content = toml::to_string_pretty(config).context("Failed to serialize config")?;

        fs::write(config_file, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_file))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let general = &self.config.general;

        if general.max_pages == 0 {
            anyhow::bail!("max_pages must be greater than 0");
        }

        if general.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be greater than 0");
        }

        if general.max_concurrent_tasks == 0 {
            anyhow::bail!("max_concurrent_tasks must be greater than 0");
        }

        if general.user_agent.trim().is_empty() {
            anyhow::bail!("user_agent cannot be empty");
        }

        if !has_page_placeholder(&general.source_url) {
            anyhow::bail!(
                "source_url must contain a page placeholder (%d, %s or {{page}}): {}",
                general.source_url
            );
        }

        if self.config.download.idle_timeout_secs == 0 {
            anyhow::bail!("idle_timeout_secs must be greater than 0");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_creates_default_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("sub").join("config.toml");

        let manager = ConfigManager::with_file(file.clone()).unwrap();
        assert!(file.exists());
        assert_eq!(manager.config(), &Config::default());
        assert!(manager.validate().is_ok());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("config.toml");
        fs::write(
            &file,
            "[realdebrid]\napi_token = \"abc\"\n\n[aria2]\nrpc_port = 6801\n",
        )
        .unwrap();

        let manager = ConfigManager::with_file(file).unwrap();
        let config = manager.config();
        assert_eq!(config.realdebrid.api_token, "abc");
        assert_eq!(config.realdebrid.api_url, default_api_url());
        assert_eq!(config.aria2.rpc_port, 6801);
        assert_eq!(config.general.max_pages, 10);
    }

    #[test]
    fn test_validate_rejects_template_without_placeholder() {
        let dir = TempDir::new().unwrap();
        let mut manager = ConfigManager::with_file(dir.path().join("config.toml")).unwrap();
        manager.config_mut().general.source_url = "https://example.org/latest".to_string();
        assert!(manager.validate().is_err());

        manager.reset().unwrap();
        assert!(manager.validate().is_ok());
    }

    #[test]
    fn test_snapshots_are_independent_copies() {
        let mut config = Config::default();
        config.aria2.rpc_secret = "tok".to_string();
        let snapshot = config.aria2_config();

        config.aria2.rpc_secret = "changed".to_string();
        assert_eq!(snapshot.rpc_auth(), "token:tok");
    }

    #[test]
    fn test_download_request_uses_directory() {
        let mut config = Config::default();
        config.download.directory = Some("/srv/media".to_string());

        let request = config.download_request("https://dl.example.org/x/Show.mkv", None);
        assert_eq!(request.output_path, PathBuf::from("/srv/media/Show.mkv"));
        assert_eq!(request.user_agent.as_deref(), Some(default_user_agent().as_str()));
    }
}
