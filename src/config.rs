use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Application root; relative URLs below resolve against it
  pub scope: String,
  pub cache: CacheConfig,
  pub sync: SyncConfig,
  pub notifications: NotificationConfig,
  /// Database file (defaults to $XDG_DATA_HOME/quizgate/cache.db)
  pub database: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Version tag naming the current bucket
  pub version: String,
  /// Document served to HTML requests while offline
  pub offline_page: String,
  /// Resources stored at install time
  pub manifest: Vec<String>,
  /// URL schemes that are never intercepted
  pub bypass_schemes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  pub tag: String,
  pub periodic_tag: String,
  /// Key/value slot holding the pending results
  pub queue_key: String,
  pub endpoint: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
  pub title: String,
  /// Body used when a push carries no payload
  pub default_body: String,
  pub icon: String,
  pub badge: String,
  pub vibrate: Vec<u32>,
}

const APP_ICON: &str = "https://cdn-icons-png.flaticon.com/512/2237/2237282.png";

impl Default for Config {
  fn default() -> Self {
    Self {
      scope: "http://localhost:8080/".to_string(),
      cache: CacheConfig::default(),
      sync: SyncConfig::default(),
      notifications: NotificationConfig::default(),
      database: None,
    }
  }
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      version: "jamb-mastermind-v1.1".to_string(),
      offline_page: "offline.html".to_string(),
      manifest: vec![
        "./".to_string(),
        "./index.html".to_string(),
        "./manifest.json".to_string(),
        "https://cdnjs.cloudflare.com/ajax/libs/font-awesome/6.4.0/css/all.min.css".to_string(),
        "https://fonts.googleapis.com/css2?family=Segoe+UI:wght@300;400;500;600;700&display=swap"
          .to_string(),
        APP_ICON.to_string(),
      ],
      bypass_schemes: vec![
        "chrome-extension".to_string(),
        "moz-extension".to_string(),
        "safari-web-extension".to_string(),
      ],
    }
  }
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      tag: "sync-quiz-results".to_string(),
      periodic_tag: "update-questions".to_string(),
      queue_key: "pendingResults".to_string(),
      endpoint: "/api/sync-results".to_string(),
    }
  }
}

impl Default for NotificationConfig {
  fn default() -> Self {
    Self {
      title: "JAMB Mastermind 300".to_string(),
      default_body: "New update available!".to_string(),
      icon: APP_ICON.to_string(),
      badge: APP_ICON.to_string(),
      vibrate: vec![100, 50, 100],
    }
  }
}

/// Resolved settings handed to the gate at construction.
#[derive(Debug, Clone)]
pub struct GateConfig {
  pub version: String,
  pub scope: Url,
  pub manifest: Vec<Url>,
  pub offline_page: Url,
  pub bypass_schemes: Vec<String>,
  pub sync_tag: String,
  pub periodic_sync_tag: String,
  pub queue_key: String,
  pub sync_endpoint: Url,
  pub notifications: NotificationConfig,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./quizgate.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/quizgate/config.yaml
  ///
  /// Falls back to the built-in defaults when no file is found.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("quizgate.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("quizgate").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// Database location.
  ///
  /// Checks QUIZGATE_DB first, then the config file, then the data directory.
  pub fn database_path(&self) -> Result<PathBuf> {
    if let Ok(path) = std::env::var("QUIZGATE_DB") {
      return Ok(PathBuf::from(path));
    }
    match &self.database {
      Some(path) => Ok(path.clone()),
      None => crate::db::Database::default_path(),
    }
  }

  /// Parse the scope URL
  pub fn scope_url(&self) -> Result<Url> {
    Url::parse(&self.scope).map_err(|e| eyre!("Invalid scope URL {}: {}", self.scope, e))
  }

  /// Resolve a possibly relative URL against the scope
  pub fn resolve(&self, url: &str) -> Result<Url> {
    self
      .scope_url()?
      .join(url)
      .map_err(|e| eyre!("Invalid URL {}: {}", url, e))
  }

  /// Resolve every URL and build the gate settings.
  pub fn gate_config(&self) -> Result<GateConfig> {
    if self.cache.version.trim().is_empty() {
      return Err(eyre!("cache.version must not be empty"));
    }

    let manifest = self
      .cache
      .manifest
      .iter()
      .map(|u| self.resolve(u))
      .collect::<Result<Vec<_>>>()?;

    Ok(GateConfig {
      version: self.cache.version.clone(),
      scope: self.scope_url()?,
      manifest,
      offline_page: self.resolve(&self.cache.offline_page)?,
      bypass_schemes: self.cache.bypass_schemes.clone(),
      sync_tag: self.sync.tag.clone(),
      periodic_sync_tag: self.sync.periodic_tag.clone(),
      queue_key: self.sync.queue_key.clone(),
      sync_endpoint: self.resolve(&self.sync.endpoint)?,
      notifications: self.notifications.clone(),
    })
  }
}
