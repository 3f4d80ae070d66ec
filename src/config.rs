//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MAILSTASH_CONFIG` (environment variable)
//! 2. `~/.config/mailstash/config.toml` (Linux),
//!    `~/Library/Application Support/mailstash/config.toml` (macOS),
//!    `%APPDATA%\mailstash\config.toml` (Windows)
//! 3. Built-in defaults
//!
//! Credentials and the server host can also come from the environment
//! (`MAILSTASH_USER`, `MAILSTASH_PASSWORD`, `MAILSTASH_SERVER`), which wins
//! over the file.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StashError};
use crate::mailbox::{Credentials, ServerSettings};
use crate::pipeline::KeyStrategy;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub mailbox: MailboxConfig,
    pub storage: StorageConfig,
    pub run: RunConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// Override the directory the diagnostic log is written to.
    pub cache_dir: Option<PathBuf>,
}

/// IMAP server and account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailboxConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub mailbox: String,
    /// Socket connect/read/write timeout in seconds.
    pub timeout_secs: u64,
    /// Only for test servers with self-signed certificates.
    pub accept_invalid_certs: bool,
    /// What identifies a message in the log.
    pub id_strategy: KeyStrategy,
}

/// Where attachments and the CSV log live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub attachments_dir: PathBuf,
    pub log_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Number of most recent messages examined per run.
    pub window: usize,
    /// Largest window accepted from the command line.
    pub max_window: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            cache_dir: None,
        }
    }
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            host: "imap.gmail.com".to_string(),
            port: 993,
            username: String::new(),
            password: String::new(),
            mailbox: "INBOX".to_string(),
            timeout_secs: 30,
            accept_invalid_certs: false,
            id_strategy: KeyStrategy::Uid,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            attachments_dir: PathBuf::from("attachments"),
            log_file: PathBuf::from("logs.csv"),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            window: 20,
            max_window: 50,
        }
    }
}

impl Config {
    /// Replace file values with `MAILSTASH_USER`, `MAILSTASH_PASSWORD` and
    /// `MAILSTASH_SERVER` when they are set and non-empty.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());
        if let Some(user) = get("MAILSTASH_USER") {
            self.mailbox.username = user;
        }
        if let Some(password) = get("MAILSTASH_PASSWORD") {
            self.mailbox.password = password;
        }
        if let Some(host) = get("MAILSTASH_SERVER") {
            self.mailbox.host = host;
        }
    }

    /// Connection settings for the configured server.
    pub fn server_settings(&self) -> ServerSettings {
        ServerSettings {
            host: self.mailbox.host.clone(),
            port: self.mailbox.port,
            mailbox: self.mailbox.mailbox.clone(),
            timeout: Duration::from_secs(self.mailbox.timeout_secs.max(1)),
            accept_invalid_certs: self.mailbox.accept_invalid_certs,
        }
    }

    /// The login, or a configuration error if either half is missing.
    pub fn credentials(&self) -> Result<Credentials> {
        if self.mailbox.username.is_empty() {
            return Err(StashError::Config(
                "no username (set mailbox.username or MAILSTASH_USER)".to_string(),
            ));
        }
        if self.mailbox.password.is_empty() {
            return Err(StashError::Config(
                "no password (set mailbox.password or MAILSTASH_PASSWORD)".to_string(),
            ));
        }
        Ok(Credentials {
            username: self.mailbox.username.clone(),
            password: self.mailbox.password.clone(),
        })
    }

    /// Check a requested window against `run.max_window`.
    pub fn window(&self, requested: Option<usize>) -> Result<NonZeroUsize> {
        let n = requested.unwrap_or(self.run.window);
        if n > self.run.max_window {
            return Err(StashError::InvalidWindow);
        }
        NonZeroUsize::new(n).ok_or(StashError::InvalidWindow)
    }
}

// ── Load / save ─────────────────────────────────────────────────

/// Load configuration from `path`, or from the standard location when
/// `path` is `None`.
///
/// A missing standard file yields the defaults. A file that exists but
/// does not parse is an error, so a typo never silently runs against the
/// wrong mailbox.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path.map(Path::to_path_buf).or_else(config_file_path) {
        Some(p) => p,
        None => return Ok(Config::default()),
    };
    if !path.exists() {
        tracing::debug!(path = %path.display(), "No config file, using defaults");
        return Ok(Config::default());
    }

    let contents = std::fs::read_to_string(&path).map_err(|e| StashError::io(&path, e))?;
    let config = toml::from_str::<Config>(&contents)
        .map_err(|e| StashError::Config(format!("{}: {e}", path.display())))?;
    tracing::info!(path = %path.display(), "Loaded config");
    Ok(config)
}

/// Write `config` to `path`, creating parent directories.
pub fn save_config(config: &Config, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    tracing::info!(path = %path.display(), "Saved config");
    Ok(())
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MAILSTASH_CONFIG") {
        return Some(PathBuf::from(env_path));
    }
    dirs::config_dir().map(|d| d.join("mailstash").join("config.toml"))
}

/// Return the directory for the diagnostic log.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailstash")
}

/// Return the diagnostic log file path.
pub fn log_file_path(config: &Config) -> PathBuf {
    cache_dir(config).join("mailstash.log")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.mailbox.host, "imap.gmail.com");
        assert_eq!(cfg.mailbox.port, 993);
        assert_eq!(cfg.mailbox.mailbox, "INBOX");
        assert_eq!(cfg.storage.log_file, PathBuf::from("logs.csv"));
        assert_eq!(cfg.run.window, 20);
        assert_eq!(cfg.mailbox.id_strategy, KeyStrategy::Uid);
    }

    #[test]
    fn test_serialize_deserialize_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        let parsed: Config = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.mailbox.host, cfg.mailbox.host);
        assert_eq!(parsed.storage.attachments_dir, cfg.storage.attachments_dir);
        assert_eq!(parsed.run.max_window, cfg.run.max_window);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let partial = r#"
[mailbox]
host = "mail.example.org"
id_strategy = "content-hash"

[run]
window = 5
"#;
        let cfg: Config = toml::from_str(partial).expect("parse partial");
        assert_eq!(cfg.mailbox.host, "mail.example.org");
        assert_eq!(cfg.mailbox.id_strategy, KeyStrategy::ContentHash);
        assert_eq!(cfg.run.window, 5);
        // Other fields use defaults
        assert_eq!(cfg.mailbox.port, 993);
        assert_eq!(cfg.run.max_window, 50);
    }

    #[test]
    fn test_env_overrides() {
        let mut cfg = Config::default();
        cfg.mailbox.username = "file-user".into();
        cfg.apply_overrides(|name| match name {
            "MAILSTASH_PASSWORD" => Some("secret".into()),
            "MAILSTASH_SERVER" => Some("imap.example.com".into()),
            "MAILSTASH_USER" => Some(String::new()),
            _ => None,
        });
        assert_eq!(cfg.mailbox.username, "file-user");
        assert_eq!(cfg.mailbox.password, "secret");
        assert_eq!(cfg.mailbox.host, "imap.example.com");
    }

    #[test]
    fn test_missing_credentials() {
        let cfg = Config::default();
        assert!(matches!(cfg.credentials(), Err(StashError::Config(_))));
    }

    #[test]
    fn test_window_bounds() {
        let cfg = Config::default();
        assert_eq!(cfg.window(None).unwrap().get(), 20);
        assert_eq!(cfg.window(Some(50)).unwrap().get(), 50);
        assert!(matches!(cfg.window(Some(0)), Err(StashError::InvalidWindow)));
        assert!(matches!(cfg.window(Some(51)), Err(StashError::InvalidWindow)));
    }

    #[test]
    fn test_load_config_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[storage]\nlog_file = \"other.csv\"\n").unwrap();
        let cfg = load_config(Some(&path)).unwrap();
        assert_eq!(cfg.storage.log_file, PathBuf::from("other.csv"));

        std::fs::write(&path, "[storage\n").unwrap();
        assert!(matches!(load_config(Some(&path)), Err(StashError::Config(_))));
    }

    #[test]
    fn test_load_config_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = load_config(Some(&tmp.path().join("absent.toml"))).unwrap();
        assert_eq!(cfg.run.window, 20);
    }

    #[test]
    fn test_save_config_creates_parent() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("config.toml");
        save_config(&Config::default(), &path).unwrap();
        assert_eq!(load_config(Some(&path)).unwrap().mailbox.port, 993);
    }
}
