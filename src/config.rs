//! TOML configuration with environment overrides.
//!
//! Every key has a default, so a missing config file is not an error. The
//! environment wins over the file; credentials only ever come from the
//! environment.
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `HARVEST_URL` | `source.url` |
//! | `HARVEST_USER` | session user (env only) |
//! | `HARVEST_PASSWORD` | session password (env only) |
//! | `HARVEST_BACKWARD` | `collection.backward` |
//! | `HARVEST_START_YEAR` | `collection.start_year` |
//! | `HARVEST_END_YEAR` | `collection.end_year` |
//! | `HARVEST_DATA_DIR` | `storage.data_dir` |

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub collection: CollectionConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(default)]
    pub decode: DecodeConfig,
    #[serde(skip)]
    pub credentials: Option<Credentials>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SourceConfig {
    #[serde(default)]
    pub url: Option<String>,
    /// Search expression entered into the session.
    #[serde(default)]
    pub query: Option<String>,
    /// Optional publication filter applied by the session.
    #[serde(default)]
    pub source_filter: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CollectionConfig {
    #[serde(default = "default_start_year")]
    pub start_year: i32,
    /// Exclusive.
    #[serde(default = "default_end_year")]
    pub end_year: i32,
    #[serde(default)]
    pub backward: bool,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_chunk_delay_ms")]
    pub chunk_delay_ms: u64,
    #[serde(default = "default_session_retries")]
    pub session_retries: u32,
    #[serde(default = "default_session_backoff_secs")]
    pub session_backoff_secs: u64,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            start_year: default_start_year(),
            end_year: default_end_year(),
            backward: false,
            max_attempts: default_max_attempts(),
            chunk_delay_ms: default_chunk_delay_ms(),
            session_retries: default_session_retries(),
            session_backoff_secs: default_session_backoff_secs(),
        }
    }
}

fn default_start_year() -> i32 {
    2008
}
fn default_end_year() -> i32 {
    2024
}
fn default_max_attempts() -> u32 {
    3
}
fn default_chunk_delay_ms() -> u64 {
    5_000
}
fn default_session_retries() -> u32 {
    2
}
fn default_session_backoff_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct FetcherConfig {
    /// Helper program and its arguments; it owns the browser session.
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default = "default_narrow_timeout_secs")]
    pub narrow_timeout_secs: u64,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: u64,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            narrow_timeout_secs: default_narrow_timeout_secs(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            session_timeout_secs: default_session_timeout_secs(),
        }
    }
}

fn default_narrow_timeout_secs() -> u64 {
    60
}
fn default_fetch_timeout_secs() -> u64 {
    120
}
fn default_session_timeout_secs() -> u64 {
    90
}

impl FetcherConfig {
    pub fn narrow_timeout(&self) -> Duration {
        Duration::from_secs(self.narrow_timeout_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DecodeConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Archive entries matching any of these globs are index files, not
    /// documents.
    #[serde(default = "default_skip_entries")]
    pub skip_entries: Vec<String>,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            skip_entries: default_skip_entries(),
        }
    }
}

fn default_workers() -> usize {
    4
}

fn default_skip_entries() -> Vec<String> {
    vec!["*_doclist*".to_string()]
}

/// Session credentials, read from the environment only.
#[derive(Clone)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl StorageConfig {
    pub fn zip_dir(&self) -> PathBuf {
        self.data_dir.join("zip")
    }

    pub fn json_dir(&self) -> PathBuf {
        self.data_dir.join("json")
    }
}

/// Load the config file (if present), apply environment overrides, and
/// validate.
pub fn load_config(path: &Path) -> Result<Config> {
    load_config_with(path, |key| std::env::var(key).ok())
}

/// [`load_config`] with `lookup` standing in for the process environment.
pub fn load_config_with(
    path: &Path,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Config> {
    let mut config: Config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| "Failed to parse config file")?
    } else {
        Config::default()
    };

    apply_env(&mut config, lookup)?;
    validate(&config)?;
    Ok(config)
}

/// Apply `HARVEST_*` overrides using `lookup` as the environment.
pub fn apply_env(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
    if let Some(url) = lookup("HARVEST_URL") {
        config.source.url = Some(url);
    }
    if let Some(dir) = lookup("HARVEST_DATA_DIR") {
        config.storage.data_dir = PathBuf::from(dir);
    }
    if let Some(v) = lookup("HARVEST_BACKWARD") {
        config.collection.backward = parse_bool(&v)
            .with_context(|| format!("HARVEST_BACKWARD must be a boolean, got '{}'", v))?;
    }
    if let Some(v) = lookup("HARVEST_START_YEAR") {
        config.collection.start_year = v
            .trim()
            .parse()
            .with_context(|| format!("HARVEST_START_YEAR must be a year, got '{}'", v))?;
    }
    if let Some(v) = lookup("HARVEST_END_YEAR") {
        config.collection.end_year = v
            .trim()
            .parse()
            .with_context(|| format!("HARVEST_END_YEAR must be a year, got '{}'", v))?;
    }
    if let (Some(user), Some(password)) = (lookup("HARVEST_USER"), lookup("HARVEST_PASSWORD")) {
        config.credentials = Some(Credentials { user, password });
    }
    Ok(())
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

pub fn validate(config: &Config) -> Result<()> {
    let c = &config.collection;
    if c.start_year > c.end_year {
        bail!(
            "collection.start_year ({}) must not be after collection.end_year ({})",
            c.start_year,
            c.end_year
        );
    }
    if c.max_attempts == 0 {
        bail!("collection.max_attempts must be >= 1");
    }

    let f = &config.fetcher;
    if f.narrow_timeout_secs == 0 || f.fetch_timeout_secs == 0 || f.session_timeout_secs == 0 {
        bail!("fetcher timeouts must be > 0");
    }

    if config.decode.workers == 0 {
        bail!("decode.workers must be >= 1");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.collection.start_year, 2008);
        assert_eq!(config.collection.end_year, 2024);
        assert!(!config.collection.backward);
        assert_eq!(config.decode.skip_entries, vec!["*_doclist*"]);
        assert_eq!(config.storage.zip_dir(), PathBuf::from("data/zip"));
        validate(&config).unwrap();
    }

    #[test]
    fn file_values_parse() {
        let config: Config = toml::from_str(
            r#"
            [storage]
            data_dir = "/tmp/harvest"

            [collection]
            start_year = 2018
            end_year = 2023
            backward = true

            [fetcher]
            command = ["node", "fetcher.js"]
            fetch_timeout_secs = 30
            "#,
        )
        .unwrap();
        assert_eq!(config.storage.json_dir(), PathBuf::from("/tmp/harvest/json"));
        assert!(config.collection.backward);
        assert_eq!(config.fetcher.command, vec!["node", "fetcher.js"]);
        assert_eq!(config.fetcher.fetch_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn env_overrides_file() {
        let mut config = Config::default();
        apply_env(
            &mut config,
            env(&[
                ("HARVEST_URL", "https://example.test/search"),
                ("HARVEST_BACKWARD", "true"),
                ("HARVEST_START_YEAR", "2020"),
                ("HARVEST_END_YEAR", "2021"),
                ("HARVEST_USER", "alice"),
                ("HARVEST_PASSWORD", "hunter2"),
            ]),
        )
        .unwrap();
        assert_eq!(
            config.source.url.as_deref(),
            Some("https://example.test/search")
        );
        assert!(config.collection.backward);
        assert_eq!(config.collection.start_year, 2020);
        assert_eq!(config.collection.end_year, 2021);
        let creds = config.credentials.unwrap();
        assert_eq!(creds.user, "alice");
        assert!(!format!("{:?}", creds).contains("hunter2"));
    }

    #[test]
    fn credentials_need_both_halves() {
        let mut config = Config::default();
        apply_env(&mut config, env(&[("HARVEST_USER", "alice")])).unwrap();
        assert!(config.credentials.is_none());
    }

    #[test]
    fn bad_env_values_are_errors() {
        let mut config = Config::default();
        assert!(apply_env(&mut config, env(&[("HARVEST_BACKWARD", "maybe")])).is_err());
        assert!(apply_env(&mut config, env(&[("HARVEST_END_YEAR", "soon")])).is_err());
    }

    #[test]
    fn validation_rejects_inverted_years_and_zero_limits() {
        let mut config = Config::default();
        config.collection.start_year = 2022;
        config.collection.end_year = 2021;
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.collection.max_attempts = 0;
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.decode.workers = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn example_config_parses() {
        let config: Config = toml::from_str(include_str!("../config/harvest.example.toml")).unwrap();
        validate(&config).unwrap();
        assert_eq!(config.fetcher.session_timeout(), Duration::from_secs(90));
        assert_eq!(config.source.query.as_deref(), Some("climate AND (protest OR march)"));
    }

    #[test]
    fn missing_file_is_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_with(&dir.path().join("absent.toml"), |_| None).unwrap();
        assert_eq!(config.decode.workers, 4);
        assert!(!config.collection.backward);
        assert!(config.source.url.is_none());
    }
}
