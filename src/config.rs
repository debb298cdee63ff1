//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$FLIGHTMAIL_CONFIG` (environment variable)
//! 2. `~/.config/flightmail/config.toml` (Linux/macOS)
//!    `%APPDATA%\flightmail\config.toml` (Windows)
//! 3. Built-in defaults
//!
//! Every tunable is carried here and handed to constructors; nothing in the
//! library reads global state.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{FlightError, Result};

/// Environment variable that overrides the config file location.
pub const CONFIG_ENV_VAR: &str = "FLIGHTMAIL_CONFIG";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub classifier: ClassifierConfig,
    pub parser: ParserConfig,
    pub grouping: GroupingConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// Override cache directory for logs.
    pub cache_dir: Option<PathBuf>,
    /// Threads used to classify and parse a batch (0 = available parallelism).
    pub workers: usize,
    /// Report what would be forwarded without writing anything.
    pub dry_run: bool,
    /// Messages larger than this many bytes are truncated on ingestion.
    pub max_message_size: usize,
}

/// Classifier scoring settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Minimum total score for a confirmation.
    pub threshold: u32,
    /// Sender domains of airlines and travel agencies (suffix-matched).
    pub airline_domains: Vec<String>,
    /// Extra subject regexes that count as a confirmation.
    pub extra_confirmation_patterns: Vec<String>,
    /// Extra subject regexes that veto a confirmation subject.
    pub extra_exclusion_patterns: Vec<String>,
}

/// Flight data extraction settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Let later strategies fill fields the winning strategy left empty.
    pub merge_partial_records: bool,
}

/// Duplicate grouping settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupingConfig {
    /// Similarity a near-identical booking reference must reach (0–1].
    /// Any value below 1.0 allows at least one edit; 1.0 turns fuzzy
    /// matching off.
    pub fuzzy_threshold: f64,
    /// Shortest reference considered for fuzzy matching.
    pub min_fuzzy_length: usize,
    /// Corroborate links with text embeddings.
    pub semantic_enabled: bool,
    /// Cosine similarity that counts as corroboration.
    pub semantic_threshold: f32,
    /// Dimension of the built-in hashing embedder.
    pub embedding_dimension: usize,
}

// ── Default implementations ─────────────────────────────────────

/// Airline and agency domains recognised out of the box.
pub const DEFAULT_AIRLINE_DOMAINS: &[&str] = &[
    "united.com",
    "delta.com",
    "aa.com",
    "americanairlines.com",
    "southwest.com",
    "luv.southwest.com",
    "jetblue.com",
    "alaskaair.com",
    "spirit.com",
    "frontier.com",
    "expedia.com",
    "welcomemail.expedia.com",
    "kayak.com",
    "priceline.com",
];

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            cache_dir: None,
            workers: 0,
            dry_run: false,
            max_message_size: 32 * 1024 * 1024,
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            threshold: 50,
            airline_domains: DEFAULT_AIRLINE_DOMAINS
                .iter()
                .map(|d| d.to_string())
                .collect(),
            extra_confirmation_patterns: Vec::new(),
            extra_exclusion_patterns: Vec::new(),
        }
    }
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: 0.95,
            min_fuzzy_length: 5,
            semantic_enabled: true,
            semantic_threshold: 0.80,
            embedding_dimension: 256,
        }
    }
}

impl Config {
    /// Reject values no component can work with.
    pub fn validate(&self) -> Result<()> {
        let g = &self.grouping;
        if !(g.fuzzy_threshold > 0.0 && g.fuzzy_threshold <= 1.0) {
            return Err(FlightError::Config(format!(
                "grouping.fuzzy_threshold must be in (0, 1], got {}",
                g.fuzzy_threshold
            )));
        }
        if !(0.0..=1.0).contains(&g.semantic_threshold) {
            return Err(FlightError::Config(format!(
                "grouping.semantic_threshold must be in [0, 1], got {}",
                g.semantic_threshold
            )));
        }
        if g.embedding_dimension == 0 {
            return Err(FlightError::Config(
                "grouping.embedding_dimension must be positive".into(),
            ));
        }
        if self.classifier.threshold > 100 {
            return Err(FlightError::Config(format!(
                "classifier.threshold cannot exceed 100, got {}",
                self.classifier.threshold
            )));
        }
        Ok(())
    }
}

// ── Load / save ─────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match load_config_from(&path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to load config, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Load and validate the configuration at `path`.
///
/// Unlike [`load_config`], a missing or broken file is an error: the caller
/// asked for this file explicitly.
pub fn load_config_from(path: &Path) -> Result<Config> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            FlightError::FileNotFound(path.to_path_buf())
        } else {
            FlightError::io(path, e)
        }
    })?;
    let cfg: Config = toml::from_str(&contents)
        .map_err(|e| FlightError::Config(format!("{}: {e}", path.display())))?;
    cfg.validate()?;
    tracing::info!(path = %path.display(), "Loaded config");
    Ok(cfg)
}

/// Save configuration to the standard location.
pub fn save_config(config: &Config) -> anyhow::Result<PathBuf> {
    let path = config_file_path()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config file path"))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(&path, contents)?;
    tracing::info!(path = %path.display(), "Saved config");
    Ok(path)
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var(CONFIG_ENV_VAR) {
        return Some(PathBuf::from(env_path));
    }
    dirs::config_dir().map(|d| d.join("flightmail").join("config.toml"))
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("flightmail")
}

/// Return the log file path.
pub fn log_file_path(config: &Config) -> PathBuf {
    cache_dir(config).join("flightmail.log")
}
