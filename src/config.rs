//! Relay configuration from environment variables and an optional TOML file.
//!
//! Values come from `RABBIT_RELAY_*` environment variables, then the TOML
//! file (keys are the variable names without prefix, lower snake case), then
//! the defaults below. Invalid values fall back without crashing; numeric
//! values are clamped to a floor.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `RABBIT_RELAY_ENGINE_PATH` | ./rabbit_cli | Cipher engine executable |
//! | `RABBIT_RELAY_SOURCE_URL` | http://192.168.4.1:5000/api/sensor-data | Telemetry source |
//! | `RABBIT_RELAY_POLL_INTERVAL_MS` | 1000 | Delay after a live cycle |
//! | `RABBIT_RELAY_FALLBACK_DELAY_MS` | 1000 | Delay after a synthetic cycle |
//! | `RABBIT_RELAY_ENCRYPTION` | true | Decrypt inbound payloads |
//! | `RABBIT_RELAY_KEY` | 00 11 .. EE FF | 16-byte key, hex tokens |
//! | `RABBIT_RELAY_IV` | 01 23 .. CD EF | 8-byte IV, hex tokens |
//! | `RABBIT_RELAY_LOG_CAPACITY` | 20 | Raw/decrypted log entries kept |
//! | `RABBIT_RELAY_TIMING_WINDOW` | 100 | Decrypt timings averaged |
//! | `RABBIT_RELAY_ENGINE_TIMEOUT_MS` | 10000 | Engine call limit (0 = none) |
//! | `RABBIT_RELAY_FETCH_TIMEOUT_MS` | 5000 | Source request limit |
//! | `RABBIT_RELAY_ARTIFACT_DIR` | system temp | Artifact file directory |
//! | `RABBIT_RELAY_SHUTDOWN_TIMEOUT` | 10 | Graceful drain limit (secs) |
//! | `RABBIT_RELAY_LOG_FORMAT` | json | `json` or `pretty` |
//! | `RABBIT_RELAY_LOG_LEVEL` | info | Tracing filter directive |
//! | `RABBIT_RELAY_LOG_FILE` | (stderr) | Append logs to this file |

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::{self, IV_LEN, KEY_LEN};
use crate::pipeline::PipelineConfig;
use crate::telemetry::{LogConfig, LogFormat};

pub const DEFAULT_KEY: &str = "00 11 22 33 44 55 66 77 88 99 AA BB CC DD EE FF";
pub const DEFAULT_IV: &str = "01 23 45 67 89 AB CD EF";
pub const DEFAULT_ENGINE_PATH: &str = "./rabbit_cli";
pub const DEFAULT_SOURCE_URL: &str = "http://192.168.4.1:5000/api/sensor-data";

const ENV_PREFIX: &str = "RABBIT_RELAY_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("Invalid config file {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
}

/// Optional TOML overlay. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub engine_path: Option<PathBuf>,
    pub source_url: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub fallback_delay_ms: Option<u64>,
    pub encryption: Option<bool>,
    pub key: Option<String>,
    pub iv: Option<String>,
    pub log_capacity: Option<usize>,
    pub timing_window: Option<usize>,
    pub engine_timeout_ms: Option<u64>,
    pub fetch_timeout_ms: Option<u64>,
    pub artifact_dir: Option<PathBuf>,
    pub shutdown_timeout: Option<u64>,
    pub log_format: Option<String>,
    pub log_level: Option<String>,
    pub log_file: Option<PathBuf>,
}

impl FileConfig {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&text).map_err(|reason| ConfigError::Parse {
            path: path.to_path_buf(),
            reason,
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, String> {
        toml::from_str(text).map_err(|e| e.to_string())
    }
}

/// Effective configuration summary (serializable).
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub engine_path: String,
    pub source_url: String,
    pub poll_interval_ms: u64,
    pub fallback_delay_ms: u64,
    pub encryption: bool,
    pub key: String,
    pub iv: String,
    pub log_capacity: usize,
    pub timing_window: usize,
    pub engine_timeout_ms: u64,
    pub fetch_timeout_ms: u64,
    pub artifact_dir: String,
    pub shutdown_timeout_secs: u64,
    pub log_format: String,
    pub log_level: String,
}

impl EffectiveConfig {
    /// `(VARIABLE, value)` pairs in documentation order.
    pub fn entries(&self) -> Vec<(String, String)> {
        let pairs: [(&str, String); 15] = [
            ("ENGINE_PATH", self.engine_path.clone()),
            ("SOURCE_URL", self.source_url.clone()),
            ("POLL_INTERVAL_MS", self.poll_interval_ms.to_string()),
            ("FALLBACK_DELAY_MS", self.fallback_delay_ms.to_string()),
            ("ENCRYPTION", self.encryption.to_string()),
            ("KEY", self.key.clone()),
            ("IV", self.iv.clone()),
            ("LOG_CAPACITY", self.log_capacity.to_string()),
            ("TIMING_WINDOW", self.timing_window.to_string()),
            ("ENGINE_TIMEOUT_MS", self.engine_timeout_ms.to_string()),
            ("FETCH_TIMEOUT_MS", self.fetch_timeout_ms.to_string()),
            ("ARTIFACT_DIR", self.artifact_dir.clone()),
            ("SHUTDOWN_TIMEOUT", self.shutdown_timeout_secs.to_string()),
            ("LOG_FORMAT", self.log_format.clone()),
            ("LOG_LEVEL", self.log_level.clone()),
        ];
        pairs
            .into_iter()
            .map(|(name, value)| (format!("{}{}", ENV_PREFIX, name), value))
            .collect()
    }
}

/// All relay configuration.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub engine_path: PathBuf,
    pub source_url: String,
    pub poll_interval: Duration,
    pub fallback_delay: Duration,
    pub encryption_enabled: bool,
    pub key: String,
    pub iv: String,
    pub log_capacity: usize,
    pub timing_window: usize,
    /// `None` disables the engine timeout.
    pub engine_timeout: Option<Duration>,
    pub fetch_timeout: Duration,
    pub artifact_dir: PathBuf,
    pub shutdown_timeout: Duration,
    pub log: LogConfig,
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(format!("{}{}", ENV_PREFIX, name))
        .ok()
        .filter(|v| !v.trim().is_empty())
}

/// Parse an env var, returning `None` on missing or invalid.
fn parse_env<T: FromStr>(name: &str) -> Option<T> {
    env_var(name).and_then(|v| v.trim().parse::<T>().ok())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Env first, then file, then default.
fn layered<T: FromStr>(name: &str, file: Option<T>, default: T) -> T {
    parse_env(name).or(file).unwrap_or(default)
}

fn layered_string(name: &str, file: Option<String>, default: &str) -> String {
    env_var(name)
        .or(file)
        .unwrap_or_else(|| default.to_string())
}

/// Load from environment variables only.
pub fn load() -> EnvConfig {
    build(FileConfig::default())
}

/// Load a TOML file, then apply environment overrides.
pub fn load_with_file(path: &Path) -> Result<EnvConfig, ConfigError> {
    Ok(build(FileConfig::from_path(path)?))
}

fn build(file: FileConfig) -> EnvConfig {
    let engine_path = env_var("ENGINE_PATH")
        .map(PathBuf::from)
        .or(file.engine_path)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ENGINE_PATH));
    let source_url = layered_string("SOURCE_URL", file.source_url, DEFAULT_SOURCE_URL);

    let poll_ms = layered("POLL_INTERVAL_MS", file.poll_interval_ms, 1000).max(10);
    let fallback_ms = layered("FALLBACK_DELAY_MS", file.fallback_delay_ms, 1000).max(10);
    let encryption_enabled = env_var("ENCRYPTION")
        .and_then(|v| parse_bool(&v))
        .or(file.encryption)
        .unwrap_or(true);

    let key = layered_string("KEY", file.key, DEFAULT_KEY);
    let iv = layered_string("IV", file.iv, DEFAULT_IV);

    let log_capacity = layered("LOG_CAPACITY", file.log_capacity, 20).max(1);
    let timing_window = layered("TIMING_WINDOW", file.timing_window, 100).max(1);
    let engine_timeout_ms = layered("ENGINE_TIMEOUT_MS", file.engine_timeout_ms, 10_000);
    let fetch_timeout_ms = layered("FETCH_TIMEOUT_MS", file.fetch_timeout_ms, 5000).max(100);
    let artifact_dir = env_var("ARTIFACT_DIR")
        .map(PathBuf::from)
        .or(file.artifact_dir)
        .unwrap_or_else(std::env::temp_dir);
    let shutdown_secs = layered("SHUTDOWN_TIMEOUT", file.shutdown_timeout, 10).max(1);

    let log_format = env_var("LOG_FORMAT")
        .and_then(|v| v.parse::<LogFormat>().ok())
        .or_else(|| file.log_format.and_then(|v| v.parse::<LogFormat>().ok()))
        .unwrap_or_default();
    let log_level = layered_string("LOG_LEVEL", file.log_level, "info");
    let log_file = env_var("LOG_FILE").map(PathBuf::from).or(file.log_file);

    EnvConfig {
        engine_path,
        source_url,
        poll_interval: Duration::from_millis(poll_ms),
        fallback_delay: Duration::from_millis(fallback_ms),
        encryption_enabled,
        key,
        iv,
        log_capacity,
        timing_window,
        engine_timeout: (engine_timeout_ms > 0).then(|| Duration::from_millis(engine_timeout_ms)),
        fetch_timeout: Duration::from_millis(fetch_timeout_ms),
        artifact_dir,
        shutdown_timeout: Duration::from_secs(shutdown_secs),
        log: LogConfig {
            format: log_format,
            level: log_level,
            output_path: log_file,
        },
    }
}

impl EnvConfig {
    /// Return a serializable summary of all effective values.
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            engine_path: self.engine_path.display().to_string(),
            source_url: self.source_url.clone(),
            poll_interval_ms: self.poll_interval.as_millis() as u64,
            fallback_delay_ms: self.fallback_delay.as_millis() as u64,
            encryption: self.encryption_enabled,
            key: self.key.clone(),
            iv: self.iv.clone(),
            log_capacity: self.log_capacity,
            timing_window: self.timing_window,
            engine_timeout_ms: self.engine_timeout.map_or(0, |d| d.as_millis() as u64),
            fetch_timeout_ms: self.fetch_timeout.as_millis() as u64,
            artifact_dir: self.artifact_dir.display().to_string(),
            shutdown_timeout_secs: self.shutdown_timeout.as_secs(),
            log_format: self.log.format.as_str().to_string(),
            log_level: self.log.level.clone(),
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            poll_interval: self.poll_interval,
            fallback_delay: self.fallback_delay,
            encryption_enabled: self.encryption_enabled,
            key: self.key.clone(),
            iv: self.iv.clone(),
            log_capacity: self.log_capacity,
            timing_window: self.timing_window,
        }
    }

    /// Misconfigurations worth reporting. Empty when the config looks usable.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if !codec::validate_length(&self.key, Some(KEY_LEN)) {
            warnings.push(format!(
                "{}KEY is not {} space-separated hex bytes",
                ENV_PREFIX, KEY_LEN
            ));
        }
        if !codec::validate_length(&self.iv, Some(IV_LEN)) {
            warnings.push(format!(
                "{}IV is not {} space-separated hex bytes",
                ENV_PREFIX, IV_LEN
            ));
        }
        if crate::engine::resolve_executable(&self.engine_path).is_err() {
            warnings.push(format!(
                "{}ENGINE_PATH ({}) does not exist",
                ENV_PREFIX,
                self.engine_path.display()
            ));
        }
        if !(self.source_url.starts_with("http://") || self.source_url.starts_with("https://")) {
            warnings.push(format!(
                "{}SOURCE_URL ({}) is not an http(s) URL",
                ENV_PREFIX, self.source_url
            ));
        }
        if !self.artifact_dir.is_dir() {
            warnings.push(format!(
                "{}ARTIFACT_DIR ({}) is not a directory",
                ENV_PREFIX,
                self.artifact_dir.display()
            ));
        }
        if self.engine_timeout.is_none() {
            warnings.push(format!(
                "{}ENGINE_TIMEOUT_MS is 0; a hung engine will stall the pipeline",
                ENV_PREFIX
            ));
        }

        warnings
    }
}

/// Documented defaults, ignoring the environment.
pub fn defaults() -> EnvConfig {
    EnvConfig {
        engine_path: PathBuf::from(DEFAULT_ENGINE_PATH),
        source_url: DEFAULT_SOURCE_URL.to_string(),
        poll_interval: Duration::from_millis(1000),
        fallback_delay: Duration::from_millis(1000),
        encryption_enabled: true,
        key: DEFAULT_KEY.to_string(),
        iv: DEFAULT_IV.to_string(),
        log_capacity: 20,
        timing_window: 100,
        engine_timeout: Some(Duration::from_millis(10_000)),
        fetch_timeout: Duration::from_millis(5000),
        artifact_dir: std::env::temp_dir(),
        shutdown_timeout: Duration::from_secs(10),
        log: LogConfig::default(),
    }
}
