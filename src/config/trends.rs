// src/config/trends.rs
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::store::redis_store::DEFAULT_STORE_TIMEOUT;
use crate::stream::{StoreFailurePolicy, DEFAULT_TICK};
use crate::trends::TrendLimits;

pub const DEFAULT_CONFIG_PATH: &str = "config/trends.toml";
pub const ENV_CONFIG_PATH: &str = "TRENDS_CONFIG_PATH";

pub const ENV_REDIS_URL: &str = "REDIS_URL";
pub const ENV_STORE_BACKEND: &str = "TRENDS_STORE_BACKEND";
pub const ENV_STORE_TIMEOUT_MS: &str = "TRENDS_STORE_TIMEOUT_MS";
pub const ENV_STREAM_TICK_SECS: &str = "TRENDS_STREAM_TICK_SECS";
pub const ENV_MAX_SIZE: &str = "TRENDS_MAX_SIZE";

const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
const DEFAULT_KEEP_ALIVE_SECS: u64 = 15;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Redis,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "memory" => Ok(Self::Memory),
            other => anyhow::bail!("unknown store backend '{other}'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub redis_url: String,
    pub timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            redis_url: DEFAULT_REDIS_URL.to_string(),
            timeout_ms: DEFAULT_STORE_TIMEOUT.as_millis() as u64,
        }
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub tick_secs: u64,
    pub keep_alive_secs: u64,
    pub on_store_error: StoreFailurePolicy,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            tick_secs: DEFAULT_TICK.as_secs(),
            keep_alive_secs: DEFAULT_KEEP_ALIVE_SECS,
            on_store_error: StoreFailurePolicy::default(),
        }
    }
}

impl StreamConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendsConfig {
    pub store: StoreConfig,
    pub trends: TrendLimits,
    pub stream: StreamConfig,
}

impl TrendsConfig {
    /// Load using env var + fallback:
    /// 1) $TRENDS_CONFIG_PATH (must exist)
    /// 2) config/trends.toml (optional)
    ///
    /// then apply env overrides and sanitize.
    pub fn load() -> Result<Self> {
        let mut cfg = match std::env::var(ENV_CONFIG_PATH) {
            Ok(p) => Self::from_path(&PathBuf::from(p))?,
            Err(_) => {
                let p = PathBuf::from(DEFAULT_CONFIG_PATH);
                if p.exists() {
                    Self::from_path(&p)?
                } else {
                    Self::default()
                }
            }
        };
        cfg.apply_env_overrides();
        cfg.sanitize();
        Ok(cfg)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading trends config from {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("parsing trends config {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: TrendsConfig = toml::from_str(s)?;
        cfg.sanitize();
        Ok(cfg)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(ENV_REDIS_URL) {
            if !url.trim().is_empty() {
                self.store.redis_url = url.trim().to_string();
            }
        }
        if let Some(b) = parse_env::<StoreBackend>(ENV_STORE_BACKEND) {
            self.store.backend = b;
        }
        if let Some(ms) = parse_env::<u64>(ENV_STORE_TIMEOUT_MS) {
            self.store.timeout_ms = ms;
        }
        if let Some(secs) = parse_env::<u64>(ENV_STREAM_TICK_SECS) {
            self.stream.tick_secs = secs;
        }
        if let Some(max) = parse_env::<usize>(ENV_MAX_SIZE) {
            self.trends.max_size = max;
        }
    }

    /// Replace values that would break the pipeline with the defaults.
    pub fn sanitize(&mut self) {
        let defaults = TrendsConfig::default();
        if self.store.timeout_ms == 0 {
            self.store.timeout_ms = defaults.store.timeout_ms;
        }
        if self.stream.tick_secs == 0 {
            self.stream.tick_secs = defaults.stream.tick_secs;
        }
        if self.stream.keep_alive_secs == 0 {
            self.stream.keep_alive_secs = defaults.stream.keep_alive_secs;
        }
        if self.trends.max_size == 0 {
            self.trends.max_size = defaults.trends.max_size;
        }
        if self.trends.default_size == 0 {
            self.trends.default_size = defaults.trends.default_size;
        }
        self.trends.default_size = self.trends.default_size.min(self.trends.max_size);
        if self.trends.default_window.trim().is_empty() {
            self.trends.default_window = defaults.trends.default_window;
        }
    }
}

fn parse_env<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(target: "trends", var = name, value = %raw, "ignoring invalid env override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{env, fs};

    fn clear_env() {
        for k in [
            ENV_CONFIG_PATH,
            ENV_REDIS_URL,
            ENV_STORE_BACKEND,
            ENV_STORE_TIMEOUT_MS,
            ENV_STREAM_TICK_SECS,
            ENV_MAX_SIZE,
        ] {
            env::remove_var(k);
        }
    }

    #[test]
    fn defaults_match_reference_cadence_and_limits() {
        let cfg = TrendsConfig::default();
        assert_eq!(cfg.trends.default_window, "5m");
        assert_eq!(cfg.trends.default_size, 20);
        assert_eq!(cfg.trends.max_size, 100);
        assert_eq!(cfg.stream.tick(), Duration::from_secs(5));
        assert_eq!(cfg.stream.on_store_error, StoreFailurePolicy::SkipTick);
        assert_eq!(cfg.store.backend, StoreBackend::Redis);
    }

    #[test]
    fn partial_toml_keeps_defaults_and_sanitizes() {
        let toml = r#"
            [store]
            backend = "memory"
            timeout_ms = 0

            [trends]
            max_size = 50
            default_size = 80

            [stream]
            tick_secs = 2
            on_store_error = "emit_empty"
        "#;
        let cfg = TrendsConfig::from_toml_str(toml).unwrap();
        assert_eq!(cfg.store.backend, StoreBackend::Memory);
        assert_eq!(cfg.store.timeout_ms, 2000);
        assert_eq!(cfg.trends.max_size, 50);
        assert_eq!(cfg.trends.default_size, 50);
        assert_eq!(cfg.trends.default_window, "5m");
        assert_eq!(cfg.stream.tick_secs, 2);
        assert_eq!(cfg.stream.on_store_error, StoreFailurePolicy::EmitEmpty);
    }

    #[test]
    fn backend_parses_case_insensitively() {
        assert_eq!("Memory".parse::<StoreBackend>().unwrap(), StoreBackend::Memory);
        assert_eq!(" redis ".parse::<StoreBackend>().unwrap(), StoreBackend::Redis);
        assert!("postgres".parse::<StoreBackend>().is_err());
    }

    #[serial_test::serial]
    #[test]
    fn env_path_then_overrides() {
        clear_env();
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("trends.toml");
        fs::write(&p, "[stream]\ntick_secs = 9\n").unwrap();

        env::set_var(ENV_CONFIG_PATH, p.display().to_string());
        env::set_var(ENV_REDIS_URL, "redis://cache:6380");
        env::set_var(ENV_STORE_TIMEOUT_MS, "not-a-number");
        env::set_var(ENV_MAX_SIZE, "40");

        let cfg = TrendsConfig::load().unwrap();
        assert_eq!(cfg.stream.tick_secs, 9);
        assert_eq!(cfg.store.redis_url, "redis://cache:6380");
        assert_eq!(cfg.store.timeout_ms, 2000);
        assert_eq!(cfg.trends.max_size, 40);
        assert_eq!(cfg.trends.default_size, 20);

        clear_env();
    }

    #[serial_test::serial]
    #[test]
    fn env_path_to_missing_file_is_an_error() {
        clear_env();
        env::set_var(ENV_CONFIG_PATH, "/definitely/not/here/trends.toml");
        assert!(TrendsConfig::load().is_err());
        clear_env();
    }
}
