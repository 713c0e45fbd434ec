//! Runtime configuration for trailmark.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ─────────────────────────────────────────────────────────────────────────────
// Error
// ─────────────────────────────────────────────────────────────────────────────

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidEnv { key: &'static str, value: String },

    #[error("Invalid playback path {0:?}: must be an absolute, unused route without parameters")]
    InvalidPlaybackPath(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Config
// ─────────────────────────────────────────────────────────────────────────────

pub const CONFIG_PATH_ENV: &str = "TRAILMARK_CONFIG";

/// Fixed routes the playback page may not shadow.
const RESERVED_ROUTES: &[&str] = &["/traces", "/logs", "/sessions/aggregate", "/health"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrailmarkConfig {
    /// Socket address the HTTP server binds to.
    pub bind_addr: String,
    /// SQLite database holding traces and logs.
    pub db_path: PathBuf,
    /// Demo corpus loaded into an empty store.
    pub seed_path: Option<PathBuf>,
    /// A session whose latest log is younger than this is `Active`.
    pub recency_window_secs: u64,
    /// Rollups running longer than this are cancelled.
    pub rollup_timeout_ms: u64,
    /// Path of the playground page that replays traces.
    pub playback_path: String,
}

impl Default for TrailmarkConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".into(),
            db_path: PathBuf::from("data/trailmark.db"),
            seed_path: None,
            recency_window_secs: 300,
            rollup_timeout_ms: 5_000,
            playback_path: "/simulator".into(),
        }
    }
}

impl TrailmarkConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Loads the file named by `TRAILMARK_CONFIG` (if any), then applies env overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match env::var(CONFIG_PATH_ENV) {
            Ok(path) => {
                tracing::info!("Loading config from {}", path);
                Self::from_file(Path::new(&path))?
            }
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| env::var(key).ok())?;
        Ok(config)
    }

    /// Applies overrides from a key lookup (the process environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("TRAILMARK_BIND") {
            self.bind_addr = v;
        }
        if let Some(v) = lookup("TRAILMARK_DB") {
            self.db_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("TRAILMARK_SEED") {
            self.seed_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("TRAILMARK_RECENCY_SECS") {
            self.recency_window_secs = parse_u64("TRAILMARK_RECENCY_SECS", v)?;
        }
        if let Some(v) = lookup("TRAILMARK_ROLLUP_TIMEOUT_MS") {
            self.rollup_timeout_ms = parse_u64("TRAILMARK_ROLLUP_TIMEOUT_MS", v)?;
        }
        self.validate()
    }

    /// Rejects settings the server cannot start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let path = self.playback_path.as_str();
        let mountable = path.starts_with('/')
            && !path.contains(['{', '}', '*', '?', '#'])
            && !path.chars().any(char::is_whitespace)
            && !RESERVED_ROUTES.contains(&path.trim_end_matches('/'));
        if !mountable {
            return Err(ConfigError::InvalidPlaybackPath(self.playback_path.clone()));
        }
        Ok(())
    }

    pub fn recency_window(&self) -> Duration {
        Duration::from_secs(self.recency_window_secs)
    }

    pub fn rollup_timeout(&self) -> Duration {
        Duration::from_millis(self.rollup_timeout_ms)
    }
}

fn parse_u64(key: &'static str, value: String) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { key, value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"recency_window_secs": 60, "seed_path": "seed.json"}}"#).unwrap();

        let config = TrailmarkConfig::from_file(file.path()).unwrap();
        assert_eq!(config.recency_window(), Duration::from_secs(60));
        assert_eq!(config.seed_path, Some(PathBuf::from("seed.json")));
        assert_eq!(config.bind_addr, "0.0.0.0:8000");
        assert_eq!(config.playback_path, "/simulator");
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("TRAILMARK_BIND", "127.0.0.1:9000"),
            ("TRAILMARK_ROLLUP_TIMEOUT_MS", "250"),
        ]);
        let mut config = TrailmarkConfig::default();
        config
            .apply_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.bind_addr, "127.0.0.1:9000");
        assert_eq!(config.rollup_timeout(), Duration::from_millis(250));
        assert_eq!(config.recency_window_secs, 300);
    }

    #[test]
    fn test_invalid_env_value() {
        let mut config = TrailmarkConfig::default();
        let err = config
            .apply_overrides(|k| (k == "TRAILMARK_RECENCY_SECS").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { key: "TRAILMARK_RECENCY_SECS", .. }));
    }

    #[test]
    fn test_playback_path_must_be_mountable() {
        for bad in ["simulator", "/traces", "/logs/", "/replay/{id}", "/replay/*rest", ""] {
            let config = TrailmarkConfig {
                playback_path: bad.to_string(),
                ..TrailmarkConfig::default()
            };
            assert!(
                matches!(config.validate(), Err(ConfigError::InvalidPlaybackPath(_))),
                "accepted {:?}",
                bad
            );
        }

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"playback_path": "playground"}}"#).unwrap();
        let mut config = TrailmarkConfig::from_file(file.path()).unwrap();
        assert!(matches!(
            config.apply_overrides(|_| None),
            Err(ConfigError::InvalidPlaybackPath(_))
        ));

        let custom = TrailmarkConfig {
            playback_path: "/playground/replay".to_string(),
            ..TrailmarkConfig::default()
        };
        assert!(custom.validate().is_ok());
    }

    #[test]
    fn test_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();
        assert!(matches!(
            TrailmarkConfig::from_file(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }
}
