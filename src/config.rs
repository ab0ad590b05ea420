use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "Compliance Risk Engine";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initial nearest-neighbor breadth per sub-query.
pub const DEFAULT_TOP_K: usize = 8;
/// Breadth of the single widened search when scope filtering empties the first one.
pub const DEFAULT_WIDENED_TOP_K: usize = 25;
/// Blocking collaborator calls in flight at once, independent of entity count.
pub const DEFAULT_MAX_WORKERS: usize = 4;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_QUESTION_CHARS: usize = 2_000;
/// Policy excerpt budget per entity prompt.
pub const DEFAULT_MAX_CONTEXT_CHARS: usize = 6_000;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_GENERATION_MODEL: &str = "llama3.1:8b";
pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";
pub const DEFAULT_EMBEDDING_DIM: usize = 768;

/// Filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "compliance_risk_engine=info,warn"
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Tunables for the question pipeline and its default collaborators.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub top_k: usize,
    pub widened_top_k: usize,
    pub max_workers: usize,
    /// Whole-request deadline; entities without a judgment by then are reported unavailable.
    pub request_timeout: Duration,
    /// Deadline for a single generation call.
    pub generation_timeout: Duration,
    pub max_question_chars: usize,
    pub max_context_chars: usize,
    pub ollama_url: String,
    pub generation_model: String,
    pub embedding_model: String,
    pub embedding_dim: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            widened_top_k: DEFAULT_WIDENED_TOP_K,
            max_workers: DEFAULT_MAX_WORKERS,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            generation_timeout: Duration::from_secs(DEFAULT_GENERATION_TIMEOUT_SECS),
            max_question_chars: DEFAULT_MAX_QUESTION_CHARS,
            max_context_chars: DEFAULT_MAX_CONTEXT_CHARS,
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            generation_model: DEFAULT_GENERATION_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_dim: DEFAULT_EMBEDDING_DIM,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `COMPLIANCE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = parse_var(&lookup, "COMPLIANCE_TOP_K")? {
            config.top_k = v;
        }
        if let Some(v) = parse_var(&lookup, "COMPLIANCE_WIDENED_TOP_K")? {
            config.widened_top_k = v;
        }
        if let Some(v) = parse_var(&lookup, "COMPLIANCE_MAX_WORKERS")? {
            config.max_workers = v;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "COMPLIANCE_REQUEST_TIMEOUT_SECS")? {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "COMPLIANCE_GENERATION_TIMEOUT_SECS")? {
            config.generation_timeout = Duration::from_secs(secs);
        }
        if let Some(v) = parse_var(&lookup, "COMPLIANCE_MAX_QUESTION_CHARS")? {
            config.max_question_chars = v;
        }
        if let Some(v) = parse_var(&lookup, "COMPLIANCE_MAX_CONTEXT_CHARS")? {
            config.max_context_chars = v;
        }
        if let Some(v) = lookup("COMPLIANCE_OLLAMA_URL") {
            config.ollama_url = v;
        }
        if let Some(v) = lookup("COMPLIANCE_GENERATION_MODEL") {
            config.generation_model = v;
        }
        if let Some(v) = lookup("COMPLIANCE_EMBEDDING_MODEL") {
            config.embedding_model = v;
        }
        if let Some(v) = parse_var(&lookup, "COMPLIANCE_EMBEDDING_DIM")? {
            config.embedding_dim = v;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.top_k == 0 {
            return Err(ConfigError::Invalid("top_k must be at least 1".into()));
        }
        if self.widened_top_k < self.top_k {
            return Err(ConfigError::Invalid(format!(
                "widened_top_k ({}) must not be smaller than top_k ({})",
                self.widened_top_k, self.top_k
            )));
        }
        if self.max_workers == 0 {
            return Err(ConfigError::Invalid("max_workers must be at least 1".into()));
        }
        if self.request_timeout.is_zero() || self.generation_timeout.is_zero() {
            return Err(ConfigError::Invalid("timeouts must be non-zero".into()));
        }
        if self.max_question_chars == 0 || self.max_context_chars == 0 {
            return Err(ConfigError::Invalid("character budgets must be non-zero".into()));
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw,
            }),
    }
}

/// Read a JSON configuration file (registry or escalation vocabulary).
pub fn read_json_file(path: &Path) -> Result<String, ConfigError> {
    Ok(std::fs::read_to_string(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.top_k, 8);
        assert_eq!(config.widened_top_k, 25);
        assert_eq!(config.max_workers, 4);
    }

    #[test]
    fn lookup_overrides_defaults() {
        let config = EngineConfig::from_lookup(lookup_from(&[
            ("COMPLIANCE_TOP_K", "5"),
            ("COMPLIANCE_MAX_WORKERS", " 2 "),
            ("COMPLIANCE_REQUEST_TIMEOUT_SECS", "10"),
            ("COMPLIANCE_GENERATION_MODEL", "mistral"),
        ]))
        .unwrap();
        assert_eq!(config.top_k, 5);
        assert_eq!(config.max_workers, 2);
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.generation_model, "mistral");
        assert_eq!(config.widened_top_k, DEFAULT_WIDENED_TOP_K);
    }

    #[test]
    fn unparsable_value_is_rejected() {
        let err = EngineConfig::from_lookup(lookup_from(&[("COMPLIANCE_TOP_K", "eight")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "COMPLIANCE_TOP_K"));
    }

    #[test]
    fn widened_breadth_below_initial_is_rejected() {
        let err = EngineConfig::from_lookup(lookup_from(&[
            ("COMPLIANCE_TOP_K", "10"),
            ("COMPLIANCE_WIDENED_TOP_K", "5"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn zero_workers_is_rejected() {
        let config = EngineConfig {
            max_workers: 0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn read_json_file_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_json_file(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.1.0");
    }
}
