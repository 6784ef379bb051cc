//! Engine configuration
//!
//! Loaded from JSON. Every key is optional and falls back to its default.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{DbError, DbResult};
use crate::mutation::IdStrategy;
use crate::storage::HashAlgorithm;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How long a mutation waits for the writer lock (default: 30000)
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Row hash digest (default: "sha256")
    #[serde(default)]
    pub hash_algorithm: HashAlgorithm,

    /// Id strategy for new queries (default: "sequential")
    #[serde(default)]
    pub id_strategy: IdStrategy,

    /// Unknown filter fields are errors (default: true)
    #[serde(default = "default_strict_fields")]
    pub strict_fields: bool,
}

fn default_lock_timeout_ms() -> u64 {
    30_000
}

fn default_strict_fields() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: default_lock_timeout_ms(),
            hash_algorithm: HashAlgorithm::default(),
            id_strategy: IdStrategy::default(),
            strict_fields: default_strict_fields(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(text: &str) -> DbResult<Self> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        // surface a bad strategy name as its own error code
        if let Some(strategy) = value.get("id_strategy").and_then(serde_json::Value::as_str) {
            strategy.parse::<IdStrategy>()?;
        }
        let config: Self = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a JSON config file
    pub fn load(path: impl AsRef<Path>) -> DbResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            DbError::internal(format!("Cannot read config {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&text)
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn validate(&self) -> DbResult<()> {
        if self.lock_timeout_ms == 0 {
            return Err(DbError::missing_or_wrong_params(
                "lock_timeout_ms must be greater than zero",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCode;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.lock_timeout(), Duration::from_secs(30));
        assert_eq!(config.hash_algorithm, HashAlgorithm::Sha256);
        assert_eq!(config.id_strategy, IdStrategy::Sequential);
        assert!(config.strict_fields);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config =
            EngineConfig::from_json_str(r#"{"hash_algorithm": "sha512", "id_strategy": "uuid"}"#)
                .unwrap();
        assert_eq!(config.hash_algorithm, HashAlgorithm::Sha512);
        assert_eq!(config.id_strategy, IdStrategy::RandomUnique);
        assert_eq!(config.lock_timeout_ms, 30_000);
    }

    #[test]
    fn test_rejects_bad_values() {
        let err = EngineConfig::from_json_str(r#"{"lock_timeout_ms": 0}"#).unwrap_err();
        assert_eq!(err.code(), ErrorCode::MissingOrWrongParams);
        let err = EngineConfig::from_json_str(r#"{"id_strategy": "random"}"#).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidIdStrategy);
        let err = EngineConfig::from_json_str(r#"{"id_strategy": 7}"#).unwrap_err();
        assert_eq!(err.code(), ErrorCode::MissingOrWrongParams);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"lock_timeout_ms": 250, "strict_fields": false}}"#).unwrap();
        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.lock_timeout(), Duration::from_millis(250));
        assert!(!config.strict_fields);
    }
}
