use crate::error::RelayError;
use crate::orchestrator::{OrchestratorConfig, DEFAULT_MAX_DEPTH};
use crate::retry::{RetryPolicy, DEFAULT_MAX_ATTEMPTS};
use relay_sandbox::{ExecutionLimits, DEFAULT_MAX_OUTPUT_BYTES};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Serialized settings from ~/.relay/config.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub model: String,
    pub api_keys: HashMap<String, String>,
    pub max_tokens: usize,
    pub max_depth: usize,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub command_timeout_secs: u64,
    pub command_output_limit: usize,
    pub system_prompt: Option<String>,
    /// Offer the service-side web_search and web_fetch tools.
    pub web_tools: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-20250514".to_string(),
            api_keys: HashMap::new(),
            max_tokens: 8_192,
            max_depth: DEFAULT_MAX_DEPTH,
            max_retries: DEFAULT_MAX_ATTEMPTS,
            retry_base_delay_ms: 1_000,
            command_timeout_secs: 30,
            command_output_limit: DEFAULT_MAX_OUTPUT_BYTES,
            system_prompt: None,
            web_tools: true,
        }
    }
}

impl Config {
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            max_depth: self.max_depth,
            max_tokens: Some(self.max_tokens),
            retry: RetryPolicy::default()
                .with_max_attempts(self.max_retries)
                .with_base_delay(Duration::from_millis(self.retry_base_delay_ms)),
        }
    }

    pub fn execution_limits(&self) -> ExecutionLimits {
        ExecutionLimits {
            timeout: Duration::from_secs(self.command_timeout_secs.max(1)),
            max_output_bytes: self.command_output_limit,
        }
    }
}

/// Helper struct for storing the location to read/write global settings
pub struct ConfigStore {
    path: PathBuf,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore {
    pub fn new() -> Self {
        let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(".relay");
        path.push("config.json");
        Self { path }
    }

    /// Store backed by an explicit file.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the config file. A missing file yields the defaults.
    pub fn try_load(&self) -> Result<Config, RelayError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Config::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Load the user's saved config, or fallback to Default
    pub fn load(&self) -> Config {
        self.try_load().unwrap_or_else(|e| {
            warn!(path = %self.path.display(), error = %e, "Ignoring unreadable config");
            Config::default()
        })
    }

    /// Save the user's config back to disk
    pub fn save(&self, config: &Config) -> Result<(), RelayError> {
        let parent = self
            .path
            .parent()
            .ok_or_else(|| RelayError::Config(format!("{} has no parent", self.path.display())))?;
        fs::create_dir_all(parent)?;
        let content = serde_json::to_string_pretty(config)?;
        fs::write(&self.path, content)?;
        Ok(())
    }

    /// Export configured API keys as `<PROVIDER>_API_KEY` unless already set.
    pub fn hydrate_env(&self) {
        hydrate_env_from(&self.load());
    }
}

fn hydrate_env_from(config: &Config) {
    for (provider, key) in config.api_keys.iter() {
        if !key.is_empty() {
            let env_var = format!("{}_API_KEY", provider.to_uppercase());
            if std::env::var(&env_var).is_err() {
                std::env::set_var(&env_var, key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: Config = serde_json::from_str(r#"{"model":"claude-3-5-haiku-20241022"}"#).unwrap();
        assert_eq!(parsed.model, "claude-3-5-haiku-20241022");
        assert_eq!(parsed.max_depth, DEFAULT_MAX_DEPTH);
        assert_eq!(parsed.max_retries, 3);
        assert!(parsed.web_tools);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::at(dir.path().join("nested").join("config.json"));
        let config = Config {
            max_depth: 4,
            system_prompt: Some("Be terse.".to_string()),
            ..Config::default()
        };

        store.save(&config).unwrap();
        assert_eq!(store.try_load().unwrap(), config);
    }

    #[test]
    fn test_missing_and_corrupt_files() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::at(dir.path().join("config.json"));
        assert_eq!(store.try_load().unwrap(), Config::default());

        std::fs::write(store.path(), "{not json").unwrap();
        assert!(matches!(store.try_load(), Err(RelayError::Serialization(_))));
        assert_eq!(store.load(), Config::default());
    }

    #[test]
    fn test_derived_settings() {
        let config = Config {
            max_retries: 5,
            retry_base_delay_ms: 250,
            command_timeout_secs: 0,
            ..Config::default()
        };

        let orchestrator = config.orchestrator_config();
        assert_eq!(orchestrator.retry.max_attempts, 5);
        assert_eq!(orchestrator.retry.base_delay, Duration::from_millis(250));
        assert_eq!(config.execution_limits().timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_hydrate_env_does_not_override() {
        let mut config = Config::default();
        config
            .api_keys
            .insert("relaytest".to_string(), "from-config".to_string());

        std::env::set_var("RELAYTEST_API_KEY", "from-env");
        hydrate_env_from(&config);
        assert_eq!(std::env::var("RELAYTEST_API_KEY").unwrap(), "from-env");

        std::env::remove_var("RELAYTEST_API_KEY");
        hydrate_env_from(&config);
        assert_eq!(std::env::var("RELAYTEST_API_KEY").unwrap(), "from-config");
        std::env::remove_var("RELAYTEST_API_KEY");
    }
}
