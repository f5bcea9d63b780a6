//! CLI configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use tickrun_core::{ConfigError, ScheduleTimezone};

use crate::error::CliError;

/// Environment variable overriding [`Config::environment`].
pub const ENVIRONMENT_VAR: &str = "TICKRUN_ENV";

/// CLI configuration, loaded from an optional JSON file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Schedule file to load.
    pub schedule_path: PathBuf,

    /// Directory holding overlap lock files.
    pub lock_dir: PathBuf,

    /// Environment name checked by environment conditions.
    pub environment: String,

    /// Default timezone for tasks that do not set one.
    pub timezone: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schedule_path: PathBuf::from("schedule.json"),
            lock_dir: std::env::temp_dir().join("tickrun-locks"),
            environment: "prod".to_string(),
            timezone: "UTC".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file; missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let raw = std::fs::read_to_string(path).map_err(|source| CliError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| CliError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply an environment name override, typically from [`ENVIRONMENT_VAR`].
    pub fn with_environment_override(mut self, environment: Option<String>) -> Self {
        if let Some(environment) = environment.filter(|e| !e.trim().is_empty()) {
            self.environment = environment.trim().to_string();
        }
        self
    }

    /// Parsed default timezone.
    pub fn timezone(&self) -> Result<ScheduleTimezone, ConfigError> {
        self.timezone
            .parse()
            .map_err(|e| ConfigError::InvalidInput(format!("config timezone: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.schedule_path, PathBuf::from("schedule.json"));
        assert!(config.lock_dir.ends_with("tickrun-locks"));
        assert_eq!(config.environment, "prod");
        assert_eq!(config.timezone().unwrap(), ScheduleTimezone::Utc);
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tickrun.json");
        std::fs::write(&path, r#"{ "environment": "staging", "timezone": "+02:00" }"#).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.environment, "staging");
        assert_eq!(config.schedule_path, PathBuf::from("schedule.json"));
        assert!(matches!(config.timezone().unwrap(), ScheduleTimezone::Fixed(_)));
    }

    #[test]
    fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(matches!(
            Config::load(&missing).unwrap_err(),
            CliError::Read { .. }
        ));

        let typo = dir.path().join("typo.json");
        std::fs::write(&typo, r#"{ "enviroment": "dev" }"#).unwrap();
        assert!(matches!(
            Config::load(&typo).unwrap_err(),
            CliError::Parse { .. }
        ));
    }

    #[test]
    fn test_environment_override() {
        let config = Config::default().with_environment_override(Some("dev".into()));
        assert_eq!(config.environment, "dev");

        let config = config.with_environment_override(Some("  ".into()));
        assert_eq!(config.environment, "dev");
        assert_eq!(
            Config::default()
                .with_environment_override(None)
                .environment,
            "prod"
        );
    }

    #[test]
    fn test_invalid_timezone() {
        let config = Config {
            timezone: "Mars/Olympus".into(),
            ..Config::default()
        };
        assert!(matches!(
            config.timezone().unwrap_err(),
            ConfigError::InvalidInput(_)
        ));
    }
}
