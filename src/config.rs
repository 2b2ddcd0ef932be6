//! Configuration schema (`spec.md` §6).
//!
//! The engine never reads this file itself — the host program owns
//! loading/saving it and passes the relevant sub-values (kubeconfig path,
//! TTL, namespace) into the engine's constructors. The schema lives here
//! because it is part of this crate's published external interface and the
//! `setup`/`web` CLI commands need a concrete Rust shape for it.

use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::StargazerError;

const CONFIG_SCHEMA_VERSION: &str = "1.0";
const FILE_MODE: u32 = 0o600;
const DIR_MODE: u32 = 0o755;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KubeconfigSettings {
    pub path: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageSettings {
    pub path: String,
    pub retain_days: i64,
    pub max_scan_results: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiSettings {
    pub port: u16,
    pub enable_cors: bool,
    pub rate_limit_rps: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmProviderSettings {
    pub enabled: bool,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub encrypted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LlmSettings {
    pub default_provider: Option<String>,
    pub providers: BTreeMap<String, LlmProviderSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub version: String,
    pub kubeconfig: KubeconfigSettings,
    pub storage: StorageSettings,
    pub api: ApiSettings,
    pub llm: LlmSettings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Config {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            version: CONFIG_SCHEMA_VERSION.to_string(),
            kubeconfig: KubeconfigSettings {
                path: None,
                context: None,
            },
            storage: StorageSettings {
                path: "~/.stargazer/scans".to_string(),
                retain_days: 30,
                max_scan_results: 100,
            },
            api: ApiSettings {
                port: 8080,
                enable_cors: true,
                rate_limit_rps: 10,
            },
            llm: LlmSettings::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Port 1..65535, non-negative retention and result cap, per `spec.md`
    /// §6/§8 ("Port outside 1..65535 rejects at configuration validation").
    pub fn validate(&self) -> Result<(), StargazerError> {
        if self.api.port == 0 {
            return Err(StargazerError::ValidationError(
                "api.port must be in 1..65535".to_string(),
            ));
        }
        if self.storage.retain_days < 0 {
            return Err(StargazerError::ValidationError(
                "storage.retain_days must be >= 0".to_string(),
            ));
        }
        if self.storage.max_scan_results < 0 {
            return Err(StargazerError::ValidationError(
                "storage.max_scan_results must be >= 0".to_string(),
            ));
        }
        if self.api.rate_limit_rps < 0 {
            return Err(StargazerError::ValidationError(
                "api.rate_limit_rps must be >= 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Write as YAML with file mode `0600` inside a directory created with
    /// mode `0755`, per `spec.md` §6.
    pub fn save(&self, path: &Path) -> Result<(), StargazerError> {
        self.validate()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| io_validation_error("create config directory", e))?;
            fs::set_permissions(parent, fs::Permissions::from_mode(DIR_MODE))
                .map_err(|e| io_validation_error("set config directory permissions", e))?;
        }

        let yaml = serde_yaml::to_string(self).map_err(|e| {
            StargazerError::ValidationError(format!("failed to serialize config: {e}"))
        })?;
        fs::write(path, yaml).map_err(|e| io_validation_error("write config file", e))?;
        fs::set_permissions(path, fs::Permissions::from_mode(FILE_MODE))
            .map_err(|e| io_validation_error("set config file permissions", e))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, StargazerError> {
        let contents = fs::read_to_string(path).map_err(|e| io_validation_error("read config file", e))?;
        let config: Config = serde_yaml::from_str(&contents).map_err(|e| {
            StargazerError::ValidationError(format!("failed to parse config: {e}"))
        })?;
        config.validate()?;
        Ok(config)
    }
}

fn io_validation_error(context: &str, err: io::Error) -> StargazerError {
    StargazerError::ValidationError(format!("{context}: {err}"))
}

/// Validates a historical-scan cleanup request against `storage.retain_days`
/// semantics: `days == 0` is rejected (`spec.md` §8 boundary), since it
/// would mean "retain nothing ever written", which the host's persistence
/// layer (out of scope here, `spec.md` §1) treats as a caller mistake
/// rather than "delete everything immediately".
pub fn validate_cleanup_days(days: i64) -> Result<(), StargazerError> {
    if days == 0 {
        return Err(StargazerError::ValidationError(
            "cleanup retain_days must be > 0".to_string(),
        ));
    }
    if days < 0 {
        return Err(StargazerError::ValidationError(
            "cleanup retain_days must be >= 0".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::path::PathBuf;

    struct ScratchDir(PathBuf);

    impl ScratchDir {
        fn new(label: &str) -> Self {
            let path = std::env::temp_dir().join(format!(
                "stargazer-config-test-{label}-{}",
                std::process::id()
            ));
            let _ = fs::remove_dir_all(&path);
            Self(path)
        }
    }

    impl Drop for ScratchDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.0);
        }
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn port_zero_fails_validation() {
        let mut config = Config::new(fixed_now());
        config.api.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn negative_retain_days_fails_validation() {
        let mut config = Config::new(fixed_now());
        config.storage.retain_days = -1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn cleanup_zero_days_is_rejected() {
        assert!(validate_cleanup_days(0).is_err());
    }

    #[test]
    fn cleanup_positive_days_is_accepted() {
        assert!(validate_cleanup_days(7).is_ok());
    }

    #[test]
    fn save_then_load_round_trips_modulo_updated_at() {
        let dir = ScratchDir::new("roundtrip");
        let path = dir.0.join("config.yaml");

        let config = Config::new(fixed_now());
        config.save(&path).expect("save succeeds");

        let loaded = Config::load(&path).expect("load succeeds");
        assert_eq!(loaded.version, config.version);
        assert_eq!(loaded.kubeconfig, config.kubeconfig);
        assert_eq!(loaded.storage, config.storage);
        assert_eq!(loaded.api, config.api);
        assert_eq!(loaded.created_at, config.created_at);

        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, FILE_MODE);
    }
}
