//! Konfiguration
//!
//! Werte kommen aus Umgebungsvariablen, sonst gelten die Standardwerte.

use crate::session::{DEFAULT_EXTENSION_GATE_SECS, DEFAULT_EXTENSION_SECS, DEFAULT_SWITCH_AT_SECS};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },

    #[error("Role switch ({switch_at}s) must happen before the extension gate ({gate_at}s)")]
    SwitchAfterGate { switch_at: u64, gate_at: u64 },

    #[error("Tick interval must not be zero")]
    ZeroTick,

    #[error("Could not determine app data directory")]
    NoDataDirectory,
}

// ============================================================================
// SESSION CONFIG
// ============================================================================

/// Zeitkonstanten einer Call-Session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Rollenwechsel nach dieser Sekunde
    pub switch_at_secs: u64,
    /// Ab hier darf verlängert werden
    pub extension_gate_secs: u64,
    /// Dauer einer Verlängerung
    pub extension_secs: u64,
    pub max_extensions: u32,
    pub tick_interval: Duration,
    pub prompt_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            switch_at_secs: DEFAULT_SWITCH_AT_SECS,
            extension_gate_secs: DEFAULT_EXTENSION_GATE_SECS,
            extension_secs: DEFAULT_EXTENSION_SECS,
            max_extensions: 1,
            tick_interval: Duration::from_secs(1),
            prompt_timeout: Duration::from_secs(15),
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.switch_at_secs >= self.extension_gate_secs {
            return Err(ConfigError::SwitchAfterGate {
                switch_at: self.switch_at_secs,
                gate_at: self.extension_gate_secs,
            });
        }
        if self.tick_interval.is_zero() {
            return Err(ConfigError::ZeroTick);
        }
        Ok(())
    }
}

// ============================================================================
// GENERATOR CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GEMINI_URL.to_string(),
            model: DEFAULT_GEMINI_MODEL.to_string(),
            api_key: None,
            timeout: Duration::from_secs(15),
        }
    }
}

// ============================================================================
// APP CONFIG
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppConfig {
    pub session: SessionConfig,
    pub generator: GeneratorConfig,
    /// `None` = Standardpfad im App-Datenverzeichnis
    pub database_path: Option<PathBuf>,
}

impl AppConfig {
    /// Liest die Konfiguration aus der Prozessumgebung
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Liest die Konfiguration über eine beliebige Lookup-Funktion
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        config.generator.api_key = lookup("TANDEM_GEMINI_API_KEY").or_else(|| lookup("GEMINI_API_KEY"));

        if let Some(model) = lookup("TANDEM_GEMINI_MODEL") {
            config.generator.model = model;
        }
        if let Some(url) = lookup("TANDEM_GEMINI_URL") {
            config.generator.base_url = url;
        }
        if let Some(raw) = lookup("TANDEM_PROMPT_TIMEOUT_SECS") {
            let secs = raw.trim().parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                key: "TANDEM_PROMPT_TIMEOUT_SECS",
                value: raw.clone(),
            })?;
            config.generator.timeout = Duration::from_secs(secs);
            config.session.prompt_timeout = Duration::from_secs(secs);
        }
        config.database_path = lookup("TANDEM_DB_PATH").map(PathBuf::from);

        config.session.validate()?;
        Ok(config)
    }

    /// Pfad zur Call-Log-Datenbank
    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(path) = &self.database_path {
            return Ok(path.clone());
        }

        let proj_dirs = directories::ProjectDirs::from("com", "tandem", "tandem")
            .ok_or(ConfigError::NoDataDirectory)?;

        let mut path = proj_dirs.data_dir().to_path_buf();
        path.push("calls.db");
        Ok(path)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.session.switch_at_secs, 900);
        assert_eq!(config.session.extension_gate_secs, 1800);
        assert_eq!(config.session.extension_secs, 900);
        assert_eq!(config.generator.model, DEFAULT_GEMINI_MODEL);
        assert!(config.generator.api_key.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            ("GEMINI_API_KEY", "fallback"),
            ("TANDEM_GEMINI_MODEL", "gemini-2.0-flash"),
            ("TANDEM_PROMPT_TIMEOUT_SECS", "4"),
            ("TANDEM_DB_PATH", "/tmp/calls.db"),
        ]))
        .unwrap();

        assert_eq!(config.generator.api_key.as_deref(), Some("fallback"));
        assert_eq!(config.generator.model, "gemini-2.0-flash");
        assert_eq!(config.session.prompt_timeout, Duration::from_secs(4));
        assert_eq!(config.database_path().unwrap(), PathBuf::from("/tmp/calls.db"));
    }

    #[test]
    fn test_invalid_timeout() {
        let err = AppConfig::from_lookup(lookup(&[("TANDEM_PROMPT_TIMEOUT_SECS", "soon")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_validate_session_config() {
        let config = SessionConfig {
            switch_at_secs: 1800,
            ..SessionConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::SwitchAfterGate { .. })));

        let config = SessionConfig {
            tick_interval: Duration::ZERO,
            ..SessionConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroTick));
    }
}
