//! AutoLog configuration.
//!
//! The resolved configuration consumed by the interceptor. It can be built in
//! code, deserialized from TOML, or loaded from `AUTOLOG_*` environment
//! variables. Invalid environment values fall back to defaults without
//! crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `AUTOLOG_ENABLED` | true | Master switch |
//! | `AUTOLOG_LOG_ARGS` | true | Include arguments in entry messages |
//! | `AUTOLOG_LOG_RETURN_VALUE` | false | Include return values in exit messages |
//! | `AUTOLOG_LOG_EXCEPTION_STACKTRACE` | true | Attach error detail to error records |
//! | `AUTOLOG_INCLUDE_PACKAGES` | (empty) | Comma-separated namespace prefixes to log |
//! | `AUTOLOG_EXCLUDE_PACKAGES` | (empty) | Comma-separated namespace prefixes to skip |
//! | `AUTOLOG_LEVEL_ENTRY` | info | Entry message level |
//! | `AUTOLOG_LEVEL_EXIT` | debug | Exit message level |
//! | `AUTOLOG_LEVEL_ERROR` | error | Error message level |
//! | `AUTOLOG_LEVEL_STEP` | debug | Step message level |
//! | `AUTOLOG_TEMPLATE_ENTRY` | `[ENTER] {{method}} args={{args}}` | Entry template |
//! | `AUTOLOG_TEMPLATE_EXIT` | `[EXIT] {{method}} returned={{return}} duration={{duration}}ms` | Exit template |
//! | `AUTOLOG_TEMPLATE_ERROR` | `[ERROR] {{method}} exception={{exception}}` | Error template |
//! | `AUTOLOG_TEMPLATE_STEP` | `[STEP] {{method}} - {{description}} duration={{duration}}ms` | Step exit template |
//! | `AUTOLOG_TEMPLATE_STEP_ENTRY` | `[STEP] {{method}} - {{description}} (args=[{{args}}])` | Step entry template |
//! | `AUTOLOG_TEMPLATE_STEP_ERROR` | `[STEP ERROR] {{method}} - {{description}}: {{exception}}` | Step error template |
//! | `AUTOLOG_STRUCTURED_LOGGING` | false | Attach raw field maps to records |
//! | `AUTOLOG_METRICS_ENABLED` | false | Record duration samples |

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Severity for one message phase. `Off` silences the phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace,
    Debug,
    Info,
    #[serde(alias = "warning")]
    Warn,
    #[serde(alias = "fatal")]
    Error,
    Off,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Off => "OFF",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" | "fatal" => Ok(Self::Error),
            "off" | "none" => Ok(Self::Off),
            other => Err(ConfigError::InvalidValue {
                key: "level".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Level per message phase. Step errors use `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseLevels {
    pub entry: Level,
    pub exit: Level,
    pub error: Level,
    pub step: Level,
}

impl Default for PhaseLevels {
    fn default() -> Self {
        Self {
            entry: Level::Info,
            exit: Level::Debug,
            error: Level::Error,
            step: Level::Debug,
        }
    }
}

/// Message template per phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Templates {
    pub entry: String,
    pub exit: String,
    pub error: String,
    pub step: String,
    pub step_entry: String,
    pub step_error: String,
}

impl Default for Templates {
    fn default() -> Self {
        Self {
            entry: "[ENTER] {{method}} args={{args}}".to_string(),
            exit: "[EXIT] {{method}} returned={{return}} duration={{duration}}ms".to_string(),
            error: "[ERROR] {{method}} exception={{exception}}".to_string(),
            step: "[STEP] {{method}} - {{description}} duration={{duration}}ms".to_string(),
            step_entry: "[STEP] {{method}} - {{description}} (args=[{{args}}])".to_string(),
            step_error: "[STEP ERROR] {{method}} - {{description}}: {{exception}}".to_string(),
        }
    }
}

/// Complete configuration surface of the interceptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoLogConfig {
    pub enabled: bool,
    pub log_args: bool,
    pub log_return_value: bool,
    pub log_exception_stacktrace: bool,
    pub include_packages: Vec<String>,
    pub exclude_packages: Vec<String>,
    pub structured_logging: bool,
    pub metrics_enabled: bool,
    pub level: PhaseLevels,
    pub template: Templates,
}

impl Default for AutoLogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_args: true,
            log_return_value: false,
            log_exception_stacktrace: true,
            include_packages: Vec::new(),
            exclude_packages: Vec::new(),
            level: PhaseLevels::default(),
            template: Templates::default(),
            structured_logging: false,
            metrics_enabled: false,
        }
    }
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

impl AutoLogConfig {
    /// Parse a TOML document; missing fields keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Defaults overridden by `AUTOLOG_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply any `AUTOLOG_*` variables that are set and valid.
    pub fn with_env_overrides(mut self) -> Self {
        self.enabled = parse_bool("AUTOLOG_ENABLED", self.enabled);
        self.log_args = parse_bool("AUTOLOG_LOG_ARGS", self.log_args);
        self.log_return_value = parse_bool("AUTOLOG_LOG_RETURN_VALUE", self.log_return_value);
        self.log_exception_stacktrace =
            parse_bool("AUTOLOG_LOG_EXCEPTION_STACKTRACE", self.log_exception_stacktrace);
        if let Some(list) = parse_list("AUTOLOG_INCLUDE_PACKAGES") {
            self.include_packages = list;
        }
        if let Some(list) = parse_list("AUTOLOG_EXCLUDE_PACKAGES") {
            self.exclude_packages = list;
        }

        self.level.entry = parse_level("AUTOLOG_LEVEL_ENTRY", self.level.entry);
        self.level.exit = parse_level("AUTOLOG_LEVEL_EXIT", self.level.exit);
        self.level.error = parse_level("AUTOLOG_LEVEL_ERROR", self.level.error);
        self.level.step = parse_level("AUTOLOG_LEVEL_STEP", self.level.step);

        let t = &mut self.template;
        for (key, slot) in [
            ("AUTOLOG_TEMPLATE_ENTRY", &mut t.entry),
            ("AUTOLOG_TEMPLATE_EXIT", &mut t.exit),
            ("AUTOLOG_TEMPLATE_ERROR", &mut t.error),
            ("AUTOLOG_TEMPLATE_STEP", &mut t.step),
            ("AUTOLOG_TEMPLATE_STEP_ENTRY", &mut t.step_entry),
            ("AUTOLOG_TEMPLATE_STEP_ERROR", &mut t.step_error),
        ] {
            if let Ok(value) = std::env::var(key) {
                *slot = value;
            }
        }

        self.structured_logging = parse_bool("AUTOLOG_STRUCTURED_LOGGING", self.structured_logging);
        self.metrics_enabled = parse_bool("AUTOLOG_METRICS_ENABLED", self.metrics_enabled);
        self
    }

    /// Render as TOML, e.g. for a `config show` command.
    pub fn to_toml_string(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}

/// Parse a boolean env var, returning `default` on missing or invalid.
fn parse_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => match val.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => true,
            "false" | "0" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

/// Parse a level env var, returning `default` on missing or invalid.
fn parse_level(key: &str, default: Level) -> Level {
    match std::env::var(key) {
        Ok(val) => val.parse().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a comma-separated list; blank entries are dropped.
fn parse_list(key: &str) -> Option<Vec<String>> {
    std::env::var(key).ok().map(|val| {
        val.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Serialize env-mutating tests to avoid cross-test pollution.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const ENV_KEYS: &[&str] = &[
        "AUTOLOG_ENABLED",
        "AUTOLOG_LOG_ARGS",
        "AUTOLOG_LOG_RETURN_VALUE",
        "AUTOLOG_LOG_EXCEPTION_STACKTRACE",
        "AUTOLOG_INCLUDE_PACKAGES",
        "AUTOLOG_EXCLUDE_PACKAGES",
        "AUTOLOG_LEVEL_ENTRY",
        "AUTOLOG_LEVEL_EXIT",
        "AUTOLOG_LEVEL_ERROR",
        "AUTOLOG_LEVEL_STEP",
        "AUTOLOG_TEMPLATE_ENTRY",
        "AUTOLOG_TEMPLATE_EXIT",
        "AUTOLOG_TEMPLATE_ERROR",
        "AUTOLOG_TEMPLATE_STEP",
        "AUTOLOG_TEMPLATE_STEP_ENTRY",
        "AUTOLOG_TEMPLATE_STEP_ERROR",
        "AUTOLOG_STRUCTURED_LOGGING",
        "AUTOLOG_METRICS_ENABLED",
    ];

    fn clear_env_vars() {
        for k in ENV_KEYS {
            std::env::remove_var(k);
        }
    }

    #[test]
    fn test_defaults_match_documented_values() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let cfg = AutoLogConfig::from_env();
        assert_eq!(cfg, AutoLogConfig::default());
        assert!(cfg.enabled);
        assert!(cfg.log_args);
        assert!(!cfg.log_return_value);
        assert!(cfg.log_exception_stacktrace);
        assert_eq!(cfg.level.entry, Level::Info);
        assert_eq!(cfg.level.exit, Level::Debug);
        assert_eq!(cfg.level.error, Level::Error);
        assert_eq!(cfg.level.step, Level::Debug);
        assert!(!cfg.structured_logging);
        assert!(!cfg.metrics_enabled);
    }

    #[test]
    fn test_env_vars_override_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("AUTOLOG_LOG_RETURN_VALUE", "yes");
        std::env::set_var("AUTOLOG_EXCLUDE_PACKAGES", "app::internal, ,app::gen");
        std::env::set_var("AUTOLOG_LEVEL_ENTRY", "WARN");
        std::env::set_var("AUTOLOG_TEMPLATE_ENTRY", "> {{method}}");
        std::env::set_var("AUTOLOG_METRICS_ENABLED", "1");
        let cfg = AutoLogConfig::from_env();
        assert!(cfg.log_return_value);
        assert_eq!(cfg.exclude_packages, vec!["app::internal", "app::gen"]);
        assert_eq!(cfg.level.entry, Level::Warn);
        assert_eq!(cfg.template.entry, "> {{method}}");
        assert!(cfg.metrics_enabled);
        clear_env_vars();
    }

    #[test]
    fn test_invalid_env_falls_back_to_default() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("AUTOLOG_ENABLED", "maybe");
        std::env::set_var("AUTOLOG_LEVEL_ERROR", "loud");
        let cfg = AutoLogConfig::from_env();
        assert!(cfg.enabled);
        assert_eq!(cfg.level.error, Level::Error);
        clear_env_vars();
    }

    #[test]
    fn test_level_aliases() {
        assert_eq!("fatal".parse::<Level>().unwrap(), Level::Error);
        assert_eq!("Warning".parse::<Level>().unwrap(), Level::Warn);
        assert!("verbose".parse::<Level>().is_err());
    }
}
