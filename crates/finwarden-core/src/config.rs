//! Privacy and audit configuration
//!
//! Config is loaded with a two-layer resolution:
//! 1. Check for override in data dir (~/.local/share/finwarden/config/privacy.toml)
//! 2. Fall back to embedded defaults (compiled into binary)
//!
//! `FINWARDEN_PRIVACY_MODE` then overrides `privacy.mode` from either layer.
//!
//! The privacy mode itself lives in [`PrivacySettings`], a cheap cloneable
//! handle that can be changed at runtime. Callers read it once per top-level
//! call and pass the value down.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::models::PrivacyMode;

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/privacy.toml");

/// Environment variable overriding the configured privacy mode
pub const PRIVACY_MODE_ENV: &str = "FINWARDEN_PRIVACY_MODE";

/// Default audit retention window
pub const DEFAULT_RETENTION_DAYS: u32 = 90;

/// How the privacy filter treats results from tools with no declared kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnclassifiedPolicy {
    /// Log a warning and return the result unchanged
    #[default]
    Passthrough,
    /// Refuse to return the result below `full` mode
    Reject,
}

impl std::str::FromStr for UnclassifiedPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "passthrough" => Ok(Self::Passthrough),
            "reject" => Ok(Self::Reject),
            _ => Err(format!("Unknown unclassified policy: {}", s)),
        }
    }
}

/// Privacy section
#[derive(Debug, Clone, Default)]
pub struct PrivacyConfig {
    pub mode: PrivacyMode,
    pub unclassified_results: UnclassifiedPolicy,
}

/// Audit store section
#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// Absolute path to the audit database
    pub database_path: PathBuf,
    pub retention_days: u32,
    /// Encrypt the store with a key derived from `FINWARDEN_DB_KEY`
    pub encrypt: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            database_path: data_dir().join("audit.db"),
            retention_days: DEFAULT_RETENTION_DAYS,
            encrypt: true,
        }
    }
}

/// Full configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub privacy: PrivacyConfig,
    pub audit: AuditConfig,
}

impl Config {
    /// Load from the default override location (or embedded defaults),
    /// then apply the environment override
    pub fn load() -> Result<Self> {
        let config = load_config(None)?;
        Ok(apply_env_override(
            config,
            std::env::var(PRIVACY_MODE_ENV).ok().as_deref(),
        ))
    }

    /// Load from an explicit path, then apply the environment override
    pub fn from_path(path: &Path) -> Result<Self> {
        let config = load_config(Some(path))?;
        Ok(apply_env_override(
            config,
            std::env::var(PRIVACY_MODE_ENV).ok().as_deref(),
        ))
    }

    /// Build the runtime privacy handle from this config
    pub fn privacy_settings(&self) -> PrivacySettings {
        PrivacySettings::new(self.privacy.mode)
    }
}

/// Process-wide privacy mode, mutable at runtime
///
/// Clones share the same underlying value.
#[derive(Debug, Clone)]
pub struct PrivacySettings {
    mode: Arc<AtomicU8>,
}

impl PrivacySettings {
    pub fn new(mode: PrivacyMode) -> Self {
        Self {
            mode: Arc::new(AtomicU8::new(mode.rank())),
        }
    }

    /// The single accessor for the current mode
    pub fn current(&self) -> PrivacyMode {
        PrivacyMode::from_rank(self.mode.load(Ordering::SeqCst))
    }

    /// Change the mode; calls already in flight keep the mode they read
    pub fn set(&self, mode: PrivacyMode) {
        let previous = PrivacyMode::from_rank(self.mode.swap(mode.rank(), Ordering::SeqCst));
        if previous != mode {
            info!("Privacy mode changed: {} -> {}", previous, mode);
        }
    }
}

impl Default for PrivacySettings {
    fn default() -> Self {
        Self::new(PrivacyMode::default())
    }
}

/// finwarden data directory (~/.local/share/finwarden on Linux)
pub fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("finwarden"))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Default config override path
pub fn default_config_path() -> PathBuf {
    data_dir().join("config").join("privacy.toml")
}

/// Load configuration (override first, then default)
fn load_config(override_path: Option<&Path>) -> Result<Config> {
    let path = override_path
        .map(Path::to_path_buf)
        .unwrap_or_else(default_config_path);

    let content = if path.exists() {
        fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?
    } else {
        DEFAULT_CONFIG.to_string()
    };

    parse_config(&content)
}

/// Apply the privacy mode environment override, ignoring unparseable values
fn apply_env_override(mut config: Config, value: Option<&str>) -> Config {
    if let Some(raw) = value {
        match raw.parse::<PrivacyMode>() {
            Ok(mode) => config.privacy.mode = mode,
            Err(e) => warn!("Ignoring {}: {}", PRIVACY_MODE_ENV, e),
        }
    }
    config
}

/// Raw config structure for TOML parsing
#[derive(Debug, Deserialize)]
struct RawConfig {
    privacy: Option<RawPrivacy>,
    audit: Option<RawAudit>,
}

#[derive(Debug, Deserialize)]
struct RawPrivacy {
    mode: Option<String>,
    unclassified_results: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawAudit {
    database_path: Option<String>,
    retention_days: Option<u32>,
    encrypt: Option<bool>,
}

/// Parse config from TOML content
fn parse_config(content: &str) -> Result<Config> {
    let raw: RawConfig = toml::from_str(content)
        .map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))?;

    let mut config = Config::default();

    if let Some(privacy) = raw.privacy {
        if let Some(mode) = privacy.mode {
            config.privacy.mode = mode.parse().map_err(Error::Config)?;
        }
        if let Some(policy) = privacy.unclassified_results {
            config.privacy.unclassified_results = policy.parse().map_err(Error::Config)?;
        }
    }

    if let Some(audit) = raw.audit {
        if let Some(path) = audit.database_path {
            let path = PathBuf::from(path);
            config.audit.database_path = if path.is_absolute() {
                path
            } else {
                data_dir().join(path)
            };
        }
        if let Some(days) = audit.retention_days {
            config.audit.retention_days = days;
        }
        if let Some(encrypt) = audit.encrypt {
            config.audit.encrypt = encrypt;
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default_config() {
        let config = parse_config(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.privacy.mode, PrivacyMode::Anonymized);
        assert_eq!(
            config.privacy.unclassified_results,
            UnclassifiedPolicy::Passthrough
        );
        assert_eq!(config.audit.retention_days, 90);
        assert!(config.audit.database_path.ends_with("audit.db"));
    }

    #[test]
    fn test_parse_partial_config() {
        let config = parse_config(
            r#"
            [privacy]
            mode = "strict"
            unclassified_results = "reject"
            "#,
        )
        .unwrap();
        assert_eq!(config.privacy.mode, PrivacyMode::Strict);
        assert_eq!(config.privacy.unclassified_results, UnclassifiedPolicy::Reject);
        assert_eq!(config.audit.retention_days, DEFAULT_RETENTION_DAYS);
    }

    #[test]
    fn test_parse_absolute_audit_path() {
        let config = parse_config(
            r#"
            [audit]
            database_path = "/var/lib/finwarden/audit.db"
            encrypt = false
            "#,
        )
        .unwrap();
        assert_eq!(
            config.audit.database_path,
            PathBuf::from("/var/lib/finwarden/audit.db")
        );
        assert!(!config.audit.encrypt);
    }

    #[test]
    fn test_parse_invalid_mode() {
        let err = parse_config("[privacy]\nmode = \"open\"").unwrap_err();
        assert!(err.to_string().contains("Unknown privacy mode"));
    }

    #[test]
    fn test_env_override() {
        let config = apply_env_override(Config::default(), Some("full"));
        assert_eq!(config.privacy.mode, PrivacyMode::Full);

        // Garbage is ignored rather than widening disclosure
        let config = apply_env_override(Config::default(), Some("everything"));
        assert_eq!(config.privacy.mode, PrivacyMode::Anonymized);
    }

    #[test]
    fn test_load_from_missing_path_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(Some(&dir.path().join("missing.toml"))).unwrap();
        assert_eq!(config.privacy.mode, PrivacyMode::Anonymized);
    }

    #[test]
    fn test_load_from_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("privacy.toml");
        std::fs::write(&path, "[privacy]\nmode = \"standard\"\n").unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.privacy.mode, PrivacyMode::Standard);
    }

    #[test]
    fn test_settings_shared_between_clones() {
        let settings = PrivacySettings::default();
        let other = settings.clone();
        assert_eq!(settings.current(), PrivacyMode::Anonymized);

        other.set(PrivacyMode::Strict);
        assert_eq!(settings.current(), PrivacyMode::Strict);
    }
}
