//! Access control configuration.

use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::context::Mode;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "WARDEN";

/// Access control configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccessConfig {
    /// Enforce authorization. When off, the gate lets every call through.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Mode applied to principals without an explicit one, i.e. stored users
    /// resolved through `AuthorizationGate::context_for`.
    #[serde(default)]
    pub default_mode: Mode,

    /// Decisions kept in the in-memory audit history.
    #[serde(default = "default_audit_capacity")]
    pub audit_capacity: usize,

    /// Telemetry configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Telemetry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// Log level (an `EnvFilter` directive).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format (json, pretty).
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_audit_capacity() -> usize {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl AccessConfig {
    /// Loads `.env`, `config/default`, `config/local`, then `WARDEN__*`
    /// environment variables, later sources overriding earlier ones.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::load_from(Path::new("config"), ENV_PREFIX)
    }

    /// Loads from `dir/default`, `dir/local` and `prefix`ed environment
    /// variables.
    pub fn load_from(dir: &Path, prefix: &str) -> Result<Self> {
        let config = Config::builder()
            .set_default("enabled", true)?
            .set_default("default_mode", "white")?
            .add_source(File::with_name(&dir.join("default").to_string_lossy()).required(false))
            .add_source(File::with_name(&dir.join("local").to_string_lossy()).required(false))
            .add_source(Environment::with_prefix(prefix).separator("__").try_parsing(true))
            .build()?;

        let access_config: AccessConfig = config.try_deserialize()?;
        access_config.validate()?;

        Ok(access_config)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.audit_capacity == 0 {
            anyhow::bail!("audit_capacity must be positive");
        }

        if !matches!(self.telemetry.log_format.as_str(), "json" | "pretty") {
            anyhow::bail!("Unknown log format: {}", self.telemetry.log_format);
        }

        if !self.enabled {
            tracing::warn!("Authorization enforcement is disabled");
        }

        Ok(())
    }
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_mode: Mode::default(),
            audit_capacity: default_audit_capacity(),
            telemetry: TelemetryConfig::default(),
        }
    }
}
