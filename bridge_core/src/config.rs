//! # Server Configuration
//!
//! Configuration is layered: built-in defaults, then an optional TOML file,
//! then environment variables, then command-line flags (applied by the
//! binary). Every field has a default, so an empty file is a valid
//! configuration.
//!
//! ```toml
//! server_name = "bridge-mcp"
//! log_level = "info"
//! model_name = "Girder Bridge"
//!
//! [units]
//! length = "meter"
//! force = "newton"
//!
//! [engine]
//! kind = "tcp"
//! address = "127.0.0.1:7878"
//! timeout_ms = 30000
//! connect_timeout_ms = 5000
//!
//! [validation]
//! node_tolerance = 0.001
//! merged_nodes_supported = false
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backend::{BackendAdapter, EngineBackend, OfflineEngine, TcpEngine};
use crate::errors::{BridgeError, BridgeResult};
use crate::units::UnitSystem;
use crate::validation::{ValidationSettings, DEFAULT_NODE_TOLERANCE};

/// Environment variable overriding `engine.address` (and selecting the TCP engine)
pub const ENGINE_ADDR_ENV: &str = "BRIDGE_MCP_ENGINE_ADDR";

/// Environment variable overriding `log_level`
pub const LOG_LEVEL_ENV: &str = "BRIDGE_MCP_LOG_LEVEL";

/// Which engine integration to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    #[default]
    Offline,
    Tcp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub kind: EngineKind,

    /// `host:port` of the engine bridge
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    /// Bound on every engine call
    pub timeout_ms: u64,

    pub connect_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            kind: EngineKind::Offline,
            address: None,
            timeout_ms: 30_000,
            connect_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub node_tolerance: f64,
    pub merged_nodes_supported: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        ValidationConfig {
            node_tolerance: DEFAULT_NODE_TOLERANCE,
            merged_nodes_supported: false,
        }
    }
}

/// Complete server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Name reported to the client on `initialize`
    pub server_name: String,

    /// Log filter directive (`info`, `debug`, `bridge_core=trace`, ...)
    pub log_level: String,

    /// Name of the model opened at startup
    pub model_name: String,

    pub units: UnitSystem,

    pub engine: EngineConfig,

    pub validation: ValidationConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            server_name: "bridge-mcp".to_string(),
            log_level: "info".to_string(),
            model_name: "Untitled Bridge".to_string(),
            units: UnitSystem::default(),
            engine: EngineConfig::default(),
            validation: ValidationConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// Parse a TOML document
    pub fn from_toml_str(text: &str) -> BridgeResult<Self> {
        toml::from_str(text).map_err(|e| BridgeError::config("toml", e.to_string()))
    }

    /// Load a TOML file
    pub fn load(path: &Path) -> BridgeResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| BridgeError::config(path.display().to_string(), format!("cannot read file: {e}")))?;
        BridgeConfig::from_toml_str(&text)
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from a variable lookup
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let set = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(address) = set(ENGINE_ADDR_ENV) {
            self.engine.kind = EngineKind::Tcp;
            self.engine.address = Some(address.trim().to_string());
        }
        if let Some(level) = set(LOG_LEVEL_ENV) {
            self.log_level = level.trim().to_string();
        }
    }

    /// Check value ranges and combinations
    pub fn validate(&self) -> BridgeResult<()> {
        if self.server_name.trim().is_empty() {
            return Err(BridgeError::config("server_name", "must not be empty"));
        }
        if self.log_level.trim().is_empty() {
            return Err(BridgeError::config("log_level", "must not be empty"));
        }
        if self.engine.timeout_ms == 0 {
            return Err(BridgeError::config("engine.timeout_ms", "must be positive"));
        }
        if self.engine.connect_timeout_ms == 0 {
            return Err(BridgeError::config("engine.connect_timeout_ms", "must be positive"));
        }
        if self.engine.kind == EngineKind::Tcp && self.engine.address.as_deref().map_or(true, |a| a.trim().is_empty()) {
            return Err(BridgeError::config(
                "engine.address",
                format!("required for the tcp engine (or set {ENGINE_ADDR_ENV})"),
            ));
        }
        let tolerance = self.validation.node_tolerance;
        if !tolerance.is_finite() || tolerance <= 0.0 {
            return Err(BridgeError::config(
                "validation.node_tolerance",
                format!("must be a positive length, got {tolerance}"),
            ));
        }
        Ok(())
    }

    pub fn engine_timeout(&self) -> Duration {
        Duration::from_millis(self.engine.timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.engine.connect_timeout_ms)
    }

    pub fn validation_settings(&self) -> ValidationSettings {
        ValidationSettings {
            node_tolerance: self.validation.node_tolerance,
            merged_nodes_supported: self.validation.merged_nodes_supported,
        }
    }

    /// Build the configured engine behind a bounded adapter
    pub fn build_adapter(&self) -> BridgeResult<BackendAdapter> {
        let engine: Arc<dyn EngineBackend> = match self.engine.kind {
            EngineKind::Offline => Arc::new(OfflineEngine),
            EngineKind::Tcp => {
                let address = self
                    .engine
                    .address
                    .clone()
                    .ok_or_else(|| BridgeError::config("engine.address", "required for the tcp engine"))?;
                Arc::new(TcpEngine::new(address, self.connect_timeout()))
            }
        };
        Ok(BackendAdapter::new(engine, self.engine_timeout()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::LengthUnit;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::from_toml_str("").unwrap();
        assert_eq!(config, BridgeConfig::default());
        assert_eq!(config.server_name, "bridge-mcp");
        assert_eq!(config.engine.kind, EngineKind::Offline);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file() {
        let config = BridgeConfig::from_toml_str(
            r#"
            model_name = "Girder"

            [units]
            length = "millimeter"

            [engine]
            kind = "tcp"
            address = "10.0.0.5:7878"
            "#,
        )
        .unwrap();
        assert_eq!(config.model_name, "Girder");
        assert_eq!(config.units.length, LengthUnit::Millimeter);
        assert_eq!(config.engine.timeout_ms, 30_000);
        assert!(config.validate().is_ok());
        assert_eq!(config.build_adapter().unwrap().engine_name(), "tcp");
    }

    #[test]
    fn test_invalid_values() {
        let err = BridgeConfig::from_toml_str("[engine]\ntimeout_ms = \"soon\"").unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_ERROR");

        let mut config = BridgeConfig::default();
        config.engine.kind = EngineKind::Tcp;
        assert!(config.validate().is_err());

        let mut config = BridgeConfig::default();
        config.validation.node_tolerance = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = BridgeConfig::default();
        config.apply_overrides(|key| match key {
            ENGINE_ADDR_ENV => Some("127.0.0.1:9000".to_string()),
            LOG_LEVEL_ENV => Some("  ".to_string()),
            _ => None,
        });
        assert_eq!(config.engine.kind, EngineKind::Tcp);
        assert_eq!(config.engine.address.as_deref(), Some("127.0.0.1:9000"));
        assert_eq!(config.log_level, "info");
    }
}
