//! portico.toml configuration parsing and serialization

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use portico_core::error::PorticoError;
use portico_http::ClientConfig;
use portico_runtime::WaitOptions;
use crate::ConfigResult;

/// Top-level tables accepted in portico.toml
const KNOWN_TABLES: [&str; 3] = ["gate", "http", "clients"];

/// Complete portico.toml configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PorticoToml {
    /// Bounds for waiting on shared services
    pub gate: GateSection,

    /// Default HTTP client settings
    pub http: ClientConfig,

    /// Named client presets
    pub clients: BTreeMap<String, ClientConfig>,
}

/// Readiness wait bounds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateSection {
    pub max_wait_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for GateSection {
    fn default() -> Self {
        let defaults = WaitOptions::default();
        Self {
            max_wait_ms: defaults.max_wait.as_millis() as u64,
            poll_interval_ms: defaults.poll_interval.as_millis() as u64,
        }
    }
}

impl GateSection {
    pub fn wait_options(&self) -> WaitOptions {
        WaitOptions::new(
            Duration::from_millis(self.max_wait_ms),
            Duration::from_millis(self.poll_interval_ms),
        )
    }
}

impl PorticoToml {
    /// Preset for a named client, if configured
    pub fn client(&self, name: &str) -> Option<&ClientConfig> {
        self.clients.get(name)
    }
}

/// Parse TOML string to PorticoToml configuration
pub fn parse_portico_toml(content: &str) -> ConfigResult<PorticoToml> {
    // First try with toml_edit for better error reporting
    let document = content
        .parse::<toml_edit::DocumentMut>()
        .map_err(|e| PorticoError::TomlParse {
            message: format!("TOML syntax error: {}", e),
        })?;

    if let Some((key, _)) = document.iter().find(|(key, _)| !KNOWN_TABLES.contains(key)) {
        return Err(PorticoError::config(
            key,
            format!("unknown section, expected one of: {}", KNOWN_TABLES.join(", ")),
        ));
    }

    // Then parse with serde for type safety
    let config: PorticoToml = toml::from_str(content).map_err(|e| PorticoError::TomlParse {
        message: format!("TOML parsing error: {}", e),
    })?;

    validate_config(&config)?;

    Ok(config)
}

/// Serialize PorticoToml to TOML string
pub fn serialize_portico_toml(config: &PorticoToml) -> ConfigResult<String> {
    toml::to_string_pretty(config).map_err(|e| PorticoError::TomlParse {
        message: format!("TOML serialization error: {}", e),
    })
}

/// Validate configuration values
pub fn validate_config(config: &PorticoToml) -> ConfigResult<()> {
    if config.gate.max_wait_ms == 0 {
        return Err(PorticoError::config("gate.max_wait_ms", "must be greater than zero"));
    }
    if config.gate.poll_interval_ms == 0 {
        return Err(PorticoError::config("gate.poll_interval_ms", "must be greater than zero"));
    }

    config.http.validate().map_err(|e| scope_error("http", e))?;

    for (name, client) in &config.clients {
        if !is_valid_client_name(name) {
            return Err(PorticoError::config(
                format!("clients.{}", name),
                "client names may only contain letters, digits, hyphens and underscores",
            ));
        }
        client
            .validate()
            .map_err(|e| scope_error(&format!("clients.{}", name), e))?;
    }

    Ok(())
}

/// Load and parse portico.toml from file path
pub async fn load_from_file(path: &camino::Utf8Path) -> ConfigResult<PorticoToml> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| PorticoError::io(format!("Failed to read {}", path), e))?;

    parse_portico_toml(&content).map_err(|e| match e {
        PorticoError::TomlParse { message } => PorticoError::TomlParse {
            message: format!("In file {}: {}", path, message),
        },
        PorticoError::ConfigValidation { field, reason } => PorticoError::ConfigValidation {
            field,
            reason: format!("{} (in {})", reason, path),
        },
        other => other,
    })
}

/// Prefix a validation error's field with the table it came from
fn scope_error(table: &str, error: PorticoError) -> PorticoError {
    match error {
        PorticoError::ConfigValidation { field, reason } => PorticoError::ConfigValidation {
            field: format!("{}.{}", table, field),
            reason,
        },
        other => other,
    }
}

fn is_valid_client_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
}
