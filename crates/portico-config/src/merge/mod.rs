//! Configuration layering, fallback logic, and environment overrides

use std::collections::HashMap;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use portico_core::error::PorticoError;
use crate::toml::{load_from_file, validate_config, PorticoToml};
use crate::{ConfigResult, CONFIG_FILE_NAME};

/// Prefix shared by every recognized environment override
const ENV_PREFIX: &str = "PORTICO_";

/// Main configuration loading interface
pub struct ConfigLoader {
    /// Current working directory
    cwd: Utf8PathBuf,
}

/// Configuration layering and merging
pub struct ConfigLayering;

/// Configuration source tracking
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    /// Global config file
    Global(Utf8PathBuf),
    /// Project portico.toml found from the working directory
    Project(Utf8PathBuf),
    /// File named on the command line
    Explicit(Utf8PathBuf),
    /// No file found; built-in defaults
    Defaults,
}

/// One overridable setting
#[derive(Debug, Clone, Copy)]
enum Setting {
    BaseUrl,
    TimeoutMs,
    Retry,
    Token,
    MaxWaitMs,
    PollIntervalMs,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new(cwd: Utf8PathBuf) -> Self {
        Self { cwd }
    }

    /// Loader rooted at the process working directory
    pub fn from_current_dir() -> ConfigResult<Self> {
        let cwd = std::env::current_dir()
            .map_err(|e| PorticoError::io("Failed to read current directory", e))?;
        let cwd = Utf8PathBuf::try_from(cwd)
            .map_err(|e| PorticoError::config("cwd", format!("Working directory is not valid UTF-8: {}", e)))?;
        Ok(Self::new(cwd))
    }

    pub fn cwd(&self) -> &Utf8Path {
        &self.cwd
    }

    /// Load the project portico.toml, if one exists here or in a parent
    pub async fn load_project_config(&self) -> ConfigResult<Option<(PorticoToml, ConfigSource)>> {
        match self.find_config_file(CONFIG_FILE_NAME) {
            Some(path) => {
                let config = load_from_file(&path).await?;
                Ok(Some((config, ConfigSource::Project(path))))
            },
            None => Ok(None),
        }
    }

    /// Find configuration file in project (walks up directory tree)
    pub fn find_config_file(&self, filename: &str) -> Option<Utf8PathBuf> {
        let mut current = Some(self.cwd.as_path());

        while let Some(dir) = current {
            let config_path = dir.join(filename);
            if config_path.exists() {
                return Some(config_path);
            }
            current = dir.parent();
        }

        None
    }

    /// Load global configuration from `~/.portico/config.toml`
    pub async fn load_global_config(&self) -> ConfigResult<Option<(PorticoToml, ConfigSource)>> {
        // Without a home directory there is simply no global layer
        let Some(home_dir) = dirs::home_dir() else {
            return Ok(None);
        };

        let global_config_path = Utf8PathBuf::try_from(home_dir)
            .map_err(|e| PorticoError::config("home_dir", format!("Invalid home directory path: {}", e)))?
            .join(".portico")
            .join("config.toml");

        if global_config_path.exists() {
            let config = load_from_file(&global_config_path).await?;
            Ok(Some((config, ConfigSource::Global(global_config_path))))
        } else {
            Ok(None)
        }
    }

    /// Resolve the effective configuration.
    ///
    /// An explicit file replaces the project lookup. Environment overrides
    /// apply on top, then `cli_overrides`.
    pub async fn load(
        &self,
        explicit: Option<&Utf8Path>,
        cli_overrides: HashMap<String, String>,
    ) -> ConfigResult<(PorticoToml, ConfigSource)> {
        let global = self.load_global_config().await?;

        let project = match explicit {
            Some(path) => Some((load_from_file(path).await?, ConfigSource::Explicit(path.to_path_buf()))),
            None => self.load_project_config().await?,
        };

        let source = match (&project, &global) {
            (Some((_, source)), _) | (None, Some((_, source))) => source.clone(),
            (None, None) => ConfigSource::Defaults,
        };

        let merged = ConfigLayering::merge_configs(
            global.map(|(config, _)| config),
            project.map(|(config, _)| config),
            ConfigLayering::collect_env_overrides(),
            cli_overrides,
        )?;

        Ok((merged, source))
    }
}

impl ConfigLayering {
    /// Merge multiple configuration layers
    pub fn merge_configs(
        global_config: Option<PorticoToml>,
        project_config: Option<PorticoToml>,
        env_overrides: HashMap<String, String>,
        cli_overrides: HashMap<String, String>,
    ) -> ConfigResult<PorticoToml> {
        let mut merged = match (project_config, global_config) {
            (Some(mut project), Some(global)) => {
                // Global client presets fill in names the project leaves out
                for (name, preset) in global.clients {
                    project.clients.entry(name).or_insert(preset);
                }
                project
            },
            (Some(project), None) => project,
            (None, Some(global)) => global,
            (None, None) => PorticoToml::default(),
        };

        // Apply environment variable overrides
        Self::apply_env_overrides(&mut merged, &env_overrides)?;

        // Apply CLI flag overrides (highest priority)
        Self::apply_cli_overrides(&mut merged, &cli_overrides)?;

        validate_config(&merged)?;
        Ok(merged)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(config: &mut PorticoToml, overrides: &HashMap<String, String>) -> ConfigResult<()> {
        for (key, value) in overrides {
            let setting = match key.as_str() {
                "PORTICO_HTTP_BASE_URL" => Setting::BaseUrl,
                "PORTICO_HTTP_TIMEOUT_MS" => Setting::TimeoutMs,
                "PORTICO_HTTP_RETRY" => Setting::Retry,
                "PORTICO_HTTP_TOKEN" => Setting::Token,
                "PORTICO_GATE_MAX_WAIT_MS" => Setting::MaxWaitMs,
                "PORTICO_GATE_POLL_INTERVAL_MS" => Setting::PollIntervalMs,
                _ => continue,
            };
            Self::apply(config, setting, key, value)?;
        }

        Ok(())
    }

    /// Apply CLI flag overrides
    fn apply_cli_overrides(config: &mut PorticoToml, overrides: &HashMap<String, String>) -> ConfigResult<()> {
        for (key, value) in overrides {
            let setting = match key.as_str() {
                "base-url" => Setting::BaseUrl,
                "timeout" => Setting::TimeoutMs,
                "retry" => Setting::Retry,
                "token" => Setting::Token,
                "max-wait" => Setting::MaxWaitMs,
                "poll-interval" => Setting::PollIntervalMs,
                _ => continue,
            };
            Self::apply(config, setting, key, value)?;
        }

        Ok(())
    }

    fn apply(config: &mut PorticoToml, setting: Setting, key: &str, value: &str) -> ConfigResult<()> {
        let number = || {
            value.trim().parse::<u64>().map_err(|e| {
                PorticoError::config(key, format!("expected a whole number, got '{}': {}", value, e))
            })
        };

        match setting {
            Setting::BaseUrl => config.http.base_url = Some(value.to_string()),
            Setting::TimeoutMs => config.http.timeout = Duration::from_millis(number()?),
            Setting::Retry => {
                config.http.retry = u32::try_from(number()?)
                    .map_err(|_| PorticoError::config(key, format!("retry count '{}' is too large", value)))?;
            },
            Setting::Token => config.http.token = Some(value.to_string()),
            Setting::MaxWaitMs => config.gate.max_wait_ms = number()?,
            Setting::PollIntervalMs => config.gate.poll_interval_ms = number()?,
        }

        Ok(())
    }

    /// Collect environment variable overrides
    pub fn collect_env_overrides() -> HashMap<String, String> {
        std::env::vars().filter(|(key, _)| key.starts_with(ENV_PREFIX)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toml::parse_portico_toml;
    use portico_http::ClientConfig;
    use tempfile::TempDir;

    fn temp_root() -> (TempDir, Utf8PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        (temp_dir, path)
    }

    #[tokio::test]
    async fn test_find_config_walks_up() {
        let (_guard, root) = temp_root();
        let nested = root.join("apps").join("dashboard");
        tokio::fs::create_dir_all(&nested).await.unwrap();
        tokio::fs::write(root.join(CONFIG_FILE_NAME), "[http]\nretry = 1").await.unwrap();

        let loader = ConfigLoader::new(nested);
        let found = loader.find_config_file(CONFIG_FILE_NAME).unwrap();
        assert_eq!(found, root.join(CONFIG_FILE_NAME));

        let (config, source) = loader.load_project_config().await.unwrap().unwrap();
        assert_eq!(config.http.retry, 1);
        assert_eq!(source, ConfigSource::Project(root.join(CONFIG_FILE_NAME)));
    }

    #[tokio::test]
    async fn test_missing_project_config() {
        let (_guard, root) = temp_root();
        let loader = ConfigLoader::new(root);

        assert!(loader.find_config_file("portico-never-present.toml").is_none());
    }

    #[tokio::test]
    async fn test_load_explicit_file() {
        let (_guard, root) = temp_root();
        let path = root.join("custom.toml");
        tokio::fs::write(&path, "[gate]\nmax_wait_ms = 2500").await.unwrap();

        let loader = ConfigLoader::new(root);
        let mut cli = HashMap::new();
        cli.insert("retry".to_string(), "5".to_string());

        let (config, source) = loader.load(Some(&path), cli).await.unwrap();
        assert_eq!(config.gate.max_wait_ms, 2500);
        assert_eq!(config.http.retry, 5);
        assert_eq!(source, ConfigSource::Explicit(path));
    }

    #[test]
    fn test_merge_configs() {
        let global = parse_portico_toml(
            "[http]\nretry = 9\n\n[clients.shared]\nretry = 1\n\n[clients.users]\nretry = 2",
        )
        .unwrap();
        let project = parse_portico_toml("[http]\nretry = 4\n\n[clients.users]\nretry = 3").unwrap();

        let env_overrides = HashMap::from([
            ("PORTICO_HTTP_TIMEOUT_MS".to_string(), "2500".to_string()),
            ("PORTICO_HTTP_RETRY".to_string(), "6".to_string()),
            ("PORTICO_UNRELATED".to_string(), "ignored".to_string()),
        ]);
        let cli_overrides = HashMap::from([("retry".to_string(), "7".to_string())]);

        let merged =
            ConfigLayering::merge_configs(Some(global), Some(project), env_overrides, cli_overrides).unwrap();

        // Project wins over global; global fills in missing presets
        assert_eq!(merged.clients["users"].retry, 3);
        assert_eq!(merged.clients["shared"].retry, 1);

        // Environment override applied, CLI wins over environment
        assert_eq!(merged.http.timeout, Duration::from_millis(2500));
        assert_eq!(merged.http.retry, 7);
    }

    #[test]
    fn test_merge_without_files_uses_defaults() {
        let env_overrides = HashMap::from([
            ("PORTICO_HTTP_BASE_URL".to_string(), "https://api.example.com".to_string()),
            ("PORTICO_HTTP_TOKEN".to_string(), "abc".to_string()),
            ("PORTICO_GATE_MAX_WAIT_MS".to_string(), "3000".to_string()),
            ("PORTICO_GATE_POLL_INTERVAL_MS".to_string(), "25".to_string()),
        ]);

        let merged = ConfigLayering::merge_configs(None, None, env_overrides, HashMap::new()).unwrap();

        assert_eq!(merged.http.base_url.as_deref(), Some("https://api.example.com"));
        assert_eq!(merged.http.token.as_deref(), Some("abc"));
        assert_eq!(merged.gate.max_wait_ms, 3000);
        assert_eq!(merged.gate.poll_interval_ms, 25);
        assert_eq!(merged.http.retry, ClientConfig::default().retry);
    }

    #[test]
    fn test_invalid_override_values() {
        let env_overrides = HashMap::from([("PORTICO_HTTP_TIMEOUT_MS".to_string(), "soon".to_string())]);
        let err = ConfigLayering::merge_configs(None, None, env_overrides, HashMap::new()).unwrap_err();
        assert!(matches!(err, PorticoError::ConfigValidation { ref field, .. } if field == "PORTICO_HTTP_TIMEOUT_MS"));

        // Parses, but fails validation of the merged result
        let cli_overrides = HashMap::from([("timeout".to_string(), "0".to_string())]);
        let err = ConfigLayering::merge_configs(None, None, HashMap::new(), cli_overrides).unwrap_err();
        assert!(matches!(err, PorticoError::ConfigValidation { ref field, .. } if field == "http.timeout"));
    }

    #[test]
    fn test_collect_env_overrides() {
        std::env::set_var("PORTICO_TEST_COLLECT_MARKER", "present");
        std::env::set_var("NOT_PORTICO_TEST_COLLECT_MARKER", "ignored");

        let overrides = ConfigLayering::collect_env_overrides();

        assert_eq!(overrides.get("PORTICO_TEST_COLLECT_MARKER").map(String::as_str), Some("present"));
        assert!(!overrides.contains_key("NOT_PORTICO_TEST_COLLECT_MARKER"));

        std::env::remove_var("PORTICO_TEST_COLLECT_MARKER");
        std::env::remove_var("NOT_PORTICO_TEST_COLLECT_MARKER");
    }
}
