//! Command implementations and dispatch logic.
//!
//! Each command is implemented as an async function that takes a
//! CommandContext holding the effective configuration.

use std::collections::HashMap;
use std::sync::Arc;

use camino::Utf8Path;
use portico_config::{ConfigLoader, ConfigSource, PorticoToml};
use portico_core::error::PorticoResult;
use portico_runtime::{ServiceConsumer, ServiceHost, ServiceManager};
use tracing::info;

pub mod clients;
pub mod health;
pub mod request;


use crate::output::OutputHandler;
use crate::{Commands, Overrides};

/// Name the CLI uses when discovering shared services
const CONSUMER_NAME: &str = "portico-cli";

/// Shared context for all commands
pub struct CommandContext {
    pub config: PorticoToml,
    pub source: ConfigSource,
    pub output: OutputHandler,
}

impl CommandContext {
    /// Resolve configuration from files, environment and flags
    pub async fn load(explicit: Option<&Utf8Path>, overrides: &Overrides) -> PorticoResult<Self> {
        let loader = ConfigLoader::from_current_dir()?;
        let (config, source) = loader.load(explicit, override_map(overrides)).await?;
        info!(source = ?source, "Configuration loaded");

        Ok(Self {
            config,
            source,
            output: OutputHandler::new(),
        })
    }

    /// Start an in-process host for the configured services and a consumer
    /// bound to it
    pub async fn start_services(&self) -> PorticoResult<(ServiceHost, ServiceConsumer)> {
        let wait = self.config.gate.wait_options();
        let manager = Arc::new(ServiceManager::with_defaults(self.config.http.clone()));
        let host = ServiceHost::with_client_wait(manager, wait);

        host.bootstrap().await?;
        host.mount().await?;

        let consumer = ServiceConsumer::with_options(CONSUMER_NAME, host.slot(), wait);
        Ok((host, consumer))
    }
}

/// Flag overrides keyed the way the configuration layering expects
fn override_map(overrides: &Overrides) -> HashMap<String, String> {
    let mut map = HashMap::new();
    if let Some(base_url) = &overrides.base_url {
        map.insert("base-url".to_string(), base_url.clone());
    }
    if let Some(timeout) = overrides.timeout {
        map.insert("timeout".to_string(), timeout.to_string());
    }
    if let Some(retry) = overrides.retry {
        map.insert("retry".to_string(), retry.to_string());
    }
    if let Some(token) = &overrides.token {
        map.insert("token".to_string(), token.clone());
    }
    if let Some(max_wait) = overrides.max_wait {
        map.insert("max-wait".to_string(), max_wait.to_string());
    }
    if let Some(poll_interval) = overrides.poll_interval {
        map.insert("poll-interval".to_string(), poll_interval.to_string());
    }
    map
}

/// Dispatch a command to its handler
pub async fn dispatch_command(command: Commands, ctx: &CommandContext) -> anyhow::Result<()> {
    match command {
        Commands::Health { json } => {
            info!("Checking service health (json: {})", json);
            health::execute(json, ctx).await
        },
        Commands::Request {
            url,
            client,
            method,
            data,
            headers,
            query,
            cached,
            repeat,
        } => {
            info!("Sending {} {} (client: {:?})", method, url, client);
            let args = request::RequestArgs {
                url,
                client,
                method,
                data,
                headers,
                query,
                cached,
                repeat,
            };
            request::execute(args, ctx).await
        },
        Commands::Clients => {
            info!("Listing client presets");
            clients::execute(ctx).await
        },
    }
}
