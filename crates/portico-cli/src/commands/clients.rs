//! Clients command implementation

use portico_config::ConfigSource;

use super::CommandContext;

/// List the named client presets and their targets
pub async fn execute(ctx: &CommandContext) -> anyhow::Result<()> {
    let config = &ctx.config;
    ctx.output.info(&format!("# Presets from {}", describe_source(&ctx.source)));
    if config.clients.is_empty() {
        ctx.output.warn("No client presets configured; add [clients.<name>] tables to portico.toml");
        return Ok(());
    }

    for (name, preset) in &config.clients {
        let target = preset.base_url.as_deref().unwrap_or("(no base URL)");
        ctx.output.step(
            "-",
            &format!(
                "{}  {}  timeout={}ms retry={}",
                name,
                target,
                preset.timeout.as_millis(),
                preset.retry
            ),
        );
    }
    Ok(())
}

fn describe_source(source: &ConfigSource) -> String {
    match source {
        ConfigSource::Global(path) => format!("global file {}", path),
        ConfigSource::Project(path) => format!("project file {}", path),
        ConfigSource::Explicit(path) => format!("file {}", path),
        ConfigSource::Defaults => "built-in defaults".to_string(),
    }
}
