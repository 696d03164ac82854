//! Health command implementation

use anyhow::{bail, Context};

use super::CommandContext;

/// Mount the shared services and print their health
pub async fn execute(json: bool, ctx: &CommandContext) -> anyhow::Result<()> {
    let (_host, consumer) = ctx.start_services().await?;
    let report = consumer.health_status().await?;

    if json {
        let text = serde_json::to_string_pretty(&report).context("Failed to render health report")?;
        println!("{}", text);
    } else {
        ctx.output.info(&format!("Health at {}", report.timestamp.to_rfc3339()));
        for (name, health) in &report.services {
            ctx.output.health(name, health);
        }
    }

    let failing = report.services.values().filter(|health| health.is_error()).count();
    if failing > 0 {
        bail!("{} of {} services reported errors", failing, report.services.len());
    }
    if !json {
        ctx.output.success("All services healthy");
    }
    Ok(())
}
