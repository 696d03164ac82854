//! Request command implementation

use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use portico_http::{HttpMethod, HttpResponse, RequestBody, RequestOptions, ResilientHttpClient, ResponseBody};
use portico_runtime::ServiceConsumer;

use super::CommandContext;

/// Arguments of the `request` command
#[derive(Debug, Clone)]
pub struct RequestArgs {
    pub url: String,
    pub client: Option<String>,
    pub method: String,
    pub data: Option<String>,
    pub headers: Vec<String>,
    pub query: Vec<String>,
    pub cached: bool,
    pub repeat: u32,
}

/// Send the request through the default or a named shared client
pub async fn execute(args: RequestArgs, ctx: &CommandContext) -> anyhow::Result<()> {
    let options = build_options(&args)?;
    let (_host, consumer) = ctx.start_services().await?;
    let client = resolve_client(args.client.as_deref(), ctx, &consumer).await?;

    for attempt in 1..=args.repeat.max(1) {
        let response = client
            .request(&args.url, options.clone())
            .await
            .with_context(|| format!("{} {} failed", options.effective_method(), args.url))?;

        if args.repeat > 1 {
            ctx.output.info(&format!("# request {}", attempt));
        }
        print_response(&response, ctx);
    }

    if args.cached {
        let stats = client.cache_stats();
        ctx.output.info(&format!(
            "cache: {} entries ({} fresh)",
            stats.total_entries, stats.fresh_entries
        ));
    }
    Ok(())
}

/// Translate command-line arguments into request options
pub fn build_options(args: &RequestArgs) -> anyhow::Result<RequestOptions> {
    let method: HttpMethod = args.method.parse()?;
    let mut options = RequestOptions::new().method(method);

    for header in &args.headers {
        let (name, value) = parse_header(header)?;
        options = options.header(name, value);
    }
    for pair in &args.query {
        let (key, value) = parse_query(pair)?;
        options = options.query(key, value);
    }
    if let Some(data) = &args.data {
        let value: serde_json::Value =
            serde_json::from_str(data).context("Request body must be valid JSON")?;
        options = options.body(RequestBody::Json(value));
    }
    if args.cached {
        options = options.cached();
    }

    Ok(options)
}

/// Split `Name: value` into its parts
pub fn parse_header(raw: &str) -> anyhow::Result<(&str, &str)> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| anyhow!("Header '{}' must look like NAME:VALUE", raw))?;
    let name = name.trim();
    if name.is_empty() {
        bail!("Header '{}' has an empty name", raw);
    }
    Ok((name, value.trim()))
}

/// Split `key=value` into its parts
pub fn parse_query(raw: &str) -> anyhow::Result<(&str, &str)> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key, value)),
        _ => bail!("Query parameter '{}' must look like KEY=VALUE", raw),
    }
}

async fn resolve_client(
    name: Option<&str>,
    ctx: &CommandContext,
    consumer: &ServiceConsumer,
) -> anyhow::Result<Arc<ResilientHttpClient>> {
    let Some(name) = name else {
        let services = consumer.services().await?;
        return Ok(services.http_service()?.default_client());
    };

    let preset = ctx.config.client(name).cloned().ok_or_else(|| {
        let known: Vec<&str> = ctx.config.clients.keys().map(String::as_str).collect();
        anyhow!("No client preset named '{}' (configured: {})", name, known.join(", "))
    })?;

    Ok(consumer.create_client(name, preset).await?)
}

fn print_response(response: &HttpResponse, ctx: &CommandContext) {
    ctx.output.status(response.status, &response.status_text);
    match &response.data {
        ResponseBody::Json(value) => match serde_json::to_string_pretty(value) {
            Ok(text) => println!("{}", text),
            Err(_) => println!("{}", value),
        },
        ResponseBody::Text(text) => println!("{}", text),
        ResponseBody::Bytes(bytes) => ctx.output.info(&format!("<{} bytes of binary data>", bytes.len())),
    }
}
