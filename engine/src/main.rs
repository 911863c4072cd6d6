// Arbor design-component governance engine
// Main entry point for the arbor binary

use anyhow::Context;
use clap::Parser;
use arbor_engine::cli::{Cli, Command};
use arbor_engine::config::Config;
use arbor_engine::context::EngineContext;
use arbor_engine::handlers::{
    handle_archive, handle_chat, handle_create, handle_decisions, handle_promote, handle_review,
    handle_revive, handle_shield, handle_status, handle_trace, OutputFormat,
};
use arbor_engine::telemetry::init_telemetry_with_level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration (or use custom path if provided)
    let config = match &cli.config {
        Some(config_path) => Config::load_from_path(config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?,
        None => Config::load_or_create().context("Failed to load config")?,
    };

    // --log wins over the config file; RUST_LOG wins over both
    init_telemetry_with_level(cli.log.as_deref().unwrap_or(&config.core.log_level));

    tracing::info!(
        "Arbor v{} ({} - {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_COMMIT_HASH"),
        env!("BUILD_TIMESTAMP")
    );

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    let mut ctx = EngineContext::init(config)
        .await
        .context("Failed to initialise the engine")?;

    let result = match &cli.command {
        Command::Status => handle_status(&ctx, format).await,
        Command::Create {
            name,
            category,
            description,
        } => handle_create(&ctx, name, category, description, format).await,
        Command::Promote { component } => handle_promote(&ctx, component, format).await,
        Command::Archive { component, reason } => {
            handle_archive(&ctx, component, reason, format).await
        }
        Command::Revive { id } => handle_revive(&ctx, *id, format).await,
        Command::Shield {
            component,
            actor,
            reason,
        } => handle_shield(&ctx, component, actor, reason, format).await,
        Command::Review {
            component,
            agent,
            zone,
        } => handle_review(&ctx, component, agent.as_deref(), zone.as_deref(), format).await,
        Command::Decisions { component, limit } => {
            handle_decisions(&ctx, *component, *limit, format).await
        }
        Command::Trace { file } => handle_trace(&ctx, file, format).await,
        Command::Chat { message, session } => {
            handle_chat(&ctx, message, session.as_deref(), format).await
        }
    };

    ctx.teardown().await;
    result
}
