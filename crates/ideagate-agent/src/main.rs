//! ideagate — quality and novelty gate for research idea stories.
//! Entry point for the command-line binary.

mod cli;
mod commands;
mod runtime;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ideagate_common::GateConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; variables may come from the environment.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("ideagate=debug,info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = cli::Cli::parse();
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = GateConfig::load()?;
    info!(
        pass_mode = %config.pass.mode,
        fallback = config.pass.fallback.as_str(),
        provider = %config.provider.name,
        api_key_set = config.provider.api_key.is_some(),
        "Configuration loaded"
    );

    commands::run(cli, config).await
}
