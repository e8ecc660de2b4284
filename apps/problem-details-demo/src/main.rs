use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use problem_details_demo::config::AppConfig;
use problem_details_demo::{build_app, logging, shutdown};

/// Demo server rendering RFC 7807 problem documents
#[derive(Parser)]
#[command(name = "problem-details-demo")]
#[command(about = "Demo server rendering RFC 7807 problem documents")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port override for HTTP server (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Print effective configuration (YAML) and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Run,
    /// Validate configuration and exit
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1) defaults -> 2) YAML (if provided) -> 3) env (APP__*) -> 4) CLI overrides
    let mut config = AppConfig::load(cli.config.as_deref())?;
    config.apply_cli_overrides(cli.port, cli.verbose);

    if cli.print_config {
        print!("{}", config.to_yaml()?);
        return Ok(());
    }

    logging::init(&config.logging)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_server(&config).await,
        Commands::Check => check_config(&config),
    }
}

fn check_config(config: &AppConfig) -> Result<()> {
    tracing::info!("checking configuration");
    config.validate()?;
    println!("Configuration is valid");
    Ok(())
}

async fn run_server(config: &AppConfig) -> Result<()> {
    let addr = config.bind_addr()?;
    let app = build_app(config)?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "problem-details demo listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown::wait_for_signal())
        .await
        .context("server error")?;

    tracing::info!("server stopped");
    Ok(())
}
