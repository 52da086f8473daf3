use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use swap_config::{types::LogFormat, ConfigLoader};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod api;
mod service;

#[derive(Parser)]
#[command(name = "swap-service")]
#[command(about = "Faucet and cross-ledger swap service", long_about = None)]
struct Cli {
	#[command(subcommand)]
	command: Option<Commands>,

	#[arg(short, long, value_name = "FILE", default_value = "config/local.toml")]
	config: PathBuf,

	/// Overrides `service.log_level` from the configuration.
	#[arg(long, env = "SWAP_LOG_LEVEL")]
	log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
	/// Start the swap service
	Start,
	/// Validate the configuration file
	Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	let config = ConfigLoader::new()
		.with_file(&cli.config)
		.load()
		.await
		.with_context(|| format!("Failed to load configuration from {:?}", cli.config))?;

	let log_level = cli
		.log_level
		.clone()
		.unwrap_or_else(|| config.service.log_level.clone());
	setup_tracing(&log_level, config.service.log_format)?;

	match cli.command {
		Some(Commands::Start) | None => start_service(config).await,
		Some(Commands::Validate) => validate_config(cli, config),
	}
}

async fn start_service(config: swap_config::types::SwapConfig) -> Result<()> {
	info!("Starting swap service");
	info!("Service name: {}", config.service.name);
	info!("HTTP port: {}", config.service.http_port);

	let service =
		service::SwapService::from_config(&config).context("Failed to initialize service")?;

	let host = config.service.host.clone();
	let port = config.service.http_port;
	let http_service = service.clone();
	let mut http_handle =
		tokio::spawn(async move { api::start_http_server(http_service, host, port).await });

	info!("Swap service started successfully");

	tokio::select! {
		_ = setup_shutdown_signal() => {
			info!("Shutdown signal received, stopping services...");
		}
		result = &mut http_handle => match result {
			Ok(Ok(())) => warn!("HTTP server exited"),
			Ok(Err(e)) => error!("HTTP server failed: {:#}", e),
			Err(e) => error!("HTTP server task aborted: {}", e),
		},
	}

	service.shutdown().await;
	http_handle.abort();

	info!("Swap service stopped");
	Ok(())
}

fn validate_config(cli: Cli, config: swap_config::types::SwapConfig) -> Result<()> {
	info!("Configuration file {:?} is valid", cli.config);
	info!("Service name: {}", config.service.name);
	info!("Faucet environment: {}", config.faucet.environment);
	for (name, registry) in &config.environments {
		info!(
			"  Environment {}: {} + {} tokens, {} airdrop eligible",
			name,
			registry.tokens_set1.len(),
			registry.tokens_set2.len(),
			registry.airdrop_eligible.len()
		);
	}
	Ok(())
}

fn setup_tracing(log_level: &str, format: LogFormat) -> Result<()> {
	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

	let (json, pretty) = match format {
		LogFormat::Json => (Some(tracing_subscriber::fmt::layer().json()), None),
		LogFormat::Pretty => (None, Some(tracing_subscriber::fmt::layer())),
	};

	tracing_subscriber::registry()
		.with(env_filter)
		.with(json)
		.with(pretty)
		.try_init()
		.context("Failed to install tracing subscriber")?;

	Ok(())
}

async fn setup_shutdown_signal() {
	let ctrl_c = async {
		if let Err(e) = signal::ctrl_c().await {
			warn!("Failed to listen for Ctrl+C: {}", e);
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match signal::unix::signal(signal::unix::SignalKind::terminate()) {
			Ok(mut stream) => {
				stream.recv().await;
			}
			Err(e) => {
				warn!("Failed to install SIGTERM handler: {}", e);
				std::future::pending::<()>().await;
			}
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}
}
