use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use reqwest::Client;
use token_client::client::TokenClients;
use token_client::server;
use token_client::utils::config_loader;
use token_client::utils::logging;
use token_client::utils::logging::LogLevel;
use tracing::{info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, env = "CONFIG", default_value = "token-client.yaml")]
    config: String,
    #[arg(long, env = "LOG_LEVEL", value_enum)]
    log_level: Option<LogLevel>,
    /// fetch every provider's token before serving
    #[arg(long)]
    warm_up: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // -------------------------------
    // 1. Read args, load YAML config
    // -------------------------------

    let args = Args::parse();
    let service_config = config_loader::run(&args.config).await?;
    logging::run(&service_config, args.log_level)?;

    // -------------------------------
    // 2. Create request client
    // -------------------------------

    let http = Client::builder().build()?;

    // -------------------------------
    // 3. Build providers, pipelines and downstream clients
    // -------------------------------

    let clients = Arc::new(TokenClients::build(&service_config, http)?);

    // -------------------------------
    // 4. Optionally fetch tokens up front
    // -------------------------------

    if args.warm_up {
        let failed = clients.warm_up().await;
        if !failed.is_empty() {
            warn!("warm-up failed for providers: {}", failed.join(", "));
        }
    }

    // -------------------------------
    // 5. Serve the admin API until interrupted
    // -------------------------------

    info!("Service starting...");
    tokio::select! {
        res = server::server::start(&service_config.settings, clients.clone()) => res?,
        _ = tokio::signal::ctrl_c() => info!("shutdown requested"),
    }

    Ok(())
}
