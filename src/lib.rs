pub mod models;
pub mod server;
pub mod llm;
pub mod cli;
pub mod history;

use cli::Args;
use log::info;
use server::{ api::AppState, Server };
use std::error::Error;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Gateway Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("Provider Base URL: {}", args.base_url);
    info!("UI Document: {}", args.ui_path);
    info!("Interaction Log Dir: {}", args.log_dir);
    info!("Discovery Timeout: {}s", args.discovery_timeout_secs);
    info!("Stream Delay: {}ms", args.stream_delay_ms);
    info!("TLS Enabled: {}", args.tls_paths().is_some());
    info!("-----------------------------");

    let state = AppState::from_args(&args)?;
    let addr = args.server_addr.clone();
    info!("Starting server on: {}", addr);
    let server = Server::new(addr, state, args);
    server.run().await?;

    Ok(())
}
