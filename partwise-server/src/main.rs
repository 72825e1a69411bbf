//! partwise server binary

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use partwise_engine::Uploader;
use partwise_server::{Args, PartwiseServer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    info!("Starting partwise server");
    info!("Bind address: {}", args.bind);
    info!("Backend: {:?}, part size: {} bytes", args.backend, args.part_size);

    let store = args.build_store().await?;
    let uploader = Uploader::new(store, args.upload_config()).context("invalid upload configuration")?;

    let server = PartwiseServer::new(Arc::new(uploader));
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    };

    server.serve(args.bind, shutdown).await?;
    info!("Server shutdown gracefully");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
