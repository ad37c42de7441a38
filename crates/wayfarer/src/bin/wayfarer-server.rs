//! Standalone Wayfarer server backed by the in-memory collaborators.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt};
use wayfarer::prelude::*;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON config file. Missing fields take their defaults.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overriding the config file.
    #[arg(short, long)]
    bind: Option<String>,

    /// View distance, overriding the config file.
    #[arg(long)]
    view_distance: Option<f32>,

    /// Speak JSON envelopes instead of the binary wire format.
    #[arg(long)]
    json: bool,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,wayfarer=debug"));

    fmt().with_env_filter(filter).with_target(true).init();
}

#[tokio::main]
async fn main() -> Result<(), WayfarerError> {
    init_logging();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    if let Some(view_distance) = args.view_distance {
        config.view_distance = view_distance;
    }

    // One account book serves as both authenticator and durable store,
    // so a player's saved position is where their next login starts.
    let accounts = Arc::new(MemoryAccounts::new());

    let mut builder = WayfarerServerBuilder::new().config(config);
    if args.json {
        builder = builder.codec(JsonCodec);
    }
    let server = builder
        .build(Arc::clone(&accounts), MemoryCache::new(), accounts)
        .await?;

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "cannot listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await
}
