use anyhow::{Context, Result};
use assetx::{
    config::{write_config_file, AppConfig},
    logging::{init_logging, LogFormat},
    server::{exchanger_router, shutdown_signal},
    CoinRegistry, CommandTemplateBuilder, ExchangerService, RateTable, ReservationTable, RpcLedger,
};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Parser, Debug)]
#[command(name = "exchanger")]
#[command(about = "Exchanger: prices swaps from a fixed rate table and co-signs settlements")]
struct Args {
    #[arg(short, long, default_value = "exchanger.toml")]
    config: String,

    #[arg(short, long)]
    port: Option<u16>,

    /// Write a default configuration to the config path and exit.
    #[arg(long)]
    init: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.init {
        write_config_file(&args.config, &AppConfig::exchanger_default())?;
        println!("wrote default configuration to {}", args.config);
        return Ok(());
    }

    let mut config = if Path::new(&args.config).exists() {
        AppConfig::load_with_env_overrides(&args.config)
            .with_context(|| format!("loading {}", args.config))?
    } else {
        AppConfig::exchanger_default()
    };
    if let Some(port) = args.port {
        config.server.port = port;
    }
    config.validate()?;

    let format: LogFormat = config.logging.format.parse()?;
    init_logging(format, &config.logging.level);

    let ledger = Arc::new(RpcLedger::new(&config.ledger)?);
    let registry = CoinRegistry::new(ledger);
    registry
        .refresh_asset_labels()
        .await
        .context("loading asset labels from the ledger")?;

    let rates = RateTable::new(&config.rates);
    tracing::info!(pairs = rates.len(), "rate table loaded");

    let reservations = Arc::new(ReservationTable::new(config.lock_duration()));
    let sweeper = reservations.spawn_sweeper(config.sweep_interval());
    let builder = Arc::new(CommandTemplateBuilder::new(&config.builder));
    let exchanger = Arc::new(ExchangerService::new(rates, registry, reservations, builder));

    let addr = config.get_server_address();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    tracing::info!(%addr, "exchanger listening");

    axum::serve(listener, exchanger_router(exchanger))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    tracing::info!("exchanger stopped");
    Ok(())
}
