use anyhow::{Context, Result};
use assetx::{
    config::{write_config_file, AppConfig},
    logging::{init_logging, LogFormat},
    server::{shutdown_signal, trader_router},
    CoinRegistry, CommandTemplateBuilder, ExchangerClient, QuotationStore, ReservationTable, RpcLedger,
    TraderService,
};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Parser, Debug)]
#[command(name = "trader")]
#[command(about = "Trader: quotes held assets against an exchanger and settles offers")]
struct Args {
    #[arg(short, long, default_value = "trader.toml")]
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
        write_config_file(&args.config, &AppConfig::default())?;
        println!("wrote default configuration to {}", args.config);
        return Ok(());
    }

    let mut config = if Path::new(&args.config).exists() {
        AppConfig::load_with_env_overrides(&args.config)
            .with_context(|| format!("loading {}", args.config))?
    } else {
        AppConfig::default()
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

    let reservations = Arc::new(ReservationTable::new(config.lock_duration()));
    let quotations = Arc::new(QuotationStore::new(config.quotation_ttl()));
    let exchanger = Arc::new(ExchangerClient::new(&config.counterparty)?);
    let builder = Arc::new(CommandTemplateBuilder::new(&config.builder));
    let trader = Arc::new(TraderService::new(
        registry,
        reservations,
        quotations,
        exchanger,
        builder,
    ));
    let maintenance = trader.spawn_maintenance(config.sweep_interval());

    let addr = config.get_server_address();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    tracing::info!(%addr, exchanger = %config.counterparty.base_url, "trader listening");

    axum::serve(listener, trader_router(trader))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    maintenance.abort();
    tracing::info!("trader stopped");
    Ok(())
}
