use cardpool::application::gateway::{Gateway, GatewayParts};
use cardpool::application::waiter::WaitOutcome;
use cardpool::config::{BankConfig, GatewayConfig};
use cardpool::domain::order::Order;
use cardpool::domain::ports::{BankApiRef, SettlementListener, Stores};
use cardpool::infrastructure::alerting::TracingAlerter;
use cardpool::infrastructure::bank_http::{DisabledBank, HttpBank};
use cardpool::infrastructure::proxy::ProxyHandle;
#[cfg(feature = "storage-rocksdb")]
use cardpool::infrastructure::rocksdb::RocksDBStore;
use cardpool::interfaces::csv::card_reader::CardReader;
use cardpool::interfaces::csv::order_reader::OrderReader;
use cardpool::interfaces::csv::order_writer::{OrderRow, OrderWriter};
use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Orders CSV file (`payment_method, amount, payload`)
    orders: PathBuf,

    /// Cards CSV file to add to the pool before processing orders
    #[arg(long, env = "CARDPOOL_CARDS")]
    cards: Option<PathBuf>,

    /// Proxy list, one URL per line. Without it requests go out directly.
    #[arg(long, env = "CARDPOOL_PROXIES")]
    proxies: Option<PathBuf>,

    /// Bank endpoints JSON. Without it link orders fail.
    #[arg(long, env = "CARDPOOL_BANK_CONFIG")]
    bank_config: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, env = "CARDPOOL_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Block until every link order has its payment link (or gives up)
    #[arg(long)]
    wait_links: bool,

    /// Keep settling in the background until interrupted
    #[arg(long)]
    serve: bool,

    /// Maximum work units dispatched per tick
    #[arg(long, env = "CARDPOOL_PER_TICK")]
    per_tick: Option<usize>,
}

struct LogListener;

impl SettlementListener for LogListener {
    fn order_finished(&self, order: &Order) {
        tracing::info!(order = %order.number, status = %order.status, "Merchant notification due");
    }
}

fn open_stores(db_path: Option<PathBuf>) -> Result<Stores> {
    match db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => Ok(RocksDBStore::open(path).into_diagnostic()?.stores()),
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => {
            tracing::warn!(
                "Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to in-memory storage."
            );
            Ok(Stores::in_memory())
        }
        None => Ok(Stores::in_memory()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let stores = open_stores(cli.db_path)?;

    if let Some(path) = cli.cards {
        let file = File::open(path).into_diagnostic()?;
        for card in CardReader::new(file).cards() {
            match card {
                Ok(card) => {
                    stores.cards.save(card).await.into_diagnostic()?;
                }
                Err(e) => eprintln!("Error reading card: {}", e),
            }
        }
    }

    let proxies = match cli.proxies {
        Some(path) => {
            let file = File::open(path).into_diagnostic()?;
            ProxyHandle::parse_list(BufReader::new(file)).into_diagnostic()?
        }
        None => Vec::new(),
    };

    let bank: BankApiRef = match cli.bank_config {
        Some(path) => {
            let config = BankConfig::load(path).into_diagnostic()?;
            Arc::new(HttpBank::new(config.links))
        }
        None => Arc::new(DisabledBank),
    };

    let mut config = GatewayConfig::default();
    if let Some(per_tick) = cli.per_tick {
        config.dispatcher.max_per_tick = per_tick;
    }

    let gateway = Gateway::build(GatewayParts {
        stores: stores.clone(),
        bank,
        alerter: Arc::new(TracingAlerter),
        listener: Arc::new(LogListener),
        proxies,
        config,
    })
    .await
    .into_diagnostic()?;
    gateway.start().await.into_diagnostic()?;

    // Process orders
    let file = File::open(cli.orders).into_diagnostic()?;
    let mut created = Vec::new();
    for request in OrderReader::new(file).orders() {
        match request {
            Ok(request) => match gateway.orders.create(request).await {
                Ok(order) => created.push(order),
                Err(e) => eprintln!("Error creating order: {}", e.user_message()),
            },
            Err(e) => eprintln!("Error reading order: {}", e),
        }
    }

    if cli.wait_links {
        for order in created.iter().filter(|o| o.payment_method.requires_link()) {
            match gateway.waiter.wait(order.number, std::future::pending()).await {
                Ok(WaitOutcome::TimedOut) => {
                    eprintln!("Timed out waiting for the link of order {}", order.number)
                }
                Ok(_) => {}
                Err(e) => eprintln!("Error waiting for order {}: {}", order.number, e),
            }
        }
    }

    // Collect the current state of every created order
    let mut rows = Vec::with_capacity(created.len());
    for order in created {
        let order = gateway.orders.find(order.number).await.into_diagnostic()?;
        let card = stores
            .cards
            .find_by_id(order.card_id)
            .await
            .into_diagnostic()?
            .map(|c| c.identifier())
            .unwrap_or_default();
        let link = stores
            .links
            .find_by_order_id(order.id)
            .await
            .into_diagnostic()?
            .map(|l| l.url)
            .unwrap_or_default();
        rows.push(OrderRow::new(&order, card, link));
    }

    let stdout = io::stdout();
    let mut writer = OrderWriter::new(stdout.lock());
    writer.write_orders(rows).into_diagnostic()?;
    drop(writer);

    if cli.serve {
        tracing::info!("Settling in the background, press Ctrl-C to stop");
        tokio::signal::ctrl_c().await.into_diagnostic()?;
    }

    Ok(())
}
