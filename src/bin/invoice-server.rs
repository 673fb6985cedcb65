//! HTTP server binary for invoice-pdf-service.
//!
//! A thin shim over the library crate that maps CLI flags to an
//! `InvoiceConfig` and an object store, then serves the router.

use anyhow::{Context, Result};
use clap::Parser;
use invoice_pdf_service::store::blob::DEFAULT_API_URL;
use invoice_pdf_service::{
    router, AppState, DeliveryMode, FsObjectStore, HttpBlobStore, InvoiceConfig, InvoiceStore,
    MemoryObjectStore, ObjectStore, SellerInfo, TotalPolicy,
};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Local run, invoices kept in memory
  invoice-server --storage memory

  # Keep invoices on disk, served from /invoices/{key}
  invoice-server --storage fs --data-dir ./invoices --public-url https://shop.example.com

  # Hosted blob store
  BLOB_READ_WRITE_TOKEN=... invoice-server --storage blob

  # Stream PDFs back instead of storing them
  invoice-server --delivery stream --storage none

ENVIRONMENT VARIABLES:
  BLOB_READ_WRITE_TOKEN   Token for the hosted blob store
  INVOICE_BIND            Listen address (default 0.0.0.0:3000)
  RUST_LOG                Overrides --verbose/--quiet log filtering
"#;

/// Serve PDF invoice generation, listing and deletion over HTTP.
#[derive(Parser, Debug)]
#[command(
    name = "invoice-server",
    version,
    about = "Serve PDF invoice generation, listing and deletion over HTTP",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Address to listen on.
    #[arg(long, env = "INVOICE_BIND", default_value = "0.0.0.0:3000")]
    bind: SocketAddr,

    /// Object store backend.
    #[arg(long, env = "INVOICE_STORAGE", value_enum, default_value = "memory")]
    storage: StorageArg,

    /// Directory for the `fs` backend.
    #[arg(long, env = "INVOICE_DATA_DIR", default_value = "./invoices")]
    data_dir: PathBuf,

    /// Public base URL of this server; stored invoices are served under `<url>/invoices/`.
    #[arg(long, env = "INVOICE_PUBLIC_URL", default_value = "http://localhost:3000")]
    public_url: String,

    /// Hosted blob store token.
    #[arg(long, env = "BLOB_READ_WRITE_TOKEN", hide_env_values = true)]
    blob_token: Option<String>,

    /// Hosted blob store API endpoint.
    #[arg(long, env = "BLOB_API_URL", default_value = DEFAULT_API_URL)]
    blob_api_url: String,

    /// Persist invoices or stream them back.
    #[arg(long, env = "INVOICE_DELIVERY", value_enum, default_value = "persist")]
    delivery: DeliveryArg,

    /// Reject orders whose total differs from the sum of line costs.
    #[arg(long, env = "INVOICE_VERIFY_TOTAL")]
    verify_total: bool,

    /// Omit the per-row cost column.
    #[arg(long, env = "INVOICE_NO_COST_COLUMN")]
    no_cost_column: bool,

    /// Omit the seller block.
    #[arg(long, env = "INVOICE_NO_SELLER_HEADER")]
    no_seller_header: bool,

    /// Seller name printed in the header.
    #[arg(long, env = "INVOICE_SELLER_NAME", default_value = "Online Store")]
    seller_name: String,

    /// Extra seller lines (repeatable, at most three are printed).
    #[arg(long = "seller-line", env = "INVOICE_SELLER_LINES", value_delimiter = ';')]
    seller_lines: Vec<String>,

    /// Heading printed above the item table.
    #[arg(long, env = "INVOICE_TITLE", default_value = "Invoice")]
    title: String,

    /// Line printed at the foot of the last page.
    #[arg(
        long,
        env = "INVOICE_CLOSING_NOTE",
        default_value = "Thank you for your purchase!"
    )]
    closing_note: String,

    /// Print no closing line.
    #[arg(long, env = "INVOICE_NO_CLOSING_NOTE", conflicts_with = "closing_note")]
    no_closing_note: bool,

    /// QR payload for streamed invoices, which have no storage key.
    #[arg(long, env = "INVOICE_QR_FALLBACK", default_value = "invoice")]
    qr_fallback: String,

    /// Owner used when a request carries no email.
    #[arg(long, env = "INVOICE_DEFAULT_OWNER", default_value = "anonymous")]
    default_owner: String,

    /// Longest thumbnail edge in pixels after downscaling (16-2048).
    #[arg(long, env = "INVOICE_THUMBNAIL_MAX_PX", default_value_t = 240)]
    thumbnail_max_px: u32,

    /// Currency symbol prefixed to amounts.
    #[arg(long, env = "INVOICE_CURRENCY", default_value = "$")]
    currency: String,

    /// Minutes east of UTC for printed dates.
    #[arg(long, env = "INVOICE_UTC_OFFSET_MINUTES", default_value_t = 0, allow_hyphen_values = true)]
    utc_offset_minutes: i32,

    /// Per-image fetch timeout in seconds.
    #[arg(long, env = "INVOICE_IMAGE_TIMEOUT", default_value_t = 10)]
    image_timeout: u64,

    /// Product images fetched concurrently.
    #[arg(short, long, env = "INVOICE_FETCH_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "INVOICE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "INVOICE_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum StorageArg {
    Memory,
    Fs,
    Blob,
    /// No store; only stream delivery works.
    #[value(name = "none")]
    Disabled,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum DeliveryArg {
    Persist,
    Stream,
}

impl From<DeliveryArg> for DeliveryMode {
    fn from(v: DeliveryArg) -> Self {
        match v {
            DeliveryArg::Persist => DeliveryMode::Persist,
            DeliveryArg::Stream => DeliveryMode::Stream,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config and store ───────────────────────────────────────────
    let config = build_config(&cli)?;
    let store = build_store(&cli).await?;
    let backend = store.as_ref().map(InvoiceStore::backend_name).unwrap_or("none");
    let delivery = config.delivery;

    if store.is_none() && delivery == DeliveryMode::Persist {
        warn!("No object store configured; generate, list and delete will answer 500");
    }

    let state = AppState::new(config, store).context("Failed to initialise service state")?;
    let app = router(state);

    // ── Serve ────────────────────────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(cli.bind)
        .await
        .with_context(|| format!("Failed to bind {}", cli.bind))?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %cli.bind,
        delivery = ?delivery,
        storage = backend,
        "invoice-server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("invoice-server stopped");
    Ok(())
}

fn build_config(cli: &Cli) -> Result<InvoiceConfig> {
    let policy = if cli.verify_total {
        TotalPolicy::Verify
    } else {
        TotalPolicy::Trust
    };
    InvoiceConfig::builder()
        .delivery(cli.delivery.into())
        .include_cost_column(!cli.no_cost_column)
        .include_seller_header(!cli.no_seller_header)
        .seller(SellerInfo {
            name: cli.seller_name.clone(),
            lines: cli.seller_lines.clone(),
        })
        .title(cli.title.clone())
        .closing_note((!cli.no_closing_note).then(|| cli.closing_note.clone()))
        .qr_fallback(cli.qr_fallback.clone())
        .default_owner(cli.default_owner.clone())
        .thumbnail_max_px(cli.thumbnail_max_px)
        .currency_symbol(cli.currency.clone())
        .utc_offset_minutes(cli.utc_offset_minutes)
        .image_timeout_secs(cli.image_timeout)
        .fetch_concurrency(cli.concurrency)
        .total_policy(policy)
        .build()
        .context("Invalid configuration")
}

async fn build_store(cli: &Cli) -> Result<Option<InvoiceStore>> {
    let served_at = format!("{}/invoices", cli.public_url.trim_end_matches('/'));
    let backend: Arc<dyn ObjectStore> = match cli.storage {
        StorageArg::Disabled => return Ok(None),
        StorageArg::Memory => Arc::new(MemoryObjectStore::new(served_at)),
        StorageArg::Fs => Arc::new(
            FsObjectStore::new(&cli.data_dir, served_at)
                .await
                .with_context(|| format!("Failed to open {}", cli.data_dir.display()))?,
        ),
        StorageArg::Blob => {
            match HttpBlobStore::new(
                cli.blob_api_url.clone(),
                cli.blob_token.clone(),
                Duration::from_secs(30),
            ) {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    warn!("Blob store unavailable: {}", e);
                    return Ok(None);
                }
            }
        }
    };
    Ok(Some(InvoiceStore::new(backend)))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("invoice-server").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults_match_library_defaults() {
        let config = build_config(&parse(&[])).unwrap();
        let library = InvoiceConfig::default();
        assert_eq!(config.title, library.title);
        assert_eq!(config.closing_note, library.closing_note);
        assert_eq!(config.qr_fallback, library.qr_fallback);
        assert_eq!(config.default_owner, library.default_owner);
        assert_eq!(config.thumbnail_max_px, library.thumbnail_max_px);
    }

    #[test]
    fn every_layout_knob_is_mapped() {
        let cli = parse(&[
            "--title",
            "Factura",
            "--closing-note",
            "Gracias",
            "--qr-fallback",
            "https://shop.example.com",
            "--default-owner",
            "guest",
            "--thumbnail-max-px",
            "120",
        ]);
        let config = build_config(&cli).unwrap();
        assert_eq!(config.title, "Factura");
        assert_eq!(config.closing_note.as_deref(), Some("Gracias"));
        assert_eq!(config.qr_fallback, "https://shop.example.com");
        assert_eq!(config.default_owner, "guest");
        assert_eq!(config.thumbnail_max_px, 120);
    }

    #[test]
    fn closing_note_can_be_removed() {
        let config = build_config(&parse(&["--no-closing-note"])).unwrap();
        assert!(config.closing_note.is_none());
    }
}
