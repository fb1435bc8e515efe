//! Yoraa CLI - Inspect and edit collections from the terminal.
//!
//! # Usage
//!
//! ```bash
//! # Show the cart with totals
//! yoraa cart list
//!
//! # Add a size M tee to the cart
//! yoraa cart add tee-001 --price 25 --name "Linen Tee" --size M --color White
//!
//! # Move a saved item into the cart
//! yoraa save-for-later move-to-cart tee-001
//!
//! # Show recent errors as JSON
//! yoraa --json errors
//! ```
//!
//! Signed out (no `YORAA_API_TOKEN`), collections are kept under
//! `YORAA_STORAGE_DIR`. Signed in with `YORAA_API_BASE_URL` set, the backend
//! is the source of truth.
//!
//! # Commands
//!
//! - `cart`, `wishlist`, `save-for-later` - Collection actions
//! - `errors` - Recent errors and per-category counts

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;

use clap::{Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use yoraa_core::CollectionKind;
use yoraa_store::{ErrorMonitor, StoreConfig, monitor};

mod commands;
mod output;

use commands::{CliError, CollectionAction};

#[derive(Parser)]
#[command(name = "yoraa")]
#[command(author, version, about = "Yoraa collection tools")]
struct Cli {
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Shopping cart
    Cart {
        #[command(subcommand)]
        action: CollectionAction,
    },
    /// Wishlist
    Wishlist {
        #[command(subcommand)]
        action: CollectionAction,
    },
    /// Items saved for later
    SaveForLater {
        #[command(subcommand)]
        action: CollectionAction,
    },
    /// Load every collection and report captured errors
    Errors {
        /// Number of records to show
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,
    },
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &StoreConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
///
/// Errors reach Sentry as events through the monitor's forwarder, so logs
/// only become breadcrumbs here.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN | tracing::Level::INFO => {
            sentry_tracing::EventFilter::Breadcrumb
        }
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

fn init_tracing(log_json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "yoraa_cli=info,yoraa_store=warn".into());

    let json_layer = log_json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
    });
    let text_layer = (!log_json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = match StoreConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {e}");
            std::process::exit(2);
        }
    };

    let _sentry_guard = init_sentry(&config);

    if let Err(e) = run(cli, &config).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: &StoreConfig) -> Result<(), CliError> {
    let monitor = Arc::new(ErrorMonitor::new(config.error_buffer_capacity));
    if config.sentry_dsn.is_some() {
        monitor.on_error(monitor::sentry_forwarder());
    }

    let deps = config.service_deps(Arc::clone(&monitor))?;
    let format = output::Format::from_flag(cli.json);

    match cli.command {
        Commands::Cart { action } => {
            commands::collection::run(&deps, CollectionKind::Cart, action, format).await
        }
        Commands::Wishlist { action } => {
            commands::collection::run(&deps, CollectionKind::Wishlist, action, format).await
        }
        Commands::SaveForLater { action } => {
            commands::collection::run(&deps, CollectionKind::SaveForLater, action, format).await
        }
        Commands::Errors { limit } => commands::errors::run(&deps, &monitor, limit, format).await,
    }
}
