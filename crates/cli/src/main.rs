//! Tradepost CLI - Drive the cart and checkout from a terminal.
//!
//! # Usage
//!
//! ```bash
//! # Show the persisted cart with totals
//! tp-cli cart show
//!
//! # Add two units of a product
//! tp-cli cart add sku-1 -q 2
//!
//! # Replace the local cart with the server's copy
//! tp-cli cart sync
//!
//! # Place an order
//! tp-cli checkout order --shipping-method standard
//!
//! # Request a B2B quote
//! tp-cli checkout quote --notes "Net 30"
//! ```
//!
//! Configuration comes from the environment (see
//! `tradepost_storefront::config`).

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tradepost_storefront::config::StorefrontConfig;

mod commands;

#[derive(Parser)]
#[command(name = "tp-cli")]
#[command(author, version, about = "Tradepost cart and checkout")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect and edit the cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Turn the cart into an order or a quote
    Checkout {
        #[command(subcommand)]
        action: CheckoutAction,
    },
}

#[derive(Subcommand)]
enum CartAction {
    /// Show the cart and its totals
    Show,
    /// Add a product
    Add {
        /// Product ID
        product: String,

        /// Units to add
        #[arg(short, long, default_value_t = 1)]
        quantity: u32,
    },
    /// Remove a product line
    Remove {
        /// Product ID
        product: String,
    },
    /// Empty the cart locally and on the server
    Clear,
    /// Replace the local cart with the server's copy
    Sync,
}

#[derive(Subcommand)]
enum CheckoutAction {
    /// Place an order for the cart
    Order {
        /// Shipping method offered by the backend
        #[arg(short, long)]
        shipping_method: String,
    },
    /// Request a quote for the cart
    Quote {
        /// Notes for the sales team
        #[arg(short, long, default_value = "")]
        notes: String,
    },
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &StorefrontConfig) -> Option<sentry::ClientInitGuard> {
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

    Some(guard)
}

/// Errors and warnings become Sentry events, info and debug become
/// breadcrumbs.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        tracing::Level::TRACE => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    let config = StorefrontConfig::from_env();

    // Sentry must be initialized before the tracing subscriber
    let _sentry_guard = config.as_ref().ok().and_then(init_sentry);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "tradepost_storefront=info,tp_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let result = match config {
        Ok(config) => run(cli, config).await,
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        tracing::error!("{}", e.user_message());
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: StorefrontConfig) -> Result<(), commands::CliError> {
    let state = commands::load_state(config)?;

    match cli.command {
        Commands::Cart { action } => match action {
            CartAction::Show => commands::cart::show(&state),
            CartAction::Add { product, quantity } => {
                commands::cart::add(&state, product, quantity).await?;
            }
            CartAction::Remove { product } => commands::cart::remove(&state, product),
            CartAction::Clear => commands::cart::clear(&state).await?,
            CartAction::Sync => commands::cart::sync(&state).await?,
        },
        Commands::Checkout { action } => match action {
            CheckoutAction::Order { shipping_method } => {
                commands::checkout::order(&state, shipping_method).await?;
            }
            CheckoutAction::Quote { notes } => commands::checkout::quote(&state, notes).await?,
        },
    }
    Ok(())
}
