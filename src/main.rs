//! btc-checkout: open a Bitcoin payment session and follow it to the end.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use btc_checkout::backend::{HttpBackend, Plan};
use btc_checkout::clock::{Clock, TokioClock};
use btc_checkout::config::{load_with_env, validate_config, CheckoutConfig, ConfigError};
use btc_checkout::lifecycle::Shutdown;
use btc_checkout::observability::{logging, metrics};
use btc_checkout::payments::UpgradeLedger;
use btc_checkout::session::{
    ControllerDeps, LifecycleState, SessionController, SessionSnapshot, UpgradeStatus,
};

#[derive(Parser)]
#[command(name = "btc-checkout")]
#[command(about = "Bitcoin payment session runner", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Payment backend base URL (overrides config and environment)
    #[arg(long)]
    backend_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a payment session and wait until it confirms or expires
    Pay {
        #[arg(long, default_value = "one-time")]
        plan: Plan,

        #[arg(long)]
        email: String,

        /// Confirm a demo session after this many seconds
        #[arg(long)]
        simulate_after: Option<u64>,
    },
    /// List recorded account upgrades
    Ledger,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = load_with_env(cli.config.as_deref())?;
    if let Some(url) = cli.backend_url {
        config.backend.base_url = url;
        validate_config(&config).map_err(ConfigError::Validation)?;
    }

    logging::init_logging(&config.observability);
    tracing::info!("btc-checkout v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());
    let ledger = open_ledger(&config, clock.clone())?;

    match cli.command {
        Commands::Ledger => print_ledger(&ledger),
        Commands::Pay {
            plan,
            email,
            simulate_after,
        } => pay(config, clock, ledger, plan, email, simulate_after).await?,
    }

    Ok(())
}

fn open_ledger(
    config: &CheckoutConfig,
    clock: Arc<dyn Clock>,
) -> Result<UpgradeLedger, Box<dyn std::error::Error>> {
    let period = config.upgrades.recurring_period();
    let ledger = match &config.upgrades.ledger_path {
        Some(path) => UpgradeLedger::load_from_file(path, clock, period)?,
        None => UpgradeLedger::new(clock, period, None),
    };
    Ok(ledger)
}

fn print_ledger(ledger: &UpgradeLedger) {
    let (active, lapsed) = ledger.get_summary();
    println!("{} account upgrades ({} active, {} lapsed)", ledger.count(), active, lapsed);
    for (email, upgrade) in ledger.entries() {
        let until = upgrade
            .expires_at_ms
            .map_or_else(|| "never".to_string(), |ms| ms.to_string());
        println!(
            "  {:<32} {:<10} sessions={} expires_at_ms={}",
            email,
            upgrade.plan.as_str(),
            upgrade.sessions.len(),
            until
        );
    }
}

async fn pay(
    config: CheckoutConfig,
    clock: Arc<dyn Clock>,
    ledger: UpgradeLedger,
    plan: Plan,
    email: String,
    simulate_after: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let backend = HttpBackend::new(config.backend.clone())?;
    let shutdown = Shutdown::new();
    shutdown.trigger_on_ctrl_c();

    let deps = ControllerDeps {
        backend: Arc::new(backend),
        finalizer: Arc::new(ledger),
        clock,
    };
    let controller = SessionController::spawn(deps, &config, shutdown.subscribe());

    let session = controller.create(plan, email).await?;
    println!("Session:  {} ({})", session.id, session.mode);
    println!("Address:  {}", session.address);
    println!(
        "Amount:   {} BTC ({} sats) @ ${}",
        session.quote.amount_btc, session.quote.amount_sats, session.quote.reference_price_usd
    );

    if let Some(secs) = simulate_after.filter(|_| session.is_demo()) {
        let controller = controller.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            if let Err(e) = controller.simulate_confirmation().await {
                tracing::warn!(error = %e, "Simulated confirmation failed");
            }
        });
    }

    let mut updates = controller.watch();
    let mut last_sats = session.quote.amount_sats;
    let outcome = loop {
        if updates.changed().await.is_err() {
            break None;
        }
        let snapshot = updates.borrow_and_update().clone();
        if let Some(session) = &snapshot.session {
            if session.quote.amount_sats != last_sats {
                last_sats = session.quote.amount_sats;
                println!("Re-quoted: {} BTC ({} sats)", session.quote.amount_btc, last_sats);
            }
        }
        if settled(&snapshot) || snapshot.state == LifecycleState::Idle {
            break Some(snapshot);
        }
    };

    match outcome {
        Some(snapshot) => report(&snapshot),
        None => println!("Interrupted"),
    }
    Ok(())
}

/// Terminal, and past the upgrade hand-off when there is one.
fn settled(snapshot: &SessionSnapshot) -> bool {
    snapshot.state.is_terminal() && snapshot.upgrade != UpgradeStatus::Pending
}

fn report(snapshot: &SessionSnapshot) {
    println!("Result:   {}", snapshot.state);
    if let Some(secret) = snapshot.session.as_ref().and_then(|s| s.unlock_secret()) {
        println!("Unlock:   {}", secret);
    }
    match &snapshot.upgrade {
        UpgradeStatus::Completed => println!("Account upgraded"),
        UpgradeStatus::Skipped => println!("Demo session, no account changes"),
        UpgradeStatus::Failed(reason) => {
            println!("Payment received but the upgrade failed ({}); contact support", reason)
        }
        _ => {}
    }
    if let Some(error) = &snapshot.last_error {
        println!("Error:    {}", error);
    }
}
