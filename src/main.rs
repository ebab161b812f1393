//! Pair-capture engine entry point.

use std::net::SocketAddr;

use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::io::BufReader;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use paircap::api::{create_router, AppState};
use paircap::config::EngineConfig;
use paircap::error::EngineError;
use paircap::market::{FixedIntervalClock, JsonLinesQuoteSource};
use paircap::metrics;
use paircap::runner::Supervisor;
use paircap::utils::shutdown_signal;

/// Maker pair-capture engine for short Up/Down windows.
#[derive(Parser, Debug)]
#[command(name = "paircap")]
#[command(about = "Paper-trade a maker pair-capture strategy on two-outcome windows")]
#[command(version)]
struct Args {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the engine on JSON-lines quotes read from stdin (default).
    Run {
        /// HTTP server port for health/metrics/status.
        #[arg(short, long)]
        port: Option<u16>,

        /// Market name used in logs and the status API.
        #[arg(short, long, default_value = "btc")]
        market: String,
    },

    /// Load, validate and print the configuration.
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    let filter = if args.verbose {
        EnvFilter::new("paircap=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    if args.json_logs {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    match args.command {
        Some(Command::CheckConfig) => cmd_check_config(),
        Some(Command::Run { port, market }) => cmd_run(port, market).await,
        None => cmd_run(None, "btc".to_string()).await,
    }
}

fn load_config() -> paircap::Result<EngineConfig> {
    let config = EngineConfig::load().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        EngineError::from(e)
    })?;

    config.validate().map_err(|e| {
        error!("Invalid configuration: {}", e);
        EngineError::InvalidConfig(e)
    })?;

    Ok(config)
}

/// Check configuration validity.
fn cmd_check_config() -> anyhow::Result<()> {
    println!("======================================================================");
    println!("PAIRCAP - CONFIGURATION CHECK");
    println!("======================================================================");

    print!("Loading configuration... ");
    let config = match EngineConfig::load() {
        Ok(c) => {
            println!("OK");
            c
        }
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration load failed"));
        }
    };

    print!("Validating configuration... ");
    match config.validate() {
        Ok(()) => println!("OK"),
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration validation failed"));
        }
    }

    println!("----------------------------------------------------------------------");
    println!("Configuration Summary:");
    println!(
        "  Edge floor (normal/rescue): {} / {}",
        config.edge_floor, config.edge_floor_rescue
    );
    println!("  Initial edge target: {}", config.initial_edge_target);
    println!("  Loss cap: ${}", config.loss_cap);
    println!("  Clip size: {} shares", config.clip_size);
    println!(
        "  Quote lifecycle: min {}ms, {} cancels/window, improvement > {}",
        config.min_quote_lifetime_ms, config.max_cancels_per_window, config.min_price_improvement
    );
    println!(
        "  Fill models: persistent {} ticks, queue {} ticks / {} depletion / {} fill",
        config.persistent_ticks,
        config.queue_persist_ticks,
        config.queue_depletion_ratio,
        config.queue_fill_fraction
    );
    println!(
        "  Timeline: stop entries at {}s, force stop at {}s",
        config.stop_new_entries_secs, config.force_stop_secs
    );
    println!(
        "  Windows: {}-<start> every {}s",
        config.window_slug_prefix, config.window_duration_secs
    );
    println!(
        "  Run: track {} until {} first legs (verdict needs {})",
        config.tracking_model, config.target_first_leg_fills, config.min_first_leg_fills
    );
    println!("  Max run time: {} minutes (0 = unlimited)", config.max_run_minutes);
    println!("======================================================================");
    println!("CONFIGURATION CHECK PASSED");
    println!("======================================================================");

    Ok(())
}

/// Run the engine on stdin quotes until the fill target, end of input or Ctrl-C.
async fn cmd_run(port_override: Option<u16>, market: String) -> anyhow::Result<()> {
    info!("Loading configuration...");
    let mut config = load_config()?;
    if let Some(port) = port_override {
        config.port = port;
    }

    // Initialize metrics
    let prometheus = PrometheusBuilder::new().install_recorder()?;
    metrics::init_metrics();

    info!("Configuration loaded successfully");
    info!(
        "Edge floor: {} (rescue {})",
        config.edge_floor, config.edge_floor_rescue
    );
    info!("Loss cap: ${}", config.loss_cap);
    info!("Tracking model: {}", config.tracking_model);

    let app_state = AppState::new().with_prometheus(prometheus);

    // Start HTTP server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);

    let router = create_router(app_state.clone());
    let (server_stop_tx, server_stop_rx) = oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = server_stop_rx.await;
            })
            .await
    });

    let clock = FixedIntervalClock::new(
        config.window_slug_prefix.clone(),
        config.window_duration_secs,
    );
    let source = JsonLinesQuoteSource::new(BufReader::new(tokio::io::stdin()));

    let mut supervisor = Supervisor::new(config, app_state)?;
    supervisor.spawn_market(market, source, clock);

    info!("Reading quotes from stdin...");
    let summary = supervisor.run(shutdown_signal()).await;

    println!("======================================================================");
    println!("RUN SUMMARY");
    println!("======================================================================");
    println!("{summary}");
    println!("======================================================================");

    match serde_json::to_string(&summary) {
        Ok(json) => info!(target: "paircap::summary", "{json}"),
        Err(e) => warn!(error = %e, "Run summary not serializable"),
    }

    let _ = server_stop_tx.send(());
    match server_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "HTTP server error"),
        Err(e) => warn!(error = %e, "HTTP server task failed"),
    }

    info!("Shutdown complete");
    Ok(())
}
