// ------------------------------------------------------------
// Module declarations
// ------------------------------------------------------------
//
// Each module represents a well-defined responsibility:
//
// - config:      Configuration loaded from JSON
// - model:       Trade/Candlestick/SymbolState/ConnectionState types
// - util:        Time helpers
// - fifo:        Bounded blocking queue shared by producer and consumer
// - metrics:     Lock-free runtime diagnostics
// - output:      Per-run output file writers
// - state:       The shared AppState context
// - connection:  WebSocket session lifecycle (Connection Manager)
// - producer:    Producer loop (transport service + parse + enqueue)
// - consumer:    Consumer loop (dequeue + fold + latency logging)
// - aggregator:  Minute aggregator (candlestick/SMA/volume emission)
// - shutdown:    Interrupt-signal handling
//
mod aggregator;
mod config;
mod connection;
mod consumer;
mod fifo;
mod metrics;
mod model;
mod output;
mod producer;
mod shutdown;
mod state;
mod util;

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use anyhow::Context;
use rustls::crypto::{ring, CryptoProvider};

use config::Config;
use connection::ConnectionManager;
use output::Outputs;
use state::AppState;

// ------------------------------------------------------------
// Application entry point
// ------------------------------------------------------------
//
// This is the main runtime for the trade tick aggregator.
//
// Responsibilities:
// - Initialize logging and the rustls cryptography backend
// - Load and validate configuration
// - Open all per-run output files
// - Make the initial provider connection (a failure here is fatal)
// - Spawn the producer, consumer, and aggregator threads
// - Install the shutdown signal handler and wait for it
// - Join all threads and flush output on the way out
//
fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // --------------------------------------------------------
    // IMPORTANT:
    // rustls >= 0.23 requires an explicit CryptoProvider
    // installation. This must be executed exactly once and
    // as early as possible in the process lifecycle.
    // --------------------------------------------------------
    CryptoProvider::install_default(ring::default_provider())
        .expect("failed to install rustls CryptoProvider");

    let config_path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.json"));

    let config: Config = match Config::load(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            log::error!("fatal: {e:#}");
            std::process::exit(1);
        }
    };

    let run = || -> anyhow::Result<()> {
        let outputs = Outputs::create(&config.output_dir, &config.symbols)
            .context("opening output files")?;

        let symbols = config.symbols.clone();
        let state = Arc::new(AppState::new(config.clone(), outputs));

        // The initial connection is made synchronously here: per
        // spec.md §6, a failure to establish it is a fatal startup
        // error (same category as a file-open failure), distinct from
        // the reconnect policy the producer thread owns afterward.
        let mut conn = ConnectionManager::new(&config.provider_url, &config.provider_token, symbols);
        conn.connect(&state).context("initial connection to provider")?;

        shutdown::install(state.clone())?;

        let producer_state = state.clone();
        let producer_handle =
            thread::spawn(move || producer::run(&producer_state, conn));

        let consumer_state = state.clone();
        let consumer_handle = thread::spawn(move || consumer::run(&consumer_state));

        let aggregator_state = state.clone();
        let aggregator_handle = thread::spawn(move || aggregator::run(&aggregator_state));

        producer_handle.join().expect("producer thread panicked");
        consumer_handle.join().expect("consumer thread panicked");
        aggregator_handle.join().expect("aggregator thread panicked");

        state
            .outputs
            .lock()
            .unwrap()
            .flush_all()
            .context("flushing output files")?;

        Ok(())
    };

    if let Err(e) = run() {
        log::error!("fatal: {e:#}");
        std::process::exit(1);
    }

    log::info!("shutdown complete");
    Ok(())
}
