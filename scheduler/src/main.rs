//! Main entry point for the scheduler binary
//!
//! Wires the scheduling core to in-process stand-ins for the bus and the
//! store. A production deployment swaps those for the real message broker
//! and database bindings behind the same traits.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;

use scheduler::{
    services::{InProcessBus, MemoryStore},
    Scheduler, SchedulerConfig, SchedulerResult,
};
use shared::logging;

/// Scheduling core of the solver platform
#[derive(Parser)]
#[command(name = "scheduler")]
#[command(about = "Dispatches solver jobs to remote workers over the message bus")]
pub struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Seconds between solver health sweeps
    #[arg(long, default_value_t = 300)]
    pub sweep_secs: u64,

    /// Seconds an unanswered health probe may stay outstanding before its
    /// solver is evicted
    #[arg(long, default_value_t = 3600)]
    pub probe_grace_secs: u64,

    /// Upper bound in seconds on correlation RPC waits (waits indefinitely
    /// when omitted)
    #[arg(long)]
    pub rpc_timeout_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> SchedulerResult<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    logging::init_tracing(Some(&args.log_level));
    logging::log_startup("scheduler service");

    let config = SchedulerConfig {
        sweep_interval: Duration::from_secs(args.sweep_secs),
        probe_grace: Duration::from_secs(args.probe_grace_secs),
        rpc_timeout: args.rpc_timeout_secs.map(Duration::from_secs),
    };

    // Create the scheduler with dependency injection
    let transport = Arc::new(InProcessBus::new());
    let store = MemoryStore::new();
    let mut scheduler = Scheduler::new(config, store, Arc::clone(&transport));

    scheduler.initialize().await?;

    // Set up graceful shutdown
    let shutdown_sender = scheduler.shutdown_sender();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                logging::log_shutdown("Received Ctrl+C signal");
                let _ = shutdown_sender.send(()).await;
            }
            Err(err) => {
                logging::log_error("Signal handling", &err);
            }
        }
    });

    // Run main event loop
    scheduler.run().await?;

    logging::log_success("Scheduler stopped gracefully");
    Ok(())
}
