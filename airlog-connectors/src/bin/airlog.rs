//! airlog command-line entry point
//!
//! ```bash
//! airlog --cfg /etc/airlog/lab.yaml
//! RUST_LOG=airlog_core=debug airlog -o capture.json
//! ```
//!
//! Exit codes: 0 after Ctrl-C, 1 for configuration errors, 2 when the device's
//! source fails.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use airlog_connectors::{Broker, ConnectorError, LoggerConfig};
use clap::Parser;

#[derive(Parser)]
#[command(name = "airlog")]
#[command(version, about = "Reads one sensor and hands its records to the configured writers", long_about = None)]
struct Cli {
    /// Path to the configuration file (.json, .yaml, .yml)
    #[arg(short = 'o', long = "cfg")]
    cfg: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let broker = match LoggerConfig::load(&cli.cfg).and_then(|config| Broker::from_config(&config)) {
        Ok(broker) => broker,
        Err(e) => {
            log::error!("{}: {}", cli.cfg.display(), e);
            return ExitCode::from(1);
        }
    };

    let stop = Arc::new(AtomicBool::new(false));
    let interrupted = Arc::clone(&stop);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, closing main loop");
            interrupted.store(true, Ordering::Relaxed);
        }
    });

    let run = tokio::task::spawn_blocking(move || {
        let mut broker = broker;
        broker.run_until(|| stop.load(Ordering::Relaxed))
    })
    .await;

    match run {
        Ok(Ok(_)) => ExitCode::SUCCESS,
        Ok(Err(ConnectorError::Acquisition(e))) => {
            log::error!("{}", e);
            ExitCode::from(2)
        }
        Ok(Err(e)) => {
            log::error!("{}", e);
            ExitCode::from(1)
        }
        Err(e) => {
            log::error!("Acquisition task failed: {}", e);
            ExitCode::from(1)
        }
    }
}
