mod config;
mod logging;

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::Parser;
use color_eyre::eyre::{eyre, Context, Result};

use stat_core::header::AsciiHeader;
use stat_core::scalar_publisher::ScalarPublisher;
use stat_core::segment::InMemorySegmentProducer;
use stat_core::state_machine::ApplicationManager;

use config::CliOptions;

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Minimal stand-in for the real shared-memory transport: replays whatever
/// the config file describes, then signals end-of-data immediately. Lets
/// the lifecycle run end-to-end without a linked ring-buffer implementation.
fn build_producer(header: &AsciiHeader) -> InMemorySegmentProducer {
    InMemorySegmentProducer::new(header.clone(), header.clone())
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let options = CliOptions::parse();
    logging::init(&options);

    let config_path = options
        .config_file
        .as_ref()
        .ok_or_else(|| eyre!("-f FILE is required in this driver (RPC monitoring is not wired up)"))?;

    let header = AsciiHeader::load_from_file(config_path)
        .wrap_err_with(|| format!("failed to load configuration from {}", config_path.display()))?;

    let producer = build_producer(&header);
    let manager = Arc::new(Mutex::new(ApplicationManager::new(producer)));

    {
        let mut guard = manager.lock().expect("state machine lock poisoned");
        guard.configure_beam(header.clone()).wrap_err("configure_beam failed")?;
        guard.configure_scan(header.clone(), 256).wrap_err("configure_scan failed")?;
        guard
            .register_publisher(Box::new(ScalarPublisher::new()))
            .wrap_err("failed to register scalar publisher")?;
        guard.start_scan(header.clone(), || Ok(None)).wrap_err("start_scan failed")?;
    }

    install_signal_handler();

    let timeout = options.timeout_secs.map(Duration::from_secs);
    wait_for_shutdown(timeout);

    let mut guard = manager.lock().expect("state machine lock poisoned");
    guard.stop_scan().wrap_err("stop_scan failed")?;
    guard.deconfigure_scan().wrap_err("deconfigure_scan failed")?;
    guard.deconfigure_beam().wrap_err("deconfigure_beam failed")?;

    Ok(())
}

/// First SIGINT/SIGTERM requests a graceful shutdown; a second exits
/// immediately, matching the termination-signal propagation rule.
fn install_signal_handler() {
    let signal_count = Arc::new(AtomicU8::new(0));
    ctrlc::set_handler(move || {
        let count = signal_count.fetch_add(1, Ordering::SeqCst) + 1;
        if count == 1 {
            log::warn!("termination signal received, shutting down gracefully");
            SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
        } else {
            log::warn!("second termination signal received, exiting immediately");
            std::process::exit(1);
        }
    })
    .expect("failed to install signal handler");
}

fn wait_for_shutdown(timeout: Option<Duration>) {
    let start = std::time::Instant::now();
    while !SHUTDOWN_REQUESTED.load(Ordering::SeqCst) {
        if let Some(timeout) = timeout {
            if start.elapsed() >= timeout {
                log::info!("self-termination timeout elapsed");
                break;
            }
        }
        std::thread::sleep(Duration::from_millis(100));
    }
}
