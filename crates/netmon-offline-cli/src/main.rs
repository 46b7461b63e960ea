//! netmon-offline - command line host for the network monitor's offline cache.
//!
//! Each invocation plays one event against a disk-backed cache store:
//! install/activate a version, answer a request, or deliver a push message.

mod cli;
mod console;

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use netmon_offline_core::{
    ActivationReport, DiskStorage, HttpNetwork, LifecycleState, Network, OfflineConfig, Worker,
};
use reqwest::{header, Method};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{CliArgs, Command};
use console::{ConsoleClients, ConsoleNotifier, Disconnected};

/// Initialize the tracing subscriber for logging
fn init_tracing(verbose: bool) {
    // RUST_LOG wins over --verbose when set
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args = CliArgs::parse();
    init_tracing(args.verbose);

    let mut config = match OfflineConfig::load() {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "Failed to load config, using defaults");
            OfflineConfig::default()
        }
    };
    if let Some(origin) = args.origin.clone() {
        config.origin = origin;
    }
    config.validate().context("Invalid configuration")?;

    let cache_dir = match args.cache_dir.clone() {
        Some(dir) => dir,
        None => config.cache_dir()?,
    };
    debug!(?cache_dir, "Cache directory configured");

    let offline = matches!(args.command, Command::Fetch { offline: true, .. });
    let network: Arc<dyn Network> = if offline {
        Arc::new(Disconnected)
    } else {
        Arc::new(HttpNetwork::new(Duration::from_secs(config.request_timeout_secs))?)
    };
    let storage = Arc::new(
        DiskStorage::new(cache_dir.clone())
            .with_context(|| format!("Failed to open cache store at {}", cache_dir.display()))?,
    );
    let clients = Arc::new(ConsoleClients {
        origin: config.origin.clone(),
    });
    let worker = Worker::new(config, storage, network, Arc::new(ConsoleNotifier), clients)?;

    let result = run(&worker, args.command).await;

    // Never exit with a cache write or notification still in flight.
    let settled = worker.settle().await;
    debug!(settled, "Detached work finished");
    result
}

async fn run(worker: &Worker, command: Command) -> Result<()> {
    match command {
        Command::Install => {
            worker.install().await.context("Install failed")?;
            let status = worker.status().await?;
            println!("Installed {} ({} entries)", status.version, status.entries);
            println!("Run `netmon-offline activate` to take control.");
        }
        Command::Activate => {
            if worker.restore().await? == LifecycleState::Uninstalled {
                bail!(
                    "cache version {} is not installed; run `netmon-offline start` first",
                    worker.config().cache_version
                );
            }
            let report = worker.activate().await?;
            print_report(&report);
        }
        Command::Start => match worker.start().await.context("Install failed")? {
            Some(report) => print_report(&report),
            None => println!("Installed, waiting for activation"),
        },
        Command::Fetch {
            path,
            method,
            accept,
            offline: _,
            output,
        } => {
            let state = worker.restore().await?;
            if state != LifecycleState::Active {
                warn!(
                    state = state.display_name(),
                    "Cache version not active, request passes through uncached"
                );
            }
            let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                .with_context(|| format!("Invalid method {:?}", method))?;
            let mut request = worker.request(method, &path)?;
            if let Some(accept) = accept {
                request = request.with_header(header::ACCEPT, &accept)?;
            }

            let response = worker.fetch(request).await?;
            eprintln!(
                "{} {}",
                response.status,
                response.content_type().unwrap_or("(no content type)")
            );
            match output {
                Some(file) => {
                    std::fs::write(&file, &response.body)
                        .with_context(|| format!("Failed to write {}", file.display()))?;
                    info!(bytes = response.body.len(), file = %file.display(), "Response body written");
                }
                None => {
                    let mut stdout = io::stdout().lock();
                    stdout.write_all(&response.body)?;
                    stdout.flush()?;
                }
            }
        }
        Command::Push { payload, click } => {
            let notification = worker.push(payload.as_deref().map(str::as_bytes));
            if click {
                worker.settle().await;
                worker.notification_click(&notification);
            }
        }
        Command::Status => {
            worker.restore().await?;
            let status = worker.status().await?;
            println!("Origin:   {}", worker.config().origin);
            println!("Version:  {}", status.version);
            println!("State:    {}", status.state.display_name());
            println!("Entries:  {}", status.entries);
            if status.stored_versions.is_empty() {
                println!("Stored:   (none)");
            } else {
                println!("Stored:   {}", status.stored_versions.join(", "));
            }
        }
        Command::InitConfig => {
            worker.config().save().context("Failed to save config")?;
            println!("{}", serde_json::to_string_pretty(worker.config())?);
        }
    }
    Ok(())
}

fn print_report(report: &ActivationReport) {
    println!("Active.");
    for name in &report.deleted {
        println!("  removed stale version {}", name);
    }
    for name in &report.failed {
        println!("  could not remove {}", name);
    }
    if !report.claimed {
        println!("  clients were not claimed");
    }
}
