//! Fetch Demo - Tick-Driven HTTP Client
//!
//! Fetches every URL given on the command line as one batch request, printing
//! headers, progress and completions as the ticker drives them.
//!
//! # Running the Example
//!
//! ```bash
//! cargo run -p fetch-demo -- https://example.com https://example.org
//! cargo run -p fetch-demo -- --out ./downloads https://example.com/a.txt
//! ```
//!
//! Configuration comes from `TICKWIRE_*` environment variables. Set
//! `TICKWIRE_METRICS_ADDR=127.0.0.1:9000` to expose Prometheus metrics.

#![allow(missing_docs)]

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tickwire_core::{Callbacks, RequestKind};
use tickwire_runtime::metrics::MetricsServer;
use tickwire_runtime::{ManagerConfig, ReqwestTransport, RequestManager, Ticker};

/// Fetch URLs through the Tickwire request manager.
#[derive(Debug, Parser)]
#[command(version, about = "Tick-driven batch HTTP fetcher")]
struct Args {
    /// Save each body under this directory instead of logging it
    #[arg(long)]
    out: Option<PathBuf>,

    /// URLs to fetch as one batch
    #[arg(required = true)]
    urls: Vec<String>,
}

fn callbacks() -> Callbacks {
    Callbacks::new()
        .on_header(|info, head| {
            tracing::info!(url = %info.url, status = head.status, "Headers received");
        })
        .on_progress(|info, progress| {
            tracing::debug!(
                url = %info.url,
                received = progress.bytes_received,
                total = ?progress.total,
                "Progress"
            );
        })
        .on_complete(|completion| match &completion.result {
            Ok(content) => match &content.saved_to {
                Some(path) => tracing::info!(
                    url = %completion.info.url,
                    path = %path.display(),
                    "Saved"
                ),
                None => tracing::info!(
                    url = %completion.info.url,
                    status = content.status,
                    bytes = content.body.len(),
                    "Fetched"
                ),
            },
            Err(e) => tracing::error!(url = %completion.info.url, error = %e, "Failed"),
        })
        .on_all_complete(|handle| tracing::info!(%handle, "All requests finished"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ManagerConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&config.log_level)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let _metrics = match config.metrics_socket_addr() {
        Some(addr) => {
            let mut server = MetricsServer::new(addr);
            server.start()?;
            Some(server)
        }
        None => None,
    };

    let transport = ReqwestTransport::from_config(tokio::runtime::Handle::current(), &config)?;
    let manager = Arc::new(RequestManager::new(Arc::new(transport)));

    let handle = manager.register(RequestKind::Multiple, callbacks());
    match &args.out {
        Some(dir) => manager.fetch_many_to_dir(&handle, &args.urls, dir)?,
        None => manager.fetch_many(&handle, &args.urls)?,
    }
    tracing::info!(%handle, count = args.urls.len(), "Issued");

    let ticker = Ticker::spawn(Arc::clone(&manager), config.tick_interval());

    let mut poll = tokio::time::interval(Duration::from_millis(50));
    tokio::select! {
        () = async {
            while manager.contains(&handle) {
                poll.tick().await;
            }
        } => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, cancelling outstanding requests");
            if let Err(e) = manager.cancel_all() {
                tracing::warn!(error = %e, "Some requests could not be cancelled");
            }
        }
    }

    ticker.shutdown().await;
    Ok(())
}
