//! Scan every stored run for broken references and print a JSON report.
//!
//! Exits with status 1 when at least one issue is found.

use std::process::ExitCode;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use king_sim_back::{dao::sim_store::StorageBackend, services::diagnostics};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "warn".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let backend = StorageBackend::from_env();
    let store = backend
        .connect()
        .await
        .with_context(|| format!("connecting to {backend:?} storage"))?;

    let report = diagnostics::scan_store(store.as_ref())
        .await
        .context("scanning stored runs")?;
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("serializing report")?
    );

    Ok(if report.healthy {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
