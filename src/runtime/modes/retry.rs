//! One-shot retry pass, for cron-style deployments without the server

use anyhow::{Context, Result};
use colored::Colorize;
use tracing::info;

use crate::runtime::lifetime::startup::prepare_services;

pub async fn run_retry_once() -> Result<()> {
    let services = prepare_services().await?;

    let report = services
        .retry_worker
        .run_once()
        .await
        .context("Retry pass failed")?;

    info!("Retry pass finished: {:?}", report);
    println!(
        "{} scanned {}, unrecorded {}, attempted {}, sent {}, failed {}, errors {}",
        "[retry]".green().bold(),
        report.scanned,
        report.unrecorded,
        report.attempted,
        report.sent.to_string().green(),
        report.failed.to_string().yellow(),
        report.errors.to_string().red()
    );
    Ok(())
}
