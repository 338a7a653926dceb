use std::sync::Arc;

use anyhow::bail;
use booking_wifi_score::{ScrapingConfig, ScrapingContext, run_scraping_job};
use dotenv::dotenv;
use log::{LevelFilter, error, info, warn};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    let config = ScrapingConfig::from_env()?;
    info!(
        "=== BOOKING.COM WIFI SCORE SCRAPER === destinations: {:?}, workers: {}, batch size: {}",
        config.destinations, config.num_workers, config.batch_size
    );
    let ctx = Arc::new(ScrapingContext::new(config)?);

    // First Ctrl-C: discovery stops and workers flush their pending batch.
    // Second Ctrl-C: exit immediately.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("Interrupted, flushing pending results (press Ctrl-C again to exit now)");
        let _ = shutdown_tx.send(true);
        if tokio::signal::ctrl_c().await.is_ok() {
            error!("Interrupted again, exiting without flushing");
            std::process::exit(130);
        }
    });

    let report = match run_scraping_job(ctx, shutdown_rx).await {
        Ok(report) => report,
        Err(e) => {
            error!("Scraping run failed: {e:#}");
            return Err(e);
        }
    };

    info!("=== SCRAPING COMPLETED ===");
    info!(
        "Discovered {} properties, processed {}, failed {}",
        report.discovered, report.processed, report.failed
    );
    match report.average_wifi_score {
        Some(avg) => info!(
            "Average WiFi score: {avg:.2} over {} properties",
            report.wifi_scores_seen
        ),
        None => info!("No WiFi scores collected"),
    }
    if let Some(path) = &report.output_path {
        info!("Results saved to: {}", path.display());
    }
    if report.failed_workers > 0 {
        bail!("{} workers failed, results may be incomplete", report.failed_workers);
    }
    Ok(())
}
