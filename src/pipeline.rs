use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::Local;
use futures::stream::{FuturesUnordered, StreamExt};
use log::{error, info, warn};
use tokio::sync::watch;

use crate::{
    error::ScrapeError,
    output::{ResultsWriter, output_file_name},
    property::PropertyRecord,
    property_scraper::PropertyScraper,
    scraper::Scraper,
    scraping_context::ScrapingContext,
    search_scraper::SearchResultsScraper,
    utils::partition_into_chunks,
};

/// Per-worker tally.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkerReport {
    pub worker_id: usize,
    pub processed: usize,
    pub failed: usize,
    pub wifi_scores_seen: usize,
    pub wifi_score_total: f64,
}

impl WorkerReport {
    fn record(&mut self, record: &PropertyRecord) {
        self.processed += 1;
        if let Some(score) = record.wifi_score {
            self.wifi_scores_seen += 1;
            self.wifi_score_total += score;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub output_path: Option<PathBuf>,
    pub discovered: usize,
    pub processed: usize,
    pub failed: usize,
    pub failed_workers: usize,
    pub wifi_scores_seen: usize,
    pub average_wifi_score: Option<f64>,
}

impl RunReport {
    fn from_workers(
        output_path: PathBuf,
        discovered: usize,
        reports: &[WorkerReport],
        failed_workers: usize,
    ) -> Self {
        let wifi_scores_seen: usize = reports.iter().map(|r| r.wifi_scores_seen).sum();
        let wifi_score_total: f64 = reports.iter().map(|r| r.wifi_score_total).sum();
        RunReport {
            output_path: Some(output_path),
            discovered,
            processed: reports.iter().map(|r| r.processed).sum(),
            failed: reports.iter().map(|r| r.failed).sum(),
            failed_workers,
            wifi_scores_seen,
            average_wifi_score: (wifi_scores_seen > 0)
                .then(|| wifi_score_total / wifi_scores_seen as f64),
        }
    }
}

pub async fn run_property_url_collection_job(
    ctx: &ScrapingContext,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<Vec<String>> {
    let config = &ctx.scraping_config;
    info!("Generating URLs for: {:?}", config.destinations);
    let mut scraper =
        SearchResultsScraper::new(config.destinations.clone(), config.effective_max_properties())
            .with_shutdown(shutdown);
    let urls = scraper.scrape(ctx).await?;
    info!("Found {} properties", urls.len());
    Ok(urls)
}

/// Scrapes `urls` in order, appending to `writer` every `batch_size` records
/// and once more at the end. Stops early, after flushing, when `shutdown`
/// flips to true.
pub async fn run_worker(
    ctx: Arc<ScrapingContext>,
    writer: Arc<ResultsWriter>,
    urls: Vec<String>,
    worker_id: usize,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<WorkerReport> {
    let prefix = format!("Worker {worker_id}: ");
    let batch_size = ctx.scraping_config.batch_size;
    let total = urls.len();
    info!("{prefix}Starting with {total} properties");

    let mut report = WorkerReport {
        worker_id,
        ..WorkerReport::default()
    };
    let mut batch = Vec::with_capacity(batch_size);

    for (i, url) in urls.iter().enumerate() {
        let interrupted = *shutdown.borrow();
        if interrupted {
            warn!("{prefix}Interrupted");
            break;
        }

        let mut scraper = PropertyScraper::new(url, &prefix);
        let record = match scraper.scrape(&ctx).await {
            Ok(record) => record,
            Err(e) => {
                warn!("{prefix}Error scraping {url}: {e:#}");
                report.failed += 1;
                PropertyRecord::new(url)
            }
        };
        report.record(&record);
        batch.push(record);

        if batch.len() >= batch_size {
            writer.append(&batch).await?;
            batch.clear();
            info!("{prefix}Progress: {}/{total}", i + 1);
        }
    }

    writer.append(&batch).await?;
    info!("{prefix}Completed - processed {} properties", report.processed);
    Ok(report)
}

/// Discovers property URLs and scrapes them with the configured number of
/// workers. Returns an empty report, without creating an output file, when
/// no properties were found or `shutdown` flipped during discovery. Fails
/// when a worker could not write its results.
pub async fn run_scraping_job(
    ctx: Arc<ScrapingContext>,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<RunReport> {
    let config = &ctx.scraping_config;
    let started_at = Local::now();

    let property_urls = run_property_url_collection_job(&ctx, shutdown.clone()).await?;
    let interrupted = *shutdown.borrow();
    if interrupted {
        warn!("Interrupted during discovery, no properties scraped");
        return Ok(RunReport {
            discovered: property_urls.len(),
            ..RunReport::default()
        });
    }
    if property_urls.is_empty() {
        warn!("No properties found");
        warn!(
            "Possible reasons: Booking.com changed its HTML structure, anti-bot detection is \
             blocking requests, or the search returned no results"
        );
        warn!(
            "Try routing through a proxy (PROXY_URL), lowering REQUESTS_PER_SECOND, or checking \
             the destinations on Booking.com"
        );
        return Ok(RunReport::default());
    }

    let chunks = partition_into_chunks(&property_urls, config.num_workers);
    info!(
        "Divided into {} chunks: {:?}",
        chunks.len(),
        chunks.iter().map(Vec::len).collect::<Vec<_>>()
    );

    let file_name = output_file_name(
        &config.destinations,
        config.is_single_worker(),
        config.output_format,
        started_at,
    );
    let writer = ResultsWriter::create(
        Path::new(&config.output_dir),
        &file_name,
        config.output_format,
    )
    .await?;
    let writer = Arc::new(writer);

    let mut workers = chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| {
            let worker_id = i + 1;
            let handle = tokio::spawn(run_worker(
                ctx.clone(),
                writer.clone(),
                chunk,
                worker_id,
                shutdown.clone(),
            ));
            async move { (worker_id, handle.await) }
        })
        .collect::<FuturesUnordered<_>>();

    let mut reports = vec![];
    let mut failed_workers = 0;
    let mut write_error = None;
    while let Some((worker_id, result)) = workers.next().await {
        match result {
            Ok(Ok(report)) => {
                info!("Worker {worker_id} completed successfully");
                reports.push(report);
            }
            Ok(Err(e)) => {
                error!("Worker {worker_id} failed: {e:#}");
                failed_workers += 1;
                let is_write_error = matches!(
                    e.downcast_ref::<ScrapeError>(),
                    Some(ScrapeError::OutputWrite { .. })
                );
                if is_write_error && write_error.is_none() {
                    write_error = Some(e);
                }
            }
            Err(e) => {
                error!("Worker {worker_id} panicked: {e}");
                failed_workers += 1;
            }
        }
    }

    if let Some(e) = write_error {
        return Err(e);
    }

    let report = RunReport::from_workers(
        writer.path().to_path_buf(),
        property_urls.len(),
        &reports,
        failed_workers,
    );
    info!("Results saved to: {}", writer.path().display());
    Ok(report)
}
