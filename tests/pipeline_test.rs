mod common;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use booking_wifi_score::{
    OutputFormat, ScrapeError, Scraper, ScrapingConfig, ScrapingContext, SearchResultsScraper,
    TravelerReviewScraper, output::ResultsWriter, pipeline::run_worker, property::CSV_COLUMNS,
    reviews::TravelerScores, run_scraping_job,
};
use chrono::Local;
use common::{MockHttpServer, MockResponse, fixture};
use tokio::sync::watch;

const GEOCODER_AGENT: &str = "booking-wifi-score-tests/1.0";
const CAPTCHA_PAGE: &str = "<html><body>Please verify you are human. CAPTCHA</body></html>";

fn booking_router(path: &str, query: &HashMap<String, String>) -> MockResponse {
    let param = |name: &str| query.get(name).map(String::as_str).unwrap_or_default();
    match path {
        "/searchresults.html" => match (param("ss"), param("offset")) {
            ("Marrakech", "0") => MockResponse::html(fixture("search_marrakech_page1.html")),
            ("Marrakech", "25") => MockResponse::html(fixture("search_marrakech_page2.html")),
            ("Atlantis", _) => MockResponse::html(fixture("search_no_results.html")),
            ("Fes", _) => MockResponse::html(CAPTCHA_PAGE),
            ("Agadir", _) => MockResponse::status(500),
            _ => MockResponse::html("<html><body></body></html>"),
        },
        "/hotel/ma/riad-anika.html" => MockResponse::html(fixture("property_riad_anika.html")),
        "/hotel/ma/dar-bahia.html" => MockResponse::html(fixture("property_dar_bahia.html")),
        "/reviewlist.html" => match (param("pagename"), param("customer_type"), param("offset")) {
            ("riad-anika", "ALL", "0") => {
                MockResponse::html(fixture("reviews_riad_anika_all_page1.html"))
            }
            ("riad-anika", "ALL", "10") => {
                MockResponse::html(fixture("reviews_riad_anika_all_page2.html"))
            }
            ("riad-anika", "BUSINESS_TRAVELLERS", "0") => {
                MockResponse::html(fixture("reviews_riad_anika_business.html"))
            }
            _ => MockResponse::html(
                "<html><body><div id=\"reviewCardsSection\"></div></body></html>",
            ),
        },
        "/nominatim/reverse" => MockResponse::json(fixture("nominatim_marrakech.json")),
        _ => MockResponse::not_found(),
    }
}

fn test_config(
    server: &MockHttpServer,
    destinations: &[&str],
    output_dir: &Path,
) -> ScrapingConfig {
    ScrapingConfig {
        destinations: destinations.iter().map(|d| d.to_string()).collect(),
        max_properties: 50,
        num_workers: 2,
        batch_size: 1,
        output_dir: output_dir.to_string_lossy().into_owned(),
        output_format: OutputFormat::Csv,
        booking_base_url: server.url(),
        nominatim_url: format!("{}/nominatim", server.url()),
        max_review_pages: 5,
        requests_per_second: 1000,
        min_request_interval: Duration::ZERO,
        request_timeout: Duration::from_secs(5),
        max_retries: 2,
        retry_base_delay: Duration::from_millis(10),
        geocoder_user_agent: GEOCODER_AGENT.to_string(),
        ..ScrapingConfig::default()
    }
}

fn property_url(server: &MockHttpServer, slug: &str) -> String {
    format!("{}/hotel/ma/{slug}.html", server.url())
}

fn slug_of(url: &str) -> String {
    url.rsplit('/')
        .next()
        .and_then(|tail| tail.split('.').next())
        .unwrap()
        .to_string()
}

fn read_rows(path: &Path) -> HashMap<String, csv::StringRecord> {
    let mut reader = csv::Reader::from_path(path).unwrap();
    let headers = reader.headers().unwrap().clone();
    assert_eq!(headers.iter().collect::<Vec<_>>(), CSV_COLUMNS.to_vec());
    reader
        .records()
        .map(|r| r.unwrap())
        .map(|row| (slug_of(&row[2]), row))
        .collect()
}

fn column<'a>(row: &'a csv::StringRecord, name: &str) -> &'a str {
    let idx = CSV_COLUMNS.iter().position(|c| *c == name).unwrap();
    &row[idx]
}

fn float_column(row: &csv::StringRecord, name: &str) -> f64 {
    column(row, name).parse().unwrap()
}

fn line_count(path: &Path) -> usize {
    std::fs::read_to_string(path)
        .map(|contents| contents.lines().count())
        .unwrap_or(0)
}

#[tokio::test]
async fn scrapes_destinations_into_one_csv() {
    let server = MockHttpServer::start(booking_router).await;
    let output_dir = tempfile::tempdir().unwrap();
    let config = test_config(&server, &["Marrakech", "Atlantis"], output_dir.path());
    let ctx = Arc::new(ScrapingContext::new(config).unwrap());
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let report = run_scraping_job(ctx, shutdown_rx).await.unwrap();

    assert_eq!(report.discovered, 3);
    assert_eq!(report.processed, 3);
    assert_eq!(report.failed, 1);
    assert_eq!(report.failed_workers, 0);
    assert_eq!(report.wifi_scores_seen, 1);
    assert_eq!(report.average_wifi_score, Some(7.6));

    let output_path = report.output_path.clone().unwrap();
    assert!(output_path.starts_with(output_dir.path()));
    let file_name = output_path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(file_name.starts_with("booking_properties_marrakech-atlantis_"));
    assert!(file_name.ends_with(".csv"));

    let rows = read_rows(&output_path);
    assert_eq!(rows.len(), 3);

    let anika = &rows["riad-anika"];
    assert_eq!(column(anika, "category"), "Riad");
    assert_eq!(float_column(anika, "general_review"), 8.9);
    assert_eq!(column(anika, "general_review_count"), "1024");
    assert_eq!(float_column(anika, "comfort_score"), 9.0);
    assert_eq!(float_column(anika, "value_score"), 8.4);
    assert_eq!(float_column(anika, "location_score"), 9.3);
    assert_eq!(float_column(anika, "wifi_score"), 7.6);
    assert_eq!(column(anika, "wifi_speed"), "65 Mbps");
    assert_eq!(column(anika, "min_price"), "980");
    assert_eq!(column(anika, "max_price"), "1450");
    assert_eq!(float_column(anika, "latitude"), 31.6295);
    assert_eq!(float_column(anika, "longitude"), -7.9811);
    // Untyped review cards are left out of the aggregate.
    assert_eq!(float_column(anika, "avg_review_score_all"), 8.0);
    assert_eq!(column(anika, "avg_review_score_all_count"), "3");
    assert_eq!(float_column(anika, "avg_review_score_couples"), 9.0);
    assert_eq!(float_column(anika, "avg_review_score_families"), 7.0);
    assert_eq!(float_column(anika, "avg_review_score_solo_travelers"), 8.0);
    assert_eq!(float_column(anika, "avg_review_score_business_travellers"), 6.0);
    assert_eq!(column(anika, "avg_review_score_business_travellers_count"), "1");
    assert_eq!(column(anika, "zone"), "Medina");
    assert_eq!(column(anika, "city"), "Marrakesh");
    assert!(column(anika, "address").starts_with("Riad Anika  Derb Sidi Bouloukat"));

    let bahia = &rows["dar-bahia"];
    assert_eq!(column(bahia, "category"), "Apartment");
    assert_eq!(column(bahia, "min_price"), "700");
    assert_eq!(column(bahia, "wifi_speed"), "Not specified");
    assert_eq!(column(bahia, "wifi_score"), "0");
    assert_eq!(column(bahia, "avg_review_score_all_count"), "0");
    assert_eq!(column(bahia, "latitude"), "");
    assert_eq!(column(bahia, "city"), "");

    // A property page that fails to load still leaves a row behind.
    let gone = &rows["kasbah-gone"];
    assert_eq!(column(gone, "category"), "");
    assert_eq!(column(gone, "general_review"), "0");
    assert!(!column(gone, "property_id").is_empty());

    let marrakech_searches: Vec<_> = server
        .requests_to("/searchresults.html")
        .into_iter()
        .filter(|r| r.query.get("ss").map(String::as_str) == Some("Marrakech"))
        .collect();
    assert_eq!(marrakech_searches.len(), 2);
    assert_eq!(marrakech_searches[0].query["rows"], "25");

    let geocode_requests = server.requests_to("/nominatim/reverse");
    assert_eq!(geocode_requests.len(), 1);
    assert_eq!(geocode_requests[0].user_agent.as_deref(), Some(GEOCODER_AGENT));
    assert_eq!(geocode_requests[0].query["lat"], "31.6295");

    let business_passes = server
        .requests_to("/reviewlist.html")
        .into_iter()
        .filter(|r| {
            r.query.get("customer_type").map(String::as_str) == Some("BUSINESS_TRAVELLERS")
        })
        .count();
    assert_eq!(business_passes, 1);
}

#[tokio::test]
async fn no_properties_means_no_output_file() {
    let server = MockHttpServer::start(booking_router).await;
    let tmp = tempfile::tempdir().unwrap();
    let output_dir = tmp.path().join("results");
    let config = test_config(&server, &["Atlantis"], &output_dir);
    let ctx = Arc::new(ScrapingContext::new(config).unwrap());
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let report = run_scraping_job(ctx, shutdown_rx).await.unwrap();

    assert_eq!(report.discovered, 0);
    assert_eq!(report.output_path, None);
    assert!(!output_dir.exists());
    assert!(server.requests_to("/hotel/ma/riad-anika.html").is_empty());
}

#[tokio::test]
async fn blocked_or_failing_destination_does_not_stop_the_next() {
    let server = MockHttpServer::start(booking_router).await;
    let tmp = tempfile::tempdir().unwrap();
    let ctx =
        ScrapingContext::new(test_config(&server, &["Fes", "Agadir", "Marrakech"], tmp.path()))
            .unwrap();

    let mut scraper = SearchResultsScraper::new(ctx.scraping_config.destinations.clone(), 50);
    let urls = scraper.scrape(&ctx).await.unwrap();

    let slugs: Vec<String> = urls.iter().map(|u| slug_of(u)).collect();
    assert_eq!(slugs, vec!["riad-anika", "dar-bahia", "kasbah-gone"]);

    let searches_for = |city: &str| {
        server
            .requests_to("/searchresults.html")
            .into_iter()
            .filter(|r| r.query.get("ss").map(String::as_str) == Some(city))
            .count()
    };
    // Blocked on the first page, so no further pages are tried.
    assert_eq!(searches_for("Fes"), 1);
    // One request per retry attempt, then the destination is given up.
    assert_eq!(searches_for("Agadir"), 2);
    assert_eq!(searches_for("Marrakech"), 2);
}

#[tokio::test]
async fn review_pages_stop_at_the_configured_cap() {
    let server = MockHttpServer::start(booking_router).await;
    let tmp = tempfile::tempdir().unwrap();
    let mut config = test_config(&server, &["Marrakech"], tmp.path());
    config.max_review_pages = 1;
    let ctx = ScrapingContext::new(config).unwrap();

    let mut reviews = TravelerReviewScraper::new(&property_url(&server, "riad-anika"), "");
    let scores: TravelerScores = reviews.scrape(&ctx).await.unwrap();

    // Only the first page of the ALL pass: Couple 9 and Family 7.
    let all = scores.all.unwrap();
    assert_eq!((all.average, all.count), (8.0, 2));
    assert_eq!(scores.solo_travelers, None);
    assert_eq!(scores.business_travellers.map(|b| b.average), Some(6.0));

    let all_pages: Vec<String> = server
        .requests_to("/reviewlist.html")
        .into_iter()
        .filter(|r| r.query.get("customer_type").map(String::as_str) == Some("ALL"))
        .map(|r| r.query["offset"].clone())
        .collect();
    assert_eq!(all_pages, vec!["0"]);
}

#[tokio::test]
async fn shutdown_before_start_skips_discovery() {
    let server = MockHttpServer::start(booking_router).await;
    let tmp = tempfile::tempdir().unwrap();
    let output_dir = tmp.path().join("results");
    let mut config = test_config(&server, &["Marrakech", "Tangier"], &output_dir);
    config.output_format = OutputFormat::JsonLines;
    let ctx = Arc::new(ScrapingContext::new(config).unwrap());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    shutdown_tx.send(true).unwrap();

    let report = run_scraping_job(ctx, shutdown_rx).await.unwrap();

    assert_eq!(report.discovered, 0);
    assert_eq!(report.processed, 0);
    assert_eq!(report.output_path, None);
    assert!(server.requests().is_empty());
    assert!(!output_dir.exists());
}

#[tokio::test]
async fn shutdown_mid_run_flushes_pending_batch() {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);
    let trigger = shutdown_tx.clone();
    let server = MockHttpServer::start(move |path, query| {
        if path == "/hotel/ma/riad-anika.html" {
            let _ = trigger.send(true);
        }
        booking_router(path, query)
    })
    .await;
    let tmp = tempfile::tempdir().unwrap();
    let mut config = test_config(&server, &["Marrakech"], tmp.path());
    config.num_workers = 1;
    config.batch_size = 5;
    let ctx = Arc::new(ScrapingContext::new(config).unwrap());

    let report = run_scraping_job(ctx, shutdown_rx).await.unwrap();

    assert_eq!(report.discovered, 3);
    assert_eq!(report.processed, 1);
    let rows = read_rows(&report.output_path.unwrap());
    assert_eq!(rows.len(), 1);
    assert_eq!(float_column(&rows["riad-anika"], "wifi_score"), 7.6);
    assert!(server.requests_to("/hotel/ma/dar-bahia.html").is_empty());
}

#[tokio::test]
async fn worker_appends_every_batch_and_once_at_the_end() {
    let tmp = tempfile::tempdir().unwrap();
    let output_path = tmp.path().join("batches.csv");
    let lines_before_last = Arc::new(AtomicUsize::new(usize::MAX));

    let observed = lines_before_last.clone();
    let watched = output_path.clone();
    let server = MockHttpServer::start(move |path, query| {
        if path == "/hotel/ma/kasbah-gone.html" {
            observed.store(line_count(&watched), Ordering::SeqCst);
        }
        booking_router(path, query)
    })
    .await;

    let mut config = test_config(&server, &["Marrakech"], tmp.path());
    config.batch_size = 2;
    config.collect_traveler_reviews = false;
    config.reverse_geocode = false;
    let ctx = Arc::new(ScrapingContext::new(config).unwrap());
    let writer = Arc::new(ResultsWriter::new(output_path.clone(), OutputFormat::Csv));
    let urls = ["riad-anika", "dar-bahia", "kasbah-gone"]
        .iter()
        .map(|slug| property_url(&server, slug))
        .collect();
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let report = run_worker(ctx, writer, urls, 1, shutdown_rx).await.unwrap();

    assert_eq!(report.processed, 3);
    assert_eq!(report.failed, 1);
    // Header plus the first full batch of two, before the third property.
    assert_eq!(lines_before_last.load(Ordering::SeqCst), 3);
    assert_eq!(line_count(&output_path), 4);
}

#[tokio::test]
async fn unwritable_output_fails_the_run() {
    let server = MockHttpServer::start(booking_router).await;
    let tmp = tempfile::tempdir().unwrap();
    let mut config = test_config(&server, &["Marrakech"], tmp.path());
    config.num_workers = 1;

    // Occupy every file name the run could pick with a directory.
    let now = Local::now();
    for offset in -2..60 {
        let at = now + chrono::Duration::seconds(offset);
        let name = format!(
            "booking_properties_single_marrakech_{}.csv",
            at.format("%Y%m%d_%H%M%S")
        );
        std::fs::create_dir(tmp.path().join(name)).unwrap();
    }
    let ctx = Arc::new(ScrapingContext::new(config).unwrap());
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let err = run_scraping_job(ctx, shutdown_rx).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ScrapeError>(),
        Some(ScrapeError::OutputWrite { .. })
    ));
}

#[tokio::test]
async fn output_dir_that_is_a_file_fails_the_run() {
    let server = MockHttpServer::start(booking_router).await;
    let tmp = tempfile::tempdir().unwrap();
    let blocker: PathBuf = tmp.path().join("results");
    std::fs::write(&blocker, "not a directory").unwrap();
    let config = test_config(&server, &["Marrakech"], &blocker);
    let ctx = Arc::new(ScrapingContext::new(config).unwrap());
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    assert!(run_scraping_job(ctx, shutdown_rx).await.is_err());
}

#[tokio::test]
async fn retries_throttled_requests() {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let server = MockHttpServer::start(move |path, _| {
        if path != "/flaky" {
            return MockResponse::not_found();
        }
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            MockResponse::status(429)
        } else {
            MockResponse::html("<p>ok</p>")
        }
    })
    .await;
    let tmp = tempfile::tempdir().unwrap();
    let ctx = ScrapingContext::new(test_config(&server, &["Marrakech"], tmp.path())).unwrap();

    let body = ctx
        .request_client
        .fetch_url_body(&format!("{}/flaky", server.url()))
        .await
        .unwrap();
    assert_eq!(body, "<p>ok</p>");
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn gives_up_after_max_retries() {
    let server = MockHttpServer::start(|_, _| MockResponse::status(503)).await;
    let tmp = tempfile::tempdir().unwrap();
    let ctx = ScrapingContext::new(test_config(&server, &["Marrakech"], tmp.path())).unwrap();

    let err = ctx
        .request_client
        .fetch_url_body(&format!("{}/down", server.url()))
        .await
        .unwrap_err();
    match err.downcast_ref::<ScrapeError>() {
        Some(ScrapeError::RetriesExhausted { attempts, status, .. }) => {
            assert_eq!(*attempts, 2);
            assert_eq!(*status, Some(503));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(server.requests().len(), 2);
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockHttpServer::start(|_, _| MockResponse::not_found()).await;
    let tmp = tempfile::tempdir().unwrap();
    let ctx = ScrapingContext::new(test_config(&server, &["Marrakech"], tmp.path())).unwrap();

    let result = ctx
        .request_client
        .fetch_url_body(&format!("{}/hotel/ma/missing.html", server.url()))
        .await;
    assert!(result.is_err());
    assert_eq!(server.requests().len(), 1);
}
