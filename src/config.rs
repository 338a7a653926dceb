use std::{fmt, str::FromStr, time::Duration};

use anyhow::{Context, bail};
use chrono::{Days, NaiveDate};
use serde::{Deserialize, de::DeserializeOwned};

/// Cap used when `MAX_PROPERTIES` is set to 0.
pub const FALLBACK_MAX_PROPERTIES: usize = 500;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/127.0.0.0 Safari/537.36";
const DEFAULT_GEOCODER_USER_AGENT: &str = "BookingScraper/1.0 (contact@example.com)";

/// The env vars read at startup. Every field has a default so an empty
/// environment still produces a runnable config.
#[derive(Debug, Deserialize)]
pub struct ScrapingEnv {
    #[serde(default = "default_destinations")]
    destinations: Vec<String>,
    #[serde(default = "default_max_properties")]
    max_properties: usize,
    #[serde(default = "default_one")]
    num_workers: usize,
    #[serde(default = "default_batch_size")]
    batch_size: usize,
    #[serde(default = "default_output_dir")]
    output_dir: String,
    #[serde(default = "default_output_format")]
    output_format: String,
    #[serde(default = "default_booking_base_url")]
    booking_base_url: String,
    #[serde(default = "default_nominatim_url")]
    nominatim_url: String,
    #[serde(default = "default_true")]
    reverse_geocode: bool,
    #[serde(default = "default_true")]
    collect_traveler_reviews: bool,
    #[serde(default = "default_max_review_pages")]
    max_review_pages: usize,
    #[serde(default = "default_max_search_pages")]
    max_search_pages: usize,
    #[serde(default = "default_search_page_size")]
    search_page_size: usize,
    #[serde(default)]
    checkin_offset_days: u64,
    #[serde(default = "default_one_u64")]
    stay_nights: u64,
    #[serde(default = "default_one_u32")]
    group_adults: u32,
    #[serde(default = "default_requests_per_second")]
    requests_per_second: u32,
    #[serde(default = "default_min_request_interval_ms")]
    min_request_interval_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    request_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    retry_base_delay_ms: u64,
    #[serde(default = "default_user_agent")]
    user_agent: String,
    #[serde(default = "default_geocoder_user_agent")]
    geocoder_user_agent: String,
    #[serde(default)]
    proxy_url: Option<String>,
    #[serde(default)]
    accept_invalid_certs: bool,
}

fn default_destinations() -> Vec<String> {
    vec!["Marrakech".to_string(), "Tangier".to_string()]
}
fn default_max_properties() -> usize {
    200
}
fn default_one() -> usize {
    1
}
fn default_one_u64() -> u64 {
    1
}
fn default_one_u32() -> u32 {
    1
}
fn default_batch_size() -> usize {
    5
}
fn default_output_dir() -> String {
    "/app/results".to_string()
}
fn default_output_format() -> String {
    "csv".to_string()
}
fn default_booking_base_url() -> String {
    "https://www.booking.com".to_string()
}
fn default_nominatim_url() -> String {
    "https://nominatim.openstreetmap.org".to_string()
}
fn default_true() -> bool {
    true
}
fn default_max_review_pages() -> usize {
    2
}
fn default_max_search_pages() -> usize {
    10
}
fn default_search_page_size() -> usize {
    25
}
fn default_requests_per_second() -> u32 {
    2
}
fn default_min_request_interval_ms() -> u64 {
    1000
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_base_delay_ms() -> u64 {
    1000
}
fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}
fn default_geocoder_user_agent() -> String {
    DEFAULT_GEOCODER_USER_AGENT.to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    JsonLines,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::JsonLines => "jsonl",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "jsonl" | "json" => Ok(OutputFormat::JsonLines),
            other => bail!("unknown output format: {other} (expected csv or jsonl)"),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Validated scraping settings shared by every job of a run.
#[derive(Debug, Clone)]
pub struct ScrapingConfig {
    pub destinations: Vec<String>,
    pub max_properties: usize,
    pub num_workers: usize,
    pub batch_size: usize,
    pub output_dir: String,
    pub output_format: OutputFormat,
    pub booking_base_url: String,
    pub nominatim_url: String,
    pub reverse_geocode: bool,
    pub collect_traveler_reviews: bool,
    pub max_review_pages: usize,
    pub max_search_pages: usize,
    pub search_page_size: usize,
    pub checkin_offset_days: u64,
    pub stay_nights: u64,
    pub group_adults: u32,
    pub requests_per_second: u32,
    pub min_request_interval: Duration,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub user_agent: String,
    pub geocoder_user_agent: String,
    pub proxy_url: Option<String>,
    pub accept_invalid_certs: bool,
}

impl ScrapingConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let scraping_env = ScrapingEnv::load_from_env()?;
        Self::try_from(scraping_env)
    }

    pub fn effective_max_properties(&self) -> usize {
        if self.max_properties == 0 {
            FALLBACK_MAX_PROPERTIES
        } else {
            self.max_properties
        }
    }

    /// Check-in and check-out dates for a search started on `today`.
    pub fn stay_dates(&self, today: NaiveDate) -> anyhow::Result<(NaiveDate, NaiveDate)> {
        let checkin = today
            .checked_add_days(Days::new(self.checkin_offset_days))
            .context("check-in date out of range")?;
        let checkout = checkin
            .checked_add_days(Days::new(self.stay_nights))
            .context("check-out date out of range")?;
        Ok((checkin, checkout))
    }

    pub fn is_single_worker(&self) -> bool {
        self.num_workers <= 1
    }

    fn validate(self) -> anyhow::Result<Self> {
        if self.destinations.is_empty() {
            bail!("DESTINATIONS must name at least one city");
        }
        if self.num_workers == 0 {
            bail!("NUM_WORKERS must be at least 1");
        }
        if self.batch_size == 0 {
            bail!("BATCH_SIZE must be at least 1");
        }
        if self.search_page_size == 0 {
            bail!("SEARCH_PAGE_SIZE must be at least 1");
        }
        if self.requests_per_second == 0 {
            bail!("REQUESTS_PER_SECOND must be at least 1");
        }
        Ok(self)
    }
}

impl TryFrom<ScrapingEnv> for ScrapingConfig {
    type Error = anyhow::Error;

    fn try_from(env: ScrapingEnv) -> anyhow::Result<Self> {
        let destinations = env
            .destinations
            .iter()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .collect();
        let proxy_url = env.proxy_url.filter(|p| !p.trim().is_empty());
        ScrapingConfig {
            destinations,
            max_properties: env.max_properties,
            num_workers: env.num_workers,
            batch_size: env.batch_size,
            output_dir: env.output_dir,
            output_format: env.output_format.parse()?,
            booking_base_url: env.booking_base_url.trim_end_matches('/').to_string(),
            nominatim_url: env.nominatim_url.trim_end_matches('/').to_string(),
            reverse_geocode: env.reverse_geocode,
            collect_traveler_reviews: env.collect_traveler_reviews,
            max_review_pages: env.max_review_pages,
            max_search_pages: env.max_search_pages,
            search_page_size: env.search_page_size,
            checkin_offset_days: env.checkin_offset_days,
            stay_nights: env.stay_nights,
            group_adults: env.group_adults,
            requests_per_second: env.requests_per_second,
            min_request_interval: Duration::from_millis(env.min_request_interval_ms),
            request_timeout: Duration::from_secs(env.request_timeout_secs),
            max_retries: env.max_retries,
            retry_base_delay: Duration::from_millis(env.retry_base_delay_ms),
            user_agent: env.user_agent,
            geocoder_user_agent: env.geocoder_user_agent,
            proxy_url,
            accept_invalid_certs: env.accept_invalid_certs,
        }
        .validate()
    }
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        ScrapingConfig {
            destinations: default_destinations(),
            max_properties: default_max_properties(),
            num_workers: default_one(),
            batch_size: default_batch_size(),
            output_dir: default_output_dir(),
            output_format: OutputFormat::Csv,
            booking_base_url: default_booking_base_url(),
            nominatim_url: default_nominatim_url(),
            reverse_geocode: true,
            collect_traveler_reviews: true,
            max_review_pages: default_max_review_pages(),
            max_search_pages: default_max_search_pages(),
            search_page_size: default_search_page_size(),
            checkin_offset_days: 0,
            stay_nights: 1,
            group_adults: 1,
            requests_per_second: default_requests_per_second(),
            min_request_interval: Duration::from_millis(default_min_request_interval_ms()),
            request_timeout: Duration::from_secs(default_request_timeout_secs()),
            max_retries: default_max_retries(),
            retry_base_delay: Duration::from_millis(default_retry_base_delay_ms()),
            user_agent: default_user_agent(),
            geocoder_user_agent: default_geocoder_user_agent(),
            proxy_url: None,
            accept_invalid_certs: false,
        }
    }
}

// Extension trait.
pub trait LoadFromEnv: DeserializeOwned {
    fn load_from_env() -> anyhow::Result<Self> {
        // Don't throw an error if .env file doesn't exist.
        let _ = dotenv::dotenv();
        let config =
            envy::from_env::<Self>().context("failed to load env variables into config struct")?;
        Ok(config)
    }
}

impl<T: DeserializeOwned> LoadFromEnv for T {}
