mod scraper;
mod text_manipulators;
mod utils;

pub mod config;
pub mod error;
pub mod extractors;
pub mod geocode;
pub mod output;
pub mod pipeline;
pub mod property;
pub mod property_scraper;
pub mod ratelimit;
pub mod requests;
pub mod review_scraper;
pub mod reviews;
pub mod scraping_context;
pub mod search_scraper;

pub use config::{LoadFromEnv, OutputFormat, ScrapingConfig};
pub use error::ScrapeError;
pub use pipeline::{RunReport, WorkerReport, run_scraping_job};
pub use property::PropertyRecord;
pub use property_scraper::PropertyScraper;
pub use review_scraper::TravelerReviewScraper;
pub use crate::scraper::Scraper;
pub use scraping_context::ScrapingContext;
pub use search_scraper::SearchResultsScraper;
pub use utils::partition_into_chunks;
