use log::{info, warn};
use scraper::Html;

use crate::{
    extractors::{
        extract_category, extract_coordinates, extract_general_review,
        extract_general_review_count, extract_prices, extract_sub_scores, extract_wifi_speed,
    },
    geocode::reverse_geocode,
    property::PropertyRecord,
    review_scraper::TravelerReviewScraper,
    scraper::Scraper,
    scraping_context::ScrapingContext,
};

/// Scrapes one property page into a `PropertyRecord`.
#[derive(Debug)]
pub struct PropertyScraper {
    pub url: String,
    pub log_prefix: String,
}

impl PropertyScraper {
    pub fn new(url: &str, log_prefix: &str) -> Self {
        Self {
            url: url.to_string(),
            log_prefix: log_prefix.to_string(),
        }
    }
}

/// Fills every field that comes straight from the property page.
pub fn apply_page_fields(record: &mut PropertyRecord, html: &str) {
    let document = Html::parse_document(html);

    record.category = extract_category(&document);
    if let Some(prices) = extract_prices(&document, html) {
        record.min_price = Some(prices.min);
        record.max_price = Some(prices.max);
    }
    record.wifi_speed = Some(extract_wifi_speed(&document));
    record.general_review = extract_general_review(&document);
    record.general_review_count = extract_general_review_count(&document);

    let sub_scores = extract_sub_scores(&document);
    record.comfort_score = sub_scores.comfort;
    record.value_score = sub_scores.value;
    record.location_score = sub_scores.location;
    record.wifi_score = sub_scores.wifi;

    if let Some((lat, lon)) = extract_coordinates(html) {
        record.latitude = Some(lat);
        record.longitude = Some(lon);
    }
}

impl Scraper for PropertyScraper {
    type Output = PropertyRecord;

    async fn scrape(&mut self, ctx: &ScrapingContext) -> anyhow::Result<PropertyRecord> {
        let config = &ctx.scraping_config;
        let prefix = self.log_prefix.clone();
        info!("{prefix}Scraping: {}", self.url);

        let mut record = PropertyRecord::new(&self.url);
        let html = ctx.request_client.fetch_url_body(&self.url).await?;
        apply_page_fields(&mut record, &html);

        if record.wifi_score.is_none() {
            warn!("{prefix}No WiFi score on {}", self.url);
        }
        if record.min_price.is_none() {
            warn!("{prefix}No prices on {}", self.url);
        }

        if config.collect_traveler_reviews {
            let mut reviews = TravelerReviewScraper::new(&self.url, &prefix);
            match reviews.scrape(ctx).await {
                Ok(scores) => record.apply_traveler_scores(&scores),
                Err(e) => warn!("{prefix}Error extracting reviews: {e:#}"),
            }
        }

        if config.reverse_geocode {
            if let (Some(lat), Some(lon)) = (record.latitude, record.longitude) {
                record.apply_location(reverse_geocode(ctx, lat, lon).await);
            }
        }

        Ok(record)
    }
}
