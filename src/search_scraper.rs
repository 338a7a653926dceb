use std::collections::HashSet;

use chrono::{Local, NaiveDate};
use log::{info, warn};
use reqwest::Url;
use scraper::{Html, Selector};
use tokio::sync::watch;

use crate::{
    error::ScrapeError,
    scraper::Scraper,
    scraping_context::ScrapingContext,
    text_manipulators::{canonical_url, extract_text},
};

// Newest layout first.
const PROPERTY_LINK_SELECTORS: [&str; 6] = [
    r#"a[data-testid="title-link"]"#,
    r#"h3[data-testid="title"] a"#,
    r#"div[data-testid="property-card"] a[href*="/hotel/"]"#,
    r##"a[href*="/hotel/"]:not([href*="#"])"##,
    "div.sr_property_block a.hotel_name_link",
    "a.js-sr-hotel-link",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageCondition {
    Blocked,
    NoResults,
    Unknown,
}

/// Stay parameters shared by every search URL of a run.
#[derive(Debug, Clone, Copy)]
pub struct SearchParams {
    pub checkin: NaiveDate,
    pub checkout: NaiveDate,
    pub group_adults: u32,
    pub rows: usize,
}

pub fn build_search_url(
    base_url: &str,
    city: &str,
    params: &SearchParams,
    offset: usize,
) -> anyhow::Result<String> {
    let mut url = Url::parse(&format!("{base_url}/searchresults.html"))?;
    url.query_pairs_mut()
        .append_pair("ss", city)
        .append_pair("checkin", &params.checkin.format("%Y-%m-%d").to_string())
        .append_pair("checkout", &params.checkout.format("%Y-%m-%d").to_string())
        .append_pair("group_adults", &params.group_adults.to_string())
        .append_pair("no_rooms", "1")
        .append_pair("group_children", "0")
        .append_pair("rows", &params.rows.to_string())
        .append_pair("offset", &offset.to_string());
    Ok(url.into())
}

/// Absolute property URLs on a search results page, from the first selector
/// that matches anything.
pub fn parse_property_links(html: &str, base_url: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let base = Url::parse(base_url).ok();
    for css in PROPERTY_LINK_SELECTORS {
        let selector = Selector::parse(css).unwrap();
        let hrefs: Vec<&str> = document
            .select(&selector)
            .filter_map(|a| a.value().attr("href"))
            .collect();
        if hrefs.is_empty() {
            continue;
        }
        return hrefs
            .into_iter()
            .filter(|href| href.contains("/hotel/"))
            .filter_map(|href| match &base {
                Some(base) => base.join(href).ok().map(String::from),
                None => Some(href.to_string()),
            })
            .collect();
    }
    vec![]
}

/// Why a results page came back without property links.
pub fn detect_page_condition(html: &str) -> PageCondition {
    let document = Html::parse_document(html);
    let body_selector = Selector::parse("body").unwrap();
    let text = document
        .select(&body_selector)
        .next()
        .map(extract_text)
        .unwrap_or_default()
        .to_lowercase();
    if text.contains("captcha") || text.contains("verify") {
        PageCondition::Blocked
    } else if text.contains("no properties found") || text.contains("no results") {
        PageCondition::NoResults
    } else {
        PageCondition::Unknown
    }
}

/// Collects property URLs for every destination, deduplicated on the URL
/// without its query string and capped at `max_links` overall.
#[derive(Debug)]
pub struct SearchResultsScraper {
    pub destinations: Vec<String>,
    pub max_links: usize,
    pub property_urls: Vec<String>,
    seen: HashSet<String>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl SearchResultsScraper {
    pub fn new(destinations: Vec<String>, max_links: usize) -> Self {
        Self {
            destinations,
            max_links,
            property_urls: vec![],
            seen: HashSet::new(),
            shutdown: None,
        }
    }

    /// Stops discovery between pages once `shutdown` flips to true.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    fn is_full(&self) -> bool {
        self.property_urls.len() >= self.max_links
    }

    fn is_interrupted(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Adds unseen URLs until the cap; returns how many were new.
    fn add_links(&mut self, links: Vec<String>) -> usize {
        let mut added = 0;
        for link in links {
            if self.is_full() {
                break;
            }
            if self.seen.insert(canonical_url(&link).to_string()) {
                self.property_urls.push(link);
                added += 1;
            }
        }
        added
    }

    async fn scrape_destination(
        &mut self,
        ctx: &ScrapingContext,
        city: &str,
        params: &SearchParams,
    ) -> anyhow::Result<()> {
        let base_url = &ctx.scraping_config.booking_base_url;
        for page in 0..ctx.scraping_config.max_search_pages {
            if self.is_full() || self.is_interrupted() {
                break;
            }
            let url = build_search_url(base_url, city, params, page * params.rows)?;
            info!("Navigating to: {url}");
            let html = ctx.request_client.fetch_url_body(&url).await?;

            let links = parse_property_links(&html, base_url);
            if links.is_empty() {
                return match detect_page_condition(&html) {
                    PageCondition::Blocked => Err(ScrapeError::Blocked { url }.into()),
                    PageCondition::NoResults if page == 0 => {
                        Err(ScrapeError::NoResults { url }.into())
                    }
                    _ => {
                        info!("No more property links for {city} after page {}", page + 1);
                        Ok(())
                    }
                };
            }

            let found = links.len();
            let added = self.add_links(links);
            info!(
                "Found {found} links on page {} for {city}, {added} new, {} unique so far",
                page + 1,
                self.property_urls.len()
            );
            if added == 0 {
                break;
            }
        }
        Ok(())
    }
}

impl Scraper for SearchResultsScraper {
    type Output = Vec<String>;

    async fn scrape(&mut self, ctx: &ScrapingContext) -> anyhow::Result<Vec<String>> {
        let config = &ctx.scraping_config;
        let (checkin, checkout) = config.stay_dates(Local::now().date_naive())?;
        let params = SearchParams {
            checkin,
            checkout,
            group_adults: config.group_adults,
            rows: config.search_page_size,
        };

        let destinations = self.destinations.clone();
        for city in &destinations {
            if self.is_interrupted() {
                warn!("Interrupted, skipping remaining destinations");
                break;
            }
            if self.is_full() {
                break;
            }
            if let Err(e) = self.scrape_destination(ctx, city, &params).await {
                match e.downcast_ref::<ScrapeError>() {
                    Some(ScrapeError::Blocked { .. }) => {
                        warn!("Possible captcha detected while searching {city}: {e}")
                    }
                    Some(ScrapeError::NoResults { .. }) => {
                        info!("No properties found for {city}")
                    }
                    _ => warn!("Error collecting property urls for {city}: {e:#}"),
                }
            }
        }
        Ok(self.property_urls.clone())
    }
}
