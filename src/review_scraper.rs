use log::{info, warn};

use crate::{
    reviews::{
        CUSTOMER_TYPE_ALL, CUSTOMER_TYPE_BUSINESS, REVIEWS_PER_PAGE, ReviewCard, ReviewPage,
        TravelerScores, parse_review_page, review_list_url,
    },
    scraper::Scraper,
    scraping_context::ScrapingContext,
};

/// Pages through a property's review list and averages scores by traveler
/// type.
#[derive(Debug)]
pub struct TravelerReviewScraper {
    pub property_url: String,
    pub log_prefix: String,
}

impl TravelerReviewScraper {
    pub fn new(property_url: &str, log_prefix: &str) -> Self {
        Self {
            property_url: property_url.to_string(),
            log_prefix: log_prefix.to_string(),
        }
    }

    /// Cards for one customer type plus the filter options seen on its
    /// first page. A page that fails to load ends the pass early.
    async fn collect_customer_type(
        &self,
        ctx: &ScrapingContext,
        customer_type: &str,
    ) -> anyhow::Result<(Vec<ReviewCard>, Vec<String>)> {
        let config = &ctx.scraping_config;
        let prefix = &self.log_prefix;
        let mut cards = vec![];
        let mut customer_types = vec![];
        let mut page_count = 0;

        loop {
            if config.max_review_pages > 0 && page_count >= config.max_review_pages {
                info!(
                    "{prefix}Reached review page limit ({}) for {customer_type}",
                    config.max_review_pages
                );
                break;
            }
            let url = review_list_url(
                &config.booking_base_url,
                &self.property_url,
                customer_type,
                page_count * REVIEWS_PER_PAGE,
            )?;
            let html = match ctx.request_client.fetch_url_body(&url).await {
                Ok(html) => html,
                Err(e) if page_count == 0 => return Err(e),
                Err(e) => {
                    warn!(
                        "{prefix}Error loading {customer_type} reviews page {}: {e:#}",
                        page_count + 1
                    );
                    break;
                }
            };
            page_count += 1;

            let ReviewPage {
                cards: page_cards,
                has_next,
                customer_types: options,
            } = parse_review_page(&html);
            if page_count == 1 {
                customer_types = options;
            }
            info!(
                "{prefix}Found {} {customer_type} reviews on page {page_count}",
                page_cards.len()
            );
            let empty = page_cards.is_empty();
            cards.extend(page_cards);
            if empty || !has_next {
                break;
            }
        }
        Ok((cards, customer_types))
    }
}

impl Scraper for TravelerReviewScraper {
    type Output = TravelerScores;

    async fn scrape(&mut self, ctx: &ScrapingContext) -> anyhow::Result<TravelerScores> {
        let prefix = self.log_prefix.clone();
        let (cards, customer_types) = self.collect_customer_type(ctx, CUSTOMER_TYPE_ALL).await?;

        let mut business_scores = vec![];
        if customer_types.iter().any(|t| t == CUSTOMER_TYPE_BUSINESS) {
            match self.collect_customer_type(ctx, CUSTOMER_TYPE_BUSINESS).await {
                Ok((business_cards, _)) => {
                    business_scores = business_cards.iter().map(|c| c.score).collect()
                }
                Err(e) => warn!("{prefix}Error processing {CUSTOMER_TYPE_BUSINESS}: {e:#}"),
            }
        }

        let scores = TravelerScores::from_cards(&cards, &business_scores);
        if let Some(all) = scores.all {
            info!("{prefix}All travelers: {:.2} ({} reviews)", all.average, all.count);
        }
        Ok(scores)
    }
}
