use crate::scraping_context::ScrapingContext;

/// A unit of scraping work: fetch one or more pages and turn them into
/// `Output`.
pub trait Scraper {
    type Output;

    fn scrape(
        &mut self,
        ctx: &ScrapingContext,
    ) -> impl Future<Output = anyhow::Result<Self::Output>> + Send;
}
