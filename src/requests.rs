use std::time::Duration;

use anyhow::Context;
use log::warn;
use reqwest::{Client, ClientBuilder, Proxy, Response, StatusCode, header::USER_AGENT};
use serde::de::DeserializeOwned;

use crate::{config::ScrapingConfig, error::ScrapeError, ratelimit::RateLimiter};

pub struct RequestClient {
    client: Client,
    rate_limiter: RateLimiter,
    max_retries: u32,
    retry_base_delay: Duration,
}

impl RequestClient {
    pub fn new(config: &ScrapingConfig) -> anyhow::Result<Self> {
        // HTTP_PROXY / HTTPS_PROXY are picked up by reqwest on its own.
        let mut builder = ClientBuilder::new()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs);
        if let Some(proxy_url) = &config.proxy_url {
            let proxy = Proxy::all(proxy_url)
                .with_context(|| format!("invalid proxy url {proxy_url}"))?;
            builder = builder.proxy(proxy);
        }
        let client = builder.build()?;
        let rate_limiter =
            RateLimiter::new(config.requests_per_second, config.min_request_interval)?;
        Ok(Self {
            client,
            rate_limiter,
            max_retries: config.max_retries.max(1),
            retry_base_delay: config.retry_base_delay,
        })
    }

    /// GET with pacing and retries. `user_agent` overrides the client default.
    pub async fn fetch_url_response(
        &self,
        url: &str,
        user_agent: Option<&str>,
    ) -> anyhow::Result<Response> {
        let mut last_status = None;
        for attempt in 0..self.max_retries {
            if attempt > 0 {
                let delay = backoff_delay(self.retry_base_delay, attempt);
                warn!("Attempt {attempt} for {url} failed, retrying in {delay:?}");
                tokio::time::sleep(delay).await;
            }

            // Wait (non-blocking) until we're allowed to make a request according
            // to our self-imposed rate-limiting policy.
            self.rate_limiter.wait_until_ready().await;

            let mut request = self.client.get(url);
            if let Some(user_agent) = user_agent {
                request = request.header(USER_AGENT, user_agent);
            }
            match request.send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) if is_retryable(response.status()) => {
                    last_status = Some(response.status().as_u16());
                }
                Ok(response) => {
                    let status = response.status();
                    return Err(anyhow::anyhow!("GET {url} returned {status}"));
                }
                Err(e) if e.is_builder() => return Err(e.into()),
                Err(e) => {
                    warn!("GET {url} failed: {e}");
                    last_status = None;
                }
            }
        }
        Err(ScrapeError::RetriesExhausted {
            url: url.to_string(),
            attempts: self.max_retries,
            status: last_status,
        }
        .into())
    }

    pub async fn fetch_url_body(&self, url: &str) -> anyhow::Result<String> {
        let response = self.fetch_url_response(url, None).await?;
        let body = response.text().await?;
        Ok(body)
    }

    pub async fn fetch_json<T: DeserializeOwned>(
        &self,
        url: &str,
        user_agent: &str,
    ) -> anyhow::Result<T> {
        let response = self.fetch_url_response(url, Some(user_agent)).await?;
        let parsed = response
            .json::<T>()
            .await
            .with_context(|| format!("malformed json from {url}"))?;
        Ok(parsed)
    }
}

/// `base * 2^(attempt - 1)`, saturating instead of overflowing.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}
