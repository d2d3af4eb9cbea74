//! Firecrawl-compatible scraping collaborator
//!
//! Calls the v1 `/scrape` and `/crawl` endpoints and reshapes their
//! responses into the `{markdown, html, screenshot_refs}` contract. Page
//! text the service omits (`markdown`, `html`) is left out rather than
//! defaulted, so a degraded response still fails normalization downstream.
//! Screenshots are optional in the service's output: a page without one
//! maps to an empty `screenshot_refs` list.

use super::ScrapingService;
use crate::{BrandTraceError, BrandTraceResult};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::time::Duration;

pub const API_KEY_ENV: &str = "FIRECRAWL_API_KEY";
pub const API_URL_ENV: &str = "FIRECRAWL_API_URL";
const DEFAULT_API_URL: &str = "https://api.firecrawl.dev";

const COLLECTOR: &str = "firecrawl";
const CRAWL_POLL_INTERVAL: Duration = Duration::from_secs(2);
const CRAWL_MAX_POLLS: u32 = 30;
/// Pages requested per crawl job
const CRAWL_PAGE_LIMIT: u32 = 10;

pub struct FirecrawlScraper {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl FirecrawlScraper {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> BrandTraceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(90))
            .build()?;
        Ok(Self {
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Build from `FIRECRAWL_API_KEY` (required) and `FIRECRAWL_API_URL`
    /// (optional, for self-hosted instances)
    pub fn from_env() -> BrandTraceResult<Self> {
        let api_key = std::env::var(API_KEY_ENV)
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| BrandTraceError::Config(format!("{} is not set", API_KEY_ENV)))?;
        let base_url = std::env::var(API_URL_ENV).unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        tracing::debug!("Firecrawl scraper targeting {}", base_url);
        Self::new(api_key, base_url)
    }

    async fn post(&self, path: &str, body: &Value) -> BrandTraceResult<Value> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;
        read_body(response).await
    }

    async fn get(&self, path: &str) -> BrandTraceResult<Value> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        read_body(response).await
    }
}

async fn read_body(response: reqwest::Response) -> BrandTraceResult<Value> {
    let status = response.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(collaborator_error("rate limited (HTTP 429)"));
    }
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(collaborator_error(format!(
            "HTTP {}: {}",
            status,
            text.chars().take(200).collect::<String>()
        )));
    }
    Ok(response.json().await?)
}

#[async_trait]
impl ScrapingService for FirecrawlScraper {
    async fn scrape(&self, url: &str) -> BrandTraceResult<Value> {
        let body = json!({
            "url": url,
            "formats": ["markdown", "html", "screenshot@fullPage"],
            "onlyMainContent": true,
            "removeBase64Images": false,
        });
        let response = self.post("/v1/scrape", &body).await?;
        parse_scrape_response(&response)
    }

    async fn crawl(&self, url: &str, depth: u32) -> BrandTraceResult<Vec<Value>> {
        let body = json!({
            "url": url,
            "maxDepth": depth,
            "limit": CRAWL_PAGE_LIMIT,
            "scrapeOptions": { "formats": ["markdown", "html", "screenshot"] },
        });
        let started = self.post("/v1/crawl", &body).await?;
        let job_id = started
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| collaborator_error("crawl response carried no job id"))?
            .to_string();
        tracing::info!("Firecrawl crawl job {} started for {}", job_id, url);

        for _ in 0..CRAWL_MAX_POLLS {
            let status = self.get(&format!("/v1/crawl/{}", job_id)).await?;
            if let Some(pages) = parse_crawl_status(&status)? {
                // The landing page is scraped separately
                let pages: Vec<Value> = pages
                    .into_iter()
                    .filter(|p| p.get("url").and_then(Value::as_str) != Some(url))
                    .collect();
                tracing::info!("Firecrawl crawl job {} returned {} pages", job_id, pages.len());
                return Ok(pages);
            }
            tokio::time::sleep(CRAWL_POLL_INTERVAL).await;
        }
        Err(collaborator_error(format!("crawl job {} did not complete", job_id)))
    }
}

// ─── Response mapping ──────────────────────────────────────────────

fn collaborator_error(message: impl Into<String>) -> BrandTraceError {
    BrandTraceError::Collaborator {
        collector: COLLECTOR.to_string(),
        message: message.into(),
    }
}

fn check_success(body: &Value) -> BrandTraceResult<()> {
    if body.get("success").and_then(Value::as_bool) == Some(false) {
        let message = body
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("request was not successful");
        return Err(collaborator_error(message));
    }
    Ok(())
}

/// Reshape one Firecrawl page document into the scraping contract
pub fn page_to_contract(page: &Value) -> Value {
    let mut out = Map::new();
    for field in ["markdown", "html"] {
        if let Some(v) = page.get(field) {
            out.insert(field.to_string(), v.clone());
        }
    }
    let screenshots: Vec<Value> = page
        .get("screenshot")
        .and_then(Value::as_str)
        .map(|s| vec![Value::String(s.to_string())])
        .unwrap_or_default();
    out.insert("screenshot_refs".into(), Value::Array(screenshots));
    if let Some(source) = page.pointer("/metadata/sourceURL").and_then(Value::as_str) {
        out.insert("url".into(), Value::String(source.to_string()));
    }
    Value::Object(out)
}

/// Map a `/v1/scrape` response body
pub fn parse_scrape_response(body: &Value) -> BrandTraceResult<Value> {
    check_success(body)?;
    let data = body
        .get("data")
        .ok_or_else(|| collaborator_error("scrape response carried no data"))?;
    Ok(page_to_contract(data))
}

/// Map a `/v1/crawl/{id}` status body. `None` while the job is running.
pub fn parse_crawl_status(body: &Value) -> BrandTraceResult<Option<Vec<Value>>> {
    check_success(body)?;
    match body.get("status").and_then(Value::as_str) {
        Some("completed") => {
            let pages = body
                .get("data")
                .and_then(Value::as_array)
                .map(|pages| pages.iter().map(page_to_contract).collect())
                .unwrap_or_default();
            Ok(Some(pages))
        }
        Some("failed") | Some("cancelled") => Err(collaborator_error("crawl job failed")),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::{EvidenceCollector, EvidenceSource};

    #[test]
    fn test_scrape_response_maps_to_contract() {
        let body = json!({
            "success": true,
            "data": {
                "markdown": "# Acme Outlet",
                "html": "<h1>Acme Outlet</h1>",
                "screenshot": "https://cdn.firecrawl.dev/shot.png",
                "metadata": { "sourceURL": "https://acme-outlet.shop", "statusCode": 200 }
            }
        });
        let mapped = parse_scrape_response(&body).unwrap();
        assert_eq!(mapped["markdown"], "# Acme Outlet");
        assert_eq!(mapped["html"], "<h1>Acme Outlet</h1>");
        assert_eq!(mapped["screenshot_refs"], json!(["https://cdn.firecrawl.dev/shot.png"]));
        assert_eq!(mapped["url"], "https://acme-outlet.shop");
    }

    #[test]
    fn test_missing_fields_stay_missing() {
        let body = json!({ "success": true, "data": { "markdown": "text only" } });
        let mapped = parse_scrape_response(&body).unwrap();
        assert!(mapped.get("html").is_none(), "html must not be defaulted");
        assert_eq!(mapped["screenshot_refs"], json!([]), "no screenshot is an empty list");

        let normalized = EvidenceCollector::new("Acme").normalize(&mapped, EvidenceSource::ContentScrape);
        match normalized {
            Err(BrandTraceError::MalformedEvidence { .. }) => {}
            other => panic!("missing html must fail normalization, got {:?}", other),
        }
    }

    #[test]
    fn test_page_without_screenshot_still_normalizes() {
        let body = json!({ "success": true, "data": { "markdown": "Acme deals", "html": "<p>Acme deals</p>" } });
        let mapped = parse_scrape_response(&body).unwrap();
        let item = EvidenceCollector::new("Acme")
            .normalize(&mapped, EvidenceSource::ContentScrape)
            .unwrap();
        assert_eq!(item.source(), EvidenceSource::ContentScrape);
    }

    #[test]
    fn test_unsuccessful_scrape_is_collaborator_error() {
        let body = json!({ "success": false, "error": "Rate limit exceeded" });
        match parse_scrape_response(&body) {
            Err(BrandTraceError::Collaborator { collector, message }) => {
                assert_eq!(collector, "firecrawl");
                assert!(message.contains("Rate limit"));
            }
            other => panic!("expected Collaborator error, got {:?}", other),
        }
    }

    #[test]
    fn test_crawl_status_pending_then_completed() {
        let running = json!({ "status": "scraping", "total": 5, "completed": 2 });
        assert!(parse_crawl_status(&running).unwrap().is_none());

        let done = json!({
            "status": "completed",
            "data": [
                { "markdown": "a", "html": "<p>a</p>", "metadata": { "sourceURL": "https://x.shop/a" } },
                { "markdown": "b", "html": "<p>b</p>", "metadata": { "sourceURL": "https://x.shop/b" } }
            ]
        });
        let pages = parse_crawl_status(&done).unwrap().unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[1]["url"], "https://x.shop/b");
    }

    #[test]
    fn test_failed_crawl_is_error() {
        let failed = json!({ "status": "failed" });
        assert!(parse_crawl_status(&failed).is_err());
    }
}
