//! Collaborator capability interfaces
//!
//! Every external dependency of an analysis run sits behind one of three
//! fixed traits. Implementations return the collaborator's *raw* JSON so
//! that validation happens in [`crate::evidence`], never in the adapter.
//!
//! ## Usage
//!
//! Production code wires real services (e.g. [`firecrawl::FirecrawlScraper`]).
//! Tests substitute in-process fakes implementing the same traits.

pub mod firecrawl;

use crate::BrandTraceResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

// ─── Traits ────────────────────────────────────────────────────────

/// Page content retrieval
#[async_trait]
pub trait ScrapingService: Send + Sync {
    /// `{markdown, html, screenshot_refs}` for a single page
    async fn scrape(&self, url: &str) -> BrandTraceResult<Value>;

    /// One raw page object per crawled page, landing page excluded
    async fn crawl(&self, url: &str, depth: u32) -> BrandTraceResult<Vec<Value>>;
}

/// Registration and resolution lookups
#[async_trait]
pub trait DomainIntelService: Send + Sync {
    /// `{registrar, creation_date, privacy_shielded}`
    async fn whois(&self, domain: &str) -> BrandTraceResult<Value>;

    /// `{A, MX, TXT}`
    async fn dns(&self, domain: &str) -> BrandTraceResult<Value>;

    async fn is_registered(&self, domain: &str) -> BrandTraceResult<RegistrationLookup>;
}

/// Vision model access
#[async_trait]
pub trait MultimodalService: Send + Sync {
    /// `{description, brand_markers, confidence}`
    async fn analyze_image(&self, image: &str, brand: &str) -> BrandTraceResult<Value>;

    /// `{similarity}`
    async fn compare_images(&self, reference: &str, candidate: &str) -> BrandTraceResult<Value>;
}

/// Answer to a single registration lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationLookup {
    pub registered: bool,
    pub registrar: Option<String>,
}

impl RegistrationLookup {
    pub fn registered(registrar: impl Into<String>) -> Self {
        Self {
            registered: true,
            registrar: Some(registrar.into()),
        }
    }

    pub fn available() -> Self {
        Self {
            registered: false,
            registrar: None,
        }
    }
}

// ─── Bundle ────────────────────────────────────────────────────────

/// Handles to every collaborator one analysis run may call
#[derive(Clone)]
pub struct Collaborators {
    pub scraper: Arc<dyn ScrapingService>,
    pub domain_intel: Arc<dyn DomainIntelService>,
    pub multimodal: Arc<dyn MultimodalService>,
}

impl Collaborators {
    pub fn new(
        scraper: Arc<dyn ScrapingService>,
        domain_intel: Arc<dyn DomainIntelService>,
        multimodal: Arc<dyn MultimodalService>,
    ) -> Self {
        Self {
            scraper,
            domain_intel,
            multimodal,
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
