//! Scripted collaborators shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use brandtrace::{
    BrandTraceError, BrandTraceResult, Collaborators, DomainIntelService, MultimodalService,
    RegistrationLookup, ScrapingService,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// One scripted reply: a JSON body or a collaborator failure
#[derive(Debug, Clone)]
pub enum Reply {
    Json(Value),
    Fail(String),
}

impl Reply {
    fn resolve(&self, collector: &str) -> BrandTraceResult<Value> {
        match self {
            Reply::Json(v) => Ok(v.clone()),
            Reply::Fail(message) => Err(BrandTraceError::Collaborator {
                collector: collector.to_string(),
                message: message.clone(),
            }),
        }
    }
}

#[derive(Debug)]
pub struct MockServices {
    pub scrape: Reply,
    pub scrape_delay: Duration,
    pub image_analysis: Reply,
    pub comparison: Reply,
    pub whois: Reply,
    pub whois_delay: Duration,
    pub dns: Reply,
    /// Lookalike candidates reported as registered
    pub registered: Vec<String>,
    pub calls: AtomicUsize,
}

impl MockServices {
    /// Every collaborator reports strong infringement signals
    pub fn suspicious() -> Self {
        Self {
            scrape: Reply::Json(json!({
                "url": "https://acme-outlet.shop",
                "markdown": "# ACME official outlet\nAcme shoes at 90% off. Genuine Acme.",
                "html": "<h1>ACME official outlet</h1>",
                "screenshot_refs": ["shots/landing.png"],
                "similarity": 0.9,
                "confidence": 0.9
            })),
            scrape_delay: Duration::ZERO,
            image_analysis: Reply::Json(json!({
                "description": "Acme logo in header, product grid copied from acme.com",
                "brand_markers": ["logo", "wordmark"],
                "confidence": 0.8
            })),
            comparison: Reply::Json(json!({ "similarity": 0.8, "confidence": 0.8 })),
            whois: Reply::Json(json!({
                "domain": "acme-outlet.shop",
                "registrar": "Cheap Names LLC",
                "creation_date": "2026-09-30",
                "privacy_shielded": true
            })),
            whois_delay: Duration::ZERO,
            dns: Reply::Json(json!({
                "A": ["203.0.113.7"],
                "MX": ["mx.acme-outlet.shop"],
                "TXT": []
            })),
            registered: vec!["acme.net".to_string()],
            calls: AtomicUsize::new(0),
        }
    }

    /// Every collaborator fails
    pub fn silent() -> Self {
        let down = || Reply::Fail("service unavailable".into());
        Self {
            scrape: down(),
            scrape_delay: Duration::ZERO,
            image_analysis: down(),
            comparison: down(),
            whois: down(),
            whois_delay: Duration::ZERO,
            dns: down(),
            registered: vec![],
            calls: AtomicUsize::new(0),
        }
    }

    pub fn into_collaborators(self) -> (Arc<Self>, Collaborators) {
        let services = Arc::new(self);
        let collaborators = Collaborators::new(services.clone(), services.clone(), services.clone());
        (services, collaborators)
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn touch(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ScrapingService for MockServices {
    async fn scrape(&self, _url: &str) -> BrandTraceResult<Value> {
        self.touch();
        if !self.scrape_delay.is_zero() {
            tokio::time::sleep(self.scrape_delay).await;
        }
        self.scrape.resolve("scrape")
    }

    async fn crawl(&self, _url: &str, _depth: u32) -> BrandTraceResult<Vec<Value>> {
        self.touch();
        Ok(vec![])
    }
}

#[async_trait]
impl DomainIntelService for MockServices {
    async fn whois(&self, _domain: &str) -> BrandTraceResult<Value> {
        self.touch();
        if !self.whois_delay.is_zero() {
            tokio::time::sleep(self.whois_delay).await;
        }
        self.whois.resolve("whois")
    }

    async fn dns(&self, _domain: &str) -> BrandTraceResult<Value> {
        self.touch();
        self.dns.resolve("dns")
    }

    async fn is_registered(&self, domain: &str) -> BrandTraceResult<RegistrationLookup> {
        if matches!(self.whois, Reply::Fail(_)) {
            return Err(BrandTraceError::Collaborator {
                collector: "registration".into(),
                message: "service unavailable".into(),
            });
        }
        if self.registered.iter().any(|r| r == domain) {
            Ok(RegistrationLookup::registered("Cheap Names LLC"))
        } else {
            Ok(RegistrationLookup::available())
        }
    }
}

#[async_trait]
impl MultimodalService for MockServices {
    async fn analyze_image(&self, _image: &str, _brand: &str) -> BrandTraceResult<Value> {
        self.touch();
        self.image_analysis.resolve("analyze_image")
    }

    async fn compare_images(&self, _reference: &str, _candidate: &str) -> BrandTraceResult<Value> {
        self.touch();
        self.comparison.resolve("compare_images")
    }
}
