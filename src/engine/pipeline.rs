//! Collection pipeline: concurrent fan-out with per-call timeouts
//!
//! Four independent branches run under one `tokio::join!`:
//! - content: scrape (plus optional crawl), then screenshot analysis and
//!   comparison against a reference image
//! - WHOIS for the target domain
//! - DNS for the target domain
//! - lookalike generation and registration classification
//!
//! Every external call is wrapped by [`run_collector_timed`]. A call that
//! times out, fails or returns malformed data becomes a [`CollectionGap`]
//! and its category falls back to the neutral signal. Scoring only starts
//! once every branch has finished.

use crate::collectors::{Collaborators, DomainIntelService};
use crate::config::CollectionConfig;
use crate::engine::scoring::Category;
use crate::evidence::{EvidenceCollector, EvidenceItem, EvidenceSource};
use crate::typosquat::{DomainVariant, RegistrationStatus, TyposquattingAnalyzer};
use crate::{BrandTraceError, BrandTraceResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;

// ─── Gaps and stats ────────────────────────────────────────────────

/// A collector that produced no usable evidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionGap {
    pub collector: String,
    /// Category left without this collector's evidence
    pub category: Option<Category>,
    pub reason: String,
}

impl std::fmt::Display for CollectionGap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.category {
            Some(category) => write!(f, "{} ({}): {}", self.collector, category, self.reason),
            None => write!(f, "{}: {}", self.collector, self.reason),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectorStatus {
    Ok,
    TimedOut,
    Failed,
    Malformed,
    Skipped,
}

/// Timing and outcome for a single collaborator call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorStats {
    pub name: String,
    pub duration_ms: u64,
    pub status: CollectorStatus,
    /// Evidence items or variants produced
    pub items: usize,
}

/// Everything the fan-out produced
#[derive(Debug, Clone, Default)]
pub struct Collection {
    pub evidence: Vec<EvidenceItem>,
    pub variants: Vec<DomainVariant>,
    pub gaps: Vec<CollectionGap>,
    pub stats: Vec<CollectorStats>,
}

/// Inputs of one collection run
#[derive(Debug, Clone, Copy)]
pub struct CollectionPlan<'a> {
    pub target_url: &'a str,
    /// Host of `target_url`, if it has one
    pub target_domain: Option<&'a str>,
    /// The brand's own domain, used for lookalike generation
    pub brand_domain: Option<&'a str>,
    /// Brand reference image for visual comparison
    pub reference_image: Option<&'a str>,
}

// ─── Abort ─────────────────────────────────────────────────────────

/// Cancellation signal for an analysis run. Cloneable; every clone observes
/// the same [`AbortHandle`].
#[derive(Debug, Clone)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

#[derive(Debug)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    pub fn abort(&self) {
        tracing::info!("Abort requested");
        let _ = self.tx.send(true);
    }
}

impl AbortSignal {
    pub fn new() -> (AbortHandle, AbortSignal) {
        let (tx, rx) = watch::channel(false);
        (AbortHandle { tx }, AbortSignal { rx })
    }

    /// A signal that never fires
    pub fn never() -> Self {
        Self::new().1
    }

    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the run is aborted. Pends forever if the handle is
    /// dropped without aborting.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                futures::future::pending::<()>().await;
            }
        }
    }
}

// ─── Timed execution ───────────────────────────────────────────────

/// Run one collaborator call under `timeout`, with timing and logging
pub async fn run_collector_timed<T, F>(
    name: impl Into<String>,
    timeout: Duration,
    call: F,
) -> (CollectorStats, BrandTraceResult<T>)
where
    F: Future<Output = BrandTraceResult<T>>,
{
    let name = name.into();
    let start = tokio::time::Instant::now();
    tracing::debug!("→ {}", name);

    let result = match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(BrandTraceError::CollectorTimeout {
            collector: name.clone(),
            timeout_ms: timeout.as_millis() as u64,
        }),
    };
    let duration_ms = start.elapsed().as_millis() as u64;

    let status = match &result {
        Ok(_) => {
            tracing::info!("  ✓ {} completed in {}ms", name, duration_ms);
            CollectorStatus::Ok
        }
        Err(e @ BrandTraceError::CollectorTimeout { .. }) => {
            tracing::warn!("  ✗ {}: {}", name, e);
            CollectorStatus::TimedOut
        }
        Err(e) => {
            tracing::warn!("  ✗ {} failed: {} ({}ms)", name, e, duration_ms);
            CollectorStatus::Failed
        }
    };

    (
        CollectorStats {
            name,
            duration_ms,
            status,
            items: 0,
        },
        result,
    )
}

// ─── Branch accumulation ───────────────────────────────────────────

#[derive(Debug, Default)]
struct Branch {
    evidence: Vec<EvidenceItem>,
    gaps: Vec<CollectionGap>,
    stats: Vec<CollectorStats>,
}

impl Branch {
    fn gap(&mut self, collector: &str, category: Option<Category>, reason: impl Into<String>) {
        self.gaps.push(CollectionGap {
            collector: collector.to_string(),
            category,
            reason: reason.into(),
        });
    }

    fn degrade(&mut self, collector: &str, category: Option<Category>, error: &BrandTraceError) {
        if !error.is_degradable() {
            tracing::warn!("Unexpected error from {} treated as an evidence gap: {}", collector, error);
        }
        self.gap(collector, category, error.to_string());
    }

    /// Normalize one raw response. Returns the raw value when it was
    /// accepted as evidence.
    fn absorb(
        &mut self,
        normalizer: &EvidenceCollector,
        source: EvidenceSource,
        (mut stats, result): (CollectorStats, BrandTraceResult<Value>),
    ) -> Option<Value> {
        let category = Category::for_source(source);
        let name = stats.name.clone();
        let accepted = match result {
            Ok(raw) => match normalizer.normalize(&raw, source) {
                Ok(item) => {
                    self.evidence.push(item);
                    stats.items = 1;
                    Some(raw)
                }
                Err(e) => {
                    tracing::warn!("Discarding {} response: {}", name, e);
                    stats.status = CollectorStatus::Malformed;
                    self.degrade(&name, category, &e);
                    None
                }
            },
            Err(e) => {
                self.degrade(&name, category, &e);
                None
            }
        };
        self.stats.push(stats);
        accepted
    }

    fn merge(&mut self, other: Branch) {
        self.evidence.extend(other.evidence);
        self.gaps.extend(other.gaps);
        self.stats.extend(other.stats);
    }
}

fn screenshot_refs(raw: &Value) -> Vec<String> {
    raw.get("screenshot_refs")
        .and_then(Value::as_array)
        .map(|refs| refs.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}

fn skipped(name: &str) -> CollectorStats {
    CollectorStats {
        name: name.to_string(),
        duration_ms: 0,
        status: CollectorStatus::Skipped,
        items: 0,
    }
}

// ─── Branches ──────────────────────────────────────────────────────

async fn content_branch(
    collaborators: &Collaborators,
    normalizer: &EvidenceCollector,
    config: &CollectionConfig,
    plan: CollectionPlan<'_>,
) -> Branch {
    let mut branch = Branch::default();
    let scraper = collaborators.scraper.as_ref();

    let crawl = async {
        if config.crawl_depth == 0 {
            return None;
        }
        Some(
            run_collector_timed(
                "crawl",
                config.scrape_timeout(),
                scraper.crawl(plan.target_url, config.crawl_depth),
            )
            .await,
        )
    };
    let (scraped, crawled) = tokio::join!(
        run_collector_timed("scrape", config.scrape_timeout(), scraper.scrape(plan.target_url)),
        crawl
    );

    let mut screenshots: Vec<String> = Vec::new();
    if let Some(raw) = branch.absorb(normalizer, EvidenceSource::ContentScrape, scraped) {
        screenshots.extend(screenshot_refs(&raw));
    }

    if let Some((mut stats, result)) = crawled {
        match result {
            Ok(pages) => {
                for page in &pages {
                    match normalizer.normalize(page, EvidenceSource::ContentScrape) {
                        Ok(item) => {
                            screenshots.extend(screenshot_refs(page));
                            branch.evidence.push(item);
                            stats.items += 1;
                        }
                        Err(e) => branch.degrade("crawl", Some(Category::ContentSimilarity), &e),
                    }
                }
            }
            Err(e) => branch.degrade("crawl", Some(Category::ContentSimilarity), &e),
        }
        branch.stats.push(stats);
    }

    let mut seen = std::collections::HashSet::new();
    screenshots.retain(|s| seen.insert(s.clone()));
    screenshots.truncate(config.max_screenshots);
    if screenshots.is_empty() {
        branch.gap(
            "multimodal",
            Some(Category::VisualSimilarity),
            "no screenshots available for visual analysis",
        );
        return branch;
    }

    let multimodal = collaborators.multimodal.as_ref();
    let brand = normalizer.brand();
    let analyses = futures::future::join_all(screenshots.iter().enumerate().map(|(i, shot)| {
        run_collector_timed(
            format!("analyze_image#{}", i + 1),
            config.image_timeout(),
            multimodal.analyze_image(shot, brand),
        )
    }));
    let comparisons = async {
        match plan.reference_image {
            Some(reference) => {
                futures::future::join_all(screenshots.iter().enumerate().map(|(i, shot)| {
                    run_collector_timed(
                        format!("compare_images#{}", i + 1),
                        config.image_timeout(),
                        multimodal.compare_images(reference, shot),
                    )
                }))
                .await
            }
            None => Vec::new(),
        }
    };
    let (analyses, comparisons) = tokio::join!(analyses, comparisons);

    for analysis in analyses {
        branch.absorb(normalizer, EvidenceSource::Screenshot, analysis);
    }
    for comparison in comparisons {
        branch.absorb(normalizer, EvidenceSource::ImageComparison, comparison);
    }
    branch
}

async fn domain_record_branch(
    intel: &dyn DomainIntelService,
    normalizer: &EvidenceCollector,
    config: &CollectionConfig,
    domain: Option<&str>,
    source: EvidenceSource,
) -> Branch {
    let mut branch = Branch::default();
    let name = match source {
        EvidenceSource::DnsRecord => "dns",
        _ => "whois",
    };
    let domain = match domain {
        Some(d) => d,
        None => {
            branch.stats.push(skipped(name));
            branch.gap(name, Category::for_source(source), "target URL has no host");
            return branch;
        }
    };
    let outcome = match source {
        EvidenceSource::DnsRecord => run_collector_timed(name, config.dns_timeout(), intel.dns(domain)).await,
        _ => run_collector_timed(name, config.whois_timeout(), intel.whois(domain)).await,
    };
    branch.absorb(normalizer, source, outcome);
    branch
}

async fn variant_branch(
    intel: &dyn DomainIntelService,
    analyzer: &TyposquattingAnalyzer,
    brand_domain: Option<&str>,
) -> (Vec<DomainVariant>, Branch) {
    let mut branch = Branch::default();
    let brand_domain = match brand_domain {
        Some(d) => d,
        None => {
            branch.stats.push(skipped("typosquat"));
            branch.gap("typosquat", Some(Category::DomainSuspicion), "no brand domain supplied");
            return (Vec::new(), branch);
        }
    };

    let start = tokio::time::Instant::now();
    let generated = analyzer.generate_variants(brand_domain);
    if generated.is_empty() {
        tracing::warn!("No lookalike candidates derived from '{}'", brand_domain);
        branch.stats.push(skipped("typosquat"));
        branch.gap(
            "typosquat",
            Some(Category::DomainSuspicion),
            format!("no lookalike candidates derived from '{}'", brand_domain),
        );
        return (Vec::new(), branch);
    }
    let variants = analyzer.classify(generated, intel).await;
    let unknown = variants
        .iter()
        .filter(|v| v.is_registered == RegistrationStatus::Unknown)
        .count();
    let status = if !variants.is_empty() && unknown == variants.len() {
        branch.gap(
            "typosquat",
            Some(Category::DomainSuspicion),
            format!("all {} registration lookups failed", unknown),
        );
        CollectorStatus::Failed
    } else {
        CollectorStatus::Ok
    };
    branch.stats.push(CollectorStats {
        name: "typosquat".into(),
        duration_ms: start.elapsed().as_millis() as u64,
        status,
        items: variants.len(),
    });
    (variants, branch)
}

// ─── Fan-out ───────────────────────────────────────────────────────

/// Run every collector and wait for all of them. Never fails: each
/// collector failure is recorded as a gap.
pub async fn collect(
    collaborators: &Collaborators,
    normalizer: &EvidenceCollector,
    analyzer: &TyposquattingAnalyzer,
    config: &CollectionConfig,
    plan: CollectionPlan<'_>,
) -> Collection {
    let start = tokio::time::Instant::now();
    tracing::info!(
        "Collecting evidence for '{}' at {} (lookalikes of {})",
        normalizer.brand(),
        plan.target_url,
        plan.brand_domain.unwrap_or("-")
    );
    let intel = collaborators.domain_intel.as_ref();

    let (content, whois, dns, (variants, typosquat)) = tokio::join!(
        content_branch(collaborators, normalizer, config, plan),
        domain_record_branch(intel, normalizer, config, plan.target_domain, EvidenceSource::DomainRecord),
        domain_record_branch(intel, normalizer, config, plan.target_domain, EvidenceSource::DnsRecord),
        variant_branch(intel, analyzer, plan.brand_domain),
    );

    let mut all = Branch::default();
    for branch in [content, whois, dns, typosquat] {
        all.merge(branch);
    }
    tracing::info!(
        "Collection finished in {}ms: {} evidence items, {} variants, {} gaps",
        start.elapsed().as_millis(),
        all.evidence.len(),
        variants.len(),
        all.gaps.len()
    );

    Collection {
        evidence: all.evidence,
        variants,
        gaps: all.gaps,
        stats: all.stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_timed_collector_reports_timeout() {
        let (stats, result) = run_collector_timed("whois", Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, BrandTraceError>(Value::Null)
        })
        .await;
        assert_eq!(stats.status, CollectorStatus::TimedOut);
        match result {
            Err(BrandTraceError::CollectorTimeout { collector, timeout_ms }) => {
                assert_eq!(collector, "whois");
                assert_eq!(timeout_ms, 50);
            }
            other => panic!("expected CollectorTimeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timed_collector_passes_result_through() {
        let (stats, result) =
            run_collector_timed("dns", Duration::from_secs(1), async { Ok::<_, BrandTraceError>(42) }).await;
        assert_eq!(stats.status, CollectorStatus::Ok);
        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn test_absorb_turns_malformed_into_gap() {
        let mut branch = Branch::default();
        let normalizer = EvidenceCollector::new("Acme");
        let stats = CollectorStats {
            name: "scrape".into(),
            duration_ms: 3,
            status: CollectorStatus::Ok,
            items: 0,
        };
        let accepted = branch.absorb(
            &normalizer,
            EvidenceSource::ContentScrape,
            (stats, Ok(serde_json::json!({ "markdown": "acme" }))),
        );
        assert!(accepted.is_none());
        assert!(branch.evidence.is_empty());
        assert_eq!(branch.stats[0].status, CollectorStatus::Malformed);
        assert_eq!(branch.gaps[0].category, Some(Category::ContentSimilarity));
    }

    struct ScriptedIntel;

    #[async_trait::async_trait]
    impl DomainIntelService for ScriptedIntel {
        async fn whois(&self, _domain: &str) -> BrandTraceResult<Value> {
            Ok(serde_json::json!({ "privacy_protected": true }))
        }
        async fn dns(&self, _domain: &str) -> BrandTraceResult<Value> {
            Ok(serde_json::json!({ "A": "not-a-list" }))
        }
        async fn is_registered(&self, _domain: &str) -> BrandTraceResult<crate::collectors::RegistrationLookup> {
            Ok(crate::collectors::RegistrationLookup::available())
        }
    }

    #[tokio::test]
    async fn test_dns_gap_backs_no_category() {
        let normalizer = EvidenceCollector::new("Acme");
        let branch = domain_record_branch(
            &ScriptedIntel,
            &normalizer,
            &CollectionConfig::default(),
            Some("acme-outlet.shop"),
            EvidenceSource::DnsRecord,
        )
        .await;
        assert!(branch.evidence.is_empty());
        assert_eq!(branch.gaps.len(), 1);
        assert_eq!(branch.gaps[0].collector, "dns");
        assert_eq!(branch.gaps[0].category, None, "DNS is supplementary");

        let missing_host = domain_record_branch(
            &ScriptedIntel,
            &normalizer,
            &CollectionConfig::default(),
            None,
            EvidenceSource::DnsRecord,
        )
        .await;
        assert_eq!(missing_host.gaps[0].category, None);
    }

    #[tokio::test]
    async fn test_unusable_brand_domain_records_gap() {
        let analyzer = TyposquattingAnalyzer::default();
        let (variants, branch) = variant_branch(&ScriptedIntel, &analyzer, Some("http://10.0.0.5/")).await;
        assert!(variants.is_empty());
        assert_eq!(branch.gaps.len(), 1, "an empty candidate set must not pass silently");
        assert_eq!(branch.gaps[0].collector, "typosquat");
        assert_eq!(branch.gaps[0].category, Some(Category::DomainSuspicion));
        assert_eq!(branch.stats[0].status, CollectorStatus::Skipped);

        let (variants, branch) = variant_branch(&ScriptedIntel, &analyzer, Some("https://www.acme.com/")).await;
        assert!(!variants.is_empty());
        assert!(branch.gaps.is_empty());
        assert!(variants.iter().all(|v| !v.candidate.starts_with("www")));
    }

    #[tokio::test]
    async fn test_abort_signal_fires_for_all_clones() {
        let (handle, signal) = AbortSignal::new();
        let clone = signal.clone();
        assert!(!signal.is_aborted());
        handle.abort();
        clone.cancelled().await;
        assert!(signal.is_aborted());
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_signal_does_not_fire() {
        let never = AbortSignal::never();
        let fired = tokio::time::timeout(Duration::from_secs(1), never.cancelled()).await;
        assert!(fired.is_err());
    }

    #[test]
    fn test_gap_display() {
        let gap = CollectionGap {
            collector: "dns".into(),
            category: Some(Category::RegistrantOpacity),
            reason: "timed out".into(),
        };
        assert_eq!(gap.to_string(), "dns (registrant_opacity): timed out");
    }
}
