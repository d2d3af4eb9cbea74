//! # Analysis Engine
//!
//! Drives one analysis for a session:
//!
//! - `pipeline`: concurrent evidence collection with per-call timeouts
//! - `scoring`: weighted zero-trust composite score
//!
//! Collection finishes completely before scoring starts. An abort during
//! collection discards in-flight results and persists nothing.

pub mod pipeline;
pub mod scoring;

pub use pipeline::{AbortHandle, AbortSignal, CollectionGap, CollectorStats, CollectorStatus};

use crate::collectors::Collaborators;
use crate::config::BrandTraceConfig;
use crate::evidence::EvidenceCollector;
use crate::handoff::HandoffDecision;
use crate::report::Report;
use crate::session::Session;
use crate::typosquat::{self, TyposquattingAnalyzer};
use crate::{BrandTraceError, BrandTraceResult};
use pipeline::CollectionPlan;
use scoring::ScoringEngine;
use std::sync::Arc;

// ─── Request / Outcome ─────────────────────────────────────────────

/// Optional inputs for one analysis. Brand and target come from the session.
#[derive(Debug, Clone, Default)]
pub struct AnalysisRequest {
    /// The brand's legitimate domain, seed for lookalike generation
    pub brand_domain: Option<String>,
    /// Brand reference image (URL or path understood by the multimodal service)
    pub reference_image: Option<String>,
}

impl AnalysisRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_brand_domain(mut self, domain: impl Into<String>) -> Self {
        self.brand_domain = Some(domain.into());
        self
    }

    pub fn with_reference_image(mut self, image: impl Into<String>) -> Self {
        self.reference_image = Some(image.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub report: Arc<Report>,
    pub markdown_key: String,
    pub json_key: String,
    /// Full location of the markdown artifact
    pub location: String,
    pub stats: Vec<CollectorStats>,
    pub handoff: HandoffDecision,
    pub duration_ms: u64,
}

impl AnalysisOutcome {
    pub fn gaps(&self) -> &[CollectionGap] {
        &self.report.gaps
    }
}

// ─── Engine ────────────────────────────────────────────────────────

pub struct AnalysisEngine {
    config: BrandTraceConfig,
    collaborators: Collaborators,
    scoring: ScoringEngine,
    analyzer: TyposquattingAnalyzer,
}

impl AnalysisEngine {
    pub fn new(config: BrandTraceConfig, collaborators: Collaborators) -> BrandTraceResult<Self> {
        config.validate()?;
        let scoring = ScoringEngine::new(&config.scoring)?;
        let analyzer = TyposquattingAnalyzer::new(&config.collection);
        Ok(Self {
            config,
            collaborators,
            scoring,
            analyzer,
        })
    }

    pub fn config(&self) -> &BrandTraceConfig {
        &self.config
    }

    /// Open a filesystem-backed session under the configured storage root
    pub fn open_session(&self, brand: &str, target_url: &str) -> BrandTraceResult<Session> {
        Session::create(&self.config, brand, target_url)
    }

    /// Collect, score, compile and persist one report for `session`.
    ///
    /// Returns [`BrandTraceError::Aborted`] if `abort` fires before
    /// collection completes; the session is then left without a new report.
    pub async fn analyze(
        &self,
        session: &mut Session,
        request: &AnalysisRequest,
        abort: &AbortSignal,
    ) -> BrandTraceResult<AnalysisOutcome> {
        let start = tokio::time::Instant::now();
        tracing::info!("═══════════════════════════════════════════════════════");
        tracing::info!("Brand analysis: '{}' at {} (session {})", session.brand(), session.target_url(), session.id());
        tracing::info!("═══════════════════════════════════════════════════════");

        if abort.is_aborted() {
            return Err(BrandTraceError::Aborted);
        }

        let target_domain = target_host(session.target_url());
        if target_domain.is_none() {
            tracing::warn!("Could not determine a host for {}", session.target_url());
        }
        let normalizer = EvidenceCollector::new(session.brand());
        let plan = CollectionPlan {
            target_url: session.target_url(),
            target_domain: target_domain.as_deref(),
            brand_domain: request.brand_domain.as_deref(),
            reference_image: request.reference_image.as_deref(),
        };

        // ── Step 1: Collect (all branches complete, or abort) ──
        let collection = tokio::select! {
            biased;
            _ = abort.cancelled() => {
                tracing::warn!("Analysis aborted during collection; discarding in-flight results");
                return Err(BrandTraceError::Aborted);
            }
            collection = pipeline::collect(
                &self.collaborators,
                &normalizer,
                &self.analyzer,
                &self.config.collection,
                plan,
            ) => collection,
        };

        // ── Step 2: Score ──
        let score = self.scoring.compute_score(&collection.evidence, &collection.variants);
        tracing::info!(
            "Composite score {:.2} ({} confidence, {} direct categories)",
            score.value,
            score.confidence_band,
            score.direct_categories()
        );

        // ── Step 3: Compile, persist, evaluate handoff ──
        let report = session.compiler().compile(
            session,
            score,
            collection.evidence,
            collection.variants,
            collection.gaps,
        );
        let (persisted, handoff) = session.record_report(report)?;

        let duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!("Analysis complete in {}ms: {}", duration_ms, persisted.markdown_key);

        Ok(AnalysisOutcome {
            report: persisted.report,
            markdown_key: persisted.markdown_key,
            json_key: persisted.json_key,
            location: persisted.location,
            stats: collection.stats,
            handoff,
            duration_ms,
        })
    }
}

impl std::fmt::Debug for AnalysisEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisEngine")
            .field("config", &self.config)
            .field("collaborators", &self.collaborators)
            .finish()
    }
}

fn target_host(target_url: &str) -> Option<String> {
    typosquat::normalize_host(target_url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_host() {
        assert_eq!(target_host("https://www.Acme-Outlet.shop/deals").as_deref(), Some("acme-outlet.shop"));
        assert_eq!(target_host("acme-outlet.shop/deals").as_deref(), Some("acme-outlet.shop"));
        assert_eq!(target_host("http://10.0.0.5:8080/x").as_deref(), Some("10.0.0.5"));
        assert_eq!(target_host(""), None);
    }

    #[test]
    fn test_request_builder() {
        let request = AnalysisRequest::new()
            .with_brand_domain("acme.com")
            .with_reference_image("https://acme.com/logo.png");
        assert_eq!(request.brand_domain.as_deref(), Some("acme.com"));
        assert!(request.reference_image.is_some());
    }
}
