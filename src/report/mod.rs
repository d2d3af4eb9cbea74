//! Report compilation and persistence
//!
//! A [`Report`] freezes everything one analysis run decided: the composite
//! score, the evidence behind it, classified lookalike domains and the
//! collection gaps. Renderers are pure functions of the report.
//!
//! Persistence is versioned and write-once: each call to
//! [`ReportCompiler::persist`] stores `reports/brand_report_vNNN.{md,json}`
//! under the next free version, leaving earlier versions untouched.

pub mod json;
pub mod markdown;

use crate::engine::pipeline::CollectionGap;
use crate::engine::scoring::{Category, CompositeScore};
use crate::evidence::EvidenceItem;
use crate::session::Session;
use crate::storage::{self, ArtifactStore};
use crate::typosquat::{self, DomainVariant};
use crate::BrandTraceResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const REPORT_DIR: &str = "reports";
pub const REPORT_STEM: &str = "brand_report";

/// Output format for a report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    /// Human-readable Markdown with the breakdown table and appendix
    Markdown,
    /// Structured JSON (machine-readable)
    Json,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Markdown => "md",
            Self::Json => "json",
        }
    }
}

/// Render a report to a string
pub fn render_report(report: &Report, format: ReportFormat) -> BrandTraceResult<String> {
    match format {
        ReportFormat::Markdown => Ok(markdown::render(report)),
        ReportFormat::Json => json::render(report),
    }
}

// ─── Report ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub session_id: String,
    pub brand: String,
    pub target_url: String,
    pub score: CompositeScore,
    pub evidence: Vec<EvidenceItem>,
    /// Every generated lookalike with its classification
    pub variants: Vec<DomainVariant>,
    /// Collectors that produced no usable evidence
    pub gaps: Vec<CollectionGap>,
    pub generated_at: DateTime<Utc>,
    /// Assigned on persistence; 0 until then
    pub version: u32,
}

impl Report {
    pub fn registered_variants(&self) -> Vec<&DomainVariant> {
        typosquat::registered_variants(&self.variants).collect()
    }

    /// Categories backed by direct evidence, in breakdown order
    pub fn direct_categories(&self) -> Vec<Category> {
        self.score
            .breakdown
            .iter()
            .filter(|b| b.direct)
            .map(|b| b.category)
            .collect()
    }

    pub fn is_persisted(&self) -> bool {
        self.version > 0
    }
}

/// Where a persisted report landed
#[derive(Debug, Clone)]
pub struct PersistedReport {
    pub report: Arc<Report>,
    pub markdown_key: String,
    pub json_key: String,
    /// Full location of the markdown artifact
    pub location: String,
}

// ─── Compiler ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct ReportCompiler;

impl ReportCompiler {
    pub fn new() -> Self {
        Self
    }

    pub fn compile(
        &self,
        session: &Session,
        score: CompositeScore,
        evidence: Vec<EvidenceItem>,
        variants: Vec<DomainVariant>,
        gaps: Vec<CollectionGap>,
    ) -> Report {
        Report {
            session_id: session.id().to_string(),
            brand: session.brand().to_string(),
            target_url: session.target_url().to_string(),
            score,
            evidence,
            variants,
            gaps,
            generated_at: Utc::now(),
            version: 0,
        }
    }

    /// Store the report under the next free version. Never overwrites.
    ///
    /// The JSON artifact is canonical and goes first: if it cannot be
    /// written, nothing is stored. A markdown failure after it still
    /// returns an error, but the version stays claimed and loadable.
    pub fn persist(&self, store: &dyn ArtifactStore, mut report: Report) -> BrandTraceResult<PersistedReport> {
        report.version = storage::next_version(store, REPORT_DIR, REPORT_STEM)?;

        let markdown_key = storage::versioned_key(
            REPORT_DIR,
            REPORT_STEM,
            report.version,
            ReportFormat::Markdown.extension(),
        );
        let json_key = storage::versioned_key(
            REPORT_DIR,
            REPORT_STEM,
            report.version,
            ReportFormat::Json.extension(),
        );

        let rendered = render_report(&report, ReportFormat::Markdown)?;
        let structured = render_report(&report, ReportFormat::Json)?;
        store.put_new(&json_key, structured.as_bytes())?;
        let location = store.put_new(&markdown_key, rendered.as_bytes()).map_err(|e| {
            tracing::error!("Report v{:03} stored as JSON only: {}", report.version, e);
            e
        })?;

        tracing::info!(
            "Persisted report v{:03} for session {} ({:.2}/100, {} band) to {}",
            report.version,
            report.session_id,
            report.score.value,
            report.score.confidence_band,
            location
        );

        Ok(PersistedReport {
            report: Arc::new(report),
            markdown_key,
            json_key,
            location,
        })
    }

    /// Load a persisted report back from its JSON artifact
    pub fn load(&self, store: &dyn ArtifactStore, version: u32) -> BrandTraceResult<Report> {
        let key = storage::versioned_key(
            REPORT_DIR,
            REPORT_STEM,
            version,
            ReportFormat::Json.extension(),
        );
        let bytes = store.get(&key)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
