//! Zero-trust composite scoring
//!
//! Reduces normalized evidence and classified domain variants to a 0-100
//! score over a fixed set of categories. Each category's raw signal is
//! clamped to [0, 1] before weighting, so no single source can contribute
//! more than its category weight. A category with no direct evidence sits
//! at the configured neutral signal and lowers the confidence band instead
//! of the score.

use crate::config::ScoringConfig;
use crate::evidence::{EvidenceItem, EvidenceSource};
use crate::typosquat::{DomainVariant, RegistrationStatus};
use crate::BrandTraceResult;
use serde::{Deserialize, Serialize};

// ─── Categories ────────────────────────────────────────────────────

/// Fixed scoring categories, in evaluation (and report) order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    ContentSimilarity,
    VisualSimilarity,
    DomainSuspicion,
    RegistrantOpacity,
}

impl Category {
    pub const COUNT: usize = 4;

    pub const ALL: [Category; Category::COUNT] = [
        Self::ContentSimilarity,
        Self::VisualSimilarity,
        Self::DomainSuspicion,
        Self::RegistrantOpacity,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Self::ContentSimilarity => "content_similarity",
            Self::VisualSimilarity => "visual_similarity",
            Self::DomainSuspicion => "domain_suspicion",
            Self::RegistrantOpacity => "registrant_opacity",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.key() == key)
    }

    pub fn index(&self) -> usize {
        match self {
            Self::ContentSimilarity => 0,
            Self::VisualSimilarity => 1,
            Self::DomainSuspicion => 2,
            Self::RegistrantOpacity => 3,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::ContentSimilarity => "Content Similarity",
            Self::VisualSimilarity => "Visual / Logo Similarity",
            Self::DomainSuspicion => "Domain Registration Suspicion",
            Self::RegistrantOpacity => "Contact / Registrar Opacity",
        }
    }

    /// Default points out of 100. Visual evidence is weighted highest.
    pub fn default_weight(&self) -> f64 {
        match self {
            Self::ContentSimilarity => 30.0,
            Self::VisualSimilarity => 35.0,
            Self::DomainSuspicion => 20.0,
            Self::RegistrantOpacity => 15.0,
        }
    }

    /// Category fed by an evidence source. Domain suspicion is fed by
    /// classified variants, never by evidence items. DNS records are
    /// supplementary: kept in the appendix, scored nowhere.
    pub fn for_source(source: EvidenceSource) -> Option<Self> {
        match source {
            EvidenceSource::ContentScrape => Some(Self::ContentSimilarity),
            EvidenceSource::Screenshot | EvidenceSource::ImageComparison => Some(Self::VisualSimilarity),
            EvidenceSource::DomainRecord => Some(Self::RegistrantOpacity),
            EvidenceSource::DnsRecord => None,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

// ─── Score types ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceBand {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for ConfidenceBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// One row of the per-category breakdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub category: Category,
    /// Configured points for this category
    pub weight: f64,
    /// Clamped signal in [0, 1]; the neutral default when `direct` is false
    pub raw_signal: f64,
    /// `weight * raw_signal`, never more than `weight`
    pub contribution: f64,
    /// Whether the raw signal came from direct evidence
    pub direct: bool,
    /// Evidence items (or classified variants) behind the signal
    pub evidence_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeScore {
    /// Composite in [0, 100]
    pub value: f64,
    pub confidence_band: ConfidenceBand,
    /// One row per category, in `Category::ALL` order
    pub breakdown: Vec<ScoreBreakdown>,
}

impl CompositeScore {
    /// Recompute the composite from a breakdown. Summation runs in row
    /// order, so the result is bit-for-bit reproducible.
    pub fn recompute(breakdown: &[ScoreBreakdown]) -> f64 {
        let total: f64 = breakdown.iter().map(|b| b.contribution).sum();
        total.clamp(0.0, 100.0)
    }

    pub fn row(&self, category: Category) -> Option<&ScoreBreakdown> {
        self.breakdown.iter().find(|b| b.category == category)
    }

    pub fn direct_categories(&self) -> usize {
        self.breakdown.iter().filter(|b| b.direct).count()
    }

    /// Direct categories whose signal reaches `threshold`
    pub fn high_suspicion_categories(&self, threshold: f64) -> Vec<Category> {
        self.breakdown
            .iter()
            .filter(|b| b.direct && b.raw_signal >= threshold)
            .map(|b| b.category)
            .collect()
    }
}

/// Evidence level wording used in reports
pub fn evidence_level(value: f64) -> &'static str {
    if value >= 80.0 {
        "STRONG"
    } else if value >= 50.0 {
        "POTENTIAL"
    } else {
        "INSUFFICIENT"
    }
}

// ─── Engine ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ScoringEngine {
    weights: [f64; Category::COUNT],
    neutral_signal: f64,
    min_direct_categories: usize,
}

impl ScoringEngine {
    /// Build an engine, failing on any weight-table invariant violation
    pub fn new(config: &ScoringConfig) -> BrandTraceResult<Self> {
        config.validate()?;
        Ok(Self {
            weights: config.resolved_weights()?,
            neutral_signal: config.neutral_signal,
            min_direct_categories: config.min_direct_categories,
        })
    }

    pub fn neutral_signal(&self) -> f64 {
        self.neutral_signal
    }

    pub fn weight(&self, category: Category) -> f64 {
        self.weights[category.index()]
    }

    pub fn compute_score(
        &self,
        evidence: &[EvidenceItem],
        variants: &[DomainVariant],
    ) -> CompositeScore {
        let breakdown: Vec<ScoreBreakdown> = Category::ALL
            .iter()
            .map(|&category| {
                let signal = match category {
                    Category::DomainSuspicion => domain_signal(variants),
                    _ => evidence_signal(category, evidence),
                };
                let (raw_signal, direct, evidence_count) = match signal {
                    Some((s, n)) => (s.clamp(0.0, 1.0), true, n),
                    None => (self.neutral_signal, false, 0),
                };
                let weight = self.weight(category);
                ScoreBreakdown {
                    category,
                    weight,
                    raw_signal,
                    contribution: weight * raw_signal,
                    direct,
                    evidence_count,
                }
            })
            .collect();

        let direct = breakdown.iter().filter(|b| b.direct).count();
        let confidence_band = if direct < self.min_direct_categories {
            ConfidenceBand::Low
        } else if direct == Category::COUNT {
            ConfidenceBand::High
        } else {
            ConfidenceBand::Medium
        };

        let value = CompositeScore::recompute(&breakdown);
        tracing::debug!(
            "Score {:.2}/100 ({} band, {}/{} direct categories)",
            value,
            confidence_band,
            direct,
            Category::COUNT
        );

        CompositeScore {
            value,
            confidence_band,
            breakdown,
        }
    }

    /// Score with every category at its neutral default
    pub fn neutral_score(&self) -> CompositeScore {
        self.compute_score(&[], &[])
    }
}

/// Confidence-weighted mean of the category's item signals.
/// `None` when no item with non-zero confidence exists.
fn evidence_signal(category: Category, evidence: &[EvidenceItem]) -> Option<(f64, usize)> {
    let mut weighted = 0.0;
    let mut total_confidence = 0.0;
    let mut count = 0usize;
    for item in evidence {
        if Category::for_source(item.source()) != Some(category) || item.confidence() <= 0.0 {
            continue;
        }
        weighted += item.signal() * item.confidence();
        total_confidence += item.confidence();
        count += 1;
    }
    if count == 0 {
        None
    } else {
        Some((weighted / total_confidence, count))
    }
}

/// Registered lookalikes raise suspicion. Unknown lookups are not evidence
/// either way.
fn domain_signal(variants: &[DomainVariant]) -> Option<(f64, usize)> {
    let mut registered = 0usize;
    let mut resolved = 0usize;
    for v in variants {
        match v.is_registered {
            RegistrationStatus::Registered => {
                registered += 1;
                resolved += 1;
            }
            RegistrationStatus::NotRegistered => resolved += 1,
            RegistrationStatus::Unknown | RegistrationStatus::Unchecked => {}
        }
    }
    if resolved == 0 {
        return None;
    }
    let signal = if registered == 0 {
        0.0
    } else {
        (0.7 + 0.1 * (registered - 1) as f64).min(1.0)
    };
    Some((signal, resolved))
}
