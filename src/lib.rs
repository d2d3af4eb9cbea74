//! # brandtrace: Zero-Trust Brand Infringement Evidence Engine
//!
//! Assembles evidence about a suspected brand-infringing website from
//! untrusted collaborators (page scrapes, screenshots, WHOIS/DNS, image
//! comparison), reduces it to one auditable score, and decides whether the
//! resulting report should be handed to the takedown-notice workflow.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       AnalysisEngine                         │
//! │  ┌───────────┐ ┌────────────┐ ┌────────────┐ ┌────────────┐  │
//! │  │ Scraping  │ │ DomainIntel│ │ Multimodal │ │ Typosquat  │  │
//! │  │ (scrape)  │ │ (whois/dns)│ │ (vision)   │ │ (variants) │  │
//! │  └─────┬─────┘ └─────┬──────┘ └─────┬──────┘ └─────┬──────┘  │
//! │        └─────────────┴──── fan-out ─┴──────────────┘         │
//! │                          │ (join + timeouts)                 │
//! │  ┌───────────────────────▼────────────────────────────────┐  │
//! │  │ EvidenceCollector → ScoringEngine → ReportCompiler     │  │
//! │  └───────────────────────┬────────────────────────────────┘  │
//! │                          │                                   │
//! │  ┌───────────────────────▼────────────────────────────────┐  │
//! │  │ Session (artifact store) → HandoffCoordinator (FSM)    │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Zero-trust scoring
//!
//! Absent or unverifiable evidence never confirms or refutes infringement:
//! a category without direct evidence sits at a neutral signal and only
//! lowers the confidence band. No single category can contribute more than
//! its configured weight.

pub mod config;
pub mod evidence;
pub mod collectors;
pub mod typosquat;
pub mod engine;
pub mod report;
pub mod storage;
pub mod handoff;
pub mod session;
pub mod notice;

// Re-exports for convenience
pub use config::{BrandTraceConfig, CollectionConfig, HandoffConfig, ScoringConfig};
pub use evidence::{EvidenceCollector, EvidenceItem, EvidencePayload, EvidenceSource};
pub use collectors::{Collaborators, DomainIntelService, MultimodalService, RegistrationLookup, ScrapingService};
pub use typosquat::{DomainVariant, RegistrationStatus, Technique, TyposquattingAnalyzer};
pub use engine::scoring::{Category, CompositeScore, ConfidenceBand, ScoreBreakdown, ScoringEngine};
pub use engine::{AbortHandle, AbortSignal, AnalysisEngine, AnalysisOutcome, AnalysisRequest, CollectionGap, CollectorStats};
pub use report::{PersistedReport, Report, ReportCompiler, ReportFormat};
pub use storage::{ArtifactStore, FsArtifactStore, MemoryArtifactStore};
pub use handoff::{HandoffContext, HandoffCoordinator, HandoffDecision, HandoffState};
pub use session::{Session, SessionId, SessionSummary};
pub use notice::{ClaimantDetails, NoticeDetails, NoticeDrafter, TakedownNotice};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrandTraceError {
    #[error("Malformed {origin} evidence: {reason}")]
    MalformedEvidence {
        origin: EvidenceSource,
        reason: String,
    },

    #[error("Collector '{collector}' timed out after {timeout_ms}ms")]
    CollectorTimeout { collector: String, timeout_ms: u64 },

    #[error("Collector '{collector}' failed: {message}")]
    Collaborator { collector: String, message: String },

    #[error("Nothing to hand off yet for session {0}")]
    NoPendingHandoff(String),

    #[error("Session {requester} attempted to use the handoff context of session {owner}")]
    CrossSessionHandoffViolation { owner: String, requester: String },

    #[error("Unrecognized score category: {0}")]
    UnknownCategory(String),

    #[error("Invalid scoring weights: {0}")]
    InvalidWeights(String),

    #[error("Artifact already exists: {0}")]
    ArtifactExists(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Session {0} has already ended")]
    SessionEnded(String),

    #[error("Analysis aborted")]
    Aborted,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl BrandTraceError {
    pub(crate) fn malformed(origin: EvidenceSource, reason: impl Into<String>) -> Self {
        Self::MalformedEvidence {
            origin,
            reason: reason.into(),
        }
    }

    /// Whether the pipeline degrades this error into a category gap
    /// instead of failing the analysis.
    pub fn is_degradable(&self) -> bool {
        matches!(
            self,
            Self::MalformedEvidence { .. } | Self::CollectorTimeout { .. } | Self::Collaborator { .. }
        )
    }
}

pub type BrandTraceResult<T> = Result<T, BrandTraceError>;
