//! Handoff to the notice-drafting workflow
//!
//! An explicit state machine per session:
//!
//! ```text
//!   Idle ──warranted report──▶ Pending ──accept(owner)──▶ Accepted
//!                               │  ▲                        │
//!                               │  └──warranted report──────┘
//!                               │  (a newer report supersedes the context)
//!                               └──session teardown──▶ Expired
//! ```
//!
//! Only the owning session may read or accept its context. Any other
//! requester gets `CrossSessionHandoffViolation`, whatever the state.

use crate::config::HandoffConfig;
use crate::engine::scoring::{Category, CompositeScore, ConfidenceBand};
use crate::report::{PersistedReport, Report};
use crate::session::SessionId;
use crate::storage::{self, ArtifactStore};
use crate::{BrandTraceError, BrandTraceResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

pub const HANDOFF_DIR: &str = "handoff";

/// A report handed to the receiving workflow, referenced rather than copied
#[derive(Debug, Clone, Serialize)]
pub struct HandoffContext {
    pub session_id: String,
    #[serde(skip)]
    pub report_ref: Arc<Report>,
    /// Store key of the referenced report's rendered artifact
    pub report_key: String,
    pub report_version: u32,
    pub score: f64,
    pub confidence_band: ConfidenceBand,
    pub reason: String,
    pub created_at: DateTime<Utc>,
    /// Version of this context's own artifact
    pub version: u32,
}

#[derive(Debug, Clone)]
pub enum HandoffState {
    Idle,
    Pending(HandoffContext),
    Accepted(HandoffContext),
    Expired,
}

impl HandoffState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Pending(_) => "pending",
            Self::Accepted(_) => "accepted",
            Self::Expired => "expired",
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }
}

/// What the coordinator did with a freshly persisted report
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum HandoffDecision {
    NotWarranted,
    Pending { reason: String, superseded: bool },
}

#[derive(Serialize)]
struct AcceptanceRecord<'a> {
    session_id: &'a str,
    context_version: u32,
    report_key: &'a str,
    accepted_at: DateTime<Utc>,
}

// ─── Coordinator ───────────────────────────────────────────────────

#[derive(Debug)]
pub struct HandoffCoordinator {
    owner: SessionId,
    score_threshold: f64,
    high_suspicion_signal: f64,
    state: HandoffState,
}

impl HandoffCoordinator {
    pub fn new(owner: SessionId, config: &HandoffConfig, high_suspicion_signal: f64) -> Self {
        Self {
            owner,
            score_threshold: config.score_threshold,
            high_suspicion_signal,
            state: HandoffState::Idle,
        }
    }

    pub fn state(&self) -> &HandoffState {
        &self.state
    }

    /// Reason a handoff is warranted for `score`, if it is
    pub fn warranted(&self, score: &CompositeScore) -> Option<String> {
        if score.value > self.score_threshold {
            return Some(format!(
                "composite score {:.2} exceeds threshold {:.2}",
                score.value, self.score_threshold
            ));
        }
        if score.confidence_band >= ConfidenceBand::Medium {
            let hot = score.high_suspicion_categories(self.high_suspicion_signal);
            if !hot.is_empty() {
                let names: Vec<&str> = hot.iter().map(Category::key).collect();
                return Some(format!(
                    "{} confidence with high-suspicion categories: {}",
                    score.confidence_band,
                    names.join(", ")
                ));
            }
        }
        None
    }

    /// Evaluate a persisted report and move to `Pending` when warranted
    pub fn on_report(
        &mut self,
        persisted: &PersistedReport,
        store: &dyn ArtifactStore,
    ) -> BrandTraceResult<HandoffDecision> {
        if matches!(self.state, HandoffState::Expired) {
            return Err(BrandTraceError::SessionEnded(self.owner.to_string()));
        }
        let report = &persisted.report;
        let reason = match self.warranted(&report.score) {
            Some(reason) => reason,
            None => {
                tracing::debug!(
                    "Report v{:03} does not warrant a handoff; staying {}",
                    report.version,
                    self.state.name()
                );
                return Ok(HandoffDecision::NotWarranted);
            }
        };

        let version = storage::next_version(store, HANDOFF_DIR, "context")?;
        let context = HandoffContext {
            session_id: self.owner.to_string(),
            report_ref: Arc::clone(report),
            report_key: persisted.markdown_key.clone(),
            report_version: report.version,
            score: report.score.value,
            confidence_band: report.score.confidence_band,
            reason: reason.clone(),
            created_at: Utc::now(),
            version,
        };
        let key = storage::versioned_key(HANDOFF_DIR, "context", version, "json");
        store.put_new(&key, serde_json::to_string_pretty(&context)?.as_bytes())?;

        let superseded = self.state.is_pending();
        if superseded {
            tracing::info!("Pending handoff for session {} superseded by report v{:03}", self.owner, report.version);
        }
        tracing::info!("Handoff pending for session {}: {}", self.owner, reason);
        self.state = HandoffState::Pending(context);
        Ok(HandoffDecision::Pending { reason, superseded })
    }

    fn check_owner(&self, requester: &SessionId) -> BrandTraceResult<()> {
        if *requester != self.owner {
            tracing::error!(
                "Session {} requested the handoff context of session {}",
                requester,
                self.owner
            );
            return Err(BrandTraceError::CrossSessionHandoffViolation {
                owner: self.owner.to_string(),
                requester: requester.to_string(),
            });
        }
        Ok(())
    }

    pub fn get_context(&self, requester: &SessionId) -> BrandTraceResult<&HandoffContext> {
        self.check_owner(requester)?;
        match &self.state {
            HandoffState::Pending(context) => Ok(context),
            _ => Err(BrandTraceError::NoPendingHandoff(self.owner.to_string())),
        }
    }

    /// Hand the pending report to the receiving workflow
    pub fn accept(&mut self, requester: &SessionId, store: &dyn ArtifactStore) -> BrandTraceResult<Arc<Report>> {
        self.check_owner(requester)?;
        let context = match &self.state {
            HandoffState::Pending(context) => context,
            HandoffState::Expired => return Err(BrandTraceError::SessionEnded(self.owner.to_string())),
            _ => return Err(BrandTraceError::NoPendingHandoff(self.owner.to_string())),
        };

        let record = AcceptanceRecord {
            session_id: &context.session_id,
            context_version: context.version,
            report_key: &context.report_key,
            accepted_at: Utc::now(),
        };
        let key = storage::versioned_key(HANDOFF_DIR, "accepted", context.version, "json");
        store.put_new(&key, serde_json::to_string_pretty(&record)?.as_bytes())?;

        let context = match std::mem::replace(&mut self.state, HandoffState::Idle) {
            HandoffState::Pending(context) => context,
            other => {
                self.state = other;
                return Err(BrandTraceError::NoPendingHandoff(self.owner.to_string()));
            }
        };
        let report = Arc::clone(&context.report_ref);
        tracing::info!(
            "Handoff accepted for session {} (report v{:03})",
            self.owner,
            context.report_version
        );
        self.state = HandoffState::Accepted(context);
        Ok(report)
    }

    /// Teardown. Returns whether a pending context was discarded.
    pub fn expire(&mut self) -> bool {
        match self.state {
            HandoffState::Pending(_) => {
                tracing::info!("Session {} ended with an unaccepted handoff; context expired", self.owner);
                self.state = HandoffState::Expired;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::scoring::ScoreBreakdown;
    use crate::storage::MemoryArtifactStore;

    fn make_score(value: f64, band: ConfidenceBand, hot: Option<Category>) -> CompositeScore {
        let breakdown = Category::ALL
            .iter()
            .map(|&c| {
                let raw = if Some(c) == hot { 0.9 } else { 0.5 };
                ScoreBreakdown {
                    category: c,
                    weight: c.default_weight(),
                    raw_signal: raw,
                    contribution: c.default_weight() * raw,
                    direct: Some(c) == hot,
                    evidence_count: usize::from(Some(c) == hot),
                }
            })
            .collect();
        CompositeScore {
            value,
            confidence_band: band,
            breakdown,
        }
    }

    fn persisted(owner: &SessionId, score: CompositeScore, version: u32) -> PersistedReport {
        let report = Report {
            session_id: owner.to_string(),
            brand: "Acme".into(),
            target_url: "https://acme-outlet.shop".into(),
            score,
            evidence: vec![],
            variants: vec![],
            gaps: vec![],
            generated_at: Utc::now(),
            version,
        };
        PersistedReport {
            report: Arc::new(report),
            markdown_key: format!("reports/brand_report_v{:03}.md", version),
            json_key: format!("reports/brand_report_v{:03}.json", version),
            location: String::new(),
        }
    }

    fn make_coordinator() -> (SessionId, HandoffCoordinator, MemoryArtifactStore) {
        let owner = SessionId::new();
        let coordinator = HandoffCoordinator::new(owner.clone(), &HandoffConfig::default(), 0.8);
        let store = MemoryArtifactStore::new(owner.to_string());
        (owner, coordinator, store)
    }

    #[test]
    fn test_high_score_goes_pending() {
        let (owner, mut coord, store) = make_coordinator();
        let decision = coord
            .on_report(&persisted(&owner, make_score(82.5, ConfidenceBand::High, None), 1), &store)
            .unwrap();
        assert!(matches!(decision, HandoffDecision::Pending { superseded: false, .. }));
        assert!(coord.state().is_pending());
        assert!(store.get("handoff/context_v001.json").is_ok());
    }

    #[test]
    fn test_threshold_is_strict() {
        let (owner, mut coord, store) = make_coordinator();
        let decision = coord
            .on_report(&persisted(&owner, make_score(70.0, ConfidenceBand::High, None), 1), &store)
            .unwrap();
        assert_eq!(decision, HandoffDecision::NotWarranted);
        assert!(matches!(coord.state(), HandoffState::Idle));
    }

    #[test]
    fn test_medium_band_with_hot_category_is_warranted() {
        let (_owner, coord, _store) = make_coordinator();
        let hot = make_score(55.0, ConfidenceBand::Medium, Some(Category::VisualSimilarity));
        assert!(coord.warranted(&hot).unwrap().contains("visual_similarity"));

        let low_band = make_score(55.0, ConfidenceBand::Low, Some(Category::VisualSimilarity));
        assert!(coord.warranted(&low_band).is_none());
    }

    #[test]
    fn test_accept_once_then_no_pending() {
        let (owner, mut coord, store) = make_coordinator();
        coord
            .on_report(&persisted(&owner, make_score(90.0, ConfidenceBand::High, None), 1), &store)
            .unwrap();
        let report = coord.accept(&owner, &store).unwrap();
        assert_eq!(report.version, 1);
        assert!(matches!(coord.state(), HandoffState::Accepted(_)));
        assert!(store.get("handoff/accepted_v001.json").is_ok());

        match coord.accept(&owner, &store) {
            Err(BrandTraceError::NoPendingHandoff(id)) => assert_eq!(id, owner.to_string()),
            other => panic!("expected NoPendingHandoff, got {:?}", other),
        }
    }

    #[test]
    fn test_warranted_report_after_accept_reopens_pending() {
        let (owner, mut coord, store) = make_coordinator();
        coord
            .on_report(&persisted(&owner, make_score(90.0, ConfidenceBand::High, None), 1), &store)
            .unwrap();
        coord.accept(&owner, &store).unwrap();

        let quiet = coord
            .on_report(&persisted(&owner, make_score(40.0, ConfidenceBand::Low, None), 2), &store)
            .unwrap();
        assert_eq!(quiet, HandoffDecision::NotWarranted);
        assert!(matches!(coord.state(), HandoffState::Accepted(_)));

        let decision = coord
            .on_report(&persisted(&owner, make_score(85.0, ConfidenceBand::High, None), 3), &store)
            .unwrap();
        assert!(
            matches!(decision, HandoffDecision::Pending { superseded: false, .. }),
            "an accepted context is not superseded: {:?}",
            decision
        );
        let context = coord.get_context(&owner).unwrap();
        assert_eq!(context.report_version, 3);
        assert_eq!(context.version, 2);

        let handed = coord.accept(&owner, &store).unwrap();
        assert_eq!(handed.version, 3);
        assert!(store.get("handoff/accepted_v002.json").is_ok());
        assert!(store.get("handoff/accepted_v001.json").is_ok());
    }

    #[test]
    fn test_other_session_is_rejected() {
        let (owner, mut coord, store) = make_coordinator();
        coord
            .on_report(&persisted(&owner, make_score(90.0, ConfidenceBand::High, None), 1), &store)
            .unwrap();
        let intruder = SessionId::new();
        assert!(matches!(
            coord.get_context(&intruder),
            Err(BrandTraceError::CrossSessionHandoffViolation { .. })
        ));
        assert!(matches!(
            coord.accept(&intruder, &store),
            Err(BrandTraceError::CrossSessionHandoffViolation { .. })
        ));
        assert!(coord.state().is_pending(), "a rejected request must not consume the context");
    }

    #[test]
    fn test_idle_get_context_is_no_pending() {
        let (owner, coord, _store) = make_coordinator();
        assert!(matches!(
            coord.get_context(&owner),
            Err(BrandTraceError::NoPendingHandoff(_))
        ));
    }

    #[test]
    fn test_newer_warranted_report_supersedes() {
        let (owner, mut coord, store) = make_coordinator();
        coord
            .on_report(&persisted(&owner, make_score(75.0, ConfidenceBand::High, None), 1), &store)
            .unwrap();
        let decision = coord
            .on_report(&persisted(&owner, make_score(88.0, ConfidenceBand::High, None), 2), &store)
            .unwrap();
        assert!(matches!(decision, HandoffDecision::Pending { superseded: true, .. }));
        let context = coord.get_context(&owner).unwrap();
        assert_eq!(context.report_version, 2);
        assert_eq!(context.version, 2);
    }

    #[test]
    fn test_non_warranted_report_keeps_pending() {
        let (owner, mut coord, store) = make_coordinator();
        coord
            .on_report(&persisted(&owner, make_score(80.0, ConfidenceBand::High, None), 1), &store)
            .unwrap();
        coord
            .on_report(&persisted(&owner, make_score(20.0, ConfidenceBand::Low, None), 2), &store)
            .unwrap();
        assert_eq!(coord.get_context(&owner).unwrap().report_version, 1);
    }

    #[test]
    fn test_expire_discards_pending() {
        let (owner, mut coord, store) = make_coordinator();
        coord
            .on_report(&persisted(&owner, make_score(80.0, ConfidenceBand::High, None), 1), &store)
            .unwrap();
        assert!(coord.expire());
        assert!(matches!(coord.state(), HandoffState::Expired));
        assert!(coord.get_context(&owner).is_err());
        assert!(matches!(
            coord.on_report(&persisted(&owner, make_score(80.0, ConfidenceBand::High, None), 2), &store),
            Err(BrandTraceError::SessionEnded(_))
        ));
    }
}
