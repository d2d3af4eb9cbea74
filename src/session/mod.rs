//! Session: the root aggregate of one analysis interaction
//!
//! A session owns its artifact store, every report persisted during the
//! interaction and the handoff coordinator. Nothing here is shared across
//! sessions; ending a session consumes it and expires any pending handoff.

use crate::config::BrandTraceConfig;
use crate::handoff::{HandoffContext, HandoffCoordinator, HandoffDecision, HandoffState};
use crate::notice::TakedownNotice;
use crate::report::{PersistedReport, Report, ReportCompiler};
use crate::storage::{ArtifactStore, FsArtifactStore, MemoryArtifactStore};
use crate::{BrandTraceError, BrandTraceResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SessionId {
    type Err = BrandTraceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| BrandTraceError::Config(format!("invalid session id '{}': {}", s, e)))
    }
}

/// What a session left behind at teardown
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub brand: String,
    pub target_url: String,
    pub storage: String,
    pub reports_persisted: usize,
    pub notices_persisted: usize,
    /// Final handoff state name
    pub handoff_state: String,
    /// A pending handoff was discarded by teardown
    pub handoff_expired: bool,
    pub opened_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

pub struct Session {
    id: SessionId,
    brand: String,
    target_url: String,
    store: Arc<dyn ArtifactStore>,
    compiler: ReportCompiler,
    coordinator: HandoffCoordinator,
    reports: Vec<Arc<Report>>,
    notice_keys: Vec<String>,
    opened_at: DateTime<Utc>,
}

impl Session {
    pub fn open(
        id: SessionId,
        brand: impl Into<String>,
        target_url: impl Into<String>,
        store: Arc<dyn ArtifactStore>,
        config: &BrandTraceConfig,
    ) -> Self {
        let coordinator = HandoffCoordinator::new(
            id.clone(),
            &config.handoff,
            config.scoring.high_suspicion_signal,
        );
        let session = Self {
            id,
            brand: brand.into(),
            target_url: target_url.into(),
            store,
            compiler: ReportCompiler::new(),
            coordinator,
            reports: Vec::new(),
            notice_keys: Vec::new(),
            opened_at: Utc::now(),
        };
        tracing::info!(
            "Opened session {} for brand '{}' at {} (storage: {})",
            session.id,
            session.brand,
            session.target_url,
            session.store.location()
        );
        session
    }

    /// New session with its own directory under `config.storage_root`
    pub fn create(
        config: &BrandTraceConfig,
        brand: impl Into<String>,
        target_url: impl Into<String>,
    ) -> BrandTraceResult<Self> {
        let id = SessionId::new();
        let store = FsArtifactStore::create(&config.storage_root, &id.to_string())?;
        Ok(Self::open(id, brand, target_url, Arc::new(store), config))
    }

    /// New session backed by process memory
    pub fn in_memory(
        config: &BrandTraceConfig,
        brand: impl Into<String>,
        target_url: impl Into<String>,
    ) -> Self {
        let id = SessionId::new();
        let store = MemoryArtifactStore::new(id.to_string());
        Self::open(id, brand, target_url, Arc::new(store), config)
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn brand(&self) -> &str {
        &self.brand
    }

    pub fn target_url(&self) -> &str {
        &self.target_url
    }

    pub fn store(&self) -> &dyn ArtifactStore {
        self.store.as_ref()
    }

    pub fn compiler(&self) -> &ReportCompiler {
        &self.compiler
    }

    pub fn reports(&self) -> &[Arc<Report>] {
        &self.reports
    }

    pub fn handoff_state(&self) -> &HandoffState {
        self.coordinator.state()
    }

    /// Persist a report compiled for this session and let the coordinator
    /// decide on a handoff
    pub fn record_report(&mut self, report: Report) -> BrandTraceResult<(PersistedReport, HandoffDecision)> {
        if report.session_id != self.id.to_string() {
            return Err(BrandTraceError::CrossSessionHandoffViolation {
                owner: self.id.to_string(),
                requester: report.session_id,
            });
        }
        let persisted = self.compiler.persist(self.store.as_ref(), report)?;
        self.reports.push(Arc::clone(&persisted.report));
        let decision = self.coordinator.on_report(&persisted, self.store.as_ref())?;
        Ok((persisted, decision))
    }

    pub fn get_handoff_context(&self, requester: &SessionId) -> BrandTraceResult<&HandoffContext> {
        self.coordinator.get_context(requester)
    }

    pub fn accept_handoff(&mut self, requester: &SessionId) -> BrandTraceResult<Arc<Report>> {
        self.coordinator.accept(requester, self.store.as_ref())
    }

    /// Store a drafted notice under `notices/`, never overwriting
    pub fn persist_notice(&mut self, notice: &TakedownNotice) -> BrandTraceResult<String> {
        let key = notice.persist(self.store.as_ref())?;
        self.notice_keys.push(key.clone());
        Ok(key)
    }

    /// Teardown: expire any pending handoff and summarize
    pub fn end(mut self) -> SessionSummary {
        let handoff_expired = self.coordinator.expire();
        let summary = SessionSummary {
            session_id: self.id.to_string(),
            brand: self.brand,
            target_url: self.target_url,
            storage: self.store.location(),
            reports_persisted: self.reports.len(),
            notices_persisted: self.notice_keys.len(),
            handoff_state: self.coordinator.state().name().to_string(),
            handoff_expired,
            opened_at: self.opened_at,
            ended_at: Utc::now(),
        };
        tracing::info!(
            "Ended session {} ({} reports, handoff {})",
            summary.session_id,
            summary.reports_persisted,
            summary.handoff_state
        );
        summary
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("brand", &self.brand)
            .field("target_url", &self.target_url)
            .field("storage", &self.store.location())
            .field("reports", &self.reports.len())
            .field("handoff", &self.coordinator.state().name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::scoring::ScoringEngine;

    fn neutral_report(session: &Session) -> Report {
        let score = ScoringEngine::new(&BrandTraceConfig::default().scoring)
            .unwrap()
            .neutral_score();
        session
            .compiler()
            .compile(session, score, vec![], vec![], vec![])
    }

    #[test]
    fn test_session_ids_are_unique() {
        assert_ne!(SessionId::new(), SessionId::new());
        let id = SessionId::new();
        assert_eq!(id.to_string().parse::<SessionId>().unwrap(), id);
    }

    #[test]
    fn test_create_uses_private_directory() {
        let root = tempfile::TempDir::new().unwrap();
        let config = BrandTraceConfig {
            storage_root: root.path().to_path_buf(),
            ..Default::default()
        };
        let a = Session::create(&config, "Acme", "https://a.shop").unwrap();
        let b = Session::create(&config, "Acme", "https://a.shop").unwrap();
        assert_ne!(a.store().location(), b.store().location());
        assert!(root.path().join(format!("session_{}", a.id())).is_dir());
    }

    #[test]
    fn test_foreign_report_is_rejected() {
        let config = BrandTraceConfig::default();
        let a = Session::in_memory(&config, "Acme", "https://a.shop");
        let mut b = Session::in_memory(&config, "Acme", "https://a.shop");
        let report = neutral_report(&a);
        assert!(matches!(
            b.record_report(report),
            Err(BrandTraceError::CrossSessionHandoffViolation { .. })
        ));
        assert!(b.reports().is_empty());
    }

    #[test]
    fn test_neutral_report_stays_idle_and_summarizes() {
        let config = BrandTraceConfig::default();
        let mut session = Session::in_memory(&config, "Acme", "https://a.shop");
        let report = neutral_report(&session);
        let (persisted, decision) = session.record_report(report).unwrap();
        assert_eq!(persisted.report.version, 1);
        assert_eq!(decision, HandoffDecision::NotWarranted);

        let summary = session.end();
        assert_eq!(summary.reports_persisted, 1);
        assert_eq!(summary.handoff_state, "idle");
        assert!(!summary.handoff_expired);
    }
}
