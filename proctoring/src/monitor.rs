//! Proctor Monitor — per-session entry point
//!
//! Ties the registry, dispatcher and escalation engine together. Every event
//! for a session (frame tick, focus loss, submission) runs under that
//! session's slot lock, from the status check through the escalation
//! decision, so concurrent events for one session are strictly serialized.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::audio::AudioAnalyzer;
use crate::clock::{Clock, SystemClock};
use crate::config::ProctorConfig;
use crate::cooldown::{CooldownGate, ViolationCategory};
use crate::dispatcher::{Analysis, Candidate, Tick, ViolationDispatcher};
use crate::error::ProctorResult;
use crate::escalation::{EscalationEngine, EscalationOutcome, SubmissionOutcome};
use crate::events::Notifier;
use crate::session::{SessionId, SessionRegistry, SharedSessionStore};
use crate::vision::VisionAnalyzer;

/// Message recorded when the client reports losing focus
pub const FOCUS_LOSS_MESSAGE: &str = "Tab Switch / Window Minimized detected";

/// What happened to one tick
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickReport {
    pub analysis: Analysis,
    /// Escalation result for an accepted violation, or `Ignored` when the
    /// session was not active. `None` when nothing was accepted.
    pub outcome: Option<EscalationOutcome>,
}

impl TickReport {
    fn inactive() -> Self {
        Self {
            analysis: Analysis::clean(),
            outcome: Some(EscalationOutcome::Ignored),
        }
    }

    /// Whether this tick ended the session
    pub fn terminated(&self) -> bool {
        matches!(self.outcome, Some(EscalationOutcome::Terminated { .. }))
    }
}

/// One inbound event for a session
enum Event {
    Tick(Tick),
    FocusLoss,
}

/// Monitors any number of concurrent exam sessions
pub struct ProctorMonitor {
    registry: SessionRegistry,
    dispatcher: ViolationDispatcher,
    engine: EscalationEngine,
    store: SharedSessionStore,
    clock: Arc<dyn Clock>,
}

impl ProctorMonitor {
    pub fn new(
        config: ProctorConfig,
        vision: VisionAnalyzer,
        store: SharedSessionStore,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let dispatcher = ViolationDispatcher::new(
            Arc::new(vision),
            AudioAnalyzer::new(&config.audio),
            CooldownGate::from_config(&config.cooldown),
        );
        let engine = EscalationEngine::new(store.clone(), notifier, config.escalation);
        Self {
            registry: SessionRegistry::new(),
            dispatcher,
            engine,
            store,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn vision(&self) -> &VisionAnalyzer {
        self.dispatcher.vision()
    }

    pub fn store(&self) -> &SharedSessionStore {
        &self.store
    }

    /// Analyze one tick and escalate an accepted violation.
    ///
    /// Ticks for unknown or ended sessions are no-ops.
    pub async fn process_tick(&self, id: SessionId, tick: Tick) -> ProctorResult<TickReport> {
        self.handle(id, Event::Tick(tick)).await
    }

    /// The client lost focus (tab switch, minimized window).
    ///
    /// Every report is recorded: focus loss bypasses the cooldown gate.
    pub async fn report_focus_loss(&self, id: SessionId) -> ProctorResult<TickReport> {
        self.handle(id, Event::FocusLoss).await
    }

    async fn handle(&self, id: SessionId, event: Event) -> ProctorResult<TickReport> {
        let handle = self.registry.slot(id);
        let mut slot = handle.lock().await;

        if slot.is_closed() {
            debug!(session_id = %id, "Event for closed session ignored");
            return Ok(TickReport::inactive());
        }

        let snapshot = match self.store.get(id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                // Nothing to keep in a slot this event created
                if !slot.has_state() {
                    slot.close();
                    drop(slot);
                    self.registry.evict(id, &handle);
                }
                return Err(e.into());
            }
        };
        if !snapshot.is_some_and(|s| s.status.is_active()) {
            debug!(session_id = %id, "Event for inactive session ignored");
            slot.close();
            drop(slot);
            self.registry.evict(id, &handle);
            return Ok(TickReport::inactive());
        }

        let now = self.clock.now();
        let analysis = match (slot.state_mut(), event) {
            (None, _) => return Ok(TickReport::inactive()),
            (Some(state), Event::Tick(tick)) => self.dispatcher.analyze(tick, state, now).await,
            (Some(_), Event::FocusLoss) => Analysis::accepted(Candidate::new(
                ViolationCategory::ClientEvent,
                FOCUS_LOSS_MESSAGE,
            )),
        };

        let outcome = match analysis.message.as_deref() {
            Some(message) if analysis.violation => Some(
                self.engine
                    .record_violation(&mut slot, id, message, now)
                    .await?,
            ),
            _ => None,
        };

        let closed = slot.is_closed();
        drop(slot);
        if closed {
            self.registry.evict(id, &handle);
        }

        Ok(TickReport { analysis, outcome })
    }

    /// Explicit submission: Active → Completed and ephemeral state dropped
    pub async fn submit(&self, id: SessionId) -> ProctorResult<SubmissionOutcome> {
        let handle = self.registry.slot(id);
        let mut slot = handle.lock().await;
        let outcome = self.engine.submit(&mut slot, id, self.clock.now()).await;
        drop(slot);
        self.registry.evict(id, &handle);
        outcome
    }

    /// Whether a session currently holds ephemeral state
    pub async fn has_state(&self, id: SessionId) -> bool {
        self.registry.has_state(id).await
    }

    /// Number of sessions with a live slot
    pub fn tracked_sessions(&self) -> usize {
        self.registry.len()
    }
}

impl std::fmt::Debug for ProctorMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProctorMonitor")
            .field("vision", &self.vision().mode())
            .field("tracked_sessions", &self.tracked_sessions())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::escalation::SessionStatus;
    use crate::events::{Notification, NotificationBus};
    use crate::session::{InMemorySessionStore, SessionSnapshot, SessionStore, StoreError, StoreResult};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    /// Store whose backend is unreachable
    struct UnreachableStore;

    #[async_trait]
    impl SessionStore for UnreachableStore {
        async fn get(&self, _id: SessionId) -> StoreResult<Option<SessionSnapshot>> {
            Err(StoreError::Backend("connection refused".to_string()))
        }

        async fn append_warning(
            &self,
            _id: SessionId,
            _message: &str,
            _at: DateTime<Utc>,
        ) -> StoreResult<u32> {
            Err(StoreError::Backend("connection refused".to_string()))
        }

        async fn terminate(&self, _id: SessionId, _ended_at: DateTime<Utc>) -> StoreResult<()> {
            Err(StoreError::Backend("connection refused".to_string()))
        }

        async fn complete(&self, _id: SessionId, _ended_at: DateTime<Utc>) -> StoreResult<()> {
            Err(StoreError::Backend("connection refused".to_string()))
        }
    }

    async fn setup() -> (ProctorMonitor, Arc<InMemorySessionStore>, Arc<ManualClock>) {
        let store = InMemorySessionStore::new().shared();
        store.open_session(SessionId(1)).await.unwrap();
        let clock = Arc::new(ManualClock::default());
        let monitor = ProctorMonitor::new(
            ProctorConfig::default(),
            VisionAnalyzer::Disabled,
            store.clone(),
            NotificationBus::new().shared(),
        )
        .with_clock(clock.clone());
        (monitor, store, clock)
    }

    #[tokio::test]
    async fn test_focus_loss_is_warning() {
        let (monitor, store, _clock) = setup().await;

        let report = monitor.report_focus_loss(SessionId(1)).await.unwrap();
        assert_eq!(report.analysis.message.as_deref(), Some(FOCUS_LOSS_MESSAGE));
        assert_eq!(report.outcome, Some(EscalationOutcome::Warned { count: 1 }));
        assert_eq!(store.warnings(SessionId(1)).await[0].message, FOCUS_LOSS_MESSAGE);
        assert!(monitor.has_state(SessionId(1)).await);
    }

    #[tokio::test]
    async fn test_every_focus_loss_is_recorded() {
        let (monitor, store, clock) = setup().await;
        let id = SessionId(1);

        monitor.report_focus_loss(id).await.unwrap();
        clock.advance_ms(500);
        let second = monitor.report_focus_loss(id).await.unwrap();
        assert_eq!(second.outcome, Some(EscalationOutcome::Warned { count: 2 }));

        // Focus loss leaves the client-event cooldown untouched
        let event = monitor
            .process_tick(id, Tick::new().with_client_event("Copy attempt"))
            .await
            .unwrap();
        assert_eq!(event.outcome, Some(EscalationOutcome::Warned { count: 3 }));
        assert_eq!(store.warnings(id).await.len(), 3);
    }

    #[tokio::test]
    async fn test_store_failure_leaves_no_slot() {
        let monitor = ProctorMonitor::new(
            ProctorConfig::default(),
            VisionAnalyzer::Disabled,
            Arc::new(UnreachableStore),
            NotificationBus::new().shared(),
        );

        let result = monitor
            .process_tick(SessionId(5), Tick::new().with_client_event("x"))
            .await;
        assert!(matches!(result, Err(crate::error::ProctorError::Store(_))));
        assert!(monitor.report_focus_loss(SessionId(6)).await.is_err());
        assert_eq!(monitor.tracked_sessions(), 0);
    }

    #[tokio::test]
    async fn test_quiet_tick_has_no_outcome() {
        let (monitor, _store, _clock) = setup().await;
        let report = monitor
            .process_tick(SessionId(1), Tick::new().with_audio_level(0.05))
            .await
            .unwrap();
        assert_eq!(report.analysis, Analysis::clean());
        assert_eq!(report.outcome, None);
    }

    #[tokio::test]
    async fn test_unknown_session_is_noop() {
        let (monitor, store, _clock) = setup().await;
        let report = monitor
            .process_tick(SessionId(99), Tick::new().with_client_event("x"))
            .await
            .unwrap();
        assert_eq!(report.outcome, Some(EscalationOutcome::Ignored));
        assert!(store.session(SessionId(99)).await.is_none());
        assert!(!monitor.has_state(SessionId(99)).await);
        assert_eq!(monitor.tracked_sessions(), 0);
    }

    #[tokio::test]
    async fn test_submit_drops_state() {
        let (monitor, store, clock) = setup().await;
        monitor.report_focus_loss(SessionId(1)).await.unwrap();
        assert_eq!(monitor.tracked_sessions(), 1);

        assert_eq!(
            monitor.submit(SessionId(1)).await.unwrap(),
            SubmissionOutcome::Completed
        );
        assert_eq!(monitor.tracked_sessions(), 0);
        assert_eq!(
            store.session(SessionId(1)).await.unwrap().status,
            SessionStatus::Completed
        );

        clock.advance_ms(5_000);
        let late = monitor.report_focus_loss(SessionId(1)).await.unwrap();
        assert_eq!(late.outcome, Some(EscalationOutcome::Ignored));
        assert_eq!(store.warnings(SessionId(1)).await.len(), 1);
    }

    #[tokio::test]
    async fn test_termination_notice_published_once() {
        let store = InMemorySessionStore::new().shared();
        store.open_session(SessionId(3)).await.unwrap();
        let bus = NotificationBus::new().shared();
        let mut receiver = bus.subscribe_session(SessionId(3));
        let clock = Arc::new(ManualClock::default());
        let mut config = ProctorConfig::default();
        config.escalation.max_warnings = 1;
        let monitor = ProctorMonitor::new(config, VisionAnalyzer::Disabled, store, bus)
            .with_clock(clock.clone());

        let report = monitor.report_focus_loss(SessionId(3)).await.unwrap();
        assert!(report.terminated());
        clock.advance_ms(10_000);
        monitor.report_focus_loss(SessionId(3)).await.unwrap();

        assert!(matches!(
            receiver.recv().await.unwrap(),
            Notification::ExamTerminated { .. }
        ));
        assert!(receiver.try_recv().is_none());
    }
}
