//! Integration tests for warning escalation through the monitor
//!
//! Drives whole sessions through `ProctorMonitor` with a manual clock and
//! checks the durable record, the ephemeral state and the notifications.

use std::sync::Arc;

use proctoring::vision::VisionAnalyzer;
use proctoring::{
    EscalationOutcome, InMemorySessionStore, ManualClock, Notification, NotificationBus,
    ProctorConfig, ProctorMonitor, SessionId, SessionStatus, SubmissionOutcome, Tick,
};

struct Harness {
    monitor: ProctorMonitor,
    store: Arc<InMemorySessionStore>,
    bus: Arc<NotificationBus>,
    clock: Arc<ManualClock>,
}

async fn harness(config: ProctorConfig, sessions: &[u64]) -> Harness {
    let store = InMemorySessionStore::new().shared();
    for &id in sessions {
        store.open_session(SessionId(id)).await.unwrap();
    }
    let bus = NotificationBus::new().shared();
    let clock = Arc::new(ManualClock::default());
    let monitor = ProctorMonitor::new(config, VisionAnalyzer::Disabled, store.clone(), bus.clone())
        .with_clock(clock.clone());
    Harness {
        monitor,
        store,
        bus,
        clock,
    }
}

fn event(message: &str) -> Tick {
    Tick::new().with_client_event(message)
}

/// Test: six spaced violations terminate exactly on the sixth
#[tokio::test]
async fn test_sixth_violation_terminates() {
    let _ = tracing_subscriber::fmt().with_env_filter("debug").try_init();
    let h = harness(ProctorConfig::default(), &[1]).await;
    let id = SessionId(1);
    let mut notifications = h.bus.subscribe_session(id);

    for n in 1..=5u32 {
        let report = h.monitor.process_tick(id, event("Window Focus Lost")).await.unwrap();
        assert_eq!(report.outcome, Some(EscalationOutcome::Warned { count: n }));
        assert_eq!(
            h.store.session(id).await.unwrap().status,
            SessionStatus::Active
        );
        h.clock.advance_ms(2_500);
    }

    let report = h.monitor.process_tick(id, event("Window Focus Lost")).await.unwrap();
    assert_eq!(report.outcome, Some(EscalationOutcome::Terminated { count: 6 }));

    let session = h.store.session(id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Terminated);
    assert_eq!(session.warnings_count, 6);
    assert!(session.cheating_flag);
    assert!(session.end_time.is_some());
    assert!(!h.monitor.has_state(id).await);
    assert_eq!(h.store.warnings(id).await.len(), 6);

    for n in 1..=5u32 {
        match notifications.recv().await.unwrap() {
            Notification::WarningAlert { count, message, .. } => {
                assert_eq!(count, n);
                assert_eq!(message, "Window Focus Lost");
            }
            other => panic!("expected warning alert, got {:?}", other),
        }
    }
    match notifications.recv().await.unwrap() {
        Notification::ExamTerminated {
            reason, redirect, ..
        } => {
            assert_eq!(reason, "Max warnings exceeded. Exam Terminated.");
            assert_eq!(redirect, "/student_dashboard");
        }
        other => panic!("expected termination notice, got {:?}", other),
    }
}

/// Test: violations inside the cooldown window are not counted
#[tokio::test]
async fn test_cooldown_spacing() {
    let h = harness(ProctorConfig::default(), &[1]).await;
    let id = SessionId(1);

    h.monitor.process_tick(id, event("a")).await.unwrap();
    h.clock.advance_ms(1_000);
    let suppressed = h.monitor.process_tick(id, event("b")).await.unwrap();
    assert!(!suppressed.analysis.violation);
    assert_eq!(suppressed.outcome, None);

    h.clock.advance_ms(1_500);
    let accepted = h.monitor.process_tick(id, event("c")).await.unwrap();
    assert_eq!(accepted.outcome, Some(EscalationOutcome::Warned { count: 2 }));

    let messages: Vec<_> = h
        .store
        .warnings(id)
        .await
        .into_iter()
        .map(|w| w.message)
        .collect();
    assert_eq!(messages, vec!["a", "c"]);
}

/// Test: nothing is recorded for a session after it is terminated
#[tokio::test]
async fn test_dead_session_guard() {
    let mut config = ProctorConfig::default();
    config.escalation.max_warnings = 2;
    let h = harness(config, &[4]).await;
    let id = SessionId(4);

    h.monitor.process_tick(id, event("one")).await.unwrap();
    h.clock.advance_ms(3_000);
    let report = h.monitor.process_tick(id, event("two")).await.unwrap();
    assert!(report.terminated());
    let ended = h.store.session(id).await.unwrap();

    for _ in 0..3 {
        h.clock.advance_ms(3_000);
        let late = h
            .monitor
            .process_tick(id, event("late").with_audio_level(1.0))
            .await
            .unwrap();
        assert_eq!(late.outcome, Some(EscalationOutcome::Ignored));
        assert!(!late.analysis.violation);
    }
    assert_eq!(h.monitor.submit(id).await.unwrap(), SubmissionOutcome::Ignored);

    let after = h.store.session(id).await.unwrap();
    assert_eq!(after, ended);
    assert_eq!(h.store.warnings(id).await.len(), 2);
    assert!(!h.monitor.has_state(id).await);
}

/// Test: status never leaves a terminal state
#[tokio::test]
async fn test_monotonic_status() {
    let mut config = ProctorConfig::default();
    config.escalation.max_warnings = 1;
    let h = harness(config, &[1, 2]).await;

    // Completed, then a violation
    assert_eq!(
        h.monitor.submit(SessionId(1)).await.unwrap(),
        SubmissionOutcome::Completed
    );
    h.monitor.report_focus_loss(SessionId(1)).await.unwrap();
    let s1 = h.store.session(SessionId(1)).await.unwrap();
    assert_eq!(s1.status, SessionStatus::Completed);
    assert!(!s1.cheating_flag);
    assert_eq!(s1.warnings_count, 0);

    // Terminated, then a submission
    assert!(h
        .monitor
        .report_focus_loss(SessionId(2))
        .await
        .unwrap()
        .terminated());
    assert_eq!(
        h.monitor.submit(SessionId(2)).await.unwrap(),
        SubmissionOutcome::Ignored
    );
    assert_eq!(
        h.store.session(SessionId(2)).await.unwrap().status,
        SessionStatus::Terminated
    );
}

/// Test: tab switches are never throttled by the cooldown
#[tokio::test]
async fn test_rapid_focus_losses_all_count() {
    let h = harness(ProctorConfig::default(), &[7]).await;
    let id = SessionId(7);

    let first = h.monitor.report_focus_loss(id).await.unwrap();
    h.clock.advance_ms(500);
    let second = h.monitor.report_focus_loss(id).await.unwrap();

    assert_eq!(first.outcome, Some(EscalationOutcome::Warned { count: 1 }));
    assert_eq!(second.outcome, Some(EscalationOutcome::Warned { count: 2 }));
    assert_eq!(h.store.warnings(id).await.len(), 2);
}

/// Test: sessions escalate independently
#[tokio::test]
async fn test_sessions_are_independent() {
    let h = harness(ProctorConfig::default(), &[1, 2]).await;

    h.monitor.report_focus_loss(SessionId(1)).await.unwrap();
    let other = h.monitor.report_focus_loss(SessionId(2)).await.unwrap();

    // Same instant, different session: not suppressed by session 1's cooldown
    assert_eq!(other.outcome, Some(EscalationOutcome::Warned { count: 1 }));
    assert_eq!(h.monitor.tracked_sessions(), 2);
}

/// Test: concurrent events for one session never lose an increment
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_ticks_serialized() {
    let mut config = ProctorConfig::default();
    config.cooldown.min_gap_secs = 0.0;
    config.escalation.max_warnings = 1_000;
    let h = harness(config, &[9]).await;
    let monitor = Arc::new(h.monitor);

    let tasks: Vec<_> = (0..32)
        .map(|i| {
            let monitor = Arc::clone(&monitor);
            tokio::spawn(async move {
                if i % 2 == 0 {
                    monitor.report_focus_loss(SessionId(9)).await
                } else {
                    monitor
                        .process_tick(SessionId(9), Tick::new().with_client_event("Copy attempt"))
                        .await
                }
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let session = h.store.session(SessionId(9)).await.unwrap();
    assert_eq!(session.warnings_count, 32);
    assert_eq!(h.store.warnings(SessionId(9)).await.len(), 32);
}

/// Test: a burst at one instant yields exactly one accepted violation
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_burst_respects_cooldown() {
    let h = harness(ProctorConfig::default(), &[5]).await;
    let monitor = Arc::new(h.monitor);

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let monitor = Arc::clone(&monitor);
            tokio::spawn(async move {
                monitor
                    .process_tick(SessionId(5), Tick::new().with_client_event("Copy attempt"))
                    .await
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(h.store.session(SessionId(5)).await.unwrap().warnings_count, 1);
}
