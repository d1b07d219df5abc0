//! Proctoring Core Library
//!
//! This library decides, tick by tick, whether the signals coming from a
//! monitored exam client are integrity violations, and escalates accumulated
//! violations into a terminated session.
//!
//! # Pipeline
//!
//! ```text
//! Tick { image?, audio_level?, client_event? }
//!   │
//!   ├─ client event ──────────────┐
//!   ├─ Signal Decoder → Vision ───┤→ Cooldown Gate → Dispatcher (first accepted wins)
//!   └─ Audio Analyzer ────────────┘                     │
//!                                                       ▼
//!                                          Escalation Engine → SessionStore
//!                                                       │
//!                                                       ▼
//!                                             NotificationBus → client
//! ```
//!
//! Every stage favours availability: undecodable frames, degenerate pose
//! solves and missing vision capability resolve to "no violation".
//!
//! # Usage
//!
//! ```ignore
//! use proctoring::{InMemorySessionStore, NotificationBus, ProctorConfig, ProctorMonitor, SessionId, Tick};
//! use proctoring::vision::{VisionAnalyzer, VisionCapabilities};
//!
//! let config = ProctorConfig::default();
//! let store = InMemorySessionStore::new().shared();
//! let bus = NotificationBus::new().shared();
//! let vision = VisionAnalyzer::select(VisionCapabilities::builtin(), &config.vision);
//! let monitor = ProctorMonitor::new(config, vision, store.clone(), bus.clone());
//!
//! store.open_session(SessionId(7)).await?;
//! let tick = Tick::new().with_client_event("Window Focus Lost");
//! let report = monitor.process_tick(SessionId(7), tick).await?;
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod audio;
pub mod clock;
pub mod config;
pub mod cooldown;
pub mod dispatcher;
pub mod error;
pub mod escalation;
pub mod events;
pub mod monitor;
pub mod session;
pub mod signal;
pub mod vision;

// Re-export configuration types
pub use config::{
    AudioConfig, CenteringWindow, ConfigError, CooldownConfig, EscalationConfig, PoseThresholds,
    ProctorConfig, VisionConfig,
};

// Re-export error types
pub use error::{ProctorError, ProctorResult};

// Re-export time source
pub use clock::{Clock, ManualClock, SystemClock};

// Re-export analysis types
pub use audio::{level_from_spectrum, parse_audio_level, AudioAnalyzer};
pub use cooldown::{CooldownGate, ViolationCategory};
pub use dispatcher::{Analysis, Candidate, Tick, ViolationDispatcher};
pub use signal::{decode_frame, DecodeFailure, Frame};
pub use vision::{
    AnalysisFailure, FaceBox, FaceDetector, FaceLandmarks, LandmarkEstimator, Observation, Point2,
    VisionAnalyzer, VisionCapabilities, VisionMode,
};

// Re-export escalation types
pub use escalation::{
    EscalationEngine, EscalationOutcome, ExamSession, SessionStatus, SubmissionOutcome,
    WarningRecord,
};

// Re-export session types
pub use session::{
    EphemeralState, InMemorySessionStore, SessionId, SessionRegistry, SessionSnapshot,
    SessionStore, SharedSessionStore, StoreError, StoreResult,
};

// Re-export notification types
pub use events::{
    Notification, NotificationBus, Notifier, NotifyError, SessionReceiver, SharedNotificationBus,
};

// Re-export the top-level monitor
pub use monitor::{ProctorMonitor, TickReport, FOCUS_LOSS_MESSAGE};
