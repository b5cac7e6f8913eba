//! Gesture Control Agent - teachable hand-gesture recognition for device control.
//!
//! This library lets a user teach a small vocabulary of hand gestures from a
//! live landmark stream, bind each gesture to a device-control action, and
//! fire those actions in real time with debouncing and rejection of
//! unfamiliar poses.
//!
//! # Guarantees
//!
//! - **Consistency**: the registry, stored samples and trained model are
//!   kept in sync across edits and restarts; monitoring refuses a stale model
//! - **Debounce**: an action needs a streak of confident frames and fires at
//!   most once per cooldown
//! - **Local only**: all samples, models and statistics stay in the data directory
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Gesture Control Agent                     │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐         │
//! │  │   Capture   │──▶│ Normalizer  │──▶│ Classifier  │         │
//! │  │ (FrameHub)  │   │ (landmarks) │   │   (k-NN)    │         │
//! │  └─────────────┘   └─────────────┘   └─────────────┘         │
//! │         │                 │                 │                │
//! │         ▼                 ▼                 ▼                │
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐         │
//! │  │  Activity   │   │  Augmentor  │   │  Decision   │──▶ Dispatch
//! │  │    Log      │   │ (training)  │   │   Engine    │         │
//! │  └─────────────┘   └─────────────┘   └─────────────┘         │
//! │                           │                                  │
//! │                           ▼                                  │
//! │                    ┌─────────────┐                           │
//! │                    │  Registry   │                           │
//! │                    │    Sync     │                           │
//! │                    └─────────────┘                           │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use gesture_control_agent::{
//!     config::Config, dispatch::LogDispatcher, session::SessionController,
//! };
//!
//! let config = Config::load().unwrap_or_default();
//! let (mut controller, _boot) =
//!     SessionController::open(&config, LogDispatcher::new())
//!         .expect("Failed to open data directory");
//!
//! // Frames are fed with controller.process_frame(...)
//! controller.set_monitoring(true).ok();
//! ```

pub mod activity;
pub mod capture;
pub mod config;
pub mod core;
pub mod dispatch;
pub mod registry;
pub mod session;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use activity::{ActivityLog, ActivityStats, SharedActivityLog};
pub use capture::{CaptureError, Frame, FrameHub, FrameSource, HandPoseExtractor, ReplaySource};
pub use config::{Config, TuningConfig};
pub use core::{
    normalize_landmarks, Augmentor, DecisionEngine, GestureClassifier, KeypointSet, Prediction,
};
pub use dispatch::{ActionDispatcher, CommandDispatcher, LogDispatcher, RateLimitedDispatcher};
pub use registry::{GestureAction, GestureEntry, RegistrySync, SyncStatus};
pub use session::{ControlMode, FrameStatus, RecordingRequest, SessionController, SessionError};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Quick-start guide that can be displayed to users.
pub const USAGE_GUIDE: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║              GESTURE CONTROL AGENT - QUICK START                 ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  1. RECORD a gesture and bind it to an action:                   ║
║       gesture-agent record --label open_palm --action PLAY_PAUSE ║
║                                                                  ║
║  2. CHECK the model is trained and in sync:                      ║
║       gesture-agent status                                       ║
║                                                                  ║
║  3. RUN with monitoring on:                                      ║
║       gesture-agent run --monitor                                ║
║                                                                  ║
║  Hold a gesture steady for a moment to trigger its action.       ║
║  Each action fires at most once per cooldown.                    ║
║                                                                  ║
║  SUPPORTED ACTIONS:                                              ║
║    MUTE, PLAY_PAUSE, PREVIOUS_SLIDE, NEXT_SLIDE, VOLUME_UP,      ║
║    VOLUME_DOWN, ZOOM_IN, ZOOM_OUT, LOCK_SCREEN                   ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;
