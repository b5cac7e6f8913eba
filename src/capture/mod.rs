//! Frame capture for the gesture agent.
//!
//! A single worker thread pulls frames from a [`FrameSource`], runs hand
//! extraction and the session controller, and fans the per-frame status
//! out to every attached observer.

pub mod replay;
pub mod types;
pub mod worker;

// Re-export commonly used types
pub use replay::{write_recording, ReplayRecord, ReplaySource};
pub use types::{CaptureError, Frame, FrameSource, HandPoseExtractor, PrecomputedLandmarks};
pub use worker::{FrameHub, Observer};
