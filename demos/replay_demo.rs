//! Demonstration of the gesture control pipeline on synthetic landmarks.
//!
//! This example shows how to:
//! 1. Record two gestures from a landmark stream
//! 2. Train the classifier and check the model is in sync
//! 3. Enable monitoring and replay a recording through the frame hub
//! 4. Watch debounced actions fire with a cooldown
//!
//! Run with: cargo run --example replay_demo
//!
//! State is written to a temporary directory and removed afterwards.

use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use gesture_control_agent::{
    activity::create_shared_log,
    capture::{write_recording, FrameHub, PrecomputedLandmarks, ReplaySource},
    config::{CaptureConfig, DataPaths, TuningConfig},
    core::KeypointSet,
    dispatch::LogDispatcher,
    registry::{GestureAction, RegistrySync},
    session::{RecordingRequest, SessionController},
    USAGE_GUIDE,
};

/// A synthetic hand; `spread` fans the fingers apart.
fn hand(spread: f64) -> KeypointSet {
    let mut points = vec![[0.5, 0.5, 0.0]];
    for finger in 0..5 {
        let angle = -0.9 + finger as f64 * 0.45 * spread;
        for joint in 1..=4 {
            let r = 0.04 * joint as f64 + 0.02 * finger as f64;
            points.push([0.5 + r * angle.sin(), 0.5 - r * angle.cos(), 0.005 * joint as f64]);
        }
    }
    KeypointSet::new(points)
}

fn main() {
    println!("Gesture Control Agent - Replay Demo");
    println!("===================================");
    println!("{USAGE_GUIDE}");

    let root = std::env::temp_dir().join(format!("gesture-demo-{}", uuid::Uuid::new_v4()));
    let tuning = TuningConfig::default();
    let sync = RegistrySync::empty(DataPaths::new(root.clone()), &tuning);
    let activity = create_shared_log();
    let mut controller =
        SessionController::new(sync, tuning, LogDispatcher::new())
            .with_activity(Arc::clone(&activity));

    // Teach two gestures
    for (label, action, emoji, spread) in [
        ("fist", GestureAction::Mute, "✊", 1.0),
        ("open_palm", GestureAction::PlayPause, "✋", 3.0),
    ] {
        let request = RecordingRequest::new(label, action).with_emoji(emoji).with_target(30);
        if let Err(e) = controller.start_recording(request) {
            eprintln!("Could not start recording: {e}");
            return;
        }
        let now = Instant::now();
        for i in 0..30 {
            let status = controller.process_frame(Some(&hand(spread + 0.02 * i as f64)), now);
            if let Some(message) = status.message {
                println!("{message}");
            }
        }
    }
    println!();

    let model = controller.model_status();
    println!("Model status: {} ({} classes)", model.status, model.classes.len());

    if let Err(e) = controller.set_monitoring(true) {
        eprintln!("Could not enable monitoring: {e}");
        return;
    }

    // Hold a fist, drop the hand, then hold an open palm
    let mut frames: Vec<Option<KeypointSet>> = Vec::new();
    frames.extend((0..20).map(|_| Some(hand(1.1))));
    frames.extend((0..5).map(|_| None));
    frames.extend((0..20).map(|_| Some(hand(3.1))));

    let mut buf = Vec::new();
    if let Err(e) = write_recording(&mut buf, &frames) {
        eprintln!("Could not build recording: {e}");
        return;
    }

    let controller = Arc::new(Mutex::new(controller));
    let hub = FrameHub::new(
        Arc::clone(&controller),
        ReplaySource::from_reader(Cursor::new(buf)),
        PrecomputedLandmarks,
        CaptureConfig {
            frame_interval: Duration::from_millis(100),
            ..CaptureConfig::default()
        },
    );

    println!();
    println!("Replaying {} frames...", frames.len());
    let statuses = hub.attach();
    for status in statuses.iter() {
        let action = status
            .action
            .map(|a| format!(" -> {a}"))
            .unwrap_or_default();
        println!(
            "  {:<10} {:>5.2} streak {}{}",
            status.gesture, status.confidence, status.streak, action
        );
    }
    hub.join();

    println!();
    println!("{}", activity.summary());
    let _ = std::fs::remove_dir_all(root);
}
