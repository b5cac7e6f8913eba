//! Gesture Control Agent CLI
//!
//! Teach hand gestures from landmark recordings and map them to actions.

use clap::{Parser, Subcommand};
use crossbeam_channel::RecvTimeoutError;
use gesture_control_agent::{
    activity::{create_shared_log_with_persistence, SharedActivityLog},
    capture::{CaptureError, FrameHub, FrameSource, PrecomputedLandmarks, ReplaySource},
    config::Config,
    dispatch::{dispatcher_for, ActionDispatcher, LogDispatcher},
    registry::{GestureAction, GestureEntryInput},
    session::{ControlMode, FrameStatus, RecordingRequest, SessionController},
    USAGE_GUIDE, VERSION,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

type Controller = SessionController<Box<dyn ActionDispatcher>>;

#[derive(Parser)]
#[command(name = "gesture-agent")]
#[command(version = VERSION)]
#[command(about = "Teachable hand-gesture recognition for device control", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process a landmark recording, optionally firing actions
    Run {
        /// JSON-lines landmark recording to replay
        #[arg(long)]
        replay: PathBuf,

        /// Enable monitoring so recognized gestures trigger actions
        #[arg(long)]
        monitor: bool,

        /// Only log actions instead of running configured commands
        #[arg(long)]
        dry_run: bool,
    },

    /// Record a gesture from a landmark recording
    Record {
        /// Gesture label
        #[arg(long)]
        label: String,

        /// Action to bind (e.g. PLAY_PAUSE)
        #[arg(long)]
        action: String,

        /// Emoji shown for the gesture
        #[arg(long)]
        emoji: Option<String>,

        /// Number of samples to collect
        #[arg(long)]
        target: Option<usize>,

        /// Confidence threshold for this gesture
        #[arg(long)]
        threshold: Option<f64>,

        /// JSON-lines landmark recording to read samples from
        #[arg(long)]
        replay: PathBuf,
    },

    /// Capture a gesture from a single pose, expanded by augmentation
    Capture {
        #[arg(long)]
        label: String,

        #[arg(long)]
        action: String,

        #[arg(long)]
        emoji: Option<String>,

        /// Number of augmented samples to generate
        #[arg(long)]
        target: Option<usize>,

        /// Recording whose first detected hand is used
        #[arg(long)]
        replay: PathBuf,
    },

    /// Retrain the model on the stored samples
    Train,

    /// List the configured gestures
    Gestures,

    /// Replace the gesture list from a JSON file
    SetGestures {
        /// JSON array of {label, action, emoji?, threshold?}
        file: PathBuf,
    },

    /// Show model and dataset status
    Status,

    /// Check whether monitoring can be enabled with the current model
    Check,

    /// Delete all samples and the model
    Clear {
        /// Skip confirmation
        #[arg(long)]
        yes: bool,
    },

    /// Show configuration
    Config,

    /// Show the quick-start guide
    Guide,

    /// Serve the HTTP control API
    #[cfg(feature = "server")]
    Serve {
        #[arg(long, default_value = "8765")]
        port: u16,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config, using defaults: {e}");
        Config::default()
    });
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    match cli.command {
        Commands::Run {
            replay,
            monitor,
            dry_run,
        } => cmd_run(&config, &replay, monitor, dry_run),
        Commands::Record {
            label,
            action,
            emoji,
            target,
            threshold,
            replay,
        } => {
            let request = RecordingRequest {
                label,
                action,
                emoji,
                target,
                threshold,
            };
            cmd_record(&config, request, &replay);
        }
        Commands::Capture {
            label,
            action,
            emoji,
            target,
            replay,
        } => {
            let request = RecordingRequest {
                label,
                action,
                emoji,
                target,
                threshold: None,
            };
            cmd_capture(&config, request, &replay);
        }
        Commands::Train => cmd_train(&config),
        Commands::Gestures => cmd_gestures(&config),
        Commands::SetGestures { file } => cmd_set_gestures(&config, &file),
        Commands::Status => cmd_status(&config),
        Commands::Check => cmd_check(&config),
        Commands::Clear { yes } => cmd_clear(&config, yes),
        Commands::Config => cmd_config(&config),
        Commands::Guide => println!("{USAGE_GUIDE}"),
        #[cfg(feature = "server")]
        Commands::Serve { port } => cmd_serve(config, port),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();
}

fn cmd_run(config: &Config, replay: &Path, monitor: bool, dry_run: bool) {
    println!("Gesture Control Agent v{VERSION}");
    println!();

    let dispatcher = dispatcher_for(&config.actions, dry_run);
    let activity = create_shared_log_with_persistence(config.data_paths().activity());
    let mut controller = open_controller_with(config, dispatcher, Arc::clone(&activity));

    if monitor {
        match controller.set_monitoring(true) {
            Ok(_) => println!("Monitoring: enabled"),
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        }
    } else {
        println!("Monitoring: disabled (use --monitor to fire actions)");
    }
    println!("Gestures: {}", controller.sync().registry().len());
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let source = open_replay(replay);
    drive(config, Arc::new(Mutex::new(controller)), source, |status| {
        if let Some(action) = status.action {
            println!(
                "{} {} -> {} (confidence {:.2})",
                status.emoji, status.gesture, action, status.confidence
            );
        }
    });

    save_activity(&activity);
    println!();
    println!("{}", activity.summary());
}

fn cmd_record(config: &Config, request: RecordingRequest, replay: &Path) {
    let activity = create_shared_log_with_persistence(config.data_paths().activity());
    let mut controller =
        open_controller_with(config, Box::new(LogDispatcher::new()), Arc::clone(&activity));
    match controller.start_recording(request) {
        Ok(progress) => println!(
            "Recording '{}' for {} ({} samples)...",
            progress.label, progress.action, progress.target
        ),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }

    let source = open_replay(replay);
    let controller = Arc::new(Mutex::new(controller));
    let mut last_count = 0;
    drive(config, Arc::clone(&controller), source, |status| {
        if let Some(progress) = &status.recording {
            if progress.count != last_count && progress.count % 10 == 0 {
                println!("  {}/{}", progress.count, progress.target);
            }
            last_count = progress.count;
        }
        if let Some(message) = &status.message {
            println!("{message}");
        }
    });

    let mut controller = controller.lock().unwrap_or_else(|p| p.into_inner());
    if controller.mode() == ControlMode::Recording {
        println!("Recording ended before reaching the target.");
        match controller.stop_recording() {
            Ok(Some(outcome)) => println!(
                "Saved {} samples for '{}'.",
                outcome.added, outcome.entry.label
            ),
            Ok(None) => println!("No samples captured; nothing saved."),
            Err(e) => {
                eprintln!("Error saving recording: {e}");
                std::process::exit(1);
            }
        }
    }
    save_activity(&activity);
}

fn cmd_capture(config: &Config, request: RecordingRequest, replay: &Path) {
    let mut source = open_replay(replay);
    let hand = loop {
        match source.next_frame() {
            Ok(Some(frame)) => {
                if let Some(hand) = frame.landmarks.filter(|k| k.is_complete()) {
                    break hand;
                }
            }
            Ok(None) => continue,
            Err(CaptureError::Transient(e)) => {
                tracing::warn!(error = %e, "Skipping unreadable frame")
            }
            Err(CaptureError::Closed) => {
                eprintln!("Error: No hand found in {replay:?}");
                std::process::exit(1);
            }
        }
    };

    let activity = create_shared_log_with_persistence(config.data_paths().activity());
    let mut controller =
        open_controller_with(config, Box::new(LogDispatcher::new()), Arc::clone(&activity));
    match controller.capture_single(request, &hand) {
        Ok(capture) => {
            println!(
                "Saved {} samples for '{}' ({} generated, {} rejected).",
                capture.commit.added,
                capture.commit.entry.label,
                capture.augment.from_jitter + capture.augment.from_image,
                capture.augment.rejected_similar
                    + capture.augment.rejected_outlier
                    + capture.augment.rejected_duplicate
            );
            match &capture.commit.training {
                Ok(report) => println!("{report}"),
                Err(e) => eprintln!("Warning: Training failed: {e}"),
            }
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
    save_activity(&activity);
}

fn cmd_train(config: &Config) {
    let activity = create_shared_log_with_persistence(config.data_paths().activity());
    let mut controller =
        open_controller_with(config, Box::new(LogDispatcher::new()), Arc::clone(&activity));
    match controller.train() {
        Ok(report) => println!("{report}"),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
    save_activity(&activity);
}

fn cmd_gestures(config: &Config) {
    let controller = open_controller(config, Box::new(LogDispatcher::new()));
    let registry = controller.sync().registry();
    let dataset = controller.sync().dataset();

    if registry.is_empty() {
        println!("No gestures configured.");
        println!("Run 'gesture-agent record' to teach one.");
        return;
    }

    println!("{:<20} {:<16} {:>9} {:>8}", "Gesture", "Action", "Threshold", "Samples");
    for entry in registry.entries() {
        println!(
            "{:<20} {:<16} {:>9.2} {:>8}",
            format!("{} {}", entry.emoji, entry.label).trim(),
            entry.action.as_str(),
            entry.threshold,
            dataset.count_for(&entry.label)
        );
    }
}

fn cmd_set_gestures(config: &Config, file: &Path) {
    let inputs: Vec<GestureEntryInput> = match std::fs::read_to_string(file)
        .map_err(|e| e.to_string())
        .and_then(|content| serde_json::from_str(&content).map_err(|e| e.to_string()))
    {
        Ok(inputs) => inputs,
        Err(e) => {
            eprintln!("Error reading {file:?}: {e}");
            std::process::exit(1);
        }
    };

    let activity = create_shared_log_with_persistence(config.data_paths().activity());
    let mut controller =
        open_controller_with(config, Box::new(LogDispatcher::new()), Arc::clone(&activity));
    match controller.replace_registry(inputs) {
        Ok(outcome) => {
            println!("Gestures updated.");
            if outcome.pruned_samples > 0 {
                println!("  Removed {} samples of deleted gestures", outcome.pruned_samples);
            }
            if outcome.relabeled_samples > 0 {
                println!("  Relabeled {} samples", outcome.relabeled_samples);
            }
            println!("{}", outcome.retrain_message);
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
    save_activity(&activity);
}

fn cmd_status(config: &Config) {
    let activity = create_shared_log_with_persistence(config.data_paths().activity());
    let controller =
        open_controller_with(config, Box::new(LogDispatcher::new()), Arc::clone(&activity));
    let model = controller.model_status();

    println!("Gesture Control Agent Status");
    println!("============================");
    println!();
    println!("Model:");
    println!("  Trained: {}", if model.trained { "yes ✓" } else { "no ✗" });
    println!("  Status: {}", model.status);
    println!("  Classes: {}", model.classes.join(", "));
    println!("  Training samples: {}", model.training_samples);
    println!("  Dataset samples: {}", model.dataset_samples);
    if let Some(accuracy) = model.validation_accuracy {
        println!("  Validation accuracy: {:.1}%", accuracy * 100.0);
    }
    if let Some(trained_at) = model.trained_at {
        println!("  Trained at: {}", trained_at.format("%Y-%m-%d %H:%M:%S"));
    }
    println!();

    println!("Samples per gesture:");
    if model.sample_counts.is_empty() {
        println!("  (none)");
    }
    for (label, count) in &model.sample_counts {
        println!("  {label}: {count}");
    }
    println!();
    println!("{}", activity.summary());
}

fn cmd_check(config: &Config) {
    let mut controller = open_controller(config, Box::new(LogDispatcher::new()));
    match controller.set_monitoring(true) {
        Ok(_) => println!("Ready: monitoring can be enabled."),
        Err(e) => {
            println!("Not ready: {e}");
            std::process::exit(1);
        }
    }
}

fn cmd_clear(config: &Config, yes: bool) {
    if !yes {
        eprintln!("This deletes every recorded sample and the trained model.");
        eprintln!("Re-run with --yes to confirm.");
        std::process::exit(1);
    }
    let activity = create_shared_log_with_persistence(config.data_paths().activity());
    let mut controller =
        open_controller_with(config, Box::new(LogDispatcher::new()), Arc::clone(&activity));
    match controller.clear_samples() {
        Ok(removed) => println!("Removed {removed} samples and the model."),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
    save_activity(&activity);
}

fn cmd_config(config: &Config) {
    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(config).unwrap_or_else(|_| "Error".to_string())
    );
    println!();
    println!(
        "Actions: {}",
        GestureAction::ALL
            .iter()
            .map(|a| a.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
}

#[cfg(feature = "server")]
fn cmd_serve(config: Config, port: u16) {
    use gesture_control_agent::server::{self, ServerConfig};

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error starting runtime: {e}");
            std::process::exit(1);
        }
    };

    runtime.block_on(async move {
        let (addr, shutdown) = match server::run(ServerConfig { port, config }).await {
            Ok(started) => started,
            Err(e) => {
                eprintln!("Error starting server: {e}");
                std::process::exit(1);
            }
        };
        println!("Control API listening on http://{addr}");
        println!("Press Ctrl+C to stop");

        let _ = tokio::signal::ctrl_c().await;
        let _ = shutdown.send(());
    });
}

fn open_controller(config: &Config, dispatcher: Box<dyn ActionDispatcher>) -> Controller {
    let activity = create_shared_log_with_persistence(config.data_paths().activity());
    open_controller_with(config, dispatcher, activity)
}

fn open_controller_with(
    config: &Config,
    dispatcher: Box<dyn ActionDispatcher>,
    activity: SharedActivityLog,
) -> Controller {
    match SessionController::open(config, dispatcher) {
        Ok((controller, boot)) => {
            if boot.pruned > 0 {
                println!("Removed {} samples with no matching gesture.", boot.pruned);
            }
            if let Some(Err(e)) = &boot.retrained {
                eprintln!("Warning: Retraining at startup failed: {e}");
            }
            controller.with_activity(activity)
        }
        Err(e) => {
            eprintln!("Error loading data from {:?}: {e}", config.data_path);
            std::process::exit(1);
        }
    }
}

fn open_replay(path: &Path) -> ReplaySource<std::io::BufReader<std::fs::File>> {
    match ReplaySource::open(path) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Error opening recording {path:?}: {e}");
            std::process::exit(1);
        }
    }
}

/// Run `controller` over `source` until it ends or Ctrl+C.
fn drive(
    config: &Config,
    controller: Arc<Mutex<Controller>>,
    source: impl FrameSource + 'static,
    mut on_status: impl FnMut(&FrameStatus),
) {
    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(Arc::clone(&running));

    let hub = FrameHub::new(
        Arc::clone(&controller),
        source,
        PrecomputedLandmarks,
        config.capture.clone(),
    );
    let statuses = hub.attach();

    while running.load(Ordering::SeqCst) {
        match statuses.recv_timeout(Duration::from_millis(100)) {
            Ok(status) => on_status(&status),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    hub.shutdown();
}

fn save_activity(activity: &SharedActivityLog) {
    if let Err(e) = activity.save() {
        eprintln!("Warning: Could not save activity log: {e}");
    }
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) {
    if let Err(e) = ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    }) {
        eprintln!("Warning: Could not set Ctrl+C handler: {e}");
    }
}
