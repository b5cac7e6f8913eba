//! Configuration for the gesture control agent.

use crate::registry::GestureAction;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration for the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the registry, dataset, model and activity stats
    pub data_path: PathBuf,

    /// Recognition and debounce tuning
    #[serde(default)]
    pub tuning: TuningConfig,

    /// Frame loop settings
    #[serde(default)]
    pub capture: CaptureConfig,

    /// Optional command line to run for each action
    #[serde(default)]
    pub actions: BTreeMap<GestureAction, Vec<String>>,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gesture-control-agent");

        Self {
            data_path: data_dir,
            tuning: TuningConfig::default(),
            capture: CaptureConfig::default(),
            actions: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, falling back to defaults when absent.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
            let mut config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            config.tuning.sanitize();
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gesture-control-agent")
            .join("config.json")
    }

    /// Paths of the persisted state files.
    pub fn data_paths(&self) -> DataPaths {
        DataPaths::new(self.data_path.clone())
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }
}

/// Recognition, debounce and recording parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningConfig {
    /// Threshold given to gestures saved without one
    pub default_threshold: f64,
    /// Consecutive above-threshold frames before an action fires
    pub required_streak: u32,
    /// Whether out-of-distribution poses are rejected
    pub rejection_enabled: bool,
    /// Neighbor distance above which a pose is treated as unknown
    pub rejection_distance: f64,
    /// Minimum time between two dispatched actions
    #[serde(with = "duration_millis")]
    pub action_cooldown: Duration,
    /// Default number of samples a recording collects
    pub recording_target: usize,
    /// Minimum distance between samples kept during a recording
    pub novelty_distance: f64,
    /// Retrain automatically after registry edits touch the dataset
    pub auto_retrain: bool,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            default_threshold: 0.82,
            required_streak: 2,
            rejection_enabled: true,
            rejection_distance: 0.45,
            action_cooldown: Duration::from_millis(1500),
            recording_target: 50,
            novelty_distance: 0.014,
            auto_retrain: true,
        }
    }
}

impl TuningConfig {
    /// Pull hand-edited values back into their valid ranges.
    pub fn sanitize(&mut self) {
        self.default_threshold = crate::registry::clamp_threshold(self.default_threshold);
        self.required_streak = self.required_streak.max(1);
        if !(self.rejection_distance > 0.0) {
            self.rejection_distance = TuningConfig::default().rejection_distance;
        }
        self.recording_target = self
            .recording_target
            .clamp(crate::session::MIN_RECORDING_TARGET, crate::session::MAX_RECORDING_TARGET);
        self.novelty_distance = self.novelty_distance.max(0.0);
    }
}

/// Frame loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Pause between processed frames
    #[serde(with = "duration_millis")]
    pub frame_interval: Duration,
    /// Back-off after an empty frame or transient capture failure
    #[serde(with = "duration_millis")]
    pub empty_frame_backoff: Duration,
    /// Per-observer queue length before frames are skipped for that observer
    pub observer_capacity: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_millis(30),
            empty_frame_backoff: Duration::from_millis(50),
            observer_capacity: 8,
        }
    }
}

/// Locations of the persisted state files.
#[derive(Debug, Clone)]
pub struct DataPaths {
    pub root: PathBuf,
}

impl DataPaths {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn gestures(&self) -> PathBuf {
        self.root.join("gestures.json")
    }

    pub fn dataset(&self) -> PathBuf {
        self.root.join("dataset.json")
    }

    pub fn model(&self) -> PathBuf {
        self.root.join("model.json")
    }

    pub fn activity(&self) -> PathBuf {
        self.root.join("activity.json")
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration as whole milliseconds.
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.tuning.default_threshold, 0.82);
        assert_eq!(config.tuning.required_streak, 2);
        assert_eq!(config.tuning.action_cooldown, Duration::from_millis(1500));
        assert_eq!(config.capture.frame_interval, Duration::from_millis(30));
        assert!(config.actions.is_empty());
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let json = r#"{"data_path": "/tmp/gestures",
                       "tuning": {"required_streak": 0, "default_threshold": 0.2}}"#;
        let dir = std::env::temp_dir().join(format!("gesture-config-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.json");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(&path, json).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.data_path, PathBuf::from("/tmp/gestures"));
        assert_eq!(config.tuning.required_streak, 1);
        assert_eq!(config.tuning.default_threshold, 0.55);
        assert_eq!(config.tuning.rejection_distance, 0.45);
        assert_eq!(config.capture.observer_capacity, 8);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_actions_roundtrip() {
        let mut config = Config::default();
        config
            .actions
            .insert(
                GestureAction::Mute,
                vec!["amixer".into(), "set".into(), "Master".into(), "toggle".into()],
            );
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"MUTE\""));
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back.actions.get(&GestureAction::Mute).map(Vec::len), Some(4));
    }

    #[test]
    fn test_data_paths() {
        let paths = DataPaths::new(PathBuf::from("/data"));
        assert_eq!(paths.model(), PathBuf::from("/data/model.json"));
        assert_eq!(paths.dataset(), PathBuf::from("/data/dataset.json"));
    }
}
