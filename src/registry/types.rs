//! Gesture registry types.
//!
//! The registry is the authoritative mapping of gesture label to action,
//! display emoji and confidence threshold.

use crate::core::classifier::{NONE_LABEL, UNCALIBRATED_LABEL};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::str::FromStr;
use uuid::Uuid;

/// Lowest accepted per-gesture confidence threshold.
pub const MIN_THRESHOLD: f64 = 0.55;

/// Highest accepted per-gesture confidence threshold.
pub const MAX_THRESHOLD: f64 = 0.98;

/// The closed set of device-control actions a gesture can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GestureAction {
    Mute,
    PlayPause,
    PreviousSlide,
    NextSlide,
    VolumeUp,
    VolumeDown,
    ZoomIn,
    ZoomOut,
    LockScreen,
}

impl GestureAction {
    /// Every supported action, in display order.
    pub const ALL: [GestureAction; 9] = [
        GestureAction::Mute,
        GestureAction::PlayPause,
        GestureAction::PreviousSlide,
        GestureAction::NextSlide,
        GestureAction::VolumeUp,
        GestureAction::VolumeDown,
        GestureAction::ZoomIn,
        GestureAction::ZoomOut,
        GestureAction::LockScreen,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GestureAction::Mute => "MUTE",
            GestureAction::PlayPause => "PLAY_PAUSE",
            GestureAction::PreviousSlide => "PREVIOUS_SLIDE",
            GestureAction::NextSlide => "NEXT_SLIDE",
            GestureAction::VolumeUp => "VOLUME_UP",
            GestureAction::VolumeDown => "VOLUME_DOWN",
            GestureAction::ZoomIn => "ZOOM_IN",
            GestureAction::ZoomOut => "ZOOM_OUT",
            GestureAction::LockScreen => "LOCK_SCREEN",
        }
    }
}

impl std::fmt::Display for GestureAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GestureAction {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_uppercase();
        GestureAction::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == wanted)
            .ok_or_else(|| RegistryError::UnsupportedAction(s.trim().to_string()))
    }
}

/// Registry errors.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryError {
    /// Action identifier outside the supported set
    UnsupportedAction(String),
    /// Label missing or blank
    MissingLabel,
    /// Label collides with a label the engine reports itself
    ReservedLabel(String),
    /// Sample does not match the dataset's feature dimension
    InvalidSample(String),
    /// Reading or writing persisted state failed
    Storage(String),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::UnsupportedAction(a) => write!(f, "Unsupported action: {a}"),
            RegistryError::MissingLabel => write!(f, "Gesture label is required"),
            RegistryError::ReservedLabel(l) => write!(f, "Gesture label '{l}' is reserved"),
            RegistryError::InvalidSample(e) => write!(f, "Invalid sample: {e}"),
            RegistryError::Storage(e) => write!(f, "Storage error: {e}"),
        }
    }
}

impl std::error::Error for RegistryError {}

/// Lower-case and validate a gesture label.
pub fn normalize_label(raw: &str) -> Result<String, RegistryError> {
    let label = raw.trim().to_lowercase();
    if label.is_empty() {
        return Err(RegistryError::MissingLabel);
    }
    if label == NONE_LABEL || label == UNCALIBRATED_LABEL {
        return Err(RegistryError::ReservedLabel(label));
    }
    Ok(label)
}

/// Clamp a threshold into the accepted range.
pub fn clamp_threshold(threshold: f64) -> f64 {
    if threshold.is_nan() {
        return MIN_THRESHOLD;
    }
    threshold.clamp(MIN_THRESHOLD, MAX_THRESHOLD)
}

/// One registry entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GestureEntry {
    pub id: String,
    pub label: String,
    pub action: GestureAction,
    #[serde(default)]
    pub emoji: String,
    pub threshold: f64,
}

impl GestureEntry {
    /// Build a validated entry with a fresh id.
    pub fn new(
        label: &str,
        action: GestureAction,
        emoji: impl Into<String>,
        threshold: f64,
    ) -> Result<Self, RegistryError> {
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            label: normalize_label(label)?,
            action,
            emoji: emoji.into(),
            threshold: clamp_threshold(threshold),
        })
    }
}

/// Unvalidated entry as submitted by a caller (CLI file, HTTP body).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GestureEntryInput {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub label: String,
    pub action: String,
    #[serde(default)]
    pub emoji: Option<String>,
    #[serde(default)]
    pub threshold: Option<f64>,
}

impl GestureEntryInput {
    /// Validate into a registry entry, keeping the caller's id when given.
    pub fn into_entry(self, default_threshold: f64) -> Result<GestureEntry, RegistryError> {
        let action: GestureAction = self.action.parse()?;
        let mut entry = GestureEntry::new(
            &self.label,
            action,
            self.emoji.unwrap_or_default(),
            self.threshold.unwrap_or(default_threshold),
        )?;
        if let Some(id) = self.id.filter(|id| !id.trim().is_empty()) {
            entry.id = id;
        }
        Ok(entry)
    }
}

/// Validate a whole batch; nothing is returned unless every entry is valid.
pub fn validate_entries(
    inputs: Vec<GestureEntryInput>,
    default_threshold: f64,
) -> Result<Vec<GestureEntry>, RegistryError> {
    inputs
        .into_iter()
        .map(|input| input.into_entry(default_threshold))
        .collect()
}

/// The gesture registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GestureRegistry {
    entries: Vec<GestureEntry>,
}

impl GestureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from entries, keeping only the last entry per action.
    pub fn from_entries(entries: Vec<GestureEntry>) -> Self {
        let mut registry = Self::new();
        for entry in entries {
            registry.upsert(entry);
        }
        registry
    }

    pub fn entries(&self) -> &[GestureEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn find_by_label(&self, label: &str) -> Option<&GestureEntry> {
        self.entries.iter().find(|e| e.label == label)
    }

    pub fn find_by_action(&self, action: GestureAction) -> Option<&GestureEntry> {
        self.entries.iter().find(|e| e.action == action)
    }

    /// Insert an entry, replacing any entry bound to the same action.
    ///
    /// Returns the replaced entry.
    pub fn upsert(&mut self, entry: GestureEntry) -> Option<GestureEntry> {
        let replaced = self
            .entries
            .iter()
            .position(|e| e.action == entry.action)
            .map(|i| self.entries.remove(i));
        self.entries.push(entry);
        replaced
    }

    /// Distinct labels of every entry.
    pub fn labels(&self) -> BTreeSet<String> {
        self.entries.iter().map(|e| e.label.clone()).collect()
    }

    /// Load a registry from disk; a missing file yields an empty registry.
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let content =
            std::fs::read_to_string(path).map_err(|e| RegistryError::Storage(e.to_string()))?;
        let entries: Vec<GestureEntry> =
            serde_json::from_str(&content).map_err(|e| RegistryError::Storage(e.to_string()))?;
        Ok(Self::from_entries(entries))
    }

    pub fn save(&self, path: &Path) -> Result<(), RegistryError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RegistryError::Storage(e.to_string()))?;
        }
        let json = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| RegistryError::Storage(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| RegistryError::Storage(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_parsing() {
        assert_eq!("play_pause".parse::<GestureAction>(), Ok(GestureAction::PlayPause));
        assert_eq!(" VOLUME_UP ".parse::<GestureAction>(), Ok(GestureAction::VolumeUp));
        assert_eq!(
            "SELF_DESTRUCT".parse::<GestureAction>(),
            Err(RegistryError::UnsupportedAction("SELF_DESTRUCT".into()))
        );
        for action in GestureAction::ALL {
            assert_eq!(action.as_str().parse::<GestureAction>(), Ok(action));
        }
    }

    #[test]
    fn test_action_serde_names() {
        let json = serde_json::to_string(&GestureAction::NextSlide).unwrap();
        assert_eq!(json, "\"NEXT_SLIDE\"");
    }

    #[test]
    fn test_entry_validation() {
        let entry =
            GestureEntry::new("  Open_Palm ", GestureAction::PlayPause, "✋", 1.5).unwrap();
        assert_eq!(entry.label, "open_palm");
        assert_eq!(entry.threshold, MAX_THRESHOLD);

        assert_eq!(
            GestureEntry::new("   ", GestureAction::Mute, "", 0.8),
            Err(RegistryError::MissingLabel)
        );
        assert!(matches!(
            GestureEntry::new("None", GestureAction::Mute, "", 0.8),
            Err(RegistryError::ReservedLabel(_))
        ));
        assert_eq!(clamp_threshold(0.1), MIN_THRESHOLD);
    }

    #[test]
    fn test_upsert_replaces_by_action() {
        let mut registry = GestureRegistry::new();
        registry.upsert(GestureEntry::new("fist", GestureAction::Mute, "", 0.8).unwrap());
        registry.upsert(GestureEntry::new("peace", GestureAction::NextSlide, "", 0.8).unwrap());

        let replaced =
            registry.upsert(GestureEntry::new("rock", GestureAction::Mute, "", 0.8).unwrap());
        assert_eq!(replaced.unwrap().label, "fist");
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.find_by_action(GestureAction::Mute).unwrap().label, "rock");
    }

    #[test]
    fn test_batch_validation_is_all_or_nothing() {
        let inputs = vec![
            GestureEntryInput {
                id: None,
                label: "fist".into(),
                action: "MUTE".into(),
                emoji: None,
                threshold: None,
            },
            GestureEntryInput {
                id: None,
                label: "wave".into(),
                action: "FLY".into(),
                emoji: None,
                threshold: None,
            },
        ];
        assert!(matches!(
            validate_entries(inputs, 0.82),
            Err(RegistryError::UnsupportedAction(_))
        ));
    }

    #[test]
    fn test_registry_persistence() {
        let dir = std::env::temp_dir().join(format!("gesture-registry-{}", Uuid::new_v4()));
        let path = dir.join("gestures.json");

        assert!(GestureRegistry::load(&path).unwrap().is_empty());

        let registry = GestureRegistry::from_entries(vec![
            GestureEntry::new("fist", GestureAction::Mute, "✊", 0.8).unwrap(),
            GestureEntry::new("palm", GestureAction::PlayPause, "✋", 0.9).unwrap(),
        ]);
        registry.save(&path).unwrap();
        assert_eq!(GestureRegistry::load(&path).unwrap(), registry);

        let _ = std::fs::remove_dir_all(dir);
    }
}
