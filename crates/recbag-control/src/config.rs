use crate::{ControlError, Result};
use recbag_camera::StreamParams;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// BCM pin numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pins {
    pub led: u8,
    pub button: u8,
}

impl Default for Pins {
    fn default() -> Self {
        Self { led: 4, button: 17 }
    }
}

/// Recorder configuration, loadable from JSON. Missing fields take defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    pub pins: Pins,
    /// Continuous press that shuts the program down (whole seconds)
    pub hold_threshold_secs: u64,
    pub poll_interval_ms: u64,
    pub blink_count: u32,
    pub blink_interval_ms: u64,
    /// LED on-time at startup; 0 skips the lamp test
    pub lamp_test_ms: u64,
    /// Explicit recording directory. Wins over media auto-detection.
    pub base_dir: Option<PathBuf>,
    /// Mount root scanned for the first removable medium
    pub media_root: PathBuf,
    pub record_subdir: String,
    pub extension: String,
    pub stream: StreamParams,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            pins: Pins::default(),
            hold_threshold_secs: 3,
            poll_interval_ms: 10,
            blink_count: 6,
            blink_interval_ms: 100,
            lamp_test_ms: 1000,
            base_dir: None,
            media_root: PathBuf::from("/media/realsense"),
            record_subdir: "Realsense_rec".into(),
            extension: "mkv".into(),
            stream: StreamParams::default(),
        }
    }
}

impl RecorderConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|source| ControlError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ControlError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn hold_threshold(&self) -> Duration {
        Duration::from_secs(self.hold_threshold_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn blink_interval(&self) -> Duration {
        Duration::from_millis(self.blink_interval_ms)
    }

    pub fn lamp_test(&self) -> Duration {
        Duration::from_millis(self.lamp_test_ms)
    }

    /// Directory recordings go to: `base_dir` if set, otherwise the first
    /// medium (by name) mounted under `media_root`, plus `record_subdir`.
    pub fn resolve_base_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.base_dir {
            return Ok(dir.clone());
        }

        let entries = fs::read_dir(&self.media_root)
            .map_err(|_| ControlError::NoMedium(self.media_root.clone()))?;
        let mut media: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        media.sort();

        media
            .into_iter()
            .next()
            .map(|m| m.join(&self.record_subdir))
            .ok_or_else(|| ControlError::NoMedium(self.media_root.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_match_the_board_wiring() {
        let cfg = RecorderConfig::default();
        assert_eq!(cfg.pins, Pins { led: 4, button: 17 });
        assert_eq!(cfg.hold_threshold(), Duration::from_secs(3));
        assert_eq!(cfg.blink_count, 6);
        assert_eq!(cfg.blink_interval(), Duration::from_millis(100));
        assert!(cfg.poll_interval() <= Duration::from_millis(50));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("recbag.json");
        fs::write(&path, r#"{ "pins": { "led": 5, "button": 6 }, "extension": "bag" }"#).unwrap();

        let cfg = RecorderConfig::load(&path).unwrap();
        assert_eq!(cfg.pins, Pins { led: 5, button: 6 });
        assert_eq!(cfg.extension, "bag");
        assert_eq!(cfg.hold_threshold_secs, 3);
        assert_eq!(cfg.stream, StreamParams::default());
    }

    #[test]
    fn bad_json_reports_the_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();
        let err = RecorderConfig::load(&path).unwrap_err();
        assert!(matches!(err, ControlError::ConfigParse { .. }));
        assert!(err.to_string().contains("broken.json"));
    }

    #[test]
    fn explicit_base_dir_wins() {
        let cfg = RecorderConfig {
            base_dir: Some(PathBuf::from("/data/rec")),
            media_root: PathBuf::from("/definitely/missing"),
            ..Default::default()
        };
        assert_eq!(cfg.resolve_base_dir().unwrap(), PathBuf::from("/data/rec"));
    }

    #[test]
    fn first_medium_is_picked() {
        let root = tempdir().unwrap();
        fs::create_dir(root.path().join("B2")).unwrap();
        fs::create_dir(root.path().join("A1")).unwrap();
        fs::write(root.path().join("0-not-a-dir"), b"").unwrap();

        let cfg = RecorderConfig {
            media_root: root.path().to_path_buf(),
            ..Default::default()
        };
        assert_eq!(
            cfg.resolve_base_dir().unwrap(),
            root.path().join("A1").join("Realsense_rec")
        );
    }

    #[test]
    fn empty_media_root_is_an_error() {
        let root = tempdir().unwrap();
        let cfg = RecorderConfig {
            media_root: root.path().to_path_buf(),
            ..Default::default()
        };
        assert!(matches!(cfg.resolve_base_dir(), Err(ControlError::NoMedium(_))));
    }
}
