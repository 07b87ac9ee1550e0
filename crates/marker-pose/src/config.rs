//! Static tracker configuration and its JSON helpers.

use marker_pose_aruco::{builtins, DetectorConfigError, DetectorParams, Dictionary};
use marker_pose_core::{CameraIntrinsics, IntrinsicsError};
use marker_pose_filter::{FilterConfigError, FilterParams};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::{fs, path::Path};

#[derive(thiserror::Error, Debug)]
pub enum ConfigIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Invalid static configuration.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("allowed marker id set is empty")]
    EmptyAllowedIds,
    #[error("marker id {id} is outside dictionary {dictionary} ({len} markers)")]
    IdOutsideDictionary {
        id: u32,
        dictionary: &'static str,
        len: usize,
    },
    #[error("marker length must be finite and > 0 (got {0})")]
    InvalidMarkerLength(f64),
    #[error("unknown dictionary {0:?}")]
    UnknownDictionary(String),
    #[error("frame rate must be finite and > 0 (got {0})")]
    InvalidFrameRate(f64),
    #[error(transparent)]
    Detector(#[from] DetectorConfigError),
    #[error(transparent)]
    Filter(#[from] FilterConfigError),
    #[error(transparent)]
    Intrinsics(#[from] IntrinsicsError),
}

fn default_allowed_ids() -> BTreeSet<u32> {
    (2..=6).collect()
}

/// Everything a [`crate::MarkerTracker`] needs besides the frames.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Markers outside this set are ignored.
    pub allowed_ids: BTreeSet<u32>,
    /// Side of the outer black square, meters.
    pub marker_length: f64,
    /// Name of an embedded dictionary, e.g. `"DICT_4X4_50"`.
    pub dictionary: String,
    pub detector: DetectorParams,
    pub filter: FilterParams,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            allowed_ids: default_allowed_ids(),
            marker_length: 0.05,
            dictionary: builtins::DICT_4X4_50.name.to_string(),
            detector: DetectorParams::default(),
            filter: FilterParams::default(),
        }
    }
}

impl TrackerConfig {
    /// Resolve the configured dictionary name.
    pub fn resolve_dictionary(&self) -> Result<Dictionary, ConfigError> {
        builtins::builtin_dictionary(&self.dictionary)
            .ok_or_else(|| ConfigError::UnknownDictionary(self.dictionary.clone()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.marker_length.is_finite() && self.marker_length > 0.0) {
            return Err(ConfigError::InvalidMarkerLength(self.marker_length));
        }
        let dict = self.resolve_dictionary()?;
        if self.allowed_ids.is_empty() {
            return Err(ConfigError::EmptyAllowedIds);
        }
        if let Some(&id) = self.allowed_ids.iter().find(|&&id| id as usize >= dict.len()) {
            return Err(ConfigError::IdOutsideDictionary {
                id,
                dictionary: dict.name,
                len: dict.len(),
            });
        }
        self.detector.validate()?;
        self.filter.validate()?;
        Ok(())
    }

    /// Load a JSON config from disk. Missing fields take their defaults.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigIoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

fn default_fps() -> f64 {
    60.0
}

/// Input of the command-line runner: a tracker config plus the camera.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SequenceConfig {
    #[serde(default)]
    pub tracker: TrackerConfig,
    /// Intrinsics at the resolution of the input images.
    pub intrinsics: CameraIntrinsics,
    /// Frame timestamps are `index / fps`.
    #[serde(default = "default_fps")]
    pub fps: f64,
}

impl SequenceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tracker.validate()?;
        self.intrinsics.validate()?;
        if !(self.fps.is_finite() && self.fps > 0.0) {
            return Err(ConfigError::InvalidFrameRate(self.fps));
        }
        Ok(())
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigIoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}
