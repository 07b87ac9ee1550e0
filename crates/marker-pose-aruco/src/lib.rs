//! ArUco-style marker detection for `marker-pose`.
//!
//! This crate covers the image side of the pipeline:
//! - embedded built-in dictionaries (compiled into the binary),
//! - matching observed marker codes against a dictionary under rotation,
//! - adaptive thresholding, quad extraction and bit decoding in whole images,
//! - rendering synthetic markers for tests and demos.
//!
//! It does **not** estimate poses; see the `marker-pose` facade for that.
//!
//! ```
//! use marker_pose_aruco::{builtins, render, DetectorParams, MarkerDetector};
//!
//! let dict = builtins::DICT_4X4_50;
//! let img = render::draw_marker(&dict, 3, 10, 2).unwrap();
//! let detector = MarkerDetector::new(dict, DetectorParams::default()).unwrap();
//! let found = detector.detect_gray(&img.view());
//! assert_eq!(found[0].id, 3);
//! ```

pub mod builtins;
mod decode;
mod detector;
mod dictionary;
mod matcher;
mod quad;
pub mod render;
mod threshold;

pub use detector::{DetectedMarker, DetectorConfigError, DetectorParams, MarkerDetector};
pub use dictionary::Dictionary;
pub use matcher::{rotate_code_u64, Match, Matcher};
