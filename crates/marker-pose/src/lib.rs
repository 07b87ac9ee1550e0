//! Fiducial marker pose tracking.
//!
//! This is the facade of the `marker-pose-*` workspace. It provides:
//! - re-exports of the underlying crates,
//! - [`PoseEstimator`]: closed-form pose of a square marker from its corners,
//! - [`MarkerTracker`]: the synchronous per-frame pipeline
//!   (detect, keep allowed ids, solve, convert axes, filter),
//! - [`TrackingService`]: the same pipeline on a worker thread behind a
//!   single-flight [`FrameScheduler`], with snapshots published to consumers.
//!
//! ## Quickstart
//!
//! ```
//! use marker_pose::aruco::{builtins, render};
//! use marker_pose::core::{CameraIntrinsics, OwnedImage};
//! use marker_pose::{MarkerTracker, TrackerConfig};
//!
//! let gray = render::draw_marker(&builtins::DICT_4X4_50, 3, 10, 2).unwrap();
//! let frame = OwnedImage::rgb_from_gray(&gray);
//! let k = CameraIntrinsics::new(500.0, 500.0, 50.0, 50.0);
//!
//! let mut tracker = MarkerTracker::new(TrackerConfig::default()).unwrap();
//! let poses = tracker.process(&frame.view(), &k, 0.0);
//! assert_eq!(poses.len(), 1);
//! assert_eq!(poses[0].marker_id, 3);
//! ```
//!
//! ## API map
//! - `marker_pose::core`: image views, intrinsics, homography, pose types, axis conversion.
//! - `marker_pose::aruco`: embedded dictionary, marker detection, marker rendering.
//! - `marker_pose::filter`: per-marker temporal filters.

pub use marker_pose_aruco as aruco;
pub use marker_pose_core as core;
pub use marker_pose_filter as filter;

mod config;
mod pose;
mod scheduler;
mod service;
mod tracker;

pub use config::{ConfigError, ConfigIoError, SequenceConfig, TrackerConfig};
pub use pose::{marker_object_points, solve_square_pose, PoseEstimator};
pub use scheduler::{AdmissionGuard, FrameScheduler, SchedulerStats};
pub use service::{
    Frame, FrameProcessor, PoseSnapshot, ServiceError, Submission, TrackingService,
    SUBSCRIBER_BACKLOG,
};
pub use tracker::MarkerTracker;

pub use marker_pose_core::{CameraIntrinsics, FilteredPose, ImageView, OwnedImage, RawPose};
pub use marker_pose_filter::{FilterMode, FilterParams};
