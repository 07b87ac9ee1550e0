//! Temporal smoothing of per-marker poses.
//!
//! Every marker id owns a small state machine fed once per processed frame:
//!
//! 1. **Window average** of the last `window_size` translations (rotation is
//!    left as observed),
//! 2. **OneEuro low-pass** of the translation whose cutoff rises with the
//!    estimated speed, and **SLERP** of the rotation by a fixed fraction toward
//!    the new observation.
//!
//! [`FilterMode`] selects stage 1, stage 2 or both. State lives in an explicit
//! [`FilterBank`]; there is no process-wide table.
//!
//! ```
//! use marker_pose_core::RawPose;
//! use marker_pose_filter::{FilterBank, FilterParams};
//! use nalgebra::{Rotation3, Vector3};
//!
//! let mut bank = FilterBank::new(FilterParams::default()).unwrap();
//! let raw = RawPose::new(3, Rotation3::identity(), Vector3::new(0.0, 0.0, -0.5));
//! let out = bank.filter(&raw, 0.0);
//! assert_eq!(out.marker_id, 3);
//! ```

mod bank;
pub mod one_euro;
mod params;
mod rotation;
mod window;

pub use bank::{FilterBank, FilterState};
pub use one_euro::{alpha, OneEuroFilter, OneEuroParams};
pub use params::{FilterConfigError, FilterMode, FilterParams};
pub use rotation::blend_rotation;
pub use window::WindowAverage;
