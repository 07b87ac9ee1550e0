//! Core types and geometry for fiducial marker pose tracking.
//!
//! This crate is intentionally small and purely geometric. It does *not*
//! detect markers or filter poses; it provides the shared vocabulary:
//! image views, pinhole intrinsics, the 4-point homography, pose types and
//! the detection-to-consumer axis conversion.

mod camera;
pub mod coords;
mod homography;
mod image;
mod logger;
mod pose;

pub use camera::{CameraIntrinsics, IntrinsicsError};
pub use homography::{homography_from_4pt, homography_from_4pt_f64, Homography};
pub use image::{
    get_gray, sample_bilinear, GrayImage, GrayImageView, ImageLayoutError, ImageView, OwnedImage,
    PixelFormat,
};
pub use pose::{FilteredPose, RawPose};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;
