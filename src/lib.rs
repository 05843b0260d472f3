//! # facelock
//!
//! Face-locked image compositing in pure Rust.
//!
//! This crate provides:
//! - **Mesh warping**: a prepared asset is deformed onto a live face through a
//!   Delaunay mesh over its landmarks, one exact affine map per triangle
//! - **Rigid overlays**: glasses, hats and similar accessories placed,
//!   rotated and scaled from facial anchor landmarks
//! - **Mouth triggers**: an edge-triggered open/close tracker that starts and
//!   stops an asset's sound
//! - **Asset library**: directory scanning, alpha mask derivation, thumbnails
//!   and a compressed on-disk cache
//!
//! Landmark detection and segmentation are external models. They are injected
//! through the [`LandmarkDetector`] and [`Segmenter`] traits, so the core stays
//! a pure pixels-in, pixels-out computation.
//!
//! ## Pipeline
//!
//! 1. Offline, each asset image is run through the landmark detector, masked
//!    ([`derive_alpha_mask`]), extended with eight boundary points and
//!    triangulated ([`triangulate`])
//! 2. Per frame, the live landmarks get their own boundary points in the same
//!    slot order, so the asset's triangle indices stay valid
//! 3. Each triangle is warped and the result blended with the session opacity
//!
//! ## Quick Start
//!
//! ```rust
//! use facelock::{warp_face, AssetBuilder, PointSet};
//! use image::{Rgb, RgbImage, Rgba, RgbaImage};
//!
//! let landmarks = PointSet::from(vec![(20, 20), (80, 20), (20, 80), (80, 80)]);
//! let asset = AssetBuilder::new("demo_0")
//!     .image(RgbaImage::from_pixel(100, 100, Rgba([200, 40, 40, 255])))
//!     .landmarks(landmarks.clone())
//!     .build()
//!     .unwrap();
//!
//! let frame = RgbImage::from_pixel(100, 100, Rgb([0, 0, 0]));
//! let out = warp_face(&frame, &asset, &landmarks, 1.0, 0.6).unwrap();
//! assert_eq!(*out.get_pixel(50, 50), Rgb([200, 40, 40]));
//! ```

pub mod asset;
pub mod boundary;
pub mod capability;
pub mod codec;
pub mod composite;
pub mod config;
mod error;
pub mod gender;
pub mod geometry;
pub mod library;
pub mod mask;
pub mod mouth;
pub mod overlay;
pub mod session;
pub mod triangulate;
mod types;
pub mod warp;

pub use asset::{AnchorRule, Asset, AssetBuilder, AssetKind, AssetPreprocessor};
pub use boundary::{image_boundary, landmark_boundary, BOUNDARY_POINT_COUNT};
pub use capability::{
    CapabilityProvider, FixedLandmarks, LandmarkDetector, NoSegmentation, ProbabilityMap,
    Segmenter, SharedCapabilities, SidecarProvider,
};
pub use config::{Config, LandmarkLayout};
pub use error::{Error, Result};
pub use gender::{classify_gender, FaceLocator, Gender, GenderClassifier, GenderPrediction};
pub use geometry::AffineTransform;
pub use library::{AssetLibrary, AssetSummary, Category};
pub use mask::derive_alpha_mask;
pub use mouth::{MouthEvent, MouthTracker};
pub use overlay::place_overlay;
pub use session::{AudioEvent, Context, FrameOutcome, FrameRequest, FrameResponse, Session};
pub use triangulate::triangulate;
pub use types::{Point, PointSet, Rect, Triangle, MAX_COORDINATE};
pub use warp::warp_face;
