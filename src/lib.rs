//! # Segmentation viewer library
//!
//! This crate attaches segmentation metadata to the items of a
//! data-management platform and builds the JSON payloads a client needs to
//! render base images, segmentations and segmentation differences in 3D.

//!
//! Volumes are decoded from NIfTI (`.nii`, `.nii.gz`), DICOM (`.dcm`) and
//! common raster formats (PNG, JPEG, TIFF, ...). Each payload carries the
//! geometry of the volume:
//!  - shape (voxel counts, fastest axis first)
//!  - spacing
//!  - origin
//!  - direction cosines
//!
//! and its samples, nested one level along the slowest axis. Three payloads
//! are available:
//!  - Base image: the raw samples of one volume
//!  - Segmentation overlay: a segmentation placed on the base image
//!  - Difference: the absolute voxel-wise difference of two segmentations
//!
//! Volumes that are combined must have the same size on every axis.
//!
//! Item metadata lives behind the [`ItemStore`] trait. [`DirectoryStore`]
//! implements it on top of a plain directory tree.
//!
//! # Examples
//!
//! ## Building a difference payload from two files
//!
//! ```no_run
//! # use segmentation_viewer::{VolumeLoader, build_diff_payload};
//! # use std::fs::File;
//! let first = VolumeLoader::decode(File::open("rater1.nii.gz")?, "rater1.nii.gz")?;
//! let second = VolumeLoader::decode(File::open("rater2.nii.gz")?, "rater2.nii.gz")?;
//! let payload = build_diff_payload(&first, &second)?;
//! println!("{}", serde_json::to_string(&payload)?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Working with items stored on disk
//!
//! ```no_run
//! # use segmentation_viewer::{DirectoryStore, SegmentationService};
//! let mut service = SegmentationService::new(DirectoryStore::new("items"));
//! service.detect_images("case-001")?;
//! service.set_base_image("case-001", "ct.nii.gz")?;
//! let payload = service.segmentation_payload("case-001", "liver.nii.gz")?;
//! # Ok::<(), segmentation_viewer::SegmentationError>(())
//! ```

pub mod directory_store;
pub mod enums;
pub mod error;
pub mod item;
pub mod overlay;
pub mod payload;
pub mod service;
pub mod volume;
pub mod volume_loader;

pub use directory_store::DirectoryStore;
pub use enums::{ImageFormat, PayloadKind, PixelType, VolumeRole};
pub use error::SegmentationError;
pub use item::{FileRef, Item, ItemStore, SegmentationInfo, StoreError};
pub use overlay::{LabelOpacity, Overlay, compute_overlay};
pub use payload::{
    Payload, VoxelRows, build_base_payload, build_diff_payload, build_overlay_payload,
};
pub use service::SegmentationService;
pub use volume::{Geometry, Volume};
pub use volume_loader::{VolumeLoader, VolumeLoaderError};
