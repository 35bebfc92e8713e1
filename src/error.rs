use thiserror::Error;

use crate::{enums::VolumeRole, item::StoreError, volume_loader::VolumeLoaderError};

#[derive(Debug, Error)]
pub enum SegmentationError {
    #[error("Could not decode {role} '{file}': {source}")]
    Decode {
        role: VolumeRole,
        file: String,
        #[source]
        source: VolumeLoaderError,
    },

    #[error(
        "Shape mismatch: {left} has shape {left_shape:?} but {right} has shape {right_shape:?}"
    )]
    ShapeMismatch {
        left: VolumeRole,
        left_shape: Vec<usize>,
        right: VolumeRole,
        right_shape: Vec<usize>,
    },

    #[error("Missing {role}: {detail}")]
    MissingReference { role: VolumeRole, detail: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl SegmentationError {
    /// The request input this error is about, if it concerns a single one.
    pub fn role(&self) -> Option<VolumeRole> {
        match self {
            SegmentationError::Decode { role, .. }
            | SegmentationError::MissingReference { role, .. } => Some(*role),
            SegmentationError::ShapeMismatch { .. } | SegmentationError::Store(_) => None,
        }
    }
}
