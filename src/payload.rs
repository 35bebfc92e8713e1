//! JSON payloads handed to the client-side renderer.
//!
//! Every payload carries the volume geometry next to its samples. Samples are
//! nested one level: the outer sequence walks the slowest axis and each
//! element holds the remaining axes flattened.

use crate::{
    enums::{PayloadKind, VolumeRole},
    error::SegmentationError,
    overlay::compute_overlay,
    volume::Volume,
};

use ndarray::{ArrayD, ArrayViewD, Axis, Zip};
use serde::{Serialize, Serializer, ser::SerializeSeq};
use tracing::debug;

#[derive(Debug, Clone, Serialize)]
pub struct Payload {
    pub shape: Vec<usize>,
    pub spacing: Vec<f64>,
    pub origin: Vec<f64>,
    pub direction: Vec<f64>,
    pub data: VoxelRows,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<PayloadKind>,
}

/// Samples of a payload, serialized slice by slice along the slowest axis.
/// Integral samples are written as JSON integers, unsigned when
/// non-negative so the full `u64` range survives.
#[derive(Debug, Clone)]
pub struct VoxelRows {
    values: ArrayD<f64>,
    integral: bool,
}

impl VoxelRows {
    pub fn new(values: ArrayD<f64>, integral: bool) -> Self {
        Self { values, integral }
    }

    pub fn values(&self) -> &ArrayD<f64> {
        &self.values
    }

    /// The nested form as owned vectors.
    pub fn rows(&self) -> Vec<Vec<f64>> {
        self.slices()
            .into_iter()
            .map(|slice| slice.iter().copied().collect())
            .collect()
    }

    fn slices(&self) -> Vec<ArrayViewD<'_, f64>> {
        if self.values.ndim() == 0 {
            return vec![self.values.view()];
        }
        self.values.axis_iter(Axis(0)).collect()
    }
}

struct Row<'a> {
    samples: ArrayViewD<'a, f64>,
    integral: bool,
}

impl Serialize for Row<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.samples.len()))?;
        for &value in self.samples.iter() {
            if self.integral && value >= 0.0 {
                seq.serialize_element(&(value as u64))?;
            } else if self.integral {
                seq.serialize_element(&(value as i64))?;
            } else {
                seq.serialize_element(&value)?;
            }
        }
        seq.end()
    }
}

impl Serialize for VoxelRows {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let slices = self.slices();
        let mut seq = serializer.serialize_seq(Some(slices.len()))?;
        for samples in slices {
            seq.serialize_element(&Row {
                samples,
                integral: self.integral,
            })?;
        }
        seq.end()
    }
}

/// Fail unless both volumes have the same size on every axis.
pub fn ensure_same_size(
    left: &Volume,
    left_role: VolumeRole,
    right: &Volume,
    right_role: VolumeRole,
) -> Result<(), SegmentationError> {
    let (left_shape, right_shape) = (left.size(), right.size());
    if left_shape != right_shape {
        return Err(SegmentationError::ShapeMismatch {
            left: left_role,
            left_shape,
            right: right_role,
            right_shape,
        });
    }
    Ok(())
}

/// Geometry and raw samples of a single image.
pub fn build_base_payload(volume: Volume) -> Payload {
    let shape = volume.size();
    let (data, geometry, pixel_type) = volume.into_parts();
    Payload {
        shape,
        spacing: geometry.spacing,
        origin: geometry.origin,
        direction: geometry.direction,
        data: VoxelRows::new(data, pixel_type.is_integral()),
        kind: None,
    }
}

/// Raw segmentation samples placed in the base image's physical space.
///
/// The overlay of the segmentation onto the base image is computed, and
/// fails on a size mismatch, but the payload carries the segmentation
/// itself. `shape` comes from the segmentation, `spacing`, `origin` and
/// `direction` from the base image.
pub fn build_overlay_payload(
    base: &Volume,
    segmentation: Volume,
) -> Result<Payload, SegmentationError> {
    let overlay = compute_overlay(base, &segmentation)?;
    debug!(
        labels = overlay.labels.len(),
        voxels = overlay.buffer.len(),
        "segmentation overlay computed"
    );

    let shape = segmentation.size();
    let (data, _, pixel_type) = segmentation.into_parts();
    let geometry = base.geometry().clone();
    Ok(Payload {
        shape,
        spacing: geometry.spacing,
        origin: geometry.origin,
        direction: geometry.direction,
        data: VoxelRows::new(data, pixel_type.is_integral()),
        kind: Some(PayloadKind::SegmentationOverlay),
    })
}

/// Voxel-wise absolute difference, geometry taken from `first`.
pub fn build_diff_payload(first: &Volume, second: &Volume) -> Result<Payload, SegmentationError> {
    ensure_same_size(
        first,
        VolumeRole::FirstDifferenceInput,
        second,
        VolumeRole::SecondDifferenceInput,
    )?;

    let difference = Zip::from(first.data())
        .and(second.data())
        .par_map_collect(|&a, &b| (a - b).abs());

    let geometry = first.geometry().clone();
    Ok(Payload {
        shape: first.size(),
        spacing: geometry.spacing,
        origin: geometry.origin,
        direction: geometry.direction,
        data: VoxelRows::new(difference, false),
        kind: Some(PayloadKind::Difference),
    })
}
