//! Blending of segmentation labels onto a base image.

use crate::{
    enums::VolumeRole,
    error::SegmentationError,
    payload::ensure_same_size,
    volume::Volume,
};

use ndarray::{ArrayD, Zip};
use rayon::slice::ParallelSliceMut;
use tracing::debug;

const BASE_ALPHA: f64 = 0.4;
const ALPHA_STEP: f64 = 0.05;

/// Opacity used when blending one segmentation label.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelOpacity {
    pub label: f64,
    pub alpha: f64,
}

/// Base image rescaled to 0..=255 with every label blended on top.
#[derive(Debug, Clone)]
pub struct Overlay {
    pub buffer: ArrayD<u8>,
    pub labels: Vec<LabelOpacity>,
}

/// Blend the labels of `segmentation` onto `base`.
///
/// # Errors
///
/// Returns [`SegmentationError::ShapeMismatch`] before touching any voxel if
/// the two volumes differ in size.
pub fn compute_overlay(base: &Volume, segmentation: &Volume) -> Result<Overlay, SegmentationError> {
    ensure_same_size(
        base,
        VolumeRole::BaseImage,
        segmentation,
        VolumeRole::Segmentation,
    )?;

    let mut buffer = normalize_to_u8_range(base);
    let labels = label_opacities(segmentation.data());
    debug!(labels = labels.len(), "computing segmentation overlay");

    for opacity in &labels {
        let LabelOpacity { label, alpha } = *opacity;
        Zip::from(&mut buffer)
            .and(segmentation.data())
            .par_for_each(|value, &sample| {
                if sample == label {
                    *value = *value * (1.0 - alpha) + 255.0 * alpha;
                }
            });
        debug!(label, alpha, "blended label");
    }

    Ok(Overlay {
        buffer: buffer.mapv(|v| v.clamp(0.0, 255.0) as u8),
        labels,
    })
}

/// Distinct non-zero labels in ascending order with their opacity.
///
/// The opacity step wraps at the number of distinct values *including*
/// background, so `{0, 1, 2, 3}` yields 0.40, 0.45 and 0.50.
pub fn label_opacities(segmentation: &ArrayD<f64>) -> Vec<LabelOpacity> {
    let mut distinct: Vec<f64> = segmentation.iter().copied().collect();
    distinct.par_sort_unstable_by(f64::total_cmp);
    distinct.dedup_by(|a, b| a.total_cmp(b).is_eq());
    let total = distinct.len();

    distinct
        .into_iter()
        .filter(|&value| value != 0.0)
        .enumerate()
        .map(|(i, label)| LabelOpacity {
            label,
            alpha: BASE_ALPHA + (i % total) as f64 * ALPHA_STEP,
        })
        .collect()
}

/// Rescale linearly to 0..=255 when the maximum exceeds 255, otherwise cast.
/// Both paths truncate to whole values.
fn normalize_to_u8_range(base: &Volume) -> ArrayD<f64> {
    let mut buffer = base.data().clone();
    let Some((min, max)) = base.min_max() else {
        return buffer;
    };

    if max > 255.0 {
        let range = max - min;
        buffer.par_mapv_inplace(|v| f64::from(((v - min) / range * 255.0) as u8));
    } else {
        buffer.par_mapv_inplace(|v| f64::from(v as u8));
    }
    buffer
}
