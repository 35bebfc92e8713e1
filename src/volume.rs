use crate::enums::PixelType;
use crate::volume_loader::VolumeLoaderError;

use ndarray::ArrayD;

/// Physical placement of a volume: per-axis spacing, the position of voxel
/// zero and the flattened row-major direction cosine matrix.
///
/// All vectors are ordered fastest axis first (x, y, z).
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    pub spacing: Vec<f64>,
    pub origin: Vec<f64>,
    pub direction: Vec<f64>,
}

impl Geometry {
    /// Unit spacing, zero origin and identity direction.
    pub fn identity(ndim: usize) -> Self {
        Self {
            spacing: vec![1.0; ndim],
            origin: vec![0.0; ndim],
            direction: identity_matrix(ndim),
        }
    }

    fn is_consistent_with(&self, ndim: usize) -> bool {
        self.spacing.len() == ndim
            && self.origin.len() == ndim
            && self.direction.len() == ndim * ndim
    }
}

pub(crate) fn identity_matrix(ndim: usize) -> Vec<f64> {
    (0..ndim * ndim)
        .map(|i| if i / ndim == i % ndim { 1.0 } else { 0.0 })
        .collect()
}

/// A decoded image. Samples are stored slowest axis first, so a 3D volume
/// is indexed `[z, y, x]`, while [`Volume::size`] reports `(x, y, z)`.
#[derive(Debug, Clone)]
pub struct Volume {
    data: ArrayD<f64>,
    geometry: Geometry,
    pixel_type: PixelType,
}

impl Volume {
    /// Create a volume with unit spacing, zero origin and identity direction.
    pub fn new(data: ArrayD<f64>, pixel_type: PixelType) -> Self {
        let geometry = Geometry::identity(data.ndim());
        Self {
            data,
            geometry,
            pixel_type,
        }
    }

    /// Create a volume with explicit geometry.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeLoaderError::InvalidGeometry`] if the geometry vectors
    /// do not match the dimensionality of `data`.
    pub fn with_geometry(
        data: ArrayD<f64>,
        geometry: Geometry,
        pixel_type: PixelType,
    ) -> Result<Self, VolumeLoaderError> {
        if !geometry.is_consistent_with(data.ndim()) {
            return Err(VolumeLoaderError::InvalidGeometry {
                ndim: data.ndim(),
                spacing: geometry.spacing.len(),
                origin: geometry.origin.len(),
                direction: geometry.direction.len(),
            });
        }
        Ok(Self {
            data,
            geometry,
            pixel_type,
        })
    }

    /// Voxel counts per axis, fastest axis first.
    pub fn size(&self) -> Vec<usize> {
        self.data.shape().iter().rev().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get a reference to the underlying samples, slowest axis first
    pub fn data(&self) -> &ArrayD<f64> {
        &self.data
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn spacing(&self) -> &[f64] {
        &self.geometry.spacing
    }

    pub fn origin(&self) -> &[f64] {
        &self.geometry.origin
    }

    pub fn direction(&self) -> &[f64] {
        &self.geometry.direction
    }

    pub fn pixel_type(&self) -> PixelType {
        self.pixel_type
    }

    pub fn into_parts(self) -> (ArrayD<f64>, Geometry, PixelType) {
        (self.data, self.geometry, self.pixel_type)
    }

    /// Smallest and largest sample, `None` for an empty volume.
    pub fn min_max(&self) -> Option<(f64, f64)> {
        self.data.iter().fold(None, |acc, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
    }
}
