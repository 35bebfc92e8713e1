#![allow(dead_code)]

use std::{fs, path::Path};

use ndarray::{ArrayD, IxDyn};
use segmentation_viewer::{Geometry, PixelType, Volume};

const NIFTI_HEADER_SIZE: usize = 348;
const NIFTI_VOX_OFFSET: usize = 352;
const DT_FLOAT32: i16 = 16;

/// Orientation written into a NIfTI header.
pub enum Orientation {
    Unset,
    /// Affine rows of the sform.
    Sform([[f32; 4]; 3]),
    /// Quaternion `(b, c, d)`, offset and the `pixdim[0]` handedness.
    Qform {
        quatern: [f32; 3],
        offset: [f32; 3],
        qfac: f32,
    },
}

pub fn volume(shape: &[usize], values: Vec<f64>) -> Volume {
    Volume::new(
        ArrayD::from_shape_vec(IxDyn(shape), values).unwrap(),
        PixelType::UInt8,
    )
}

pub fn volume_with_geometry(shape: &[usize], values: Vec<f64>, geometry: Geometry) -> Volume {
    Volume::with_geometry(
        ArrayD::from_shape_vec(IxDyn(shape), values).unwrap(),
        geometry,
        PixelType::UInt8,
    )
    .unwrap()
}

/// Single-file NIfTI-1 image with float32 samples. `size` is (x, y, z) and
/// `samples` are ordered x fastest.
pub fn nifti_bytes(
    size: [u16; 3],
    pixdim: [f32; 3],
    orientation: Orientation,
    samples: &[f32],
) -> Vec<u8> {
    let mut header = vec![0u8; NIFTI_HEADER_SIZE];
    let mut put = |offset: usize, bytes: &[u8]| {
        header[offset..offset + bytes.len()].copy_from_slice(bytes)
    };

    put(0, &(NIFTI_HEADER_SIZE as i32).to_le_bytes());
    let dims = [3, size[0], size[1], size[2], 1, 1, 1, 1];
    for (i, dim) in dims.iter().enumerate() {
        put(40 + 2 * i, &(*dim as i16).to_le_bytes());
    }
    put(70, &DT_FLOAT32.to_le_bytes());
    put(72, &32i16.to_le_bytes());
    let qfac = match &orientation {
        Orientation::Qform { qfac, .. } => *qfac,
        _ => 1.0,
    };
    let pixdims = [qfac, pixdim[0], pixdim[1], pixdim[2], 1.0, 1.0, 1.0, 1.0];
    for (i, value) in pixdims.iter().enumerate() {
        put(76 + 4 * i, &f32::to_le_bytes(*value));
    }
    put(108, &(NIFTI_VOX_OFFSET as f32).to_le_bytes());
    put(112, &1.0f32.to_le_bytes());
    match orientation {
        Orientation::Unset => {}
        Orientation::Sform(rows) => {
            put(254, &1i16.to_le_bytes());
            for (r, row) in rows.iter().enumerate() {
                for (c, value) in row.iter().enumerate() {
                    put(280 + 16 * r + 4 * c, &value.to_le_bytes());
                }
            }
        }
        Orientation::Qform {
            quatern, offset, ..
        } => {
            put(252, &1i16.to_le_bytes());
            for (i, value) in quatern.iter().chain(offset.iter()).enumerate() {
                put(256 + 4 * i, &value.to_le_bytes());
            }
        }
    }
    put(344, b"n+1\0");

    let mut bytes = header;
    bytes.extend_from_slice(&[0u8; NIFTI_VOX_OFFSET - NIFTI_HEADER_SIZE]);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

/// Write an 8-bit grayscale PNG, `pixels` in row-major order.
pub fn write_png(path: &Path, width: u32, height: u32, pixels: Vec<u8>) {
    image::GrayImage::from_raw(width, height, pixels)
        .expect("pixel count matches dimensions")
        .save(path)
        .unwrap();
}

pub fn write_text(path: &Path, text: &str) {
    fs::write(path, text).unwrap();
}
