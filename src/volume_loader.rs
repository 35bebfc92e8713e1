use crate::{
    enums::{ImageFormat, PixelType},
    volume::{Geometry, Volume, identity_matrix},
};

use dicom::{
    core::Tag,
    object::{FileDicomObject, InMemDicomObject, open_file},
    pixeldata::{ConvertOptions, PixelDecoder},
};
use dicom_dictionary_std::tags;
use flate2::read::GzDecoder;
use image::{ColorType, ImageReader};
use ndarray::{ArrayD, IxDyn, s};
use nifti::{InMemNiftiObject, NiftiHeader, NiftiObject, volume::ndarray::IntoNdArray};
use std::{
    fs::File,
    io::{self, BufRead, BufReader, Read, Write},
    path::Path,
};
use thiserror::Error;
use tracing::debug;
use web_time::Instant;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, Error)]
pub enum VolumeLoaderError {
    #[error("Unsupported image format for '{0}'")]
    UnsupportedFormat(String),

    #[error("Image contains no samples")]
    EmptyVolume,

    #[error(
        "Invalid geometry for {ndim}D volume: \
         {spacing} spacing, {origin} origin, {direction} direction entries"
    )]
    InvalidGeometry {
        ndim: usize,
        spacing: usize,
        origin: usize,
        direction: usize,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("NIfTI error: {0}")]
    Nifti(#[from] nifti::error::NiftiError),

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),

    #[error("DICOM pixel data error: {0}")]
    PixelData(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

pub struct VolumeLoader;

impl VolumeLoader {
    /// Decode a volume from a byte stream
    ///
    /// # Arguments
    ///
    /// * `reader` - The file contents
    /// * `filename` - Name of the file, its extension selects the codec
    ///
    /// The stream is spooled to a temporary file that is removed when this
    /// function returns, whether decoding succeeded or not.
    ///
    /// # Errors
    ///
    /// Returns error if the extension is unknown or the contents cannot be
    /// decoded by the selected codec
    pub fn decode(mut reader: impl Read, filename: &str) -> Result<Volume, VolumeLoaderError> {
        let format = ImageFormat::from_filename(filename)
            .ok_or_else(|| VolumeLoaderError::UnsupportedFormat(filename.to_string()))?;
        let started = Instant::now();

        let mut spooled = tempfile::Builder::new()
            .prefix("segmentation-")
            .suffix(&ImageFormat::temp_suffix(filename))
            .tempfile()?;
        io::copy(&mut reader, spooled.as_file_mut())?;
        spooled.as_file_mut().flush()?;

        let volume = match format {
            ImageFormat::Nifti => Self::load_nifti(spooled.path())?,
            ImageFormat::Dicom => Self::load_dicom(spooled.path())?,
            ImageFormat::Raster => Self::load_raster(spooled.path())?,
        };
        if volume.is_empty() {
            return Err(VolumeLoaderError::EmptyVolume);
        }

        debug!(
            filename,
            ?format,
            size = ?volume.size(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "decoded volume"
        );
        Ok(volume)
    }

    /// Whether `decode` succeeds on the given stream. This performs a full
    /// decode.
    pub fn is_decodable(reader: impl Read, filename: &str) -> bool {
        match Self::decode(reader, filename) {
            Ok(_) => true,
            Err(err) => {
                debug!(filename, %err, "not a decodable image");
                false
            }
        }
    }

    fn load_nifti(path: &Path) -> Result<Volume, VolumeLoaderError> {
        let mut reader = BufReader::new(File::open(path)?);
        let gzipped = reader.fill_buf()?.starts_with(&GZIP_MAGIC);
        let object = if gzipped {
            InMemNiftiObject::from_reader(GzDecoder::new(reader))?
        } else {
            InMemNiftiObject::from_reader(reader)?
        };

        let header = object.header().clone();
        let array = object.into_volume().into_ndarray::<f64>()?;

        // NIfTI arrays are indexed [x, y, z]
        let reversed = array.t();
        let shape = reversed.shape().to_vec();
        let samples: Vec<f64> = reversed.iter().copied().collect();
        let data = ArrayD::from_shape_vec(IxDyn(&shape), samples)?;

        let geometry = Self::nifti_geometry(&header, data.ndim());
        Volume::with_geometry(data, geometry, Self::nifti_pixel_type(&header))
    }

    fn nifti_pixel_type(header: &NiftiHeader) -> PixelType {
        let scaled =
            (header.scl_slope != 0.0 && header.scl_slope != 1.0) || header.scl_inter != 0.0;
        match header.datatype {
            _ if scaled => PixelType::Float64,
            2 => PixelType::UInt8,
            4 => PixelType::Int16,
            8 => PixelType::Int32,
            16 => PixelType::Float32,
            256 => PixelType::Int8,
            512 => PixelType::UInt16,
            768 => PixelType::UInt32,
            1024 => PixelType::Int64,
            1280 => PixelType::UInt64,
            _ => PixelType::Float64,
        }
    }

    /// Spacing from `pixdim`; orientation from the sform, else the qform,
    /// else identity. Orientations are converted from RAS to LPS.
    fn nifti_geometry(header: &NiftiHeader, ndim: usize) -> Geometry {
        let spacing: Vec<f64> = (1..=ndim.min(7))
            .map(|i| f64::from(header.pixdim[i]).abs())
            .map(|s| if s > 0.0 { s } else { 1.0 })
            .chain(std::iter::repeat(1.0))
            .take(ndim)
            .collect();

        let affine = if header.sform_code > 0 {
            let rows = [header.srow_x, header.srow_y, header.srow_z];
            let mut rotation = [[0.0; 3]; 3];
            for (i, row) in rows.iter().enumerate() {
                for j in 0..3 {
                    rotation[i][j] = f64::from(row[j]);
                }
            }
            // Strip the voxel scaling from each column
            for j in 0..3 {
                let norm = (0..3).map(|i| rotation[i][j].powi(2)).sum::<f64>().sqrt();
                if norm > 0.0 {
                    (0..3).for_each(|i| rotation[i][j] /= norm);
                }
            }
            let offset = rows.map(|row| f64::from(row[3]));
            Some((rotation, offset))
        } else if header.qform_code > 0 {
            let (b, c, d) = (
                f64::from(header.quatern_b),
                f64::from(header.quatern_c),
                f64::from(header.quatern_d),
            );
            let a = (1.0 - (b * b + c * c + d * d)).max(0.0).sqrt();
            let qfac = if header.pixdim[0] < 0.0 { -1.0 } else { 1.0 };
            let rotation = [
                [
                    a * a + b * b - c * c - d * d,
                    2.0 * (b * c - a * d),
                    qfac * 2.0 * (b * d + a * c),
                ],
                [
                    2.0 * (b * c + a * d),
                    a * a + c * c - b * b - d * d,
                    qfac * 2.0 * (c * d - a * b),
                ],
                [
                    2.0 * (b * d - a * c),
                    2.0 * (c * d + a * b),
                    qfac * (a * a + d * d - c * c - b * b),
                ],
            ];
            let offset = [
                f64::from(header.quatern_x),
                f64::from(header.quatern_y),
                f64::from(header.quatern_z),
            ];
            Some((rotation, offset))
        } else {
            None
        };

        let mut direction = identity_matrix(ndim);
        let mut origin = vec![0.0; ndim];
        if let Some((mut rotation, mut offset)) = affine {
            // RAS -> LPS
            for i in 0..2 {
                rotation[i].iter_mut().for_each(|v| *v = -*v);
                offset[i] = -offset[i];
            }
            let spatial = ndim.min(3);
            for i in 0..spatial {
                origin[i] = unsigned_zero(offset[i]);
                for j in 0..spatial {
                    direction[i * ndim + j] = unsigned_zero(rotation[i][j]);
                }
            }
        }

        Geometry {
            spacing,
            origin,
            direction,
        }
    }

    fn load_dicom(path: &Path) -> Result<Volume, VolumeLoaderError> {
        let object = open_file(path)?;
        let pixel_data = object
            .decode_pixel_data()
            .map_err(|err| VolumeLoaderError::PixelData(err.to_string()))?;
        let frames = pixel_data
            .to_ndarray_with_options::<f32>(&ConvertOptions::new())
            .map_err(|err| VolumeLoaderError::PixelData(err.to_string()))?;

        // [frame, row, column, sample] -> first sample of every pixel
        let data = frames.slice_move(s![.., .., .., 0]).mapv(f64::from).into_dyn();
        let geometry = Self::dicom_geometry(&object);
        Volume::with_geometry(data, geometry, Self::dicom_pixel_type(&object))
    }

    fn dicom_pixel_type(dicom_object: &FileDicomObject<InMemDicomObject>) -> PixelType {
        let int = |tag: Tag| {
            dicom_object
                .element(tag)
                .ok()
                .and_then(|element| element.to_int::<i32>().ok())
        };
        let rescaled = Self::dicom_floats(dicom_object, tags::RESCALE_SLOPE)
            .and_then(|v| v.first().copied())
            .is_some_and(|slope| slope != 1.0)
            || Self::dicom_floats(dicom_object, tags::RESCALE_INTERCEPT)
                .and_then(|v| v.first().copied())
                .is_some_and(|intercept| intercept.fract() != 0.0);
        if rescaled {
            return PixelType::Float64;
        }

        let signed = int(tags::PIXEL_REPRESENTATION) == Some(1);
        match (int(tags::BITS_ALLOCATED), signed) {
            (Some(8), false) => PixelType::UInt8,
            (Some(8), true) => PixelType::Int8,
            (Some(32), false) => PixelType::UInt32,
            (Some(32), true) => PixelType::Int32,
            (_, false) => PixelType::UInt16,
            (_, true) => PixelType::Int16,
        }
    }

    fn dicom_geometry(dicom_object: &FileDicomObject<InMemDicomObject>) -> Geometry {
        let pixel_spacing = Self::dicom_floats(dicom_object, tags::PIXEL_SPACING)
            .filter(|v| v.len() >= 2);
        let slice_spacing = Self::dicom_floats(dicom_object, tags::SPACING_BETWEEN_SLICES)
            .or_else(|| Self::dicom_floats(dicom_object, tags::SLICE_THICKNESS))
            .and_then(|v| v.first().copied())
            .filter(|s| *s > 0.0)
            .unwrap_or(1.0);
        // Pixel Spacing is (row spacing, column spacing)
        let spacing = match pixel_spacing {
            Some(ps) => vec![ps[1], ps[0], slice_spacing],
            None => vec![1.0, 1.0, slice_spacing],
        };

        let origin = Self::dicom_floats(dicom_object, tags::IMAGE_POSITION_PATIENT)
            .filter(|v| v.len() == 3)
            .unwrap_or_else(|| vec![0.0; 3]);

        let direction = Self::dicom_floats(dicom_object, tags::IMAGE_ORIENTATION_PATIENT)
            .filter(|v| v.len() == 6)
            .map(|iop| {
                let row = [iop[0], iop[1], iop[2]];
                let column = [iop[3], iop[4], iop[5]];
                let normal = [
                    row[1] * column[2] - row[2] * column[1],
                    row[2] * column[0] - row[0] * column[2],
                    row[0] * column[1] - row[1] * column[0],
                ];
                (0..3).flat_map(|i| [row[i], column[i], normal[i]]).collect()
            })
            .unwrap_or_else(|| identity_matrix(3));

        Geometry {
            spacing,
            origin,
            direction,
        }
    }

    fn dicom_floats(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        tag: Tag,
    ) -> Option<Vec<f64>> {
        dicom_object.element(tag).ok()?.to_multi_float64().ok()
    }

    fn load_raster(path: &Path) -> Result<Volume, VolumeLoaderError> {
        let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
        let (width, height) = (image.width() as usize, image.height() as usize);

        let (samples, pixel_type): (Vec<f64>, PixelType) = match image.color() {
            ColorType::L16 | ColorType::La16 | ColorType::Rgb16 | ColorType::Rgba16 => (
                image.to_luma16().into_raw().into_iter().map(f64::from).collect(),
                PixelType::UInt16,
            ),
            ColorType::Rgb32F | ColorType::Rgba32F => (
                image.to_luma32f().into_raw().into_iter().map(f64::from).collect(),
                PixelType::Float32,
            ),
            _ => (
                image.to_luma8().into_raw().into_iter().map(f64::from).collect(),
                PixelType::UInt8,
            ),
        };

        let data = ArrayD::from_shape_vec(IxDyn(&[height, width]), samples)?;
        Ok(Volume::new(data, pixel_type))
    }
}

/// Negated and `qfac`-scaled zeros come out as `-0.0`; payloads carry `0.0`.
fn unsigned_zero(value: f64) -> f64 {
    if value == 0.0 { 0.0 } else { value }
}
