use std::fmt;

use serde::Serialize;

/// Sample type of the file a volume was decoded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelType {
    UInt8,
    Int8,
    UInt16,
    Int16,
    UInt32,
    Int32,
    UInt64,
    Int64,
    Float32,
    #[default]
    Float64,
}

impl PixelType {
    /// Whether samples of this type are serialized as JSON integers.
    pub fn is_integral(self) -> bool {
        !matches!(self, PixelType::Float32 | PixelType::Float64)
    }
}

/// File formats the volume loader understands, picked from the filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Nifti,
    Dicom,
    Raster,
}

impl ImageFormat {
    pub fn from_filename(filename: &str) -> Option<Self> {
        let lower = filename.to_ascii_lowercase();
        if lower.ends_with(".nii") || lower.ends_with(".nii.gz") {
            return Some(ImageFormat::Nifti);
        }
        let extension = lower.rsplit_once('.').map(|(_, ext)| ext)?;
        match extension {
            "dcm" | "dicom" => Some(ImageFormat::Dicom),
            "png" | "jpg" | "jpeg" | "bmp" | "tif" | "tiff" | "gif" => Some(ImageFormat::Raster),
            _ => None,
        }
    }

    /// Suffix for the spooled temporary file, keeping `.nii.gz` intact.
    pub(crate) fn temp_suffix(filename: &str) -> String {
        let lower = filename.to_ascii_lowercase();
        if lower.ends_with(".nii.gz") {
            return ".nii.gz".to_string();
        }
        lower
            .rsplit_once('.')
            .map(|(_, ext)| format!(".{ext}"))
            .unwrap_or_default()
    }
}

/// Tag distinguishing derived payloads from a plain base image payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    SegmentationOverlay,
    Difference,
}

/// Which input of a request a volume or error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeRole {
    BaseImage,
    Segmentation,
    FirstDifferenceInput,
    SecondDifferenceInput,
}

impl fmt::Display for VolumeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VolumeRole::BaseImage => "base image",
            VolumeRole::Segmentation => "segmentation",
            VolumeRole::FirstDifferenceInput => "first difference input",
            VolumeRole::SecondDifferenceInput => "second difference input",
        };
        f.write_str(name)
    }
}
