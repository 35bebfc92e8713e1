//! Item metadata and the storage seam of the host platform.

use serde::{Deserialize, Serialize};
use std::io::Read;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Item '{0}' not found")]
    ItemNotFound(String),

    #[error("Invalid identifier '{0}'")]
    InvalidIdentifier(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Metadata error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Reference to a file inside an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
}

impl FileRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Segmentation metadata attached to an item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentationInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_image: Option<FileRef>,
    #[serde(default)]
    pub images: Vec<FileRef>,
}

impl SegmentationInfo {
    pub fn contains_image(&self, file_id: &str) -> bool {
        self.images.iter().any(|image| image.id == file_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Item {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segmentation: Option<SegmentationInfo>,
}

/// The parts of the host platform's storage the segmentation service needs.
pub trait ItemStore {
    fn item_name(&self, item_id: &str) -> Result<String, StoreError>;

    /// Files of the item in a stable order.
    fn files(&self, item_id: &str) -> Result<Vec<FileRef>, StoreError>;

    fn open_file(&self, item_id: &str, file: &FileRef) -> Result<Box<dyn Read + '_>, StoreError>;

    fn load_segmentation(&self, item_id: &str) -> Result<Option<SegmentationInfo>, StoreError>;

    fn save_segmentation(
        &mut self,
        item_id: &str,
        info: &SegmentationInfo,
    ) -> Result<(), StoreError>;

    fn find_file(&self, item_id: &str, file_id: &str) -> Result<Option<FileRef>, StoreError> {
        Ok(self
            .files(item_id)?
            .into_iter()
            .find(|file| file.id == file_id))
    }
}
