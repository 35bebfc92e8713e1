//! An [`ItemStore`] backed by a directory tree: every subdirectory of the
//! root is an item and its regular files are the item's files.

use crate::item::{FileRef, ItemStore, SegmentationInfo, StoreError};

use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Read, Write},
    path::PathBuf,
};
use tracing::debug;

/// Name of the file holding an item's segmentation metadata.
pub const METADATA_FILE: &str = ".segmentation.json";

#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn item_dir(&self, item_id: &str) -> Result<PathBuf, StoreError> {
        Self::validate_component(item_id)?;
        let dir = self.root.join(item_id);
        if !dir.is_dir() {
            return Err(StoreError::ItemNotFound(item_id.to_string()));
        }
        Ok(dir)
    }

    // Ids must not escape the root
    fn validate_component(id: &str) -> Result<(), StoreError> {
        let invalid = id.is_empty() || id == "." || id == ".." || id.contains(['/', '\\']);
        if invalid {
            return Err(StoreError::InvalidIdentifier(id.to_string()));
        }
        Ok(())
    }
}

impl ItemStore for DirectoryStore {
    fn item_name(&self, item_id: &str) -> Result<String, StoreError> {
        self.item_dir(item_id)?;
        Ok(item_id.to_string())
    }

    fn files(&self, item_id: &str) -> Result<Vec<FileRef>, StoreError> {
        let dir = self.item_dir(item_id)?;
        let mut names: Vec<String> = fs::read_dir(dir)?
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_ok_and(|kind| kind.is_file()))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name != METADATA_FILE)
            .collect();
        names.sort();
        Ok(names.into_iter().map(|name| FileRef::new(name.clone(), name)).collect())
    }

    fn open_file(&self, item_id: &str, file: &FileRef) -> Result<Box<dyn Read + '_>, StoreError> {
        Self::validate_component(&file.id)?;
        let path = self.item_dir(item_id)?.join(&file.id);
        Ok(Box::new(BufReader::new(File::open(path)?)))
    }

    fn load_segmentation(&self, item_id: &str) -> Result<Option<SegmentationInfo>, StoreError> {
        let path = self.item_dir(item_id)?.join(METADATA_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        let info = serde_json::from_reader(BufReader::new(File::open(path)?))?;
        Ok(Some(info))
    }

    fn save_segmentation(
        &mut self,
        item_id: &str,
        info: &SegmentationInfo,
    ) -> Result<(), StoreError> {
        let dir = self.item_dir(item_id)?;
        // Write next to the target and rename so readers never see a partial file
        let staged = tempfile::NamedTempFile::new_in(&dir)?;
        let mut writer = BufWriter::new(staged);
        serde_json::to_writer_pretty(&mut writer, info)?;
        writer.flush()?;
        let staged = writer.into_inner().map_err(|err| err.into_error())?;
        staged
            .persist(dir.join(METADATA_FILE))
            .map_err(|err| err.error)?;
        debug!(item_id, images = info.images.len(), "saved segmentation metadata");
        Ok(())
    }
}
