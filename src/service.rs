//! Segmentation metadata bookkeeping and payload requests for items.
//!
//! File lifecycle notifications from the host platform are explicit calls
//! here: [`SegmentationService::attach_if_decodable`] when a file has been
//! committed to an item and [`SegmentationService::detach_file`] when a file
//! has been removed.

use crate::{
    enums::VolumeRole,
    error::SegmentationError,
    item::{FileRef, Item, ItemStore, SegmentationInfo},
    payload::{Payload, build_base_payload, build_diff_payload, build_overlay_payload},
    volume::Volume,
    volume_loader::VolumeLoader,
};

use tracing::{info, warn};

pub struct SegmentationService<S> {
    store: S,
}

impl<S: ItemStore> SegmentationService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn item(&self, item_id: &str) -> Result<Item, SegmentationError> {
        Ok(Item {
            id: item_id.to_string(),
            name: self.store.item_name(item_id)?,
            segmentation: self.store.load_segmentation(item_id)?,
        })
    }

    /// Make `file_id` the base image of the item.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentationError::MissingReference`] if the file is not
    /// part of the item and [`SegmentationError::Decode`] if it is not an
    /// image.
    pub fn set_base_image(
        &mut self,
        item_id: &str,
        file_id: &str,
    ) -> Result<SegmentationInfo, SegmentationError> {
        let file = self.require_file(item_id, file_id, VolumeRole::BaseImage)?;
        self.decode(item_id, &file, VolumeRole::BaseImage)?;

        let mut segmentation = self.segmentation(item_id)?;
        segmentation.base_image = Some(file.clone());
        self.store.save_segmentation(item_id, &segmentation)?;
        info!(item_id, file = %file.name, "base image set");
        Ok(segmentation)
    }

    pub fn clear_base_image(
        &mut self,
        item_id: &str,
    ) -> Result<SegmentationInfo, SegmentationError> {
        let mut segmentation = self.segmentation(item_id)?;
        if segmentation.base_image.take().is_some() {
            self.store.save_segmentation(item_id, &segmentation)?;
            info!(item_id, "base image cleared");
        }
        Ok(segmentation)
    }

    /// Rebuild the list of viewable images from the item's files. A base
    /// image whose file is gone is dropped.
    pub fn detect_images(&mut self, item_id: &str) -> Result<SegmentationInfo, SegmentationError> {
        let files = self.store.files(item_id)?;
        let mut images = Vec::new();
        for file in &files {
            if self.is_decodable(item_id, file)? {
                images.push(file.clone());
            } else {
                warn!(item_id, file = %file.name, "skipping file that is not a readable image");
            }
        }

        let mut segmentation = self.segmentation(item_id)?;
        segmentation.images = images;
        let base_removed = segmentation
            .base_image
            .as_ref()
            .is_some_and(|base| !files.iter().any(|file| file.id == base.id));
        if base_removed {
            segmentation.base_image = None;
        }
        self.store.save_segmentation(item_id, &segmentation)?;
        info!(item_id, images = segmentation.images.len(), "images detected");
        Ok(segmentation)
    }

    /// Record a newly committed file as an image if it decodes. Returns
    /// whether the metadata changed.
    pub fn attach_if_decodable(
        &mut self,
        item_id: &str,
        file_id: &str,
    ) -> Result<bool, SegmentationError> {
        let file = self.require_file(item_id, file_id, VolumeRole::Segmentation)?;
        let mut segmentation = self.segmentation(item_id)?;
        if segmentation.contains_image(&file.id) || !self.is_decodable(item_id, &file)? {
            return Ok(false);
        }

        info!(item_id, file = %file.name, "image attached");
        segmentation.images.push(file);
        self.store.save_segmentation(item_id, &segmentation)?;
        Ok(true)
    }

    /// Forget a removed file. Returns whether the metadata changed.
    pub fn detach_file(&mut self, item_id: &str, file_id: &str) -> Result<bool, SegmentationError> {
        let Some(mut segmentation) = self.store.load_segmentation(item_id)? else {
            return Ok(false);
        };

        let before = segmentation.images.len();
        segmentation.images.retain(|image| image.id != file_id);
        let mut changed = segmentation.images.len() != before;
        if segmentation.base_image.as_ref().is_some_and(|base| base.id == file_id) {
            segmentation.base_image = None;
            changed = true;
        }

        if changed {
            self.store.save_segmentation(item_id, &segmentation)?;
            info!(item_id, file_id, "file detached");
        }
        Ok(changed)
    }

    pub fn base_image_payload(&self, item_id: &str) -> Result<Payload, SegmentationError> {
        let base = self.base_image(item_id)?;
        Ok(build_base_payload(base))
    }

    /// Segmentation `seg_file_id` placed on the item's base image.
    pub fn segmentation_payload(
        &self,
        item_id: &str,
        seg_file_id: &str,
    ) -> Result<Payload, SegmentationError> {
        let base = self.base_image(item_id)?;
        let file = self.require_file(item_id, seg_file_id, VolumeRole::Segmentation)?;
        let segmentation = self.decode(item_id, &file, VolumeRole::Segmentation)?;
        build_overlay_payload(&base, segmentation)
    }

    pub fn difference_payload(
        &self,
        item_id: &str,
        first_file_id: &str,
        second_file_id: &str,
    ) -> Result<Payload, SegmentationError> {
        let first = self.require_file(item_id, first_file_id, VolumeRole::FirstDifferenceInput)?;
        let second = self.require_file(item_id, second_file_id, VolumeRole::SecondDifferenceInput)?;
        let first = self.decode(item_id, &first, VolumeRole::FirstDifferenceInput)?;
        let second = self.decode(item_id, &second, VolumeRole::SecondDifferenceInput)?;
        build_diff_payload(&first, &second)
    }

    fn segmentation(&self, item_id: &str) -> Result<SegmentationInfo, SegmentationError> {
        Ok(self.store.load_segmentation(item_id)?.unwrap_or_default())
    }

    fn base_image(&self, item_id: &str) -> Result<Volume, SegmentationError> {
        let base = self
            .store
            .load_segmentation(item_id)?
            .and_then(|segmentation| segmentation.base_image)
            .ok_or_else(|| SegmentationError::MissingReference {
                role: VolumeRole::BaseImage,
                detail: format!("item '{item_id}' has no base image"),
            })?;
        let file = self.require_file(item_id, &base.id, VolumeRole::BaseImage)?;
        self.decode(item_id, &file, VolumeRole::BaseImage)
    }

    fn require_file(
        &self,
        item_id: &str,
        file_id: &str,
        role: VolumeRole,
    ) -> Result<FileRef, SegmentationError> {
        self.store
            .find_file(item_id, file_id)?
            .ok_or_else(|| SegmentationError::MissingReference {
                role,
                detail: format!("file '{file_id}' is not part of item '{item_id}'"),
            })
    }

    fn decode(
        &self,
        item_id: &str,
        file: &FileRef,
        role: VolumeRole,
    ) -> Result<Volume, SegmentationError> {
        let reader = self.store.open_file(item_id, file)?;
        VolumeLoader::decode(reader, &file.name).map_err(|source| SegmentationError::Decode {
            role,
            file: file.name.clone(),
            source,
        })
    }

    fn is_decodable(&self, item_id: &str, file: &FileRef) -> Result<bool, SegmentationError> {
        let reader = self.store.open_file(item_id, file)?;
        Ok(VolumeLoader::is_decodable(reader, &file.name))
    }
}
