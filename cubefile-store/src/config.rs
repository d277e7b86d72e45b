use crate::{
    disk::{BUCKET_HEADER_BYTES, SLOT_BYTES},
    layout::LayoutOrder,
    store::VolumeId,
};
use cubefile_base::{err, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: usize = 8192;
pub const DEFAULT_MIN_FILL_RATIO: f64 = 0.5;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub page_size: usize,
    // Chunks and subtrees costing less than this share of the bucket body
    // are packed together; larger ones get a bucket of their own.
    pub min_fill_ratio: f64,
    pub volume: VolumeId,
    pub layout_order: LayoutOrder,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            page_size: DEFAULT_PAGE_SIZE,
            min_fill_ratio: DEFAULT_MIN_FILL_RATIO,
            volume: VolumeId(1),
            layout_order: LayoutOrder::default(),
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Result<()> {
        if self.page_size <= BUCKET_HEADER_BYTES + SLOT_BYTES {
            return Err(err(format!(
                "page size {} cannot hold a bucket header",
                self.page_size
            )));
        }
        if self.page_size > u16::MAX as usize {
            return Err(err(format!(
                "page size {} exceeds what 16-bit offsets address",
                self.page_size
            )));
        }
        if !(self.min_fill_ratio > 0.0 && self.min_fill_ratio <= 1.0) {
            return Err(err(format!(
                "fill ratio {} outside (0, 1]",
                self.min_fill_ratio
            )));
        }
        Ok(())
    }

    // Bytes available to slots and chunk images.
    pub fn body_capacity(&self) -> usize {
        self.page_size.saturating_sub(BUCKET_HEADER_BYTES)
    }

    pub fn cluster_threshold(&self) -> usize {
        (self.body_capacity() as f64 * self.min_fill_ratio).floor() as usize
    }
}
