//! Fixed array of data blocks, allocated first-fit against a parallel bitmap.

use crate::error::{FsError, Result};
use crate::image::Image;

/// One ASCII byte per block: `'1'` allocated, `'0'` free.
pub struct BlockPool {
    bitmap: Vec<u8>,
}

impl BlockPool {
    pub fn new(blocks_number: usize) -> Self {
        BlockPool {
            bitmap: vec![b'0'; blocks_number],
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        BlockPool { bitmap: bytes }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bitmap
    }

    pub fn len(&self) -> usize {
        self.bitmap.len()
    }

    pub fn is_allocated(&self, index: usize) -> bool {
        self.bitmap[index] == b'1'
    }

    /// Lowest free index, persisted immediately. `None` if the pool is full.
    pub fn alloc(&mut self, image: &Image) -> Result<u32> {
        let index = self
            .bitmap
            .iter()
            .position(|&b| b == b'0')
            .ok_or(FsError::NoFreeBlocks)?;
        self.bitmap[index] = b'1';
        image.write_at(image.layout.bitmap_offset(index), &[b'1'])?;
        Ok(index as u32)
    }

    pub fn free(&mut self, image: &Image, index: u32) -> Result<()> {
        let index = index as usize;
        self.bitmap[index] = b'0';
        image.write_at(image.layout.bitmap_offset(index), &[b'0'])?;
        Ok(())
    }
}
