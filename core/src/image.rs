//! Byte-addressable backing file.
//!
//! Every method opens the image, seeks, performs one read or write, and lets
//! `File` close on drop — there is no cached handle, matching the teacher's
//! `mkfs` tool's `wsect`/`rsect` style of per-call positional I/O.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::codec::{BLOCK_SIZE, DESC_SIZE, HARDLINK_LEN, SUPERBLOCK_SIZE};
use crate::error::Result;

/// The fixed geometry of a formatted image, read once from the superblock.
#[derive(Debug, Clone, Copy)]
pub struct Layout {
    pub desc_number: usize,
    pub blocks_number: usize,
    pub block_size: usize,
}

impl Layout {
    pub fn hardlink_table_bytes(&self) -> usize {
        HARDLINK_LEN * self.desc_number
    }

    pub fn descriptor_table_bytes(&self) -> usize {
        DESC_SIZE * self.desc_number
    }

    pub fn hardlink_offset(&self, index: usize) -> u64 {
        (SUPERBLOCK_SIZE + HARDLINK_LEN * index) as u64
    }

    pub fn descriptor_offset(&self, index: usize) -> u64 {
        (SUPERBLOCK_SIZE + self.hardlink_table_bytes() + DESC_SIZE * index) as u64
    }

    pub fn bitmap_offset(&self, index: usize) -> u64 {
        (SUPERBLOCK_SIZE + self.hardlink_table_bytes() + self.descriptor_table_bytes() + index)
            as u64
    }

    pub fn block_offset(&self, index: usize) -> u64 {
        self.bitmap_offset(self.blocks_number) + (self.block_size * index) as u64
    }

    pub fn total_bytes(&self) -> u64 {
        self.block_offset(self.blocks_number)
    }

    /// `BLOCKS_NUMBER = floor((file_size - SUPERBLOCK_SIZE - HARDLINKS_SIZE - DESC_SIZE*DESC_NUMBER) / (BLOCK_SIZE + 1))`
    pub fn blocks_for_size(desc_number: usize, file_size: u64) -> usize {
        let fixed = SUPERBLOCK_SIZE + HARDLINK_LEN * desc_number + DESC_SIZE * desc_number;
        let remaining = file_size.saturating_sub(fixed as u64);
        (remaining / (BLOCK_SIZE as u64 + 1)) as usize
    }
}

pub struct Image {
    path: PathBuf,
    pub layout: Layout,
}

impl Image {
    pub fn new(path: impl Into<PathBuf>, layout: Layout) -> Self {
        Image {
            path: path.into(),
            layout,
        }
    }

    /// Creates a zero-filled file of exactly `size` bytes at `path`.
    pub fn create_sized(path: impl AsRef<Path>, size: u64) -> Result<()> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.as_ref())?;
        file.set_len(size)?;
        Ok(())
    }

    fn open_rw(&self) -> Result<File> {
        Ok(OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)?)
    }

    pub fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut file = self.open_rw()?;
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub fn write_at(&self, offset: u64, data: &[u8]) -> Result<()> {
        let mut file = self.open_rw()?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        Ok(())
    }
}
