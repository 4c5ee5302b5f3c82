//! Fixed-capacity descriptor table: type, link count, size, block count and
//! (for regular files) the block map.

use crate::codec::{
    decode_block_index, decode_int, encode_int, encode_text, BLOCKS_MAP_SIZE, DESC_SIZE, MAX_R,
    TAG_DIR, TAG_FREE, TAG_REGULAR, TAG_SYMLINK,
};
use crate::error::{FsError, Result};
use crate::image::Image;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tag {
    Free,
    Dir,
    Regular,
    Symlink,
}

impl Tag {
    fn to_byte(self) -> u8 {
        match self {
            Tag::Free => TAG_FREE,
            Tag::Dir => TAG_DIR,
            Tag::Regular => TAG_REGULAR,
            Tag::Symlink => TAG_SYMLINK,
        }
    }

    fn from_byte(byte: u8) -> Tag {
        match byte {
            TAG_DIR => Tag::Dir,
            TAG_REGULAR => Tag::Regular,
            TAG_SYMLINK => Tag::Symlink,
            _ => Tag::Free,
        }
    }
}

/// One descriptor-table slot. `blocks` is the flattened block list: direct
/// entries at `0..BLOCKS_MAP_SIZE-1`, the indirect pointer (if present) at
/// `BLOCKS_MAP_SIZE-1`, and the blocks it points to appended after that.
#[derive(Clone, Debug)]
pub struct Descriptor {
    pub tag: Tag,
    pub nlink: u32,
    pub size: u32,
    pub blocks: Vec<u32>,
    /// Set by `unlink` when the descriptor is still open; `close` checks it.
    pub to_delete: bool,
    /// The `nblock` field as read from disk, before the indirect block (if
    /// any) has been hydrated into `blocks`. Only meaningful between
    /// `DescriptorTable::read` and `FileStore::hydrate_indirect`.
    raw_nblock: u32,
}

impl Descriptor {
    fn free() -> Self {
        Descriptor {
            tag: Tag::Free,
            nlink: 0,
            size: 0,
            blocks: Vec::new(),
            to_delete: false,
            raw_nblock: 0,
        }
    }

    pub fn nblock(&self) -> u32 {
        self.blocks.len() as u32
    }

    pub fn nblock_on_disk_hint(&self) -> u32 {
        self.raw_nblock
    }

    pub fn has_indirect(&self) -> bool {
        self.blocks.len() > BLOCKS_MAP_SIZE - 1
    }

    pub fn is_free(&self) -> bool {
        self.tag == Tag::Free
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(DESC_SIZE);
        out.push(self.tag.to_byte());
        out.extend(encode_int(self.nlink as i64, MAX_R));
        out.extend(encode_int(self.size as i64, MAX_R));
        out.extend(encode_int(self.nblock() as i64, MAX_R));
        for i in 0..BLOCKS_MAP_SIZE {
            match self.blocks.get(i) {
                Some(&b) => out.extend(encode_int(b as i64, MAX_R)),
                None => out.extend(encode_text("", MAX_R)),
            }
        }
        out
    }

    fn decode(bytes: &[u8]) -> Self {
        let tag = Tag::from_byte(bytes[0]);
        let mut pos = 1;
        let nlink = decode_int(&bytes[pos..pos + MAX_R]).unwrap_or(0) as u32;
        pos += MAX_R;
        let size = decode_int(&bytes[pos..pos + MAX_R]).unwrap_or(0) as u32;
        pos += MAX_R;
        let nblock = decode_int(&bytes[pos..pos + MAX_R]).unwrap_or(0) as usize;
        pos += MAX_R;
        let mut direct = Vec::new();
        for _ in 0..BLOCKS_MAP_SIZE {
            if let Some(b) = decode_block_index(&bytes[pos..pos + MAX_R]) {
                direct.push(b);
            }
            pos += MAX_R;
        }
        direct.truncate(nblock.min(BLOCKS_MAP_SIZE));
        Descriptor {
            tag,
            nlink,
            size,
            blocks: direct,
            to_delete: false,
            raw_nblock: nblock as u32,
        }
    }
}

pub struct DescriptorTable {
    descriptors: Vec<Descriptor>,
}

impl DescriptorTable {
    /// Fresh table: index 0 is the root directory, everything else free.
    pub fn format(desc_number: usize) -> Self {
        let mut descriptors = vec![Descriptor::free(); desc_number];
        descriptors[0] = Descriptor {
            tag: Tag::Dir,
            nlink: 1,
            size: 0,
            blocks: Vec::new(),
            to_delete: false,
            raw_nblock: 0,
        };
        DescriptorTable { descriptors }
    }

    pub fn read(image: &Image) -> Result<Self> {
        let mut descriptors = Vec::with_capacity(image.layout.desc_number);
        for i in 0..image.layout.desc_number {
            let bytes = image.read_at(image.layout.descriptor_offset(i), DESC_SIZE)?;
            descriptors.push(Descriptor::decode(&bytes));
        }
        Ok(DescriptorTable { descriptors })
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn get(&self, index: usize) -> Result<&Descriptor> {
        self.descriptors
            .get(index)
            .ok_or(FsError::BadHandle(index))
    }

    pub fn get_mut(&mut self, index: usize) -> Result<&mut Descriptor> {
        self.descriptors
            .get_mut(index)
            .ok_or(FsError::BadHandle(index))
    }

    /// Smallest free index, excluding the root at 0.
    pub fn find_free(&self) -> Option<usize> {
        self.descriptors
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, d)| d.is_free())
            .map(|(i, _)| i)
    }

    pub fn write(&self, image: &Image, index: usize) -> Result<()> {
        let descriptor = self.get(index)?;
        image.write_at(image.layout.descriptor_offset(index), &descriptor.encode())
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Descriptor)> {
        self.descriptors.iter().enumerate()
    }
}
