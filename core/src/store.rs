//! Orchestrates create/link/unlink, positional read/write, truncate, and the
//! block-map/indirection bookkeeping that keeps descriptors and bytes in sync.

use crate::block::BlockPool;
use crate::codec::{encode_int, encode_text, BLOCK_SIZE, BLOCKS_MAP_SIZE, INDIRECT_ENTRIES, MAX_R};
use crate::descriptor::{DescriptorTable, Tag};
use crate::error::{FsError, Result};
use crate::hardlink::HardlinkTable;
use crate::image::Image;

/// The single root directory's in-memory mapping, in insertion order so the
/// hard-link table can be rewritten deterministically (section 4.5).
pub struct Directory {
    pub entries: Vec<(String, usize)>,
}

impl Directory {
    pub fn empty() -> Self {
        Directory {
            entries: Vec::new(),
        }
    }

    /// `.` and `..` both point at the root descriptor.
    pub fn format() -> Self {
        Directory {
            entries: vec![(".".to_string(), 0), ("..".to_string(), 0)],
        }
    }

    pub fn lookup(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, i)| *i)
    }

    pub fn insert(&mut self, name: String, index: usize) {
        self.entries.push((name, index));
    }

    pub fn remove(&mut self, name: &str) -> Option<usize> {
        let pos = self.entries.iter().position(|(n, _)| n == name)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn names(&self) -> impl Iterator<Item = &(String, usize)> {
        self.entries.iter()
    }
}

fn logical_to_storage(file_block: usize) -> usize {
    if file_block < BLOCKS_MAP_SIZE - 1 {
        file_block
    } else {
        file_block + 1
    }
}

/// Borrows the pieces of a mounted filesystem `FileStore` operations need.
pub struct FileStore<'a> {
    pub image: &'a Image,
    pub descriptors: &'a mut DescriptorTable,
    pub blocks: &'a mut BlockPool,
    pub dir: &'a mut Directory,
}

impl<'a> FileStore<'a> {
    fn check_new_name(&self, name: &str) -> Result<()> {
        if name.len() > MAX_R {
            return Err(FsError::NameTooLong(name.to_string()));
        }
        if self.dir.lookup(name).is_some() {
            return Err(FsError::AlreadyExists(name.to_string()));
        }
        if self.dir.entries.len() >= self.descriptors.len() {
            return Err(FsError::HardlinkTableFull);
        }
        Ok(())
    }

    pub fn create(&mut self, name: &str) -> Result<usize> {
        self.check_new_name(name)?;
        let index = self
            .descriptors
            .find_free()
            .ok_or(FsError::DescriptorTableFull)?;
        {
            let d = self.descriptors.get_mut(index)?;
            d.tag = Tag::Regular;
            d.nlink = 1;
            d.size = 0;
            d.blocks.clear();
            d.to_delete = false;
        }
        self.descriptors.write(self.image, index)?;
        self.dir.insert(name.to_string(), index);
        HardlinkTable::rewrite(self.image, self.dir)?;
        Ok(index)
    }

    /// `target` is clamped to `BLOCK_SIZE` bytes; the pedagogical image has
    /// no room to chunk a symlink target across multiple blocks.
    pub fn symlink(&mut self, name: &str, target: &str) -> Result<usize> {
        self.check_new_name(name)?;
        let index = self
            .descriptors
            .find_free()
            .ok_or(FsError::DescriptorTableFull)?;
        let clamped = &target.as_bytes()[..target.len().min(BLOCK_SIZE)];
        let block = self.blocks.alloc(self.image)?;
        let mut content = vec![b' '; BLOCK_SIZE];
        content[..clamped.len()].copy_from_slice(clamped);
        self.image
            .write_at(self.image.layout.block_offset(block as usize), &content)?;
        {
            let d = self.descriptors.get_mut(index)?;
            d.tag = Tag::Symlink;
            d.nlink = 1;
            d.size = clamped.len() as u32;
            d.blocks = vec![block];
            d.to_delete = false;
        }
        self.descriptors.write(self.image, index)?;
        self.dir.insert(name.to_string(), index);
        HardlinkTable::rewrite(self.image, self.dir)?;
        Ok(index)
    }

    pub fn read_symlink_target(&self, index: usize) -> Result<String> {
        let d = self.descriptors.get(index)?;
        let block = *d.blocks.first().ok_or(FsError::BadOffset)?;
        let bytes = self
            .image
            .read_at(self.image.layout.block_offset(block as usize), BLOCK_SIZE)?;
        Ok(String::from_utf8_lossy(&bytes).trim().to_string())
    }

    pub fn link(&mut self, name: &str, dest: usize) -> Result<()> {
        self.check_new_name(name)?;
        {
            let d = self.descriptors.get_mut(dest)?;
            if d.is_free() {
                return Err(FsError::NoSuchPath(dest.to_string()));
            }
            d.nlink += 1;
        }
        self.dir.insert(name.to_string(), dest);
        HardlinkTable::rewrite(self.image, self.dir)?;
        self.descriptors.write(self.image, dest)?;
        Ok(())
    }

    /// `opened` defers the actual freeing to `close` (section 4.6/4.9).
    pub fn unlink(&mut self, name: &str, opened: bool) -> Result<()> {
        let index = self
            .dir
            .lookup(name)
            .ok_or_else(|| FsError::NoSuchPath(name.to_string()))?;
        self.dir.remove(name);
        HardlinkTable::rewrite(self.image, self.dir)?;
        let nlink = {
            let d = self.descriptors.get_mut(index)?;
            d.nlink = d.nlink.saturating_sub(1);
            d.nlink
        };
        if nlink == 0 {
            if opened {
                self.descriptors.get_mut(index)?.to_delete = true;
                self.descriptors.write(self.image, index)?;
            } else {
                self.free_descriptor(index)?;
            }
        } else {
            self.descriptors.write(self.image, index)?;
        }
        Ok(())
    }

    pub fn free_descriptor(&mut self, index: usize) -> Result<()> {
        let blocks = self.descriptors.get(index)?.blocks.clone();
        for block in blocks {
            self.blocks.free(self.image, block)?;
        }
        let d = self.descriptors.get_mut(index)?;
        d.tag = Tag::Free;
        d.nlink = 0;
        d.size = 0;
        d.blocks.clear();
        d.to_delete = false;
        self.descriptors.write(self.image, index)
    }

    pub fn read(&self, index: usize, size: usize, offset: usize) -> Result<Vec<u8>> {
        let d = self.descriptors.get(index)?;
        if offset >= d.size as usize {
            return Err(FsError::BadOffset);
        }
        let start_block = logical_to_storage(offset / BLOCK_SIZE);
        if start_block >= d.blocks.len() {
            return Err(FsError::BadOffset);
        }
        let size = size.min(d.size as usize);
        let mut remaining = size;
        let mut out = Vec::with_capacity(size);

        let first_len = (BLOCK_SIZE - offset % BLOCK_SIZE).min(remaining);
        let block = d.blocks[start_block];
        let first_offset =
            self.image.layout.block_offset(block as usize) + (offset % BLOCK_SIZE) as u64;
        out.extend(self.image.read_at(first_offset, first_len)?);
        remaining -= first_len;

        let mut logical = offset / BLOCK_SIZE + 1;
        while remaining > 0 {
            let bi = logical_to_storage(logical);
            if bi >= d.blocks.len() {
                break;
            }
            let block = d.blocks[bi];
            let chunk_len = remaining.min(BLOCK_SIZE);
            out.extend(
                self.image
                    .read_at(self.image.layout.block_offset(block as usize), chunk_len)?,
            );
            remaining -= chunk_len;
            logical += 1;
        }

        let text = String::from_utf8_lossy(&out).trim().to_string();
        Ok(text.into_bytes())
    }

    /// Single-block-aligned write; extends the block map if needed. Callers
    /// chunk larger writes with [`FileStore::write_chunks`].
    pub fn write(&mut self, index: usize, offset: usize, text: &[u8]) -> Result<()> {
        let block_index = logical_to_storage(offset / BLOCK_SIZE);
        if block_index >= self.descriptors.get(index)?.blocks.len() {
            self.write_to_new_block(index)?;
        }
        let block = self.descriptors.get(index)?.blocks[block_index];
        let start = self.image.layout.block_offset(block as usize) + (offset % BLOCK_SIZE) as u64;
        self.image.write_at(start, text)
    }

    /// Splits `text` into block-aligned chunks the way the open-file table's
    /// `write` command does (section 4.8) and writes each one. Returns the
    /// advanced offset — the final chunk advances by its unpadded length.
    pub fn write_chunks(&mut self, index: usize, offset: usize, text: &[u8]) -> Result<usize> {
        let first_room = BLOCK_SIZE - offset % BLOCK_SIZE;
        let first_len = first_room.min(text.len());
        let mut chunks: Vec<Vec<u8>> = vec![text[..first_len].to_vec()];
        let mut rest = &text[first_len..];
        while !rest.is_empty() {
            let n = rest.len().min(BLOCK_SIZE);
            chunks.push(rest[..n].to_vec());
            rest = &rest[n..];
        }
        let last = chunks.len() - 1;
        let last_unpadded_len = chunks[last].len();
        if chunks[last].len() < BLOCK_SIZE {
            chunks[last].resize(BLOCK_SIZE, b' ');
        }
        let mut pos = offset;
        for (i, chunk) in chunks.iter().enumerate() {
            self.write(index, pos, chunk)?;
            pos += if i == last { last_unpadded_len } else { chunk.len() };
        }
        Ok(pos)
    }

    fn write_to_new_block(&mut self, index: usize) -> Result<()> {
        let cur_len = self.descriptors.get(index)?.blocks.len();
        if cur_len == BLOCKS_MAP_SIZE + INDIRECT_ENTRIES {
            return Err(FsError::MaxFileSize);
        }
        if cur_len + 1 == BLOCKS_MAP_SIZE {
            let pointer = self.blocks.alloc(self.image)?;
            let data = match self.blocks.alloc(self.image) {
                Ok(b) => b,
                Err(e) => {
                    let _ = self.blocks.free(self.image, pointer);
                    return Err(e);
                }
            };
            let d = self.descriptors.get_mut(index)?;
            d.blocks.push(pointer);
            d.blocks.push(data);
        } else {
            let b = self.blocks.alloc(self.image)?;
            self.descriptors.get_mut(index)?.blocks.push(b);
        }
        self.persist_descriptor(index)
    }

    /// Rewrites the indirect block's contents and the descriptor record.
    /// Collapses an indirect pointer left with no held data after a shrink.
    fn persist_descriptor(&mut self, index: usize) -> Result<()> {
        if self.descriptors.get(index)?.blocks.len() == BLOCKS_MAP_SIZE {
            let pointer = self.descriptors.get(index)?.blocks[BLOCKS_MAP_SIZE - 1];
            self.blocks.free(self.image, pointer)?;
            self.descriptors.get_mut(index)?.blocks.pop();
        }

        let d = self.descriptors.get(index)?;
        let has_indirect = d.has_indirect();
        let nblock = d.blocks.len() as u32;
        let size = (nblock - has_indirect as u32) * BLOCK_SIZE as u32;

        if has_indirect {
            let pointer = d.blocks[BLOCKS_MAP_SIZE - 1];
            let extra = d.blocks[BLOCKS_MAP_SIZE..].to_vec();
            let mut content = Vec::with_capacity(BLOCK_SIZE);
            for i in 0..INDIRECT_ENTRIES {
                match extra.get(i) {
                    Some(&b) => content.extend(encode_int(b as i64, MAX_R)),
                    None => content.extend(encode_text("", MAX_R)),
                }
            }
            content.resize(BLOCK_SIZE, b' ');
            self.image
                .write_at(self.image.layout.block_offset(pointer as usize), &content)?;
        }

        self.descriptors.get_mut(index)?.size = size;
        self.descriptors.write(self.image, index)
    }

    pub fn truncate(&mut self, index: usize, size: usize) -> Result<()> {
        let rounded = (size + BLOCK_SIZE - 1) / BLOCK_SIZE * BLOCK_SIZE;
        let current = self.descriptors.get(index)?.size as usize;
        if rounded == current {
            return Ok(());
        }
        if rounded > current {
            let pad = vec![b'0'; rounded - current];
            self.write_chunks(index, current, &pad)?;
        } else {
            let new_data_blocks = rounded / BLOCK_SIZE;
            let keep = if new_data_blocks <= BLOCKS_MAP_SIZE - 1 {
                new_data_blocks
            } else {
                new_data_blocks + 1
            };
            let freed: Vec<u32> = {
                let d = self.descriptors.get_mut(index)?;
                let keep = keep.min(d.blocks.len());
                d.blocks.split_off(keep)
            };
            for block in freed {
                self.blocks.free(self.image, block)?;
            }
            self.persist_descriptor(index)?;
        }
        Ok(())
    }

    /// Loads the extra blocks an indirect pointer holds, called once per
    /// descriptor right after mounting (see [`crate::Filesystem::mount`]).
    pub fn hydrate_indirect(&mut self, index: usize) -> Result<()> {
        let d = self.descriptors.get(index)?;
        if d.nblock_on_disk_hint() <= BLOCKS_MAP_SIZE as u32 {
            return Ok(());
        }
        let pointer = *d
            .blocks
            .get(BLOCKS_MAP_SIZE - 1)
            .ok_or(FsError::BadOffset)?;
        let extra_count = d.nblock_on_disk_hint() as usize - BLOCKS_MAP_SIZE;
        let content = self
            .image
            .read_at(self.image.layout.block_offset(pointer as usize), BLOCK_SIZE)?;
        let mut extra = Vec::with_capacity(extra_count);
        for i in 0..extra_count.min(INDIRECT_ENTRIES) {
            let field = &content[i * MAX_R..(i + 1) * MAX_R];
            if let Some(b) = crate::codec::decode_block_index(field) {
                extra.push(b);
            }
        }
        let d = self.descriptors.get_mut(index)?;
        d.blocks.extend(extra);
        let has_indirect = d.has_indirect();
        d.size = (d.blocks.len() as u32 - has_indirect as u32) * BLOCK_SIZE as u32;
        Ok(())
    }
}
