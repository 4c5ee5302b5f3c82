//! A pedagogical, single-volume filesystem that lives entirely inside one
//! host file: a superblock, a flat hard-link table, a fixed-size descriptor
//! table, an allocation bitmap, and a pool of fixed-size data blocks.
//!
//! [`Filesystem`] is the single entry point both binaries drive.

pub mod block;
pub mod codec;
pub mod descriptor;
pub mod error;
pub mod handle;
pub mod hardlink;
pub mod image;
pub mod namespace;
pub mod store;

use std::fs;
use std::path::Path;

use block::BlockPool;
use codec::{decode_int, encode_int, MAX_R, SUPERBLOCK_SIZE};
use descriptor::{DescriptorTable, Tag};
pub use error::{FsError, Result};
use handle::OpenFileTable;
use hardlink::HardlinkTable;
use image::{Image, Layout};
use store::{Directory, FileStore};

/// A snapshot of one descriptor's public fields, returned by `stat`.
#[derive(Debug)]
pub struct Stat {
    pub index: usize,
    pub tag: Tag,
    pub nlink: u32,
    pub size: u32,
    pub nblock: u32,
}

pub struct Filesystem {
    image: Image,
    descriptors: DescriptorTable,
    blocks: BlockPool,
    dir: Directory,
    handles: OpenFileTable,
}

fn encode_superblock(desc_number: usize, blocks_number: usize, block_size: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(SUPERBLOCK_SIZE);
    out.extend(encode_int(desc_number as i64, MAX_R));
    out.extend(encode_int(blocks_number as i64, MAX_R));
    out.extend(encode_int(block_size as i64, MAX_R));
    out
}

impl Filesystem {
    /// Formats `path` as a fresh image with `desc_number` descriptors. The
    /// block count is derived from the file's current length (section 4.2);
    /// the caller (`mkfs-sim`, or an already-open image reformatted by the
    /// `mkfs` shell command) is responsible for the file existing with the
    /// right size beforehand.
    pub fn format(path: impl AsRef<Path>, desc_number: usize) -> Result<Self> {
        let path = path.as_ref();
        let file_size = fs::metadata(path)?.len();
        let blocks_number = Layout::blocks_for_size(desc_number, file_size);
        let layout = Layout {
            desc_number,
            blocks_number,
            block_size: codec::BLOCK_SIZE,
        };
        let image = Image::new(path, layout);

        image.write_at(0, &encode_superblock(desc_number, blocks_number, codec::BLOCK_SIZE))?;

        let descriptors = DescriptorTable::format(desc_number);
        for i in 0..desc_number {
            descriptors.write(&image, i)?;
        }

        let dir = Directory::format();
        HardlinkTable::rewrite(&image, &dir)?;

        let blocks = BlockPool::new(blocks_number);
        image.write_at(layout.bitmap_offset(0), blocks.bytes())?;

        log::info!("formatted '{}' with {} descriptors, {} blocks", path.display(), desc_number, blocks_number);

        Ok(Filesystem {
            image,
            descriptors,
            blocks,
            dir,
            handles: OpenFileTable::new(),
        })
    }

    /// Reattaches to an already-formatted image.
    pub fn mount(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let header = fs::read(path)?;
        let desc_number = decode_int(&header[0..MAX_R]).unwrap_or(0) as usize;
        let blocks_number = decode_int(&header[MAX_R..2 * MAX_R]).unwrap_or(0) as usize;
        let block_size = decode_int(&header[2 * MAX_R..3 * MAX_R]).unwrap_or(0) as usize;
        let layout = Layout {
            desc_number,
            blocks_number,
            block_size,
        };

        let actual_len = fs::metadata(path)?.len();
        if actual_len < layout.total_bytes() {
            return Err(FsError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!(
                    "image '{}' is {} bytes, too small for its own superblock ({} expected)",
                    path.display(),
                    actual_len,
                    layout.total_bytes()
                ),
            )));
        }

        let image = Image::new(path, layout);

        let mut descriptors = DescriptorTable::read(&image)?;
        let bitmap = image.read_at(layout.bitmap_offset(0), blocks_number)?;
        let mut blocks = BlockPool::from_bytes(bitmap);
        let dir = HardlinkTable::read(&image)?;

        let regular: Vec<usize> = descriptors
            .iter()
            .filter(|(_, d)| d.tag == Tag::Regular)
            .map(|(index, _)| index)
            .collect();
        let mut scratch = Directory::empty();
        for index in regular {
            let mut store = FileStore {
                image: &image,
                descriptors: &mut descriptors,
                blocks: &mut blocks,
                dir: &mut scratch,
            };
            store.hydrate_indirect(index)?;
        }

        log::info!("mounted '{}'", path.display());

        Ok(Filesystem {
            image,
            descriptors,
            blocks,
            dir,
            handles: OpenFileTable::new(),
        })
    }

    fn store(&mut self) -> FileStore<'_> {
        FileStore {
            image: &self.image,
            descriptors: &mut self.descriptors,
            blocks: &mut self.blocks,
            dir: &mut self.dir,
        }
    }

    /// Lists the root directory's entries: `(name, descriptor index, tag)`.
    pub fn ls(&self) -> Vec<(String, usize, Tag)> {
        self.dir
            .names()
            .map(|(name, index)| {
                let tag = self
                    .descriptors
                    .get(*index)
                    .map(|d| d.tag)
                    .unwrap_or(Tag::Free);
                (name.clone(), *index, tag)
            })
            .collect()
    }

    pub fn create(&mut self, name: &str) -> Result<usize> {
        let mut store = self.store();
        let resolution = store.resolve(name, true)?;
        let result = if resolution.path_exists() {
            Err(FsError::AlreadyExists(name.to_string()))
        } else if resolution.parent.is_none() {
            Err(FsError::NotADirectory(name.to_string()))
        } else {
            store.create(&resolution.name)
        };
        match &result {
            Ok(index) => log::info!("created '{}' as descriptor {}", name, index),
            Err(e) => log::warn!("create '{}' failed: {}", name, e),
        }
        result
    }

    pub fn symlink(&mut self, target: &str, name: &str) -> Result<usize> {
        let mut store = self.store();
        let resolution = store.resolve(name, true)?;
        let result = if resolution.path_exists() {
            Err(FsError::AlreadyExists(name.to_string()))
        } else if resolution.parent.is_none() {
            Err(FsError::NotADirectory(name.to_string()))
        } else {
            store.symlink(&resolution.name, target)
        };
        match &result {
            Ok(index) => log::info!("created symlink '{}' -> '{}' as descriptor {}", name, target, index),
            Err(e) => log::warn!("symlink '{}' failed: {}", name, e),
        }
        result
    }

    pub fn link(&mut self, src: &str, dst: &str) -> Result<()> {
        let mut store = self.store();
        let src_resolution = store.resolve(src, false)?;
        let dst_resolution = store.resolve(dst, true)?;
        let result = (|| {
            let src_index = src_resolution
                .target
                .ok_or_else(|| FsError::NoSuchPath(src.to_string()))?;
            if dst_resolution.path_exists() {
                return Err(FsError::AlreadyExists(dst.to_string()));
            }
            let dst_parent = dst_resolution
                .parent
                .ok_or_else(|| FsError::NotADirectory(dst.to_string()))?;
            let _ = dst_parent;
            store.link(&dst_resolution.name, src_index)
        })();
        match &result {
            Ok(()) => log::info!("linked '{}' to '{}'", dst, src),
            Err(e) => log::warn!("link '{}' -> '{}' failed: {}", dst, src, e),
        }
        result
    }

    pub fn unlink(&mut self, name: &str) -> Result<()> {
        let descriptor_index = {
            let store = self.store();
            let resolution = store.resolve(name, false)?;
            resolution.target
        };
        let result = match descriptor_index {
            None => Err(FsError::NoSuchPath(name.to_string())),
            Some(index) => {
                let opened = self.handles.references(index) > 0;
                let component = name.rsplit('/').next().unwrap_or(name).to_string();
                self.store().unlink(&component, opened)
            }
        };
        match &result {
            Ok(()) => log::info!("unlinked '{}'", name),
            Err(e) => log::warn!("unlink '{}' failed: {}", name, e),
        }
        result
    }

    pub fn stat(&mut self, name: &str) -> Result<Stat> {
        let resolution = self.store().resolve(name, false)?;
        let index = resolution
            .target
            .ok_or_else(|| FsError::NoSuchPath(name.to_string()))?;
        let d = self.descriptors.get(index)?;
        let stat = Stat {
            index,
            tag: d.tag,
            nlink: d.nlink,
            size: d.size,
            nblock: d.nblock(),
        };
        log::info!("stat '{}': descriptor {}, nlink {}, size {}", name, index, stat.nlink, stat.size);
        Ok(stat)
    }

    pub fn truncate(&mut self, name: &str, size: usize) -> Result<()> {
        let mut store = self.store();
        let resolution = store.resolve(name, false)?;
        let result = (|| {
            let index = resolution
                .target
                .ok_or_else(|| FsError::NoSuchPath(name.to_string()))?;
            if store.descriptors.get(index)?.tag != Tag::Regular {
                return Err(FsError::NotARegularFile(name.to_string()));
            }
            store.truncate(index, size)
        })();
        match &result {
            Ok(()) => log::info!("truncated '{}' to {} bytes", name, size),
            Err(e) => log::warn!("truncate '{}' failed: {}", name, e),
        }
        result
    }

    /// Creates the file if absent (reserving the handle only after the
    /// implicit `create` succeeds, per the resolved open question in 4.8/9).
    pub fn open(&mut self, name: &str) -> Result<usize> {
        let mut store = self.store();
        let resolution = store.resolve(name, false)?;
        let result = (|| {
            let index = if resolution.path_exists() {
                let index = resolution.target.unwrap();
                if store.descriptors.get(index)?.tag == Tag::Dir {
                    return Err(FsError::NotARegularFile(name.to_string()));
                }
                index
            } else if resolution.parent.is_some() {
                store.create(&resolution.name)?
            } else {
                return Err(FsError::NoSuchPath(name.to_string()));
            };
            Ok(index)
        })();
        let result = result.map(|index| self.handles.open(index));
        match &result {
            Ok(fd) => log::info!("opened '{}' as fd {}", name, fd),
            Err(e) => log::warn!("open '{}' failed: {}", name, e),
        }
        result
    }

    pub fn close(&mut self, fd: usize) -> Result<()> {
        let result = (|| {
            let open_file = self.handles.close(fd)?;
            let index = open_file.descriptor;
            if self.descriptors.get(index)?.to_delete && self.handles.references(index) == 0 {
                self.store().free_descriptor(index)?;
            }
            Ok(())
        })();
        match &result {
            Ok(()) => log::info!("closed fd {}", fd),
            Err(e) => log::warn!("close fd {} failed: {}", fd, e),
        }
        result
    }

    pub fn read(&mut self, fd: usize, n: usize) -> Result<Vec<u8>> {
        let (index, offset) = {
            let open_file = self.handles.get(fd)?;
            (open_file.descriptor, open_file.offset)
        };
        let result = self.store().read(index, n, offset);
        if result.is_ok() {
            self.handles.get_mut(fd)?.offset += n;
        }
        match &result {
            Ok(data) => log::info!("read {} byte(s) from fd {}", data.len(), fd),
            Err(e) => log::warn!("read from fd {} failed: {}", fd, e),
        }
        result
    }

    /// `line` is the caller-supplied text; it's trimmed to `n` bytes before
    /// being written at the handle's current offset.
    pub fn write(&mut self, fd: usize, n: usize, line: &str) -> Result<()> {
        let (index, offset) = {
            let open_file = self.handles.get(fd)?;
            (open_file.descriptor, open_file.offset)
        };
        let text = &line.as_bytes()[..line.len().min(n)];
        let result = self.store().write_chunks(index, offset, text);
        match result {
            Ok(new_offset) => {
                self.handles.get_mut(fd)?.offset = new_offset;
                log::info!("wrote {} byte(s) to fd {}", text.len(), fd);
                Ok(())
            }
            Err(e) => {
                log::warn!("write to fd {} failed: {}", fd, e);
                Err(e)
            }
        }
    }

    pub fn seek(&mut self, fd: usize, pos: usize) -> Result<()> {
        let index = self.handles.get(fd)?.descriptor;
        let size = self.descriptors.get(index)?.size as usize;
        let result = if pos > size {
            Err(FsError::BadOffset)
        } else {
            self.handles.get_mut(fd)?.offset = pos;
            Ok(())
        };
        match &result {
            Ok(()) => log::info!("seek fd {} to {}", fd, pos),
            Err(e) => log::warn!("seek fd {} to {} failed: {}", fd, pos, e),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    static COUNTER: AtomicU32 = AtomicU32::new(0);

    fn scratch_image() -> std::path::PathBuf {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut path = std::env::temp_dir();
        path.push(format!("fscore-test-{}-{}.img", std::process::id(), n));
        path
    }

    fn formatted(desc_number: usize, size: u64) -> (Filesystem, std::path::PathBuf) {
        let path = scratch_image();
        Image::create_sized(&path, size).unwrap();
        let fs = Filesystem::format(&path, desc_number).unwrap();
        (fs, path)
    }

    #[test]
    fn create_yields_first_free_descriptor_after_root() {
        let (mut fs, path) = formatted(16, 4096);
        let index = fs.create("a").unwrap();
        // Index 1, not 2: `find_free` scans the descriptor table itself, not
        // hard-link slots, so a freed descriptor is never handed back out
        // while a surviving hard link still references it.
        assert_eq!(index, 1);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn unlink_then_create_reuses_descriptor_with_empty_file() {
        let (mut fs, path) = formatted(16, 4096);
        let a = fs.create("a").unwrap();
        fs.unlink("a").unwrap();
        let b = fs.create("b").unwrap();
        assert_eq!(a, b);
        let stat = fs.stat("b").unwrap();
        assert_eq!(stat.size, 0);
        assert_eq!(stat.nblock, 0);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn link_keeps_descriptor_alive_after_original_name_is_removed() {
        let (mut fs, path) = formatted(16, 4096);
        fs.create("a").unwrap();
        let fd = fs.open("a").unwrap();
        fs.write(fd, 5, "hello").unwrap();
        fs.close(fd).unwrap();
        fs.link("a", "b").unwrap();
        fs.unlink("a").unwrap();

        let fd = fs.open("b").unwrap();
        let data = fs.read(fd, 5).unwrap();
        assert_eq!(data, b"hello");
        fs.close(fd).unwrap();

        // "a" is gone, but the descriptor behind "b" was never touched.
        assert!(fs.stat("a").is_err());
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn unlink_on_open_file_defers_free_until_close() {
        let (mut fs, path) = formatted(16, 4096);
        let index = fs.create("a").unwrap();
        let fd = fs.open("a").unwrap();
        fs.unlink("a").unwrap();
        assert!(fs.stat("a").is_err());

        // The descriptor is still flagged to_delete, not yet freed.
        fs.close(fd).unwrap();
        let c = fs.create("c").unwrap();
        assert_eq!(c, index);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn read_offset_advances_by_requested_size_not_bytes_returned() {
        let (mut fs, path) = formatted(16, 4096);
        fs.create("a").unwrap();
        let fd = fs.open("a").unwrap();
        fs.write(fd, 5, "hi").unwrap();
        fs.seek(fd, 0).unwrap();
        // File only has 5 bytes; asking for 100 advances the offset by 100.
        let _ = fs.read(fd, 100);
        assert!(fs.seek(fd, 5).is_ok());
        fs.close(fd).unwrap();
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn truncate_grow_pads_with_ascii_zero_and_is_idempotent() {
        let (mut fs, path) = formatted(16, 4096);
        fs.create("a").unwrap();
        fs.truncate("a", 10).unwrap();
        let stat = fs.stat("a").unwrap();
        assert!(stat.size >= 10);

        let fd = fs.open("a").unwrap();
        let data = fs.read(fd, stat.size as usize).unwrap();
        fs.close(fd).unwrap();
        assert!(data.iter().all(|&b| b == b'0'));

        let before = fs.stat("a").unwrap();
        fs.truncate("a", before.size as usize).unwrap();
        let after = fs.stat("a").unwrap();
        assert_eq!(before.size, after.size);
        assert_eq!(before.nblock, after.nblock);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn truncate_shrink_frees_trailing_blocks() {
        let (mut fs, path) = formatted(16, 4096);
        fs.create("a").unwrap();
        fs.truncate("a", 200).unwrap();
        let grown = fs.stat("a").unwrap();
        fs.truncate("a", 10).unwrap();
        let shrunk = fs.stat("a").unwrap();
        assert!(shrunk.nblock < grown.nblock);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn stat_and_open_on_a_symlink_do_not_follow_it() {
        let (mut fs, path) = formatted(16, 4096);
        fs.create("a").unwrap();
        let fd = fs.open("a").unwrap();
        fs.write(fd, 5, "hello").unwrap();
        fs.close(fd).unwrap();

        fs.symlink("a", "link").unwrap();

        // `stat`/`open` resolve their final component without following a
        // symlink (matching the original's `lookup(path, follow=False)`),
        // so both see the link itself, not "a".
        let stat = fs.stat("link").unwrap();
        assert_eq!(stat.tag, Tag::Symlink);

        let fd = fs.open("link").unwrap();
        let data = fs.read(fd, 1).unwrap();
        assert_eq!(data, b"a");
        fs.close(fd).unwrap();
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn write_crossing_a_block_boundary_allocates_a_second_block() {
        let (mut fs, path) = formatted(16, 4096);
        fs.create("a").unwrap();
        let fd = fs.open("a").unwrap();
        let text = "x".repeat(codec::BLOCK_SIZE + 10);
        fs.write(fd, text.len(), &text).unwrap();
        fs.close(fd).unwrap();
        let stat = fs.stat("a").unwrap();
        assert!(stat.nblock >= 2);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn round_trip_through_mount_preserves_directory_and_content() {
        let (mut fs, path) = formatted(16, 4096);
        fs.create("a").unwrap();
        let fd = fs.open("a").unwrap();
        fs.write(fd, 5, "hello").unwrap();
        fs.close(fd).unwrap();
        drop(fs);

        let mut remounted = Filesystem::mount(&path).unwrap();
        let entries = remounted.ls();
        assert!(entries.iter().any(|(name, _, tag)| name == "a" && *tag == Tag::Regular));
        let fd = remounted.open("a").unwrap();
        let data = remounted.read(fd, 5).unwrap();
        assert_eq!(data, b"hello");
        remounted.close(fd).unwrap();
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn exceeding_descriptor_capacity_fails_cleanly() {
        // With 3 descriptors the hard-link table has exactly 3 slots; `.`
        // and `..` already consume 2, so the first `create` fills the last
        // one and a second `create` must fail.
        let (mut fs, path) = formatted(3, 4096);
        fs.create("a").unwrap();
        assert!(fs.create("b").is_err());
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn seek_past_size_is_rejected() {
        let (mut fs, path) = formatted(16, 4096);
        fs.create("a").unwrap();
        let fd = fs.open("a").unwrap();
        assert!(fs.seek(fd, 1).is_err());
        fs.close(fd).unwrap();
        let _ = std::fs::remove_file(path);
    }

    /// Drives a bounded sequence of random create/write/truncate/unlink
    /// operations and checks the universal invariants from section 8 hold
    /// after every step: a regular file's `size` always matches its block
    /// count, and every allocated block belongs to exactly one descriptor.
    #[test]
    fn random_operations_preserve_size_and_bitmap_invariants() {
        use rand::Rng;

        let (mut fs, path) = formatted(32, 8192);
        let mut rng = rand::thread_rng();
        let mut live_names: Vec<String> = Vec::new();

        for step in 0..200 {
            let name = format!("f{}", rng.gen_range(0..8));
            match rng.gen_range(0..4) {
                0 => {
                    if fs.create(&name).is_ok() {
                        live_names.push(name);
                    }
                }
                1 => {
                    if let Ok(fd) = fs.open(&name) {
                        let text = "x".repeat(rng.gen_range(1..20));
                        let _ = fs.write(fd, text.len(), &text);
                        let _ = fs.close(fd);
                    }
                }
                2 => {
                    let size = rng.gen_range(0..300);
                    let _ = fs.truncate(&name, size);
                }
                _ => {
                    let _ = fs.unlink(&name);
                    live_names.retain(|n| n != &name);
                }
            }

            for (n, index, tag) in fs.ls() {
                if tag != Tag::Regular {
                    continue;
                }
                let stat = fs.stat(&n).unwrap();
                let has_indirect = stat.nblock as usize > fscore_blocks_map_size();
                let expected_size =
                    (stat.nblock - has_indirect as u32) * codec::BLOCK_SIZE as u32;
                assert_eq!(
                    stat.size, expected_size,
                    "step {}: descriptor {} size/nblock mismatch",
                    step, index
                );
            }

            // Invariant 2: the bitmap agrees with the set of blocks any
            // live descriptor actually references.
            let mut referenced = vec![false; fs.blocks.len()];
            for (_, d) in fs.descriptors.iter() {
                for &b in &d.blocks {
                    referenced[b as usize] = true;
                }
            }
            for i in 0..fs.blocks.len() {
                assert_eq!(
                    fs.blocks.is_allocated(i),
                    referenced[i],
                    "step {}: bitmap/descriptor mismatch at block {}",
                    step, i
                );
            }
        }
        let _ = std::fs::remove_file(path);
    }

    fn fscore_blocks_map_size() -> usize {
        crate::codec::BLOCKS_MAP_SIZE - 1
    }
}
