//! Flat, fixed-capacity hard-link table mirroring the single root directory.

use crate::codec::{decode_int, decode_text, encode_text, FREE_SENTINEL, HARDLINK_LEN, MAX_R};
use crate::error::Result;
use crate::image::Image;
use crate::store::Directory;

pub struct HardlinkTable;

impl HardlinkTable {
    /// Reconstructs the in-memory `Directory` from the on-disk table.
    pub fn read(image: &Image) -> Result<Directory> {
        let mut dir = Directory::empty();
        for i in 0..image.layout.desc_number {
            let bytes = image.read_at(image.layout.hardlink_offset(i), HARDLINK_LEN)?;
            let name = decode_text(&bytes[..MAX_R]);
            let index_field = decode_text(&bytes[MAX_R..]);
            if index_field == FREE_SENTINEL || name.is_empty() {
                continue;
            }
            if let Some(index) = decode_int(bytes[MAX_R..].as_ref()) {
                dir.entries.push((name, index as usize));
            }
        }
        Ok(dir)
    }

    /// Rewrites the whole table from the directory's insertion order: slot
    /// `i` holds the `i`-th entry if one exists, otherwise the free sentinel.
    pub fn rewrite(image: &Image, dir: &Directory) -> Result<()> {
        for i in 0..image.layout.desc_number {
            let record = match dir.entries.get(i) {
                Some((name, index)) => {
                    let mut bytes = encode_text(name, MAX_R);
                    bytes.extend(encode_text(&index.to_string(), MAX_R));
                    bytes
                }
                None => {
                    let mut bytes = encode_text(" ", MAX_R);
                    bytes.extend(encode_text(FREE_SENTINEL, MAX_R));
                    bytes
                }
            };
            image.write_at(image.layout.hardlink_offset(i), &record)?;
        }
        Ok(())
    }
}
