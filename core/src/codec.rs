//! Fixed-width textual encoding shared by every on-disk structure.
//!
//! Every integer and name is stored as an ASCII string, right-justified
//! (left-padded with spaces) to `MAX_R` bytes. The sentinel `"-"` marks a
//! free hard-link index field. Decoding never fails: an unparsable or blank
//! field simply decodes to `None`.

/// Field width in bytes for any encoded integer or name.
pub const MAX_R: usize = 16;
/// Data block size in bytes.
pub const BLOCK_SIZE: usize = 64;
/// Direct entries in a descriptor's block map.
pub const BLOCKS_MAP_SIZE: usize = 5;
/// Fixed header length.
pub const SUPERBLOCK_SIZE: usize = 48;
/// Free hard-link index sentinel.
pub const FREE_SENTINEL: &str = "-";
/// Free descriptor tag.
pub const TAG_FREE: u8 = b'-';
pub const TAG_DIR: u8 = b'd';
pub const TAG_REGULAR: u8 = b'r';
pub const TAG_SYMLINK: u8 = b's';

/// `2 * MAX_R`: a hard-link entry is a name field followed by an index field.
pub const HARDLINK_LEN: usize = 2 * MAX_R;
/// `1 + (3 + BLOCKS_MAP_SIZE) * MAX_R`: tag byte, nlink, size, nblock, block map.
pub const DESC_SIZE: usize = 1 + (3 + BLOCKS_MAP_SIZE) * MAX_R;
/// Extra block indices an indirect block can hold.
pub const INDIRECT_ENTRIES: usize = BLOCK_SIZE / MAX_R;

/// Encodes `text` right-justified into a field of `width` bytes, truncating
/// on the left if it doesn't fit.
pub fn encode_text(text: &str, width: usize) -> Vec<u8> {
    let bytes = text.as_bytes();
    let mut field = vec![b' '; width];
    if bytes.len() >= width {
        field.copy_from_slice(&bytes[bytes.len() - width..]);
    } else {
        field[width - bytes.len()..].copy_from_slice(bytes);
    }
    field
}

/// Encodes an integer right-justified into a field of `width` bytes.
pub fn encode_int(value: i64, width: usize) -> Vec<u8> {
    encode_text(&value.to_string(), width)
}

/// Trims surrounding whitespace and returns the remaining text.
pub fn decode_text(field: &[u8]) -> String {
    String::from_utf8_lossy(field).trim().to_string()
}

/// Trims and parses as a signed integer; `None` on a blank or unparsable field.
pub fn decode_int(field: &[u8]) -> Option<i64> {
    let text = decode_text(field);
    if text.is_empty() {
        None
    } else {
        text.parse().ok()
    }
}

/// Decodes a block-map entry: `None` for a blank field, the block index otherwise.
pub fn decode_block_index(field: &[u8]) -> Option<u32> {
    decode_int(field).map(|v| v as u32)
}
