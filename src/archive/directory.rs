//! on-disk directory table and footer
//!
//! the directory is a block stream holding:
//!
//! ```text
//! count: u32
//! per entry: name\0 | crc: u32 | offset: u32 | stored_len: u32 | len: u32
//! ```
//!
//! the fixed-size footer closes the file so the layout can be discovered
//! from the end: `b"PFS " | version: u32 | dir_offset: u32 | dir_stored_len: u32`.

use crate::error::{read_u32, Error, Result};

/// footer magic
pub const MAGIC: [u8; 4] = *b"PFS ";

/// format version written into the footer
pub const VERSION: u32 = 0x0002_0000;

/// size of the footer in bytes
pub const FOOTER_LEN: usize = 16;

/// one row of the directory table
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub crc: u32,
    pub offset: u32,
    pub stored_len: u32,
    pub len: u32,
}

/// file footer locating the directory
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Footer {
    pub dir_offset: u32,
    pub dir_stored_len: u32,
}

impl Footer {
    pub fn encode(&self) -> [u8; FOOTER_LEN] {
        let mut out = [0u8; FOOTER_LEN];
        out[0..4].copy_from_slice(&MAGIC);
        out[4..8].copy_from_slice(&VERSION.to_le_bytes());
        out[8..12].copy_from_slice(&self.dir_offset.to_le_bytes());
        out[12..16].copy_from_slice(&self.dir_stored_len.to_le_bytes());
        out
    }

    /// read the footer from the tail of `file` and check it against the file length
    pub fn decode(file: &[u8]) -> Result<Self> {
        if file.len() < FOOTER_LEN {
            return Err(Error::Invalid(format!(
                "file of {} bytes is too short for a footer",
                file.len()
            )));
        }

        let footer_at = file.len() - FOOTER_LEN;
        let tail = &file[footer_at..];
        if tail[0..4] != MAGIC {
            return Err(Error::Invalid("footer magic mismatch".to_string()));
        }

        let version = read_u32(tail, 4)?;
        if version != VERSION {
            return Err(Error::Invalid(format!("unsupported version {:#x}", version)));
        }

        let footer = Footer {
            dir_offset: read_u32(tail, 8)?,
            dir_stored_len: read_u32(tail, 12)?,
        };

        let dir_end = footer.dir_offset as u64 + footer.dir_stored_len as u64;
        if dir_end > footer_at as u64 {
            return Err(Error::Invalid(format!(
                "directory span {}..{} runs past footer at {}",
                footer.dir_offset, dir_end, footer_at
            )));
        }

        Ok(footer)
    }
}

/// serialize the directory table (uncompressed)
pub fn encode_table(entries: &[DirEntry]) -> Vec<u8> {
    let names: usize = entries.iter().map(|e| e.name.len() + 1).sum();
    let mut out = Vec::with_capacity(4 + names + entries.len() * 16);

    out.extend_from_slice(&(entries.len() as u32).to_le_bytes());
    for entry in entries {
        out.extend_from_slice(entry.name.as_bytes());
        out.push(0);
        out.extend_from_slice(&entry.crc.to_le_bytes());
        out.extend_from_slice(&entry.offset.to_le_bytes());
        out.extend_from_slice(&entry.stored_len.to_le_bytes());
        out.extend_from_slice(&entry.len.to_le_bytes());
    }

    out
}

/// parse a decompressed directory table
///
/// the table must be consumed exactly; leftovers mean the count lied.
pub fn decode_table(table: &[u8]) -> Result<Vec<DirEntry>> {
    let count = read_u32(table, 0).map_err(truncated)? as usize;
    let mut pos = 4;

    // every row takes at least 18 bytes, so a huge count cannot fit
    if count > table.len() / 18 {
        return Err(Error::Invalid(format!(
            "directory claims {} entries in {} bytes",
            count,
            table.len()
        )));
    }

    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let rest = table.get(pos..).unwrap_or_default();
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| Error::Invalid("unterminated entry name".to_string()))?;
        if nul == 0 {
            return Err(Error::Invalid("empty entry name".to_string()));
        }
        let name = std::str::from_utf8(&rest[..nul])
            .map_err(|_| Error::Invalid("entry name is not valid utf-8".to_string()))?
            .to_string();
        pos += nul + 1;

        let entry = DirEntry {
            name,
            crc: read_u32(table, pos).map_err(truncated)?,
            offset: read_u32(table, pos + 4).map_err(truncated)?,
            stored_len: read_u32(table, pos + 8).map_err(truncated)?,
            len: read_u32(table, pos + 12).map_err(truncated)?,
        };
        pos += 16;
        entries.push(entry);
    }

    if pos != table.len() {
        return Err(Error::Invalid(format!(
            "{} trailing bytes after directory table",
            table.len() - pos
        )));
    }

    Ok(entries)
}

fn truncated(err: Error) -> Error {
    Error::Invalid(format!("truncated directory table: {}", err))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, offset: u32) -> DirEntry {
        DirEntry {
            name: name.to_string(),
            crc: 0xDEAD_BEEF,
            offset,
            stored_len: 10,
            len: 20,
        }
    }

    #[test]
    fn test_table_roundtrip() {
        let entries = vec![entry("a.wld", 0), entry("textures.bmp", 10)];
        let table = encode_table(&entries);
        assert_eq!(decode_table(&table).unwrap(), entries);
    }

    #[test]
    fn test_empty_table() {
        let table = encode_table(&[]);
        assert_eq!(table, 0u32.to_le_bytes());
        assert!(decode_table(&table).unwrap().is_empty());
    }

    #[test]
    fn test_table_trailing_bytes() {
        let mut table = encode_table(&[entry("x", 0)]);
        table.push(7);
        assert!(matches!(decode_table(&table), Err(Error::Invalid(_))));
    }

    #[test]
    fn test_table_truncated_row() {
        let table = encode_table(&[entry("x", 0)]);
        let result = decode_table(&table[..table.len() - 2]);
        assert!(matches!(result, Err(Error::Invalid(_))));
    }

    #[test]
    fn test_table_count_too_large() {
        let mut table = encode_table(&[entry("x", 0)]);
        table[0..4].copy_from_slice(&1_000_000u32.to_le_bytes());
        assert!(matches!(decode_table(&table), Err(Error::Invalid(_))));
    }

    #[test]
    fn test_footer_roundtrip() {
        let footer = Footer {
            dir_offset: 4,
            dir_stored_len: 6,
        };
        let mut file = vec![0u8; 10];
        file.extend_from_slice(&footer.encode());
        assert_eq!(Footer::decode(&file).unwrap(), footer);
    }

    #[test]
    fn test_footer_points_past_eof() {
        let footer = Footer {
            dir_offset: 1000,
            dir_stored_len: 6,
        };
        let mut file = vec![0u8; 10];
        file.extend_from_slice(&footer.encode());
        assert!(matches!(Footer::decode(&file), Err(Error::Invalid(_))));
    }

    #[test]
    fn test_footer_bad_magic_and_short_file() {
        let mut file = vec![0u8; 4];
        file.extend_from_slice(
            &Footer {
                dir_offset: 0,
                dir_stored_len: 0,
            }
            .encode(),
        );
        file[4] = b'Q';
        assert!(matches!(Footer::decode(&file), Err(Error::Invalid(_))));
        assert!(matches!(Footer::decode(&[1, 2, 3]), Err(Error::Invalid(_))));
    }
}
