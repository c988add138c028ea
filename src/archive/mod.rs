//! PFS archive engine
//!
//! an archive is a flat set of named entries, each stored as a chunked
//! DEFLATE block stream. the whole file is kept in memory; entries are
//! decompressed on demand and new content is only compressed on save.

mod block;
mod directory;

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::{Error, IoResultExt, Result};
use crate::hash::checksum;

pub use block::{compress, decompress, inflated_len, BLOCK_SIZE};
pub use directory::{decode_table, encode_table, DirEntry, Footer, FOOTER_LEN, MAGIC, VERSION};

/// where an entry's bytes currently live
#[derive(Clone, Debug)]
enum Content {
    /// block stream inside the archive's raw file buffer
    Stored {
        offset: usize,
        stored_len: usize,
        crc: u32,
    },
    /// uncompressed content set by `put`, compressed on save
    Pending(Vec<u8>),
}

#[derive(Clone, Debug)]
struct Entry {
    name: String,
    len: usize,
    content: Content,
}

/// summary of one archive entry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryInfo {
    pub name: String,
    /// integrity code of the decompressed content
    pub crc: u32,
    /// size of the stored block stream; `None` until the entry is saved
    pub stored_len: Option<usize>,
    /// decompressed size
    pub len: usize,
}

/// an in-memory PFS archive
#[derive(Debug)]
pub struct Archive {
    path: Option<PathBuf>,
    raw: Vec<u8>,
    entries: Vec<Entry>,
    by_name: HashMap<String, usize>,
    config: Config,
}

impl Default for Archive {
    fn default() -> Self {
        Self::new()
    }
}

impl Archive {
    /// create an empty archive with no backing file
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// create an empty archive with no backing file
    pub fn with_config(config: Config) -> Self {
        Self {
            path: None,
            raw: Vec::new(),
            entries: Vec::new(),
            by_name: HashMap::new(),
            config,
        }
    }

    /// open an archive with the default configuration
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, Config::default())
    }

    /// open an archive, reading the whole file into memory
    pub fn open_with(path: &Path, config: Config) -> Result<Self> {
        let raw = fs::read(path).map_err(|source| Error::CouldNotOpen {
            path: path.to_path_buf(),
            source,
        })?;

        let mut archive = Self::from_bytes(raw, config)?;
        archive.path = Some(path.to_path_buf());

        tracing::debug!(
            path = %path.display(),
            entries = archive.entries.len(),
            bytes = archive.raw.len(),
            "opened archive"
        );

        Ok(archive)
    }

    /// parse an archive from raw file bytes
    pub fn from_bytes(raw: Vec<u8>, config: Config) -> Result<Self> {
        config.validate()?;

        let footer = Footer::decode(&raw)?;
        let dir_start = footer.dir_offset as usize;
        let dir_span = &raw[dir_start..dir_start + footer.dir_stored_len as usize];

        let table = decompress(dir_span, inflated_len(dir_span)?)?;
        let rows = decode_table(&table)?;

        let mut archive = Self::with_config(config);
        for row in rows {
            let end = row.offset as u64 + row.stored_len as u64;
            if end > dir_start as u64 {
                return Err(Error::Invalid(format!(
                    "entry {} spans {}..{}, past the data section end {}",
                    row.name, row.offset, end, dir_start
                )));
            }

            let key = row.name.to_ascii_lowercase();
            if archive.by_name.contains_key(&key) {
                return Err(Error::Invalid(format!("duplicate entry name {}", row.name)));
            }

            archive.by_name.insert(key.clone(), archive.entries.len());
            archive.entries.push(Entry {
                name: key,
                len: row.len as usize,
                content: Content::Stored {
                    offset: row.offset as usize,
                    stored_len: row.stored_len as usize,
                    crc: row.crc,
                },
            });
        }

        archive.raw = raw;
        Ok(archive)
    }

    /// backing file, if the archive was opened from disk
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// entry names in directory order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    /// name of the entry at `index` in directory order
    pub fn name(&self, index: usize) -> Option<&str> {
        self.entries.get(index).map(|e| e.name.as_str())
    }

    /// case-insensitive membership test
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(&name.to_ascii_lowercase())
    }

    /// summaries of every entry in directory order
    pub fn entries(&self) -> Vec<EntryInfo> {
        self.entries
            .iter()
            .map(|e| match &e.content {
                Content::Stored {
                    stored_len, crc, ..
                } => EntryInfo {
                    name: e.name.clone(),
                    crc: *crc,
                    stored_len: Some(*stored_len),
                    len: e.len,
                },
                Content::Pending(data) => EntryInfo {
                    name: e.name.clone(),
                    crc: checksum(data),
                    stored_len: None,
                    len: e.len,
                },
            })
            .collect()
    }

    /// decompressed content of an entry, or `None` if no such entry exists
    ///
    /// fails with [`Error::Invalid`] when the stored block stream is corrupt
    /// or (with `verify_integrity`) the integrity code does not match.
    pub fn get(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let Some(&index) = self.by_name.get(&name.to_ascii_lowercase()) else {
            return Ok(None);
        };
        let entry = &self.entries[index];

        match &entry.content {
            Content::Pending(data) => Ok(Some(data.clone())),
            Content::Stored {
                offset,
                stored_len,
                crc,
            } => {
                let span = &self.raw[*offset..*offset + *stored_len];
                let data = decompress(span, entry.len).map_err(|e| match e {
                    Error::Invalid(msg) => Error::Invalid(format!("{}: {}", entry.name, msg)),
                    other => other,
                })?;

                if self.config.verify_integrity {
                    let actual = checksum(&data);
                    if actual != *crc {
                        return Err(Error::Invalid(format!(
                            "{}: integrity code {:08x} does not match content {:08x}",
                            entry.name, crc, actual
                        )));
                    }
                }

                Ok(Some(data))
            }
        }
    }

    /// insert or replace an entry
    ///
    /// nothing is compressed until the archive is saved.
    pub fn put(&mut self, name: &str, data: impl Into<Vec<u8>>) -> Result<()> {
        validate_name(name)?;
        let data = data.into();
        let key = name.to_ascii_lowercase();

        let entry = Entry {
            name: key.clone(),
            len: data.len(),
            content: Content::Pending(data),
        };

        match self.by_name.get(&key) {
            Some(&index) => self.entries[index] = entry,
            None => {
                self.by_name.insert(key, self.entries.len());
                self.entries.push(entry);
            }
        }

        Ok(())
    }

    /// insert a new entry, failing with [`Error::Again`] if the name is taken
    pub fn insert(&mut self, name: &str, data: impl Into<Vec<u8>>) -> Result<()> {
        if self.contains(name) {
            return Err(Error::Again(name.to_string()));
        }
        self.put(name, data)
    }

    /// remove an entry, returning whether it existed
    pub fn remove(&mut self, name: &str) -> bool {
        let Some(index) = self.by_name.remove(&name.to_ascii_lowercase()) else {
            return false;
        };

        self.entries.remove(index);
        for slot in self.by_name.values_mut() {
            if *slot > index {
                *slot -= 1;
            }
        }
        true
    }

    /// serialize the complete archive: data section, directory, footer
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let level = self.config.compression();
        let mut out = Vec::with_capacity(self.raw.len());
        let mut rows = Vec::with_capacity(self.entries.len());

        for entry in &self.entries {
            let offset = out.len();
            let crc = match &entry.content {
                Content::Stored {
                    offset: src,
                    stored_len,
                    crc,
                } => {
                    out.try_reserve(*stored_len)?;
                    out.extend_from_slice(&self.raw[*src..*src + *stored_len]);
                    *crc
                }
                Content::Pending(data) => {
                    block::compress_into(data, level, &mut out)?;
                    checksum(data)
                }
            };

            rows.push(DirEntry {
                name: entry.name.clone(),
                crc,
                offset: format_u32(offset)?,
                stored_len: format_u32(out.len() - offset)?,
                len: format_u32(entry.len)?,
            });
        }

        let dir_offset = format_u32(out.len())?;
        let dir_stored_len = block::compress_into(&encode_table(&rows), level, &mut out)?;

        let footer = Footer {
            dir_offset,
            dir_stored_len: format_u32(dir_stored_len)?,
        };
        out.extend_from_slice(&footer.encode());
        format_u32(out.len())?;

        Ok(out)
    }

    /// write the archive back to the file it was opened from
    pub fn save(&mut self) -> Result<()> {
        let path = self
            .path
            .clone()
            .ok_or(Error::NotInitialized("archive path"))?;
        self.write_to(&path)
    }

    /// write the archive to another file; the original file is left untouched
    /// and [`Archive::path`] keeps pointing at it
    pub fn save_as(&mut self, path: &Path) -> Result<()> {
        self.write_to(path)
    }

    fn write_to(&mut self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes()?;
        write_atomic(path, &bytes)?;

        tracing::debug!(
            path = %path.display(),
            entries = self.entries.len(),
            bytes = bytes.len(),
            "saved archive"
        );

        // adopt the written layout so later reads come from the new bytes
        let reloaded = Self::from_bytes(bytes, self.config.clone())?;
        self.raw = reloaded.raw;
        self.entries = reloaded.entries;
        self.by_name = reloaded.by_name;
        Ok(())
    }
}

/// atomic write: temp sibling -> fsync -> rename
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .ok_or_else(|| Error::Invalid(format!("not a file path: {}", path.display())))?;
    let tmp_path = path.with_file_name(format!(
        ".{}.{}.tmp",
        file_name.to_string_lossy(),
        uuid::Uuid::new_v4()
    ));

    let result = (|| {
        let mut tmp_file = File::create(&tmp_path).map_err(|source| Error::CouldNotCreate {
            path: tmp_path.clone(),
            source,
        })?;
        tmp_file.write_all(bytes).with_path(&tmp_path)?;
        tmp_file.sync_all().with_path(&tmp_path)?;
        fs::rename(&tmp_path, path).with_path(path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Invalid("empty entry name".to_string()));
    }
    if name.contains('\0') {
        return Err(Error::Invalid(format!("entry name contains NUL: {:?}", name)));
    }
    Ok(())
}

fn format_u32(value: usize) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| Error::Fatal(format!("archive offset {} exceeds the 32-bit format", value)))
}
