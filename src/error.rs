use std::collections::TryReserveError;
use std::path::PathBuf;

/// flat error category, one per failure class a caller may want to branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Generic,
    CouldNotOpen,
    CouldNotCreate,
    Invalid,
    OutOfBounds,
    OutOfMemory,
    FileOperation,
    Compression,
    Again,
    NotInitialized,
    Fatal,
}

/// error type for pfsgraph operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Generic(String),

    #[error("could not open {path}: {source}")]
    CouldNotOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not create {path}: {source}")]
    CouldNotCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid data: {0}")]
    Invalid(String),

    #[error("read of {len} bytes at offset {offset} exceeds buffer of {size} bytes")]
    OutOfBounds { offset: usize, len: usize, size: usize },

    #[error("out of memory: {0}")]
    OutOfMemory(#[from] TryReserveError),

    #[error("io error at {path}: {source}")]
    FileOperation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("compression failed: {0}")]
    Compression(#[source] std::io::Error),

    #[error("entry already exists: {0}")]
    Again(String),

    #[error("{0} is not initialized")]
    NotInitialized(&'static str),

    #[error("fatal: {0}")]
    Fatal(String),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("config serialization error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),
}

impl Error {
    /// the taxonomy category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Generic(_) => ErrorKind::Generic,
            Error::CouldNotOpen { .. } => ErrorKind::CouldNotOpen,
            Error::CouldNotCreate { .. } => ErrorKind::CouldNotCreate,
            Error::Invalid(_) => ErrorKind::Invalid,
            Error::OutOfBounds { .. } => ErrorKind::OutOfBounds,
            Error::OutOfMemory(_) => ErrorKind::OutOfMemory,
            Error::FileOperation { .. } => ErrorKind::FileOperation,
            Error::Compression(_) => ErrorKind::Compression,
            Error::Again(_) => ErrorKind::Again,
            Error::NotInitialized(_) => ErrorKind::NotInitialized,
            Error::Fatal(_) => ErrorKind::Fatal,
            Error::Config(_) | Error::ConfigSerialize(_) => ErrorKind::Invalid,
        }
    }

    /// true for the malformed-data kinds that must abort a rebuild
    pub fn is_malformed(&self) -> bool {
        matches!(self.kind(), ErrorKind::Invalid | ErrorKind::OutOfBounds)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// helper to wrap io errors with path context
pub trait IoResultExt<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| Error::FileOperation {
            path: path.into(),
            source,
        })
    }
}

/// bounds-checked little-endian reads over a byte slice
pub(crate) fn read_u32(buf: &[u8], offset: usize) -> Result<u32> {
    let bytes = slice(buf, offset, 4)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

pub(crate) fn read_i32(buf: &[u8], offset: usize) -> Result<i32> {
    read_u32(buf, offset).map(|v| v as i32)
}

pub(crate) fn slice(buf: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    offset
        .checked_add(len)
        .and_then(|end| buf.get(offset..end))
        .ok_or(Error::OutOfBounds {
            offset,
            len,
            size: buf.len(),
        })
}
