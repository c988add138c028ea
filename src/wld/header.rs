use crate::error::{read_u32, Error, Result};

/// resource magic
pub const WLD_MAGIC: u32 = 0x5450_3D02;

/// version written by older tools
pub const VERSION_OLD: u32 = 0x0001_5500;

/// version written by newer tools
pub const VERSION_NEW: u32 = 0x1000_C800;

/// encoded header size
pub const HEADER_LEN: usize = 28;

/// fixed resource header
///
/// fields other than the fragment count and string length are carried
/// through a rebuild unchanged.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WldHeader {
    pub version: u32,
    pub fragment_count: u32,
    pub reserved_a: [u32; 2],
    pub strings_len: u32,
    pub reserved_b: u32,
}

impl WldHeader {
    pub fn new(version: u32) -> Self {
        Self {
            version,
            fragment_count: 0,
            reserved_a: [0; 2],
            strings_len: 0,
            reserved_b: 0,
        }
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let magic = read_u32(buf, 0)?;
        if magic != WLD_MAGIC {
            return Err(Error::Invalid(format!(
                "resource magic {:#010x}, expected {:#010x}",
                magic, WLD_MAGIC
            )));
        }

        Ok(Self {
            version: read_u32(buf, 4)?,
            fragment_count: read_u32(buf, 8)?,
            reserved_a: [read_u32(buf, 12)?, read_u32(buf, 16)?],
            strings_len: read_u32(buf, 20)?,
            reserved_b: read_u32(buf, 24)?,
        })
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let fields = [
            WLD_MAGIC,
            self.version,
            self.fragment_count,
            self.reserved_a[0],
            self.reserved_a[1],
            self.strings_len,
            self.reserved_b,
        ];

        let mut out = [0u8; HEADER_LEN];
        for (chunk, value) in out.chunks_exact_mut(4).zip(fields) {
            chunk.copy_from_slice(&value.to_le_bytes());
        }
        out
    }

    pub fn is_known_version(&self) -> bool {
        self.version == VERSION_OLD || self.version == VERSION_NEW
    }
}
