use crate::archive::Archive;
use crate::error::Result;
use crate::hash::checksum;

/// fsck report
#[derive(Debug, Default)]
pub struct FsckReport {
    /// entries checked
    pub entries_checked: usize,
    /// entries that failed to decompress or whose integrity code is wrong
    pub corrupt_entries: Vec<CorruptEntry>,
}

impl FsckReport {
    pub fn is_ok(&self) -> bool {
        self.corrupt_entries.is_empty()
    }
}

#[derive(Debug)]
pub struct CorruptEntry {
    pub name: String,
    pub message: String,
}

/// verify every entry of an archive
///
/// integrity codes are checked regardless of `verify_integrity`. a corrupt
/// entry is reported and checking moves on to the next one.
pub fn fsck(archive: &Archive) -> Result<FsckReport> {
    let mut report = FsckReport::default();

    for info in archive.entries() {
        report.entries_checked += 1;

        let message = match archive.get(&info.name) {
            Ok(Some(data)) => {
                let actual = checksum(&data);
                if actual == info.crc {
                    continue;
                }
                format!(
                    "integrity code mismatch: expected {:08x}, got {:08x}",
                    info.crc, actual
                )
            }
            Ok(None) => continue,
            Err(e) if e.is_malformed() => e.to_string(),
            Err(e) => return Err(e),
        };

        tracing::warn!(entry = %info.name, %message, "corrupt entry");
        report.corrupt_entries.push(CorruptEntry {
            name: info.name,
            message,
        });
    }

    Ok(report)
}
