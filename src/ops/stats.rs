//! archive statistics

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::archive::Archive;
use crate::error::Result;
use crate::hash::Digest;
use crate::wld::Wld;

/// archive statistics
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ArchiveStats {
    pub total_entries: usize,
    pub total_bytes: u64,
    /// stored size of entries already written; pending entries are not counted
    pub total_stored_bytes: u64,
    pub total_resources: usize,
    pub entries: Vec<EntryStats>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryStats {
    pub name: String,
    pub len: usize,
    pub stored_len: Option<usize>,
    pub crc: u32,
    pub digest: Digest,
    /// present when the entry parses as a WLD resource
    pub resource: Option<ResourceStats>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceStats {
    pub version: u32,
    pub fragments: usize,
    pub strings_len: usize,
    pub named_fragments: usize,
    /// fragment count per type tag
    pub by_type: BTreeMap<u32, usize>,
}

/// collect archive statistics
///
/// every entry is decompressed; entries named `*.wld` are also parsed as
/// resources.
pub fn stats(archive: &Archive) -> Result<ArchiveStats> {
    let mut s = ArchiveStats::default();

    for info in archive.entries() {
        let Some(data) = archive.get(&info.name)? else {
            continue;
        };

        let resource = if info.name.ends_with(".wld") {
            resource_stats(&info.name, &data)
        } else {
            None
        };

        s.total_entries += 1;
        s.total_bytes += info.len as u64;
        s.total_stored_bytes += info.stored_len.unwrap_or(0) as u64;
        if resource.is_some() {
            s.total_resources += 1;
        }

        s.entries.push(EntryStats {
            digest: Digest::of(&data),
            name: info.name,
            len: info.len,
            stored_len: info.stored_len,
            crc: info.crc,
            resource,
        });
    }

    Ok(s)
}

fn resource_stats(name: &str, data: &[u8]) -> Option<ResourceStats> {
    let wld = match Wld::parse(data) {
        Ok(wld) => wld,
        Err(e) => {
            tracing::debug!(entry = name, error = %e, "entry is not a readable resource");
            return None;
        }
    };

    let mut by_type = BTreeMap::new();
    let mut named_fragments = 0;
    for (_, fragment) in wld.iter() {
        *by_type.entry(fragment.type_tag()).or_insert(0) += 1;
        if wld.fragment_name(fragment).is_some() {
            named_fragments += 1;
        }
    }

    Some(ResourceStats {
        version: wld.header().version,
        fragments: wld.len(),
        strings_len: wld.strings().len(),
        named_fragments,
        by_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wld::testutil::{words, WldBuilder};
    use crate::wld::{BITMAP_LIST, BITMAP_REF, VERSION_OLD};
    use tempfile::tempdir;

    fn archive() -> Archive {
        let mut b = WldBuilder::new();
        let tex = b.name("GRASS_SPRITE");
        b.push(BITMAP_LIST, tex, words(&[0, 1, 0]));
        b.push(BITMAP_REF, 0, words(&[1, 0]));
        b.push(BITMAP_REF, 0, words(&[1, 0]));

        let mut archive = Archive::new();
        archive.put("grass.bmp", vec![7; 300]).unwrap();
        archive.put("field.wld", b.build()).unwrap();
        archive.put("broken.wld", vec![1, 2, 3]).unwrap();
        archive
    }

    #[test]
    fn test_counts_and_digests() {
        let s = stats(&archive()).unwrap();

        assert_eq!(s.total_entries, 3);
        assert_eq!(s.total_resources, 1);
        assert_eq!(s.total_stored_bytes, 0);

        let grass = &s.entries[0];
        assert_eq!(grass.name, "grass.bmp");
        assert_eq!(grass.len, 300);
        assert_eq!(grass.digest, Digest::of(&[7; 300]));
        assert!(grass.resource.is_none());

        let field = s.entries[1].resource.as_ref().unwrap();
        assert_eq!(field.version, VERSION_OLD);
        assert_eq!(field.fragments, 3);
        assert_eq!(field.named_fragments, 1);
        assert_eq!(field.by_type.get(&BITMAP_REF), Some(&2));
        assert_eq!(field.by_type.get(&BITMAP_LIST), Some(&1));

        assert!(s.entries[2].resource.is_none());
    }

    #[test]
    fn test_stored_sizes_after_save() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("field.pfs");
        let mut archive = archive();
        archive.save_as(&path).unwrap();

        let s = stats(&Archive::open(&path).unwrap()).unwrap();
        assert!(s.total_stored_bytes > 0);
        assert!(s.entries.iter().all(|e| e.stored_len.is_some()));
        assert_eq!(s.total_bytes, s.entries.iter().map(|e| e.len as u64).sum::<u64>());
    }

    #[test]
    fn test_serializes_to_json() {
        let s = stats(&archive()).unwrap();
        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains(&Digest::of(&[7; 300]).to_hex()));

        let back: ArchiveStats = serde_json::from_str(&json).unwrap();
        assert_eq!(back.entries.len(), 3);
        assert_eq!(back.entries[1].resource, s.entries[1].resource);
    }
}
