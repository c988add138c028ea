use crate::archive::Archive;
use crate::error::{Error, Result};
use crate::wld::{rebuild, Traversal, Wld, WldHeader};

/// what a rewrite changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewriteStats {
    pub fragments_before: usize,
    pub fragments_after: usize,
    pub bytes_before: usize,
    pub bytes_after: usize,
}

/// rebuild the resource stored under `name` and put the result back
///
/// the archive is only changed in memory; call [`Archive::save`] or
/// [`Archive::save_as`] to persist it. on any error the entry is left as it was.
pub fn rewrite_entry<T: Traversal + ?Sized>(
    archive: &mut Archive,
    name: &str,
    traversal: &mut T,
) -> Result<RewriteStats> {
    let data = archive
        .get(name)?
        .ok_or_else(|| Error::Generic(format!("no entry named {} in archive", name)))?;

    let wld = Wld::parse(&data)?;
    let rebuilt = rebuild(&wld, traversal)?;
    let fragments_after = WldHeader::decode(&rebuilt)?.fragment_count as usize;

    let stats = RewriteStats {
        fragments_before: wld.len(),
        fragments_after,
        bytes_before: data.len(),
        bytes_after: rebuilt.len(),
    };

    archive.put(name, rebuilt)?;

    tracing::info!(
        entry = name,
        fragments_before = stats.fragments_before,
        fragments_after = stats.fragments_after,
        "rewrote resource"
    );

    Ok(stats)
}
