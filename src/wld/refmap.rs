use std::collections::HashMap;

use super::strings::StringPool;
use super::Wld;
use crate::error::{Error, Result};

/// translates references from a source resource's numbering into the
/// numbering of the resource being rebuilt
///
/// positions are mapped explicitly as fragments are emitted. name references
/// are mapped lazily: the first lookup of an old pool offset interns its
/// string into the new pool and caches the result.
#[derive(Debug)]
pub struct RefMap<'w> {
    src: &'w Wld,
    old_to_new: HashMap<i32, i32>,
    pool: StringPool,
}

impl<'w> RefMap<'w> {
    pub fn new(src: &'w Wld) -> Result<Self> {
        Ok(Self {
            src,
            old_to_new: HashMap::new(),
            pool: StringPool::new()?,
        })
    }

    /// translate an old reference into the new numbering
    ///
    /// fails with [`Error::Invalid`] for a position that has not been
    /// assigned yet and for a name reference outside the old pool.
    pub fn resolve(&mut self, old: i32) -> Result<i32> {
        if old == 0 {
            return Ok(0);
        }
        if let Some(&new) = self.old_to_new.get(&old) {
            return Ok(new);
        }
        if old > 0 {
            return Err(Error::Invalid(format!(
                "reference to fragment {} before it was emitted",
                old
            )));
        }

        let src = self.src;
        let name = src.name_by_ref(old).ok_or_else(|| {
            Error::Invalid(format!(
                "name reference {} is outside the {}-byte string pool",
                old,
                src.strings().len()
            ))
        })?;
        let new = self.intern(name)?;
        self.old_to_new.insert(old, new);
        Ok(new)
    }

    /// record an explicit mapping; a later assignment for the same old reference wins
    pub fn assign(&mut self, old: i32, new: i32) {
        self.old_to_new.insert(old, new);
    }

    /// add a string to the new pool, returning its (negative) name reference
    pub fn intern(&mut self, name: &[u8]) -> Result<i32> {
        let offset = self.pool.add(name)?;
        Ok(-(offset as i32))
    }

    /// explicit or cached mapping for an old reference, without side effects
    pub fn get(&self, old: i32) -> Option<i32> {
        self.old_to_new.get(&old).copied()
    }

    /// the resource references are translated from
    pub fn source(&self) -> &'w Wld {
        self.src
    }

    pub fn pool(&self) -> &StringPool {
        &self.pool
    }

    pub fn into_pool(self) -> StringPool {
        self.pool
    }
}
