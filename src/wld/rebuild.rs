//! rebuilding a resource under an add/reorder/duplicate transformation
//!
//! a [`Rebuilder`] session copies fragments out of a source resource one at a
//! time, rewriting every reference into the numbering of the output. the
//! caller decides the order; a fragment must be emitted before anything that
//! references it by position.

use super::header::HEADER_LEN;
use super::refmap::RefMap;
use super::strings::{reserve_pow2, toggle_obfuscation};
use super::{Fragment, Wld};
use crate::error::{Error, Result};

/// per-fragment choice made by a [`Traversal`] during the first pass
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    /// translate into the output now
    Translate,
    /// leave out of the output
    Skip,
    /// hold for [`Traversal::emit_deferred`]
    Defer,
}

/// caller-supplied policy driving a rebuild
pub trait Traversal {
    /// decide what to do with the source fragment at 1-based `index`
    fn decide(&mut self, wld: &Wld, index: u32, fragment: &Fragment) -> Decision;

    /// emit the fragments held back by `decide`, in source order by default
    fn emit_deferred(&mut self, session: &mut Rebuilder<'_>, deferred: &[u32]) -> Result<()> {
        for &index in deferred {
            session.translate(index)?;
        }
        Ok(())
    }
}

/// translates every fragment in source order
#[derive(Clone, Copy, Debug, Default)]
pub struct Identity;

impl Traversal for Identity {
    fn decide(&mut self, _wld: &Wld, _index: u32, _fragment: &Fragment) -> Decision {
        Decision::Translate
    }
}

/// rebuild `wld` under `traversal`, returning the new resource blob
pub fn rebuild<T: Traversal + ?Sized>(wld: &Wld, traversal: &mut T) -> Result<Vec<u8>> {
    let mut session = Rebuilder::new(wld)?;
    let mut deferred = Vec::new();

    for (index, fragment) in wld.iter() {
        match traversal.decide(wld, index, fragment) {
            Decision::Translate => {
                session.translate(index)?;
            }
            Decision::Skip => {}
            Decision::Defer => deferred.push(index),
        }
    }

    traversal.emit_deferred(&mut session, &deferred)?;
    session.finish()
}

/// one rebuild session over a source resource
#[derive(Debug)]
pub struct Rebuilder<'w> {
    refs: RefMap<'w>,
    out: Vec<u8>,
    count: u32,
}

impl<'w> Rebuilder<'w> {
    pub fn new(src: &'w Wld) -> Result<Self> {
        Ok(Self {
            refs: RefMap::new(src)?,
            out: Vec::new(),
            count: 0,
        })
    }

    /// the resource being rebuilt
    pub fn source(&self) -> &'w Wld {
        self.refs.source()
    }

    /// copy source fragment `old_index` into the output under its own name
    ///
    /// returns the fragment's new 1-based position.
    pub fn translate(&mut self, old_index: u32) -> Result<i32> {
        let src = self.source();
        let template = source_fragment(src, old_index)?;
        self.emit_old(old_index, template, src.fragment_name(template))
    }

    /// copy source fragment `old_index` into the output under a new name
    ///
    /// the old position and old name reference are remapped to the copy,
    /// so fragments emitted afterwards that point at the template point at
    /// the copy instead.
    pub fn translate_as(&mut self, old_index: u32, name: &[u8]) -> Result<i32> {
        let template = source_fragment(self.source(), old_index)?;
        self.emit_old(old_index, template, Some(name))
    }

    /// append a fragment whose references are already in the output numbering
    ///
    /// nothing is remapped and no mapping is recorded; a positional
    /// reference may point at any fragment emitted so far, including this one.
    pub fn add_new(&mut self, fragment: &Fragment, name: Option<&[u8]>) -> Result<i32> {
        let mut fragment = fragment.clone();
        let name_ref = match name {
            Some(name) => self.refs.intern(name)?,
            None => 0,
        };
        fragment.set_name_ref(name_ref);

        let limit = self.count + 1;
        for reference in fragment.references() {
            self.check_output_ref(reference, limit)?;
        }

        self.append(&fragment)
    }

    /// record an explicit old-to-new mapping (last write wins)
    pub fn assign(&mut self, old_ref: i32, new_ref: i32) {
        self.refs.assign(old_ref, new_ref);
    }

    /// translate an old reference into the output numbering
    pub fn resolve(&mut self, old_ref: i32) -> Result<i32> {
        self.refs.resolve(old_ref)
    }

    /// intern a name into the output pool, returning its name reference
    pub fn intern(&mut self, name: &[u8]) -> Result<i32> {
        self.refs.intern(name)
    }

    /// position of the most recently emitted fragment (0 before the first)
    pub fn last_added_ref(&self) -> i32 {
        self.count as i32
    }

    /// number of fragments emitted so far
    pub fn fragment_count(&self) -> u32 {
        self.count
    }

    /// bytes of fragment data emitted so far
    pub fn len(&self) -> usize {
        self.out.len()
    }

    pub fn is_empty(&self) -> bool {
        self.out.is_empty()
    }

    /// allocated size of the fragment buffer
    pub fn capacity(&self) -> usize {
        self.out.capacity()
    }

    /// serialize header, obfuscated string pool and fragments into a resource blob
    pub fn finish(self) -> Result<Vec<u8>> {
        let mut header = *self.source().header();
        let Self { refs, out, count } = self;
        let pool = refs.into_pool();

        header.fragment_count = count;
        header.strings_len = u32::try_from(pool.len())
            .map_err(|_| Error::Fatal(format!("string pool of {} bytes", pool.len())))?;

        let mut blob = Vec::new();
        blob.try_reserve_exact(HEADER_LEN + pool.len() + out.len())?;
        blob.extend_from_slice(&header.encode());
        let strings_at = blob.len();
        blob.extend_from_slice(pool.as_bytes());
        toggle_obfuscation(&mut blob[strings_at..]);
        blob.extend_from_slice(&out);

        tracing::debug!(
            fragments = count,
            strings_len = pool.len(),
            bytes = blob.len(),
            "rebuilt resource"
        );

        Ok(blob)
    }

    fn emit_old(&mut self, old_index: u32, template: &Fragment, name: Option<&[u8]>) -> Result<i32> {
        let old_ref = i32::try_from(old_index)
            .map_err(|_| Error::Invalid(format!("fragment index {} out of range", old_index)))?;
        let mut fragment = template.clone();

        match name {
            Some(name) => {
                let name_ref = self.refs.intern(name)?;
                // others may refer to this fragment by its old name
                if template.name_ref() < 0 {
                    self.refs.assign(template.name_ref(), name_ref);
                }
                fragment.set_name_ref(name_ref);
            }
            None if template.name_ref() == 0 => fragment.set_name_ref(0),
            None => {
                return Err(Error::Invalid(format!(
                    "fragment {} has name reference {} outside the {}-byte string pool",
                    old_index,
                    template.name_ref(),
                    self.source().strings().len()
                )));
            }
        }

        let old_refs: Vec<i32> = fragment.references().collect();
        for (slot, old) in old_refs.into_iter().enumerate() {
            let new = self.refs.resolve(old)?;
            fragment.set_reference(slot, new)?;
        }

        let new_ref = self.append(&fragment)?;
        self.refs.assign(old_ref, new_ref);
        Ok(new_ref)
    }

    fn append(&mut self, fragment: &Fragment) -> Result<i32> {
        if self.count >= i32::MAX as u32 {
            return Err(Error::Fatal("fragment count exceeds the reference range".to_string()));
        }

        reserve_pow2(&mut self.out, fragment.record_len())?;
        fragment.write_to(&mut self.out);
        self.count += 1;

        tracing::trace!(
            position = self.count,
            type_tag = fragment.type_tag(),
            "emitted fragment"
        );

        Ok(self.count as i32)
    }

    fn check_output_ref(&self, reference: i32, limit: u32) -> Result<()> {
        let valid = match reference {
            0 => true,
            r if r > 0 => r as u32 <= limit,
            r => self.refs.pool().get(r.unsigned_abs()).is_some(),
        };
        if valid {
            Ok(())
        } else {
            Err(Error::Invalid(format!(
                "reference {} does not exist in the output",
                reference
            )))
        }
    }
}

fn source_fragment(src: &Wld, old_index: u32) -> Result<&Fragment> {
    src.fragment(old_index).ok_or_else(|| {
        Error::Invalid(format!(
            "no fragment {} in a resource of {}",
            old_index,
            src.len()
        ))
    })
}
