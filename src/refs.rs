//! Reference tracking across the object graph (C3).
//!
//! Every reference-bearing slot starts with one flag byte classifying the
//! value as null, a back-reference, untracked, or tracked. The write side
//! assigns sequential reference ids; the read side keeps an arena of
//! materialized value handles indexed by those ids.
//!
//! Registration happens **before** the value body on both sides. That single
//! rule is what makes cycles work: by the time a nested slot back-references
//! an enclosing object, that object already owns an id (writer) or an arena
//! slot holding its still-under-construction shell (reader). No fix-up pass
//! exists or is needed.
//!
//! Both halves are per-session state. The owning codec resets them on every
//! exit path, success or failure, so partial ids never leak into the next
//! call.

use crate::error::{CrosswireError, Result};
use crate::value::Value;
use rustc_hash::FxHashMap;

/// The flag byte preceding every reference-bearing slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RefFlag {
    /// The value is null/absent.
    Null = 0,
    /// A `varuint32` back-reference id follows instead of a value body.
    Ref = 1,
    /// The value is non-null and not subject to tracking.
    NonRefNull = 2,
    /// The value is non-null and tracked; an id was allocated before the
    /// body was written.
    NonRef = 3,
}

impl RefFlag {
    /// Decodes the wire byte.
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(Self::Null),
            1 => Ok(Self::Ref),
            2 => Ok(Self::NonRefNull),
            3 => Ok(Self::NonRef),
            other => Err(CrosswireError::TypeMismatch(format!(
                "invalid reference flag {other:#04x}"
            ))),
        }
    }
}

/// Outcome of offering a value to the write-side resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteRef {
    /// First sighting: the caller must now write the value body.
    /// Carries the id that was allocated for it.
    Fresh(u32),
    /// The value was seen before; a back-reference to this id replaces the
    /// body.
    Seen(u32),
}

/// Write-side half: object identity to reference id.
///
/// Identity is the `Rc` allocation address of identity-bearing values;
/// values without identity (primitives in dynamic slots) still consume an id
/// so the two sides' counters stay in lockstep, but are never entered into
/// the map.
#[derive(Debug, Default)]
pub struct RefWriter {
    by_identity: FxHashMap<usize, u32>,
    next_id: u32,
}

impl RefWriter {
    /// Offers a value. Returns [`WriteRef::Seen`] when `identity` was
    /// registered earlier in this session; otherwise allocates the next id,
    /// registering `identity` when present.
    pub fn offer(&mut self, identity: Option<usize>) -> WriteRef {
        if let Some(key) = identity {
            if let Some(&id) = self.by_identity.get(&key) {
                return WriteRef::Seen(id);
            }
            let id = self.next_id;
            self.next_id += 1;
            self.by_identity.insert(key, id);
            return WriteRef::Fresh(id);
        }
        let id = self.next_id;
        self.next_id += 1;
        WriteRef::Fresh(id)
    }

    /// Clears the identity map and counter, keeping the allocation.
    pub fn reset(&mut self) {
        self.by_identity.clear();
        self.next_id = 0;
    }
}

/// Read-side half: an arena of materialized value handles.
///
/// `reserve` mirrors the writer's id allocation; `fill` installs the handle
/// (for containers, the empty shell goes in before elements are read).
#[derive(Debug, Default)]
pub struct RefReader {
    objects: Vec<Option<Value>>,
}

impl RefReader {
    /// Reserves the next arena slot, mirroring a writer-side id allocation.
    pub fn reserve(&mut self) -> u32 {
        self.objects.push(None);
        (self.objects.len() - 1) as u32
    }

    /// Installs the materialized handle for a reserved slot.
    pub fn fill(&mut self, id: u32, value: Value) {
        if let Some(slot) = self.objects.get_mut(id as usize) {
            *slot = Some(value);
        }
    }

    /// Resolves a back-reference. Fails with
    /// [`CrosswireError::UnknownRefId`] when the id is out of range or its
    /// slot was never filled (a forward reference, which a well-formed
    /// stream cannot contain).
    pub fn resolve(&self, id: u32) -> Result<Value> {
        self.objects
            .get(id as usize)
            .and_then(|slot| slot.clone())
            .ok_or(CrosswireError::UnknownRefId(id))
    }

    /// Clears the arena, keeping the allocation.
    pub fn reset(&mut self) {
        self.objects.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn writer_dedups_by_identity() {
        let mut refs = RefWriter::default();
        let a = Rc::new(String::from("a"));
        let key = Rc::as_ptr(&a) as usize;

        assert_eq!(refs.offer(Some(key)), WriteRef::Fresh(0));
        assert_eq!(refs.offer(None), WriteRef::Fresh(1));
        assert_eq!(refs.offer(Some(key)), WriteRef::Seen(0));

        refs.reset();
        assert_eq!(refs.offer(Some(key)), WriteRef::Fresh(0));
    }

    #[test]
    fn reader_rejects_unknown_and_unfilled_ids() {
        let mut refs = RefReader::default();
        assert!(matches!(
            refs.resolve(0),
            Err(CrosswireError::UnknownRefId(0))
        ));

        let id = refs.reserve();
        // Reserved but not yet filled: still unresolvable.
        assert!(matches!(
            refs.resolve(id),
            Err(CrosswireError::UnknownRefId(0))
        ));

        refs.fill(id, Value::Bool(true));
        assert_eq!(refs.resolve(id).ok(), Some(Value::Bool(true)));
    }
}
