//! Identity-based deduplication tables.
//!
//! The writer numbers each deduplicated object the first time it sees its
//! [`Identity`] and emits later occurrences as a back-reference to that
//! number. The reader mirrors this with a number-to-object table, which is
//! also what makes cyclic graphs decodable: an object can be registered
//! before its interior has been fully read.

use std::any::Any;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::ptr;
use std::rc::Rc;

/// An opaque identity key for deduplication.
///
/// Two writes carrying equal keys refer to the same object and
/// deduplicate; the codec never dereferences anything behind the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Identity(pub usize);

impl Identity {
    /// Derives the identity from a reference's address.
    ///
    /// The referenced object must outlive the whole write session: a
    /// dropped object's address can be reused by an unrelated allocation,
    /// which would alias the two.
    pub fn of<T: ?Sized>(value: &T) -> Self {
        Self(ptr::from_ref(value).cast::<()>().addr())
    }
}

/// Write-side table handing out object ids, starting at 1.
pub(crate) struct IdGen {
    ids: HashMap<Identity, u64>,
    next: u64,
}

impl IdGen {
    pub(crate) fn new() -> Self {
        Self { ids: HashMap::new(), next: 1 }
    }

    /// Looks up the id for `key`, assigning the next free one on first
    /// sight. Also returns whether this was the first sight.
    pub(crate) fn get_or_assign(&mut self, key: Identity) -> (u64, bool) {
        match self.ids.entry(key) {
            Entry::Occupied(entry) => (*entry.get(), false),
            Entry::Vacant(entry) => {
                let id = self.next;
                self.next += 1;
                entry.insert(id);
                (id, true)
            }
        }
    }
}

/// Read-side table resolving back-references to decoded objects.
pub(crate) struct ObjectTable {
    objects: HashMap<u64, Rc<dyn Any>>,
}

impl ObjectTable {
    pub(crate) fn new() -> Self {
        Self { objects: HashMap::new() }
    }

    /// Registers `object` under `id`. A repeated id overwrites the earlier
    /// entry.
    pub(crate) fn insert(&mut self, id: u64, object: Rc<dyn Any>) {
        self.objects.insert(id, object);
    }

    pub(crate) fn get(&self, id: u64) -> Option<Rc<dyn Any>> {
        self.objects.get(&id).map(Rc::clone)
    }
}
