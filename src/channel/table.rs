//! Side table for command payloads that cannot travel inline.
//!
//! Commands are `Copy`, so anything heap-owned (counter resolvers, byte buffers, deferred
//! closures) is parked here and the command carries a typed, generation-checked
//! [`TableRef`]. A slot is freed only when its value is taken, and a taken slot's
//! generation is bumped so stale references can never reach a reused slot.

use std::marker::PhantomData;
use std::sync::Arc;

use super::command::DeferredAction;
use super::queue::ChannelError;
use crate::counter::{CounterEvent, CounterResolver};
use crate::sync::mutex::Mutex;

/// Generation counter for reference validation.
type Generation = u32;

/// A typed reference to a value parked in a [`RefTable`].
pub struct TableRef<T> {
    index: u32,
    generation: Generation,
    _marker: PhantomData<fn() -> T>,
}

// Manual implementations to avoid T: Copy/Clone bounds
impl<T> Copy for TableRef<T> {}

impl<T> Clone for TableRef<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> PartialEq for TableRef<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for TableRef<T> {}

impl<T> std::fmt::Debug for TableRef<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TableRef({}v{})", self.index, self.generation)
    }
}

impl<T> TableRef<T> {
    /// Get the raw index (for debugging).
    pub fn raw_index(&self) -> u32 {
        self.index
    }

    /// Get the generation (for debugging).
    pub fn raw_generation(&self) -> u32 {
        self.generation
    }
}

/// Heap-owned payload stored in a table slot.
pub enum TableEntry {
    Event(Arc<CounterEvent>),
    Resolver(CounterResolver),
    Bytes(Box<[u8]>),
    Action(DeferredAction),
}

/// A value that can be parked in a [`RefTable`].
pub trait TableObject: Sized {
    fn into_entry(self) -> TableEntry;

    /// Unwrap an entry, handing it back if it holds another type.
    fn from_entry(entry: TableEntry) -> Result<Self, TableEntry>;
}

impl TableObject for Arc<CounterEvent> {
    fn into_entry(self) -> TableEntry {
        TableEntry::Event(self)
    }

    fn from_entry(entry: TableEntry) -> Result<Self, TableEntry> {
        match entry {
            TableEntry::Event(event) => Ok(event),
            other => Err(other),
        }
    }
}

impl TableObject for CounterResolver {
    fn into_entry(self) -> TableEntry {
        TableEntry::Resolver(self)
    }

    fn from_entry(entry: TableEntry) -> Result<Self, TableEntry> {
        match entry {
            TableEntry::Resolver(resolver) => Ok(resolver),
            other => Err(other),
        }
    }
}

impl TableObject for Box<[u8]> {
    fn into_entry(self) -> TableEntry {
        TableEntry::Bytes(self)
    }

    fn from_entry(entry: TableEntry) -> Result<Self, TableEntry> {
        match entry {
            TableEntry::Bytes(bytes) => Ok(bytes),
            other => Err(other),
        }
    }
}

impl TableObject for DeferredAction {
    fn into_entry(self) -> TableEntry {
        TableEntry::Action(self)
    }

    fn from_entry(entry: TableEntry) -> Result<Self, TableEntry> {
        match entry {
            TableEntry::Action(action) => Ok(action),
            other => Err(other),
        }
    }
}

struct Slot {
    generation: Generation,
    entry: Option<TableEntry>,
}

struct Slots {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
}

/// Generational slot table shared by the producer and the executor.
pub struct RefTable {
    inner: Mutex<Slots>,
}

impl RefTable {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Slots {
                slots: Vec::with_capacity(64),
                free_list: Vec::new(),
            }),
        }
    }

    /// Park `value` and return a reference to it.
    pub fn insert<T: TableObject>(&self, value: T) -> TableRef<T> {
        let mut inner = self.inner.lock();
        let entry = Some(value.into_entry());

        let (index, generation) = if let Some(index) = inner.free_list.pop() {
            let slot = &mut inner.slots[index as usize];
            slot.entry = entry;
            (index, slot.generation)
        } else {
            let index = inner.slots.len() as u32;
            inner.slots.push(Slot {
                generation: 1,
                entry,
            });
            (index, 1)
        };

        TableRef {
            index,
            generation,
            _marker: PhantomData,
        }
    }

    /// Take the value out of its slot, freeing the slot.
    pub fn take<T: TableObject>(&self, reference: TableRef<T>) -> Result<T, ChannelError> {
        let stale = ChannelError::StaleRef {
            index: reference.index,
            generation: reference.generation,
        };

        let mut inner = self.inner.lock();
        let slot = inner
            .slots
            .get_mut(reference.index as usize)
            .filter(|slot| slot.generation == reference.generation)
            .ok_or_else(|| stale.clone())?;
        let entry = slot.entry.take().ok_or_else(|| stale.clone())?;

        match T::from_entry(entry) {
            Ok(value) => {
                slot.generation = slot.generation.wrapping_add(1);
                inner.free_list.push(reference.index);
                Ok(value)
            }
            Err(entry) => {
                slot.entry = Some(entry);
                Err(stale)
            }
        }
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        let inner = self.inner.lock();
        inner.slots.len() - inner.free_list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RefTable {
    fn default() -> Self {
        Self::new()
    }
}
