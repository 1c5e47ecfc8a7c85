//! The object heap.
//!
//! Objects live in slots addressed by index. A handle also records the realm
//! that allocated it and the generation of its slot: sweeping a slot bumps
//! the generation and puts the index on the free list, so a handle kept past
//! a collection resolves to nothing instead of to the slot's next tenant.

use tracing::warn;

use super::object::{ObjectData, ObjectKind};
use crate::types::JsObject;

#[derive(Debug)]
struct Slot {
    generation: u32,
    data: Option<ObjectData>,
}

#[derive(Debug)]
pub(crate) struct Heap {
    realm: u64,
    slots: Vec<Slot>,
    free_list: Vec<usize>,
    /// Allocations since the last collection.
    allocated: usize,
    threshold: usize,
    live: usize,
    collections: u64,
    /// Stands in for handles that do not resolve.
    detached: ObjectData,
}

fn detached() -> ObjectData {
    let mut data = ObjectData::new(ObjectKind::Ordinary, None);
    data.extensible = false;
    data
}

fn unresolved(o: JsObject, realm: u64) {
    warn!(object = o.id, owner = o.heap, realm, "object handle does not resolve in this realm");
}

impl Heap {
    pub(crate) fn new(realm: u64, threshold: usize) -> Self {
        Self {
            realm,
            slots: Vec::new(),
            free_list: Vec::new(),
            allocated: 0,
            threshold: threshold.max(1),
            live: 0,
            collections: 0,
            detached: detached(),
        }
    }

    pub(crate) fn alloc(&mut self, data: ObjectData) -> JsObject {
        self.allocated += 1;
        self.live += 1;
        let id = match self.free_list.pop() {
            Some(id) => {
                self.slots[id].data = Some(data);
                id
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    data: Some(data),
                });
                self.slots.len() - 1
            }
        };
        JsObject {
            id,
            heap: self.realm,
            generation: self.slots[id].generation,
        }
    }

    /// Slot index of `o` if it is a live object of this heap.
    pub(crate) fn index(&self, o: JsObject) -> Option<usize> {
        let slot = self.slots.get(o.id)?;
        (o.heap == self.realm && slot.generation == o.generation && slot.data.is_some()).then_some(o.id)
    }

    pub(crate) fn contains(&self, o: JsObject) -> bool {
        self.index(o).is_some()
    }

    pub(crate) fn get(&self, o: JsObject) -> &ObjectData {
        match self.index(o).and_then(|i| self.slots[i].data.as_ref()) {
            Some(data) => data,
            None => {
                unresolved(o, self.realm);
                &self.detached
            }
        }
    }

    /// Writes through a handle that does not resolve land in a scratch
    /// object that is reset on every such access.
    pub(crate) fn get_mut(&mut self, o: JsObject) -> &mut ObjectData {
        let index = self.index(o);
        match index.and_then(|i| self.slots[i].data.as_mut()) {
            Some(data) => data,
            None => {
                unresolved(o, self.realm);
                self.detached = detached();
                &mut self.detached
            }
        }
    }

    /// Data of the object in slot `index`, for the collector.
    pub(crate) fn slot(&self, index: usize) -> Option<&ObjectData> {
        self.slots.get(index).and_then(|slot| slot.data.as_ref())
    }

    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Live objects.
    pub(crate) fn len(&self) -> usize {
        self.live
    }

    pub(crate) fn collections(&self) -> u64 {
        self.collections
    }

    /// Whether enough has been allocated since the last collection.
    pub(crate) fn due(&self) -> bool {
        self.allocated >= self.threshold
    }

    /// Frees every object not marked. Returns how many were freed.
    pub(crate) fn sweep(&mut self, marks: &[bool]) -> usize {
        self.allocated = 0;
        self.collections += 1;
        let mut freed = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.data.is_none() || marks.get(index).copied().unwrap_or(true) {
                continue;
            }
            slot.data = None;
            slot.generation = slot.generation.wrapping_add(1);
            self.free_list.push(index);
            freed += 1;
        }
        self.live -= freed;
        freed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ordinary() -> ObjectData {
        ObjectData::new(ObjectKind::Ordinary, None)
    }

    #[test]
    fn swept_slots_are_reused_under_a_new_generation() {
        let mut heap = Heap::new(7, 100);
        let kept = heap.alloc(ordinary());
        let dropped = heap.alloc(ordinary());
        assert_eq!(heap.sweep(&[true, false]), 1);
        assert!(heap.contains(kept));
        assert!(!heap.contains(dropped));

        let reused = heap.alloc(ordinary());
        assert_eq!(reused.id, dropped.id);
        assert_ne!(reused.generation, dropped.generation);
        assert!(!heap.contains(dropped));
        assert_eq!(heap.len(), 2);
        assert_eq!(heap.capacity(), 2);
    }

    #[test]
    fn handles_of_another_heap_do_not_resolve() {
        let mut mine = Heap::new(1, 100);
        let mut theirs = Heap::new(2, 100);
        mine.alloc(ordinary());
        let foreign = theirs.alloc(ordinary());
        assert!(!mine.contains(foreign));
        mine.get_mut(foreign).extensible = true;
        assert!(!mine.get(foreign).extensible);
    }

    #[test]
    fn collection_is_due_after_threshold_allocations() {
        let mut heap = Heap::new(1, 3);
        heap.alloc(ordinary());
        heap.alloc(ordinary());
        assert!(!heap.due());
        heap.alloc(ordinary());
        assert!(heap.due());
        heap.sweep(&[true, true, true]);
        assert!(!heap.due());
        assert_eq!(heap.collections(), 1);
    }
}
