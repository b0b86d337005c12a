//! Process-wide entity-id issuance.
//!
//! The allocator is the only shared mutable collection in the server; it is
//! initialized before any shard starts and torn down after every shard
//! stops. It only mutates a counter and a live set, so a plain mutex is
//! enough.

use crate::ids::EntityId;
use std::collections::HashSet;
use std::sync::Mutex;

/// Issues monotonically increasing, non-zero entity ids and tracks which of
/// them are currently live.
#[derive(Debug, Default)]
pub struct EntityIdAllocator {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    next: i32,
    live: HashSet<EntityId>,
}

impl EntityIdAllocator {
    /// Create an allocator whose first issued id is 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next entity id.
    pub fn alloc(&self) -> EntityId {
        let mut inner = self.inner.lock().expect("entity allocator poisoned");
        inner.next = inner.next.wrapping_add(1);
        // Zero is reserved so that EntityId::default() never aliases a live
        // entity.
        if inner.next == 0 {
            inner.next = 1;
        }
        let id = EntityId(inner.next);
        inner.live.insert(id);
        id
    }

    /// Release an id. Returns false when the id was not live, which callers
    /// treat as a programming-invariant warning rather than a failure.
    pub fn free(&self, id: EntityId) -> bool {
        let mut inner = self.inner.lock().expect("entity allocator poisoned");
        inner.live.remove(&id)
    }

    /// Number of currently live entities.
    pub fn live_count(&self) -> usize {
        let inner = self.inner.lock().expect("entity allocator poisoned");
        inner.live.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic_and_nonzero() {
        let alloc = EntityIdAllocator::new();
        let a = alloc.alloc();
        let b = alloc.alloc();
        assert!(a.0 > 0);
        assert!(b.0 > a.0);
    }

    #[test]
    fn free_tracks_liveness() {
        let alloc = EntityIdAllocator::new();
        let a = alloc.alloc();
        assert_eq!(alloc.live_count(), 1);
        assert!(alloc.free(a));
        assert!(!alloc.free(a));
        assert_eq!(alloc.live_count(), 0);
    }

    #[test]
    fn shared_across_threads() {
        use std::sync::Arc;

        let alloc = Arc::new(EntityIdAllocator::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let alloc = Arc::clone(&alloc);
            handles.push(std::thread::spawn(move || {
                (0..100).map(|_| alloc.alloc()).collect::<Vec<_>>()
            }));
        }

        let mut all = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(all.insert(id), "duplicate id issued: {id}");
            }
        }
        assert_eq!(alloc.live_count(), 800);
    }
}
