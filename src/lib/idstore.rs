use crate::coord::Coord;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Sparse mapping from 64-bit OSM ids to values. Filled once during ingest
/// and read-only afterwards; the snapshot layer persists it behind a
/// versioned header.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct IdStore<V> {
    map: FxHashMap<i64, V>,
}

impl<V> IdStore<V> {
    pub fn new() -> Self {
        IdStore {
            map: FxHashMap::default(),
        }
    }

    pub fn insert(&mut self, id: i64, value: V) {
        self.map.insert(id, value);
    }

    pub fn get(&self, id: i64) -> Option<&V> {
        self.map.get(&id)
    }

    pub fn contains(&self, id: i64) -> bool {
        self.map.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, &V)> {
        self.map.iter().map(|(&id, v)| (id, v))
    }
}

impl<V> Default for IdStore<V> {
    fn default() -> Self {
        IdStore::new()
    }
}

/// Node id → grid coordinate, plus the per-node reference counters the way
/// simplifier consults. A node with a counter ≥ 1 is referenced by a name
/// or a kept way geometry and must survive simplification.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct CoordStore {
    coords: FxHashMap<i64, Coord>,
    counters: FxHashMap<i64, u16>,
}

impl CoordStore {
    pub fn new() -> Self {
        CoordStore::default()
    }

    pub fn insert(&mut self, id: i64, coord: Coord) {
        self.coords.insert(id, coord);
    }

    pub fn get(&self, id: i64) -> Option<Coord> {
        self.coords.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.coords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    pub fn counter(&self, id: i64) -> u16 {
        self.counters.get(&id).copied().unwrap_or(0)
    }

    /// Increment the reference counter for a node, saturating at u16::MAX.
    pub fn pin(&mut self, id: i64) {
        let counter = self.counters.entry(id).or_insert(0);
        *counter = counter.saturating_add(1);
    }

    /// Split into the read-only coordinate map and the mutable counters so
    /// the simplifier thread can update counters while the coordinates stay
    /// shared.
    pub fn split_mut(&mut self) -> (&FxHashMap<i64, Coord>, &mut FxHashMap<i64, u16>) {
        (&self.coords, &mut self.counters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_get() {
        let mut store: IdStore<u32> = IdStore::new();
        assert!(store.get(17).is_none());
        store.insert(17, 99);
        store.insert(1 << 60, 1);
        assert_eq!(store.get(17), Some(&99));
        assert_eq!(store.get(1 << 60), Some(&1));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn counters_start_at_zero_and_saturate() {
        let mut store = CoordStore::new();
        store.insert(5, Coord::new(10, 10));
        assert_eq!(store.counter(5), 0);
        store.pin(5);
        store.pin(5);
        assert_eq!(store.counter(5), 2);

        for _ in 0..70_000 {
            store.pin(5);
        }
        assert_eq!(store.counter(5), u16::MAX);
    }

    #[test]
    fn counters_may_exist_without_coordinates() {
        let mut store = CoordStore::new();
        store.pin(123);
        assert_eq!(store.counter(123), 1);
        assert!(store.get(123).is_none());
    }
}
