use crate::costprovider::*;
use crate::events::*;
use crate::grid::*;
use crate::location::*;
use crate::pathrequest::*;
use crate::pathresult::*;
use crate::room::DoorId;
use crate::traits::*;
use log::debug;
use serde::*;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
    pub max_entries: usize,
}

impl Default for CacheOptions {
    fn default() -> Self {
        CacheOptions { max_entries: 512 }
    }
}

/// Identifies a cached route. `room` is the room the route starts in; the
/// capabilities are part of the key because providers price tiles per agent.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PathCacheKey {
    pub start: GridPosition,
    pub goal: GridPosition,
    pub room: RoomId,
    pub provider: String,
    pub capabilities: Capabilities,
}

impl PathCacheKey {
    pub fn for_query(query: &PathQuery) -> PathCacheKey {
        PathCacheKey {
            start: query.start,
            goal: query.goal,
            room: query.start.room,
            provider: query.provider.identity().into_owned(),
            capabilities: query.agent.capabilities,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stale: u64,
    pub evictions: u64,
    pub invalidations: u64,
}

struct Entry {
    key: PathCacheKey,
    path: Arc<Path>,
    valid: bool,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Bounded LRU map from `PathCacheKey` to paths.
///
/// Entries live in a slab linked in access order (`head` most recent, `tail`
/// least recent) and are found through a hash index, so lookup, insertion and
/// eviction are all O(1).
pub struct PathCache {
    options: CacheOptions,
    index: HashMap<PathCacheKey, usize>,
    slots: Vec<Option<Entry>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    stats: CacheStats,
}

impl Default for PathCache {
    fn default() -> Self {
        PathCache::new(CacheOptions::default())
    }
}

impl PathCache {
    pub fn new(options: CacheOptions) -> PathCache {
        PathCache {
            options: CacheOptions {
                max_entries: options.max_entries.max(1),
            },
            index: HashMap::new(),
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            stats: CacheStats::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.options.max_entries
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn contains(&self, key: &PathCacheKey) -> bool {
        self.index.contains_key(key)
    }

    fn entry(&self, slot: usize) -> Option<&Entry> {
        self.slots.get(slot).and_then(|s| s.as_ref())
    }

    fn entry_mut(&mut self, slot: usize) -> Option<&mut Entry> {
        self.slots.get_mut(slot).and_then(|s| s.as_mut())
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = match self.entry(slot) {
            Some(e) => (e.prev, e.next),
            None => return,
        };

        match prev {
            Some(p) => {
                if let Some(e) = self.entry_mut(p) {
                    e.next = next;
                }
            }
            None => self.head = next,
        }

        match next {
            Some(n) => {
                if let Some(e) = self.entry_mut(n) {
                    e.prev = prev;
                }
            }
            None => self.tail = prev,
        }

        if let Some(e) = self.entry_mut(slot) {
            e.prev = None;
            e.next = None;
        }
    }

    fn push_front(&mut self, slot: usize) {
        let old_head = self.head;

        if let Some(e) = self.entry_mut(slot) {
            e.prev = None;
            e.next = old_head;
        }

        if let Some(h) = old_head {
            if let Some(e) = self.entry_mut(h) {
                e.prev = Some(slot);
            }
        }

        self.head = Some(slot);

        if self.tail.is_none() {
            self.tail = Some(slot);
        }
    }

    fn remove_slot(&mut self, slot: usize) -> Option<Entry> {
        self.unlink(slot);

        let entry = self.slots.get_mut(slot)?.take()?;
        self.index.remove(&entry.key);
        self.free.push(slot);

        Some(entry)
    }

    /// Returns the cached path and marks it most recently used. Entries that
    /// were marked invalid, or whose tiles changed since the path was
    /// computed, are dropped and reported as misses.
    pub fn get(&mut self, key: &PathCacheKey, grid: &GridManager) -> Option<Arc<Path>> {
        let Some(slot) = self.index.get(key).copied() else {
            self.stats.misses += 1;
            return None;
        };

        let usable = self
            .entry(slot)
            .map(|e| e.valid && e.path.is_current(grid))
            .unwrap_or(false);

        if !usable {
            debug!("dropping stale cached path {} -> {}", key.start, key.goal);
            self.remove_slot(slot);
            self.stats.stale += 1;
            self.stats.misses += 1;
            return None;
        }

        self.unlink(slot);
        self.push_front(slot);
        self.stats.hits += 1;

        self.entry(slot).map(|e| e.path.clone())
    }

    /// Returns the cached path without touching recency or validating it.
    pub fn peek(&self, key: &PathCacheKey) -> Option<&Arc<Path>> {
        let slot = *self.index.get(key)?;
        self.entry(slot).map(|e| &e.path)
    }

    pub fn insert(&mut self, key: PathCacheKey, path: Arc<Path>) {
        if let Some(slot) = self.index.get(&key).copied() {
            if let Some(e) = self.entry_mut(slot) {
                e.path = path;
                e.valid = true;
            }
            self.unlink(slot);
            self.push_front(slot);
            return;
        }

        while self.index.len() >= self.options.max_entries {
            let Some(tail) = self.tail else {
                break;
            };
            if let Some(evicted) = self.remove_slot(tail) {
                debug!("evicted cached path {} -> {}", evicted.key.start, evicted.key.goal);
                self.stats.evictions += 1;
            }
        }

        let entry = Entry {
            key: key.clone(),
            path,
            valid: true,
            prev: None,
            next: None,
        };

        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(entry);
                slot
            }
            None => {
                self.slots.push(Some(entry));
                self.slots.len() - 1
            }
        };

        self.index.insert(key, slot);
        self.push_front(slot);
    }

    pub fn remove(&mut self, key: &PathCacheKey) -> Option<Arc<Path>> {
        let slot = self.index.get(key).copied()?;
        self.remove_slot(slot).map(|e| e.path)
    }

    fn slots_matching(&self, pred: impl Fn(&Entry) -> bool) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, e)| e.as_ref().filter(|e| pred(e)).map(|_| slot))
            .collect()
    }

    /// Drops every entry keyed on `room` and every entry whose path passes
    /// through it.
    pub fn invalidate_room(&mut self, room: RoomId) -> usize {
        let doomed = self.slots_matching(|e| e.key.room == room || e.path.passes_through(room));

        for slot in doomed.iter() {
            self.remove_slot(*slot);
        }

        if !doomed.is_empty() {
            debug!("invalidated {} cached paths touching {}", doomed.len(), room);
            self.stats.invalidations += doomed.len() as u64;
        }

        doomed.len()
    }

    /// Marks entries that cross `door` invalid; they are dropped on next access.
    pub fn invalidate_door(&mut self, door: DoorId) -> usize {
        let marked = self.slots_matching(|e| e.valid && e.path.doors().contains(&door));

        for slot in marked.iter() {
            if let Some(e) = self.entry_mut(*slot) {
                e.valid = false;
            }
        }

        self.stats.invalidations += marked.len() as u64;

        marked.len()
    }

    /// Marks every route that leaves its starting room invalid.
    pub fn invalidate_cross_room(&mut self) -> usize {
        let marked = self.slots_matching(|e| e.valid && !e.path.doors().is_empty());

        for slot in marked.iter() {
            if let Some(e) = self.entry_mut(*slot) {
                e.valid = false;
            }
        }

        self.stats.invalidations += marked.len() as u64;

        marked.len()
    }

    pub fn clear(&mut self) {
        self.index.clear();
        self.slots.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
    }

    /// Keys from most to least recently used.
    pub fn keys_by_recency(&self) -> Vec<&PathCacheKey> {
        let mut keys = Vec::with_capacity(self.len());
        let mut cursor = self.head;

        while let Some(slot) = cursor {
            match self.entry(slot) {
                Some(e) => {
                    keys.push(&e.key);
                    cursor = e.next;
                }
                None => break,
            }
        }

        keys
    }
}

impl TileChangeListener for PathCache {
    fn on_tile_changed(&mut self, change: &TileChange) {
        self.invalidate_room(change.room);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::Room;
    use crate::tile::TileType;

    fn grid() -> GridManager {
        let mut grid = GridManager::new();
        grid.add_room(Room::new(RoomId(1), 8, 8, Cell::new(0, 0), TileType::Floor).unwrap()).unwrap();
        grid.add_room(Room::new(RoomId(2), 8, 8, Cell::new(8, 0), TileType::Floor).unwrap()).unwrap();
        grid
    }

    fn key(room: u32, x: i32) -> PathCacheKey {
        PathCacheKey {
            start: GridPosition::new(RoomId(room), Cell::new(0, 0)),
            goal: GridPosition::new(RoomId(room), Cell::new(x, 0)),
            room: RoomId(room),
            provider: "test".to_owned(),
            capabilities: Capabilities::empty(),
        }
    }

    fn path(grid: &GridManager, cells: &[(u32, i32)], doors: &[DoorId]) -> Arc<Path> {
        let waypoints: Vec<GridPosition> = cells.iter().map(|(r, x)| GridPosition::new(RoomId(*r), Cell::new(*x, 0))).collect();
        let tile_indices: Vec<usize> = waypoints.iter().map(|w| grid.tile_index(*w).unwrap()).collect();
        let tile_versions = waypoints.iter().map(|w| grid.tile(*w).unwrap().version()).collect();

        Arc::new(Path {
            waypoints,
            tile_indices,
            tile_versions,
            doors: doors.to_vec(),
            cost: cells.len() as f32,
        })
    }

    #[test]
    fn third_key_evicts_least_recently_used() {
        let grid = grid();
        let mut cache = PathCache::new(CacheOptions { max_entries: 2 });

        cache.insert(key(1, 1), path(&grid, &[(1, 0), (1, 1)], &[]));
        cache.insert(key(1, 2), path(&grid, &[(1, 0), (1, 2)], &[]));
        assert!(cache.get(&key(1, 1), &grid).is_some());

        cache.insert(key(1, 3), path(&grid, &[(1, 0), (1, 3)], &[]));

        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&key(1, 1)));
        assert!(!cache.contains(&key(1, 2)));
        assert!(cache.contains(&key(1, 3)));
        assert_eq!(cache.keys_by_recency(), vec![&key(1, 3), &key(1, 1)]);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn reinserting_refreshes_recency() {
        let grid = grid();
        let mut cache = PathCache::new(CacheOptions { max_entries: 2 });

        cache.insert(key(1, 1), path(&grid, &[(1, 1)], &[]));
        cache.insert(key(1, 2), path(&grid, &[(1, 2)], &[]));
        cache.insert(key(1, 1), path(&grid, &[(1, 1)], &[]));
        cache.insert(key(1, 3), path(&grid, &[(1, 3)], &[]));

        assert!(cache.contains(&key(1, 1)));
        assert!(!cache.contains(&key(1, 2)));
    }

    #[test]
    fn room_invalidation_covers_keys_and_traversals() {
        let grid = grid();
        let mut cache = PathCache::default();

        cache.insert(key(1, 1), path(&grid, &[(1, 0), (1, 1)], &[]));
        cache.insert(key(1, 7), path(&grid, &[(1, 7), (2, 0)], &[DoorId(0)]));
        cache.insert(key(2, 3), path(&grid, &[(2, 0), (2, 3)], &[]));

        assert_eq!(cache.invalidate_room(RoomId(2)), 2);
        assert!(cache.contains(&key(1, 1)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn version_mismatch_is_a_miss() {
        let mut grid = grid();
        let mut cache = PathCache::default();

        cache.insert(key(1, 2), path(&grid, &[(1, 0), (1, 1), (1, 2)], &[]));
        grid.update_tile(RoomId(1), 1, 0, TileType::Mud).unwrap();

        assert!(cache.get(&key(1, 2), &grid).is_none());
        assert!(!cache.contains(&key(1, 2)));
        assert_eq!(cache.stats().stale, 1);
    }

    #[test]
    fn door_invalidation_is_lazy() {
        let grid = grid();
        let mut cache = PathCache::default();

        cache.insert(key(1, 7), path(&grid, &[(1, 7), (2, 0)], &[DoorId(4)]));
        assert_eq!(cache.invalidate_door(DoorId(4)), 1);
        assert!(cache.contains(&key(1, 7)));
        assert!(cache.get(&key(1, 7), &grid).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn validity_lives_on_the_entry() {
        let grid = grid();
        let mut cache = PathCache::default();
        let shared = path(&grid, &[(1, 7), (2, 0)], &[DoorId(4)]);

        cache.insert(key(1, 7), shared.clone());
        cache.invalidate_door(DoorId(4));

        // The marked entry refuses the hit while the path it holds is untouched.
        assert!(Arc::ptr_eq(cache.peek(&key(1, 7)).unwrap(), &shared));

        // Replacing the path under a marked key makes the entry usable again.
        cache.insert(key(1, 7), shared.clone());
        assert!(cache.get(&key(1, 7), &grid).is_some());
        assert_eq!(cache.stats().stale, 0);
    }

    #[test]
    fn listens_to_tile_changes() {
        let mut grid = grid();
        let mut cache = PathCache::default();
        cache.insert(key(2, 3), path(&grid, &[(2, 0), (2, 3)], &[]));

        let change = grid.update_tile(RoomId(2), 5, 5, TileType::Wall).unwrap();
        cache.on_tile_changed(&change);

        assert!(cache.is_empty());
        assert_eq!(cache.stats().invalidations, 1);
    }
}
