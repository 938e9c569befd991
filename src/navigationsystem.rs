use crate::costprovider::*;
use crate::error::*;
use crate::events::*;
use crate::grid::*;
use crate::location::*;
use crate::pathcache::*;
use crate::pathfinder::*;
use crate::pathrequest::*;
use crate::reservationtable::*;
use crate::room::*;
use crate::scheduler::*;
use crate::tile::*;
use crate::traits::*;
use log::{debug, info};
use serde::*;
use std::sync::Arc;

/// Aggregated configuration of every component. Missing sections fall back to
/// their defaults, so partial documents load.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    pub pathfinder: PathfinderOptions,
    pub reservations: ReservationOptions,
    pub cache: CacheOptions,
    pub scheduler: SchedulerOptions,
}

/// Owns the world model and every pathfinding component and wires them
/// together: tile changes reach the path cache before any other listener, and
/// each tick resolves queued requests against the current reservation state
/// before the reservation window slides forward.
pub struct NavigationSystem {
    grid: GridManager,
    pathfinder: HierarchicalPathfinder,
    cache: PathCache,
    reservations: ReservationTable,
    scheduler: RequestScheduler,
    listeners: TileChangeBus,
}

impl Default for NavigationSystem {
    fn default() -> Self {
        NavigationSystem::new(NavigationConfig::default())
    }
}

impl NavigationSystem {
    pub fn new(config: NavigationConfig) -> NavigationSystem {
        NavigationSystem {
            grid: GridManager::new(),
            pathfinder: HierarchicalPathfinder::new(config.pathfinder),
            cache: PathCache::new(config.cache),
            reservations: ReservationTable::new(config.reservations),
            scheduler: RequestScheduler::new(config.scheduler),
            listeners: TileChangeBus::new(),
        }
    }

    pub fn grid(&self) -> &GridManager {
        &self.grid
    }

    pub fn cache(&self) -> &PathCache {
        &self.cache
    }

    pub fn reservations(&self) -> &ReservationTable {
        &self.reservations
    }

    pub fn scheduler(&self) -> &RequestScheduler {
        &self.scheduler
    }

    pub fn stats(&self) -> SearchStats {
        self.pathfinder.stats()
    }

    pub fn current_time(&self) -> u64 {
        self.reservations.current_time()
    }

    //
    // Map-facing API.
    //

    pub fn add_room(&mut self, room: Room) -> Result<(), NavigationError> {
        self.grid.add_room(room)
    }

    pub fn remove_room(&mut self, id: RoomId) -> Result<Room, NavigationError> {
        let room = self.grid.remove_room(id)?;

        self.cache.invalidate_room(id);
        info!("removed {}", id);

        Ok(room)
    }

    pub fn add_door(
        &mut self,
        room: RoomId,
        position_in_room: Cell,
        connected_room: RoomId,
        connected_position: Cell,
    ) -> Result<DoorId, NavigationError> {
        let id = self.grid.add_door(room, position_in_room, connected_room, connected_position)?;

        self.cache.invalidate_cross_room();

        Ok(id)
    }

    pub fn connect_rooms(&mut self, a: RoomId, a_position: Cell, b: RoomId, b_position: Cell) -> Result<(DoorId, DoorId), NavigationError> {
        let ids = self.grid.connect_rooms(a, a_position, b, b_position)?;

        self.cache.invalidate_cross_room();

        Ok(ids)
    }

    /// Opens or closes a door and its pair. Closing invalidates cached paths
    /// through the door; opening invalidates every cross-room path.
    pub fn set_door_open(&mut self, id: DoorId, open: bool) -> Result<(), NavigationError> {
        let changed = self.grid.set_door_open(id, open)?;

        if changed.is_empty() {
            return Ok(());
        }

        debug!("door {:?} is now {}", id, if open { "open" } else { "closed" });

        if open {
            self.cache.invalidate_cross_room();
        } else {
            for door in changed {
                self.cache.invalidate_door(door);
            }
        }

        Ok(())
    }

    pub fn update_tile(&mut self, room: RoomId, x: i32, y: i32, tile_type: TileType) -> Result<(), NavigationError> {
        let change = self.grid.update_tile(room, x, y, tile_type)?;
        self.publish(&change);

        Ok(())
    }

    pub fn set_occupant(&mut self, position: GridPosition, occupant: Option<AgentId>) -> Result<(), NavigationError> {
        let change = self.grid.set_occupant(position, occupant)?;
        self.publish(&change);

        Ok(())
    }

    /// Reports a tile mutated outside the grid's own operations.
    pub fn notify_tile_changed(&mut self, room: RoomId, cell_index: usize) -> Result<(), NavigationError> {
        let change = self.grid.touch_tile(room, cell_index)?;
        self.publish(&change);

        Ok(())
    }

    pub fn subscribe_tile_changes<L>(&mut self, listener: L) -> SubscriptionId
    where
        L: TileChangeListener + 'static,
    {
        self.listeners.subscribe(Box::new(listener))
    }

    pub fn unsubscribe_tile_changes(&mut self, id: SubscriptionId) -> bool {
        self.listeners.unsubscribe(id)
    }

    fn publish(&mut self, change: &TileChange) {
        self.cache.on_tile_changed(change);
        self.listeners.publish(change);
    }

    //
    // Agent-facing API.
    //

    /// Queues a path request. Both rooms must be registered; everything else
    /// that can go wrong is reported through the request's result. The start
    /// time defaults to the current reservation step; a request left waiting
    /// for a later tick departs at the step it is planned at instead, reported
    /// in `PathResult::start_time`.
    pub fn submit_path_request(
        &mut self,
        agent: AgentProfile,
        start: GridPosition,
        goal: GridPosition,
        provider: Arc<dyn CostProvider>,
    ) -> Result<PathRequestBuilder<'_>, NavigationError> {
        for room in [start.room, goal.room] {
            if !self.grid.contains_room(room) {
                return Err(NavigationError::InvalidRoomReference(room));
            }
        }

        let mut query = PathQuery::new(agent, start, goal, provider);
        query.start_time = self.reservations.current_time();

        Ok(self.scheduler.submit(query))
    }

    pub fn cancel_request(&mut self, id: RequestId) -> bool {
        self.scheduler.cancel(id)
    }

    /// Plans immediately, bypassing the queue.
    pub fn find_path_now(&mut self, query: &PathQuery) -> Resolution {
        self.pathfinder.find_path(&self.grid, &mut self.cache, Some(&self.reservations), query)
    }

    /// Claims `path[i]` at `start_step + i` for `agent`, all or nothing.
    pub fn reserve_path(&mut self, agent: AgentId, path: &[GridPosition], start_step: u64) -> Result<usize, ReservationError> {
        self.reservations.reserve_sequence(path, start_step, agent)
    }

    pub fn release_reservations(&mut self, agent: AgentId) -> usize {
        self.reservations.release_all(agent)
    }

    /// Resolves this tick's share of queued requests, then advances the
    /// reservation window by one step. Returns the number of requests resolved.
    pub fn tick(&mut self) -> usize {
        let processed = self
            .scheduler
            .process_tick(&mut self.pathfinder, &self.grid, &mut self.cache, Some(&self.reservations));

        self.reservations.advance_time();

        processed
    }

    #[cfg(feature = "parallel")]
    pub fn tick_parallel(&mut self) -> usize {
        let processed = self.scheduler.process_tick_parallel(
            &mut self.pathfinder,
            &self.grid,
            &mut self.cache,
            Some(&self.reservations),
        );

        self.reservations.advance_time();

        processed
    }
}
