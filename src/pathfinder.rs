use crate::costprovider::*;
use crate::grid::*;
use crate::localsearch::*;
use crate::location::*;
use crate::pathcache::*;
use crate::pathrequest::*;
use crate::pathresult::*;
use crate::reservationtable::*;
use crate::room::*;
use crate::roomsearch::*;
use crate::traits::*;
use log::{debug, trace};
use serde::*;
use std::sync::Arc;

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathfinderOptions {
    pub connectivity: Connectivity,
    /// Replaces the provider's heuristic when set.
    pub heuristic: Option<Heuristic>,
    pub allow_corner_cutting: bool,
    /// Multiplier applied to the room-graph edge of a closed door.
    pub closed_door_penalty: f32,
    /// Plan around reservations held by other agents. Cooperative paths
    /// depend on the reservation state and are never cached. Waypoint `i` of a
    /// plan is checked at `start_time + i`, the step `reserve_path` claims it at.
    pub cooperative: bool,
    /// Expansion budget of each tile-level search.
    pub max_search_nodes: usize,
}

impl Default for PathfinderOptions {
    fn default() -> Self {
        PathfinderOptions {
            connectivity: Connectivity::Eight,
            heuristic: None,
            allow_corner_cutting: false,
            closed_door_penalty: 10.0,
            cooperative: false,
            max_search_nodes: 10_000,
        }
    }
}

impl PathfinderOptions {
    pub fn connectivity(mut self, connectivity: Connectivity) -> Self {
        self.connectivity = connectivity;
        self
    }

    pub fn heuristic(mut self, heuristic: Heuristic) -> Self {
        self.heuristic = Some(heuristic);
        self
    }

    pub fn cooperative(mut self, cooperative: bool) -> Self {
        self.cooperative = cooperative;
        self
    }

    pub fn max_search_nodes(mut self, max_search_nodes: usize) -> Self {
        self.max_search_nodes = max_search_nodes;
        self
    }

    /// The reservation table a search should respect, if any.
    pub fn effective_reservations<'a>(&self, reservations: Option<&'a ReservationTable>) -> Option<&'a ReservationTable> {
        if self.cooperative {
            reservations
        } else {
            None
        }
    }
}

/// Counters over the lifetime of a pathfinder.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SearchStats {
    /// Hierarchical plans actually computed.
    pub searches: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub failures: u64,
}

/// Outcome of `HierarchicalPathfinder::find_path`.
#[derive(Clone, Debug)]
pub struct Resolution {
    pub outcome: PathOutcome,
    pub cache_hit: bool,
}

/// Two-tier planner: a route over the room graph, then tile-level searches
/// for each room segment stitched together at doors.
#[derive(Default)]
pub struct HierarchicalPathfinder {
    options: PathfinderOptions,
    search: LocalSearch,
    stats: SearchStats,
}

impl HierarchicalPathfinder {
    pub fn new(options: PathfinderOptions) -> HierarchicalPathfinder {
        HierarchicalPathfinder {
            options,
            search: LocalSearch::new(),
            stats: SearchStats::default(),
        }
    }

    pub fn options(&self) -> &PathfinderOptions {
        &self.options
    }

    pub fn stats(&self) -> SearchStats {
        self.stats
    }

    pub fn local_search(&self) -> &LocalSearch {
        &self.search
    }

    /// Cache lookup half of `find_path`. Returns `None` without touching the
    /// cache when the search will be cooperative.
    pub(crate) fn lookup(
        &mut self,
        grid: &GridManager,
        cache: &mut PathCache,
        reservations: Option<&ReservationTable>,
        query: &PathQuery,
    ) -> Option<Arc<Path>> {
        if self.options.effective_reservations(reservations).is_some() {
            return None;
        }

        match cache.get(&PathCacheKey::for_query(query), grid) {
            Some(path) => {
                debug!("cache hit for {} -> {}", query.start, query.goal);
                self.stats.cache_hits += 1;
                Some(path)
            }
            None => {
                self.stats.cache_misses += 1;
                None
            }
        }
    }

    /// Records a freshly computed plan and caches it when allowed.
    pub(crate) fn record(
        &mut self,
        cache: &mut PathCache,
        reservations: Option<&ReservationTable>,
        query: &PathQuery,
        planned: Result<Path, PathFailure>,
    ) -> PathOutcome {
        self.stats.searches += 1;

        match planned {
            Ok(path) => {
                let path = Arc::new(path);
                if self.options.effective_reservations(reservations).is_none() {
                    cache.insert(PathCacheKey::for_query(query), path.clone());
                }
                PathOutcome::Found(path)
            }
            Err(failure) => {
                debug!("no path for {} from {} to {}: {:?}", query.agent.id, query.start, query.goal, failure);
                self.stats.failures += 1;
                PathOutcome::NotFound(failure)
            }
        }
    }

    pub fn find_path(
        &mut self,
        grid: &GridManager,
        cache: &mut PathCache,
        reservations: Option<&ReservationTable>,
        query: &PathQuery,
    ) -> Resolution {
        if let Some(path) = self.lookup(grid, cache, reservations, query) {
            return Resolution {
                outcome: PathOutcome::Found(path),
                cache_hit: true,
            };
        }

        let effective = self.options.effective_reservations(reservations);
        let planned = plan_path(&mut self.search, grid, effective, query, &self.options);

        Resolution {
            outcome: self.record(cache, reservations, query, planned),
            cache_hit: false,
        }
    }
}

/// Accumulates waypoints along with their tile index and version.
struct Assembly<'g> {
    grid: &'g GridManager,
    waypoints: Vec<GridPosition>,
    tile_indices: Vec<usize>,
    tile_versions: Vec<u32>,
    doors: Vec<DoorId>,
    cost: f32,
}

impl<'g> Assembly<'g> {
    fn new(grid: &'g GridManager) -> Assembly<'g> {
        Assembly {
            grid,
            waypoints: Vec::new(),
            tile_indices: Vec::new(),
            tile_versions: Vec::new(),
            doors: Vec::new(),
            cost: 0.0,
        }
    }

    fn steps(&self) -> u64 {
        self.waypoints.len().saturating_sub(1) as u64
    }

    fn push(&mut self, position: GridPosition) -> Result<(), PathFailure> {
        if self.waypoints.last() == Some(&position) {
            return Ok(());
        }

        let room = self.grid.room(position.room).ok_or(PathFailure::OutOfBounds(position))?;
        let index = room.index_of(position.cell).ok_or(PathFailure::OutOfBounds(position))?;
        let version = room.tile_at(index).map(|t| t.version()).ok_or(PathFailure::OutOfBounds(position))?;

        self.waypoints.push(position);
        self.tile_indices.push(index);
        self.tile_versions.push(version);

        Ok(())
    }

    fn extend(&mut self, room: RoomId, segment: &LocalPath) -> Result<(), PathFailure> {
        for cell in segment.cells.iter() {
            self.push(GridPosition::new(room, *cell))?;
        }
        self.cost += segment.cost;

        Ok(())
    }

    fn finish(self) -> Path {
        Path {
            waypoints: self.waypoints,
            tile_indices: self.tile_indices,
            tile_versions: self.tile_versions,
            doors: self.doors,
            cost: self.cost,
        }
    }
}

/// A door picked for one room transition together with the segment leading to it.
struct Crossing {
    segment: LocalPath,
    door: DoorId,
    exit: GridPosition,
    cost: f32,
}

/// Computes a path without consulting any cache. `reservations` is used as
/// given; callers decide whether the search is cooperative.
pub fn plan_path(
    search: &mut LocalSearch,
    grid: &GridManager,
    reservations: Option<&ReservationTable>,
    query: &PathQuery,
    options: &PathfinderOptions,
) -> Result<Path, PathFailure> {
    let no_route = PathFailure::NoRoomRoute {
        from: query.start.room,
        to: query.goal.room,
    };

    let start_room = grid.room(query.start.room).ok_or(no_route.clone())?;
    let goal_room = grid.room(query.goal.room).ok_or(no_route.clone())?;

    if !start_room.contains(query.start.cell) {
        return Err(PathFailure::OutOfBounds(query.start));
    }
    if !goal_room.contains(query.goal.cell) {
        return Err(PathFailure::OutOfBounds(query.goal));
    }

    let provider: &dyn CostProvider = query.provider.as_ref();
    let agent = &query.agent;
    let context = move |start_time: u64| SearchContext {
        provider,
        agent,
        reservations,
        start_time,
    };

    let mut assembly = Assembly::new(grid);

    if query.start.room == query.goal.room {
        let segment = search.find(start_room, query.start.cell, query.goal.cell, &context(query.start_time), options)?;
        assembly.extend(start_room.id(), &segment)?;

        return Ok(assembly.finish());
    }

    let route = find_room_route(grid, query.start.room, query.goal.room, options.closed_door_penalty).ok_or(no_route.clone())?;

    trace!("room route for {}: {:?}", query.agent.id, route.rooms);

    let mut current = query.start.cell;

    for pair in route.rooms.windows(2) {
        let (from, to) = (pair[0], pair[1]);
        let room = grid.room(from).ok_or(no_route.clone())?;

        let mut doors: Vec<&Door> = room.open_doors_to(to).collect();
        doors.sort_by_key(|d| (current.range_to(d.position_in_room()), d.id()));

        let time = query.start_time + assembly.steps();
        let mut failure = PathFailure::DoorUnavailable { from, to };
        let mut crossing = None;

        for door in doors {
            let Some(cost) = grid.tile(door.exit()).and_then(|tile| provider.cost(tile, agent)) else {
                continue;
            };

            match search.find(room, current, door.position_in_room(), &context(time), options) {
                Ok(segment) => {
                    let arrival = time + segment.cells.len() as u64;
                    if reservations.map_or(false, |r| r.is_reserved_by_other(door.exit(), arrival, query.agent.id)) {
                        continue;
                    }

                    crossing = Some(Crossing {
                        segment,
                        door: door.id(),
                        exit: door.exit(),
                        cost,
                    });
                    break;
                }
                Err(segment_failure) => failure = segment_failure,
            }
        }

        let Some(crossing) = crossing else {
            return Err(failure);
        };

        assembly.extend(from, &crossing.segment)?;
        assembly.push(crossing.exit)?;
        assembly.cost += crossing.cost;
        assembly.doors.push(crossing.door);

        current = crossing.exit.cell;
    }

    let time = query.start_time + assembly.steps();
    let segment = search.find(goal_room, current, query.goal.cell, &context(time), options)?;
    assembly.extend(goal_room.id(), &segment)?;

    Ok(assembly.finish())
}
