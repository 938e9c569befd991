use crate::costprovider::*;
use crate::location::*;
use crate::pathfinder::*;
use crate::pathresult::*;
use crate::pool::*;
use crate::reservationtable::*;
use crate::room::*;
use crate::traits::*;
use crate::utility::*;
use log::{trace, warn};
use ordered_float::OrderedFloat;
use std::collections::BTreeSet;
use std::collections::HashMap;

const CARDINAL_MOVES: [(i32, i32); 4] = [(0, -1), (1, 0), (0, 1), (-1, 0)];

const ALL_MOVES: [(i32, i32); 8] = [(0, -1), (1, -1), (1, 0), (1, 1), (0, 1), (-1, 1), (-1, 0), (-1, -1)];

/// Everything a search needs besides the room and the endpoints.
#[derive(Copy, Clone)]
pub struct SearchContext<'a> {
    pub provider: &'a dyn CostProvider,
    pub agent: &'a AgentProfile,
    /// When set, cells reserved by other agents at the step the search would
    /// reach them are treated as blocked. Every move advances one step.
    pub reservations: Option<&'a ReservationTable>,
    /// Reservation step at which the agent stands on the start cell.
    pub start_time: u64,
}

/// Result of a successful tile-level search. `cells` includes both ends.
#[derive(Clone, Debug, PartialEq)]
pub struct LocalPath {
    pub cells: Vec<Cell>,
    pub cost: f32,
    pub expanded: usize,
}

#[derive(Default)]
struct SearchNode {
    cell: Cell,
    g: f32,
    h: f32,
    /// Moves from the start along the current parent chain.
    step: u64,
    parent: Option<usize>,
    closed: bool,
}

impl Poolable for SearchNode {
    fn reset(&mut self) {
        *self = SearchNode::default();
    }
}

/// Open-set ordering: lowest `f`, then lowest `h` (closest to the goal), then
/// row-major cell order so identical inputs always expand identically.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct OpenKey {
    f: OrderedFloat<f32>,
    h: OrderedFloat<f32>,
    cell: Cell,
}

/// Reusable tile-level A* search. Node storage, the position index and the
/// open set are kept between searches so repeated planning does not allocate
/// once warmed up.
#[derive(Default)]
pub struct LocalSearch {
    nodes: Arena<SearchNode>,
    index: HashMap<Cell, usize>,
    open: BTreeSet<OpenKey>,
    searches: u64,
    expanded_total: u64,
}

impl LocalSearch {
    pub fn new() -> LocalSearch {
        LocalSearch::default()
    }

    /// Number of searches run so far.
    pub fn searches(&self) -> u64 {
        self.searches
    }

    /// Total nodes expanded over all searches.
    pub fn expanded_total(&self) -> u64 {
        self.expanded_total
    }

    fn reset(&mut self) {
        self.nodes.clear();
        self.index.clear();
        self.open.clear();
    }

    fn passable(room: &Room, cell: Cell, ctx: &SearchContext) -> Option<f32> {
        room.tile(cell).and_then(|tile| ctx.provider.cost(tile, ctx.agent))
    }

    fn estimate(cell: Cell, goal: Cell, ctx: &SearchContext, options: &PathfinderOptions) -> f32 {
        match options.heuristic {
            Some(heuristic) => heuristic.distance(cell, goal),
            None => ctx.provider.heuristic(cell, goal),
        }
    }

    /// Shortest path from `start` to `goal` inside `room`.
    pub fn find(
        &mut self,
        room: &Room,
        start: Cell,
        goal: Cell,
        ctx: &SearchContext,
        options: &PathfinderOptions,
    ) -> Result<LocalPath, PathFailure> {
        self.searches += 1;
        self.reset();

        let room_id = room.id();
        let failure = PathFailure::SegmentNotFound {
            from: GridPosition::new(room_id, start),
            to: GridPosition::new(room_id, goal),
        };

        if !room.contains(start) {
            return Err(PathFailure::OutOfBounds(GridPosition::new(room_id, start)));
        }
        if !room.contains(goal) {
            return Err(PathFailure::OutOfBounds(GridPosition::new(room_id, goal)));
        }

        if start == goal {
            return Ok(LocalPath {
                cells: vec![start],
                cost: 0.0,
                expanded: 0,
            });
        }

        if Self::passable(room, goal, ctx).is_none() {
            trace!("goal {} of {} is impassable", goal, room_id);
            return Err(failure);
        }

        let moves: &[(i32, i32)] = match options.connectivity {
            Connectivity::Four => &CARDINAL_MOVES,
            Connectivity::Eight => &ALL_MOVES,
        };

        let start_h = Self::estimate(start, goal, ctx, options);
        let start_index = self.nodes.alloc();
        {
            let node = self.nodes.get_mut(start_index);
            node.cell = start;
            node.g = 0.0;
            node.h = start_h;
            node.step = 0;
        }
        self.index.insert(start, start_index);
        self.open.insert(OpenKey {
            f: OrderedFloat(start_h),
            h: OrderedFloat(start_h),
            cell: start,
        });

        let mut expanded = 0;

        while let Some(current) = self.open.pop_first() {
            let current_index = self.index[&current.cell];

            if current.cell == goal {
                self.expanded_total += expanded as u64;
                return Ok(self.reconstruct(current_index, expanded));
            }

            expanded += 1;
            if expanded > options.max_search_nodes {
                self.expanded_total += expanded as u64;
                warn!(
                    "search from {} to {} in {} exceeded node budget of {}",
                    start, goal, room_id, options.max_search_nodes
                );
                return Err(PathFailure::SearchBudgetExceeded { expanded });
            }

            let (current_g, current_step) = {
                let node = self.nodes.get_mut(current_index);
                node.closed = true;
                (node.g, node.step)
            };
            let next_step = current_step + 1;

            for &(dx, dy) in moves {
                let neighbor = current.cell.offset(dx, dy);

                let Some(step_cost) = Self::passable(room, neighbor, ctx) else {
                    continue;
                };

                let diagonal = dx != 0 && dy != 0;

                if diagonal
                    && !options.allow_corner_cutting
                    && (Self::passable(room, current.cell.offset(dx, 0), ctx).is_none()
                        || Self::passable(room, current.cell.offset(0, dy), ctx).is_none())
                {
                    continue;
                }

                let multiplier = if diagonal { DIAGONAL_COST } else { 1.0 };
                let tentative_g = current_g + step_cost * multiplier;

                if let Some(reservations) = ctx.reservations {
                    let time_step = ctx.start_time + next_step;
                    if reservations.is_reserved_by_other(GridPosition::new(room_id, neighbor), time_step, ctx.agent.id) {
                        continue;
                    }
                }

                match self.index.get(&neighbor).copied() {
                    Some(neighbor_index) => {
                        let node = self.nodes.get_mut(neighbor_index);
                        if tentative_g >= node.g {
                            continue;
                        }

                        if !node.closed {
                            self.open.remove(&OpenKey {
                                f: OrderedFloat(node.g + node.h),
                                h: OrderedFloat(node.h),
                                cell: neighbor,
                            });
                        }

                        node.g = tentative_g;
                        node.step = next_step;
                        node.parent = Some(current_index);
                        node.closed = false;

                        self.open.insert(OpenKey {
                            f: OrderedFloat(tentative_g + node.h),
                            h: OrderedFloat(node.h),
                            cell: neighbor,
                        });
                    }
                    None => {
                        let h = Self::estimate(neighbor, goal, ctx, options);
                        let neighbor_index = self.nodes.alloc();
                        {
                            let node = self.nodes.get_mut(neighbor_index);
                            node.cell = neighbor;
                            node.g = tentative_g;
                            node.h = h;
                            node.step = next_step;
                            node.parent = Some(current_index);
                        }
                        self.index.insert(neighbor, neighbor_index);

                        self.open.insert(OpenKey {
                            f: OrderedFloat(tentative_g + h),
                            h: OrderedFloat(h),
                            cell: neighbor,
                        });
                    }
                }
            }
        }

        self.expanded_total += expanded as u64;
        trace!("open set exhausted between {} and {} in {} after {} expansions", start, goal, room_id, expanded);

        Err(failure)
    }

    fn reconstruct(&self, goal_index: usize, expanded: usize) -> LocalPath {
        let cost = self.nodes.get(goal_index).g;

        let mut cells = Vec::new();
        let mut cursor = Some(goal_index);

        while let Some(index) = cursor {
            let node = self.nodes.get(index);
            cells.push(node.cell);
            cursor = node.parent;
        }

        cells.reverse();

        LocalPath { cells, cost, expanded }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::*;
    use rand::rngs::StdRng;
    use rand::Rng;
    use rand::SeedableRng;

    fn options(connectivity: Connectivity) -> PathfinderOptions {
        PathfinderOptions {
            connectivity,
            ..Default::default()
        }
    }

    fn open_room(width: u32, height: u32) -> Room {
        Room::new(RoomId(1), width, height, Cell::new(0, 0), TileType::Floor).unwrap()
    }

    fn run(room: &Room, start: Cell, goal: Cell, provider: &dyn CostProvider, opts: &PathfinderOptions) -> Result<LocalPath, PathFailure> {
        let agent = AgentProfile::new(AgentId(1));
        let ctx = SearchContext {
            provider,
            agent: &agent,
            reservations: None,
            start_time: 0,
        };
        LocalSearch::new().find(room, start, goal, &ctx, opts)
    }

    /// Repeated relaxation over every cell until nothing improves, using the
    /// same movement rules as the search.
    fn brute_force_cost(room: &Room, start: Cell, goal: Cell, provider: &dyn CostProvider, opts: &PathfinderOptions) -> Option<f32> {
        let agent = AgentProfile::new(AgentId(1));
        let cost_of = |c: Cell| room.tile(c).and_then(|t| provider.cost(t, &agent));
        let moves: &[(i32, i32)] = match opts.connectivity {
            Connectivity::Four => &CARDINAL_MOVES,
            Connectivity::Eight => &ALL_MOVES,
        };

        let mut best: HashMap<Cell, f32> = HashMap::new();
        best.insert(start, 0.0);

        loop {
            let mut changed = false;
            let snapshot: Vec<(Cell, f32)> = best.iter().map(|(c, g)| (*c, *g)).collect();

            for (cell, g) in snapshot {
                for &(dx, dy) in moves {
                    let next = cell.offset(dx, dy);
                    let Some(step) = cost_of(next) else { continue };
                    let diagonal = dx != 0 && dy != 0;
                    if diagonal
                        && !opts.allow_corner_cutting
                        && (cost_of(cell.offset(dx, 0)).is_none() || cost_of(cell.offset(0, dy)).is_none())
                    {
                        continue;
                    }
                    let candidate = g + step * if diagonal { DIAGONAL_COST } else { 1.0 };
                    let entry = best.entry(next).or_insert(f32::INFINITY);
                    if candidate + 1e-4 < *entry {
                        *entry = candidate;
                        changed = true;
                    }
                }
            }

            if !changed {
                break;
            }
        }

        best.get(&goal).copied().filter(|c| c.is_finite())
    }

    fn random_room(rng: &mut StdRng, size: u32, start: Cell) -> Room {
        let kinds = [TileType::Floor, TileType::Floor, TileType::Grass, TileType::Mud, TileType::Swamp, TileType::Wall];
        let mut tiles: Vec<Tile> = (0..size * size)
            .map(|_| Tile::new(kinds[rng.gen_range(0..kinds.len())]))
            .collect();
        tiles[(start.y as u32 * size + start.x as u32) as usize] = Tile::new(TileType::Floor);
        Room::from_tiles(RoomId(1), size, size, Cell::new(0, 0), tiles).unwrap()
    }

    #[test]
    fn open_room_diagonal_scenario() {
        let room = open_room(20, 20);
        let opts = options(Connectivity::Eight);
        let provider = BaseCostProvider::new(Connectivity::Eight);

        let path = run(&room, Cell::new(0, 0), Cell::new(19, 19), &provider, &opts).unwrap();

        assert_eq!(path.cells.len() - 1, 19);
        assert!((path.cost - 19.0 * DIAGONAL_COST).abs() < 1e-3);
        assert_eq!(path.cells.first(), Some(&Cell::new(0, 0)));
        assert_eq!(path.cells.last(), Some(&Cell::new(19, 19)));
    }

    #[test]
    fn matches_brute_force_on_random_rooms() {
        let mut rng = StdRng::seed_from_u64(7);

        for connectivity in [Connectivity::Four, Connectivity::Eight] {
            let opts = options(connectivity);
            let provider = TerrainCostProvider::new(TerrainCostOptions {
                connectivity,
                ..Default::default()
            });

            for _ in 0..25 {
                let start = Cell::new(rng.gen_range(0..7), rng.gen_range(0..7));
                let goal = Cell::new(rng.gen_range(0..7), rng.gen_range(0..7));
                let room = random_room(&mut rng, 7, start);

                let searched = run(&room, start, goal, &provider, &opts);
                let expected = brute_force_cost(&room, start, goal, &provider, &opts);

                match (searched, expected) {
                    (Ok(path), Some(cost)) => assert!((path.cost - cost).abs() < 1e-3, "{} vs {}", path.cost, cost),
                    (Err(_), None) => {}
                    (Ok(path), None) => panic!("search found {:?} where none exists", path.cells),
                    (Err(failure), Some(cost)) => panic!("search failed with {:?}, expected cost {}", failure, cost),
                }
            }
        }
    }

    #[test]
    fn walls_force_detour_and_block_corners() {
        let room = Room::from_ascii(
            RoomId(1),
            Cell::new(0, 0),
            "
            ...
            .#.
            ...
            ",
        )
        .unwrap();
        let opts = options(Connectivity::Eight);
        let provider = BaseCostProvider::default();

        let path = run(&room, Cell::new(0, 1), Cell::new(2, 1), &provider, &opts).unwrap();
        assert_eq!(path.cells.len(), 5);
        assert!((path.cost - (2.0 + 2.0 * DIAGONAL_COST)).abs() > 1e-3);
        assert!((path.cost - 4.0).abs() < 1e-3);
    }

    #[test]
    fn unreachable_goal_reports_segment_failure() {
        let room = Room::from_ascii(
            RoomId(1),
            Cell::new(0, 0),
            "
            .#.
            .#.
            .#.
            ",
        )
        .unwrap();
        let opts = options(Connectivity::Eight);

        let result = run(&room, Cell::new(0, 0), Cell::new(2, 2), &BaseCostProvider::default(), &opts);
        assert!(matches!(result, Err(PathFailure::SegmentNotFound { .. })));

        let result = run(&room, Cell::new(0, 0), Cell::new(5, 5), &BaseCostProvider::default(), &opts);
        assert!(matches!(result, Err(PathFailure::OutOfBounds(_))));
    }

    #[test]
    fn node_budget_is_enforced() {
        let room = open_room(30, 30);
        let opts = PathfinderOptions {
            max_search_nodes: 5,
            ..Default::default()
        };
        let provider = BaseCostProvider::with_heuristic(Heuristic::Zero, 1.0);

        let result = run(&room, Cell::new(0, 0), Cell::new(29, 29), &provider, &opts);
        assert_eq!(result, Err(PathFailure::SearchBudgetExceeded { expanded: 6 }));
    }

    #[test]
    fn identical_inputs_give_identical_paths() {
        let room = open_room(12, 12);
        let opts = options(Connectivity::Four);
        let provider = BaseCostProvider::new(Connectivity::Four);
        let agent = AgentProfile::new(AgentId(1));
        let ctx = SearchContext {
            provider: &provider,
            agent: &agent,
            reservations: None,
            start_time: 0,
        };

        let mut search = LocalSearch::new();
        let first = search.find(&room, Cell::new(1, 1), Cell::new(10, 7), &ctx, &opts).unwrap();
        let second = search.find(&room, Cell::new(1, 1), Cell::new(10, 7), &ctx, &opts).unwrap();

        assert_eq!(first, second);
        assert_eq!(search.searches(), 2);
    }

    #[test]
    fn reserved_cells_are_routed_around() {
        let room = open_room(5, 3);
        let opts = options(Connectivity::Four);
        let provider = BaseCostProvider::new(Connectivity::Four);
        let agent = AgentProfile::new(AgentId(1));

        let mut table = ReservationTable::new(ReservationOptions {
            horizon: 16,
            parking_steps: 0,
        });
        table.reserve(GridPosition::new(RoomId(1), Cell::new(2, 1)), 2, AgentId(2)).unwrap();

        let ctx = SearchContext {
            provider: &provider,
            agent: &agent,
            reservations: Some(&table),
            start_time: 0,
        };

        let path = LocalSearch::new().find(&room, Cell::new(0, 1), Cell::new(4, 1), &ctx, &opts).unwrap();
        assert_ne!(path.cells.get(2), Some(&Cell::new(2, 1)));
        assert_eq!(path.cells.len(), 7);

        // Same reservation at a step the search does not reach the cell is harmless.
        let ctx = SearchContext { start_time: 5, ..ctx };
        let path = LocalSearch::new().find(&room, Cell::new(0, 1), Cell::new(4, 1), &ctx, &opts).unwrap();
        assert_eq!(path.cells.len(), 5);
    }

    #[test]
    fn reservations_are_checked_one_step_per_move() {
        let agent = AgentProfile::new(AgentId(1));
        let mut table = ReservationTable::new(ReservationOptions {
            horizon: 16,
            parking_steps: 0,
        });
        let at = |x, y| GridPosition::new(RoomId(1), Cell::new(x, y));

        table.reserve(at(2, 2), 2, AgentId(2)).unwrap();
        table.reserve(at(2, 1), 2, AgentId(2)).unwrap();

        // Diagonal moves cost more than one unit but still take a single step.
        let provider = BaseCostProvider::default();
        let ctx = SearchContext {
            provider: &provider,
            agent: &agent,
            reservations: Some(&table),
            start_time: 0,
        };
        let path = LocalSearch::new()
            .find(&open_room(5, 5), Cell::new(0, 0), Cell::new(4, 4), &ctx, &options(Connectivity::Eight))
            .unwrap();
        for (step, cell) in path.cells.iter().enumerate() {
            assert!(!table.is_reserved_by_other(at(cell.x, cell.y), step as u64, agent.id), "{} at step {}", cell, step);
        }

        // Expensive terrain does not stretch time either.
        let mud = Room::new(RoomId(1), 5, 3, Cell::new(0, 0), TileType::Mud).unwrap();
        let provider = TerrainCostProvider::new(TerrainCostOptions {
            connectivity: Connectivity::Four,
            ..Default::default()
        });
        let ctx = SearchContext {
            provider: &provider,
            ..ctx
        };
        let path = LocalSearch::new()
            .find(&mud, Cell::new(0, 1), Cell::new(4, 1), &ctx, &options(Connectivity::Four))
            .unwrap();
        assert_ne!(path.cells.get(2), Some(&Cell::new(2, 1)));
        for (step, cell) in path.cells.iter().enumerate() {
            assert!(!table.is_reserved_by_other(at(cell.x, cell.y), step as u64, agent.id), "{} at step {}", cell, step);
        }
    }
}
