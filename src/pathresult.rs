use crate::grid::*;
use crate::location::*;
use crate::pathrequest::*;
use crate::room::DoorId;
use std::sync::Arc;

/// An assembled route. Immutable once produced and shared between the cache
/// and every caller that received it.
#[derive(Clone, Debug, PartialEq)]
pub struct Path {
    pub(crate) waypoints: Vec<GridPosition>,
    pub(crate) tile_indices: Vec<usize>,
    pub(crate) tile_versions: Vec<u32>,
    pub(crate) doors: Vec<DoorId>,
    pub(crate) cost: f32,
}

impl Path {
    pub fn waypoints(&self) -> &[GridPosition] {
        &self.waypoints
    }

    /// Row-major index of every waypoint inside its own room.
    pub fn tile_indices(&self) -> &[usize] {
        &self.tile_indices
    }

    /// Doors crossed, in order.
    pub fn doors(&self) -> &[DoorId] {
        &self.doors
    }

    pub fn cost(&self) -> f32 {
        self.cost
    }

    /// Number of moves, one less than the number of waypoints.
    pub fn steps(&self) -> usize {
        self.waypoints.len().saturating_sub(1)
    }

    pub fn start(&self) -> Option<GridPosition> {
        self.waypoints.first().copied()
    }

    pub fn goal(&self) -> Option<GridPosition> {
        self.waypoints.last().copied()
    }

    /// Rooms visited, without repetition of consecutive entries.
    pub fn rooms(&self) -> Vec<RoomId> {
        let mut rooms: Vec<RoomId> = self.waypoints.iter().map(|w| w.room).collect();
        rooms.dedup();
        rooms
    }

    pub fn passes_through(&self, room: RoomId) -> bool {
        self.waypoints.iter().any(|w| w.room == room)
    }

    /// True when every tile on the path still has the version it had when the
    /// path was computed.
    pub fn is_current(&self, grid: &GridManager) -> bool {
        self.waypoints
            .iter()
            .zip(self.tile_indices.iter())
            .zip(self.tile_versions.iter())
            .all(|((waypoint, index), version)| {
                grid.room(waypoint.room)
                    .and_then(|room| room.tile_at(*index))
                    .map(|tile| tile.version() == *version)
                    .unwrap_or(false)
            })
    }

    /// World-space centres of the waypoints.
    pub fn world_waypoints(&self, grid: &GridManager) -> Vec<WorldPoint> {
        self.waypoints
            .iter()
            .filter_map(|w| grid.room(w.room).map(|room| room.world_point(w.cell)))
            .collect()
    }
}

/// Reason a request produced no path. Failures are always reported through
/// the result, never raised.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathFailure {
    /// The room graph has no route between the start and goal rooms.
    NoRoomRoute { from: RoomId, to: RoomId },
    /// A tile-level search exhausted its open set.
    SegmentNotFound { from: GridPosition, to: GridPosition },
    /// The room route needs a door between two rooms that is missing or closed.
    DoorUnavailable { from: RoomId, to: RoomId },
    /// A tile-level search expanded more nodes than allowed.
    SearchBudgetExceeded { expanded: usize },
    /// A start or goal cell lies outside its room.
    OutOfBounds(GridPosition),
}

#[derive(Clone, Debug, PartialEq)]
pub enum PathOutcome {
    Found(Arc<Path>),
    NotFound(PathFailure),
}

/// What a request's callback receives.
#[derive(Clone, Debug)]
pub struct PathResult {
    pub request: RequestId,
    pub requester: AgentId,
    pub outcome: PathOutcome,
    pub cache_hit: bool,
    /// Reservation step the agent departs at. Pass it to `reserve_path` so the
    /// claimed steps line up with the ones a cooperative plan avoided.
    pub start_time: u64,
}

impl PathResult {
    pub fn is_valid(&self) -> bool {
        matches!(self.outcome, PathOutcome::Found(_))
    }

    pub fn path(&self) -> Option<&Arc<Path>> {
        match &self.outcome {
            PathOutcome::Found(path) => Some(path),
            PathOutcome::NotFound(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&PathFailure> {
        match &self.outcome {
            PathOutcome::Found(_) => None,
            PathOutcome::NotFound(failure) => Some(failure),
        }
    }
}
