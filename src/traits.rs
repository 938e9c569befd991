use crate::costprovider::*;
use crate::events::*;
use crate::location::*;
use crate::tile::*;
use std::borrow::Cow;

/// Abstraction over traversal cost rules. Implementations turn a tile and the
/// requesting agent's capabilities into a cost, and estimate the remaining
/// cost between two cells.
///
/// For the tile-level search to return optimal paths the heuristic must be
/// admissible: it may never exceed the true cost between the two cells.
pub trait CostProvider: Send + Sync {
    /// Cost of entering `tile`, or `None` when the agent cannot stand there.
    fn cost(&self, tile: &Tile, agent: &AgentProfile) -> Option<f32>;

    /// Estimated cost of moving from `from` to `to` inside one room.
    fn heuristic(&self, from: Cell, to: Cell) -> f32;

    fn is_traversable(&self, tile: &Tile, agent: &AgentProfile) -> bool {
        self.cost(tile, agent).is_some()
    }

    /// Identity used to key cached paths. Providers whose costs depend on
    /// parameters should fold those parameters in.
    fn identity(&self) -> Cow<'static, str> {
        Cow::Borrowed(std::any::type_name::<Self>())
    }
}

/// Receiver of tile-changed notifications. The path cache implements this;
/// closures can be registered on a `TileChangeBus` directly.
pub trait TileChangeListener {
    fn on_tile_changed(&mut self, change: &TileChange);
}

impl<F> TileChangeListener for F
where
    F: FnMut(&TileChange),
{
    fn on_tile_changed(&mut self, change: &TileChange) {
        self(change)
    }
}
