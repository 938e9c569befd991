use crate::location::*;
use crate::tile::*;
use crate::traits::*;

/// What happened to a tile.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum TileChangeKind {
    /// The terrain type (and the properties derived from it) changed.
    Retyped(TileType),
    /// The occupant changed.
    Occupancy(Option<AgentId>),
    /// The map layer reported an out-of-band mutation.
    Touched,
}

/// Notification emitted for every tile mutation.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TileChange {
    pub room: RoomId,
    pub cell: Cell,
    pub index: usize,
    pub version: u32,
    pub kind: TileChangeKind,
}

impl TileChange {
    pub fn position(&self) -> GridPosition {
        GridPosition::new(self.room, self.cell)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u32);

/// Typed callback registry for tile changes. The grid never holds listeners
/// itself; whoever owns the grid publishes the changes it returns.
#[derive(Default)]
pub struct TileChangeBus {
    next_id: u32,
    listeners: Vec<(SubscriptionId, Box<dyn TileChangeListener>)>,
}

impl TileChangeBus {
    pub fn new() -> TileChangeBus {
        TileChangeBus::default()
    }

    pub fn subscribe(&mut self, listener: Box<dyn TileChangeListener>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;

        self.listeners.push((id, listener));

        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();

        self.listeners.retain(|(listener_id, _)| *listener_id != id);

        self.listeners.len() != before
    }

    pub fn publish(&mut self, change: &TileChange) {
        for (_, listener) in self.listeners.iter_mut() {
            listener.on_tile_changed(change);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}
