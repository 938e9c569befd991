use crate::location::*;
use bitflags::bitflags;
use serde::*;

bitflags! {
    /// Terrain modifiers carried by a tile. Cost providers turn these into
    /// penalties or impassable verdicts depending on the agent.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct TileFlags: u8 {
        const MUD = 1 << 0;
        const POISON = 1 << 1;
        const WATER = 1 << 2;
        const ELEVATION = 1 << 3;
    }
}

/// Terrain category of a tile.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TileType {
    #[default]
    Floor,
    Grass,
    Mud,
    Swamp,
    Water,
    Ramp,
    Wall,
}

impl TileType {
    pub fn is_walkable(self) -> bool {
        !matches!(self, TileType::Wall)
    }

    pub fn base_cost(self) -> f32 {
        match self {
            TileType::Floor => 1.0,
            TileType::Grass => 1.0,
            TileType::Mud => 2.0,
            TileType::Swamp => 3.0,
            TileType::Water => 4.0,
            TileType::Ramp => 1.5,
            TileType::Wall => 1.0,
        }
    }

    pub fn default_flags(self) -> TileFlags {
        match self {
            TileType::Mud => TileFlags::MUD,
            TileType::Swamp => TileFlags::MUD | TileFlags::POISON,
            TileType::Water => TileFlags::WATER,
            TileType::Ramp => TileFlags::ELEVATION,
            TileType::Floor | TileType::Grass | TileType::Wall => TileFlags::empty(),
        }
    }
}

/// One grid cell.
///
/// `walkable` and `occupant` are independent: an occupied tile is still
/// nominally walkable, and callers that care about agents standing on a tile
/// must check the occupant separately.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tile {
    walkable: bool,
    base_cost: f32,
    tile_type: TileType,
    flags: TileFlags,
    version: u32,
    occupant: Option<AgentId>,
}

impl Default for Tile {
    fn default() -> Self {
        Tile::new(TileType::Floor)
    }
}

impl Tile {
    pub fn new(tile_type: TileType) -> Tile {
        Tile {
            walkable: tile_type.is_walkable(),
            base_cost: tile_type.base_cost(),
            tile_type,
            flags: tile_type.default_flags(),
            version: 0,
            occupant: None,
        }
    }

    /// Builds a tile with explicit properties instead of the type defaults.
    pub fn with_properties(tile_type: TileType, walkable: bool, base_cost: f32, flags: TileFlags) -> Tile {
        Tile {
            walkable,
            base_cost,
            tile_type,
            flags,
            version: 0,
            occupant: None,
        }
    }

    pub fn walkable(&self) -> bool {
        self.walkable
    }

    pub fn base_cost(&self) -> f32 {
        self.base_cost
    }

    pub fn tile_type(&self) -> TileType {
        self.tile_type
    }

    pub fn flags(&self) -> TileFlags {
        self.flags
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn occupant(&self) -> Option<AgentId> {
        self.occupant
    }

    /// True when the tile is held by an agent other than `agent`.
    pub fn is_occupied_by_other(&self, agent: AgentId) -> bool {
        self.occupant.map(|o| o != agent).unwrap_or(false)
    }

    pub(crate) fn set_type(&mut self, tile_type: TileType) {
        self.tile_type = tile_type;
        self.walkable = tile_type.is_walkable();
        self.base_cost = tile_type.base_cost();
        self.flags = tile_type.default_flags();
        self.touch();
    }

    pub(crate) fn set_occupant(&mut self, occupant: Option<AgentId>) {
        self.occupant = occupant;
        self.touch();
    }

    pub(crate) fn touch(&mut self) {
        self.version = self.version.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retyping_bumps_version_and_rederives_properties() {
        let mut tile = Tile::new(TileType::Floor);
        assert!(tile.walkable());
        assert_eq!(tile.version(), 0);

        tile.set_type(TileType::Wall);
        assert!(!tile.walkable());
        assert_eq!(tile.version(), 1);

        tile.set_type(TileType::Swamp);
        assert!(tile.walkable());
        assert!(tile.flags().contains(TileFlags::MUD | TileFlags::POISON));
        assert_eq!(tile.base_cost(), 3.0);
        assert_eq!(tile.version(), 2);
    }

    #[test]
    fn occupancy_is_independent_of_walkability() {
        let mut tile = Tile::new(TileType::Grass);
        tile.set_occupant(Some(AgentId(4)));

        assert!(tile.walkable());
        assert!(tile.is_occupied_by_other(AgentId(1)));
        assert!(!tile.is_occupied_by_other(AgentId(4)));
        assert_eq!(tile.version(), 1);
    }
}
