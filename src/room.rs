use crate::error::*;
use crate::location::*;
use crate::tile::*;
use serde::*;

/// Identifier of a single door record. Each side of a connection has its own.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DoorId(pub u32);

/// One side of an opening between two rooms. A connection is normally made of
/// two records, one held by each room, linked through `pair`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Door {
    pub(crate) id: DoorId,
    pub(crate) room: RoomId,
    pub(crate) position_in_room: Cell,
    pub(crate) connected_room: RoomId,
    pub(crate) connected_position: Cell,
    pub(crate) is_open: bool,
    pub(crate) pair: Option<DoorId>,
}

impl Door {
    pub fn id(&self) -> DoorId {
        self.id
    }

    pub fn room(&self) -> RoomId {
        self.room
    }

    pub fn position_in_room(&self) -> Cell {
        self.position_in_room
    }

    pub fn connected_room(&self) -> RoomId {
        self.connected_room
    }

    pub fn connected_position(&self) -> Cell {
        self.connected_position
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub fn pair(&self) -> Option<DoorId> {
        self.pair
    }

    pub fn entry(&self) -> GridPosition {
        GridPosition::new(self.room, self.position_in_room)
    }

    pub fn exit(&self) -> GridPosition {
        GridPosition::new(self.connected_room, self.connected_position)
    }
}

/// A rectangular partition of the world with its own dense tile array.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Room {
    id: RoomId,
    width: u32,
    height: u32,
    world_origin: Cell,
    tiles: Vec<Tile>,
    doors: Vec<Door>,
}

impl Room {
    /// Creates a room filled with `fill` tiles.
    pub fn new(id: RoomId, width: u32, height: u32, world_origin: Cell, fill: TileType) -> Result<Room, NavigationError> {
        if width == 0 || height == 0 {
            return Err(NavigationError::InvalidDimensions { room: id, width, height });
        }

        let tiles = vec![Tile::new(fill); width as usize * height as usize];

        Ok(Room {
            id,
            width,
            height,
            world_origin,
            tiles,
            doors: Vec::new(),
        })
    }

    /// Creates a room from a row-major tile vector.
    pub fn from_tiles(id: RoomId, width: u32, height: u32, world_origin: Cell, tiles: Vec<Tile>) -> Result<Room, NavigationError> {
        if width == 0 || height == 0 || tiles.len() != width as usize * height as usize {
            return Err(NavigationError::InvalidDimensions { room: id, width, height });
        }

        Ok(Room {
            id,
            width,
            height,
            world_origin,
            tiles,
            doors: Vec::new(),
        })
    }

    /// Parses a room from an ASCII layout, one line per row.
    ///
    /// `.` floor, `,` grass, `~` mud, `%` swamp, `w` water, `^` ramp, `#` wall.
    pub fn from_ascii(id: RoomId, world_origin: Cell, layout: &str) -> Result<Room, NavigationError> {
        let rows: Vec<&str> = layout.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
        let height = rows.len() as u32;
        let width = rows.first().map(|r| r.chars().count() as u32).unwrap_or(0);

        let mut tiles = Vec::with_capacity(width as usize * height as usize);

        for row in rows.iter() {
            if row.chars().count() as u32 != width {
                return Err(NavigationError::InvalidDimensions { room: id, width, height });
            }

            for c in row.chars() {
                let tile_type = match c {
                    '.' => TileType::Floor,
                    ',' => TileType::Grass,
                    '~' => TileType::Mud,
                    '%' => TileType::Swamp,
                    'w' => TileType::Water,
                    '^' => TileType::Ramp,
                    '#' => TileType::Wall,
                    other => return Err(NavigationError::InvalidLayout { room: id, symbol: other }),
                };
                tiles.push(Tile::new(tile_type));
            }
        }

        Room::from_tiles(id, width, height, world_origin, tiles)
    }

    pub fn id(&self) -> RoomId {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn world_origin(&self) -> Cell {
        self.world_origin
    }

    pub fn doors(&self) -> &[Door] {
        &self.doors
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn contains(&self, cell: Cell) -> bool {
        cell.x >= 0 && cell.y >= 0 && (cell.x as u32) < self.width && (cell.y as u32) < self.height
    }

    pub fn index_of(&self, cell: Cell) -> Option<usize> {
        if self.contains(cell) {
            Some(cell.y as usize * self.width as usize + cell.x as usize)
        } else {
            None
        }
    }

    pub fn cell_at(&self, index: usize) -> Option<Cell> {
        if index < self.tiles.len() {
            let width = self.width as usize;
            Some(Cell::new((index % width) as i32, (index / width) as i32))
        } else {
            None
        }
    }

    pub fn tile(&self, cell: Cell) -> Option<&Tile> {
        self.index_of(cell).map(|i| &self.tiles[i])
    }

    pub fn tile_at(&self, index: usize) -> Option<&Tile> {
        self.tiles.get(index)
    }

    pub(crate) fn tile_mut(&mut self, cell: Cell) -> Option<&mut Tile> {
        let index = self.index_of(cell)?;
        self.tiles.get_mut(index)
    }

    pub(crate) fn tile_at_mut(&mut self, index: usize) -> Option<&mut Tile> {
        self.tiles.get_mut(index)
    }

    pub(crate) fn doors_mut(&mut self) -> &mut Vec<Door> {
        &mut self.doors
    }

    /// World-space centre of the room rectangle.
    pub fn center(&self) -> WorldPoint {
        WorldPoint::new(
            self.world_origin.x as f32 + self.width as f32 / 2.0,
            self.world_origin.y as f32 + self.height as f32 / 2.0,
        )
    }

    /// World-space centre of one of this room's cells.
    pub fn world_point(&self, cell: Cell) -> WorldPoint {
        WorldPoint::new(
            (self.world_origin.x + cell.x) as f32 + 0.5,
            (self.world_origin.y + cell.y) as f32 + 0.5,
        )
    }

    /// Whether the world rectangles of two rooms share any cell.
    pub fn overlaps(&self, other: &Room) -> bool {
        let (ax0, ay0) = (self.world_origin.x as i64, self.world_origin.y as i64);
        let (ax1, ay1) = (ax0 + self.width as i64, ay0 + self.height as i64);
        let (bx0, by0) = (other.world_origin.x as i64, other.world_origin.y as i64);
        let (bx1, by1) = (bx0 + other.width as i64, by0 + other.height as i64);

        ax0 < bx1 && bx0 < ax1 && ay0 < by1 && by0 < ay1
    }

    /// Open doors of this room leading into `target`.
    pub fn open_doors_to(&self, target: RoomId) -> impl Iterator<Item = &Door> {
        self.doors
            .iter()
            .filter(move |d| d.connected_room == target && d.is_open)
    }
}
