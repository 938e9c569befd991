use crate::error::*;
use crate::events::*;
use crate::location::*;
use crate::room::*;
use crate::tile::*;
use log::info;
use std::collections::BTreeMap;
use std::collections::HashMap;

/// Registry of rooms and doors. The only place tiles are mutated; every
/// mutation bumps the tile version and returns the `TileChange` to publish.
#[derive(Default)]
pub struct GridManager {
    rooms: BTreeMap<RoomId, Room>,
    doors: HashMap<DoorId, RoomId>,
    next_door_id: u32,
}

impl GridManager {
    pub fn new() -> GridManager {
        GridManager::default()
    }

    pub fn add_room(&mut self, room: Room) -> Result<(), NavigationError> {
        let id = room.id();

        if self.rooms.contains_key(&id) {
            return Err(NavigationError::DuplicateRoom(id));
        }

        if let Some(existing) = self.rooms.values().find(|r| r.overlaps(&room)) {
            return Err(NavigationError::OverlappingRoom {
                room: id,
                existing: existing.id(),
            });
        }

        if !room.doors().is_empty() {
            // Doors must go through `add_door` so targets are validated.
            return Err(NavigationError::DanglingDoor {
                room: id,
                target: room.doors()[0].connected_room(),
            });
        }

        info!("registered {} ({}x{} at {})", id, room.width(), room.height(), room.world_origin());

        self.rooms.insert(id, room);

        Ok(())
    }

    /// Tears a room down together with every door leading into it.
    pub fn remove_room(&mut self, id: RoomId) -> Result<Room, NavigationError> {
        let room = self.rooms.remove(&id).ok_or(NavigationError::InvalidRoomReference(id))?;

        for door in room.doors() {
            self.doors.remove(&door.id());
        }

        for other in self.rooms.values_mut() {
            let doors = &mut self.doors;
            other.doors_mut().retain(|d| {
                let keep = d.connected_room() != id;
                if !keep {
                    doors.remove(&d.id());
                }
                keep
            });
        }

        Ok(room)
    }

    pub fn room(&self, id: RoomId) -> Option<&Room> {
        self.rooms.get(&id)
    }

    pub fn contains_room(&self, id: RoomId) -> bool {
        self.rooms.contains_key(&id)
    }

    pub fn rooms(&self) -> impl Iterator<Item = &Room> {
        self.rooms.values()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    fn room_or_err(&self, id: RoomId) -> Result<&Room, NavigationError> {
        self.rooms.get(&id).ok_or(NavigationError::InvalidRoomReference(id))
    }

    fn room_mut_or_err(&mut self, id: RoomId) -> Result<&mut Room, NavigationError> {
        self.rooms.get_mut(&id).ok_or(NavigationError::InvalidRoomReference(id))
    }

    /// Checks that a position names a registered room and lies inside it.
    pub fn validate_position(&self, position: GridPosition) -> Result<(), NavigationError> {
        let room = self.room_or_err(position.room)?;

        if !room.contains(position.cell) {
            return Err(NavigationError::CellOutOfBounds {
                room: position.room,
                cell: position.cell,
            });
        }

        Ok(())
    }

    pub fn tile(&self, position: GridPosition) -> Option<&Tile> {
        self.rooms.get(&position.room)?.tile(position.cell)
    }

    pub fn tile_index(&self, position: GridPosition) -> Option<usize> {
        self.rooms.get(&position.room)?.index_of(position.cell)
    }

    /// Adds one door record to `room`. The target room must already exist.
    pub fn add_door(
        &mut self,
        room: RoomId,
        position_in_room: Cell,
        connected_room: RoomId,
        connected_position: Cell,
    ) -> Result<DoorId, NavigationError> {
        let target = self.rooms.get(&connected_room).ok_or(NavigationError::DanglingDoor {
            room,
            target: connected_room,
        })?;

        if !target.contains(connected_position) {
            return Err(NavigationError::CellOutOfBounds {
                room: connected_room,
                cell: connected_position,
            });
        }

        let owner = self.room_or_err(room)?;

        if !owner.contains(position_in_room) {
            return Err(NavigationError::CellOutOfBounds {
                room,
                cell: position_in_room,
            });
        }

        let id = DoorId(self.next_door_id);
        self.next_door_id += 1;

        self.room_mut_or_err(room)?.doors_mut().push(Door {
            id,
            room,
            position_in_room,
            connected_room,
            connected_position,
            is_open: true,
            pair: None,
        });
        self.doors.insert(id, room);

        Ok(id)
    }

    /// Adds the two door records of a bidirectional opening and links them.
    pub fn connect_rooms(&mut self, a: RoomId, a_position: Cell, b: RoomId, b_position: Cell) -> Result<(DoorId, DoorId), NavigationError> {
        // Validate both sides before creating either record.
        self.validate_position(GridPosition::new(a, a_position))?;
        self.validate_position(GridPosition::new(b, b_position))?;

        let forward = self.add_door(a, a_position, b, b_position)?;
        let backward = self.add_door(b, b_position, a, a_position)?;

        if let Some(door) = self.door_mut(forward) {
            door.pair = Some(backward);
        }
        if let Some(door) = self.door_mut(backward) {
            door.pair = Some(forward);
        }

        Ok((forward, backward))
    }

    pub fn door(&self, id: DoorId) -> Option<&Door> {
        let room = self.doors.get(&id)?;
        self.rooms.get(room)?.doors().iter().find(|d| d.id() == id)
    }

    fn door_mut(&mut self, id: DoorId) -> Option<&mut Door> {
        let room = self.doors.get(&id)?;
        self.rooms.get_mut(room)?.doors_mut().iter_mut().find(|d| d.id() == id)
    }

    /// Opens or closes a door and its paired record. Returns the ids whose
    /// state actually changed.
    pub fn set_door_open(&mut self, id: DoorId, open: bool) -> Result<Vec<DoorId>, NavigationError> {
        let door = self.door_mut(id).ok_or(NavigationError::DoorNotFound(id))?;

        let mut changed = Vec::new();

        if door.is_open != open {
            door.is_open = open;
            changed.push(id);
        }

        if let Some(pair) = door.pair {
            if let Some(pair_door) = self.door_mut(pair) {
                if pair_door.is_open != open {
                    pair_door.is_open = open;
                    changed.push(pair);
                }
            }
        }

        Ok(changed)
    }

    /// Door records of `from` leading into `to`, open or not.
    pub fn doors_between(&self, from: RoomId, to: RoomId) -> impl Iterator<Item = &Door> {
        self.rooms
            .get(&from)
            .into_iter()
            .flat_map(|room| room.doors().iter())
            .filter(move |d| d.connected_room() == to)
    }

    pub fn update_tile(&mut self, room: RoomId, x: i32, y: i32, tile_type: TileType) -> Result<TileChange, NavigationError> {
        let cell = Cell::new(x, y);
        let target = self.room_mut_or_err(room)?;
        let index = target.index_of(cell).ok_or(NavigationError::CellOutOfBounds { room, cell })?;
        let tile = target.tile_at_mut(index).ok_or(NavigationError::CellOutOfBounds { room, cell })?;

        tile.set_type(tile_type);

        Ok(TileChange {
            room,
            cell,
            index,
            version: tile.version(),
            kind: TileChangeKind::Retyped(tile_type),
        })
    }

    pub fn set_occupant(&mut self, position: GridPosition, occupant: Option<AgentId>) -> Result<TileChange, NavigationError> {
        let room = position.room;
        let cell = position.cell;
        let target = self.room_mut_or_err(room)?;
        let index = target.index_of(cell).ok_or(NavigationError::CellOutOfBounds { room, cell })?;
        let tile = target.tile_mut(cell).ok_or(NavigationError::CellOutOfBounds { room, cell })?;

        tile.set_occupant(occupant);

        Ok(TileChange {
            room,
            cell,
            index,
            version: tile.version(),
            kind: TileChangeKind::Occupancy(occupant),
        })
    }

    /// Records an out-of-band mutation reported by the map layer.
    pub fn touch_tile(&mut self, room: RoomId, index: usize) -> Result<TileChange, NavigationError> {
        let target = self.room_mut_or_err(room)?;
        let cell = target.cell_at(index).ok_or(NavigationError::IndexOutOfBounds { room, index })?;
        let tile = target.tile_at_mut(index).ok_or(NavigationError::IndexOutOfBounds { room, index })?;

        tile.touch();

        Ok(TileChange {
            room,
            cell,
            index,
            version: tile.version(),
            kind: TileChangeKind::Touched,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_rooms() -> GridManager {
        let mut grid = GridManager::new();
        grid.add_room(Room::new(RoomId(1), 4, 4, Cell::new(0, 0), TileType::Floor).unwrap()).unwrap();
        grid.add_room(Room::new(RoomId(2), 4, 4, Cell::new(4, 0), TileType::Floor).unwrap()).unwrap();
        grid
    }

    #[test]
    fn rejects_duplicate_and_overlapping_rooms() {
        let mut grid = two_rooms();

        let duplicate = Room::new(RoomId(1), 2, 2, Cell::new(20, 20), TileType::Floor).unwrap();
        assert_eq!(grid.add_room(duplicate), Err(NavigationError::DuplicateRoom(RoomId(1))));

        let overlapping = Room::new(RoomId(3), 2, 2, Cell::new(3, 3), TileType::Floor).unwrap();
        assert_eq!(
            grid.add_room(overlapping),
            Err(NavigationError::OverlappingRoom {
                room: RoomId(3),
                existing: RoomId(1)
            })
        );
    }

    #[test]
    fn dangling_doors_are_rejected() {
        let mut grid = two_rooms();

        assert_eq!(
            grid.add_door(RoomId(1), Cell::new(3, 1), RoomId(9), Cell::new(0, 0)),
            Err(NavigationError::DanglingDoor {
                room: RoomId(1),
                target: RoomId(9)
            })
        );
        assert!(matches!(
            grid.add_door(RoomId(1), Cell::new(3, 1), RoomId(2), Cell::new(7, 0)),
            Err(NavigationError::CellOutOfBounds { .. })
        ));
        assert!(grid.room(RoomId(1)).unwrap().doors().is_empty());
    }

    #[test]
    fn connected_doors_toggle_together() {
        let mut grid = two_rooms();
        let (forward, backward) = grid.connect_rooms(RoomId(1), Cell::new(3, 1), RoomId(2), Cell::new(0, 1)).unwrap();

        assert_eq!(grid.door(forward).unwrap().pair(), Some(backward));
        assert_eq!(grid.door(backward).unwrap().exit(), GridPosition::new(RoomId(1), Cell::new(3, 1)));

        assert_eq!(grid.set_door_open(forward, false).unwrap(), vec![forward, backward]);
        assert!(!grid.door(backward).unwrap().is_open());
        assert!(grid.set_door_open(backward, false).unwrap().is_empty());
        assert_eq!(grid.set_door_open(DoorId(42), true), Err(NavigationError::DoorNotFound(DoorId(42))));
    }

    #[test]
    fn tile_mutations_bump_versions() {
        let mut grid = two_rooms();

        let change = grid.update_tile(RoomId(2), 1, 2, TileType::Wall).unwrap();
        assert_eq!(change.index, 9);
        assert_eq!(change.version, 1);
        assert!(!grid.tile(change.position()).unwrap().walkable());

        let change = grid.touch_tile(RoomId(2), 9).unwrap();
        assert_eq!(change.cell, Cell::new(1, 2));
        assert_eq!(change.version, 2);

        let change = grid.set_occupant(GridPosition::new(RoomId(2), Cell::new(1, 2)), Some(AgentId(3))).unwrap();
        assert_eq!(change.version, 3);
        assert_eq!(grid.tile(change.position()).unwrap().occupant(), Some(AgentId(3)));

        assert!(matches!(grid.update_tile(RoomId(2), 4, 0, TileType::Floor), Err(NavigationError::CellOutOfBounds { .. })));
        assert_eq!(grid.touch_tile(RoomId(5), 0), Err(NavigationError::InvalidRoomReference(RoomId(5))));
    }

    #[test]
    fn removing_a_room_drops_doors_into_it() {
        let mut grid = two_rooms();
        let (forward, backward) = grid.connect_rooms(RoomId(1), Cell::new(3, 1), RoomId(2), Cell::new(0, 1)).unwrap();

        grid.remove_room(RoomId(2)).unwrap();

        assert!(grid.door(forward).is_none());
        assert!(grid.door(backward).is_none());
        assert!(grid.room(RoomId(1)).unwrap().doors().is_empty());
    }
}
