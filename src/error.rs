use crate::location::*;
use crate::room::DoorId;
use thiserror::Error;

/// Configuration and lookup errors. These abort map registration or reject a
/// request before it reaches the scheduler; search failures never use them.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NavigationError {
    #[error("unknown room {0}")]
    InvalidRoomReference(RoomId),
    #[error("room {0} is already registered")]
    DuplicateRoom(RoomId),
    #[error("room {room} overlaps room {existing}")]
    OverlappingRoom { room: RoomId, existing: RoomId },
    #[error("room {room} has invalid dimensions {width}x{height}")]
    InvalidDimensions { room: RoomId, width: u32, height: u32 },
    #[error("room {room} layout contains unknown symbol {symbol:?}")]
    InvalidLayout { room: RoomId, symbol: char },
    #[error("cell {cell} is outside room {room}")]
    CellOutOfBounds { room: RoomId, cell: Cell },
    #[error("cell index {index} is outside room {room}")]
    IndexOutOfBounds { room: RoomId, index: usize },
    #[error("door in room {room} targets missing room {target}")]
    DanglingDoor { room: RoomId, target: RoomId },
    #[error("unknown door {0:?}")]
    DoorNotFound(DoorId),
}

/// Failures of the cooperative reservation protocol. A conflict tells the
/// caller to replan; it is never fatal to the system.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReservationError {
    #[error("{position} at step {time_step} is held by {holder}")]
    Conflict {
        position: GridPosition,
        time_step: u64,
        holder: AgentId,
    },
    #[error("step {time_step} is outside the reservation window [{window_start}, {window_end})")]
    OutsideWindow {
        time_step: u64,
        window_start: u64,
        window_end: u64,
    },
}
