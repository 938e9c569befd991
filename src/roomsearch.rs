use crate::grid::*;
use crate::location::*;
use crate::room::*;
use ordered_float::OrderedFloat;
use pathfinding::directed::astar::astar;

/// Cheapest sequence of rooms between two rooms.
#[derive(Clone, Debug, PartialEq)]
pub struct RoomRoute {
    pub rooms: Vec<RoomId>,
    pub cost: f32,
}

/// Cost of crossing `door`: the distance between the two room centres,
/// multiplied by `closed_door_penalty` when the door is closed.
pub fn door_traversal_cost(grid: &GridManager, door: &Door, closed_door_penalty: f32) -> Option<f32> {
    let from = grid.room(door.room())?;
    let to = grid.room(door.connected_room())?;

    let distance = from.center().distance_to(to.center());

    if door.is_open() {
        Some(distance)
    } else {
        Some(distance * closed_door_penalty)
    }
}

/// A* over the room graph. Rooms are nodes and every door record is a directed
/// edge; closed doors stay in the graph at a penalised cost so that a route
/// still exists while doors are temporarily shut.
///
/// The heuristic is the straight-line distance between room centres, which no
/// edge can undercut.
pub fn find_room_route(grid: &GridManager, start: RoomId, goal: RoomId, closed_door_penalty: f32) -> Option<RoomRoute> {
    let goal_center = grid.room(goal)?.center();
    grid.room(start)?;

    let (rooms, cost) = astar(
        &start,
        |&current| {
            grid.room(current)
                .into_iter()
                .flat_map(|room| room.doors())
                .filter_map(|door| {
                    let cost = door_traversal_cost(grid, door, closed_door_penalty)?;
                    Some((door.connected_room(), OrderedFloat(cost)))
                })
                .collect::<Vec<_>>()
        },
        |&room| {
            OrderedFloat(
                grid.room(room)
                    .map(|r| r.center().distance_to(goal_center))
                    .unwrap_or(0.0),
            )
        },
        |&room| room == goal,
    )?;

    Some(RoomRoute {
        rooms,
        cost: cost.into_inner(),
    })
}
