use crate::error::*;
use crate::location::*;
use log::debug;
use serde::*;
use std::collections::HashMap;
use std::collections::HashSet;
use std::collections::VecDeque;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReservationOptions {
    /// Number of time steps, starting at the current one, that can be reserved.
    pub horizon: usize,
    /// Extra steps the final cell of a committed sequence is held for.
    pub parking_steps: u32,
}

impl Default for ReservationOptions {
    fn default() -> Self {
        ReservationOptions {
            horizon: 64,
            parking_steps: 3,
        }
    }
}

/// Time-indexed record of which agent holds which cell at which step.
///
/// The table covers a sliding window `[current_time, current_time + horizon)`.
/// Every step in the window has its own slice mapping positions to the single
/// agent holding them, so two agents can never hold the same cell at the same
/// step.
pub struct ReservationTable {
    options: ReservationOptions,
    current_time: u64,
    slices: VecDeque<HashMap<GridPosition, AgentId>>,
    by_agent: HashMap<AgentId, HashSet<(u64, GridPosition)>>,
}

impl Default for ReservationTable {
    fn default() -> Self {
        ReservationTable::new(ReservationOptions::default())
    }
}

impl ReservationTable {
    pub fn new(options: ReservationOptions) -> ReservationTable {
        let horizon = options.horizon.max(1);
        let slices = (0..horizon).map(|_| HashMap::new()).collect();

        ReservationTable {
            options: ReservationOptions { horizon, ..options },
            current_time: 0,
            slices,
            by_agent: HashMap::new(),
        }
    }

    pub fn options(&self) -> &ReservationOptions {
        &self.options
    }

    pub fn current_time(&self) -> u64 {
        self.current_time
    }

    /// First step past the end of the window.
    pub fn window_end(&self) -> u64 {
        self.current_time + self.options.horizon as u64
    }

    fn slice_index(&self, time_step: u64) -> Option<usize> {
        if time_step < self.current_time || time_step >= self.window_end() {
            None
        } else {
            Some((time_step - self.current_time) as usize)
        }
    }

    fn outside_window(&self, time_step: u64) -> ReservationError {
        ReservationError::OutsideWindow {
            time_step,
            window_start: self.current_time,
            window_end: self.window_end(),
        }
    }

    pub fn holder(&self, position: GridPosition, time_step: u64) -> Option<AgentId> {
        let index = self.slice_index(time_step)?;
        self.slices[index].get(&position).copied()
    }

    /// True when an agent other than `agent` holds `position` at `time_step`.
    /// Steps outside the window are never reserved.
    pub fn is_reserved_by_other(&self, position: GridPosition, time_step: u64, agent: AgentId) -> bool {
        self.holder(position, time_step).map(|h| h != agent).unwrap_or(false)
    }

    /// Claims one cell at one step. Re-reserving a cell the agent already
    /// holds succeeds.
    pub fn reserve(&mut self, position: GridPosition, time_step: u64, agent: AgentId) -> Result<(), ReservationError> {
        let index = self.slice_index(time_step).ok_or_else(|| self.outside_window(time_step))?;

        if let Some(holder) = self.slices[index].get(&position) {
            if *holder != agent {
                return Err(ReservationError::Conflict {
                    position,
                    time_step,
                    holder: *holder,
                });
            }
            return Ok(());
        }

        self.commit(index, time_step, position, agent);

        Ok(())
    }

    fn commit(&mut self, index: usize, time_step: u64, position: GridPosition, agent: AgentId) {
        self.slices[index].insert(position, agent);
        self.by_agent.entry(agent).or_default().insert((time_step, position));
    }

    /// Reserves `path[i]` at `start_time + i` for every step that falls in the
    /// window, all or nothing. Steps before the current time or past the end
    /// of the window are skipped.
    ///
    /// After committing, the final cell is also held for up to
    /// `parking_steps` further steps; parking stops at the first step another
    /// agent already holds and never makes the call fail.
    ///
    /// Returns the number of path steps committed.
    pub fn reserve_sequence(&mut self, path: &[GridPosition], start_time: u64, agent: AgentId) -> Result<usize, ReservationError> {
        let steps: Vec<(usize, u64, GridPosition)> = path
            .iter()
            .enumerate()
            .filter_map(|(i, position)| {
                let time_step = start_time + i as u64;
                self.slice_index(time_step).map(|index| (index, time_step, *position))
            })
            .collect();

        for (index, time_step, position) in steps.iter() {
            if let Some(holder) = self.slices[*index].get(position) {
                if *holder != agent {
                    debug!("reservation of {} for {} rejected at step {}, held by {}", position, agent, time_step, holder);

                    return Err(ReservationError::Conflict {
                        position: *position,
                        time_step: *time_step,
                        holder: *holder,
                    });
                }
            }
        }

        for (index, time_step, position) in steps.iter() {
            self.commit(*index, *time_step, *position, agent);
        }

        if let Some(last) = path.last() {
            let arrival = start_time + path.len() as u64 - 1;

            for time_step in arrival + 1..=arrival + self.options.parking_steps as u64 {
                let Some(index) = self.slice_index(time_step) else {
                    continue;
                };

                match self.slices[index].get(last) {
                    Some(holder) if *holder != agent => break,
                    Some(_) => {}
                    None => self.commit(index, time_step, *last, agent),
                }
            }
        }

        Ok(steps.len())
    }

    /// Slides the window forward one step, dropping the oldest slice.
    pub fn advance_time(&mut self) {
        let expired_time = self.current_time;

        if let Some(expired) = self.slices.pop_front() {
            for (position, agent) in expired {
                if let Some(held) = self.by_agent.get_mut(&agent) {
                    held.remove(&(expired_time, position));
                    if held.is_empty() {
                        self.by_agent.remove(&agent);
                    }
                }
            }
        }

        self.slices.push_back(HashMap::new());
        self.current_time += 1;
    }

    /// Drops one reservation if `agent` holds it.
    pub fn release(&mut self, position: GridPosition, time_step: u64, agent: AgentId) -> bool {
        let Some(index) = self.slice_index(time_step) else {
            return false;
        };

        if self.slices[index].get(&position) != Some(&agent) {
            return false;
        }

        self.slices[index].remove(&position);

        if let Some(held) = self.by_agent.get_mut(&agent) {
            held.remove(&(time_step, position));
            if held.is_empty() {
                self.by_agent.remove(&agent);
            }
        }

        true
    }

    /// Drops every step at which `agent` holds `position`, for when the agent
    /// has passed the cell.
    pub fn release_cell(&mut self, position: GridPosition, agent: AgentId) -> usize {
        let steps: Vec<u64> = self
            .by_agent
            .get(&agent)
            .map(|held| held.iter().filter(|(_, p)| *p == position).map(|(t, _)| *t).collect())
            .unwrap_or_default();

        steps.into_iter().filter(|t| self.release(position, *t, agent)).count()
    }

    /// Drops every reservation held by `agent`. Safe to call for agents that
    /// hold nothing.
    pub fn release_all(&mut self, agent: AgentId) -> usize {
        let Some(held) = self.by_agent.remove(&agent) else {
            return 0;
        };

        let mut released = 0;

        for (time_step, position) in held {
            if let Some(index) = self.slice_index(time_step) {
                if self.slices[index].get(&position) == Some(&agent) {
                    self.slices[index].remove(&position);
                    released += 1;
                }
            }
        }

        released
    }

    /// Every `(time_step, position)` held by `agent`, ordered by time.
    pub fn reservations_of(&self, agent: AgentId) -> Vec<(u64, GridPosition)> {
        let mut held: Vec<(u64, GridPosition)> = self
            .by_agent
            .get(&agent)
            .map(|h| h.iter().copied().collect())
            .unwrap_or_default();

        held.sort();

        held
    }

    pub fn len(&self) -> usize {
        self.slices.iter().map(|s| s.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.iter().all(|s| s.is_empty())
    }

    pub fn clear(&mut self) {
        for slice in self.slices.iter_mut() {
            slice.clear();
        }
        self.by_agent.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(x: i32, y: i32) -> GridPosition {
        GridPosition::new(RoomId(1), Cell::new(x, y))
    }

    fn table(horizon: usize, parking_steps: u32) -> ReservationTable {
        ReservationTable::new(ReservationOptions { horizon, parking_steps })
    }

    #[test]
    fn single_reservations_are_exclusive() {
        let mut table = table(8, 0);
        let (a, b) = (AgentId(1), AgentId(2));

        assert!(table.reserve(pos(0, 0), 2, a).is_ok());
        assert!(table.reserve(pos(0, 0), 2, a).is_ok());
        assert_eq!(
            table.reserve(pos(0, 0), 2, b),
            Err(ReservationError::Conflict {
                position: pos(0, 0),
                time_step: 2,
                holder: a
            })
        );
        assert!(table.reserve(pos(0, 0), 3, b).is_ok());
        assert!(table.is_reserved_by_other(pos(0, 0), 2, b));
        assert!(!table.is_reserved_by_other(pos(0, 0), 2, a));
    }

    #[test]
    fn reservations_outside_window_are_rejected() {
        let mut table = table(4, 0);
        table.advance_time();

        assert!(matches!(table.reserve(pos(0, 0), 0, AgentId(1)), Err(ReservationError::OutsideWindow { .. })));
        assert!(matches!(table.reserve(pos(0, 0), 5, AgentId(1)), Err(ReservationError::OutsideWindow { .. })));
        assert!(table.reserve(pos(0, 0), 4, AgentId(1)).is_ok());
    }

    #[test]
    fn failed_sequence_leaves_table_untouched() {
        let mut table = table(16, 2);
        let (a, b) = (AgentId(1), AgentId(2));
        table.reserve(pos(3, 0), 3, b).unwrap();

        let before = table.reservations_of(b);
        let path: Vec<_> = (0..5).map(|x| pos(x, 0)).collect();

        assert!(table.reserve_sequence(&path, 0, a).is_err());
        assert!(table.reservations_of(a).is_empty());
        assert_eq!(table.reservations_of(b), before);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn committed_sequence_parks_on_final_cell() {
        let mut table = table(16, 2);
        let a = AgentId(1);
        let path = vec![pos(0, 0), pos(1, 0), pos(2, 0)];

        assert_eq!(table.reserve_sequence(&path, 5, a), Ok(3));
        assert_eq!(
            table.reservations_of(a),
            vec![(5, pos(0, 0)), (6, pos(1, 0)), (7, pos(2, 0)), (8, pos(2, 0)), (9, pos(2, 0))]
        );
    }

    #[test]
    fn parking_stops_at_foreign_claim() {
        let mut table = table(16, 3);
        let (a, b) = (AgentId(1), AgentId(2));
        table.reserve(pos(1, 0), 3, b).unwrap();

        assert_eq!(table.reserve_sequence(&[pos(0, 0), pos(1, 0)], 0, a), Ok(2));
        assert_eq!(table.holder(pos(1, 0), 2), Some(a));
        assert_eq!(table.holder(pos(1, 0), 3), Some(b));
        assert_eq!(table.holder(pos(1, 0), 4), None);
    }

    #[test]
    fn sequence_is_truncated_to_window() {
        let mut table = table(3, 0);
        let path: Vec<_> = (0..6).map(|x| pos(x, 0)).collect();

        assert_eq!(table.reserve_sequence(&path, 1, AgentId(1)), Ok(2));
        assert_eq!(table.holder(pos(0, 0), 1), Some(AgentId(1)));
        assert_eq!(table.holder(pos(1, 0), 2), Some(AgentId(1)));
    }

    #[test]
    fn advancing_time_expires_oldest_slice() {
        let mut table = table(4, 0);
        let a = AgentId(1);
        table.reserve_sequence(&[pos(0, 0), pos(1, 0)], 0, a).unwrap();

        table.advance_time();

        assert_eq!(table.current_time(), 1);
        assert_eq!(table.holder(pos(0, 0), 0), None);
        assert_eq!(table.reservations_of(a), vec![(1, pos(1, 0))]);

        table.advance_time();
        assert!(table.reservations_of(a).is_empty());
        assert!(table.is_empty());
        assert!(table.reserve(pos(0, 0), 5, a).is_ok());
    }

    #[test]
    fn release_all_is_idempotent() {
        let mut table = table(8, 1);
        let (a, b) = (AgentId(1), AgentId(2));
        table.reserve_sequence(&[pos(0, 0), pos(0, 1)], 0, a).unwrap();
        table.reserve(pos(5, 5), 0, b).unwrap();

        assert_eq!(table.release_all(a), 3);
        assert_eq!(table.release_all(a), 0);
        assert_eq!(table.release_all(AgentId(99)), 0);
        assert_eq!(table.len(), 1);
        assert!(table.reserve(pos(0, 0), 0, b).is_ok());
    }

    #[test]
    fn release_cell_drops_passed_cell_only() {
        let mut table = table(8, 2);
        let a = AgentId(1);
        table.reserve_sequence(&[pos(0, 0), pos(1, 0)], 0, a).unwrap();

        assert_eq!(table.release_cell(pos(1, 0), a), 3);
        assert_eq!(table.reservations_of(a), vec![(0, pos(0, 0))]);
    }

    #[test]
    fn agents_never_share_a_cell_step() {
        let mut table = table(32, 2);
        let agents = [AgentId(1), AgentId(2), AgentId(3)];
        let paths = [
            (0..8).map(|x| pos(x, 0)).collect::<Vec<_>>(),
            (0..8).map(|x| pos(7 - x, 0)).collect::<Vec<_>>(),
            (0..8).map(|y| pos(3, y)).collect::<Vec<_>>(),
        ];

        for (agent, path) in agents.iter().zip(paths.iter()) {
            for start in 0..4 {
                if table.reserve_sequence(path, start, *agent).is_ok() {
                    break;
                }
            }
        }

        for (i, a) in agents.iter().enumerate() {
            for b in agents.iter().skip(i + 1) {
                let held_a: HashSet<_> = table.reservations_of(*a).into_iter().collect();
                let held_b: HashSet<_> = table.reservations_of(*b).into_iter().collect();
                assert!(held_a.is_disjoint(&held_b));
            }
        }
    }
}
