use crate::location::*;
use crate::tile::*;
use crate::traits::*;
use crate::utility::*;
use bitflags::bitflags;
use serde::*;
use std::borrow::Cow;
use std::sync::Arc;

bitflags! {
    /// What an agent is able to do, as far as terrain is concerned.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Capabilities: u8 {
        const SWIM = 1 << 0;
        const POISON_IMMUNE = 1 << 1;
        const CLIMB = 1 << 2;
        const IGNORE_MUD = 1 << 3;
    }
}

/// The requesting agent as seen by cost providers.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: AgentId,
    pub capabilities: Capabilities,
}

impl AgentProfile {
    pub fn new(id: AgentId) -> AgentProfile {
        AgentProfile {
            id,
            capabilities: Capabilities::empty(),
        }
    }

    pub fn with_capabilities(id: AgentId, capabilities: Capabilities) -> AgentProfile {
        AgentProfile { id, capabilities }
    }
}

/// Tile-grid connectivity used by the local search.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Connectivity {
    Four,
    #[default]
    Eight,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Heuristic {
    Manhattan,
    Chebyshev,
    Euclidean,
    Octile,
    /// Always zero; turns A* into Dijkstra.
    Zero,
}

impl Heuristic {
    /// The tightest admissible metric for a unit-cost grid with the given
    /// connectivity.
    pub fn for_connectivity(connectivity: Connectivity) -> Heuristic {
        match connectivity {
            Connectivity::Four => Heuristic::Manhattan,
            Connectivity::Eight => Heuristic::Octile,
        }
    }

    pub fn distance(self, a: Cell, b: Cell) -> f32 {
        match self {
            Heuristic::Manhattan => manhattan(a, b),
            Heuristic::Chebyshev => chebyshev(a, b),
            Heuristic::Euclidean => euclidean(a, b),
            Heuristic::Octile => octile(a, b),
            Heuristic::Zero => 0.0,
        }
    }
}

/// Walkable tiles cost their base cost.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BaseCostProvider {
    heuristic: Heuristic,
    /// Lower bound on the base cost of any walkable tile, scales the heuristic.
    min_cost: f32,
}

impl Default for BaseCostProvider {
    fn default() -> Self {
        BaseCostProvider::new(Connectivity::default())
    }
}

impl BaseCostProvider {
    pub fn new(connectivity: Connectivity) -> BaseCostProvider {
        BaseCostProvider {
            heuristic: Heuristic::for_connectivity(connectivity),
            min_cost: 1.0,
        }
    }

    pub fn with_heuristic(heuristic: Heuristic, min_cost: f32) -> BaseCostProvider {
        BaseCostProvider { heuristic, min_cost }
    }
}

impl CostProvider for BaseCostProvider {
    fn cost(&self, tile: &Tile, _agent: &AgentProfile) -> Option<f32> {
        if tile.walkable() {
            Some(tile.base_cost())
        } else {
            None
        }
    }

    fn heuristic(&self, from: Cell, to: Cell) -> f32 {
        self.heuristic.distance(from, to) * self.min_cost
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainCostOptions {
    pub mud_penalty: f32,
    pub poison_penalty: f32,
    pub water_penalty: f32,
    pub elevation_penalty: f32,
    /// Refuse poisonous tiles to agents without `POISON_IMMUNE`.
    pub avoid_poison: bool,
    pub connectivity: Connectivity,
}

impl Default for TerrainCostOptions {
    fn default() -> Self {
        TerrainCostOptions {
            mud_penalty: 2.0,
            poison_penalty: 5.0,
            water_penalty: 1.0,
            elevation_penalty: 1.0,
            avoid_poison: false,
            connectivity: Connectivity::Eight,
        }
    }
}

/// Base cost plus per-flag penalties, filtered by the agent's capabilities.
/// Water is impassable to agents that cannot swim, elevation to agents that
/// cannot climb is only a penalty.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct TerrainCostProvider {
    options: TerrainCostOptions,
}

impl TerrainCostProvider {
    pub fn new(options: TerrainCostOptions) -> TerrainCostProvider {
        TerrainCostProvider { options }
    }

    pub fn options(&self) -> &TerrainCostOptions {
        &self.options
    }
}

impl CostProvider for TerrainCostProvider {
    fn cost(&self, tile: &Tile, agent: &AgentProfile) -> Option<f32> {
        if !tile.walkable() {
            return None;
        }

        let flags = tile.flags();
        let caps = agent.capabilities;
        let options = &self.options;

        let mut cost = tile.base_cost();

        if flags.contains(TileFlags::WATER) {
            if !caps.contains(Capabilities::SWIM) {
                return None;
            }
            cost += options.water_penalty;
        }

        if flags.contains(TileFlags::POISON) && !caps.contains(Capabilities::POISON_IMMUNE) {
            if options.avoid_poison {
                return None;
            }
            cost += options.poison_penalty;
        }

        if flags.contains(TileFlags::MUD) && !caps.contains(Capabilities::IGNORE_MUD) {
            cost += options.mud_penalty;
        }

        if flags.contains(TileFlags::ELEVATION) && !caps.contains(Capabilities::CLIMB) {
            cost += options.elevation_penalty;
        }

        Some(cost)
    }

    fn heuristic(&self, from: Cell, to: Cell) -> f32 {
        Heuristic::for_connectivity(self.options.connectivity).distance(from, to)
    }

    fn identity(&self) -> Cow<'static, str> {
        let o = &self.options;
        Cow::Owned(format!(
            "terrain(mud={},poison={},water={},elevation={},avoid_poison={},{:?})",
            o.mud_penalty, o.poison_penalty, o.water_penalty, o.elevation_penalty, o.avoid_poison, o.connectivity
        ))
    }
}

/// Cost contribution of tiles currently occupied by another agent.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct OccupancyCostProvider {
    free_cost: f32,
    occupied_cost: Option<f32>,
}

impl OccupancyCostProvider {
    /// Occupied tiles are impassable.
    pub fn blocking() -> OccupancyCostProvider {
        OccupancyCostProvider {
            free_cost: 0.0,
            occupied_cost: None,
        }
    }

    /// For `CombineMode::Sum`: adds `penalty` on occupied tiles.
    pub fn additive(penalty: f32) -> OccupancyCostProvider {
        OccupancyCostProvider {
            free_cost: 0.0,
            occupied_cost: Some(penalty),
        }
    }

    /// For `CombineMode::Product`: multiplies occupied tiles by `factor`.
    pub fn multiplicative(factor: f32) -> OccupancyCostProvider {
        OccupancyCostProvider {
            free_cost: 1.0,
            occupied_cost: Some(factor),
        }
    }
}

impl CostProvider for OccupancyCostProvider {
    fn cost(&self, tile: &Tile, agent: &AgentProfile) -> Option<f32> {
        if tile.is_occupied_by_other(agent.id) {
            self.occupied_cost
        } else {
            Some(self.free_cost)
        }
    }

    fn heuristic(&self, _from: Cell, _to: Cell) -> f32 {
        0.0
    }

    fn identity(&self) -> Cow<'static, str> {
        Cow::Owned(format!("occupancy(free={},occupied={:?})", self.free_cost, self.occupied_cost))
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CombineMode {
    Sum,
    Product,
}

/// Decorator over a list of providers. Any impassable verdict wins; otherwise
/// costs are summed or multiplied.
///
/// In `Sum` mode the heuristic is the sum of the children's heuristics. In
/// `Product` mode it is the largest child heuristic, which stays admissible as
/// long as every other child contributes a factor of at least one.
#[derive(Clone)]
pub struct CombinedCostProvider {
    mode: CombineMode,
    providers: Vec<Arc<dyn CostProvider>>,
}

impl CombinedCostProvider {
    pub fn new(mode: CombineMode) -> CombinedCostProvider {
        CombinedCostProvider {
            mode,
            providers: Vec::new(),
        }
    }

    pub fn with(mut self, provider: Arc<dyn CostProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn push(&mut self, provider: Arc<dyn CostProvider>) {
        self.providers.push(provider);
    }

    pub fn mode(&self) -> CombineMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl CostProvider for CombinedCostProvider {
    fn cost(&self, tile: &Tile, agent: &AgentProfile) -> Option<f32> {
        let identity = match self.mode {
            CombineMode::Sum => 0.0,
            CombineMode::Product => 1.0,
        };

        self.providers.iter().try_fold(identity, |acc, provider| {
            let cost = provider.cost(tile, agent)?;
            Some(match self.mode {
                CombineMode::Sum => acc + cost,
                CombineMode::Product => acc * cost,
            })
        })
    }

    fn heuristic(&self, from: Cell, to: Cell) -> f32 {
        let estimates = self.providers.iter().map(|p| p.heuristic(from, to));

        match self.mode {
            CombineMode::Sum => estimates.sum(),
            CombineMode::Product => estimates.fold(0.0, f32::max),
        }
    }

    fn identity(&self) -> Cow<'static, str> {
        let parts: Vec<String> = self.providers.iter().map(|p| p.identity().into_owned()).collect();
        let op = match self.mode {
            CombineMode::Sum => "+",
            CombineMode::Product => "*",
        };
        Cow::Owned(format!("[{}]", parts.join(op)))
    }
}
