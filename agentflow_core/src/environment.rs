//! The mutable simulation world.

use crate::agent::{Agent, AgentId, AgentSnapshot};
use crate::bounds::Bounds;
use crate::params::ParameterTable;
use crate::spatial::SpatialIndex;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Births and removals applied by one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    pub born: usize,
    pub removed: usize,
}

/// Live agents, parameters and the spatial index.
///
/// Agents live in a vector addressed by slot. During a tick the slot of an
/// agent never changes: removals only clear the agent's `alive` flag and
/// births are parked in a side buffer. [`finish_tick`](Self::finish_tick)
/// then compacts the vector, appends the newborns and rebuilds the index for
/// the next tick.
#[derive(Debug)]
pub struct Environment {
    bounds: Bounds,
    agents: Vec<Agent>,
    births: Vec<Agent>,
    params: ParameterTable,
    index: SpatialIndex,

    /// Behavior RNG (setup draws from its own stream)
    rng: ChaCha8Rng,

    next_id: u64,
    live: usize,
    type_ids: Vec<String>,
    pending: TickStats,
    last_tick: TickStats,
}

impl Environment {
    /// Creates an empty environment.
    ///
    /// `type_ids` maps compiled type indices back to model ids for snapshots.
    pub fn new(bounds: Bounds, params: ParameterTable, type_ids: Vec<String>, seed: u64) -> Self {
        Self {
            bounds,
            agents: Vec::new(),
            births: Vec::new(),
            params,
            index: SpatialIndex::new(bounds),
            rng: ChaCha8Rng::seed_from_u64(seed),
            next_id: 0,
            live: 0,
            type_ids,
            pending: TickStats::default(),
            last_tick: TickStats::default(),
        }
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn params(&self) -> &ParameterTable {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut ParameterTable {
        &mut self.params
    }

    pub fn rng(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }

    pub fn index(&self) -> &SpatialIndex {
        &self.index
    }

    pub fn type_ids(&self) -> &[String] {
        &self.type_ids
    }

    /// Number of slots, including agents removed earlier this tick.
    pub fn slot_count(&self) -> usize {
        self.agents.len()
    }

    pub fn agent(&self, slot: usize) -> Option<&Agent> {
        self.agents.get(slot)
    }

    pub fn agent_mut(&mut self, slot: usize) -> Option<&mut Agent> {
        self.agents.get_mut(slot)
    }

    pub fn is_alive(&self, slot: usize) -> bool {
        self.agents.get(slot).is_some_and(Agent::is_alive)
    }

    /// Iterates over live agents in slot order.
    pub fn agents(&self) -> impl Iterator<Item = &Agent> {
        self.agents.iter().filter(|a| a.is_alive())
    }

    /// Number of live agents (births of the current tick not yet included).
    pub fn agent_count(&self) -> usize {
        self.live
    }

    /// Live agent count per compiled type index.
    pub fn count_by_type(&self) -> Vec<usize> {
        let mut counts = vec![0; self.type_ids.len()];
        for agent in self.agents() {
            if let Some(c) = counts.get_mut(agent.type_index) {
                *c += 1;
            }
        }
        counts
    }

    /// Hands out the next agent id.
    pub fn allocate_id(&mut self) -> AgentId {
        let id = AgentId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Inserts an agent immediately (setup time).
    pub fn insert(&mut self, agent: Agent) {
        if agent.is_alive() {
            self.live += 1;
        }
        self.agents.push(agent);
    }

    /// Parks a newborn; it joins the world when the current tick finishes.
    pub fn queue_birth(&mut self, agent: Agent) {
        self.births.push(agent);
    }

    /// Removes the agent in `slot`. Returns false if it was already gone.
    pub fn remove(&mut self, slot: usize) -> bool {
        match self.agents.get_mut(slot) {
            Some(agent) if agent.alive => {
                agent.alive = false;
                self.live -= 1;
                self.pending.removed += 1;
                true
            }
            _ => false,
        }
    }

    /// Compacts removed agents, admits newborns and rebuilds the index.
    pub fn finish_tick(&mut self) -> TickStats {
        self.agents.retain(Agent::is_alive);
        self.pending.born = self.births.len();
        self.live += self.births.len();
        self.agents.append(&mut self.births);
        self.rebuild_index();

        self.last_tick = std::mem::take(&mut self.pending);
        self.last_tick
    }

    /// Rebuilds the spatial index from the live agents.
    pub fn rebuild_index(&mut self) {
        self.index.rebuild(&self.agents);
    }

    /// Births and removals applied by the most recent tick.
    pub fn last_tick(&self) -> TickStats {
        self.last_tick
    }

    /// Drops every agent and empties the index.
    pub fn clear(&mut self) {
        self.agents.clear();
        self.births.clear();
        self.live = 0;
        self.pending = TickStats::default();
        self.rebuild_index();
    }

    /// Render snapshots of the live agents.
    pub fn snapshot(&self) -> Vec<AgentSnapshot> {
        self.agents()
            .map(|a| AgentSnapshot {
                id: a.id.0,
                type_id: self.type_ids.get(a.type_index).cloned().unwrap_or_default(),
                x: a.position.x,
                y: a.position.y,
                heading: a.heading,
            })
            .collect()
    }
}
