use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{error, info, warn};

use crate::modules::action::ActionCosts;
use crate::modules::config::SimulationDef;
use crate::modules::entity::{
    Agent, AgentId, Appearance, Background, Block, BlockId, EnergyProfile, Occupant,
};
use crate::modules::error::{ConfigError, SimError};
use crate::modules::grid::{Grid, Placement, Position};
use crate::modules::mind::Mind;

/// Largest drift tolerated between the grid's energy mirror and the agents.
pub const ENERGY_EPSILON: f64 = 1e-6;

/// The simulated universe: grid, entities, turn order and randomness.
///
/// Agents and blocks live in arenas indexed by their id; the grid and the
/// ranking only ever hold those ids.
#[derive(Debug)]
pub struct World {
    name: String,
    grid: Grid,
    tile: Appearance,
    background: Background,
    agents: Vec<Agent>,
    blocks: Vec<Block>,
    ranking: Vec<AgentId>,
    tracked: Option<AgentId>,
    action_costs: ActionCosts,
    seed: f64,
    rng: StdRng,
    pub(crate) tick: u64,
}

fn rng_from_seed(seed: f64) -> StdRng {
    StdRng::seed_from_u64(seed.to_bits())
}

impl World {
    pub fn new(
        name: impl Into<String>,
        width: usize,
        height: usize,
        tile: Appearance,
        action_costs: ActionCosts,
        seed: f64,
    ) -> Self {
        Self {
            name: name.into(),
            grid: Grid::new(width, height, &tile),
            tile,
            background: Background::default(),
            agents: Vec::new(),
            blocks: Vec::new(),
            ranking: Vec::new(),
            tracked: None,
            action_costs,
            seed,
            rng: rng_from_seed(seed),
            tick: 0,
        }
    }

    /// Build a populated world. Agents are placed before blocks so that
    /// requested starting positions win over random obstacles.
    pub fn from_definition(def: &SimulationDef, seed: f64) -> Result<Self, ConfigError> {
        def.validate()?;
        let mut world = World::new(
            def.world.name.clone(),
            def.world.width,
            def.world.height,
            def.tile.appearance(),
            def.action_costs.clone(),
            seed,
        );
        world.set_background(def.world.background());

        for agent_def in &def.agents {
            for index in 0..agent_def.count {
                let mind = Mind::from_defs(
                    agent_def.perception,
                    agent_def.action,
                    agent_def.learning,
                    &agent_def.script,
                )?;
                world.add_agent(
                    agent_def.instance_name(index),
                    agent_def.appearance(),
                    agent_def.energy,
                    mind,
                    agent_def.initial_position.into(),
                );
            }
        }

        for block_def in &def.blocks {
            let count = match block_def.count {
                Some(count) => count,
                None => world.random_block_count(def.world.block_density_variance),
            };
            for _ in 0..count {
                world.add_block(block_def.name.clone(), block_def.appearance(), Placement::Random);
            }
        }

        info!(
            world = %world.name,
            width = world.grid.width(),
            height = world.grid.height(),
            agents = world.agents.len(),
            blocks = world.blocks.len(),
            seed = world.seed,
            "world created"
        );
        Ok(world)
    }

    fn random_block_count(&mut self, variance: f64) -> usize {
        let width = self.grid.width() as i64;
        let spread = (width as f64 * variance).floor() as i64;
        let count = width + self.rng.gen_range(-spread..=spread);
        count.max(0) as usize
    }

    /// Create an agent and put it on the grid, relocating it if its
    /// requested tile is taken. Returns `None`, and keeps nothing, when the
    /// grid has no room.
    pub fn add_agent(
        &mut self,
        name: impl Into<String>,
        appearance: Appearance,
        profile: EnergyProfile,
        mind: Mind,
        placement: Placement,
    ) -> Option<AgentId> {
        let id = self.agents.len();
        let mut agent = Agent::new(id, name, appearance, profile, mind);
        let placed = self.grid.place(
            Occupant::Agent(id),
            None,
            placement,
            true,
            agent.energy(),
            &mut self.rng,
        );
        let Some(position) = placed else {
            warn!(agent = %agent.name, "no free tile; agent omitted");
            return None;
        };

        agent.position = Some(position);
        self.agents.push(agent);
        self.ranking.push(id);
        if self.tracked.is_none() {
            self.tracked = Some(id);
        }
        Some(id)
    }

    pub fn add_block(
        &mut self,
        name: impl Into<String>,
        appearance: Appearance,
        placement: Placement,
    ) -> Option<BlockId> {
        let id = self.blocks.len();
        let name = name.into();
        let Some(position) = self.grid.place(
            Occupant::Block(id),
            None,
            placement,
            false,
            0.0,
            &mut self.rng,
        ) else {
            warn!(block = %name, "no free tile; block omitted");
            return None;
        };

        self.blocks.push(Block {
            id,
            name,
            appearance,
            position: Some(position),
        });
        Some(id)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn seed(&self) -> f64 {
        self.seed
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn tile(&self) -> &Appearance {
        &self.tile
    }

    pub fn background(&self) -> Background {
        self.background
    }

    pub fn set_background(&mut self, background: Background) {
        self.background = background;
    }

    pub fn action_costs(&self) -> &ActionCosts {
        &self.action_costs
    }

    pub fn agent(&self, id: AgentId) -> Option<&Agent> {
        self.agents.get(id)
    }

    /// All agents by id.
    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Current acting order, highest energy first.
    pub fn ranking(&self) -> &[AgentId] {
        &self.ranking
    }

    pub fn ranked_agents(&self) -> impl Iterator<Item = &Agent> {
        self.ranking.iter().filter_map(|id| self.agents.get(*id))
    }

    pub fn tracked_agent(&self) -> Option<&Agent> {
        self.tracked.and_then(|id| self.agents.get(id))
    }

    pub fn living_count(&self) -> usize {
        self.agents.iter().filter(|a| a.is_alive()).count()
    }

    pub fn total_agent_energy(&self) -> f64 {
        self.agents.iter().map(|a| a.energy()).sum()
    }

    pub(crate) fn agent_mut(&mut self, id: AgentId) -> Result<&mut Agent, SimError> {
        self.agents.get_mut(id).ok_or(SimError::AgentNotFound(id))
    }

    pub(crate) fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Apply an energy change to an agent and keep the grid mirror in step.
    pub(crate) fn apply_energy(
        &mut self,
        id: AgentId,
        delta: f64,
        source: Option<Position>,
    ) -> Result<f64, SimError> {
        let agent = self.agents.get_mut(id).ok_or(SimError::AgentNotFound(id))?;
        let actual = agent.apply_energy_delta(delta, source);
        if let Some(position) = agent.position {
            self.grid.set_energy(position, agent.energy());
        }
        Ok(actual)
    }

    /// Try to move an agent to `target`. Never relocates.
    pub(crate) fn move_agent(&mut self, id: AgentId, target: Position) -> Result<bool, SimError> {
        let agent = self.agents.get_mut(id).ok_or(SimError::AgentNotFound(id))?;
        let placed = self.grid.place(
            Occupant::Agent(id),
            agent.position,
            Placement::At(target),
            false,
            agent.energy(),
            &mut self.rng,
        );
        match placed {
            Some(position) if Some(position) != agent.position => {
                agent.position = Some(position);
                Ok(true)
            }
            Some(_) => Ok(true),
            None => Ok(false),
        }
    }

    /// Bring a dead agent back at full energy on a random free tile.
    /// Returns the energy it regained and where it landed.
    pub(crate) fn respawn_agent(&mut self, id: AgentId) -> Result<(f64, Position), SimError> {
        let Some(target) = self.grid.find_free_tile(&mut self.rng) else {
            let name = self.agent(id).map(|a| a.name.clone()).unwrap_or_default();
            error!(agent = id, %name, "no free tile for respawn");
            return Err(SimError::RespawnFailed { agent: id, name });
        };

        let agent = self.agents.get_mut(id).ok_or(SimError::AgentNotFound(id))?;
        let regained = agent.respawn();
        let placed = self.grid.place(
            Occupant::Agent(id),
            agent.position,
            Placement::At(target),
            false,
            agent.energy(),
            &mut self.rng,
        );
        match placed {
            Some(position) => {
                agent.position = Some(position);
                Ok((regained, position))
            }
            None => Err(SimError::RespawnFailed {
                agent: id,
                name: agent.name.clone(),
            }),
        }
    }

    /// Stable sort by energy, highest first; ties keep the previous order.
    pub(crate) fn rerank(&mut self) {
        let agents = &self.agents;
        self.ranking
            .sort_by(|&a, &b| agents[b].energy().total_cmp(&agents[a].energy()));
    }

    pub fn check_conservation(&self) -> Result<(), SimError> {
        let grid_total = self.grid.total_energy();
        let agent_total: f64 = self
            .agents
            .iter()
            .filter(|a| a.position.is_some())
            .map(|a| a.energy())
            .sum();
        if (grid_total - agent_total).abs() > ENERGY_EPSILON {
            error!(tick = self.tick, grid_total, agent_total, "energy conservation violated");
            return Err(SimError::ConservationViolated {
                tick: self.tick,
                grid_total,
                agent_total,
            });
        }
        Ok(())
    }
}
