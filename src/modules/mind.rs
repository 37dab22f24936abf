use std::collections::BTreeMap;
use std::fmt;

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::modules::action::{Action, ActionKind, NEIGHBOURS};
use crate::modules::entity::{Agent, AgentId, Occupant};
use crate::modules::error::ConfigError;
use crate::modules::grid::Position;
use crate::modules::world::World;

/// What an agent can tell about one tile.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Sensed {
    Outside,
    Empty,
    Block,
    Agent { id: AgentId, alive: bool, energy: f64 },
}

/// Whole-board occupancy, row-major with `y = 0` first.
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    pub width: usize,
    pub height: usize,
    pub cells: Vec<Sensed>,
}

impl Field {
    pub fn at(&self, position: Position) -> Sensed {
        if position.x < 0 || position.y < 0 {
            return Sensed::Outside;
        }
        let (x, y) = (position.x as usize, position.y as usize);
        if x >= self.width || y >= self.height {
            return Sensed::Outside;
        }
        self.cells[y * self.width + x]
    }
}

/// The state handed from perception to action selection and learning.
#[derive(Clone, Debug, PartialEq)]
pub struct Percept {
    pub tick: u64,
    pub agent: AgentId,
    pub position: Position,
    pub energy: f64,
    pub max_energy: f64,
    pub last_action: Action,
    pub last_action_succeeded: bool,
    /// `[1 + dy][1 + dx]`, the agent itself in the middle.
    pub surroundings: [[Sensed; 3]; 3],
    /// Only filled in by perceptions with full visibility.
    pub field: Option<Field>,
}

impl Percept {
    pub fn around(&self, dx: i32, dy: i32) -> Sensed {
        if !(-1..=1).contains(&dx) || !(-1..=1).contains(&dy) {
            return match &self.field {
                Some(field) => field.at(self.position.offset(dx, dy)),
                None => Sensed::Outside,
            };
        }
        self.surroundings[(1 + dy) as usize][(1 + dx) as usize]
    }

    /// Offsets of adjacent empty tiles.
    pub fn open_moves(&self) -> Vec<(i32, i32)> {
        NEIGHBOURS
            .iter()
            .copied()
            .filter(|&(dx, dy)| self.around(dx, dy) == Sensed::Empty)
            .collect()
    }

    /// Offsets of adjacent living agents. Corpses are left out, so a
    /// wanderer never spends a random draw on a bite that cannot succeed.
    pub fn prey(&self) -> Vec<(i32, i32)> {
        NEIGHBOURS
            .iter()
            .copied()
            .filter(|&(dx, dy)| matches!(self.around(dx, dy), Sensed::Agent { alive: true, .. }))
            .collect()
    }
}

fn sense(world: &World, position: Position) -> Sensed {
    if !world.grid().in_bounds(position) {
        return Sensed::Outside;
    }
    match world.grid().occupant_at(position) {
        None => Sensed::Empty,
        Some(Occupant::Block(_)) => Sensed::Block,
        Some(Occupant::Agent(id)) => match world.agent(id) {
            Some(other) => Sensed::Agent {
                id,
                alive: other.is_alive(),
                energy: other.energy(),
            },
            None => Sensed::Empty,
        },
    }
}

fn local_percept(agent: &Agent, world: &World) -> Percept {
    let position = agent.position.unwrap_or_else(Position::origin);
    let mut surroundings = [[Sensed::Outside; 3]; 3];
    for (row, cells) in surroundings.iter_mut().enumerate() {
        for (col, cell) in cells.iter_mut().enumerate() {
            *cell = sense(world, position.offset(col as i32 - 1, row as i32 - 1));
        }
    }

    Percept {
        tick: world.tick(),
        agent: agent.id,
        position,
        energy: agent.energy(),
        max_energy: agent.max_energy,
        last_action: agent.last_action(),
        last_action_succeeded: agent.last_action_succeeded(),
        surroundings,
        field: None,
    }
}

pub trait Perception: fmt::Debug {
    fn perceive(&self, agent: &Agent, world: &World) -> Percept;
}

pub trait Policy: fmt::Debug {
    fn choose(&mut self, percept: &Percept, rng: &mut dyn RngCore) -> Action;
}

pub trait Learning: fmt::Debug {
    /// Returns whatever the strategy wants reported for this tick.
    fn learn(&mut self, percept: &Percept, action: Action, net_energy_delta: f64) -> Option<f64>;
}

/// Sees the whole board.
#[derive(Debug, Default, Clone, Copy)]
pub struct FullView;

impl Perception for FullView {
    fn perceive(&self, agent: &Agent, world: &World) -> Percept {
        let mut percept = local_percept(agent, world);
        let grid = world.grid();
        percept.field = Some(Field {
            width: grid.width(),
            height: grid.height(),
            cells: grid.positions().map(|p| sense(world, p)).collect(),
        });
        percept
    }
}

/// Sees only the eight adjacent tiles.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalView;

impl Perception for LocalView {
    fn perceive(&self, agent: &Agent, world: &World) -> Percept {
        local_percept(agent, world)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysRest;

impl Policy for AlwaysRest {
    fn choose(&mut self, _percept: &Percept, _rng: &mut dyn RngCore) -> Action {
        Action::Rest
    }
}

/// Random walker with some inertia: keeps doing what worked, stops now and
/// then, and bites neighbours when it gets the chance.
#[derive(Debug, Clone, Copy)]
pub struct Wanderer {
    pub inertia: f64,
    pub stopping: f64,
    pub biting: f64,
}

impl Default for Wanderer {
    fn default() -> Self {
        Self {
            inertia: 0.66,
            stopping: 0.1,
            biting: 0.5,
        }
    }
}

impl Policy for Wanderer {
    fn choose(&mut self, percept: &Percept, rng: &mut dyn RngCore) -> Action {
        if rng.r#gen::<f64>() <= self.inertia && percept.last_action_succeeded {
            return percept.last_action;
        }
        if rng.r#gen::<f64>() <= self.stopping {
            return Action::Rest;
        }

        let prey = percept.prey();
        if rng.r#gen::<f64>() <= self.biting && !prey.is_empty() {
            let (dx, dy) = prey[rng.gen_range(0..prey.len())];
            return Action::Eat { dx, dy };
        }

        let moves = percept.open_moves();
        if moves.is_empty() {
            return Action::Rest;
        }
        let (dx, dy) = moves[rng.gen_range(0..moves.len())];
        Action::Move { dx, dy }
    }
}

/// Cycles through a fixed list of actions.
#[derive(Debug, Clone)]
pub struct Script {
    actions: Vec<Action>,
    cursor: usize,
}

impl Script {
    pub fn new(actions: Vec<Action>) -> Self {
        Self { actions, cursor: 0 }
    }
}

impl Policy for Script {
    fn choose(&mut self, _percept: &Percept, _rng: &mut dyn RngCore) -> Action {
        if self.actions.is_empty() {
            return Action::Rest;
        }
        let action = self.actions[self.cursor % self.actions.len()];
        self.cursor = self.cursor.wrapping_add(1);
        action
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoLearning;

impl Learning for NoLearning {
    fn learn(&mut self, _percept: &Percept, _action: Action, _net_energy_delta: f64) -> Option<f64> {
        None
    }
}

/// Running mean of the net energy delta obtained with each action kind.
#[derive(Debug, Default, Clone)]
pub struct ValueTally {
    values: BTreeMap<ActionKind, (u64, f64)>,
}

impl ValueTally {
    pub fn mean(&self, kind: ActionKind) -> Option<f64> {
        self.values.get(&kind).map(|(_, mean)| *mean)
    }

    pub fn samples(&self, kind: ActionKind) -> u64 {
        self.values.get(&kind).map(|(n, _)| *n).unwrap_or(0)
    }
}

impl Learning for ValueTally {
    fn learn(&mut self, _percept: &Percept, action: Action, net_energy_delta: f64) -> Option<f64> {
        let entry = self.values.entry(action.kind()).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += (net_energy_delta - entry.1) / entry.0 as f64;
        Some(entry.1)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerceptionDef {
    #[default]
    Full,
    Local,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyDef {
    #[default]
    Rest,
    Wanderer,
    /// Plays the agent's `script` in a loop.
    Script,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LearningDef {
    #[default]
    None,
    Tally,
}

pub fn parse_script(steps: &[String]) -> Result<Vec<Action>, ConfigError> {
    steps
        .iter()
        .map(|s| s.parse::<Action>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(ConfigError::Invalid)
}

/// The strategy triple an agent thinks with.
#[derive(Debug)]
pub struct Mind {
    perception: Box<dyn Perception>,
    policy: Box<dyn Policy>,
    learning: Box<dyn Learning>,
}

impl Default for Mind {
    fn default() -> Self {
        Self::new(Box::new(FullView), Box::new(AlwaysRest), Box::new(NoLearning))
    }
}

impl Mind {
    pub fn new(
        perception: Box<dyn Perception>,
        policy: Box<dyn Policy>,
        learning: Box<dyn Learning>,
    ) -> Self {
        Self {
            perception,
            policy,
            learning,
        }
    }

    /// Build a mind from its definition. `script` is only read by the
    /// script policy; each entry is an action string such as `move:1,0`.
    pub fn from_defs(
        perception: Option<PerceptionDef>,
        policy: Option<PolicyDef>,
        learning: Option<LearningDef>,
        script: &[String],
    ) -> Result<Self, ConfigError> {
        let perception: Box<dyn Perception> = match perception.unwrap_or_default() {
            PerceptionDef::Full => Box::new(FullView),
            PerceptionDef::Local => Box::new(LocalView),
        };
        let policy: Box<dyn Policy> = match policy.unwrap_or_default() {
            PolicyDef::Rest => Box::new(AlwaysRest),
            PolicyDef::Wanderer => Box::new(Wanderer::default()),
            PolicyDef::Script => Box::new(Script::new(parse_script(script)?)),
        };
        let learning: Box<dyn Learning> = match learning.unwrap_or_default() {
            LearningDef::None => Box::new(NoLearning),
            LearningDef::Tally => Box::new(ValueTally::default()),
        };
        Ok(Self::new(perception, policy, learning))
    }

    pub fn perceive(&self, agent: &Agent, world: &World) -> Percept {
        self.perception.perceive(agent, world)
    }

    pub fn choose(&mut self, percept: &Percept, rng: &mut dyn RngCore) -> Action {
        self.policy.choose(percept, rng)
    }

    pub fn learn(&mut self, percept: &Percept, action: Action, net_energy_delta: f64) -> Option<f64> {
        self.learning.learn(percept, action, net_energy_delta)
    }
}
