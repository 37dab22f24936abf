use std::fmt;

use serde::{Deserialize, Serialize};

use crate::modules::action::Action;
use crate::modules::grid::Position;
use crate::modules::mind::Mind;

pub type AgentId = usize;
pub type BlockId = usize;

/// The eight basic terminal colors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Black,
    Blue,
    Cyan,
    Green,
    Magenta,
    Red,
    White,
    Yellow,
}

impl Color {
    pub const fn label(self) -> &'static str {
        match self {
            Color::Black => "black",
            Color::Blue => "blue",
            Color::Cyan => "cyan",
            Color::Green => "green",
            Color::Magenta => "magenta",
            Color::Red => "red",
            Color::White => "white",
            Color::Yellow => "yellow",
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intensity {
    #[default]
    Normal,
    Bright,
}

/// How a thing is drawn: one glyph plus color and intensity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appearance {
    pub aspect: String,
    pub color: Color,
    pub intensity: Intensity,
}

impl Appearance {
    pub fn new(aspect: impl Into<String>, color: Color, intensity: Intensity) -> Self {
        Self {
            aspect: aspect.into(),
            color,
            intensity,
        }
    }

    /// Dead agents keep their glyph but lose their color.
    pub fn dead(aspect: &str) -> Self {
        Self::new(aspect, Color::Black, Intensity::Bright)
    }
}

/// Color behind every tile of the board.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Background {
    pub color: Color,
    pub intensity: Intensity,
}

impl Default for Background {
    fn default() -> Self {
        Self {
            color: Color::Black,
            intensity: Intensity::Normal,
        }
    }
}

/// Capability shared by everything that can be drawn on the board.
pub trait Thing {
    fn name(&self) -> &str;
    fn appearance(&self) -> &Appearance;
    fn position(&self) -> Option<Position>;
}

/// Handle stored in the grid for whatever sits on a tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Occupant {
    Block(BlockId),
    Agent(AgentId),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Tile {
    pub appearance: Appearance,
    pub position: Position,
}

impl Thing for Tile {
    fn name(&self) -> &str {
        "tile"
    }

    fn appearance(&self) -> &Appearance {
        &self.appearance
    }

    fn position(&self) -> Option<Position> {
        Some(self.position)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    pub id: BlockId,
    pub name: String,
    pub appearance: Appearance,
    pub position: Option<Position>,
}

impl Thing for Block {
    fn name(&self) -> &str {
        &self.name
    }

    fn appearance(&self) -> &Appearance {
        &self.appearance
    }

    fn position(&self) -> Option<Position> {
        self.position
    }
}

/// What happens to an agent once its energy reaches zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecyclingPolicy {
    /// Stays on the board, dead.
    #[default]
    NonRechargeable,
    /// Stays on the board, dead. Reserved for a future recharge path.
    Rechargeable,
    /// Never loses energy.
    Everlasting,
    /// Comes back at full energy on a random free tile.
    Respawnable,
}

impl fmt::Display for RecyclingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RecyclingPolicy::NonRechargeable => "non_rechargeable",
            RecyclingPolicy::Rechargeable => "rechargeable",
            RecyclingPolicy::Everlasting => "everlasting",
            RecyclingPolicy::Respawnable => "respawnable",
        };
        write!(f, "{}", label)
    }
}

/// 3x3 accumulator centered on the agent, indexed `[row][col]` where
/// `row = 1 + dy` and `col = 1 + dx` for a source at offset `(dx, dy)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TouchMap {
    cells: [[f64; 3]; 3],
}

impl TouchMap {
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.cells[row][col]
    }

    pub fn cells(&self) -> &[[f64; 3]; 3] {
        &self.cells
    }

    fn add(&mut self, row: usize, col: usize, amount: f64) {
        self.cells[row][col] += amount;
    }

    pub fn clear(&mut self) {
        self.cells = [[0.0; 3]; 3];
    }

    pub fn is_clear(&self) -> bool {
        self.cells.iter().flatten().all(|v| *v == 0.0)
    }
}

/// Energy parameters an agent is created with.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnergyProfile {
    pub initial: f64,
    pub maximum: f64,
    pub bite_power: f64,
    /// Paid every tick; zero or negative.
    pub step_cost: f64,
    /// Scaled by the action's energy ratio; zero or negative.
    pub move_cost: f64,
    #[serde(default)]
    pub recycling_policy: RecyclingPolicy,
}

#[derive(Debug)]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    appearance: Appearance,
    original_appearance: Appearance,
    pub position: Option<Position>,
    energy: f64,
    pub max_energy: f64,
    pub bite_power: f64,
    pub step_cost: f64,
    pub move_cost: f64,
    pub recycling_policy: RecyclingPolicy,
    current_energy_delta: f64,
    touch_negative: TouchMap,
    touch_positive: TouchMap,
    steps_taken: u64,
    last_action: Action,
    last_action_succeeded: bool,
    action_icon: char,
    pub(crate) mind: Mind,
}

impl Agent {
    pub fn new(
        id: AgentId,
        name: impl Into<String>,
        appearance: Appearance,
        profile: EnergyProfile,
        mind: Mind,
    ) -> Self {
        let energy = profile.initial.clamp(0.0, profile.maximum);
        let mut agent = Self {
            id,
            name: name.into(),
            appearance: appearance.clone(),
            original_appearance: appearance,
            position: None,
            energy,
            max_energy: profile.maximum,
            bite_power: profile.bite_power,
            step_cost: profile.step_cost,
            move_cost: profile.move_cost,
            recycling_policy: profile.recycling_policy,
            current_energy_delta: 0.0,
            touch_negative: TouchMap::default(),
            touch_positive: TouchMap::default(),
            steps_taken: 0,
            last_action: Action::Rest,
            last_action_succeeded: true,
            action_icon: Action::Rest.icon(),
            mind,
        };
        if agent.energy <= 0.0 {
            agent.appearance = Appearance::dead(&agent.original_appearance.aspect);
        }
        agent
    }

    pub fn energy(&self) -> f64 {
        self.energy
    }

    pub fn is_alive(&self) -> bool {
        self.energy > 0.0
    }

    /// Net energy change since the start of the current tick.
    pub fn current_energy_delta(&self) -> f64 {
        self.current_energy_delta
    }

    pub fn touch_negative(&self) -> &TouchMap {
        &self.touch_negative
    }

    pub fn touch_positive(&self) -> &TouchMap {
        &self.touch_positive
    }

    pub fn steps_taken(&self) -> u64 {
        self.steps_taken
    }

    pub fn last_action(&self) -> Action {
        self.last_action
    }

    pub fn last_action_succeeded(&self) -> bool {
        self.last_action_succeeded
    }

    pub fn action_icon(&self) -> char {
        self.action_icon
    }

    pub fn original_appearance(&self) -> &Appearance {
        &self.original_appearance
    }

    /// Apply `delta` clamped to `[0, max_energy]` and return the change that
    /// actually happened. `source` is the tile the energy came from or went
    /// to (the agent's own tile when `None`).
    pub fn apply_energy_delta(&mut self, delta: f64, source: Option<Position>) -> f64 {
        if self.recycling_policy == RecyclingPolicy::Everlasting {
            return delta;
        }

        let previous = self.energy;
        self.energy = (self.energy + delta).clamp(0.0, self.max_energy);
        let actual = self.energy - previous;
        self.current_energy_delta += actual;
        self.record_touch(actual, source);

        if self.energy <= 0.0 {
            self.appearance = Appearance::dead(&self.original_appearance.aspect);
        }

        actual
    }

    fn record_touch(&mut self, actual: f64, source: Option<Position>) {
        if actual == 0.0 {
            return;
        }
        let (row, col) = match (self.position, source) {
            (Some(own), Some(src)) => (1 + src.y - own.y, 1 + src.x - own.x),
            _ => (1, 1),
        };
        if !(0..3).contains(&row) || !(0..3).contains(&col) {
            return;
        }

        let (row, col) = (row as usize, col as usize);
        if actual < 0.0 {
            self.touch_negative.add(row, col, actual);
        } else {
            self.touch_positive.add(row, col, actual);
        }
    }

    /// Back to full energy and a fresh per-tick state. Lifetime counters
    /// such as `steps_taken` survive.
    pub fn respawn(&mut self) -> f64 {
        let previous = self.energy;
        self.energy = self.max_energy;
        self.appearance = self.original_appearance.clone();
        self.current_energy_delta = 0.0;
        self.touch_negative.clear();
        self.touch_positive.clear();
        self.last_action = Action::Rest;
        self.last_action_succeeded = true;
        self.action_icon = Action::Rest.icon();
        self.energy - previous
    }

    pub(crate) fn begin_tick(&mut self) {
        self.current_energy_delta = 0.0;
    }

    /// Close the agent's own turn. Touch maps restart here, so what they
    /// hold at the end of a tick came from agents acting after this one.
    pub(crate) fn finish_turn(&mut self, action: Action, succeeded: bool) {
        self.touch_negative.clear();
        self.touch_positive.clear();
        self.last_action = action;
        self.last_action_succeeded = succeeded;
        self.action_icon = action.icon();
        self.steps_taken += 1;
    }
}

impl Thing for Agent {
    fn name(&self) -> &str {
        &self.name
    }

    fn appearance(&self) -> &Appearance {
        &self.appearance
    }

    fn position(&self) -> Option<Position> {
        self.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(initial: f64, maximum: f64) -> EnergyProfile {
        EnergyProfile {
            initial,
            maximum,
            bite_power: 5.0,
            step_cost: -1.0,
            move_cost: -1.0,
            recycling_policy: RecyclingPolicy::NonRechargeable,
        }
    }

    fn agent(initial: f64, maximum: f64) -> Agent {
        let mut a = Agent::new(
            0,
            "bug",
            Appearance::new("@", Color::Green, Intensity::Bright),
            profile(initial, maximum),
            Mind::default(),
        );
        a.position = Some(Position::new(4, 4));
        a
    }

    #[test]
    fn gains_are_clamped_to_max_energy() {
        let mut a = agent(8.0, 10.0);
        let actual = a.apply_energy_delta(5.0, None);

        assert_eq!(actual, 2.0);
        assert_eq!(a.energy(), 10.0);
        assert_eq!(a.current_energy_delta(), 2.0);
        assert_eq!(a.touch_positive().get(1, 1), 2.0);
    }

    #[test]
    fn losses_are_clamped_to_zero_and_mark_death() {
        let mut a = agent(3.0, 10.0);
        let actual = a.apply_energy_delta(-5.0, Some(Position::new(5, 3)));

        assert_eq!(actual, -3.0);
        assert_eq!(a.energy(), 0.0);
        assert!(!a.is_alive());
        // source is one right and one down of the agent
        assert_eq!(a.touch_negative().get(0, 2), -3.0);
        assert_eq!(a.appearance().color, Color::Black);
        assert_eq!(a.original_appearance().color, Color::Green);
    }

    #[test]
    fn deltas_accumulate_within_a_tick() {
        let mut a = agent(50.0, 100.0);
        a.apply_energy_delta(-1.0, None);
        a.apply_energy_delta(3.0, Some(Position::new(4, 5)));

        assert_eq!(a.current_energy_delta(), 2.0);
        assert_eq!(a.touch_negative().get(1, 1), -1.0);
        assert_eq!(a.touch_positive().get(2, 1), 3.0);

        a.finish_turn(Action::Rest, true);
        assert_eq!(a.current_energy_delta(), 2.0);
        assert!(a.touch_negative().is_clear());
        assert!(a.touch_positive().is_clear());

        a.apply_energy_delta(-4.0, Some(Position::new(3, 4)));
        a.begin_tick();
        assert_eq!(a.current_energy_delta(), 0.0);
        assert_eq!(a.touch_negative().get(1, 0), -4.0);
    }

    #[test]
    fn everlasting_agents_ignore_deltas() {
        let mut a = agent(30.0, 30.0);
        a.recycling_policy = RecyclingPolicy::Everlasting;

        assert_eq!(a.apply_energy_delta(-12.0, None), -12.0);
        assert_eq!(a.energy(), 30.0);
        assert_eq!(a.current_energy_delta(), 0.0);
        assert!(a.touch_negative().is_clear());
    }

    #[test]
    fn respawn_restores_energy_and_appearance() {
        let mut a = agent(2.0, 20.0);
        a.finish_turn(Action::Move { dx: 1, dy: 0 }, true);
        a.apply_energy_delta(-2.0, None);
        assert!(!a.is_alive());

        let actual = a.respawn();

        assert_eq!(actual, 20.0);
        assert_eq!(a.energy(), 20.0);
        assert_eq!(a.appearance(), a.original_appearance());
        assert!(a.touch_negative().is_clear());
        assert!(a.touch_positive().is_clear());
        assert_eq!(a.last_action(), Action::Rest);
        assert_eq!(a.steps_taken(), 1);
    }

    #[test]
    fn zero_initial_energy_starts_dead() {
        let a = agent(0.0, 10.0);
        assert!(!a.is_alive());
        assert_eq!(a.appearance().color, Color::Black);
    }
}
