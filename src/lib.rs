pub mod modules;

pub use modules::action::{Action, ActionCosts, ActionKind, NEIGHBOURS};
pub use modules::config::{AgentDef, BlockDef, SimulationDef, TileDef, WorldDef};
pub use modules::entity::{
    Agent, AgentId, Appearance, Background, Block, BlockId, Color, EnergyProfile, Intensity, Occupant,
    RecyclingPolicy, Thing, Tile, TouchMap,
};
pub use modules::error::{ConfigError, SimError};
pub use modules::grid::{Grid, Placement, Position};
pub use modules::mind::{
    AlwaysRest, Field, FullView, Learning, LearningDef, LocalView, Mind, NoLearning, Percept,
    Perception, PerceptionDef, Policy, PolicyDef, Script, Sensed, ValueTally, Wanderer,
};
pub use modules::resolve::{FailureReason, Resolution};
pub use modules::state::{self, RuntimeState, SeedSource, StateDir, Status};
pub use modules::stats::{ActionStats, ActionStatsStore, load_action_stats, save_action_stats};
pub use modules::view::{AgentSnapshot, WorldSnapshot};
pub use modules::vm::{ActionOutcome, Event, RunControl, RunState, TickResult, Vm};
pub use modules::world::{ENERGY_EPSILON, World};
