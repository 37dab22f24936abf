use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::modules::action::{ActionCosts, ActionKind};
use crate::modules::entity::{Appearance, Background, Color, EnergyProfile, Intensity, RecyclingPolicy};
use crate::modules::error::ConfigError;
use crate::modules::grid::Position;
use crate::modules::mind::{LearningDef, PerceptionDef, PolicyDef, parse_script};

/// Everything needed to build a [`World`](crate::modules::world::World).
///
/// Every section is optional in YAML; a missing section falls back to the
/// stock "Random Blox" world.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationDef {
    pub world: WorldDef,
    pub tile: TileDef,
    pub blocks: Vec<BlockDef>,
    pub agents: Vec<AgentDef>,
    pub action_costs: ActionCosts,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldDef {
    pub name: String,
    pub width: usize,
    pub height: usize,
    pub background_color: Color,
    pub background_intensity: Intensity,
    /// Relative spread of block counts around `width`, in `[0, 1]`.
    pub block_density_variance: f64,
    /// `None` runs at full speed.
    pub frames_per_second: Option<f64>,
    pub pause_at_tick: Option<u64>,
    pub start_paused: bool,
    /// `None` seeds from the clock.
    pub random_seed: Option<f64>,
    pub exit_if_empty: bool,
    pub exit_at_tick: Option<u64>,
}

impl WorldDef {
    pub fn background(&self) -> Background {
        Background {
            color: self.background_color,
            intensity: self.background_intensity,
        }
    }
}

impl Default for WorldDef {
    fn default() -> Self {
        Self {
            name: "Random Blox".to_string(),
            width: 20,
            height: 15,
            background_color: Color::Black,
            background_intensity: Intensity::Normal,
            block_density_variance: 0.4,
            frames_per_second: Some(2.0),
            pause_at_tick: None,
            start_paused: false,
            random_seed: None,
            exit_if_empty: false,
            exit_at_tick: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TileDef {
    pub aspect: String,
    pub color: Color,
    #[serde(default)]
    pub intensity: Intensity,
}

impl Default for TileDef {
    fn default() -> Self {
        Self {
            aspect: "·".to_string(),
            color: Color::Black,
            intensity: Intensity::Bright,
        }
    }
}

impl TileDef {
    pub fn appearance(&self) -> Appearance {
        Appearance::new(self.aspect.clone(), self.color, self.intensity)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockDef {
    /// `None` draws the count around the world width.
    #[serde(default)]
    pub count: Option<usize>,
    pub name: String,
    pub aspect: String,
    pub color: Color,
    #[serde(default)]
    pub intensity: Intensity,
}

impl BlockDef {
    pub fn appearance(&self) -> Appearance {
        Appearance::new(self.aspect.clone(), self.color, self.intensity)
    }
}

fn default_count() -> usize {
    1
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentDef {
    #[serde(default = "default_count")]
    pub count: usize,
    pub name: String,
    pub aspect: String,
    pub color: Color,
    #[serde(default)]
    pub intensity: Intensity,
    /// `None` places the agent on a random free tile.
    #[serde(default)]
    pub initial_position: Option<Position>,
    pub energy: EnergyProfile,
    #[serde(default)]
    pub perception: Option<PerceptionDef>,
    #[serde(default)]
    pub action: Option<PolicyDef>,
    #[serde(default)]
    pub learning: Option<LearningDef>,
    /// Action strings played by the `script` policy.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub script: Vec<String>,
}

impl AgentDef {
    pub fn appearance(&self) -> Appearance {
        Appearance::new(self.aspect.clone(), self.color, self.intensity)
    }

    /// Instance name; numbered only when the definition spawns several.
    pub fn instance_name(&self, index: usize) -> String {
        if self.count > 1 {
            format!("{}_{}", self.name, index)
        } else {
            self.name.clone()
        }
    }
}

fn block(name: &str, aspect: &str, color: Color, count: Option<usize>) -> BlockDef {
    BlockDef {
        count,
        name: name.to_string(),
        aspect: aspect.to_string(),
        color,
        intensity: Intensity::Normal,
    }
}

fn wanderer(
    count: usize,
    name: &str,
    aspect: &str,
    color: Color,
    energy: (f64, f64, f64, f64, f64),
    recycling_policy: RecyclingPolicy,
) -> AgentDef {
    let (initial, maximum, bite_power, step_cost, move_cost) = energy;
    AgentDef {
        count,
        name: name.to_string(),
        aspect: aspect.to_string(),
        color,
        intensity: Intensity::Bright,
        initial_position: None,
        energy: EnergyProfile {
            initial,
            maximum,
            bite_power,
            step_cost,
            move_cost,
            recycling_policy,
        },
        perception: None,
        action: Some(PolicyDef::Wanderer),
        learning: None,
        script: Vec::new(),
    }
}

impl Default for SimulationDef {
    fn default() -> Self {
        use RecyclingPolicy::*;

        let mut apple = wanderer(5, "apple", "●", Color::Red, (20.0, 20.0, 0.0, -0.001, 0.0), Respawnable);
        apple.action = Some(PolicyDef::Rest);
        let mut star = wanderer(5, "star", "*", Color::Yellow, (30.0, 30.0, 0.0, 0.0, 0.0), Everlasting);
        star.action = Some(PolicyDef::Rest);

        Self {
            world: WorldDef::default(),
            tile: TileDef::default(),
            blocks: vec![
                block("fence", "#", Color::White, Some(10)),
                block("stone", "▓", Color::White, Some(40)),
            ],
            agents: vec![
                wanderer(3, "bugggy", "⚉", Color::Green, (100.0, 110.0, 5.0, -0.1, -1.0), NonRechargeable),
                wanderer(1, "Omi", "Ω", Color::Blue, (100.0, 110.0, 5.0, -1.0, -0.1), NonRechargeable),
                wanderer(3, "foe", "Д", Color::Magenta, (100.0, 110.0, 10.0, -1.0, -0.1), NonRechargeable),
                apple,
                star,
            ],
            action_costs: ActionCosts::default(),
        }
    }
}

impl SimulationDef {
    /// Load and validate a definition from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let def: Self = serde_yml::from_str(yaml)?;
        def.validate()?;
        Ok(def)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yml::to_string(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let world = &self.world;
        if world.width == 0 || world.height == 0 {
            return Err(invalid(format!(
                "world must be at least 1x1, got {}x{}",
                world.width, world.height
            )));
        }
        if !(0.0..=1.0).contains(&world.block_density_variance) {
            return Err(invalid(format!(
                "block_density_variance must be within [0, 1], got {}",
                world.block_density_variance
            )));
        }
        if let Some(fps) = world.frames_per_second {
            if !fps.is_finite() || fps <= 0.0 {
                return Err(invalid(format!("frames_per_second must be positive, got {}", fps)));
            }
        }
        if let Some(seed) = world.random_seed {
            if !seed.is_finite() {
                return Err(invalid("random_seed must be a finite number".to_string()));
            }
        }

        for (kind, ratio) in self.action_costs.iter() {
            if !ratio.is_finite() {
                return Err(invalid(format!("energy ratio for {} is not finite", kind)));
            }
        }
        for kind in [ActionKind::Rest, ActionKind::Move, ActionKind::Eat] {
            if self.action_costs.ratio(kind).is_none() {
                tracing::warn!(%kind, "no energy ratio configured; agents choosing it will abort the run");
            }
        }

        for agent in &self.agents {
            validate_agent(agent)?;
        }
        Ok(())
    }
}

fn validate_agent(agent: &AgentDef) -> Result<(), ConfigError> {
    let e = &agent.energy;
    let name = &agent.name;
    if ![e.initial, e.maximum, e.bite_power, e.step_cost, e.move_cost]
        .iter()
        .all(|v| v.is_finite())
    {
        return Err(invalid(format!("agent {}: energy values must be finite", name)));
    }
    if e.maximum < 0.0 || e.initial < 0.0 || e.initial > e.maximum {
        return Err(invalid(format!(
            "agent {}: need 0 <= initial <= maximum, got initial {} maximum {}",
            name, e.initial, e.maximum
        )));
    }
    if e.bite_power < 0.0 {
        return Err(invalid(format!("agent {}: bite_power must not be negative", name)));
    }
    if e.step_cost > 0.0 || e.move_cost > 0.0 {
        return Err(invalid(format!(
            "agent {}: step_cost and move_cost must be zero or negative",
            name
        )));
    }
    if agent.action == Some(PolicyDef::Script) {
        if agent.script.is_empty() {
            return Err(invalid(format!("agent {}: script policy needs a script", name)));
        }
        parse_script(&agent.script)
            .map_err(|e| invalid(format!("agent {}: {}", name, e)))?;
    }
    Ok(())
}

fn invalid(message: String) -> ConfigError {
    ConfigError::Invalid(message)
}
