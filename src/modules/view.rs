use serde::{Deserialize, Serialize};

use crate::modules::entity::{AgentId, Appearance, Background, Occupant, RecyclingPolicy, Thing};
use crate::modules::grid::Position;
use crate::modules::world::World;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub id: AgentId,
    pub name: String,
    pub appearance: Appearance,
    pub position: Option<Position>,
    pub energy: f64,
    pub max_energy: f64,
    pub alive: bool,
    pub recycling_policy: RecyclingPolicy,
    pub last_action: String,
    pub last_action_succeeded: bool,
    pub action_icon: char,
    pub steps_taken: u64,
    pub touch_negative: [[f64; 3]; 3],
    pub touch_positive: [[f64; 3]; 3],
}

/// Read-only picture of a world between two ticks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub name: String,
    pub tick: u64,
    pub seed: f64,
    pub width: usize,
    pub height: usize,
    pub background: Background,
    /// Top row (highest `y`) first, so rows print in reading order.
    pub rows: Vec<Vec<Appearance>>,
    /// In acting order for the next tick.
    pub agents: Vec<AgentSnapshot>,
    pub tracked: Option<AgentId>,
    pub block_count: usize,
    pub living: usize,
    pub total_energy: f64,
}

impl WorldSnapshot {
    pub fn tracked_agent(&self) -> Option<&AgentSnapshot> {
        let id = self.tracked?;
        self.agents.iter().find(|a| a.id == id)
    }
}

impl World {
    /// What sits on a tile, falling back to the background.
    pub fn appearance_at(&self, position: Position) -> Option<&Appearance> {
        match self.grid().occupant_at(position) {
            Some(Occupant::Agent(id)) => self.agent(id).map(|a| a.appearance()),
            Some(Occupant::Block(id)) => self.blocks().get(id).map(|b| b.appearance()),
            None => self.grid().tile_at(position).map(|t| t.appearance()),
        }
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        let grid = self.grid();
        let rows = (0..grid.height())
            .rev()
            .map(|y| {
                (0..grid.width())
                    .map(|x| {
                        self.appearance_at(Position::new(x as i32, y as i32))
                            .cloned()
                            .unwrap_or_else(|| self.tile().clone())
                    })
                    .collect()
            })
            .collect();

        let agents = self
            .ranked_agents()
            .map(|agent| AgentSnapshot {
                id: agent.id,
                name: agent.name.clone(),
                appearance: agent.appearance().clone(),
                position: agent.position,
                energy: agent.energy(),
                max_energy: agent.max_energy,
                alive: agent.is_alive(),
                recycling_policy: agent.recycling_policy,
                last_action: agent.last_action().to_string(),
                last_action_succeeded: agent.last_action_succeeded(),
                action_icon: agent.action_icon(),
                steps_taken: agent.steps_taken(),
                touch_negative: *agent.touch_negative().cells(),
                touch_positive: *agent.touch_positive().cells(),
            })
            .collect();

        WorldSnapshot {
            name: self.name().to_string(),
            tick: self.tick(),
            seed: self.seed(),
            width: grid.width(),
            height: grid.height(),
            background: self.background(),
            rows,
            agents,
            tracked: self.tracked_agent().map(|a| a.id),
            block_count: self.block_count(),
            living: self.living_count(),
            total_energy: grid.total_energy(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::action::ActionCosts;
    use crate::modules::entity::{Color, EnergyProfile, Intensity};
    use crate::modules::grid::Placement;
    use crate::modules::mind::Mind;

    #[test]
    fn rows_are_printed_top_down() {
        let mut world = World::new(
            "view",
            2,
            2,
            Appearance::new(".", Color::Black, Intensity::Normal),
            ActionCosts::default(),
            0.0,
        );
        world.add_block(
            "rock",
            Appearance::new("#", Color::White, Intensity::Normal),
            Placement::At(Position::new(0, 1)),
        );
        world.add_agent(
            "bug",
            Appearance::new("@", Color::Green, Intensity::Bright),
            EnergyProfile {
                initial: 4.0,
                maximum: 4.0,
                bite_power: 0.0,
                step_cost: 0.0,
                move_cost: 0.0,
                recycling_policy: RecyclingPolicy::NonRechargeable,
            },
            Mind::default(),
            Placement::At(Position::new(1, 0)),
        );

        let snapshot = world.snapshot();
        let glyphs: Vec<String> = snapshot
            .rows
            .iter()
            .map(|row| row.iter().map(|a| a.aspect.as_str()).collect())
            .collect();

        assert_eq!(glyphs, vec!["#.", ".@"]);
        assert_eq!(snapshot.tracked_agent().map(|a| a.name.as_str()), Some("bug"));
        assert_eq!(snapshot.total_energy, 4.0);
        assert_eq!(snapshot.agents[0].action_icon, '·');
        assert_eq!(snapshot.background, Background::default());

        world.set_background(Background {
            color: Color::Cyan,
            intensity: Intensity::Bright,
        });
        assert_eq!(world.snapshot().background.color, Color::Cyan);
    }
}
