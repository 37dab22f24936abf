use std::fmt;

use serde::Serialize;
use tracing::{debug, error};

use crate::modules::action::Action;
use crate::modules::entity::{AgentId, Occupant};
use crate::modules::error::SimError;
use crate::modules::grid::Position;
use crate::modules::vm::Event;
use crate::modules::world::World;

/// Why an action did nothing useful. Failures are ordinary outcomes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The action would have pushed energy below zero.
    Unaffordable,
    /// Destination occupied or off the board.
    Blocked,
    /// Nothing alive on the target tile.
    NoPrey,
    /// The bite moved no energy.
    NothingGained,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureReason::Unaffordable => "not enough energy",
            FailureReason::Blocked => "blocked",
            FailureReason::NoPrey => "no prey",
            FailureReason::NothingGained => "nothing gained",
        };
        write!(f, "{}", label)
    }
}

/// Result of resolving one agent's action.
#[derive(Clone, Debug, PartialEq)]
pub struct Resolution {
    pub succeeded: bool,
    /// Net change of the acting agent's energy caused by this action.
    pub energy_delta: f64,
    pub events: Vec<Event>,
}

fn invalid(agent: AgentId, action: Action, reason: &'static str) -> SimError {
    error!(agent, %action, reason, "invalid action");
    SimError::InvalidAction {
        agent,
        action,
        reason,
    }
}

fn check_arguments(agent: AgentId, action: Action) -> Result<(), SimError> {
    match action {
        Action::Rest => Ok(()),
        Action::Move { dx: 0, dy: 0 } => Err(invalid(agent, action, "move needs a non-zero offset")),
        Action::Move { .. } => Ok(()),
        Action::Eat { dx, dy } if Position::origin().distance(Position::new(dx, dy)) != 1 => {
            Err(invalid(agent, action, "eat target must be adjacent"))
        }
        Action::Eat { .. } => Ok(()),
    }
}

impl World {
    /// Apply `action` for agent `id` against the grid and the other agents.
    ///
    /// `step_cost` is paid whatever happens. The action's own cost
    /// (`move_cost` times the configured ratio) is only paid on success.
    pub fn resolve_action(&mut self, id: AgentId, action: Action) -> Result<Resolution, SimError> {
        let agent = self.agent(id).ok_or(SimError::AgentNotFound(id))?;
        let position = agent.position.ok_or(SimError::AgentNotFound(id))?;
        let energy = agent.energy();
        let step_cost = agent.step_cost;
        let move_cost = agent.move_cost;
        let was_alive = agent.is_alive();

        let kind = action.kind();
        let Some(ratio) = self.action_costs().ratio(kind) else {
            error!(agent = id, %kind, "no energy ratio for action kind");
            return Err(SimError::UnknownActionKind { agent: id, kind });
        };
        check_arguments(id, action)?;

        let mut events = Vec::new();
        let action_delta = move_cost * ratio;

        // resting is always affordable; everything else must leave energy non-negative
        let affordable = action == Action::Rest || energy + action_delta + step_cost >= 0.0;
        let succeeded = if !affordable {
            self.apply_energy(id, step_cost, None)?;
            events.push(Event::ActionFailed {
                agent_id: id,
                action,
                reason: FailureReason::Unaffordable,
            });
            false
        } else {
            match action {
                Action::Rest => {
                    self.apply_energy(id, action_delta + step_cost, None)?;
                    true
                }
                Action::Move { dx, dy } => {
                    self.resolve_move(id, position, position.offset(dx, dy), action_delta, step_cost, &mut events)?
                }
                Action::Eat { dx, dy } => {
                    self.resolve_eat(id, position, position.offset(dx, dy), action_delta, step_cost, &mut events)?
                }
            }
        };

        let agent = self.agent(id).ok_or(SimError::AgentNotFound(id))?;
        let energy_delta = agent.energy() - energy;
        if was_alive && !agent.is_alive() {
            events.push(Event::AgentDied { agent_id: id });
        }

        debug!(
            tick = self.tick(),
            agent = id,
            %action,
            succeeded,
            energy_delta,
            "action resolved"
        );

        Ok(Resolution {
            succeeded,
            energy_delta,
            events,
        })
    }

    fn resolve_move(
        &mut self,
        id: AgentId,
        from: Position,
        to: Position,
        action_delta: f64,
        step_cost: f64,
        events: &mut Vec<Event>,
    ) -> Result<bool, SimError> {
        if self.move_agent(id, to)? {
            self.apply_energy(id, action_delta + step_cost, None)?;
            events.push(Event::AgentMoved {
                agent_id: id,
                from,
                to,
            });
            return Ok(true);
        }

        self.apply_energy(id, step_cost, None)?;
        events.push(Event::ActionFailed {
            agent_id: id,
            action: Action::Move {
                dx: to.x - from.x,
                dy: to.y - from.y,
            },
            reason: FailureReason::Blocked,
        });
        Ok(false)
    }

    fn resolve_eat(
        &mut self,
        id: AgentId,
        from: Position,
        target: Position,
        action_delta: f64,
        step_cost: f64,
        events: &mut Vec<Event>,
    ) -> Result<bool, SimError> {
        let action = Action::Eat {
            dx: target.x - from.x,
            dy: target.y - from.y,
        };
        self.apply_energy(id, step_cost, None)?;

        let prey = match self.grid().occupant_at(target) {
            Some(Occupant::Agent(prey)) if self.agent(prey).is_some_and(|p| p.is_alive()) => prey,
            _ => {
                events.push(Event::ActionFailed {
                    agent_id: id,
                    action,
                    reason: FailureReason::NoPrey,
                });
                return Ok(false);
            }
        };

        let predator = self.agent(id).ok_or(SimError::AgentNotFound(id))?;
        let bite = if predator.is_alive() {
            predator.bite_power.min(predator.max_energy - predator.energy()).max(0.0)
        } else {
            0.0
        };

        let taken = self.apply_energy(prey, -bite, Some(from))?;
        if self.agent(prey).is_some_and(|p| !p.is_alive()) {
            events.push(Event::AgentDied { agent_id: prey });
        }
        let gained = self.apply_energy(id, -taken, Some(target))?;

        if gained > 0.0 {
            if action_delta != 0.0 {
                self.apply_energy(id, action_delta, None)?;
            }
            events.push(Event::AgentAte {
                agent_id: id,
                prey_id: prey,
                amount: gained,
            });
            Ok(true)
        } else {
            events.push(Event::ActionFailed {
                agent_id: id,
                action,
                reason: FailureReason::NothingGained,
            });
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::action::{ActionCosts, ActionKind};
    use crate::modules::entity::{Appearance, Color, EnergyProfile, Intensity, RecyclingPolicy};
    use crate::modules::grid::Placement;
    use crate::modules::mind::Mind;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn world(width: usize, height: usize) -> World {
        World::new(
            "resolve",
            width,
            height,
            Appearance::new(".", Color::Black, Intensity::Normal),
            ActionCosts::default(),
            1.0,
        )
    }

    fn spawn(world: &mut World, at: Position, energy: (f64, f64), bite: f64, costs: (f64, f64)) -> AgentId {
        world
            .add_agent(
                format!("a{}", world.agents().len()),
                Appearance::new("@", Color::Green, Intensity::Normal),
                EnergyProfile {
                    initial: energy.0,
                    maximum: energy.1,
                    bite_power: bite,
                    step_cost: costs.0,
                    move_cost: costs.1,
                    recycling_policy: RecyclingPolicy::NonRechargeable,
                },
                Mind::default(),
                Placement::At(at),
            )
            .unwrap()
    }

    #[test]
    fn move_into_empty_tile() {
        let mut w = world(3, 3);
        let id = spawn(&mut w, Position::new(1, 1), (10.0, 10.0), 0.0, (-1.0, -2.0));

        let r = w.resolve_action(id, Action::Move { dx: 1, dy: 0 }).unwrap();

        assert!(r.succeeded);
        assert!(close(r.energy_delta, -3.0));
        let agent = w.agent(id).unwrap();
        assert_eq!(agent.position, Some(Position::new(2, 1)));
        assert!(close(agent.energy(), 7.0));
        assert!(w.grid().is_empty(Position::new(1, 1)));
        assert!(close(w.grid().energy_at(Position::new(2, 1)), 7.0));
    }

    #[test]
    fn blocked_move_only_costs_the_step() {
        let mut w = world(3, 1);
        let id = spawn(&mut w, Position::new(2, 0), (10.0, 10.0), 0.0, (-1.0, -2.0));

        let r = w.resolve_action(id, Action::Move { dx: 1, dy: 0 }).unwrap();

        assert!(!r.succeeded);
        assert!(close(w.agent(id).unwrap().energy(), 9.0));
        assert!(matches!(
            r.events.as_slice(),
            [Event::ActionFailed {
                reason: FailureReason::Blocked,
                ..
            }]
        ));
    }

    #[test]
    fn unaffordable_move_is_rejected() {
        let mut w = world(3, 1);
        let id = spawn(&mut w, Position::new(0, 0), (2.0, 10.0), 0.0, (-1.0, -2.0));

        let r = w.resolve_action(id, Action::Move { dx: 1, dy: 0 }).unwrap();

        assert!(!r.succeeded);
        assert_eq!(w.agent(id).unwrap().position, Some(Position::new(0, 0)));
        assert!(close(w.agent(id).unwrap().energy(), 1.0));
    }

    #[test]
    fn free_move_still_needs_the_step_cost() {
        let mut w = World::new(
            "free moves",
            3,
            1,
            Appearance::new(".", Color::Black, Intensity::Normal),
            ActionCosts::default().with(ActionKind::Move, 0.0),
            1.0,
        );
        let id = spawn(&mut w, Position::new(0, 0), (0.5, 10.0), 0.0, (-1.0, -1.0));

        let r = w.resolve_action(id, Action::Move { dx: 1, dy: 0 }).unwrap();

        assert!(!r.succeeded);
        assert_eq!(w.agent(id).unwrap().position, Some(Position::new(0, 0)));
        assert!(close(w.agent(id).unwrap().energy(), 0.0));
        assert!(r.events.contains(&Event::ActionFailed {
            agent_id: id,
            action: Action::Move { dx: 1, dy: 0 },
            reason: FailureReason::Unaffordable,
        }));
    }

    #[test]
    fn starving_predator_cannot_bite() {
        let mut w = world(2, 1);
        let predator = spawn(&mut w, Position::new(0, 0), (0.5, 10.0), 5.0, (-1.0, -1.0));
        let prey = spawn(&mut w, Position::new(1, 0), (5.0, 10.0), 0.0, (0.0, 0.0));

        let r = w.resolve_action(predator, Action::Eat { dx: 1, dy: 0 }).unwrap();

        assert!(!r.succeeded);
        assert!(close(w.agent(prey).unwrap().energy(), 5.0));
        assert!(!w.agent(predator).unwrap().is_alive());
    }

    #[test]
    fn predator_drains_weak_prey() {
        let mut w = world(3, 1);
        let predator = spawn(&mut w, Position::new(0, 0), (50.0, 100.0), 5.0, (-1.0, -1.0));
        let prey = spawn(&mut w, Position::new(1, 0), (3.0, 10.0), 0.0, (-1.0, -1.0));

        let r = w.resolve_action(predator, Action::Eat { dx: 1, dy: 0 }).unwrap();

        assert!(r.succeeded);
        assert!(close(w.agent(predator).unwrap().energy(), 52.0));
        assert!(!w.agent(prey).unwrap().is_alive());
        assert!(r.events.contains(&Event::AgentDied { agent_id: prey }));
        assert!(r.events.contains(&Event::AgentAte {
            agent_id: predator,
            prey_id: prey,
            amount: 3.0
        }));
        // the prey sits one to the right of the predator
        assert!(close(w.agent(predator).unwrap().touch_positive().get(1, 2), 3.0));
        assert!(close(w.agent(prey).unwrap().touch_negative().get(1, 0), -3.0));
        assert!(w.check_conservation().is_ok());
    }

    #[test]
    fn full_predator_gains_nothing() {
        let mut w = world(2, 1);
        let predator = spawn(&mut w, Position::new(0, 0), (10.0, 10.0), 5.0, (0.0, -1.0));
        let prey = spawn(&mut w, Position::new(1, 0), (5.0, 10.0), 0.0, (0.0, -1.0));

        let r = w.resolve_action(predator, Action::Eat { dx: 1, dy: 0 }).unwrap();

        assert!(!r.succeeded);
        assert!(close(w.agent(prey).unwrap().energy(), 5.0));
    }

    #[test]
    fn eating_a_block_or_corpse_fails() {
        let mut w = world(3, 1);
        let predator = spawn(&mut w, Position::new(1, 0), (10.0, 20.0), 5.0, (-1.0, -1.0));
        spawn(&mut w, Position::new(2, 0), (0.0, 10.0), 0.0, (-1.0, -1.0));
        w.add_block("rock", Appearance::new("#", Color::White, Intensity::Normal), Placement::At(Position::new(0, 0)));

        for dx in [-1, 1] {
            let r = w.resolve_action(predator, Action::Eat { dx, dy: 0 }).unwrap();
            assert!(!r.succeeded);
        }
        assert!(close(w.agent(predator).unwrap().energy(), 8.0));
    }

    #[test]
    fn everlasting_prey_feeds_forever() {
        let mut w = world(2, 1);
        let predator = spawn(&mut w, Position::new(0, 0), (10.0, 100.0), 5.0, (0.0, 0.0));
        let star = w
            .add_agent(
                "star",
                Appearance::new("*", Color::Yellow, Intensity::Bright),
                EnergyProfile {
                    initial: 30.0,
                    maximum: 30.0,
                    bite_power: 0.0,
                    step_cost: 0.0,
                    move_cost: 0.0,
                    recycling_policy: RecyclingPolicy::Everlasting,
                },
                Mind::default(),
                Placement::At(Position::new(1, 0)),
            )
            .unwrap();

        for _ in 0..3 {
            assert!(w.resolve_action(predator, Action::Eat { dx: 1, dy: 0 }).unwrap().succeeded);
        }

        assert!(close(w.agent(predator).unwrap().energy(), 25.0));
        assert!(close(w.agent(star).unwrap().energy(), 30.0));
        assert!(w.check_conservation().is_ok());
    }

    #[test]
    fn resting_can_kill() {
        let mut w = world(1, 1);
        let id = spawn(&mut w, Position::new(0, 0), (0.5, 1.0), 0.0, (-1.0, -1.0));

        let r = w.resolve_action(id, Action::Rest).unwrap();

        assert!(r.succeeded);
        assert!(!w.agent(id).unwrap().is_alive());
        assert_eq!(r.events, vec![Event::AgentDied { agent_id: id }]);
    }

    #[test]
    fn missing_ratio_is_fatal() {
        let mut w = World::new(
            "sparse",
            2,
            2,
            Appearance::new(".", Color::Black, Intensity::Normal),
            ActionCosts::empty().with(ActionKind::Rest, 0.0),
            1.0,
        );
        let id = spawn(&mut w, Position::new(0, 0), (5.0, 5.0), 0.0, (-1.0, -1.0));

        assert!(matches!(
            w.resolve_action(id, Action::Move { dx: 1, dy: 0 }),
            Err(SimError::UnknownActionKind {
                kind: ActionKind::Move,
                ..
            })
        ));
    }

    #[test]
    fn malformed_actions_are_fatal() {
        let mut w = world(3, 3);
        let id = spawn(&mut w, Position::new(1, 1), (5.0, 5.0), 1.0, (-1.0, -1.0));

        assert!(matches!(
            w.resolve_action(id, Action::Move { dx: 0, dy: 0 }),
            Err(SimError::InvalidAction { .. })
        ));
        assert!(matches!(
            w.resolve_action(id, Action::Eat { dx: 2, dy: 0 }),
            Err(SimError::InvalidAction { .. })
        ));
        assert!(close(w.agent(id).unwrap().energy(), 5.0));
    }
}
