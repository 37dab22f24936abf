use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::modules::action::Action;
use crate::modules::config::SimulationDef;
use crate::modules::entity::{AgentId, RecyclingPolicy};
use crate::modules::error::{ConfigError, SimError};
use crate::modules::grid::Position;
use crate::modules::mind::Percept;
use crate::modules::resolve::FailureReason;
use crate::modules::view::WorldSnapshot;
use crate::modules::world::World;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    TickStarted {
        tick: u64,
    },
    TickCompleted {
        tick: u64,
    },
    AgentMoved {
        agent_id: AgentId,
        from: Position,
        to: Position,
    },
    AgentAte {
        agent_id: AgentId,
        prey_id: AgentId,
        amount: f64,
    },
    AgentDied {
        agent_id: AgentId,
    },
    AgentRespawned {
        agent_id: AgentId,
        position: Position,
    },
    ActionFailed {
        agent_id: AgentId,
        #[serde(serialize_with = "display")]
        action: Action,
        reason: FailureReason,
    },
    Learned {
        agent_id: AgentId,
        value: f64,
    },
}

fn display<T: fmt::Display, S: serde::Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

/// One agent's turn within a tick.
#[derive(Clone, Debug, PartialEq)]
pub struct ActionOutcome {
    pub agent_id: AgentId,
    pub action: Action,
    pub succeeded: bool,
    pub energy_delta: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickResult {
    pub tick: u64,
    pub events: Vec<Event>,
    pub outcomes: Vec<ActionOutcome>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Running,
    Paused,
    StepByStep,
    Terminated,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RunState::Running => "running",
            RunState::Paused => "paused",
            RunState::StepByStep => "step by step",
            RunState::Terminated => "terminated",
        };
        write!(f, "{}", label)
    }
}

/// Run-level knobs: when to pause, when to stop, how fast to go.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunControl {
    pub state: RunState,
    pub pause_at_tick: Option<u64>,
    pub exit_at_tick: Option<u64>,
    pub exit_if_empty: bool,
    pub frames_per_second: Option<f64>,
    interrupted: bool,
}

impl RunControl {
    pub fn from_definition(def: &SimulationDef) -> Self {
        let world = &def.world;
        Self {
            state: if world.start_paused {
                RunState::Paused
            } else {
                RunState::Running
            },
            pause_at_tick: world.pause_at_tick,
            exit_at_tick: world.exit_at_tick,
            exit_if_empty: world.exit_if_empty,
            frames_per_second: world.frames_per_second,
            interrupted: false,
        }
    }

    pub fn interrupted(&self) -> bool {
        self.interrupted
    }
}

#[derive(Debug)]
pub struct Vm {
    world: World,
    control: RunControl,
}

impl Vm {
    pub fn new(world: World) -> Self {
        Self {
            world,
            control: RunControl::default(),
        }
    }

    pub fn with_control(world: World, control: RunControl) -> Self {
        Self { world, control }
    }

    pub fn from_definition(def: &SimulationDef, seed: f64) -> Result<Self, ConfigError> {
        let world = World::from_definition(def, seed)?;
        Ok(Self::with_control(world, RunControl::from_definition(def)))
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn control(&self) -> &RunControl {
        &self.control
    }

    pub fn control_mut(&mut self) -> &mut RunControl {
        &mut self.control
    }

    pub fn state(&self) -> RunState {
        self.control.state
    }

    pub fn tick(&self) -> u64 {
        self.world.tick()
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        self.world.snapshot()
    }

    pub fn pause(&mut self) {
        if self.control.state != RunState::Terminated {
            self.control.state = RunState::Paused;
        }
    }

    pub fn resume(&mut self) {
        if self.control.state != RunState::Terminated {
            self.control.state = RunState::Running;
        }
    }

    pub fn step_by_step(&mut self) {
        if self.control.state != RunState::Terminated {
            self.control.state = RunState::StepByStep;
        }
    }

    pub fn interrupt(&mut self) {
        self.control.interrupted = true;
        self.control.state = RunState::Terminated;
    }

    pub fn should_terminate(&self) -> bool {
        if self.control.interrupted || self.control.state == RunState::Terminated {
            return true;
        }
        if self
            .control
            .exit_at_tick
            .is_some_and(|limit| self.world.tick() >= limit)
        {
            return true;
        }
        self.control.exit_if_empty && self.world.living_count() == 0
    }

    /// Advance the world by one tick.
    ///
    /// Every agent's per-tick energy delta is reset, then living agents act
    /// one after another in ranking order, each seeing the effects of those
    /// before it and clearing its touch maps once its own action is done. Afterwards dead respawnable agents
    /// come back, the others learn from what happened, conservation is
    /// checked and the ranking is rebuilt for the next tick.
    pub fn step(&mut self) -> Result<TickResult, SimError> {
        let tick = self.world.tick() + 1;
        let mut events = vec![Event::TickStarted { tick }];
        let mut outcomes = Vec::new();

        for id in 0..self.world.agents().len() {
            self.world.agent_mut(id)?.begin_tick();
        }

        let mut acted: Vec<(AgentId, Percept, Action)> = Vec::new();
        let order = self.world.ranking().to_vec();
        for id in order {
            if !self.world.agent(id).is_some_and(|a| a.is_alive()) {
                continue;
            }

            let (percept, action) = self.think(id)?;
            let resolution = self.world.resolve_action(id, action)?;
            self.world.agent_mut(id)?.finish_turn(action, resolution.succeeded);

            events.extend(resolution.events);
            outcomes.push(ActionOutcome {
                agent_id: id,
                action,
                succeeded: resolution.succeeded,
                energy_delta: resolution.energy_delta,
            });
            acted.push((id, percept, action));
        }

        let mut respawned = Vec::new();
        for id in 0..self.world.agents().len() {
            let agent = self.world.agent_mut(id)?;
            if agent.is_alive()
                || agent.position.is_none()
                || agent.recycling_policy != RecyclingPolicy::Respawnable
            {
                continue;
            }
            let (_, position) = self.world.respawn_agent(id)?;
            events.push(Event::AgentRespawned {
                agent_id: id,
                position,
            });
            respawned.push(id);
        }

        for (id, percept, action) in acted {
            if respawned.contains(&id) {
                continue;
            }
            let agent = self.world.agent_mut(id)?;
            let net = agent.current_energy_delta();
            if let Some(value) = agent.mind.learn(&percept, action, net) {
                events.push(Event::Learned {
                    agent_id: id,
                    value,
                });
            }
        }

        self.world.tick = tick;
        self.world.check_conservation()?;
        self.world.rerank();

        if self.control.pause_at_tick == Some(tick) {
            self.pause();
        }

        events.push(Event::TickCompleted { tick });
        debug!(
            tick,
            acted = outcomes.len(),
            living = self.world.living_count(),
            "tick completed"
        );

        Ok(TickResult {
            tick,
            events,
            outcomes,
        })
    }

    /// Ask an agent's mind for a percept and an action. The mind is lent
    /// out of the agent so it can look at the whole world while deciding.
    fn think(&mut self, id: AgentId) -> Result<(Percept, Action), SimError> {
        let mut mind = std::mem::take(&mut self.world.agent_mut(id)?.mind);
        let agent = self.world.agent(id).ok_or(SimError::AgentNotFound(id))?;
        let percept = mind.perceive(agent, &self.world);
        let action = mind.choose(&percept, self.world.rng());
        self.world.agent_mut(id)?.mind = mind;
        Ok((percept, action))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::action::ActionCosts;
    use crate::modules::entity::{Appearance, Color, EnergyProfile, Intensity};
    use crate::modules::grid::Placement;
    use crate::modules::mind::{AlwaysRest, FullView, Mind, Script, ValueTally};

    fn profile(initial: f64, maximum: f64, bite: f64, step: f64, policy: RecyclingPolicy) -> EnergyProfile {
        EnergyProfile {
            initial,
            maximum,
            bite_power: bite,
            step_cost: step,
            move_cost: -1.0,
            recycling_policy: policy,
        }
    }

    fn scripted(actions: Vec<Action>) -> Mind {
        Mind::new(
            Box::new(FullView),
            Box::new(Script::new(actions)),
            Box::new(ValueTally::default()),
        )
    }

    fn vm(width: usize, height: usize) -> Vm {
        Vm::new(World::new(
            "vm",
            width,
            height,
            Appearance::new(".", Color::Black, Intensity::Normal),
            ActionCosts::default(),
            11.0,
        ))
    }

    fn add(vm: &mut Vm, name: &str, at: Position, profile: EnergyProfile, mind: Mind) -> AgentId {
        vm.world_mut()
            .add_agent(
                name,
                Appearance::new("@", Color::Green, Intensity::Normal),
                profile,
                mind,
                Placement::At(at),
            )
            .unwrap()
    }

    #[test]
    fn resting_agent_burns_its_step_cost() {
        let mut vm = vm(2, 2);
        let id = add(
            &mut vm,
            "sleeper",
            Position::new(0, 0),
            profile(10.0, 10.0, 0.0, -0.5, RecyclingPolicy::NonRechargeable),
            Mind::default(),
        );

        let result = vm.step().unwrap();

        assert_eq!(result.tick, 1);
        assert_eq!(vm.tick(), 1);
        assert_eq!(vm.world().agent(id).unwrap().energy(), 9.5);
        assert_eq!(vm.world().grid().total_energy(), 9.5);
        assert_eq!(vm.world().agent(id).unwrap().steps_taken(), 1);
    }

    #[test]
    fn dead_agents_do_not_act() {
        let mut vm = vm(2, 1);
        let id = add(
            &mut vm,
            "fading",
            Position::new(0, 0),
            profile(1.0, 10.0, 0.0, -1.0, RecyclingPolicy::NonRechargeable),
            Mind::default(),
        );

        let first = vm.step().unwrap();
        assert!(first.events.contains(&Event::AgentDied { agent_id: id }));

        let second = vm.step().unwrap();
        assert!(second.outcomes.is_empty());
        assert_eq!(vm.world().agent(id).unwrap().steps_taken(), 1);
        assert_eq!(vm.world().agent(id).unwrap().position, Some(Position::new(0, 0)));
    }

    #[test]
    fn respawnable_agents_come_back_elsewhere() {
        let mut vm = vm(3, 3);
        let id = add(
            &mut vm,
            "apple",
            Position::new(1, 1),
            profile(1.0, 20.0, 0.0, -1.0, RecyclingPolicy::Respawnable),
            scripted(vec![Action::Rest]),
        );

        let result = vm.step().unwrap();

        let apple = vm.world().agent(id).unwrap();
        assert!(apple.is_alive());
        assert_eq!(apple.energy(), 20.0);
        assert_eq!(apple.steps_taken(), 1);
        assert!(result.events.contains(&Event::AgentDied { agent_id: id }));
        assert!(result
            .events
            .iter()
            .any(|e| matches!(e, Event::AgentRespawned { agent_id, .. } if *agent_id == id)));
        // respawned agents skip learning for that tick
        assert!(!result.events.iter().any(|e| matches!(e, Event::Learned { .. })));
        assert!(vm.world().check_conservation().is_ok());
    }

    #[test]
    fn richest_agent_acts_first() {
        let mut vm = vm(3, 1);
        // the poor one is created first but the rich one should reach the
        // middle tile first once the ranking has been rebuilt
        let poor = add(
            &mut vm,
            "poor",
            Position::new(0, 0),
            profile(5.0, 50.0, 0.0, 0.0, RecyclingPolicy::NonRechargeable),
            scripted(vec![Action::Rest, Action::Move { dx: 1, dy: 0 }]),
        );
        let rich = add(
            &mut vm,
            "rich",
            Position::new(2, 0),
            profile(40.0, 50.0, 0.0, 0.0, RecyclingPolicy::NonRechargeable),
            scripted(vec![Action::Rest, Action::Move { dx: -1, dy: 0 }]),
        );

        vm.step().unwrap();
        assert_eq!(vm.world().ranking(), &[rich, poor]);

        let result = vm.step().unwrap();

        assert_eq!(vm.world().agent(rich).unwrap().position, Some(Position::new(1, 0)));
        assert_eq!(vm.world().agent(poor).unwrap().position, Some(Position::new(0, 0)));
        assert_eq!(result.outcomes[0].agent_id, rich);
        assert!(!result.outcomes[1].succeeded);
    }

    #[test]
    fn learning_sees_bites_received_later_in_the_tick() {
        let mut vm = vm(2, 1);
        let prey = add(
            &mut vm,
            "prey",
            Position::new(0, 0),
            profile(50.0, 50.0, 0.0, -1.0, RecyclingPolicy::NonRechargeable),
            scripted(vec![Action::Rest]),
        );
        let hunter = add(
            &mut vm,
            "hunter",
            Position::new(1, 0),
            profile(10.0, 50.0, 4.0, 0.0, RecyclingPolicy::NonRechargeable),
            scripted(vec![Action::Eat { dx: -1, dy: 0 }]),
        );

        let result = vm.step().unwrap();

        assert!(result.events.contains(&Event::Learned {
            agent_id: prey,
            value: -5.0
        }));
        // the prey's own step cost was wiped at the end of its turn, the
        // bite from the hunter acting after it stays
        let p = vm.world().agent(prey).unwrap();
        assert_eq!(p.touch_negative().get(1, 1), 0.0);
        assert_eq!(p.touch_negative().get(1, 2), -4.0);
        let h = vm.world().agent(hunter).unwrap();
        assert!(h.touch_positive().is_clear());
        assert!(h.touch_negative().is_clear());
    }

    #[test]
    fn pauses_at_the_configured_tick() {
        let mut vm = vm(2, 2);
        add(
            &mut vm,
            "a",
            Position::new(0, 0),
            profile(10.0, 10.0, 0.0, 0.0, RecyclingPolicy::NonRechargeable),
            Mind::default(),
        );
        vm.control_mut().pause_at_tick = Some(2);

        vm.step().unwrap();
        assert_eq!(vm.state(), RunState::Running);
        vm.step().unwrap();
        assert_eq!(vm.state(), RunState::Paused);
        vm.resume();
        assert_eq!(vm.state(), RunState::Running);
    }

    #[test]
    fn terminates_on_limits_and_interrupts() {
        let mut vm = vm(2, 2);
        add(
            &mut vm,
            "a",
            Position::new(0, 0),
            profile(1.0, 10.0, 0.0, -1.0, RecyclingPolicy::NonRechargeable),
            Mind::new(Box::new(FullView), Box::new(AlwaysRest), Box::new(ValueTally::default())),
        );

        vm.control_mut().exit_at_tick = Some(5);
        assert!(!vm.should_terminate());

        vm.control_mut().exit_if_empty = true;
        vm.step().unwrap();
        assert!(vm.should_terminate());

        vm.control_mut().exit_if_empty = false;
        assert!(!vm.should_terminate());
        vm.interrupt();
        assert!(vm.should_terminate());
        vm.resume();
        assert_eq!(vm.state(), RunState::Terminated);
    }
}
