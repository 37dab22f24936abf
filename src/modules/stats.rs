use std::collections::BTreeMap;
use std::fs;
use std::io;

use serde::{Deserialize, Serialize};

use crate::modules::action::Action;
use crate::modules::state::StateDir;
use crate::modules::vm::TickResult;
use crate::modules::world::World;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionStats {
    pub rest_count: u64,
    pub move_count: u64,
    pub eat_count: u64,
    pub failed_count: u64,
}

impl ActionStats {
    pub fn record(&mut self, action: &Action, succeeded: bool) {
        match action {
            Action::Rest => self.rest_count = self.rest_count.saturating_add(1),
            Action::Move { .. } => self.move_count = self.move_count.saturating_add(1),
            Action::Eat { .. } => self.eat_count = self.eat_count.saturating_add(1),
        }
        if !succeeded {
            self.failed_count = self.failed_count.saturating_add(1);
        }
    }

    pub fn total(&self) -> u64 {
        self.rest_count + self.move_count + self.eat_count
    }
}

/// Action counts per agent name for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionStatsStore {
    pub per_agent: BTreeMap<String, ActionStats>,
}

impl ActionStatsStore {
    pub fn record_tick(&mut self, world: &World, result: &TickResult) {
        for outcome in &result.outcomes {
            let Some(agent) = world.agent(outcome.agent_id) else {
                continue;
            };
            self.per_agent
                .entry(agent.name.clone())
                .or_default()
                .record(&outcome.action, outcome.succeeded);
        }
    }
}

pub fn load_action_stats(dir: &StateDir) -> io::Result<ActionStatsStore> {
    let path = dir.stats_path();
    if !path.exists() {
        return Ok(ActionStatsStore::default());
    }

    let bytes = fs::read(&path)?;
    if bytes.is_empty() {
        return Ok(ActionStatsStore::default());
    }

    let store: ActionStatsStore = serde_json::from_slice(&bytes)?;
    Ok(store)
}

pub fn save_action_stats(dir: &StateDir, store: &ActionStatsStore) -> io::Result<()> {
    fs::create_dir_all(dir.root())?;
    let json = serde_json::to_vec_pretty(store)?;
    fs::write(dir.stats_path(), json)?;
    Ok(())
}
