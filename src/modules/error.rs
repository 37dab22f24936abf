use std::io;

use crate::modules::action::{Action, ActionKind};
use crate::modules::entity::AgentId;

/// Conditions that abort a tick. None of these are expected during a
/// healthy run; they point at a broken mind or a bug in the engine.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// The mind asked for an action kind with no configured energy ratio.
    #[error("agent {agent} chose action kind {kind} which has no energy ratio configured")]
    UnknownActionKind {
        /// The acting agent.
        agent: AgentId,
        /// The unconfigured kind.
        kind: ActionKind,
    },

    /// The mind produced an action with arguments the resolver cannot act on.
    #[error("agent {agent} chose invalid action {action}: {reason}")]
    InvalidAction {
        agent: AgentId,
        action: Action,
        reason: &'static str,
    },

    /// Grid energy mirror and agent energies drifted apart.
    #[error(
        "energy conservation violated after tick {tick}: grid holds {grid_total}, agents hold {agent_total}"
    )]
    ConservationViolated {
        tick: u64,
        grid_total: f64,
        agent_total: f64,
    },

    /// A respawnable agent died and the grid has no free tile left for it.
    #[error("no free tile to respawn agent {agent} ({name})")]
    RespawnFailed { agent: AgentId, name: String },

    #[error("agent {0} not found")]
    AgentNotFound(AgentId),
}

/// Errors raised while loading or validating a simulation definition.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read definition file: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    #[error("failed to parse definition YAML: {source}")]
    Yaml {
        #[from]
        source: serde_yml::Error,
    },

    #[error("invalid definition: {0}")]
    Invalid(String),
}
