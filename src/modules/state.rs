use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

pub const DEFAULT_STATE_DIR: &str = ".gridlab";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Status {
    Initialized,
    Running,
    Finished,
    Interrupted,
    Failed,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Status::Initialized => "initialized",
            Status::Running => "running",
            Status::Finished => "finished",
            Status::Interrupted => "interrupted",
            Status::Failed => "failed",
        };
        write!(f, "{}", label)
    }
}

/// Where the seed of a run came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SeedSource {
    /// Reused from the previous run.
    Previous,
    /// Given on the command line.
    Passed,
    /// Set in the world definition.
    Definition,
    /// Drawn from the clock.
    New,
}

impl fmt::Display for SeedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SeedSource::Previous => "PREVIOUS",
            SeedSource::Passed => "PASSED",
            SeedSource::Definition => "WORLD DEF",
            SeedSource::New => "NEW",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeState {
    pub status: Status,
    pub world: Option<String>,
    pub last_tick: u64,
    pub seed: Option<f64>,
    pub seed_source: Option<SeedSource>,
    /// RFC 3339 timestamps.
    pub started_at: Option<String>,
    pub ended_at: Option<String>,
    pub message: Option<String>,
}

impl Default for RuntimeState {
    fn default() -> Self {
        Self {
            status: Status::Initialized,
            world: None,
            last_tick: 0,
            seed: None,
            seed_source: None,
            started_at: None,
            ended_at: None,
            message: None,
        }
    }
}

/// Files a run leaves behind, all under one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateDir {
    root: PathBuf,
}

impl Default for StateDir {
    fn default() -> Self {
        Self::new(DEFAULT_STATE_DIR)
    }
}

impl StateDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn seed_path(&self) -> PathBuf {
        self.root.join("seed.txt")
    }

    pub fn state_path(&self) -> PathBuf {
        self.root.join("state.json")
    }

    pub fn stats_path(&self) -> PathBuf {
        self.root.join("action_stats.json")
    }

    fn ensure(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root)
    }

    pub fn save_seed(&self, seed: f64) -> io::Result<()> {
        self.ensure()?;
        fs::write(self.seed_path(), seed.to_string())
    }

    pub fn load_seed(&self) -> io::Result<Option<f64>> {
        let path = self.seed_path();
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path)?;
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        text.parse::<f64>().map(Some).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("failed to parse seed file {}: {}", path.display(), e),
            )
        })
    }

    pub fn load_state(&self) -> io::Result<Option<RuntimeState>> {
        let path = self.state_path();
        if !path.exists() {
            return Ok(None);
        }

        let bytes = fs::read(&path)?;
        if bytes.is_empty() {
            return Ok(None);
        }

        let state: RuntimeState = serde_json::from_slice(&bytes).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "failed to parse state file {}; delete it to reset: {}",
                    path.display(),
                    e
                ),
            )
        })?;
        Ok(Some(state))
    }

    pub fn save_state(&self, state: &RuntimeState) -> io::Result<()> {
        self.ensure()?;
        let json = serde_json::to_vec_pretty(state)?;
        fs::write(self.state_path(), json)
    }

    /// Record the start of a run.
    pub fn begin_run(&self, world: &str, seed: f64, source: SeedSource) -> io::Result<RuntimeState> {
        let state = RuntimeState {
            status: Status::Running,
            world: Some(world.to_string()),
            last_tick: 0,
            seed: Some(seed),
            seed_source: Some(source),
            started_at: Some(Utc::now().to_rfc3339()),
            ended_at: None,
            message: None,
        };
        self.save_state(&state)?;
        Ok(state)
    }

    pub fn end_run(
        &self,
        status: Status,
        last_tick: u64,
        message: Option<String>,
    ) -> io::Result<RuntimeState> {
        let mut state = self.load_state()?.unwrap_or_default();
        state.status = status;
        state.last_tick = last_tick;
        state.ended_at = Some(Utc::now().to_rfc3339());
        state.message = message;
        self.save_state(&state)?;
        Ok(state)
    }
}

/// Seconds since the epoch, with sub-second precision.
pub fn clock_seed() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Choose the seed for a run: the previous one when `repeat`, else the
/// command-line one, else the definition's, else a fresh clock seed.
pub fn resolve_seed(
    dir: &StateDir,
    repeat: bool,
    passed: Option<f64>,
    defined: Option<f64>,
) -> io::Result<(f64, SeedSource)> {
    if repeat {
        return match dir.load_seed()? {
            Some(seed) => Ok((seed, SeedSource::Previous)),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no previous seed at {}", dir.seed_path().display()),
            )),
        };
    }
    if let Some(seed) = passed {
        return Ok((seed, SeedSource::Passed));
    }
    if let Some(seed) = defined {
        return Ok((seed, SeedSource::Definition));
    }
    Ok((clock_seed(), SeedSource::New))
}
