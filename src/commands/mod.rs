use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Local;
use clap::{ArgAction, Parser, Subcommand};
use crossterm::event::{self, Event as TermEvent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use gridlab::{
    ActionStatsStore, Event, RunState, SimulationDef, StateDir, Status, TickResult, Vm,
    load_action_stats, save_action_stats,
    state::{self, DEFAULT_STATE_DIR},
};
use tracing::info;

pub mod render;
mod world;

use world::{WorldCommand, run_world};

#[derive(Parser)]
#[command(
    name = "gridlab",
    version,
    about = "Lil' Grid Lab: energy-driven agents competing on a grid",
    long_about = None
)]
pub struct Cli {
    /// Directory holding the seed, run state and action stats
    #[arg(long, global = true, default_value = DEFAULT_STATE_DIR)]
    pub state_dir: PathBuf,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run a simulation
    Run {
        /// World definition (YAML); the stock world when omitted
        definition: Option<PathBuf>,
        /// Pause the simulation at this tick
        #[arg(short = 'p', long)]
        pause: Option<u64>,
        /// Random seed (overrides the definition)
        #[arg(short = 's', long, conflicts_with = "repeat")]
        seed: Option<f64>,
        /// Repeat the previous run (same random seed)
        #[arg(short = 'r', long, action = ArgAction::SetTrue, default_value_t = false)]
        repeat: bool,
        /// Stop after this many ticks
        #[arg(short = 't', long)]
        ticks: Option<u64>,
        /// Ticks per second (overrides the definition)
        #[arg(long, conflicts_with = "full_speed")]
        fps: Option<f64>,
        /// Run as fast as possible
        #[arg(long, action = ArgAction::SetTrue, default_value_t = false)]
        full_speed: bool,
        /// No board, no pauses; only the final results
        #[arg(long, action = ArgAction::SetTrue, default_value_t = false)]
        headless: bool,
        /// Print the final snapshot as JSON
        #[arg(long, action = ArgAction::SetTrue, default_value_t = false)]
        json: bool,
        /// Disable ANSI colors and screen clearing
        #[arg(long, action = ArgAction::SetTrue, default_value_t = false)]
        plain: bool,
    },
    /// Show the status of the last run
    Status,
    /// Inspect world definitions
    World {
        #[command(subcommand)]
        command: WorldCommand,
    },
}

/// Options for one `run` invocation.
struct RunOptions {
    definition: Option<PathBuf>,
    pause: Option<u64>,
    seed: Option<f64>,
    repeat: bool,
    ticks: Option<u64>,
    fps: Option<f64>,
    full_speed: bool,
    headless: bool,
    json: bool,
    plain: bool,
}

pub fn run() {
    let cli = Cli::parse();
    let dir = StateDir::new(cli.state_dir);
    if let Err(err) = dispatch(cli.command, &dir) {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}

fn dispatch(command: Command, dir: &StateDir) -> Result<(), String> {
    match command {
        Command::Run {
            definition,
            pause,
            seed,
            repeat,
            ticks,
            fps,
            full_speed,
            headless,
            json,
            plain,
        } => run_simulation(
            RunOptions {
                definition,
                pause,
                seed,
                repeat,
                ticks,
                fps,
                full_speed,
                headless,
                json,
                plain,
            },
            dir,
        ),
        Command::Status => run_status(dir),
        Command::World { command } => run_world(command),
    }
}

pub(crate) fn load_definition(path: Option<&Path>) -> Result<SimulationDef, String> {
    match path {
        Some(path) => SimulationDef::from_file(path)
            .map_err(|e| format!("{}: {}", path.display(), e)),
        None => Ok(SimulationDef::default()),
    }
}

/// Fold command-line overrides into the definition.
fn apply_overrides(def: &mut SimulationDef, options: &RunOptions) -> Result<(), String> {
    if let Some(pause) = options.pause {
        def.world.pause_at_tick = Some(pause);
    }
    if let Some(ticks) = options.ticks {
        def.world.exit_at_tick = Some(ticks);
    }
    if let Some(fps) = options.fps {
        if !fps.is_finite() || fps <= 0.0 {
            return Err("fps must be greater than 0".into());
        }
        def.world.frames_per_second = Some(fps);
    }
    if options.full_speed {
        def.world.frames_per_second = None;
    }
    if options.headless {
        if def.world.exit_at_tick.is_none() && !def.world.exit_if_empty {
            return Err("headless runs need --ticks or an exit condition in the definition".into());
        }
        def.world.pause_at_tick = None;
        def.world.start_paused = false;
        def.world.frames_per_second = None;
    }
    Ok(())
}

fn run_simulation(options: RunOptions, dir: &StateDir) -> Result<(), String> {
    let mut def = load_definition(options.definition.as_deref())?;
    apply_overrides(&mut def, &options)?;

    let (seed, source) = state::resolve_seed(dir, options.repeat, options.seed, def.world.random_seed)
        .map_err(|e| e.to_string())?;
    dir.save_seed(seed).map_err(|e| e.to_string())?;
    println!("Initialization with {} seed: {}", source, seed);

    let mut vm = Vm::from_definition(&def, seed).map_err(|e| e.to_string())?;
    let started = Local::now();
    dir.begin_run(vm.world().name(), seed, source)
        .map_err(|e| e.to_string())?;

    let mut stats = ActionStatsStore::default();
    let color = !options.plain;
    let outcome = if options.headless {
        run_headless(&mut vm, &mut stats)
    } else {
        run_interactive(&mut vm, &mut stats, color)
    };

    save_action_stats(dir, &stats).map_err(|e| e.to_string())?;
    let last_tick = vm.tick();
    if let Err(err) = outcome {
        dir.end_run(Status::Failed, last_tick, Some(err.clone()))
            .map_err(|e| e.to_string())?;
        return Err(err);
    }

    let status = if vm.control().interrupted() {
        Status::Interrupted
    } else {
        Status::Finished
    };
    dir.end_run(status, last_tick, None)
        .map_err(|e| e.to_string())?;
    info!(ticks = last_tick, %status, "run complete");

    if options.json {
        let body = serde_json::to_string_pretty(&vm.snapshot()).map_err(|e| e.to_string())?;
        println!("{}", body);
    }
    print!(
        "{}",
        render::final_results(
            &started.to_rfc2822(),
            &Local::now().to_rfc2822(),
            last_tick,
            seed
        )
    );
    Ok(())
}

fn run_headless(vm: &mut Vm, stats: &mut ActionStatsStore) -> Result<(), String> {
    vm.resume();
    while !vm.should_terminate() {
        let tick = vm.step().map_err(|e| e.to_string())?;
        stats.record_tick(vm.world(), &tick);
    }
    Ok(())
}

enum Input {
    Step,
    Resume,
    Pause,
    Quit,
}

fn key_input(key: KeyEvent) -> Option<Input> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    match (key.code, key.modifiers) {
        (KeyCode::Char('c'), KeyModifiers::CONTROL)
        | (KeyCode::Esc, _)
        | (KeyCode::Char('q'), _)
        | (KeyCode::Char('Q'), _) => Some(Input::Quit),
        (KeyCode::Char('r'), _) | (KeyCode::Char('R'), _) => Some(Input::Resume),
        (KeyCode::Char('p'), _) | (KeyCode::Char('P'), _) | (KeyCode::Char(' '), _) => {
            Some(Input::Pause)
        }
        (KeyCode::Enter, _) | (KeyCode::Char('s'), _) => Some(Input::Step),
        _ => None,
    }
}

/// Block until a key that means something while paused.
fn wait_for_key() -> Result<Input, String> {
    loop {
        if let TermEvent::Key(key) = event::read().map_err(|e| e.to_string())?
            && let Some(input) = key_input(key)
            && !matches!(input, Input::Pause)
        {
            return Ok(input);
        }
    }
}

/// Wait out the rest of a frame, returning early on a mapped key.
fn poll_key(timeout: Duration) -> Result<Option<Input>, String> {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if !event::poll(remaining).map_err(|e| e.to_string())? {
            return Ok(None);
        }
        if let TermEvent::Key(key) = event::read().map_err(|e| e.to_string())?
            && let Some(input) = key_input(key)
        {
            return Ok(Some(input));
        }
        if remaining.is_zero() {
            return Ok(None);
        }
    }
}

/// Raw mode for the lifetime of an interactive run.
struct RawMode;

impl RawMode {
    fn enable() -> Result<Self, String> {
        enable_raw_mode()
            .map_err(|e| format!("interactive runs need a terminal ({}); try --headless", e))?;
        Ok(Self)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        if let Err(err) = disable_raw_mode() {
            tracing::error!(?err, "failed to disable raw mode");
        }
    }
}

fn redraw(out: &mut io::Stdout, vm: &Vm, extra: &str, color: bool) -> Result<(), String> {
    let mut text = render::frame(&vm.snapshot(), vm.state(), color);
    text.push_str(extra);
    render::draw(out, &text, color).map_err(|e| e.to_string())
}

fn run_interactive(vm: &mut Vm, stats: &mut ActionStatsStore, color: bool) -> Result<(), String> {
    let _raw = RawMode::enable()?;
    let mut out = io::stdout();
    redraw(&mut out, vm, "", color)?;

    while !vm.should_terminate() {
        if matches!(vm.state(), RunState::Paused | RunState::StepByStep) {
            match wait_for_key()? {
                Input::Step | Input::Pause => vm.step_by_step(),
                Input::Resume => vm.resume(),
                Input::Quit => {
                    vm.interrupt();
                    break;
                }
            }
        }

        let started = Instant::now();
        let tick = vm.step().map_err(|e| e.to_string())?;
        stats.record_tick(vm.world(), &tick);
        let events = if color { String::new() } else { event_lines(&tick, vm) };
        redraw(&mut out, vm, &events, color)?;

        if vm.state() == RunState::Running {
            let period = vm
                .control()
                .frames_per_second
                .map(|fps| Duration::from_secs_f64(1.0 / fps))
                .unwrap_or(Duration::ZERO);
            match poll_key(period.saturating_sub(started.elapsed()))? {
                Some(Input::Pause) => {
                    vm.pause();
                    redraw(&mut out, vm, "", color)?;
                }
                Some(Input::Quit) => {
                    vm.interrupt();
                    break;
                }
                _ => {}
            }
        }
    }
    Ok(())
}

fn agent_label(vm: &Vm, agent_id: usize) -> String {
    vm.world()
        .agent(agent_id)
        .map(|a| a.name.clone())
        .unwrap_or_else(|| format!("#{}", agent_id))
}

fn describe_event(vm: &Vm, event: &Event) -> Option<String> {
    let text = match event {
        Event::TickStarted { .. } | Event::TickCompleted { .. } | Event::Learned { .. } => {
            return None;
        }
        Event::AgentMoved { agent_id, from, to } => {
            format!("{} moved {} -> {}", agent_label(vm, *agent_id), from, to)
        }
        Event::AgentAte {
            agent_id,
            prey_id,
            amount,
        } => format!(
            "{} took {:.2} energy from {}",
            agent_label(vm, *agent_id),
            amount,
            agent_label(vm, *prey_id)
        ),
        Event::AgentDied { agent_id } => format!("{} died", agent_label(vm, *agent_id)),
        Event::AgentRespawned { agent_id, position } => {
            format!("{} respawned at {}", agent_label(vm, *agent_id), position)
        }
        Event::ActionFailed {
            agent_id,
            action,
            reason,
        } => format!("{} failed {}: {}", agent_label(vm, *agent_id), action, reason),
    };
    Some(text)
}

fn event_lines(tick: &TickResult, vm: &Vm) -> String {
    tick.events
        .iter()
        .filter_map(|e| describe_event(vm, e))
        .map(|text| format!(" - {}\n", text))
        .collect()
}

fn run_status(dir: &StateDir) -> Result<(), String> {
    match dir.load_state().map_err(|e| e.to_string())? {
        None => {
            println!("Status: no runs yet in {}.", dir.root().display());
        }
        Some(state) => {
            println!(
                "Status: {} | world={} | last_tick={} | seed={} ({}) | started={} | ended={} | message={}",
                state.status,
                state.world.unwrap_or_else(|| "-".into()),
                state.last_tick,
                state
                    .seed
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "-".into()),
                state
                    .seed_source
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "-".into()),
                state.started_at.unwrap_or_else(|| "-".into()),
                state.ended_at.unwrap_or_else(|| "-".into()),
                state.message.unwrap_or_else(|| "-".into())
            );
            print_action_summary(dir)?;
        }
    }
    Ok(())
}

fn print_action_summary(dir: &StateDir) -> Result<(), String> {
    let store = load_action_stats(dir).map_err(|e| e.to_string())?;
    if store.per_agent.is_empty() {
        return Ok(());
    }
    println!("Action summary (last run):");
    for (name, stats) in &store.per_agent {
        println!(
            " - {}: rest={} move={} eat={} failed={}",
            name, stats.rest_count, stats.move_count, stats.eat_count, stats.failed_count
        );
    }
    Ok(())
}
