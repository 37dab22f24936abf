use std::path::PathBuf;

use clap::Subcommand;
use gridlab::{ActionKind, SimulationDef, World};

use super::{load_definition, render};

#[derive(Subcommand)]
pub enum WorldCommand {
    /// Build a world and print it as it looks before the first tick
    Show {
        /// World definition (YAML); the stock world when omitted
        definition: Option<PathBuf>,
        /// Seed used to place things (defaults to the definition's, else 0)
        #[arg(short = 's', long)]
        seed: Option<f64>,
        /// Print the snapshot JSON instead of the board
        #[arg(long)]
        json: bool,
        /// Disable ANSI colors
        #[arg(long)]
        plain: bool,
    },
    /// Validate a definition and summarize it
    Check {
        /// World definition (YAML)
        definition: PathBuf,
    },
    /// Print the stock definition as YAML, a starting point for custom worlds
    Template,
}

pub fn run_world(command: WorldCommand) -> Result<(), String> {
    match command {
        WorldCommand::Show {
            definition,
            seed,
            json,
            plain,
        } => show(definition, seed, json, plain),
        WorldCommand::Check { definition } => check(definition),
        WorldCommand::Template => {
            let yaml = SimulationDef::default()
                .to_yaml()
                .map_err(|e| e.to_string())?;
            print!("{}", yaml);
            Ok(())
        }
    }
}

fn show(definition: Option<PathBuf>, seed: Option<f64>, json: bool, plain: bool) -> Result<(), String> {
    let def = load_definition(definition.as_deref())?;
    let seed = seed.or(def.world.random_seed).unwrap_or(0.0);
    let world = World::from_definition(&def, seed).map_err(|e| e.to_string())?;
    let snapshot = world.snapshot();

    if json {
        let body = serde_json::to_string_pretty(&snapshot).map_err(|e| e.to_string())?;
        println!("{}", body);
        return Ok(());
    }

    println!("{} (seed {})", snapshot.name, seed);
    print!("{}", render::board(&snapshot, !plain));
    print!("{}", render::ranking(&snapshot, !plain));
    Ok(())
}

fn check(definition: PathBuf) -> Result<(), String> {
    let def = load_definition(Some(definition.as_path()))?;
    let world = &def.world;

    println!("{} is valid", definition.display());
    println!(
        "World: {} ({}x{}) | fps={} | seed={}",
        world.name,
        world.width,
        world.height,
        world
            .frames_per_second
            .map(|f| f.to_string())
            .unwrap_or_else(|| "full speed".into()),
        world
            .random_seed
            .map(|s| s.to_string())
            .unwrap_or_else(|| "clock".into())
    );
    for block in &def.blocks {
        let count = block
            .count
            .map(|c| c.to_string())
            .unwrap_or_else(|| format!("~{}", world.width));
        println!("Block {} x{} '{}'", block.name, count, block.aspect);
    }
    for agent in &def.agents {
        println!(
            "Agent {} x{} '{}' | energy {}/{} | bite {} | step {} | move {} | {}",
            agent.name,
            agent.count,
            agent.aspect,
            agent.energy.initial,
            agent.energy.maximum,
            agent.energy.bite_power,
            agent.energy.step_cost,
            agent.energy.move_cost,
            agent.energy.recycling_policy
        );
    }
    for kind in [ActionKind::Rest, ActionKind::Move, ActionKind::Eat] {
        match def.action_costs.ratio(kind) {
            Some(ratio) => println!("Energy ratio {}: {}", kind, ratio),
            None => println!("Energy ratio {}: missing (fatal if chosen)", kind),
        }
    }
    Ok(())
}
