//! agent-sched CLI: run the demo agent and manage scheduler config files.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use agent_sched::config::{SchedulerConfig, secs_to_duration};
use agent_sched::sim::{Simulation, default_tasks};
use agent_sched::trace::{FanoutSink, JsonSink, StdoutSink, ThoughtLog, TraceSink};

const DEFAULT_CONFIG: &str = "agent-sched.toml";

#[derive(Parser)]
#[command(name = "agent-sched", version, about = "Priority-driven behavior scheduler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the demo agent on a fixed time step.
    Simulate {
        /// Scheduler config (TOML). Defaults are used when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Number of steps to run.
        #[arg(long, default_value = "600")]
        ticks: u64,

        /// Seconds per step.
        #[arg(long, default_value = "0.1")]
        dt: f64,

        /// Print trace events as NDJSON instead of text.
        #[arg(long)]
        json: bool,

        /// Seed for the demo world.
        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Manage scheduler config files.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a default config, including the demo task list.
    Init {
        #[arg(long, default_value = DEFAULT_CONFIG)]
        path: PathBuf,

        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },

    /// Validate a config file and print it with defaults filled in.
    Show {
        #[arg(long, default_value = DEFAULT_CONFIG)]
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            config,
            ticks,
            dt,
            json,
            seed,
        } => {
            let config = match config {
                Some(path) => SchedulerConfig::load(&path)?,
                None => SchedulerConfig::default(),
            };
            let step = secs_to_duration(dt);
            if step.is_zero() {
                miette::bail!("--dt must be a positive number of seconds");
            }

            let thoughts = Arc::new(ThoughtLog::new(config.thought_capacity));
            let printer: Arc<dyn TraceSink> = if json {
                Arc::new(JsonSink)
            } else {
                Arc::new(StdoutSink)
            };
            let sink = Arc::new(FanoutSink::new(vec![printer, thoughts.clone()]));

            let mut sim = Simulation::new(&config, seed, step, sink)?;
            sim.run(ticks);

            let snapshot = sim.snapshot();
            if json {
                println!("{}", serde_json::to_string(&snapshot).into_diagnostic()?);
            } else {
                println!();
                println!(
                    "After {} steps ({:.1}s): active = {}",
                    sim.ticks(),
                    snapshot.at_secs,
                    snapshot.active.as_deref().unwrap_or("(none)")
                );
                for (task, count) in sim.entries() {
                    println!("  {task:<10} started {count} times");
                }
                println!("  last {} thoughts kept in memory", thoughts.len());
            }
        }

        Commands::Config { action } => match action {
            ConfigAction::Init { path, force } => {
                if path.exists() && !force {
                    miette::bail!(
                        "{} already exists (use --force to overwrite)",
                        path.display()
                    );
                }
                let config = SchedulerConfig {
                    tasks: default_tasks(),
                    ..SchedulerConfig::default()
                };
                config.save(&path)?;
                println!("Wrote {}", path.display());
            }
            ConfigAction::Show { path } => {
                let config = SchedulerConfig::load(&path)?;
                let rendered = toml::to_string_pretty(&config).into_diagnostic()?;
                print!("{rendered}");
            }
        },
    }

    Ok(())
}
