//! AgentFlow simulator CLI
//!
//! Run built-in scenarios or model files headlessly, or drive one in real
//! time on a frame-paced host.

use agentflow_core::Model;
use agentflow_env::TokioHost;
use agentflow_sim::driver::spawn_playback;
use agentflow_sim::scenarios::ScenarioId;
use agentflow_sim::{EngineConfig, ScenarioResult, ScenarioRunner, SimulationEngine};
use clap::Parser;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// AgentFlow simulation CLI
#[derive(Parser, Debug)]
#[command(name = "agentflow-sim")]
#[command(about = "Run agent-based models headlessly or in real time", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scenario to run (predator_prey, flocking, foraging, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Model JSON file to run instead of a built-in scenario
    #[arg(short, long)]
    model: Option<String>,

    /// Ticks per run
    #[arg(short, long, default_value = "500")]
    ticks: u64,

    /// Population ceiling that ends a run early
    #[arg(long, default_value = "50000")]
    max_agents: usize,

    /// Number of consecutive seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Drive the run from a frame-paced host instead of a tight loop
    #[arg(long)]
    realtime: bool,

    /// Host frame rate in realtime mode
    #[arg(long, default_value = "60")]
    fps: u32,

    /// Ticks per frame in realtime mode
    #[arg(long, default_value = "1")]
    speed: u32,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export sampled frames to a JSON file
    #[arg(long)]
    export: Option<String>,

    /// Ticks between exported frames
    #[arg(long, default_value = "10")]
    export_interval: u64,
}

/// A run target: a built-in scenario or a loaded model.
enum Target {
    Scenario(ScenarioId),
    File { label: String, model: Model },
}

impl Target {
    fn label(&self) -> &str {
        match self {
            Target::Scenario(id) => id.name(),
            Target::File { label, .. } => label.as_str(),
        }
    }

    fn model(&self) -> Model {
        match self {
            Target::Scenario(id) => id.model(),
            Target::File { model, .. } => model.clone(),
        }
    }
}

fn load_model(path: &str) -> Result<Model, String> {
    let text = std::fs::read_to_string(path).map_err(|e| format!("{}: {}", path, e))?;
    Model::from_json(&text).map_err(|e| format!("{}: {}", path, e))
}

/// Plays one model on a tokio frame host until the tick budget is spent.
fn run_realtime(args: &Args, target: &Target, seed: u64) -> Result<u64, String> {
    let runtime = tokio::runtime::Runtime::new().map_err(|e| e.to_string())?;
    runtime.block_on(async {
        let mut engine = SimulationEngine::new(EngineConfig {
            seed,
            ticks_per_frame: args.speed,
            ..Default::default()
        });
        engine
            .initialize(target.model())
            .map_err(|e| e.to_string())?;
        let engine = Arc::new(Mutex::new(engine));
        let host = TokioHost::shared(args.fps);

        let token = spawn_playback(host, engine.clone()).map_err(|e| e.to_string())?;
        if token.is_none() {
            return Ok(0);
        }
        info!(
            "Playing {} at {} fps x {} ticks/frame",
            target.label(),
            args.fps,
            args.speed
        );

        let poll = Duration::from_millis(50);
        loop {
            tokio::time::sleep(poll).await;
            let engine = engine.lock().map_err(|e| e.to_string())?;
            if engine.tick() >= args.ticks || !engine.is_running() {
                break;
            }
        }

        let mut engine = engine.lock().map_err(|e| e.to_string())?;
        engine.pause();
        info!(
            "Paused {} at tick {} with {} agents",
            target.label(),
            engine.tick(),
            engine.agent_count()
        );
        Ok(engine.tick())
    })
}

fn main() {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    if !args.json {
        info!("AgentFlow Simulator v0.1.0");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    // Resolve targets
    let targets: Vec<Target> = if let Some(path) = &args.model {
        match load_model(path) {
            Ok(model) => vec![Target::File {
                label: path.clone(),
                model,
            }],
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    } else if args.scenario == "all" {
        ScenarioId::all().into_iter().map(Target::Scenario).collect()
    } else {
        let id: ScenarioId = args.scenario.parse().unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            eprintln!("Available scenarios: predator_prey, flocking, foraging, all");
            std::process::exit(1);
        });
        vec![Target::Scenario(id)]
    };

    // Determine base seed
    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(42)
    } else {
        args.seed
    };

    if args.realtime {
        if targets.len() > 1 {
            eprintln!("Error: --realtime only supports a single scenario, not 'all'");
            std::process::exit(1);
        }
        match run_realtime(&args, &targets[0], base_seed) {
            Ok(ticks) => info!("✓ {} ran {} ticks in real time", targets[0].label(), ticks),
            Err(e) => {
                error!("✗ {} FAILED: {}", targets[0].label(), e);
                std::process::exit(1);
            }
        }
        return;
    }

    let runner_for = |seed: u64| {
        ScenarioRunner::new(seed)
            .with_ticks(args.ticks)
            .with_max_agents(args.max_agents)
    };

    // Handle --export mode
    if let Some(export_path) = &args.export {
        if targets.len() > 1 {
            eprintln!("Error: --export only supports a single scenario, not 'all'");
            std::process::exit(1);
        }
        let target = &targets[0];
        info!("Running with export to: {}", export_path);

        let (result, export) = runner_for(base_seed).run_model_recorded(
            target.label(),
            target.model(),
            args.export_interval,
        );

        if let Err(e) = export.write_to_file(export_path) {
            error!("Failed to write export: {:?}", e);
        } else {
            info!("Exported {} frames to {}", export.frames.len(), export_path);
        }

        if !result.passed {
            error!(
                "✗ {} FAILED: {}",
                target.label(),
                result.failure_reason.as_deref().unwrap_or("unknown")
            );
            std::process::exit(1);
        }
        return;
    }

    // Track results
    let mut all_results: Vec<ScenarioResult> = Vec::new();
    let mut failed_count = 0;

    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);
        let runner = runner_for(seed);

        for target in &targets {
            let result = runner.run_model(target.label(), target.model());

            if !args.json {
                if result.passed {
                    info!(
                        "✓ {} (seed={}) PASSED: {} ticks, {:?}",
                        target.label(),
                        seed,
                        result.total_ticks,
                        result.final_counts
                    );
                } else {
                    error!(
                        "✗ {} (seed={}) FAILED: {}",
                        target.label(),
                        seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }

            if !result.passed {
                failed_count += 1;
            }

            all_results.push(result);
        }
    }

    // Summary
    let total = all_results.len();
    let passed = total - failed_count;

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": passed,
            "failed": failed_count,
            "results": all_results,
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{}", text),
            Err(e) => error!("Failed to encode summary: {}", e),
        }
    } else {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        if failed_count == 0 {
            info!("✅ All {} runs passed!", total);
        } else {
            error!("❌ {}/{} runs failed!", failed_count, total);

            for result in &all_results {
                if !result.passed {
                    error!(
                        "  - {} seed={}: {}",
                        result.scenario,
                        result.seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }
        }
    }

    // Exit with proper code for CI
    if failed_count > 0 {
        std::process::exit(1);
    }
}
