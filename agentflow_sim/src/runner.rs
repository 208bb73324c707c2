//! Scenario runner - drives an engine headlessly and checks population invariants.

use crate::engine::{EngineConfig, FrameOutcome, SimulationEngine};
use crate::exporter::{SimEvent, SimExport, SimFrame};
use crate::scenarios::ScenarioId;

use agentflow_core::Model;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Results from running a scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    /// Scenario name or model label
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Whether every tick kept the population invariants
    pub passed: bool,

    /// Total ticks executed
    pub total_ticks: u64,

    /// Live agents at end
    pub final_agent_count: usize,

    /// Live agents per type at end, in model order
    pub final_counts: Vec<(String, usize)>,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScenarioMetrics {
    /// Agents born over the run
    pub births: u64,

    /// Agents removed over the run
    pub removals: u64,

    /// Largest population seen
    pub peak_agents: usize,

    /// First initially populated type to die out, if any
    pub extinct_type: Option<String>,

    /// The run ended before the tick budget (extinction or agent ceiling)
    pub stopped_early: bool,
}

/// Runs models to completion.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Tick budget
    ticks: u64,

    /// Population ceiling that ends a run early
    max_agents: usize,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            ticks: 500,
            max_agents: 50_000,
        }
    }

    /// Sets the tick budget.
    pub fn with_ticks(mut self, ticks: u64) -> Self {
        self.ticks = ticks;
        self
    }

    /// Sets the population ceiling.
    pub fn with_max_agents(mut self, max_agents: usize) -> Self {
        self.max_agents = max_agents;
        self
    }

    /// Runs a built-in scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);
        self.run_model(scenario.name(), scenario.model())
    }

    /// Runs an arbitrary model.
    pub fn run_model(&self, label: &str, model: Model) -> ScenarioResult {
        self.drive(label, model, None)
    }

    /// Runs a built-in scenario, sampling a frame every `interval` ticks.
    pub fn run_recorded(&self, scenario: ScenarioId, interval: u64) -> (ScenarioResult, SimExport) {
        self.run_model_recorded(scenario.name(), scenario.model(), interval)
    }

    /// Runs an arbitrary model, sampling a frame every `interval` ticks.
    pub fn run_model_recorded(
        &self,
        label: &str,
        model: Model,
        interval: u64,
    ) -> (ScenarioResult, SimExport) {
        let mut export = SimExport::new(label, self.seed, Vec::new());
        let result = self.drive(label, model, Some((&mut export, interval.max(1))));
        export.finalize(result.passed, result.failure_reason.clone());
        (result, export)
    }

    fn drive(
        &self,
        label: &str,
        model: Model,
        mut recorder: Option<(&mut SimExport, u64)>,
    ) -> ScenarioResult {
        let mut engine = SimulationEngine::new(EngineConfig {
            seed: self.seed,
            ..Default::default()
        });
        let mut metrics = ScenarioMetrics::default();

        if let Err(e) = engine.initialize(model) {
            return self.finish(label, &engine, metrics, Some(e.to_string()));
        }
        let Some(token) = engine.play() else {
            info!("{}: nothing to run", label);
            return self.finish(label, &engine, metrics, None);
        };

        let initial = self.counts(&engine);
        metrics.peak_agents = engine.agent_count();
        if let Some((export, _)) = recorder.as_mut() {
            export.visuals = engine.visuals().to_vec();
            export.add_frame(Self::sample(&engine, Vec::new()));
        }

        let mut failure = None;
        let mut pending_events = Vec::new();
        while engine.tick() < self.ticks {
            let before = engine.agent_count();
            if engine.frame(token) == FrameOutcome::Stop {
                failure = Some(format!("playback stopped at tick {}", engine.tick()));
                break;
            }
            let tick = engine.tick();

            if let Err(reason) = Self::check_tick(&engine, before, &mut metrics) {
                failure = Some(format!("tick {}: {}", tick, reason));
                break;
            }

            let counts = self.counts(&engine);
            let extinct = initial
                .iter()
                .zip(&counts)
                .find(|((_, start), (_, now))| *start > 0 && *now == 0)
                .map(|((name, _), _)| name.clone());
            if let Some(name) = extinct {
                info!("{}: '{}' went extinct at tick {}", label, name, tick);
                pending_events.push(SimEvent::info(tick, format!("{} extinct", name)));
                metrics.extinct_type = Some(name);
                metrics.stopped_early = true;
            } else if engine.agent_count() > self.max_agents {
                warn!(
                    "{}: {} agents exceeds ceiling {} at tick {}",
                    label,
                    engine.agent_count(),
                    self.max_agents,
                    tick
                );
                pending_events.push(SimEvent::warn(tick, "agent ceiling reached"));
                metrics.stopped_early = true;
            }

            if let Some((export, interval)) = recorder.as_mut() {
                if tick % *interval == 0 || metrics.stopped_early {
                    export.add_frame(Self::sample(&engine, std::mem::take(&mut pending_events)));
                }
            }

            if tick % 50 == 0 {
                debug!("  tick {} | agents={} | {:?}", tick, engine.agent_count(), counts);
            }
            if metrics.stopped_early {
                break;
            }
        }
        engine.pause();

        self.finish(label, &engine, metrics, failure)
    }

    /// Checks conservation and index consistency for the tick just run.
    fn check_tick(
        engine: &SimulationEngine,
        before: usize,
        metrics: &mut ScenarioMetrics,
    ) -> Result<(), String> {
        let env = engine
            .environment()
            .ok_or_else(|| "environment missing".to_string())?;
        let stats = env.last_tick();
        metrics.births += stats.born as u64;
        metrics.removals += stats.removed as u64;

        let count = env.agent_count();
        metrics.peak_agents = metrics.peak_agents.max(count);

        if count + stats.removed != before + stats.born {
            return Err(format!(
                "{} agents after tick, expected {} + {} born - {} removed",
                count, before, stats.born, stats.removed
            ));
        }
        let by_type: usize = env.count_by_type().iter().sum();
        if by_type != count {
            return Err(format!("per-type counts sum to {}, live count is {}", by_type, count));
        }
        if env.index().len() != count {
            return Err(format!(
                "spatial index holds {} agents, live count is {}",
                env.index().len(),
                count
            ));
        }
        Ok(())
    }

    fn counts(&self, engine: &SimulationEngine) -> Vec<(String, usize)> {
        engine
            .environment()
            .map(|env| env.type_ids().iter().cloned().zip(env.count_by_type()).collect())
            .unwrap_or_default()
    }

    fn sample(engine: &SimulationEngine, events: Vec<SimEvent>) -> SimFrame {
        SimFrame {
            tick: engine.tick(),
            agent_count: engine.agent_count(),
            agents: engine.snapshot(),
            series: engine.metrics().map(|m| m.latest()).unwrap_or_default(),
            events,
        }
    }

    fn finish(
        &self,
        label: &str,
        engine: &SimulationEngine,
        metrics: ScenarioMetrics,
        failure_reason: Option<String>,
    ) -> ScenarioResult {
        let passed = failure_reason.is_none();
        if passed {
            info!(
                "✓ {} complete: {} ticks, {} agents (+{} / -{})",
                label,
                engine.tick(),
                engine.agent_count(),
                metrics.births,
                metrics.removals
            );
        }
        ScenarioResult {
            scenario: label.to_string(),
            seed: self.seed,
            passed,
            total_ticks: engine.tick(),
            final_agent_count: engine.agent_count(),
            final_counts: self.counts(engine),
            failure_reason,
            metrics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenarios::{flocking, predator_prey};
    use agentflow_core::{AgentType, Population, Value};

    #[test]
    fn test_predator_prey_scenario() {
        let runner = ScenarioRunner::new(42)
            .with_ticks(500)
            .with_max_agents(5_000);

        let result = runner.run_model("predator_prey", predator_prey(200, 40));

        // At default birth rates the sheep outgrow the ceiling well before
        // the tick budget, so an early stop is the expected ending here
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.total_ticks <= 500);
        assert!(result.total_ticks == 500 || result.metrics.stopped_early);
        assert!(result.metrics.births > 0);
        assert!(result.metrics.removals > 0);
        assert_eq!(result.final_counts.len(), 2);
        let sum: usize = result.final_counts.iter().map(|(_, n)| n).sum();
        assert_eq!(sum, result.final_agent_count);
    }

    #[test]
    fn test_predator_prey_slow_growth_runs_full_budget() {
        let mut model = predator_prey(200, 40);
        for param in &mut model.parameters {
            match param.name.as_str() {
                "sheepBirthRate" => param.value = Value::Number(0.005),
                "wolfBirthRate" => param.value = Value::Number(0.025),
                _ => {}
            }
        }

        let result = ScenarioRunner::new(42)
            .with_ticks(500)
            .with_max_agents(5_000)
            .run_model("predator_prey_slow", model);

        // Only extinction may end this run before the budget
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.final_agent_count <= 5_000);
        assert!(result.total_ticks == 500 || result.metrics.extinct_type.is_some());
        assert!(result.metrics.births > 0);
    }

    #[test]
    fn test_flocking_keeps_population() {
        let result = ScenarioRunner::new(7).with_ticks(60).run_model("flock", flocking(40));

        assert!(result.passed);
        assert_eq!(result.total_ticks, 60);
        assert_eq!(result.final_agent_count, 40);
        assert_eq!(result.metrics.births, 0);
        assert!(!result.metrics.stopped_early);
    }

    #[test]
    fn test_foraging_scenario() {
        let result = ScenarioRunner::new(42).with_ticks(100).run(ScenarioId::Foraging);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.removals > 0);
    }

    #[test]
    fn test_same_seed_same_outcome() {
        let a = ScenarioRunner::new(9).with_ticks(80).run_model("pp", predator_prey(60, 12));
        let b = ScenarioRunner::new(9).with_ticks(80).run_model("pp", predator_prey(60, 12));

        assert_eq!(a.total_ticks, b.total_ticks);
        assert_eq!(a.final_counts, b.final_counts);
        assert_eq!(a.metrics.births, b.metrics.births);
        assert_eq!(a.metrics.removals, b.metrics.removals);
    }

    #[test]
    fn test_extinction_stops_cleanly() {
        let model = Model {
            agent_types: vec![AgentType::new("mayfly").with_behavior(
                agentflow_core::BehaviorSpec::new("die").param("probability", 1.0),
            )],
            populations: vec![Population::new("mayfly", 25)],
            ..Default::default()
        };

        let result = ScenarioRunner::new(1).with_ticks(100).run_model("mayfly", model);

        assert!(result.passed);
        assert_eq!(result.total_ticks, 1);
        assert_eq!(result.metrics.removals, 25);
        assert_eq!(result.metrics.extinct_type.as_deref(), Some("mayfly"));
    }

    #[test]
    fn test_ceiling_stops_early() {
        let model = Model {
            agent_types: vec![AgentType::new("rabbit").with_behavior(
                agentflow_core::BehaviorSpec::new("reproduce").param("probability", 1.0),
            )],
            populations: vec![Population::new("rabbit", 10)],
            ..Default::default()
        };

        let result = ScenarioRunner::new(1)
            .with_ticks(100)
            .with_max_agents(100)
            .run_model("rabbits", model);

        assert!(result.passed);
        assert!(result.metrics.stopped_early);
        // 10 -> 20 -> 40 -> 80 -> 160
        assert_eq!(result.total_ticks, 4);
        assert_eq!(result.metrics.peak_agents, 160);
    }

    #[test]
    fn test_empty_model_runs_nothing() {
        let result = ScenarioRunner::new(1).run_model("empty", Model::default());
        assert!(result.passed);
        assert_eq!(result.total_ticks, 0);
        assert!(result.final_counts.is_empty());
    }

    #[test]
    fn test_recorded_run_samples_frames() {
        let runner = ScenarioRunner::new(3).with_ticks(30);
        let (result, export) = runner.run_recorded(ScenarioId::Flocking, 10);

        assert!(result.passed);
        assert!(export.passed);
        // Initial frame plus ticks 10, 20, 30
        assert_eq!(export.frames.len(), 4);
        assert_eq!(export.ticks, 30);
        assert_eq!(export.visuals.len(), 1);
        assert_eq!(export.frames[3].agent_count, export.frames[3].agents.len());
        assert!(!export.frames[3].series.is_empty());
    }
}
