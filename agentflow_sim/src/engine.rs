//! SimulationEngine - owns one environment and drives the playback state machine.

use crate::error::EngineError;

use agentflow_core::{
    compile_model, AgentSnapshot, AgentVisual, CompiledModel, Environment, MetricPoint,
    MetricsFeed, Model, Parameter, ParameterTable, Value,
};
use agentflow_env::PlaybackToken;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Configuration for an engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Master seed for setup and behavior randomness
    pub seed: u64,

    /// Ticks executed per host frame (minimum 1)
    pub ticks_per_frame: u32,

    /// Metric points kept per chart series
    pub history_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            ticks_per_frame: 1,
            history_capacity: 500,
        }
    }
}

/// Playback state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackState {
    Idle,
    Running,
    Paused,
}

/// What the host-driven loop should do after a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The frame ran this many ticks; ask for another frame
    Continue { ticks: u32 },
    /// The token is stale or playback stopped; exit the loop
    Stop,
}

/// Payload of the per-tick callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickReport {
    pub tick: u64,
    pub agent_count: usize,
    pub agents: Vec<AgentSnapshot>,
}

/// Per-tick observer.
pub type TickCallback = Box<dyn FnMut(&TickReport) + Send>;

/// Receives compile and load errors.
pub type ErrorCallback = Box<dyn FnMut(&EngineError) + Send>;

/// A compiled, running simulation plus its derived state.
struct Session {
    compiled: Arc<CompiledModel>,
    env: Environment,
    metrics: MetricsFeed,
}

/// The simulation engine.
///
/// Single-threaded: every operation takes `&mut self`, so parameter writes
/// land strictly between ticks. A host loop shares the engine behind a mutex
/// and calls [`frame`](Self::frame) once per frame with the token it got from
/// [`play`](Self::play).
pub struct SimulationEngine {
    config: EngineConfig,
    state: PlaybackState,

    /// Bumped by every lifecycle change; stale tokens stop their loop
    generation: u64,

    tick: u64,

    /// Model as last given by the editor; compiled on initialize/reset
    model: Option<Model>,

    session: Option<Session>,
    on_tick: Option<TickCallback>,
    on_error: Option<ErrorCallback>,
}

impl SimulationEngine {
    /// Creates an uninitialized engine.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            state: PlaybackState::Idle,
            generation: 0,
            tick: 0,
            model: None,
            session: None,
            on_tick: None,
            on_error: None,
        }
    }

    /// Installs the tick and error callbacks.
    pub fn set_callbacks(
        &mut self,
        on_tick: impl FnMut(&TickReport) + Send + 'static,
        on_error: impl FnMut(&EngineError) + Send + 'static,
    ) {
        self.on_tick = Some(Box::new(on_tick));
        self.on_error = Some(Box::new(on_error));
    }

    /// Full rebuild from `model`.
    ///
    /// On a compile error the error is reported through `on_error`, returned,
    /// and the engine keeps its previous state. A model with no agent types
    /// or no populations leaves the engine idle and empty.
    pub fn initialize(&mut self, model: Model) -> Result<(), EngineError> {
        info!(
            "Initializing engine: {} types, {} populations (seed={})",
            model.agent_types.len(),
            model.populations.len(),
            self.config.seed
        );
        let session = self.build_session(&model, None)?;
        self.install(model, session);
        Ok(())
    }

    /// Parses a JSON model and initializes from it.
    pub fn initialize_json(&mut self, json: &str) -> Result<(), EngineError> {
        match Model::from_json(json) {
            Ok(model) => self.initialize(model),
            Err(e) => {
                let err = EngineError::from(e);
                self.report_error(&err);
                Err(err)
            }
        }
    }

    /// Stages an edited model; it takes effect on the next [`reset`](Self::reset).
    pub fn update_model(&mut self, model: Model) {
        debug!("Staged model update");
        self.model = Some(model);
    }

    /// Stops playback and re-runs setup from the staged model.
    ///
    /// Current runtime parameter values carry over into the new environment.
    /// The tick counter restarts at 0.
    pub fn reset(&mut self) -> Result<(), EngineError> {
        let Some(model) = self.model.take() else {
            debug!("Reset on uninitialized engine ignored");
            return Ok(());
        };
        info!("Resetting engine");

        let overlay = self.session.as_ref().map(|s| s.env.params().clone());
        match self.build_session(&model, overlay) {
            Ok(session) => {
                self.install(model, session);
                Ok(())
            }
            Err(e) => {
                self.model = Some(model);
                Err(e)
            }
        }
    }

    /// Enters `Running` and returns the token the playback loop must present.
    ///
    /// Returns None (no-op) when already running or uninitialized.
    pub fn play(&mut self) -> Option<PlaybackToken> {
        if self.state == PlaybackState::Running || self.session.is_none() {
            return None;
        }
        self.generation += 1;
        self.state = PlaybackState::Running;
        info!("Playback started ({})", PlaybackToken::new(self.generation));
        Some(PlaybackToken::new(self.generation))
    }

    /// Stops playback. Idempotent.
    pub fn pause(&mut self) {
        if self.state == PlaybackState::Running {
            self.generation += 1;
            self.state = PlaybackState::Paused;
            info!("Playback paused at tick {}", self.tick);
        }
    }

    /// Forces `Paused` and advances exactly one tick.
    pub fn step(&mut self) {
        if self.session.is_none() {
            return;
        }
        if self.state == PlaybackState::Running {
            self.generation += 1;
        }
        self.state = PlaybackState::Paused;
        self.advance();
    }

    /// Sets ticks per frame (minimum 1).
    pub fn set_speed(&mut self, ticks_per_frame: u32) {
        self.config.ticks_per_frame = ticks_per_frame.max(1);
        debug!("Speed set to {} ticks/frame", self.config.ticks_per_frame);
    }

    /// Tears everything down; no tick runs afterwards.
    pub fn cleanup(&mut self) {
        self.generation += 1;
        self.state = PlaybackState::Idle;
        self.tick = 0;
        self.session = None;
        self.model = None;
        self.on_tick = None;
        self.on_error = None;
        info!("Engine cleaned up");
    }

    /// Writes one runtime parameter. Returns false if the value was rejected.
    ///
    /// Without a live session the value is only staged on the model, so the
    /// call fails when the model has no such parameter.
    pub fn update_parameter(&mut self, name: &str, value: Value) -> bool {
        let mut staged = false;
        if let Some(model) = &mut self.model {
            if let Some(param) = model.parameters.iter_mut().find(|p| p.name == name) {
                param.value = value.clone();
                staged = true;
            }
        }
        match &mut self.session {
            Some(session) => {
                let accepted = session.env.params_mut().set(name, value);
                if !accepted {
                    warn!("Rejected value for parameter '{}'", name);
                }
                accepted
            }
            None => {
                if !staged {
                    warn!("No parameter '{}' to stage", name);
                }
                staged
            }
        }
    }

    /// Applies a batch of parameter definitions.
    pub fn sync_parameters(&mut self, parameters: &[Parameter]) {
        if let Some(model) = &mut self.model {
            for param in parameters {
                match model.parameters.iter_mut().find(|p| p.name == param.name) {
                    Some(existing) => *existing = param.clone(),
                    None => model.parameters.push(param.clone()),
                }
            }
        }
        if let Some(session) = &mut self.session {
            session.env.params_mut().sync(parameters);
        }
    }

    /// Runs one host frame if `token` is still current.
    pub fn frame(&mut self, token: PlaybackToken) -> FrameOutcome {
        if !token.is_current(self.generation)
            || self.state != PlaybackState::Running
            || self.session.is_none()
        {
            return FrameOutcome::Stop;
        }
        let ticks = self.config.ticks_per_frame.max(1);
        for _ in 0..ticks {
            self.advance();
        }
        FrameOutcome::Continue { ticks }
    }

    /// Ticks executed since the last initialize/reset.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Live agents (0 when uninitialized).
    pub fn agent_count(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.env.agent_count())
    }

    pub fn is_running(&self) -> bool {
        self.state == PlaybackState::Running
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_initialized(&self) -> bool {
        self.session.is_some()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Latest value of a chart series (0 for unknown series or no model).
    pub fn chart_series_value(&self, visualization_id: &str, series_id: &str) -> f64 {
        self.session
            .as_ref()
            .and_then(|s| s.metrics.value(visualization_id, series_id))
            .unwrap_or(0.0)
    }

    /// Recorded points of a chart series, oldest first.
    pub fn chart_series_history(&self, visualization_id: &str, series_id: &str) -> Vec<MetricPoint> {
        self.session
            .as_ref()
            .and_then(|s| s.metrics.history(visualization_id, series_id))
            .unwrap_or_default()
    }

    pub fn metrics(&self) -> Option<&MetricsFeed> {
        self.session.as_ref().map(|s| &s.metrics)
    }

    /// Render snapshots of all live agents.
    pub fn snapshot(&self) -> Vec<AgentSnapshot> {
        self.session
            .as_ref()
            .map(|s| s.env.snapshot())
            .unwrap_or_default()
    }

    /// Per-type visual metadata of the compiled model.
    pub fn visuals(&self) -> &[AgentVisual] {
        self.session
            .as_ref()
            .map(|s| s.compiled.visuals.as_slice())
            .unwrap_or_default()
    }

    pub fn environment(&self) -> Option<&Environment> {
        self.session.as_ref().map(|s| &s.env)
    }

    pub fn compiled(&self) -> Option<&Arc<CompiledModel>> {
        self.session.as_ref().map(|s| &s.compiled)
    }

    /// Compiles `model` and sets up a fresh environment.
    ///
    /// Returns Ok(None) for a model with nothing to run.
    fn build_session(
        &mut self,
        model: &Model,
        overlay: Option<ParameterTable>,
    ) -> Result<Option<Session>, EngineError> {
        if !model.is_runnable() {
            info!("Model has no agent types or no populations; engine stays idle");
            return Ok(None);
        }

        let compiled = match compile_model(model) {
            Ok(c) => Arc::new(c),
            Err(e) => {
                let err = EngineError::from(e);
                self.report_error(&err);
                return Err(err);
            }
        };

        let mut params = compiled.parameter_table();
        if let Some(current) = &overlay {
            params.overlay_values(current);
        }
        let env = compiled.instantiate(params, self.config.seed);
        let mut metrics = MetricsFeed::new(
            &compiled.visualizations,
            compiled.types(),
            self.config.history_capacity,
        );
        metrics.record(0, &env);

        Ok(Some(Session {
            compiled,
            env,
            metrics,
        }))
    }

    fn install(&mut self, model: Model, session: Option<Session>) {
        self.generation += 1;
        self.state = PlaybackState::Idle;
        self.tick = 0;
        self.model = Some(model);
        self.session = session;
        info!("Engine ready with {} agents", self.agent_count());
        self.emit_tick();
    }

    fn advance(&mut self) {
        let Some(session) = &mut self.session else {
            return;
        };
        let stats = session.compiled.run_tick(&mut session.env);
        self.tick += 1;
        session.metrics.record(self.tick, &session.env);
        if stats.born > 0 || stats.removed > 0 {
            debug!(
                "tick {} | born={} removed={} | agents={}",
                self.tick,
                stats.born,
                stats.removed,
                session.env.agent_count()
            );
        }
        self.emit_tick();
    }

    fn emit_tick(&mut self) {
        let Some(on_tick) = &mut self.on_tick else {
            return;
        };
        let report = TickReport {
            tick: self.tick,
            agent_count: self.session.as_ref().map_or(0, |s| s.env.agent_count()),
            agents: self
                .session
                .as_ref()
                .map(|s| s.env.snapshot())
                .unwrap_or_default(),
        };
        on_tick(&report);
    }

    fn report_error(&mut self, err: &EngineError) {
        warn!("{}", err);
        if let Some(on_error) = &mut self.on_error {
            on_error(err);
        }
    }
}

impl Default for SimulationEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentflow_core::{AgentType, BehaviorSpec, EnvironmentSettings, Population};
    use std::sync::Mutex;

    fn walker_model(count: usize) -> Model {
        Model {
            environment: EnvironmentSettings {
                width: 200.0,
                height: 200.0,
                wraparound: true,
                ..Default::default()
            },
            agent_types: vec![AgentType::new("walker")
                .with_behavior(BehaviorSpec::new("random-walk").param("speed", "$speed"))],
            populations: vec![Population::new("walker", count)],
            parameters: vec![Parameter::number("speed", 1.0, 0.0, 10.0)],
            visualizations: Vec::new(),
        }
    }

    #[test]
    fn test_uninitialized_engine_is_inert() {
        let mut engine = SimulationEngine::default();
        assert_eq!(engine.play(), None);
        engine.step();
        engine.pause();
        assert_eq!(engine.tick(), 0);
        assert_eq!(engine.agent_count(), 0);
        assert!(!engine.is_running());
        assert!(engine.reset().is_ok());
    }

    #[test]
    fn test_initialize_population_count() {
        let mut engine = SimulationEngine::default();
        engine.initialize(walker_model(37)).unwrap();
        assert_eq!(engine.agent_count(), 37);
        assert_eq!(engine.tick(), 0);
        assert_eq!(engine.state(), PlaybackState::Idle);
    }

    #[test]
    fn test_empty_model_stays_idle_without_error() {
        let errors = Arc::new(Mutex::new(0));
        let ticks = Arc::new(Mutex::new(Vec::new()));
        let (e, t) = (errors.clone(), ticks.clone());

        let mut engine = SimulationEngine::default();
        engine.set_callbacks(
            move |r: &TickReport| t.lock().unwrap().push(r.agent_count),
            move |_: &EngineError| *e.lock().unwrap() += 1,
        );
        engine.initialize(Model::default()).unwrap();

        assert!(!engine.is_initialized());
        assert_eq!(engine.play(), None);
        assert_eq!(*errors.lock().unwrap(), 0);
        assert_eq!(*ticks.lock().unwrap(), vec![0]);
    }

    #[test]
    fn test_compile_error_keeps_previous_state() {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = errors.clone();

        let mut engine = SimulationEngine::default();
        engine.set_callbacks(|_: &TickReport| {}, move |e: &EngineError| {
            sink.lock().unwrap().push(e.to_string())
        });
        engine.initialize(walker_model(5)).unwrap();
        engine.step();

        let mut bad = walker_model(5);
        bad.agent_types[0].behaviors.push(BehaviorSpec::new("teleport"));
        assert!(matches!(engine.initialize(bad), Err(EngineError::Compile(_))));

        assert_eq!(errors.lock().unwrap().len(), 1);
        assert_eq!(engine.agent_count(), 5);
        assert_eq!(engine.tick(), 1);
    }

    #[test]
    fn test_pause_then_step_advances_one_tick() {
        let mut engine = SimulationEngine::default();
        engine.initialize(walker_model(10)).unwrap();

        let token = engine.play().unwrap();
        assert!(engine.is_running());
        engine.pause();
        engine.step();

        assert_eq!(engine.tick(), 1);
        assert_eq!(engine.state(), PlaybackState::Paused);
        assert_eq!(engine.frame(token), FrameOutcome::Stop);
        assert_eq!(engine.tick(), 1);
    }

    #[test]
    fn test_play_pause_stops_frames() {
        let mut engine = SimulationEngine::default();
        engine.initialize(walker_model(10)).unwrap();
        engine.set_speed(3);

        let token = engine.play().unwrap();
        assert_eq!(engine.play(), None);
        assert_eq!(engine.frame(token), FrameOutcome::Continue { ticks: 3 });
        assert_eq!(engine.tick(), 3);

        engine.pause();
        let before = engine.tick();
        assert_eq!(engine.frame(token), FrameOutcome::Stop);
        assert_eq!(engine.frame(token), FrameOutcome::Stop);
        assert_eq!(engine.tick(), before);
    }

    #[test]
    fn test_reset_invalidates_token_and_restarts() {
        let mut engine = SimulationEngine::default();
        engine.initialize(walker_model(10)).unwrap();
        let token = engine.play().unwrap();
        engine.frame(token);

        engine.reset().unwrap();
        assert_eq!(engine.tick(), 0);
        assert!(!engine.is_running());
        assert_eq!(engine.frame(token), FrameOutcome::Stop);
    }

    #[test]
    fn test_reset_applies_staged_model_and_keeps_parameters() {
        let mut engine = SimulationEngine::default();
        engine.initialize(walker_model(10)).unwrap();
        engine.update_parameter("speed", Value::Number(7.0));

        engine.update_model(walker_model(25));
        assert_eq!(engine.agent_count(), 10);
        engine.reset().unwrap();

        assert_eq!(engine.agent_count(), 25);
        let params = engine.environment().unwrap().params();
        assert_eq!(params.number("speed"), Some(7.0));
    }

    #[test]
    fn test_parameter_is_clamped() {
        let mut engine = SimulationEngine::default();
        engine.initialize(walker_model(1)).unwrap();
        assert!(engine.update_parameter("speed", Value::Number(99.0)));
        let params = engine.environment().unwrap().params();
        assert_eq!(params.number("speed"), Some(10.0));
    }

    #[test]
    fn test_parameter_update_without_session() {
        let mut engine = SimulationEngine::default();
        assert!(!engine.update_parameter("speed", Value::Number(2.0)));

        // No populations, so the model is staged but nothing is built
        let mut model = walker_model(0);
        model.populations.clear();
        engine.initialize(model).unwrap();
        assert!(engine.environment().is_none());
        assert!(engine.update_parameter("speed", Value::Number(2.0)));
        assert!(!engine.update_parameter("missing", Value::Number(2.0)));
    }

    #[test]
    fn test_tick_callback_fires_per_step() {
        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink = reports.clone();

        let mut engine = SimulationEngine::default();
        engine.set_callbacks(
            move |r: &TickReport| sink.lock().unwrap().push((r.tick, r.agents.len())),
            |_: &EngineError| {},
        );
        engine.initialize(walker_model(4)).unwrap();
        engine.step();
        engine.step();

        assert_eq!(*reports.lock().unwrap(), vec![(0, 4), (1, 4), (2, 4)]);
    }

    #[test]
    fn test_cleanup_stops_everything() {
        let mut engine = SimulationEngine::default();
        engine.initialize(walker_model(4)).unwrap();
        let token = engine.play().unwrap();
        engine.cleanup();

        assert_eq!(engine.frame(token), FrameOutcome::Stop);
        assert_eq!(engine.agent_count(), 0);
        assert!(engine.snapshot().is_empty());
    }

    #[test]
    fn test_initialize_json_reports_load_error() {
        let mut engine = SimulationEngine::default();
        assert!(matches!(
            engine.initialize_json("{ not json"),
            Err(EngineError::ModelLoad(_))
        ));
    }

    #[derive(Debug, Clone, Copy)]
    enum Op {
        Play,
        Pause,
        Step,
        Frame,
        Reset,
    }

    fn op() -> impl proptest::strategy::Strategy<Value = Op> {
        use proptest::prelude::*;
        prop_oneof![
            Just(Op::Play),
            Just(Op::Pause),
            Just(Op::Step),
            Just(Op::Frame),
            Just(Op::Reset),
        ]
    }

    proptest::proptest! {
        #![proptest_config(proptest::prelude::ProptestConfig::with_cases(32))]

        #[test]
        fn prop_lifecycle_tick_accounting(ops in proptest::collection::vec(op(), 1..40)) {
            let mut engine = SimulationEngine::default();
            engine.initialize(walker_model(6)).unwrap();
            let mut token = None;
            let mut expected = 0u64;

            for op in ops {
                let generation = engine.generation();
                match op {
                    Op::Play => {
                        if let Some(t) = engine.play() {
                            token = Some(t);
                        }
                    }
                    Op::Pause => engine.pause(),
                    Op::Step => {
                        engine.step();
                        expected += 1;
                    }
                    Op::Frame => {
                        if let Some(t) = token {
                            if let FrameOutcome::Continue { ticks } = engine.frame(t) {
                                proptest::prop_assert!(engine.is_running());
                                expected += ticks as u64;
                            }
                        }
                    }
                    Op::Reset => {
                        engine.reset().unwrap();
                        expected = 0;
                    }
                }
                proptest::prop_assert!(engine.generation() >= generation);
                proptest::prop_assert_eq!(engine.tick(), expected);
                proptest::prop_assert_eq!(engine.agent_count(), 6);
            }
        }
    }
}
