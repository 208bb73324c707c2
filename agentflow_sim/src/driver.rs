//! Host-driven playback loop.
//!
//! The loop owns nothing: it waits for a frame, takes the engine lock for the
//! duration of one frame's tick batch, and exits as soon as the engine
//! refuses its token. Parameter writes from other tasks go through the same
//! lock and therefore always land between batches.

use crate::engine::{FrameOutcome, SimulationEngine};

use agentflow_env::{FrameStats, HostContext, HostError, PlaybackToken};
use std::sync::{Arc, Mutex};
use tracing::{debug, error};

/// Runs frames until the engine stops accepting `token`.
pub async fn run_playback<H: HostContext>(
    host: &H,
    engine: &Mutex<SimulationEngine>,
    token: PlaybackToken,
) -> Result<FrameStats, HostError> {
    let mut stats = FrameStats::default();
    loop {
        host.next_frame().await;
        let outcome = engine
            .lock()
            .map_err(|e| HostError::poisoned(e.to_string()))?
            .frame(token);
        match outcome {
            FrameOutcome::Continue { ticks } => stats.record(ticks as u64),
            FrameOutcome::Stop => break,
        }
    }
    debug!(
        "Playback {} finished: {} frames, {} ticks",
        token, stats.frames, stats.ticks
    );
    Ok(stats)
}

/// Starts playback and schedules its loop on the host.
///
/// Returns the issued token, or None if the engine was already running or
/// is uninitialized.
pub fn spawn_playback<H: HostContext>(
    host: Arc<H>,
    engine: Arc<Mutex<SimulationEngine>>,
) -> Result<Option<PlaybackToken>, HostError> {
    let token = engine
        .lock()
        .map_err(|e| HostError::poisoned(e.to_string()))?
        .play();
    let Some(token) = token else {
        return Ok(None);
    };

    let task_host = Arc::clone(&host);
    host.spawn("playback", async move {
        if let Err(e) = run_playback(task_host.as_ref(), &engine, token).await {
            error!("Playback {} aborted: {}", token, e);
        }
    });
    Ok(Some(token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SimHost;
    use crate::scenarios::flocking;
    use crate::EngineConfig;

    fn engine() -> Arc<Mutex<SimulationEngine>> {
        let mut engine = SimulationEngine::new(EngineConfig::default());
        engine.initialize(flocking(30)).unwrap();
        Arc::new(Mutex::new(engine))
    }

    #[tokio::test]
    async fn test_stale_token_exits_immediately() {
        let host = SimHost::new(60);
        let engine = engine();
        let token = engine.lock().unwrap().play().unwrap();
        engine.lock().unwrap().pause();

        let stats = run_playback(&host, &engine, token).await.unwrap();
        assert_eq!(stats.ticks, 0);
        assert_eq!(engine.lock().unwrap().tick(), 0);
    }

    #[tokio::test]
    async fn test_spawned_playback_stops_on_pause() {
        let host = SimHost::shared(60);
        let engine = engine();
        engine.lock().unwrap().set_speed(2);

        let token = spawn_playback(host.clone(), engine.clone()).unwrap();
        assert!(token.is_some());
        assert_eq!(spawn_playback(host.clone(), engine.clone()).unwrap(), None);

        while engine.lock().unwrap().tick() < 10 {
            tokio::task::yield_now().await;
        }
        engine.lock().unwrap().pause();

        // Give a stale loop two frames' worth of chances to tick
        let frozen = engine.lock().unwrap().tick();
        host.next_frame().await;
        host.next_frame().await;
        assert_eq!(engine.lock().unwrap().tick(), frozen);
        assert_eq!(frozen % 2, 0);
    }

    #[tokio::test]
    async fn test_reset_during_playback_cancels_loop() {
        let host = SimHost::new(60);
        let engine = engine();
        let token = engine.lock().unwrap().play().unwrap();

        let loop_engine = engine.clone();
        let handle = tokio::spawn(async move {
            let host = SimHost::new(60);
            run_playback(&host, &loop_engine, token).await
        });

        while engine.lock().unwrap().tick() < 3 {
            host.next_frame().await;
        }
        engine.lock().unwrap().reset().unwrap();

        let stats = handle.await.unwrap().unwrap();
        assert!(stats.ticks >= 3);
        assert!(!engine.lock().unwrap().is_running());
    }
}
