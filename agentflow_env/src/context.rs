//! Core host context trait for driving a simulation.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

/// The central interface between the playback loop and its host.
///
/// This trait abstracts the scheduler so the same playback loop runs under
/// a real-time Tokio timer and under a virtual clock in tests.
///
/// # Implementations
///
/// - **Production**: `TokioHost` - wraps `tokio::time::sleep` at a fixed frame rate
/// - **Simulation**: `SimHost` (in `agentflow_sim`) - advances a virtual clock per frame
///
/// # Suspension
///
/// The only suspension point of the playback loop is `next_frame()`.
/// Ticks inside one frame run synchronously.
#[async_trait]
pub trait HostContext: Send + Sync + 'static {
    /// Returns the monotonic time since the host was created.
    ///
    /// In simulation, this is the virtual clock time.
    fn now(&self) -> Duration;

    /// Returns the nominal duration of one frame.
    fn frame_interval(&self) -> Duration;

    /// Suspends until the next frame is due.
    ///
    /// In production: sleeps for the frame interval
    /// In simulation: advances the virtual clock and yields to the executor
    async fn next_frame(&self);

    /// Spawns a background task.
    fn spawn<F>(&self, name: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static;

    /// Returns the number of frames handed out so far.
    fn frames_elapsed(&self) -> u64;
}
