//! Simulation host implementing HostContext on a virtual clock.

use agentflow_env::HostContext;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Host backed by a virtual clock.
///
/// Each `next_frame()` advances virtual time by one frame interval and
/// yields to the executor instead of sleeping, so a playback loop runs as
/// fast as the executor allows while the clock stays reproducible.
pub struct SimHost {
    /// Current virtual time in nanoseconds
    virtual_time_ns: Arc<AtomicU64>,

    /// Virtual time per frame
    frame_interval: Duration,

    /// Frames handed out so far
    frames: Arc<AtomicU64>,
}

impl SimHost {
    /// Creates a host running at `fps` virtual frames per second (minimum 1).
    pub fn new(fps: u32) -> Self {
        Self {
            virtual_time_ns: Arc::new(AtomicU64::new(0)),
            frame_interval: Duration::from_secs_f64(1.0 / fps.max(1) as f64),
            frames: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Creates an Arc-wrapped host for sharing.
    pub fn shared(fps: u32) -> Arc<Self> {
        Arc::new(Self::new(fps))
    }

    /// Advances virtual time by the given duration.
    pub fn advance_time(&self, duration: Duration) {
        self.virtual_time_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
    }

    /// Returns the current virtual time in nanoseconds.
    pub fn time_ns(&self) -> u64 {
        self.virtual_time_ns.load(Ordering::SeqCst)
    }
}

impl Clone for SimHost {
    fn clone(&self) -> Self {
        Self {
            virtual_time_ns: Arc::clone(&self.virtual_time_ns),
            frame_interval: self.frame_interval,
            frames: Arc::clone(&self.frames),
        }
    }
}

impl Default for SimHost {
    fn default() -> Self {
        Self::new(60)
    }
}

#[async_trait]
impl HostContext for SimHost {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.time_ns())
    }

    fn frame_interval(&self) -> Duration {
        self.frame_interval
    }

    async fn next_frame(&self) {
        self.advance_time(self.frame_interval);
        self.frames.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
    }

    fn spawn<F>(&self, name: &str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        tracing::debug!("Spawning sim task '{}'", name);
        tokio::spawn(future);
    }

    fn frames_elapsed(&self) -> u64 {
        self.frames.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sim_host_time() {
        let host = SimHost::new(10);
        assert_eq!(host.now(), Duration::ZERO);

        host.advance_time(Duration::from_secs(1));
        assert_eq!(host.now(), Duration::from_secs(1));

        host.advance_time(Duration::from_millis(500));
        assert_eq!(host.now(), Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn test_next_frame_advances_virtual_clock() {
        let host = SimHost::new(4);
        host.next_frame().await;
        host.next_frame().await;
        assert_eq!(host.frames_elapsed(), 2);
        assert_eq!(host.now(), Duration::from_millis(500));
    }

    #[test]
    fn test_sim_host_clone_shares_time() {
        let a = SimHost::new(60);
        let b = a.clone();

        a.advance_time(Duration::from_secs(5));

        assert_eq!(a.now(), b.now());
    }
}
