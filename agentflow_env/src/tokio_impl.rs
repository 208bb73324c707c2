//! Production implementation of HostContext using Tokio.

use crate::HostContext;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Real-time host backed by the Tokio timer.
///
/// Frames are paced by sleeping for a fixed interval, which plays the role
/// of a display's animation-frame callback in a headless process.
pub struct TokioHost {
    /// Start time for monotonic duration calculations
    start: Instant,

    /// Time between frames
    frame_interval: Duration,

    /// Frames handed out so far
    frames: AtomicU64,
}

impl TokioHost {
    /// Creates a new host running at `fps` frames per second (minimum 1).
    pub fn new(fps: u32) -> Self {
        let fps = fps.max(1);
        Self {
            start: Instant::now(),
            frame_interval: Duration::from_secs_f64(1.0 / fps as f64),
            frames: AtomicU64::new(0),
        }
    }

    /// Creates an Arc-wrapped host for sharing across tasks.
    pub fn shared(fps: u32) -> Arc<Self> {
        Arc::new(Self::new(fps))
    }
}

impl Default for TokioHost {
    fn default() -> Self {
        Self::new(60)
    }
}

#[async_trait]
impl HostContext for TokioHost {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn frame_interval(&self) -> Duration {
        self.frame_interval
    }

    async fn next_frame(&self) {
        tokio::time::sleep(self.frame_interval).await;
        self.frames.fetch_add(1, Ordering::Relaxed);
    }

    fn spawn<F>(&self, name: &str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        debug!("Spawning task '{}'", name);
        tokio::spawn(future);
    }

    fn frames_elapsed(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }
}
