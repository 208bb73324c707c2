//! AgentFlow Host Abstraction Layer
//!
//! This crate provides the seam between the simulation engine and whatever
//! drives it: a browser-style animation-frame loop, a timer, or a
//! deterministic virtual clock in tests.
//!
//! # Core Concept: Cooperative Frames
//!
//! The engine never blocks and never runs on its own. A host hands out
//! frames; on each frame the playback loop runs a fixed batch of ticks and
//! then yields back to the host. Everything the loop needs from the outside
//! world goes through [`HostContext`]:
//! - Time (`now()`)
//! - Frame pacing (`next_frame()`)
//! - Background tasks (`spawn()`)
//!
//! Cancellation is generation based: every `play()` hands out a
//! [`PlaybackToken`], and a loop holding a stale token stops at its next
//! frame instead of ticking.
//!
//! # Example
//!
//! ```ignore
//! use agentflow_env::{HostContext, PlaybackToken};
//!
//! async fn playback_loop<H: HostContext>(host: &H, token: PlaybackToken) {
//!     loop {
//!         host.next_frame().await;
//!         if !run_frame(token) {
//!             break;
//!         }
//!     }
//! }
//! ```

mod context;
mod types;
mod error;
mod tokio_impl;

pub use context::HostContext;
pub use types::{FrameStats, PlaybackToken};
pub use error::HostError;
pub use tokio_impl::TokioHost;
