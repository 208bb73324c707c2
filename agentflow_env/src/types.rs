//! Common types for the AgentFlow host abstraction.

use serde::{Deserialize, Serialize};

/// Generation stamp handed out by `play()`.
///
/// A playback loop keeps the token it was started with and presents it on
/// every frame. Any lifecycle change (pause, reset, re-initialize, cleanup)
/// moves the engine to a new generation, so frames presented with an older
/// token are refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlaybackToken(pub u64);

impl PlaybackToken {
    /// Creates a token for the given generation.
    pub fn new(generation: u64) -> Self {
        Self(generation)
    }

    /// Returns the generation this token was issued for.
    pub fn generation(&self) -> u64 {
        self.0
    }

    /// Returns true if this token belongs to `generation`.
    pub fn is_current(&self, generation: u64) -> bool {
        self.0 == generation
    }
}

impl std::fmt::Display for PlaybackToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "gen-{}", self.0)
    }
}

/// Counters reported by a playback loop when it exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameStats {
    /// Frames the loop waited for
    pub frames: u64,

    /// Ticks executed across those frames
    pub ticks: u64,
}

impl FrameStats {
    /// Records one frame that executed `ticks` ticks.
    pub fn record(&mut self, ticks: u64) {
        self.frames += 1;
        self.ticks += ticks;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_generation_match() {
        let token = PlaybackToken::new(3);
        assert!(token.is_current(3));
        assert!(!token.is_current(4));
        assert_eq!(token.to_string(), "gen-3");
    }

    #[test]
    fn test_frame_stats_record() {
        let mut stats = FrameStats::default();
        stats.record(4);
        stats.record(4);
        assert_eq!(stats.frames, 2);
        assert_eq!(stats.ticks, 8);
    }
}
