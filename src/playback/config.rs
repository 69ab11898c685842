use serde::{Deserialize, Serialize};

use crate::media::default_playback_preferences;

/// Configuration for the playback engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Container/codec combinations tried against the sink, in order
    pub mime_preferences: Vec<String>,

    /// Media older than this many seconds behind the playback position
    /// is evicted when the sink runs out of space
    /// Default: 30 seconds
    pub eviction_window_secs: f64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            mime_preferences: default_playback_preferences(),
            eviction_window_secs: 30.0,
        }
    }
}
