use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::CaptureError;
use crate::media::default_recorder_preferences;

/// Configuration for the capture engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Hard ceiling on recording duration
    /// Default: 120 seconds
    pub max_duration_secs: u64,

    /// Segment cadence of the encoder
    /// Default: 100ms (small segments stream more smoothly)
    pub timeslice_ms: u64,

    /// Container/codec combinations, highest fidelity first
    pub mime_preferences: Vec<String>,
}

impl RecorderConfig {
    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.max_duration_secs == 0 {
            return Err(CaptureError::Config(
                "max_duration_secs must be at least 1".to_string(),
            ));
        }
        if self.mime_preferences.is_empty() {
            return Err(CaptureError::Config(
                "mime_preferences must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn timeslice(&self) -> Duration {
        Duration::from_millis(self.timeslice_ms.max(1))
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            max_duration_secs: 120,
            timeslice_ms: 100,
            mime_preferences: default_recorder_preferences(),
        }
    }
}
