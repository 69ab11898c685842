pub mod chunk;
pub mod mime;

pub use chunk::{LiveChunk, MediaChunk};
pub use mime::{default_playback_preferences, default_recorder_preferences, negotiate};
