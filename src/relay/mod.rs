//! Relay between producers and viewers
//!
//! This module provides the server role of the pipeline:
//! - Registry of live streams with a bounded replay for late joiners
//! - Fan-out of producer segments to each stream's viewers
//! - Archival of every session to disk and reporting of the outcome

mod archive;
mod registry;
mod server;

pub use archive::{ArchiveStore, SavedRecording};
pub use registry::{LiveStreamInfo, StreamRegistry, DEFAULT_REPLAY_LIMIT};
pub use server::Relay;
