use crate::relay::{ArchiveStore, StreamRegistry};
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Live streams, shared with the relay
    pub registry: StreamRegistry,
    pub archive: Arc<ArchiveStore>,
}

impl AppState {
    pub fn new(registry: StreamRegistry, archive: Arc<ArchiveStore>) -> Self {
        Self { registry, archive }
    }
}
