//! Discovery API served next to the relay
//!
//! - GET /health - Health check
//! - GET /live-streams - Streams currently live
//! - GET /recordings - Archived recordings, newest first
//! - GET /recordings/:filename - Download an archived recording

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
