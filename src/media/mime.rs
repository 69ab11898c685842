//! Container/codec negotiation against an ordered preference list
//!
//! Producer and consumer use the same strategy: the first supported entry
//! wins, so the list is ordered from highest fidelity down to a bare
//! container type.

use crate::error::NegotiationError;
use tracing::{debug, info};

pub fn default_recorder_preferences() -> Vec<String> {
    vec![
        "video/webm; codecs=vp9,opus".to_string(),
        "video/webm; codecs=vp8,opus".to_string(),
        "video/webm".to_string(),
    ]
}

pub fn default_playback_preferences() -> Vec<String> {
    vec![
        "video/webm; codecs=\"vp9,opus\"".to_string(),
        "video/webm; codecs=\"vp8,opus\"".to_string(),
        "video/webm".to_string(),
        "video/mp4; codecs=\"avc1.42E01E,mp4a.40.2\"".to_string(),
        "video/mp4".to_string(),
    ]
}

/// Pick the first preference accepted by `is_supported`
pub fn negotiate<F>(preferences: &[String], is_supported: F) -> Result<String, NegotiationError>
where
    F: Fn(&str) -> bool,
{
    for mime in preferences {
        if is_supported(mime.as_str()) {
            info!("Negotiated media type: {}", mime);
            return Ok(mime.clone());
        }
        debug!("Media type not supported: {}", mime);
    }

    Err(NegotiationError::NoSupportedType(preferences.to_vec()))
}

/// Container part of a MIME type (`video/webm; codecs=vp8` -> `video/webm`)
pub fn container(mime: &str) -> &str {
    mime.split(';').next().unwrap_or(mime).trim()
}
