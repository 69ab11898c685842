//! Subject naming and wildcard matching
//!
//! Subjects are dot-separated tokens. `*` matches exactly one token and `>`
//! matches one or more trailing tokens.

use crate::error::TransportError;

/// Producer to relay: session markers and media segments
pub fn ingest(stream_id: &str) -> String {
    format!("ingest.{}", stream_id)
}

/// Relay to viewers of one stream
pub fn room(stream_id: &str) -> String {
    format!("room.{}", stream_id)
}

/// Relay to producer: archival outcome
pub fn outcome(stream_id: &str) -> String {
    format!("outcome.{}", stream_id)
}

/// Viewers to relay: room joins and leaves
pub fn presence(stream_id: &str) -> String {
    format!("presence.{}", stream_id)
}

pub const INGEST_ALL: &str = "ingest.*";
pub const PRESENCE_ALL: &str = "presence.*";

/// A stream id must be exactly one subject token
pub fn validate_stream_id(id: &str) -> Result<(), TransportError> {
    let invalid = id.is_empty()
        || id
            .chars()
            .any(|c| matches!(c, '.' | '*' | '>') || c.is_whitespace());

    if invalid {
        return Err(TransportError::InvalidStreamId(id.to_string()));
    }
    Ok(())
}

/// Stream id carried by a concrete subject (`room.abc` -> `abc`)
pub fn stream_id(subject: &str) -> Option<&str> {
    subject.split_once('.').map(|(_, id)| id)
}

pub fn matches(pattern: &str, subject: &str) -> bool {
    let mut pattern_tokens = pattern.split('.');
    let mut subject_tokens = subject.split('.');

    loop {
        match (pattern_tokens.next(), subject_tokens.next()) {
            (Some(">"), Some(_)) => return true,
            (Some("*"), Some(_)) => continue,
            (Some(p), Some(s)) if p == s => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}
