use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Replay budget per stream, kept well under the 1 MiB NATS payload limit
/// once base64 encoded
pub const DEFAULT_REPLAY_LIMIT: usize = 512 * 1024;

/// Public view of a live stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveStreamInfo {
    /// Stream id viewers join with
    pub socket_id: String,
    /// Unix timestamp in milliseconds
    pub started_at: i64,
    pub viewers: usize,
    pub chunks: u64,
}

/// Header segment plus the most recent media segments
#[derive(Default)]
struct Replay {
    header: Option<Bytes>,
    recent: VecDeque<Bytes>,
    recent_bytes: usize,
}

impl Replay {
    fn push(&mut self, segment: Bytes, limit: usize) {
        if self.header.is_none() {
            self.header = Some(segment);
            return;
        }

        self.recent_bytes += segment.len();
        self.recent.push_back(segment);

        let budget = limit.saturating_sub(self.header.as_ref().map_or(0, Bytes::len));
        while self.recent_bytes > budget {
            let Some(old) = self.recent.pop_front() else {
                break;
            };
            self.recent_bytes -= old.len();
        }
    }

    fn assemble(&self) -> Option<Bytes> {
        let header = self.header.as_ref()?;
        let mut out = BytesMut::with_capacity(header.len() + self.recent_bytes);
        out.extend_from_slice(header);
        for segment in &self.recent {
            out.extend_from_slice(segment);
        }
        Some(out.freeze())
    }
}

struct LiveStream {
    started_at: DateTime<Utc>,
    live: bool,
    replay: Replay,
    chunks: u64,
    viewers: usize,
}

impl LiveStream {
    fn new() -> Self {
        Self {
            started_at: Utc::now(),
            live: true,
            replay: Replay::default(),
            chunks: 0,
            viewers: 0,
        }
    }

    fn info(&self, id: &str) -> LiveStreamInfo {
        LiveStreamInfo {
            socket_id: id.to_string(),
            started_at: self.started_at.timestamp_millis(),
            viewers: self.viewers,
            chunks: self.chunks,
        }
    }
}

/// Live streams known to the relay (stream id -> state)
#[derive(Clone)]
pub struct StreamRegistry {
    streams: Arc<RwLock<HashMap<String, LiveStream>>>,
    replay_limit: usize,
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::with_replay_limit(DEFAULT_REPLAY_LIMIT)
    }
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry whose join replay holds at most `replay_limit` bytes
    /// (the header is always kept)
    pub fn with_replay_limit(replay_limit: usize) -> Self {
        Self {
            streams: Arc::new(RwLock::new(HashMap::new())),
            replay_limit,
        }
    }

    /// Register a stream as live and reset its replay buffer
    pub async fn start(&self, id: &str) {
        let mut streams = self.streams.write().await;
        let viewers = streams.get(id).map(|s| s.viewers).unwrap_or(0);

        let mut stream = LiveStream::new();
        stream.viewers = viewers;
        streams.insert(id.to_string(), stream);

        info!("Stream {} is live", id);
    }

    /// Add a segment to the replay buffer and return the session's chunk count
    pub async fn append(&self, id: &str, segment: Bytes) -> u64 {
        let mut streams = self.streams.write().await;
        let stream = streams.entry(id.to_string()).or_insert_with(|| {
            warn!("Segment for {} arrived without a session start", id);
            LiveStream::new()
        });

        stream.live = true;
        stream.replay.push(segment, self.replay_limit);
        stream.chunks += 1;
        stream.chunks
    }

    /// Header plus recent segments for a viewer joining mid-stream
    pub async fn replay(&self, id: &str) -> Option<Bytes> {
        let streams = self.streams.read().await;
        streams
            .get(id)
            .filter(|stream| stream.live)
            .and_then(|stream| stream.replay.assemble())
    }

    /// Mark a stream as ended and drop its replay buffer
    ///
    /// Viewer counts survive so a restarted session keeps its audience.
    pub async fn finish(&self, id: &str) -> Option<LiveStreamInfo> {
        let mut streams = self.streams.write().await;
        let stream = streams.get_mut(id)?;

        let info = stream.info(id);
        stream.live = false;
        stream.replay = Replay::default();

        if stream.viewers == 0 {
            streams.remove(id);
        }

        info!("Stream {} ended after {} chunks", id, info.chunks);
        Some(info)
    }

    pub async fn viewer_joined(&self, id: &str) {
        let mut streams = self.streams.write().await;
        let stream = streams.entry(id.to_string()).or_insert_with(|| {
            let mut stream = LiveStream::new();
            stream.live = false;
            stream
        });
        stream.viewers += 1;
        debug!("Viewer joined {} ({} watching)", id, stream.viewers);
    }

    pub async fn viewer_left(&self, id: &str) {
        let mut streams = self.streams.write().await;
        let Some(stream) = streams.get_mut(id) else {
            return;
        };

        stream.viewers = stream.viewers.saturating_sub(1);
        debug!("Viewer left {} ({} watching)", id, stream.viewers);

        if stream.viewers == 0 && !stream.live {
            streams.remove(id);
        }
    }

    pub async fn get(&self, id: &str) -> Option<LiveStreamInfo> {
        let streams = self.streams.read().await;
        streams
            .get(id)
            .filter(|stream| stream.live)
            .map(|stream| stream.info(id))
    }

    /// Live streams, oldest first
    pub async fn list(&self) -> Vec<LiveStreamInfo> {
        let streams = self.streams.read().await;
        let mut live: Vec<LiveStreamInfo> = streams
            .iter()
            .filter(|(_, stream)| stream.live)
            .map(|(id, stream)| stream.info(id))
            .collect();
        live.sort_by_key(|info| info.started_at);
        live
    }
}
