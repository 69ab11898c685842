use bytes::Bytes;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use super::sink::{MediaSink, ReadyState, SinkEvent, SinkEventSender, TimeRange};
use crate::error::AppendError;
use crate::media::mime;

/// Configuration for an in-memory sink
#[derive(Debug, Clone)]
pub struct MemorySinkConfig {
    /// Maximum buffered bytes before appends fail with `CapacityExceeded`
    pub capacity_bytes: usize,
    /// Media duration credited to each appended chunk
    pub segment_secs: f64,
    /// Containers the sink can play (`video/webm`, `video/mp4`, ...)
    pub supported_containers: Vec<String>,
    /// Complete each operation immediately; otherwise wait for `complete()`
    pub auto_complete: bool,
}

impl Default for MemorySinkConfig {
    fn default() -> Self {
        Self {
            capacity_bytes: 16 * 1024 * 1024,
            segment_secs: 0.1,
            supported_containers: vec!["video/webm".to_string()],
            auto_complete: true,
        }
    }
}

struct BufferedSegment {
    range: TimeRange,
    data: Bytes,
}

struct Inner {
    ready: ReadyState,
    mime: Option<String>,
    segments: Vec<BufferedSegment>,
    used_bytes: usize,
    timeline_end: f64,
    current_time: f64,
    updating: bool,
    pending_append: bool,
    appended_total: usize,
}

/// Byte-bounded in-memory sink with a synthetic timeline
///
/// Clones share the same buffer, so a caller can keep a handle to drive
/// playback position and inspect what was appended after handing the sink
/// to a `PlaybackEngine`.
#[derive(Clone)]
pub struct MemorySink {
    config: MemorySinkConfig,
    events: SinkEventSender,
    inner: Arc<Mutex<Inner>>,
}

impl MemorySink {
    pub fn new(config: MemorySinkConfig, events: SinkEventSender) -> Self {
        Self {
            config,
            events,
            inner: Arc::new(Mutex::new(Inner {
                ready: ReadyState::Closed,
                mime: None,
                segments: Vec::new(),
                used_bytes: 0,
                timeline_end: 0.0,
                current_time: 0.0,
                updating: false,
                pending_append: false,
                appended_total: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned buffer is still structurally valid
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn notify(&self, event: SinkEvent) {
        // The engine may already be gone during teardown
        let _ = self.events.send(event);
    }

    fn begin_operation(&self, inner: &mut Inner, append: bool) {
        if self.config.auto_complete {
            self.notify(SinkEvent::UpdateEnd);
        } else {
            inner.updating = true;
            inner.pending_append = append;
        }
    }

    /// Complete the outstanding operation (manual completion mode)
    pub fn complete(&self) {
        let mut inner = self.lock();
        if inner.updating {
            inner.updating = false;
            self.notify(SinkEvent::UpdateEnd);
        }
    }

    /// Fail the outstanding operation (manual completion mode)
    ///
    /// A failed append leaves nothing buffered.
    pub fn fail(&self, reason: &str) {
        let mut inner = self.lock();
        if inner.updating {
            inner.updating = false;
            if inner.pending_append {
                if let Some(segment) = inner.segments.pop() {
                    inner.used_bytes -= segment.data.len();
                    inner.timeline_end = segment.range.start;
                }
            }
            self.notify(SinkEvent::Error(reason.to_string()));
        }
    }

    /// Move the playback position
    pub fn set_current_time(&self, seconds: f64) {
        self.lock().current_time = seconds;
        self.notify(SinkEvent::TimeUpdate(seconds));
    }

    /// Chunks currently buffered, oldest first
    pub fn buffered_chunks(&self) -> Vec<Bytes> {
        self.lock().segments.iter().map(|s| s.data.clone()).collect()
    }

    /// Number of appends accepted over the sink's lifetime
    pub fn appended_total(&self) -> usize {
        self.lock().appended_total
    }

    pub fn used_bytes(&self) -> usize {
        self.lock().used_bytes
    }

    pub fn mime(&self) -> Option<String> {
        self.lock().mime.clone()
    }
}

impl MediaSink for MemorySink {
    fn open(&mut self) -> Result<(), AppendError> {
        let mut inner = self.lock();
        if inner.ready != ReadyState::Open {
            inner.ready = ReadyState::Open;
            self.notify(SinkEvent::SourceOpen);
        }
        Ok(())
    }

    fn ready_state(&self) -> ReadyState {
        self.lock().ready
    }

    fn is_type_supported(&self, mime_type: &str) -> bool {
        let container = mime::container(mime_type);
        self.config
            .supported_containers
            .iter()
            .any(|supported| supported == container)
    }

    fn add_source_buffer(&mut self, mime_type: &str) -> Result<(), AppendError> {
        if !self.is_type_supported(mime_type) {
            return Err(AppendError::Malformed(format!("unsupported type {}", mime_type)));
        }

        let mut inner = self.lock();
        if inner.ready != ReadyState::Open {
            return Err(AppendError::Closed);
        }

        inner.mime = Some(mime_type.to_string());
        Ok(())
    }

    fn is_updating(&self) -> bool {
        self.lock().updating
    }

    fn append(&mut self, data: Bytes) -> Result<(), AppendError> {
        let mut inner = self.lock();

        if inner.ready != ReadyState::Open || inner.mime.is_none() {
            return Err(AppendError::Closed);
        }
        if inner.updating {
            return Err(AppendError::Busy);
        }
        if data.is_empty() {
            return Err(AppendError::Malformed("empty chunk".to_string()));
        }

        let available = self.config.capacity_bytes.saturating_sub(inner.used_bytes);
        if data.len() > available {
            return Err(AppendError::CapacityExceeded {
                needed: data.len(),
                available,
            });
        }

        let start = inner.timeline_end;
        let end = start + self.config.segment_secs;
        inner.used_bytes += data.len();
        inner.timeline_end = end;
        inner.appended_total += 1;
        inner.segments.push(BufferedSegment {
            range: TimeRange::new(start, end),
            data,
        });

        self.begin_operation(&mut inner, true);
        Ok(())
    }

    fn remove(&mut self, start: f64, end: f64) -> Result<(), AppendError> {
        let mut inner = self.lock();

        if inner.ready != ReadyState::Open {
            return Err(AppendError::Closed);
        }
        if inner.updating {
            return Err(AppendError::Busy);
        }

        let before = inner.used_bytes;
        let mut freed = 0;
        inner.segments.retain(|segment| {
            let evict = segment.range.start >= start && segment.range.end <= end;
            if evict {
                freed += segment.data.len();
            }
            !evict
        });
        inner.used_bytes = before - freed;

        debug!("Removed {} bytes buffered in [{:.1}, {:.1})", freed, start, end);

        self.begin_operation(&mut inner, false);
        Ok(())
    }

    fn buffered(&self) -> Vec<TimeRange> {
        self.lock().segments.iter().map(|s| s.range).collect()
    }

    fn current_time(&self) -> f64 {
        self.lock().current_time
    }

    fn close(&mut self) {
        let mut inner = self.lock();
        if inner.ready == ReadyState::Closed {
            return;
        }

        inner.ready = ReadyState::Closed;
        inner.segments.clear();
        inner.used_bytes = 0;
        inner.updating = false;
        self.notify(SinkEvent::SourceClosed);
    }

    fn name(&self) -> &str {
        "memory"
    }
}
