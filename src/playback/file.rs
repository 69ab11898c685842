use bytes::Bytes;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::sink::{MediaSink, ReadyState, SinkEvent, SinkEventSender, TimeRange};
use crate::error::AppendError;
use crate::media::mime;

/// Sink that writes the reassembled stream to a file
///
/// Nothing is ever evicted from a file, so `remove` completes without
/// touching the data and capacity is unbounded.
pub struct FileSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    events: SinkEventSender,
    ready: ReadyState,
    mime: Option<String>,
    bytes_written: u64,
    chunks_written: u64,
}

impl FileSink {
    pub fn create(path: impl AsRef<Path>, events: SinkEventSender) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;

        info!("Writing reassembled stream to {}", path.display());

        Ok(Self {
            path,
            writer: Some(BufWriter::new(file)),
            events,
            ready: ReadyState::Closed,
            mime: None,
            bytes_written: 0,
            chunks_written: 0,
        })
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    fn notify(&self, event: SinkEvent) {
        let _ = self.events.send(event);
    }
}

impl MediaSink for FileSink {
    fn open(&mut self) -> Result<(), AppendError> {
        if self.writer.is_none() {
            return Err(AppendError::Closed);
        }
        if self.ready != ReadyState::Open {
            self.ready = ReadyState::Open;
            self.notify(SinkEvent::SourceOpen);
        }
        Ok(())
    }

    fn ready_state(&self) -> ReadyState {
        self.ready
    }

    fn is_type_supported(&self, mime_type: &str) -> bool {
        matches!(mime::container(mime_type), "video/webm" | "video/mp4")
    }

    fn add_source_buffer(&mut self, mime_type: &str) -> Result<(), AppendError> {
        if self.ready != ReadyState::Open {
            return Err(AppendError::Closed);
        }
        self.mime = Some(mime_type.to_string());
        Ok(())
    }

    fn is_updating(&self) -> bool {
        false
    }

    fn append(&mut self, data: Bytes) -> Result<(), AppendError> {
        if self.ready != ReadyState::Open || self.mime.is_none() {
            return Err(AppendError::Closed);
        }
        let writer = self.writer.as_mut().ok_or(AppendError::Closed)?;

        writer
            .write_all(&data)
            .map_err(|e| AppendError::Write(e.to_string()))?;

        self.bytes_written += data.len() as u64;
        self.chunks_written += 1;
        self.notify(SinkEvent::UpdateEnd);
        Ok(())
    }

    fn remove(&mut self, _start: f64, _end: f64) -> Result<(), AppendError> {
        if self.ready != ReadyState::Open {
            return Err(AppendError::Closed);
        }
        self.notify(SinkEvent::UpdateEnd);
        Ok(())
    }

    fn buffered(&self) -> Vec<TimeRange> {
        if self.chunks_written == 0 {
            Vec::new()
        } else {
            vec![TimeRange::new(0.0, self.chunks_written as f64)]
        }
    }

    fn current_time(&self) -> f64 {
        0.0
    }

    fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush() {
                warn!("Failed to flush {}: {}", self.path.display(), e);
            }
            info!(
                "Closed {} ({} bytes, {} chunks)",
                self.path.display(),
                self.bytes_written,
                self.chunks_written
            );
        }

        if self.ready != ReadyState::Closed {
            self.ready = ReadyState::Closed;
            self.notify(SinkEvent::SourceClosed);
        }
    }

    fn name(&self) -> &str {
        "file"
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush() {
                warn!("Failed to flush {} on drop: {}", self.path.display(), e);
            }
        }
    }
}
