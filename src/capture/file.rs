use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::device::{CaptureDevice, PreviewHandle};
use crate::error::CaptureError;
use crate::media::mime;

/// Default bytes per emitted segment
pub const DEFAULT_SEGMENT_BYTES: usize = 64 * 1024;

/// Capture device that replays a pre-encoded media file
///
/// The file is cut into fixed-size segments, one per timeslice. The first
/// segment carries the container header as long as it is at least as large
/// as the file's initialization data.
pub struct FileCaptureDevice {
    path: PathBuf,
    segment_bytes: usize,
    data: Option<Bytes>,
    encoder: Option<JoinHandle<()>>,
}

impl FileCaptureDevice {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_segment_bytes(path, DEFAULT_SEGMENT_BYTES)
    }

    pub fn with_segment_bytes(path: impl Into<PathBuf>, segment_bytes: usize) -> Self {
        Self {
            path: path.into(),
            segment_bytes: segment_bytes.max(1),
            data: None,
            encoder: None,
        }
    }

    fn container(&self) -> Option<&'static str> {
        match self.path.extension().and_then(|e| e.to_str()) {
            Some("webm") | Some("mkv") => Some("video/webm"),
            Some("mp4") | Some("m4v") => Some("video/mp4"),
            _ => None,
        }
    }

    fn stop_encoder(&mut self) {
        if let Some(task) = self.encoder.take() {
            task.abort();
        }
    }
}

#[async_trait]
impl CaptureDevice for FileCaptureDevice {
    async fn acquire(&mut self) -> Result<PreviewHandle, CaptureError> {
        info!("Opening capture file: {}", self.path.display());

        let data = tokio::fs::read(&self.path).await.map_err(|e| match e.kind() {
            ErrorKind::PermissionDenied => {
                CaptureError::PermissionDenied(format!("{}: {}", self.path.display(), e))
            }
            _ => CaptureError::DeviceUnavailable(format!("{}: {}", self.path.display(), e)),
        })?;

        if data.is_empty() {
            return Err(CaptureError::DeviceUnavailable(format!(
                "{} is empty",
                self.path.display()
            )));
        }

        info!("Capture file loaded: {} bytes", data.len());

        self.data = Some(Bytes::from(data));
        Ok(PreviewHandle::new(self.name()))
    }

    fn is_type_supported(&self, mime_type: &str) -> bool {
        self.container() == Some(mime::container(mime_type))
    }

    async fn start_encoder(
        &mut self,
        mime_type: &str,
        timeslice: Duration,
    ) -> Result<mpsc::Receiver<Bytes>, CaptureError> {
        let data = self
            .data
            .clone()
            .ok_or_else(|| CaptureError::Encoder("capture file not acquired".to_string()))?;

        if !self.is_type_supported(mime_type) {
            return Err(CaptureError::Encoder(format!(
                "{} cannot be produced from {}",
                mime_type,
                self.path.display()
            )));
        }

        self.stop_encoder();

        let (tx, rx) = mpsc::channel(1);
        let segment_bytes = self.segment_bytes;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(timeslice);
            let mut offset = 0;

            while offset < data.len() {
                ticker.tick().await;
                let end = (offset + segment_bytes).min(data.len());
                if tx.send(data.slice(offset..end)).await.is_err() {
                    break;
                }
                offset = end;
            }

            debug!("Capture file exhausted after {} bytes", offset);
        });

        self.encoder = Some(task);
        Ok(rx)
    }

    async fn flush(&mut self) -> Result<Option<Bytes>, CaptureError> {
        // Segments are cut whole, so nothing is held back between ticks
        self.stop_encoder();
        Ok(None)
    }

    async fn release(&mut self) {
        self.stop_encoder();
        if self.data.take().is_some() {
            info!("Released capture file: {}", self.path.display());
        }
    }

    fn is_acquired(&self) -> bool {
        self.data.is_some()
    }

    fn name(&self) -> &str {
        "file"
    }
}

impl Drop for FileCaptureDevice {
    fn drop(&mut self) {
        self.stop_encoder();
    }
}
