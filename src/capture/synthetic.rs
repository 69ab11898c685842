use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use super::device::{CaptureDevice, PreviewHandle};
use crate::error::CaptureError;
use crate::media::mime;

/// EBML magic that opens every WebM stream
const EBML_MAGIC: [u8; 4] = [0x1A, 0x45, 0xDF, 0xA3];

/// Generated test pattern
///
/// Emits a small header segment followed by fixed-size pattern segments
/// until stopped. Useful for exercising the pipeline without real media.
pub struct SyntheticCaptureDevice {
    segment_bytes: usize,
    acquired: bool,
    produced: Arc<AtomicU64>,
    encoder: Option<JoinHandle<()>>,
}

impl SyntheticCaptureDevice {
    pub fn new() -> Self {
        Self::with_segment_bytes(4096)
    }

    pub fn with_segment_bytes(segment_bytes: usize) -> Self {
        Self {
            segment_bytes: segment_bytes.max(1),
            acquired: false,
            produced: Arc::new(AtomicU64::new(0)),
            encoder: None,
        }
    }

    fn header(mime_type: &str) -> Bytes {
        let mut header = BytesMut::with_capacity(EBML_MAGIC.len() + mime_type.len());
        header.put_slice(&EBML_MAGIC);
        header.put_slice(mime_type.as_bytes());
        header.freeze()
    }

    fn pattern(index: u64, len: usize) -> Bytes {
        Bytes::from(vec![(index % 251) as u8; len])
    }
}

impl Default for SyntheticCaptureDevice {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CaptureDevice for SyntheticCaptureDevice {
    async fn acquire(&mut self) -> Result<PreviewHandle, CaptureError> {
        self.acquired = true;
        info!("Synthetic capture source acquired");
        Ok(PreviewHandle::new(self.name()))
    }

    fn is_type_supported(&self, mime_type: &str) -> bool {
        mime::container(mime_type) == "video/webm"
    }

    async fn start_encoder(
        &mut self,
        mime_type: &str,
        timeslice: Duration,
    ) -> Result<mpsc::Receiver<Bytes>, CaptureError> {
        if !self.acquired {
            return Err(CaptureError::Encoder(
                "synthetic source not acquired".to_string(),
            ));
        }

        if let Some(task) = self.encoder.take() {
            task.abort();
        }

        let (tx, rx) = mpsc::channel(1);
        let header = Self::header(mime_type);
        let segment_bytes = self.segment_bytes;
        let produced = Arc::clone(&self.produced);
        produced.store(0, Ordering::SeqCst);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(timeslice);
            ticker.tick().await;

            if tx.send(header).await.is_err() {
                return;
            }
            produced.fetch_add(1, Ordering::SeqCst);

            loop {
                ticker.tick().await;
                let index = produced.fetch_add(1, Ordering::SeqCst);
                if tx.send(Self::pattern(index, segment_bytes)).await.is_err() {
                    break;
                }
            }
        });

        self.encoder = Some(task);
        Ok(rx)
    }

    async fn flush(&mut self) -> Result<Option<Bytes>, CaptureError> {
        match self.encoder.take() {
            Some(task) => {
                task.abort();
                // Partial segment accumulated since the last tick
                let index = self.produced.load(Ordering::SeqCst);
                Ok(Some(Self::pattern(index, self.segment_bytes / 2 + 1)))
            }
            None => Ok(None),
        }
    }

    async fn release(&mut self) {
        if let Some(task) = self.encoder.take() {
            task.abort();
        }
        if self.acquired {
            self.acquired = false;
            info!("Synthetic capture source released");
        }
    }

    fn is_acquired(&self) -> bool {
        self.acquired
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}

impl Drop for SyntheticCaptureDevice {
    fn drop(&mut self) {
        if let Some(task) = self.encoder.take() {
            task.abort();
        }
    }
}
