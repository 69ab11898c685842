use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

use super::file::FileCaptureDevice;
use super::synthetic::SyntheticCaptureDevice;
use crate::error::CaptureError;

/// Live preview of an acquired capture device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewHandle {
    /// Device name for display and logging
    pub device_name: String,
    /// When the device was acquired
    pub acquired_at: DateTime<Utc>,
}

impl PreviewHandle {
    pub fn new(device_name: impl Into<String>) -> Self {
        Self {
            device_name: device_name.into(),
            acquired_at: Utc::now(),
        }
    }
}

/// Capture source plus its segment encoder
///
/// A device is held by at most one recording session. `release` must be
/// safe to call repeatedly and from any state.
#[async_trait]
pub trait CaptureDevice: Send {
    /// Request the device
    ///
    /// Fails with `PermissionDenied` or `DeviceUnavailable`.
    async fn acquire(&mut self) -> Result<PreviewHandle, CaptureError>;

    /// Whether the encoder can produce the given container/codec type
    fn is_type_supported(&self, mime: &str) -> bool;

    /// Start encoding; one segment is produced per `timeslice`
    ///
    /// The receiver closes when the source runs dry.
    async fn start_encoder(
        &mut self,
        mime: &str,
        timeslice: Duration,
    ) -> Result<mpsc::Receiver<Bytes>, CaptureError>;

    /// Stop the encoder and return data buffered since the last segment
    async fn flush(&mut self) -> Result<Option<Bytes>, CaptureError>;

    /// Stop all underlying tracks and give the device back
    async fn release(&mut self);

    fn is_acquired(&self) -> bool;

    /// Get device name for logging
    fn name(&self) -> &str;
}

/// Capture source type
#[derive(Debug, Clone)]
pub enum CaptureSource {
    /// Replay a pre-encoded media file
    File(PathBuf),
    /// Generated test pattern
    Synthetic,
}

pub struct CaptureDeviceFactory;

impl CaptureDeviceFactory {
    pub fn create(source: CaptureSource) -> Box<dyn CaptureDevice> {
        match source {
            CaptureSource::File(path) => Box::new(FileCaptureDevice::new(path)),
            CaptureSource::Synthetic => Box::new(SyntheticCaptureDevice::new()),
        }
    }
}
