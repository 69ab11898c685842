use anyhow::Result;
use bytes::Bytes;
use chunkcast::capture::{
    CaptureDevice, CaptureDeviceFactory, CaptureSource, FileCaptureDevice,
    SyntheticCaptureDevice,
};
use chunkcast::error::CaptureError;
use std::time::Duration;
use tempfile::TempDir;

#[tokio::test]
async fn test_file_device_cuts_fixed_segments() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("clip.webm");
    std::fs::write(&path, b"0123456789")?;

    let mut device = FileCaptureDevice::with_segment_bytes(&path, 4);
    device.acquire().await?;
    assert!(device.is_acquired());
    assert!(device.is_type_supported("video/webm;codecs=vp9,opus"));
    assert!(!device.is_type_supported("video/mp4"));

    let mut segments = device
        .start_encoder("video/webm", Duration::from_millis(5))
        .await?;

    let mut received = Vec::new();
    while let Some(segment) = segments.recv().await {
        received.push(segment);
    }
    assert_eq!(
        received,
        vec![
            Bytes::from_static(b"0123"),
            Bytes::from_static(b"4567"),
            Bytes::from_static(b"89"),
        ]
    );

    assert_eq!(device.flush().await?, None);
    device.release().await;
    device.release().await;
    assert!(!device.is_acquired());
    Ok(())
}

#[tokio::test]
async fn test_missing_file_is_unavailable() {
    let mut device = FileCaptureDevice::new("/definitely/not/here.webm");

    let err = device.acquire().await.unwrap_err();
    assert!(matches!(err, CaptureError::DeviceUnavailable(_)));
    assert!(!device.is_acquired());
}

#[tokio::test]
async fn test_empty_file_is_unavailable() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("empty.webm");
    std::fs::write(&path, b"")?;

    let mut device = FileCaptureDevice::new(&path);
    assert!(matches!(
        device.acquire().await,
        Err(CaptureError::DeviceUnavailable(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_encoder_requires_acquired_file() {
    let mut device = FileCaptureDevice::new("clip.webm");

    let err = device
        .start_encoder("video/webm", Duration::from_millis(5))
        .await
        .unwrap_err();
    assert!(matches!(err, CaptureError::Encoder(_)));
}

#[tokio::test(start_paused = true)]
async fn test_synthetic_device_emits_header_then_media() -> Result<()> {
    let mut device = SyntheticCaptureDevice::with_segment_bytes(16);
    device.acquire().await?;
    assert!(device.is_type_supported("video/webm;codecs=vp8,opus"));
    assert!(!device.is_type_supported("video/mp4"));

    let mut segments = device
        .start_encoder("video/webm", Duration::from_millis(100))
        .await?;

    let header = segments.recv().await.unwrap();
    assert_eq!(&header[..4], &[0x1a, 0x45, 0xdf, 0xa3]);

    let media = segments.recv().await.unwrap();
    assert_eq!(media.len(), 16);

    let tail = device.flush().await?;
    assert!(tail.is_some_and(|t| !t.is_empty()));

    device.release().await;
    assert!(!device.is_acquired());
    assert_eq!(device.flush().await?, None);
    Ok(())
}

#[tokio::test]
async fn test_factory_builds_requested_source() {
    let file = CaptureDeviceFactory::create(CaptureSource::File("clip.mp4".into()));
    assert_eq!(file.name(), "file");
    assert!(file.is_type_supported("video/mp4"));

    let synthetic = CaptureDeviceFactory::create(CaptureSource::Synthetic);
    assert_eq!(synthetic.name(), "synthetic");
}
