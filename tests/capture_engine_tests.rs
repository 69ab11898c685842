// Integration tests for the capture/segmentation engine
//
// A scripted capture device stands in for real hardware so the tests can
// control exactly which segments the encoder produces.

use async_trait::async_trait;
use bytes::Bytes;
use chunkcast::capture::{CaptureDevice, PreviewHandle};
use chunkcast::error::{CaptureError, StreamError, TransportError};
use chunkcast::recorder::{CaptureEngine, CaptureStatus, RecorderConfig, RecordingState};
use chunkcast::transport::{
    subject, MemoryTransport, RecordingSavedMessage, StreamEvent, Subscription, Transport,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const STREAM: &str = "cam-1";

/// Capture device whose encoder emits a fixed script of segments
struct ScriptedDevice {
    acquire_error: Option<CaptureError>,
    supported: Vec<&'static str>,
    segments: Vec<&'static [u8]>,
    tail: Option<&'static [u8]>,
    /// Keep the encoder channel open after the script runs out
    hold_open: bool,
    sender: Option<mpsc::Sender<Bytes>>,
    acquired: bool,
    releases: Arc<AtomicUsize>,
}

impl ScriptedDevice {
    fn new(segments: Vec<&'static [u8]>) -> Self {
        Self {
            acquire_error: None,
            supported: vec!["video/webm; codecs=vp8,opus"],
            segments,
            tail: None,
            hold_open: false,
            sender: None,
            acquired: false,
            releases: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl CaptureDevice for ScriptedDevice {
    async fn acquire(&mut self) -> Result<PreviewHandle, CaptureError> {
        if let Some(e) = self.acquire_error.take() {
            return Err(e);
        }
        self.acquired = true;
        Ok(PreviewHandle::new("scripted"))
    }

    fn is_type_supported(&self, mime: &str) -> bool {
        self.supported.contains(&mime)
    }

    async fn start_encoder(
        &mut self,
        _mime: &str,
        _timeslice: Duration,
    ) -> Result<mpsc::Receiver<Bytes>, CaptureError> {
        let (tx, rx) = mpsc::channel(self.segments.len() + 1);
        for segment in &self.segments {
            tx.try_send(Bytes::from_static(segment)).unwrap();
        }
        if self.hold_open {
            self.sender = Some(tx);
        }
        Ok(rx)
    }

    async fn flush(&mut self) -> Result<Option<Bytes>, CaptureError> {
        Ok(self.tail.take().map(Bytes::from_static))
    }

    async fn release(&mut self) {
        self.acquired = false;
        self.sender = None;
        self.releases.fetch_add(1, Ordering::SeqCst);
    }

    fn is_acquired(&self) -> bool {
        self.acquired
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

async fn setup(
    device: ScriptedDevice,
    config: RecorderConfig,
) -> (CaptureEngine, MemoryTransport, Subscription) {
    let transport = MemoryTransport::new();
    transport.open().await.unwrap();
    let ingest = transport.subscribe(&subject::ingest(STREAM)).await.unwrap();

    let engine = CaptureEngine::new(config, STREAM, Box::new(device), Arc::new(transport.clone()));
    (engine, transport, ingest)
}

fn drain(subscription: &mut Subscription) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    while let Some(envelope) = subscription.try_next() {
        events.push(envelope.event);
    }
    events
}

fn chunks(events: &[StreamEvent]) -> Vec<(u64, bool, Bytes)> {
    events
        .iter()
        .filter_map(|event| match event {
            StreamEvent::VideoChunk(message) => {
                let chunk = message.to_chunk().unwrap();
                Some((chunk.sequence, chunk.is_header, chunk.data))
            }
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_first_segment_is_header() {
    let (mut engine, _transport, mut ingest) =
        setup(ScriptedDevice::new(vec![]), RecorderConfig::default()).await;

    engine.acquire_source().await.unwrap();
    let status = engine.start().await.unwrap();
    assert_eq!(
        status,
        CaptureStatus::Started {
            mime: "video/webm; codecs=vp8,opus".to_string()
        }
    );
    assert_eq!(engine.state(), RecordingState::Recording);

    engine.on_segment(Bytes::from_static(b"init")).await.unwrap();
    engine.on_segment(Bytes::from_static(b"one")).await.unwrap();
    engine.on_segment(Bytes::from_static(b"two")).await.unwrap();

    let events = drain(&mut ingest);
    assert_eq!(events[0].name(), "recording-start");

    let published = chunks(&events);
    assert_eq!(
        published,
        vec![
            (0, true, Bytes::from_static(b"init")),
            (1, false, Bytes::from_static(b"one")),
            (2, false, Bytes::from_static(b"two")),
        ]
    );
    assert!(engine.session().unwrap().header_sent);
}

#[tokio::test]
async fn test_start_while_recording_does_not_restart() {
    let (mut engine, _transport, mut ingest) =
        setup(ScriptedDevice::new(vec![]), RecorderConfig::default()).await;

    engine.acquire_source().await.unwrap();
    engine.start().await.unwrap();
    engine.on_segment(Bytes::from_static(b"init")).await.unwrap();

    let status = engine.start().await.unwrap();
    assert_eq!(status, CaptureStatus::AlreadyRecording);

    // The header flag was not reset by the second start
    engine.on_segment(Bytes::from_static(b"more")).await.unwrap();

    let events = drain(&mut ingest);
    let starts = events
        .iter()
        .filter(|e| e.name() == "recording-start")
        .count();
    assert_eq!(starts, 1);

    let headers: Vec<bool> = chunks(&events).into_iter().map(|(_, h, _)| h).collect();
    assert_eq!(headers, vec![true, false]);
}

#[tokio::test]
async fn test_start_requires_ready() {
    let (mut engine, _transport, _ingest) =
        setup(ScriptedDevice::new(vec![]), RecorderConfig::default()).await;

    let err = engine.start().await.unwrap_err();
    assert!(matches!(err, StreamError::Capture(CaptureError::NotReady(_))));
    assert_eq!(engine.state(), RecordingState::Idle);
}

#[tokio::test]
async fn test_negotiation_falls_back_to_bare_container() {
    let mut device = ScriptedDevice::new(vec![]);
    device.supported = vec!["video/webm"];
    let (mut engine, _transport, _ingest) = setup(device, RecorderConfig::default()).await;

    engine.acquire_source().await.unwrap();
    let status = engine.start().await.unwrap();

    assert_eq!(
        status,
        CaptureStatus::Started {
            mime: "video/webm".to_string()
        }
    );
}

#[tokio::test]
async fn test_negotiation_failure_is_reported() {
    let mut device = ScriptedDevice::new(vec![]);
    device.supported = vec!["video/mp4"];
    let (mut engine, _transport, _ingest) = setup(device, RecorderConfig::default()).await;

    engine.acquire_source().await.unwrap();
    let err = engine.start().await.unwrap_err();

    assert!(matches!(err, StreamError::Negotiation(_)));
    assert_ne!(engine.state(), RecordingState::Recording);
}

#[tokio::test]
async fn test_zero_ceiling_is_rejected() {
    let config = RecorderConfig {
        max_duration_secs: 0,
        ..RecorderConfig::default()
    };
    let (mut engine, _transport, mut ingest) =
        setup(ScriptedDevice::new(vec![b"head"]), config).await;

    engine.acquire_source().await.unwrap();
    let err = engine.start().await.unwrap_err();

    assert!(matches!(err, StreamError::Capture(CaptureError::Config(_))));
    assert_eq!(engine.state(), RecordingState::Ready);
    assert!(drain(&mut ingest).is_empty());
}

#[tokio::test]
async fn test_stream_id_that_is_not_one_subject_token_is_rejected() {
    for id in ["team.cam", "cam*", "cam>", "my cam", ""] {
        let transport = MemoryTransport::new();
        transport.open().await.unwrap();
        let mut all = transport.subscribe(">").await.unwrap();

        let mut engine = CaptureEngine::new(
            RecorderConfig::default(),
            id,
            Box::new(ScriptedDevice::new(vec![b"head"])),
            Arc::new(transport.clone()),
        );
        engine.acquire_source().await.unwrap();

        let err = engine.start().await.unwrap_err();
        assert_eq!(
            err,
            StreamError::Transport(TransportError::InvalidStreamId(id.to_string()))
        );
        assert_eq!(engine.state(), RecordingState::Ready);
        assert!(drain(&mut all).is_empty(), "{:?} published events", id);
    }
}

#[tokio::test]
async fn test_ceiling_forces_stop_at_exact_tick() {
    let (mut engine, _transport, mut ingest) =
        setup(ScriptedDevice::new(vec![]), RecorderConfig::default()).await;

    engine.acquire_source().await.unwrap();
    engine.start().await.unwrap();

    for tick in 1..120 {
        assert_eq!(engine.on_tick().await, None, "stopped early at tick {}", tick);
        assert_eq!(engine.state(), RecordingState::Recording);
    }

    let status = engine.on_tick().await;
    assert_eq!(status, Some(CaptureStatus::CeilingReached { elapsed_secs: 120 }));
    assert_eq!(engine.state(), RecordingState::Idle);

    // Nothing is emitted once the session has been forced to stop
    drain(&mut ingest);
    engine.on_segment(Bytes::from_static(b"late")).await.unwrap();
    assert_eq!(engine.on_tick().await, None);
    assert!(drain(&mut ingest).is_empty());

    assert_eq!(engine.stats().elapsed_secs, 120);
}

#[tokio::test]
async fn test_stop_flushes_pending_segments_then_signals_end() {
    let mut device = ScriptedDevice::new(vec![b"init", b"one"]);
    device.tail = Some(b"tail");
    let releases = device.releases.clone();
    let (mut engine, _transport, mut ingest) = setup(device, RecorderConfig::default()).await;

    engine.acquire_source().await.unwrap();
    engine.start().await.unwrap();

    assert_eq!(engine.stop().await, CaptureStatus::Stopped);
    assert_eq!(engine.state(), RecordingState::Idle);
    assert_eq!(releases.load(Ordering::SeqCst), 1);

    let events = drain(&mut ingest);
    let names: Vec<&str> = events.iter().map(|e| e.name()).collect();
    assert_eq!(
        names,
        vec![
            "recording-start",
            "video-chunk",
            "video-chunk",
            "video-chunk",
            "recording-stopped"
        ]
    );

    let data: Vec<Bytes> = chunks(&events).into_iter().map(|(_, _, d)| d).collect();
    assert_eq!(data, vec!["init", "one", "tail"]);
}

#[tokio::test]
async fn test_stop_when_idle_is_noop() {
    let (mut engine, _transport, mut ingest) =
        setup(ScriptedDevice::new(vec![]), RecorderConfig::default()).await;

    assert_eq!(engine.stop().await, CaptureStatus::NotRecording);
    assert_eq!(engine.state(), RecordingState::Idle);

    engine.acquire_source().await.unwrap();
    engine.start().await.unwrap();
    engine.stop().await;
    drain(&mut ingest);

    assert_eq!(engine.stop().await, CaptureStatus::NotRecording);
    assert_eq!(engine.state(), RecordingState::Idle);
    assert!(drain(&mut ingest).is_empty());
}

#[tokio::test]
async fn test_acquisition_failure_then_retry() {
    let mut device = ScriptedDevice::new(vec![]);
    device.acquire_error = Some(CaptureError::PermissionDenied("camera blocked".to_string()));
    let (mut engine, _transport, _ingest) = setup(device, RecorderConfig::default()).await;

    let err = engine.acquire_source().await.unwrap_err();
    assert_eq!(err, CaptureError::PermissionDenied("camera blocked".to_string()));
    assert_eq!(engine.state(), RecordingState::Failed);
    assert_eq!(engine.failure(), Some(&err));

    engine.acquire_source().await.unwrap();
    assert_eq!(engine.state(), RecordingState::Ready);
    assert!(engine.preview().is_some());
    assert!(engine.failure().is_none());
}

#[tokio::test]
async fn test_teardown_releases_device_on_every_path() {
    let device = ScriptedDevice::new(vec![]);
    let releases = device.releases.clone();
    let (mut engine, _transport, mut ingest) = setup(device, RecorderConfig::default()).await;

    // Acquired but never started
    engine.acquire_source().await.unwrap();
    engine.teardown().await;
    assert_eq!(engine.state(), RecordingState::Idle);
    assert!(engine.preview().is_none());
    assert!(releases.load(Ordering::SeqCst) >= 1);

    // Torn down mid-recording
    engine.acquire_source().await.unwrap();
    engine.start().await.unwrap();
    engine.teardown().await;
    assert_eq!(engine.state(), RecordingState::Idle);

    let names: Vec<&str> = drain(&mut ingest).iter().map(|e| e.name()).collect();
    assert_eq!(names.last(), Some(&"recording-stopped"));

    // Repeated teardown is harmless
    engine.teardown().await;
    assert_eq!(engine.state(), RecordingState::Idle);
}

#[tokio::test]
async fn test_run_stops_when_source_ends() {
    let device = ScriptedDevice::new(vec![b"init", b"one", b"two"]);
    let (mut engine, _transport, mut ingest) = setup(device, RecorderConfig::default()).await;

    engine.acquire_source().await.unwrap();
    engine.start().await.unwrap();

    let status = engine.run(std::future::pending()).await;
    assert_eq!(status, CaptureStatus::Stopped);
    assert_eq!(engine.state(), RecordingState::Idle);

    let events = drain(&mut ingest);
    assert_eq!(chunks(&events).len(), 3);
    assert_eq!(events.last().map(|e| e.name()), Some("recording-stopped"));

    let stats = engine.stats();
    assert_eq!(stats.segments_emitted, 3);
    assert_eq!(stats.bytes_emitted, 10);
}

#[tokio::test(start_paused = true)]
async fn test_run_enforces_short_ceiling() {
    let config = RecorderConfig {
        max_duration_secs: 3,
        ..RecorderConfig::default()
    };
    let mut device = ScriptedDevice::new(vec![]);
    device.hold_open = true;
    let (mut engine, _transport, _ingest) = setup(device, config).await;

    // The encoder never closes, so only the ceiling can end the session
    engine.acquire_source().await.unwrap();
    engine.start().await.unwrap();

    let status = engine.run(std::future::pending()).await;
    assert_eq!(status, CaptureStatus::CeilingReached { elapsed_secs: 3 });
}

#[tokio::test]
async fn test_archival_outcome_reaches_producer() {
    let (mut engine, transport, _ingest) =
        setup(ScriptedDevice::new(vec![]), RecorderConfig::default()).await;

    engine.acquire_source().await.unwrap();
    engine.start().await.unwrap();
    engine.stop().await;

    transport
        .publish(
            &subject::outcome(STREAM),
            &StreamEvent::RecordingSaved(RecordingSavedMessage {
                stream_id: STREAM.to_string(),
                filename: "recording_cam-1_1.webm".to_string(),
                size: 42,
            }),
        )
        .await
        .unwrap();

    let outcome = engine.await_outcome(Duration::from_secs(1)).await;
    assert_eq!(
        outcome,
        Some(CaptureStatus::Archived {
            filename: "recording_cam-1_1.webm".to_string(),
            size: 42
        })
    );
}
