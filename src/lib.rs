pub mod capture;
pub mod config;
pub mod error;
pub mod http;
pub mod media;
pub mod playback;
pub mod recorder;
pub mod relay;
pub mod transport;

pub use capture::{CaptureDevice, CaptureDeviceFactory, CaptureSource, PreviewHandle};
pub use config::Config;
pub use error::{
    AppendError, CaptureError, NegotiationError, StreamError, StreamResult, TransportError,
};
pub use http::{create_router, AppState};
pub use media::{LiveChunk, MediaChunk};
pub use playback::{
    FileSink, MediaSink, MemorySink, PlaybackConfig, PlaybackEngine, PlaybackStats, SinkEvent,
    Viewer,
};
pub use recorder::{CaptureEngine, CaptureStatus, RecorderConfig, RecorderStats, RecordingState};
pub use relay::{ArchiveStore, Relay, StreamRegistry};
pub use transport::{MemoryTransport, NatsTransport, StreamEvent, Transport};
