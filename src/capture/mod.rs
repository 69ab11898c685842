pub mod device;
pub mod file;
pub mod synthetic;

pub use device::{CaptureDevice, CaptureDeviceFactory, CaptureSource, PreviewHandle};
pub use file::FileCaptureDevice;
pub use synthetic::SyntheticCaptureDevice;
