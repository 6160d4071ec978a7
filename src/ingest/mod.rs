//! Frame sources.
//!
//! - Local video files (`FileSource`; real files need feature `ingest-file-ffmpeg`)
//! - Live cameras (`CameraSource`; real devices need feature `ingest-v4l2`)
//! - In-memory frames (`MemorySource`, tests and tooling)
//! - `stub://` synthetic file and camera sources, always available
//!
//! Every source is a lazy, ordered, non-restartable sequence: `next_frame`
//! returns `Ok(None)` once it is exhausted. A live camera never is; it either
//! yields frames or fails.
//!
//! Sources MUST NOT write frames anywhere; output is the sinks' job.

pub mod camera;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;
pub mod file;
mod memory;
#[cfg(feature = "ingest-v4l2")]
mod normalize;
mod synthetic;
pub mod upload;

use anyhow::Result;

use crate::frame::Frame;

pub use camera::{CameraConfig, CameraSource, CAMERA_UNAVAILABLE};
pub use file::{FileConfig, FileSource};
pub use memory::MemorySource;
pub use upload::UploadedVideo;

/// Ordered, lazy sequence of frames.
pub trait FrameSource {
    /// Human-readable source identifier for logs.
    fn describe(&self) -> String;

    /// Open the underlying file or device.
    fn connect(&mut self) -> Result<()>;

    /// Next frame, or `None` once the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    fn frames_captured(&self) -> u64;

    fn is_healthy(&self) -> bool {
        true
    }

    /// User-facing message for when this source fails. Sources that return
    /// `Some` are stopped on failure instead of aborting the run.
    fn unavailable_message(&self) -> Option<&'static str> {
        None
    }
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn connect(&mut self) -> Result<()> {
        (**self).connect()
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        (**self).next_frame()
    }

    fn frames_captured(&self) -> u64 {
        (**self).frames_captured()
    }

    fn is_healthy(&self) -> bool {
        (**self).is_healthy()
    }

    fn unavailable_message(&self) -> Option<&'static str> {
        (**self).unavailable_message()
    }
}
