//! Traffic flow analysis
//!
//! Counts vehicles in every frame of a video file or live camera feed and
//! classifies each frame as rush or no-rush traffic.
//!
//! # Architecture
//!
//! Each frame goes through the same steps, one frame at a time:
//!
//! 1. **Detect**: the owned detector returns labelled boxes.
//! 2. **Tally**: labels that are relevant vehicle categories are counted.
//! 3. **Classify**: `Rush` iff the frame total reaches the threshold.
//! 4. **Annotate**: every detection and the four summary lines are drawn in place.
//! 5. **Emit**: sinks receive the annotated frame with its tally and status.
//!
//! Frames are independent: nothing carries over from one frame to the next.
//!
//! # Module Structure
//!
//! - `frame`: RGB frame buffer
//! - `detect`: detector trait, stub and ONNX backends, YOLO decoding
//! - `tally`: vehicle categories, per-frame tally, traffic status
//! - `overlay`: box and summary drawing
//! - `processor`: detect/tally/classify/annotate for one frame
//! - `ingest`: frame sources (local files, cameras, uploads)
//! - `sink`: image, preview and report outputs
//! - `pipeline`: the driving loop
//! - `config`, `ui`: configuration loading and terminal feedback

pub mod config;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod overlay;
pub mod pipeline;
pub mod processor;
pub mod sink;
pub mod tally;
pub mod ui;

pub use config::TrafficConfig;
pub use detect::{build_backend, BoundingBox, Detection, DetectorBackend, StubBackend};
#[cfg(feature = "backend-tract")]
pub use detect::TractBackend;
pub use frame::Frame;
pub use ingest::{
    CameraConfig, CameraSource, FileConfig, FileSource, FrameSource, MemorySource, UploadedVideo,
    CAMERA_UNAVAILABLE,
};
pub use overlay::{Overlay, OverlayStyle};
pub use pipeline::{run, RunOptions, RunSummary, StopReason};
pub use processor::{FrameProcessor, ProcessedFrame, ProcessorConfig};
pub use sink::{FrameRecord, FrameSink, ImageDirSink, JsonlReportSink, PreviewSink};
pub use tally::{
    tally_detections, FrameTally, RelevantCategories, RushThreshold, TrafficStatus,
    VehicleCategory, DEFAULT_RUSH_THRESHOLD,
};

/// Shown when no video was provided.
pub const NO_INPUT_MESSAGE: &str = "Please upload a video file to start traffic analysis.";
