//! Live camera frame source.
//!
//! `CameraSource` captures frames from a local V4L2 device (e.g., /dev/video0)
//! and converts them to RGB24. A camera never ends on its own; the run stops on
//! Ctrl-C, a frame limit, or a capture failure.
//!
//! Opening or reading the device can fail at any time. Every such error carries
//! [`CAMERA_UNAVAILABLE`] as context so the caller can surface it as-is.
//!
//! `stub://<name>` devices produce synthetic road frames; `stub://offline`
//! behaves like a camera that cannot be opened.

use anyhow::{anyhow, Context, Result};
#[cfg(feature = "ingest-v4l2")]
use ouroboros::self_referencing;
#[cfg(feature = "ingest-v4l2")]
use std::time::{Duration, Instant};

#[cfg(feature = "ingest-v4l2")]
use super::normalize::{normalize_to_rgb, PixelFormat};
use super::synthetic::road_frame;
use super::FrameSource;
use crate::frame::Frame;

/// Message shown to the user when the camera cannot be opened or read.
pub const CAMERA_UNAVAILABLE: &str = "Unable to access the camera.";

/// Configuration for a camera source.
#[derive(Clone, Debug)]
pub struct CameraConfig {
    /// Device path (e.g., "/dev/video0") or `stub://<name>`.
    pub device: String,
    /// Requested capture rate. 0 leaves the device default.
    pub target_fps: u32,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            target_fps: 10,
            width: 640,
            height: 480,
        }
    }
}

impl CameraConfig {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            ..Self::default()
        }
    }
}

/// Camera frame source.
pub struct CameraSource {
    backend: CameraBackend,
}

enum CameraBackend {
    Synthetic(SyntheticCameraSource),
    #[cfg(feature = "ingest-v4l2")]
    Device(DeviceCameraSource),
    #[cfg(not(feature = "ingest-v4l2"))]
    Unsupported(CameraConfig),
}

impl CameraSource {
    pub fn new(config: CameraConfig) -> Result<Self> {
        if config.device.trim().is_empty() {
            return Err(anyhow!("camera device path is empty"));
        }
        let backend = if config.device.starts_with("stub://") {
            CameraBackend::Synthetic(SyntheticCameraSource::new(config))
        } else {
            #[cfg(feature = "ingest-v4l2")]
            {
                CameraBackend::Device(DeviceCameraSource::new(config))
            }
            #[cfg(not(feature = "ingest-v4l2"))]
            {
                CameraBackend::Unsupported(config)
            }
        };
        Ok(Self { backend })
    }

    fn device(&self) -> &str {
        match &self.backend {
            CameraBackend::Synthetic(source) => &source.config.device,
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => &source.config.device,
            #[cfg(not(feature = "ingest-v4l2"))]
            CameraBackend::Unsupported(config) => &config.device,
        }
    }
}

impl FrameSource for CameraSource {
    fn describe(&self) -> String {
        format!("camera {}", self.device())
    }

    fn connect(&mut self) -> Result<()> {
        let result = match &mut self.backend {
            CameraBackend::Synthetic(source) => source.connect(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.connect(),
            #[cfg(not(feature = "ingest-v4l2"))]
            CameraBackend::Unsupported(config) => Err(anyhow!(
                "camera capture of {} requires the ingest-v4l2 feature",
                config.device
            )),
        };
        result.context(CAMERA_UNAVAILABLE)
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let result = match &mut self.backend {
            CameraBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.next_frame(),
            #[cfg(not(feature = "ingest-v4l2"))]
            CameraBackend::Unsupported(_) => Err(anyhow!("camera not connected")),
        };
        result.map(Some).context(CAMERA_UNAVAILABLE)
    }

    fn frames_captured(&self) -> u64 {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.frame_count,
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.frame_count,
            #[cfg(not(feature = "ingest-v4l2"))]
            CameraBackend::Unsupported(_) => 0,
        }
    }

    fn is_healthy(&self) -> bool {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.connected,
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.is_healthy(),
            #[cfg(not(feature = "ingest-v4l2"))]
            CameraBackend::Unsupported(_) => false,
        }
    }

    fn unavailable_message(&self) -> Option<&'static str> {
        Some(CAMERA_UNAVAILABLE)
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for tests
// ----------------------------------------------------------------------------

struct SyntheticCameraSource {
    config: CameraConfig,
    frame_count: u64,
    connected: bool,
}

impl SyntheticCameraSource {
    fn new(config: CameraConfig) -> Self {
        Self {
            config,
            frame_count: 0,
            connected: false,
        }
    }

    fn connect(&mut self) -> Result<()> {
        if self.config.device == "stub://offline" {
            return Err(anyhow!("device {} is offline", self.config.device));
        }
        self.connected = true;
        log::info!(
            "CameraSource: connected to {} (synthetic)",
            self.config.device
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        if !self.connected {
            return Err(anyhow!("camera {} not connected", self.config.device));
        }
        self.frame_count += 1;
        Ok(road_frame(
            self.config.width,
            self.config.height,
            self.frame_count,
        ))
    }
}

// ----------------------------------------------------------------------------
// Production V4L2 source using libv4l
// ----------------------------------------------------------------------------

#[cfg(feature = "ingest-v4l2")]
struct DeviceCameraSource {
    config: CameraConfig,
    state: Option<DeviceCameraState>,
    frame_count: u64,
    last_frame_at: Option<Instant>,
    last_error: Option<String>,
    active_width: u32,
    active_height: u32,
    active_format: PixelFormat,
}

#[cfg(feature = "ingest-v4l2")]
#[self_referencing]
struct DeviceCameraState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

#[cfg(feature = "ingest-v4l2")]
impl DeviceCameraSource {
    fn new(config: CameraConfig) -> Self {
        Self {
            active_width: config.width,
            active_height: config.height,
            active_format: PixelFormat::Rgb24,
            config,
            state: None,
            frame_count: 0,
            last_frame_at: None,
            last_error: None,
        }
    }

    fn connect(&mut self) -> Result<()> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&self.config.device)
            .with_context(|| format!("open v4l2 device {}", self.config.device))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = self.config.width;
        format.height = self.config.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        // Drivers are free to answer with another format; fall back to what the
        // device reports and convert from there.
        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "CameraSource: failed to set format on {}: {}",
                    self.config.device,
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };
        let pixel_format = PixelFormat::from_fourcc(&format.fourcc.repr).ok_or_else(|| {
            anyhow!(
                "unsupported pixel format {} on {}",
                format.fourcc,
                self.config.device
            )
        })?;

        if self.config.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(self.config.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!(
                    "CameraSource: failed to set fps on {}: {}",
                    self.config.device,
                    err
                );
            }
        }

        self.active_width = format.width;
        self.active_height = format.height;
        self.active_format = pixel_format;
        self.last_error = None;

        let state = DeviceCameraStateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()
        .map_err(|err| {
            self.last_error = Some(err.to_string());
            err
        })?;
        self.state = Some(state);

        log::info!(
            "CameraSource: connected to {} ({}x{}, {:?})",
            self.config.device,
            self.active_width,
            self.active_height,
            self.active_format
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        use v4l::io::traits::CaptureStream;

        let width = self.active_width;
        let height = self.active_height;
        let format = self.active_format;
        let state = self.state.as_mut().context("v4l2 device not connected")?;
        let pixels = state
            .with_mut(|fields| {
                fields.stream.next().map_err(anyhow::Error::new).and_then(|(buf, meta)| {
                    let used = (meta.bytesused as usize).min(buf.len());
                    let used = if used == 0 { buf.len() } else { used };
                    normalize_to_rgb(&buf[..used], width, height, format)
                })
            })
            .map_err(|err| {
                self.last_error = Some(err.to_string());
                err.context("capture v4l2 frame")
            })?;

        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());
        Frame::from_rgb(pixels, width, height, self.frame_count)
    }

    fn is_healthy(&self) -> bool {
        if self.last_error.is_some() || self.state.is_none() {
            return false;
        }
        let Some(last_frame_at) = self.last_frame_at else {
            return true;
        };
        last_frame_at.elapsed() <= self.health_grace()
    }

    fn health_grace(&self) -> Duration {
        let base_ms = if self.config.target_fps == 0 {
            2_000
        } else {
            (1000 / self.config.target_fps).saturating_mul(6)
        };
        Duration::from_millis(base_ms.max(2_000) as u64)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_config(device: &str) -> CameraConfig {
        CameraConfig {
            device: device.to_string(),
            target_fps: 10,
            width: 32,
            height: 24,
        }
    }

    #[test]
    fn stub_camera_produces_numbered_frames() -> Result<()> {
        let mut source = CameraSource::new(stub_config("stub://dashcam"))?;
        source.connect()?;

        for expected in 1..=5u64 {
            let frame = source.next_frame()?.expect("camera never exhausts");
            assert_eq!(frame.index, expected);
            assert_eq!((frame.width(), frame.height()), (32, 24));
        }
        assert_eq!(source.frames_captured(), 5);
        assert!(source.is_healthy());
        Ok(())
    }

    #[test]
    fn offline_camera_reports_unavailable() -> Result<()> {
        let mut source = CameraSource::new(stub_config("stub://offline"))?;
        let err = source.connect().unwrap_err();
        assert_eq!(err.to_string(), CAMERA_UNAVAILABLE);
        assert!(format!("{:#}", err).contains("offline"));
        assert_eq!(source.unavailable_message(), Some(CAMERA_UNAVAILABLE));
        assert!(!source.is_healthy());
        Ok(())
    }

    #[test]
    fn reading_before_connect_fails() -> Result<()> {
        let mut source = CameraSource::new(stub_config("stub://dashcam"))?;
        let err = source.next_frame().unwrap_err();
        assert_eq!(err.to_string(), CAMERA_UNAVAILABLE);
        Ok(())
    }

    #[test]
    fn empty_device_is_rejected() {
        assert!(CameraSource::new(stub_config("")).is_err());
    }
}
