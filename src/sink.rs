//! Output sinks for processed frames.
//!
//! The processor never writes anything itself. Each `ProcessedFrame` is handed
//! to every configured sink in order; a sink error aborts the run.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use image::ImageFormat;
use serde::{Deserialize, Serialize};

use crate::processor::ProcessedFrame;
use crate::tally::{FrameTally, TrafficStatus};

/// Receives every processed frame.
pub trait FrameSink {
    fn name(&self) -> &str;

    fn present(&mut self, processed: &ProcessedFrame) -> Result<()>;

    /// Called once after the last frame.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<S: FrameSink + ?Sized> FrameSink for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn present(&mut self, processed: &ProcessedFrame) -> Result<()> {
        (**self).present(processed)
    }

    fn finish(&mut self) -> Result<()> {
        (**self).finish()
    }
}

// ----------------------------------------------------------------------------
// Numbered image files
// ----------------------------------------------------------------------------

/// Writes every annotated frame as `frame_000001.jpg` (or `.png`) into a directory.
pub struct ImageDirSink {
    dir: PathBuf,
    format: ImageFormat,
    written: u64,
}

impl ImageDirSink {
    pub fn new(dir: impl Into<PathBuf>, format: ImageFormat) -> Result<Self> {
        if !matches!(format, ImageFormat::Jpeg | ImageFormat::Png) {
            return Err(anyhow!("frame images must be JPEG or PNG, got {:?}", format));
        }
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("create output directory {}", dir.display()))?;
        Ok(Self {
            dir,
            format,
            written: 0,
        })
    }

    pub fn frame_path(&self, index: u64) -> PathBuf {
        let ext = self.format.extensions_str().first().copied().unwrap_or("img");
        self.dir.join(format!("frame_{:06}.{}", index, ext))
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

impl FrameSink for ImageDirSink {
    fn name(&self) -> &str {
        "image-dir"
    }

    fn present(&mut self, processed: &ProcessedFrame) -> Result<()> {
        let path = self.frame_path(processed.frame.index);
        processed
            .frame
            .image()
            .save_with_format(&path, self.format)
            .with_context(|| format!("write frame image {}", path.display()))?;
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        log::info!(
            "wrote {} annotated frames to {}",
            self.written,
            self.dir.display()
        );
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Single live preview file
// ----------------------------------------------------------------------------

/// Keeps one image file showing the most recent annotated frame.
///
/// Each frame is written next to the target and renamed over it, so a viewer
/// polling the file never sees a half-written image.
pub struct PreviewSink {
    path: PathBuf,
    staging: PathBuf,
    format: ImageFormat,
}

impl PreviewSink {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let format = ImageFormat::from_path(&path)
            .with_context(|| format!("preview path {} has no image extension", path.display()))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("create preview directory {}", parent.display()))?;
        }
        let mut staging = path.clone().into_os_string();
        staging.push(".partial");
        Ok(Self {
            path,
            staging: staging.into(),
            format,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FrameSink for PreviewSink {
    fn name(&self) -> &str {
        "preview"
    }

    fn present(&mut self, processed: &ProcessedFrame) -> Result<()> {
        processed
            .frame
            .image()
            .save_with_format(&self.staging, self.format)
            .with_context(|| format!("write preview {}", self.staging.display()))?;
        fs::rename(&self.staging, &self.path)
            .with_context(|| format!("replace preview {}", self.path.display()))?;
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// JSON Lines report
// ----------------------------------------------------------------------------

/// One line of the per-frame report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRecord {
    pub frame: u64,
    #[serde(flatten)]
    pub tally: FrameTally,
    pub total: u32,
    pub status: TrafficStatus,
    pub detections: usize,
}

impl From<&ProcessedFrame> for FrameRecord {
    fn from(processed: &ProcessedFrame) -> Self {
        Self {
            frame: processed.frame.index,
            tally: processed.tally,
            total: processed.total(),
            status: processed.status,
            detections: processed.detections,
        }
    }
}

/// Writes one JSON object per frame.
pub struct JsonlReportSink<W: Write> {
    writer: W,
    records: u64,
}

impl JsonlReportSink<BufWriter<File>> {
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("create report directory {}", parent.display()))?;
        }
        let file = File::create(path)
            .with_context(|| format!("create report {}", path.display()))?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> JsonlReportSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, records: 0 }
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> FrameSink for JsonlReportSink<W> {
    fn name(&self) -> &str {
        "jsonl-report"
    }

    fn present(&mut self, processed: &ProcessedFrame) -> Result<()> {
        let record = FrameRecord::from(processed);
        serde_json::to_writer(&mut self.writer, &record).context("serialize frame record")?;
        self.writer.write_all(b"\n").context("write frame record")?;
        self.records += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush().context("flush report")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;

    fn processed(index: u64, car: u32, status: TrafficStatus) -> ProcessedFrame {
        let tally = FrameTally {
            car,
            ..FrameTally::default()
        };
        ProcessedFrame {
            frame: Frame::filled(8, 6, [10, 20, 30], index),
            tally,
            status,
            detections: car as usize + 1,
        }
    }

    #[test]
    fn report_lines_carry_flattened_tally() -> Result<()> {
        let mut sink = JsonlReportSink::new(Vec::new());
        sink.present(&processed(1, 3, TrafficStatus::NoRush))?;
        sink.present(&processed(2, 12, TrafficStatus::Rush))?;
        sink.finish()?;
        assert_eq!(sink.records(), 2);

        let text = String::from_utf8(sink.into_inner())?;
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let value: serde_json::Value = serde_json::from_str(lines[0])?;
        assert_eq!(value["frame"], 1);
        assert_eq!(value["car"], 3);
        assert_eq!(value["truck"], 0);
        assert_eq!(value["total"], 3);
        assert_eq!(value["status"], "No Rush");
        assert_eq!(value["detections"], 4);

        let record: FrameRecord = serde_json::from_str(lines[1])?;
        assert_eq!(record.status, TrafficStatus::Rush);
        assert_eq!(record.tally.car, 12);
        Ok(())
    }

    #[test]
    fn image_dir_sink_numbers_frames() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut sink = ImageDirSink::new(dir.path().join("frames"), ImageFormat::Png)?;
        sink.present(&processed(7, 0, TrafficStatus::NoRush))?;

        let path = dir.path().join("frames").join("frame_000007.png");
        assert_eq!(sink.frame_path(7), path);
        let saved = image::open(&path)?.to_rgb8();
        assert_eq!(saved.dimensions(), (8, 6));
        assert_eq!(saved.get_pixel(0, 0).0, [10, 20, 30]);
        assert_eq!(sink.written(), 1);
        Ok(())
    }

    #[test]
    fn image_dir_sink_rejects_other_formats() -> Result<()> {
        let dir = tempfile::tempdir()?;
        assert!(ImageDirSink::new(dir.path(), ImageFormat::Gif).is_err());
        Ok(())
    }

    #[test]
    fn preview_is_replaced_each_frame() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("preview.png");
        let mut sink = PreviewSink::new(&path)?;

        sink.present(&processed(1, 0, TrafficStatus::NoRush))?;
        sink.present(&processed(2, 0, TrafficStatus::NoRush))?;

        assert!(path.exists());
        let entries = fs::read_dir(dir.path())?.count();
        assert_eq!(entries, 1);
        Ok(())
    }

    #[test]
    fn preview_needs_image_extension() {
        assert!(PreviewSink::new("preview").is_err());
    }
}
