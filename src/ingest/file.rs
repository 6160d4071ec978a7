//! Local file frame source.
//!
//! `FileSource` reads frames from a local video file in order. When the file
//! ends, `next_frame` returns `Ok(None)` and the run stops quietly.
//!
//! `stub://<name>` paths produce a synthetic clip of `synthetic_frames` frames
//! without touching the filesystem. Real files are decoded with FFmpeg and need
//! the `ingest-file-ffmpeg` feature. An empty file, or one FFmpeg cannot open,
//! is a source with no frames: the run ends without processing anything.

use anyhow::{anyhow, Result};

use super::synthetic::road_frame;
use super::FrameSource;
#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use crate::frame::Frame;

/// Configuration for a local file source.
#[derive(Clone, Debug)]
pub struct FileConfig {
    /// Local file path (e.g., "clips/junction.mp4") or `stub://<name>`.
    pub path: String,
    /// Length of a `stub://` clip.
    pub synthetic_frames: u64,
    /// Frame size of a `stub://` clip.
    pub synthetic_width: u32,
    pub synthetic_height: u32,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            synthetic_frames: 50,
            synthetic_width: 640,
            synthetic_height: 480,
        }
    }
}

impl FileConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}

/// Local file frame source.
pub struct FileSource {
    backend: FileBackend,
}

enum FileBackend {
    Synthetic(SyntheticFileSource),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
    /// Empty or undecodable file: yields no frames.
    Unreadable { path: String, reason: String },
}

impl FileSource {
    pub fn new(config: FileConfig) -> Result<Self> {
        if !is_local_file_path(&config.path) {
            return Err(anyhow!(
                "file ingestion only supports local paths (no URL schemes): '{}'",
                config.path
            ));
        }
        if config.path.starts_with("stub://") {
            return Ok(Self {
                backend: FileBackend::Synthetic(SyntheticFileSource::new(config)),
            });
        }
        if is_empty_file(&config.path) {
            return Ok(Self {
                backend: FileBackend::Unreadable {
                    path: config.path,
                    reason: "file is empty".to_string(),
                },
            });
        }
        #[cfg(feature = "ingest-file-ffmpeg")]
        {
            Ok(Self {
                backend: FileBackend::Ffmpeg(FfmpegFileSource::new(config)),
            })
        }
        #[cfg(not(feature = "ingest-file-ffmpeg"))]
        {
            Err(anyhow!(
                "file ingestion requires the ingest-file-ffmpeg feature"
            ))
        }
    }

    /// True when the file is already known to hold no frames.
    pub fn is_empty(&self) -> bool {
        matches!(self.backend, FileBackend::Unreadable { .. })
    }
}

impl FrameSource for FileSource {
    fn describe(&self) -> String {
        match &self.backend {
            FileBackend::Synthetic(source) => source.config.path.clone(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.path().to_string(),
            FileBackend::Unreadable { path, .. } => path.clone(),
        }
    }

    /// A file that cannot be opened is not an error: it has no frames.
    fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.connect(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => {
                if let Err(err) = source.connect() {
                    let path = source.path().to_string();
                    self.backend = FileBackend::Unreadable {
                        path,
                        reason: format!("{:#}", err),
                    };
                    return self.connect();
                }
                Ok(())
            }
            FileBackend::Unreadable { path, reason } => {
                log::warn!("FileSource: nothing to analyze in {} ({})", path, reason);
                Ok(())
            }
        }
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.next_frame(),
            FileBackend::Unreadable { .. } => Ok(None),
        }
    }

    fn frames_captured(&self) -> u64 {
        match &self.backend {
            FileBackend::Synthetic(source) => source.frame_count,
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.frames_captured(),
            FileBackend::Unreadable { .. } => 0,
        }
    }

    fn is_healthy(&self) -> bool {
        match &self.backend {
            FileBackend::Synthetic(_) => true,
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.is_healthy(),
            FileBackend::Unreadable { .. } => false,
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for tests
// ----------------------------------------------------------------------------

struct SyntheticFileSource {
    config: FileConfig,
    frame_count: u64,
}

impl SyntheticFileSource {
    fn new(config: FileConfig) -> Self {
        Self {
            config,
            frame_count: 0,
        }
    }

    fn connect(&mut self) -> Result<()> {
        log::info!(
            "FileSource: connected to {} (synthetic, {} frames)",
            self.config.path,
            self.config.synthetic_frames
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.frame_count >= self.config.synthetic_frames {
            return Ok(None);
        }
        self.frame_count += 1;
        Ok(Some(road_frame(
            self.config.synthetic_width,
            self.config.synthetic_height,
            self.frame_count,
        )))
    }
}

fn is_empty_file(path: &str) -> bool {
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.len() == 0)
        .unwrap_or(false)
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with("stub://") {
        return true;
    }
    !path.contains("://")
}
