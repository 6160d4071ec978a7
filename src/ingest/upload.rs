//! Uploaded video spooling.
//!
//! An uploaded video arrives as a byte stream (stdin, an HTTP body, ...). It is
//! copied into a named temporary file so the file decoder can open it by path.
//! The temporary file is removed when the `UploadedVideo` is dropped.

use std::io::{self, Read};
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tempfile::NamedTempFile;

use super::file::{FileConfig, FileSource};

/// Container extensions accepted for uploads.
pub const ALLOWED_EXTENSIONS: [&str; 3] = ["mp4", "avi", "mov"];

/// A spooled upload backed by a temporary file.
#[derive(Debug)]
pub struct UploadedVideo {
    file: NamedTempFile,
    bytes: u64,
}

impl UploadedVideo {
    /// Copy `reader` to a temporary file with the given extension.
    pub fn spool<R: Read>(mut reader: R, extension: &str) -> Result<Self> {
        let extension = normalize_extension(extension)?;
        let mut file = tempfile::Builder::new()
            .prefix("traffic-upload-")
            .suffix(&format!(".{}", extension))
            .tempfile()
            .context("create upload temp file")?;
        let bytes = io::copy(&mut reader, file.as_file_mut()).context("spool uploaded video")?;
        log::info!(
            "spooled {} byte upload to {}",
            bytes,
            file.path().display()
        );
        Ok(Self { file, bytes })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Path as a string, for `FileConfig`.
    pub fn path_string(&self) -> Result<String> {
        self.path()
            .to_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("upload temp path is not valid UTF-8"))
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.bytes == 0
    }

    /// File source reading the spooled video. An empty upload gives a source
    /// with no frames.
    pub fn file_source(&self) -> Result<FileSource> {
        FileSource::new(FileConfig::new(self.path_string()?))
    }
}

fn normalize_extension(extension: &str) -> Result<String> {
    let ext = extension.trim().trim_start_matches('.').to_ascii_lowercase();
    if ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        Ok(ext)
    } else {
        Err(anyhow!(
            "unsupported upload type '{}' (expected one of {})",
            extension,
            ALLOWED_EXTENSIONS.join(", ")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::FrameSource;

    #[test]
    fn spools_reader_into_temp_file() -> Result<()> {
        let payload = b"\x00\x00\x00\x18ftypmp42fake video bytes".to_vec();
        let upload = UploadedVideo::spool(payload.as_slice(), "MP4")?;

        assert_eq!(upload.bytes(), payload.len() as u64);
        assert_eq!(upload.path().extension().and_then(|e| e.to_str()), Some("mp4"));
        assert_eq!(std::fs::read(upload.path())?, payload);
        Ok(())
    }

    #[test]
    fn temp_file_is_removed_on_drop() -> Result<()> {
        let upload = UploadedVideo::spool(&b"data"[..], ".mov")?;
        let path = upload.path().to_path_buf();
        assert!(path.exists());
        drop(upload);
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn rejects_unknown_extensions() {
        assert!(UploadedVideo::spool(&b"data"[..], "mkv").is_err());
        assert!(UploadedVideo::spool(&b"data"[..], "").is_err());
    }

    #[test]
    fn empty_upload_gives_a_source_without_frames() -> Result<()> {
        let upload = UploadedVideo::spool(&b""[..], "avi")?;
        assert!(upload.is_empty());

        let mut source = upload.file_source()?;
        source.connect()?;
        assert!(source.next_frame()?.is_none());
        Ok(())
    }
}
