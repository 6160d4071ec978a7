use anyhow::Result;

use crate::frame::Frame;

use super::result::Detection;

/// Detector backend trait.
///
/// # Threading
///
/// Backends are single-threaded and carry no `Send`/`Sync` bound. A backend is
/// constructed once, owned by exactly one `FrameProcessor`, and driven from the
/// thread that owns it.
pub trait DetectorBackend {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    ///
    /// Output order is unspecified. Labels must come from the backend's fixed
    /// vocabulary; callers match them verbatim.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<B: DetectorBackend + ?Sized> DetectorBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        (**self).detect(frame)
    }

    fn warm_up(&mut self) -> Result<()> {
        (**self).warm_up()
    }
}
