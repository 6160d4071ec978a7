use anyhow::Result;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, Detection};
use crate::frame::Frame;

/// Labels cycled by the synthetic traffic script. "person" is not a vehicle and
/// shows up so runs exercise the drawn-but-not-counted path.
const SYNTHETIC_LABELS: [&str; 6] = ["car", "car", "truck", "bus", "motorcycle", "bicycle"];

/// Period of the synthetic vehicle ramp (0..=15 vehicles).
const SYNTHETIC_PERIOD: u64 = 16;

/// Stub backend for tests and demos. Never touches pixels.
pub struct StubBackend {
    script: StubScript,
    calls: u64,
}

enum StubScript {
    /// Replays fixed detection lists, one per call, cycling.
    Fixed(Vec<Vec<Detection>>),
    /// Deterministic ramp of vehicles keyed on the frame index.
    SyntheticTraffic,
}

impl StubBackend {
    pub fn scripted(script: Vec<Vec<Detection>>) -> Self {
        Self {
            script: StubScript::Fixed(script),
            calls: 0,
        }
    }

    /// Returns the same detections for every frame.
    pub fn fixed(detections: Vec<Detection>) -> Self {
        Self::scripted(vec![detections])
    }

    pub fn empty() -> Self {
        Self::scripted(Vec::new())
    }

    pub fn synthetic_traffic() -> Self {
        Self {
            script: StubScript::SyntheticTraffic,
            calls: 0,
        }
    }

    /// Number of `detect` calls served so far.
    pub fn calls(&self) -> u64 {
        self.calls
    }

    fn synthetic(frame: &Frame) -> Vec<Detection> {
        let vehicles = (frame.index % SYNTHETIC_PERIOD) as usize;
        let cols = 4u32;
        let cell_w = (frame.width() / cols).max(1);
        let cell_h = (frame.height() / 5).max(1);

        let mut out = Vec::with_capacity(vehicles + 1);
        for i in 0..vehicles {
            let col = i as u32 % cols;
            let row = i as u32 / cols + 1;
            let left = (col * cell_w + cell_w / 8) as i32;
            let top = (row * cell_h + cell_h / 8) as i32;
            let bbox = BoundingBox::new(
                left,
                top,
                left + (cell_w * 3 / 4) as i32,
                top + (cell_h * 3 / 4) as i32,
            );
            out.push(
                Detection::new(SYNTHETIC_LABELS[i % SYNTHETIC_LABELS.len()], bbox)
                    .with_confidence(0.9),
            );
        }
        let pedestrian = BoundingBox::new(
            frame.width() as i32 - (cell_w / 4) as i32 - 4,
            cell_h as i32,
            frame.width() as i32 - 4,
            (cell_h * 2) as i32,
        );
        out.push(Detection::new("person", pedestrian).with_confidence(0.8));
        out
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::empty()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let call = self.calls;
        self.calls += 1;

        Ok(match &self.script {
            StubScript::Fixed(script) if script.is_empty() => Vec::new(),
            StubScript::Fixed(script) => script[(call % script.len() as u64) as usize].clone(),
            StubScript::SyntheticTraffic => Self::synthetic(frame),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn car(x: i32) -> Detection {
        Detection::new("car", BoundingBox::new(x, 0, x + 10, 10))
    }

    #[test]
    fn scripted_backend_cycles() -> Result<()> {
        let mut backend = StubBackend::scripted(vec![vec![car(0)], vec![car(0), car(20)]]);
        let frame = Frame::filled(32, 32, [0, 0, 0], 1);

        assert_eq!(backend.detect(&frame)?.len(), 1);
        assert_eq!(backend.detect(&frame)?.len(), 2);
        assert_eq!(backend.detect(&frame)?.len(), 1);
        assert_eq!(backend.calls(), 3);
        Ok(())
    }

    #[test]
    fn empty_backend_reports_nothing() -> Result<()> {
        let mut backend = StubBackend::empty();
        let frame = Frame::filled(8, 8, [0, 0, 0], 1);
        assert!(backend.detect(&frame)?.is_empty());
        Ok(())
    }

    #[test]
    fn synthetic_traffic_ramps_with_frame_index() -> Result<()> {
        let mut backend = StubBackend::synthetic_traffic();

        let quiet = backend.detect(&Frame::filled(640, 480, [0, 0, 0], 16))?;
        assert_eq!(quiet.len(), 1);
        assert_eq!(quiet[0].label, "person");

        let busy = backend.detect(&Frame::filled(640, 480, [0, 0, 0], 12))?;
        assert_eq!(busy.iter().filter(|d| d.label != "person").count(), 12);
        assert!(busy
            .iter()
            .all(|d| d.bbox.right <= 640 && d.bbox.bottom <= 480));
        Ok(())
    }
}
