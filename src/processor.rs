//! Per-frame processing: detect, tally, classify, annotate.

use anyhow::{Context, Result};

use crate::detect::{Detection, DetectorBackend};
use crate::frame::Frame;
use crate::overlay::Overlay;
use crate::tally::{tally_detections, FrameTally, RelevantCategories, RushThreshold, TrafficStatus};

/// Counting configuration, fixed for the life of a processor.
#[derive(Clone, Debug, Default)]
pub struct ProcessorConfig {
    pub threshold: RushThreshold,
    pub relevant: RelevantCategories,
}

/// Result of processing one frame. `frame` is the same buffer that was passed
/// in, now annotated.
#[derive(Debug)]
pub struct ProcessedFrame {
    pub frame: Frame,
    pub tally: FrameTally,
    pub status: TrafficStatus,
    /// Number of detections drawn, relevant or not.
    pub detections: usize,
}

impl ProcessedFrame {
    pub fn total(&self) -> u32 {
        self.tally.total()
    }
}

/// Frame processor holding an owned detector.
///
/// Single-threaded: the processor (and so the detector) is driven from one
/// thread, one frame at a time. `process` has no cancellation hook and runs to
/// completion once called.
pub struct FrameProcessor<D> {
    detector: D,
    config: ProcessorConfig,
    overlay: Overlay,
}

impl<D: DetectorBackend> FrameProcessor<D> {
    pub fn new(detector: D, config: ProcessorConfig, overlay: Overlay) -> Self {
        Self {
            detector,
            config,
            overlay,
        }
    }

    /// Detect, tally, classify and annotate one frame.
    ///
    /// Consumes the frame and returns ownership of the same (mutated) buffer.
    /// Detector failures propagate unchanged apart from added context; the
    /// frame is dropped in that case.
    pub fn process(&mut self, frame: Frame) -> Result<ProcessedFrame> {
        let detections = self.detector.detect(&frame).with_context(|| {
            format!(
                "detector '{}' failed on frame {}",
                self.detector.name(),
                frame.index
            )
        })?;
        Ok(self.process_with_detections(frame, &detections))
    }

    /// Same pipeline with an injected detection list; the detector is not called.
    pub fn process_with_detections(&self, mut frame: Frame, detections: &[Detection]) -> ProcessedFrame {
        let (tally, status) = self.evaluate(detections);
        self.overlay
            .draw(frame.image_mut(), detections, &tally, status);

        log::debug!(
            "frame {}: {} detections, total {} -> {}",
            frame.index,
            detections.len(),
            tally.total(),
            status
        );

        ProcessedFrame {
            frame,
            tally,
            status,
            detections: detections.len(),
        }
    }

    /// Tally and status for a detection list, without drawing.
    pub fn evaluate(&self, detections: &[Detection]) -> (FrameTally, TrafficStatus) {
        let tally = tally_detections(detections, &self.config.relevant);
        let status = self.config.threshold.classify(&tally);
        (tally, status)
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    pub fn detector_mut(&mut self) -> &mut D {
        &mut self.detector
    }

    pub fn into_detector(self) -> D {
        self.detector
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, StubBackend};
    use crate::overlay::OverlayStyle;
    use anyhow::anyhow;

    struct FailingBackend;

    impl DetectorBackend for FailingBackend {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
            Err(anyhow!("model exploded"))
        }
    }

    fn processor<D: DetectorBackend>(detector: D) -> FrameProcessor<D> {
        FrameProcessor::new(
            detector,
            ProcessorConfig::default(),
            Overlay::boxes_only(OverlayStyle::default()),
        )
    }

    #[test]
    fn detector_errors_propagate_with_context() {
        let mut processor = processor(FailingBackend);
        let err = processor
            .process(Frame::filled(16, 16, [0, 0, 0], 3))
            .unwrap_err();
        let chain = format!("{:#}", err);
        assert!(chain.contains("detector 'failing' failed on frame 3"));
        assert!(chain.contains("model exploded"));
    }

    #[test]
    fn irrelevant_detections_are_drawn_but_not_counted() -> Result<()> {
        let person = Detection::new("person", BoundingBox::new(2, 2, 12, 12));
        let mut processor = processor(StubBackend::fixed(vec![person]));
        let processed = processor.process(Frame::filled(16, 16, [0, 0, 0], 1))?;

        assert_eq!(processed.total(), 0);
        assert_eq!(processed.detections, 1);
        assert_eq!(processed.status, TrafficStatus::NoRush);
        assert_eq!(processed.frame.image().get_pixel(2, 2).0, [0, 255, 0]);
        Ok(())
    }

    #[test]
    fn injected_detections_bypass_the_detector() {
        let processor = processor(StubBackend::empty());
        let dets = vec![Detection::new("bus", BoundingBox::new(0, 0, 4, 4))];
        let processed = processor.process_with_detections(Frame::filled(8, 8, [0, 0, 0], 1), &dets);
        assert_eq!(processed.tally.bus, 1);
        assert_eq!(processor.detector().calls(), 0);
    }
}
