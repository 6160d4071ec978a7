//! Driving loop: source -> processor -> sinks.
//!
//! One frame is read, processed and presented to every sink before the next is
//! read. The stop flag is checked between frames only.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::detect::DetectorBackend;
use crate::ingest::FrameSource;
use crate::processor::FrameProcessor;
use crate::sink::FrameSink;

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// Why a run ended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The source had no more frames.
    Exhausted,
    /// The stop flag was raised (Ctrl-C).
    StopSignal,
    /// `max_frames` frames were processed.
    FrameLimit,
    /// The source failed; carries the user-facing message.
    SourceUnavailable(String),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Exhausted => f.write_str("source exhausted"),
            StopReason::StopSignal => f.write_str("stop requested"),
            StopReason::FrameLimit => f.write_str("frame limit reached"),
            StopReason::SourceUnavailable(message) => f.write_str(message),
        }
    }
}

/// Loop options.
#[derive(Clone, Debug, Default)]
pub struct RunOptions {
    /// Stop after this many processed frames.
    pub max_frames: Option<u64>,
    /// Pace the loop to at most this many frames per second.
    pub fps: Option<u32>,
}

/// Totals for one run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub frames_processed: u64,
    pub rush_frames: u64,
    pub peak_total: u32,
    pub stop_reason: StopReason,
}

impl RunSummary {
    /// Summary of a run that processed no frames.
    pub fn empty(stop_reason: StopReason) -> Self {
        Self {
            frames_processed: 0,
            rush_frames: 0,
            peak_total: 0,
            stop_reason,
        }
    }
}

/// Run until the source is exhausted, the stop flag is set, the frame limit is
/// hit, or a source with an `unavailable_message` fails.
///
/// Detector and sink errors abort the run. Sinks are finished on every
/// non-error exit.
pub fn run<S, D>(
    source: &mut S,
    processor: &mut FrameProcessor<D>,
    sinks: &mut [Box<dyn FrameSink>],
    stop: &AtomicBool,
    options: &RunOptions,
) -> Result<RunSummary>
where
    S: FrameSource + ?Sized,
    D: DetectorBackend,
{
    let mut frames_processed = 0u64;
    let mut rush_frames = 0u64;
    let mut peak_total = 0u32;
    let frame_interval = options
        .fps
        .filter(|fps| *fps > 0)
        .map(|fps| Duration::from_secs_f64(1.0 / fps as f64));

    let stop_reason = match source.connect() {
        Err(err) => source_failure(source, err)?,
        Ok(()) => {
            log::info!("processing frames from {}", source.describe());
            let mut last_health_log = Instant::now();

            loop {
                if stop.load(Ordering::SeqCst) {
                    break StopReason::StopSignal;
                }
                if options
                    .max_frames
                    .is_some_and(|limit| frames_processed >= limit)
                {
                    break StopReason::FrameLimit;
                }

                let started = Instant::now();
                let frame = match source.next_frame() {
                    Ok(Some(frame)) => frame,
                    Ok(None) => break StopReason::Exhausted,
                    Err(err) => break source_failure(source, err)?,
                };

                let processed = processor.process(frame)?;
                for sink in sinks.iter_mut() {
                    sink.present(&processed)
                        .with_context(|| format!("sink '{}' failed", sink.name()))?;
                }

                frames_processed += 1;
                if processed.status.is_rush() {
                    rush_frames += 1;
                }
                peak_total = peak_total.max(processed.total());

                if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
                    log::info!(
                        "source health={} frames={} processed={} rush={} source={}",
                        source.is_healthy(),
                        source.frames_captured(),
                        frames_processed,
                        rush_frames,
                        source.describe()
                    );
                    last_health_log = Instant::now();
                }

                if let Some(interval) = frame_interval {
                    if let Some(remaining) = interval.checked_sub(started.elapsed()) {
                        std::thread::sleep(remaining);
                    }
                }
            }
        }
    };

    for sink in sinks.iter_mut() {
        sink.finish()
            .with_context(|| format!("sink '{}' failed to finish", sink.name()))?;
    }

    let summary = RunSummary {
        frames_processed,
        rush_frames,
        peak_total,
        stop_reason,
    };
    log::info!(
        "run finished: {} frames, {} rush, peak total {} ({})",
        summary.frames_processed,
        summary.rush_frames,
        summary.peak_total,
        summary.stop_reason
    );
    Ok(summary)
}

/// Sources with a user-facing failure message stop the run; others abort it.
fn source_failure<S: FrameSource + ?Sized>(source: &S, err: anyhow::Error) -> Result<StopReason> {
    match source.unavailable_message() {
        Some(message) => {
            log::error!("{}: {:#}", source.describe(), err);
            Ok(StopReason::SourceUnavailable(message.to_string()))
        }
        None => Err(err.context(format!("source {} failed", source.describe()))),
    }
}
