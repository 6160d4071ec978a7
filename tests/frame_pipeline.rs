use std::sync::atomic::AtomicBool;

use anyhow::Result;
use image::ImageFormat;

use traffic_flow::{
    run, BoundingBox, CameraConfig, CameraSource, Detection, FileConfig, FileSource, FrameProcessor,
    FrameRecord, FrameSink, FrameTally, ImageDirSink, JsonlReportSink, MemorySource, Overlay,
    OverlayStyle, ProcessorConfig, RunOptions, RunSummary, StopReason, StubBackend, TrafficStatus,
    UploadedVideo, CAMERA_UNAVAILABLE,
};
use traffic_flow::frame::Frame;

fn det(label: &str, i: i32) -> Detection {
    let x = (i % 6) * 10;
    let y = (i / 6) * 10;
    Detection::new(label, BoundingBox::new(x, y, x + 8, y + 8))
}

fn dets(labels: &[&str]) -> Vec<Detection> {
    labels
        .iter()
        .enumerate()
        .map(|(i, label)| det(label, i as i32))
        .collect()
}

fn processor(script: Vec<Vec<Detection>>) -> FrameProcessor<StubBackend> {
    FrameProcessor::new(
        StubBackend::scripted(script),
        ProcessorConfig::default(),
        Overlay::boxes_only(OverlayStyle::default()),
    )
}

fn blank(index: u64) -> Frame {
    Frame::filled(64, 48, [0, 0, 0], index)
}

#[test]
fn scenario_two_cars_and_a_truck() -> Result<()> {
    let mut processor = processor(vec![dets(&["car", "car", "truck"])]);
    let processed = processor.process(blank(1))?;

    assert_eq!(
        processed.tally,
        FrameTally {
            car: 2,
            truck: 1,
            ..FrameTally::default()
        }
    );
    assert_eq!(processed.total(), 3);
    assert_eq!(processed.status, TrafficStatus::NoRush);
    Ok(())
}

#[test]
fn scenario_ten_cars_is_rush() -> Result<()> {
    let mut processor = processor(vec![dets(&["car"; 10])]);
    let processed = processor.process(blank(1))?;
    assert_eq!(processed.tally.car, 10);
    assert_eq!(processed.total(), 10);
    assert_eq!(processed.status, TrafficStatus::Rush);
    Ok(())
}

#[test]
fn scenario_nine_cars_is_not_rush() -> Result<()> {
    let mut processor = processor(vec![dets(&["car"; 9])]);
    let processed = processor.process(blank(1))?;
    assert_eq!(processed.total(), 9);
    assert_eq!(processed.status, TrafficStatus::NoRush);
    Ok(())
}

#[test]
fn scenario_pedestrian_is_drawn_but_not_counted() -> Result<()> {
    let mut processor = processor(vec![dets(&["car", "pedestrian", "car"])]);
    let processed = processor.process(blank(1))?;
    assert_eq!(processed.total(), 2);
    assert_eq!(processed.detections, 3);
    // second box starts at (10, 0)
    assert_eq!(processed.frame.image().get_pixel(10, 0).0, [0, 255, 0]);
    Ok(())
}

#[test]
fn scenario_no_detections() -> Result<()> {
    let mut processor = processor(vec![Vec::new()]);
    let processed = processor.process(blank(1))?;
    assert_eq!(processed.tally, FrameTally::default());
    assert_eq!(processed.status, TrafficStatus::NoRush);
    assert!(processed.frame.image().pixels().all(|p| p.0 == [0, 0, 0]));
    Ok(())
}

#[test]
fn scenario_empty_source_never_calls_the_detector() -> Result<()> {
    let mut processor = processor(vec![dets(&["car"])]);
    let mut source = MemorySource::empty();
    let summary = run(
        &mut source,
        &mut processor,
        &mut [],
        &AtomicBool::new(false),
        &RunOptions::default(),
    )?;

    assert_eq!(summary.stop_reason, StopReason::Exhausted);
    assert_eq!(summary.frames_processed, 0);
    assert_eq!(processor.detector().calls(), 0);
    Ok(())
}

#[test]
fn frames_are_counted_independently() -> Result<()> {
    let script = vec![
        dets(&["car", "bus"]),
        dets(&["car"; 12]),
        dets(&["bicycle"]),
    ];
    let mut processor = processor(script);
    let mut source = MemorySource::new((1..=3).map(blank).collect());

    let dir = tempfile::tempdir()?;
    let report_path = dir.path().join("report.jsonl");
    let mut sinks: Vec<Box<dyn FrameSink>> = vec![
        Box::new(ImageDirSink::new(dir.path().join("frames"), ImageFormat::Png)?),
        Box::new(JsonlReportSink::create(&report_path)?),
    ];

    let summary = run(
        &mut source,
        &mut processor,
        &mut sinks,
        &AtomicBool::new(false),
        &RunOptions::default(),
    )?;
    assert_eq!(summary.frames_processed, 3);
    assert_eq!(summary.rush_frames, 1);
    assert_eq!(summary.peak_total, 12);

    let report = std::fs::read_to_string(&report_path)?;
    let records = report
        .lines()
        .map(serde_json::from_str::<FrameRecord>)
        .collect::<Result<Vec<_>, _>>()?;
    let totals: Vec<(u64, u32, TrafficStatus)> = records
        .iter()
        .map(|r| (r.frame, r.total, r.status))
        .collect();
    assert_eq!(
        totals,
        vec![
            (1, 2, TrafficStatus::NoRush),
            (2, 12, TrafficStatus::Rush),
            (3, 1, TrafficStatus::NoRush),
        ]
    );
    assert_eq!(records[2].tally.bicycle, 1);

    for index in 1..=3 {
        let path = dir.path().join("frames").join(format!("frame_{:06}.png", index));
        assert!(path.exists(), "missing {}", path.display());
    }
    Ok(())
}

#[test]
fn synthetic_clip_runs_end_to_end() -> Result<()> {
    let mut source = FileSource::new(FileConfig {
        path: "stub://clip".to_string(),
        synthetic_frames: 20,
        synthetic_width: 160,
        synthetic_height: 120,
    })?;
    let mut processor = FrameProcessor::new(
        StubBackend::synthetic_traffic(),
        ProcessorConfig::default(),
        Overlay::boxes_only(OverlayStyle::default()),
    );

    let summary = run(
        &mut source,
        &mut processor,
        &mut [],
        &AtomicBool::new(false),
        &RunOptions::default(),
    )?;
    assert_eq!(summary.stop_reason, StopReason::Exhausted);
    assert_eq!(summary.frames_processed, 20);
    // frame 15 carries the densest synthetic scene
    assert_eq!(summary.peak_total, 15);
    assert!(summary.rush_frames > 0);
    Ok(())
}

#[test]
fn unavailable_camera_stops_with_message() -> Result<()> {
    let mut source = CameraSource::new(CameraConfig::new("stub://offline"))?;
    let mut processor = processor(vec![dets(&["car"])]);

    let summary = run(
        &mut source,
        &mut processor,
        &mut [],
        &AtomicBool::new(false),
        &RunOptions::default(),
    )?;
    assert_eq!(
        summary.stop_reason,
        StopReason::SourceUnavailable(CAMERA_UNAVAILABLE.to_string())
    );
    assert_eq!(summary.frames_processed, 0);
    assert_eq!(processor.detector().calls(), 0);
    Ok(())
}

#[test]
fn live_camera_runs_until_frame_limit() -> Result<()> {
    let mut config = CameraConfig::new("stub://junction");
    config.width = 32;
    config.height = 24;
    let mut source = CameraSource::new(config)?;
    let mut processor = processor(vec![dets(&["truck"])]);

    let options = RunOptions {
        max_frames: Some(4),
        fps: None,
    };
    let summary = run(
        &mut source,
        &mut processor,
        &mut [],
        &AtomicBool::new(false),
        &options,
    )?;
    assert_eq!(summary.stop_reason, StopReason::FrameLimit);
    assert_eq!(summary.frames_processed, 4);
    assert_eq!(summary.peak_total, 1);
    Ok(())
}

#[test]
fn empty_upload_runs_to_exhaustion() -> Result<()> {
    let upload = UploadedVideo::spool(&b""[..], "mp4")?;
    let mut source = upload.file_source()?;
    assert!(source.is_empty());

    let mut processor = processor(vec![dets(&["car"])]);
    let summary = run(
        &mut source,
        &mut processor,
        &mut [],
        &AtomicBool::new(false),
        &RunOptions::default(),
    )?;
    assert_eq!(summary, RunSummary::empty(StopReason::Exhausted));
    assert_eq!(processor.detector().calls(), 0);
    Ok(())
}

#[test]
fn extreme_box_coordinates_are_drawn_without_overflow() -> Result<()> {
    let mut processor = processor(Vec::new());
    let detections = vec![
        Detection::new("car", BoundingBox::new(i32::MIN, 0, i32::MAX, 10)),
        Detection::new("bus", BoundingBox::new(i32::MAX - 1, i32::MAX - 1, i32::MAX, i32::MAX)),
        Detection::new("truck", BoundingBox::new(i32::MIN, i32::MIN, i32::MIN + 1, i32::MIN + 1)),
    ];
    let processed = processor.process_with_detections(blank(1), &detections);

    assert_eq!(processed.total(), 3);
    // the first box spans the whole width along its top edge
    assert_eq!(processed.frame.image().get_pixel(0, 0).0, [0, 255, 0]);
    assert_eq!(processed.frame.image().get_pixel(63, 0).0, [0, 255, 0]);
    Ok(())
}
