//! traffic_flow - count vehicles per frame and classify traffic as rush / no rush.
//!
//! Input is one of:
//! - `--file <PATH>`: a local video file (`stub://<name>` for a synthetic clip)
//! - `--file -`: an uploaded video read from stdin
//! - `--camera [DEVICE]`: a live camera (defaults to the configured device)
//!
//! Annotated frames, a live preview image and a JSON Lines report are written
//! only when the matching flag is given.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use image::ImageFormat;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use traffic_flow::ui::Ui;
use traffic_flow::{
    build_backend, run, CameraSource, FileConfig, FileSource, FrameProcessor, FrameSink,
    FrameSource, ImageDirSink, JsonlReportSink, Overlay, PreviewSink, RunOptions, RunSummary,
    StopReason, TrafficConfig, UploadedVideo, NO_INPUT_MESSAGE,
};

#[derive(Parser, Debug)]
#[command(
    name = "traffic_flow",
    about = "Count vehicles per frame and classify traffic flow"
)]
struct Args {
    /// Video file to analyze; `-` reads an uploaded video from stdin
    #[arg(long, value_name = "PATH", conflicts_with = "camera")]
    file: Option<String>,

    /// Live camera device; without a value the configured device is used
    #[arg(long, value_name = "DEVICE", num_args = 0..=1, default_missing_value = "")]
    camera: Option<String>,

    /// Container type of an upload read from stdin (mp4|avi|mov)
    #[arg(long, default_value = "mp4", value_name = "EXT")]
    upload_ext: String,

    /// Vehicle total at or above which a frame is rush traffic
    #[arg(long)]
    threshold: Option<u32>,

    /// Comma-separated vehicle categories to count
    #[arg(long, value_name = "LIST")]
    classes: Option<String>,

    /// Detector backend (stub|tract)
    #[arg(long)]
    backend: Option<String>,

    /// ONNX model for the tract backend
    #[arg(long, value_name = "PATH")]
    model: Option<PathBuf>,

    /// TrueType font for the overlay text
    #[arg(long, value_name = "PATH", conflicts_with = "boxes_only")]
    font: Option<PathBuf>,

    /// Draw detection boxes without any overlay text
    #[arg(long)]
    boxes_only: bool,

    /// Write every annotated frame into this directory
    #[arg(long, value_name = "DIR")]
    out_dir: Option<PathBuf>,

    /// Image format for --out-dir (jpg|png)
    #[arg(long, default_value = "jpg", value_name = "FORMAT")]
    frame_format: String,

    /// Keep this image file updated with the latest annotated frame
    #[arg(long, value_name = "PATH")]
    preview: Option<PathBuf>,

    /// Write one JSON line per frame to this file
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,

    /// Stop after this many frames
    #[arg(long)]
    max_frames: Option<u64>,

    /// Process at most this many frames per second
    #[arg(long)]
    fps: Option<u32>,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    if args.file.is_none() && args.camera.is_none() {
        log::warn!("{}", NO_INPUT_MESSAGE);
        return Ok(());
    }

    let cfg = {
        let _stage = ui.stage("Load configuration");
        load_config(&args)?
    };

    // The spooled upload must outlive the run; its temp file goes away on drop.
    let mut upload: Option<UploadedVideo> = None;
    let mut source: Box<dyn FrameSource> = match (&args.file, &args.camera) {
        (Some(path), _) => {
            let file = if path == "-" {
                let _stage = ui.stage("Receive upload");
                let spooled = UploadedVideo::spool(std::io::stdin().lock(), &args.upload_ext)?;
                let file = spooled.file_source()?;
                upload = Some(spooled);
                file
            } else {
                FileSource::new(FileConfig::new(path.clone()))?
            };
            if file.is_empty() {
                log::warn!("{} is empty; nothing to analyze", file.describe());
                print_summary(&RunSummary::empty(StopReason::Exhausted))?;
                return Ok(());
            }
            Box::new(file)
        }
        (None, Some(device)) => {
            let device = Some(device.as_str()).filter(|d| !d.is_empty());
            Box::new(CameraSource::new(cfg.camera_config(device))?)
        }
        (None, None) => return Err(anyhow!("no input selected")),
    };

    let overlay = {
        let _stage = ui.stage("Load overlay font");
        Overlay::load(cfg.overlay_font(), cfg.overlay_style())?
    };
    let detector = {
        let _stage = ui.stage("Load detector");
        let mut detector = build_backend(&cfg.detector)?;
        detector.warm_up().context("detector warm-up failed")?;
        detector
    };
    let mut processor = FrameProcessor::new(detector, cfg.processor_config()?, overlay);

    let mut sinks = build_sinks(&args, &ui)?;

    let stop = Arc::new(AtomicBool::new(false));
    let stop_handler = stop.clone();
    ctrlc::set_handler(move || {
        stop_handler.store(true, Ordering::SeqCst);
    })
    .expect("error setting Ctrl-C handler");

    log::info!(
        "traffic_flow running: threshold={} classes={} backend={}",
        cfg.rush_threshold,
        cfg.relevant_classes.join(","),
        cfg.detector.backend
    );

    let options = RunOptions {
        max_frames: args.max_frames,
        fps: args.fps,
    };
    let summary = run(&mut source, &mut processor, &mut sinks, &stop, &options)?;
    drop(upload);

    print_summary(&summary)?;

    if let StopReason::SourceUnavailable(message) = summary.stop_reason {
        return Err(anyhow!(message));
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(summary)?);
    Ok(())
}

fn load_config(args: &Args) -> Result<TrafficConfig> {
    let mut cfg = TrafficConfig::load()?;
    if let Some(threshold) = args.threshold {
        cfg.rush_threshold = threshold;
    }
    if let Some(classes) = &args.classes {
        cfg.relevant_classes = classes.split(',').map(|c| c.trim().to_string()).collect();
    }
    if let Some(backend) = &args.backend {
        cfg.detector.backend = backend.clone();
    }
    if let Some(model) = &args.model {
        cfg.detector.model_path = model.clone();
    }
    if let Some(font) = &args.font {
        cfg.overlay.font_path = font.clone();
        cfg.overlay.boxes_only = false;
    }
    if args.boxes_only {
        cfg.overlay.boxes_only = true;
    }
    cfg.validate()?;
    Ok(cfg)
}

fn build_sinks(args: &Args, ui: &Ui) -> Result<Vec<Box<dyn FrameSink>>> {
    let mut sinks: Vec<Box<dyn FrameSink>> = vec![Box::new(ui.progress())];
    if let Some(dir) = &args.out_dir {
        let format = match args.frame_format.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => ImageFormat::Jpeg,
            "png" => ImageFormat::Png,
            other => return Err(anyhow!("unsupported frame format '{}' (jpg|png)", other)),
        };
        sinks.push(Box::new(ImageDirSink::new(dir, format)?));
    }
    if let Some(path) = &args.preview {
        sinks.push(Box::new(PreviewSink::new(path)?));
    }
    if let Some(path) = &args.report {
        sinks.push(Box::new(JsonlReportSink::create(path)?));
    }
    Ok(sinks)
}
