//! demo - end-to-end synthetic traffic run
//!
//! Plays a synthetic clip through the stub detector (traffic density ramps up
//! and down with the frame index) and writes annotated frames, a JSON Lines
//! report and a run summary into the output directory.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use image::ImageFormat;
use std::fs;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use traffic_flow::ui::Ui;
use traffic_flow::{
    run, FileConfig, FileSource, FrameProcessor, FrameSink, ImageDirSink, JsonlReportSink,
    Overlay, OverlayStyle, ProcessorConfig, RunOptions, RushThreshold, StubBackend,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Number of synthetic frames.
    #[arg(long, default_value_t = 48)]
    frames: u64,
    /// Synthetic frame width.
    #[arg(long, default_value_t = 640)]
    width: u32,
    /// Synthetic frame height.
    #[arg(long, default_value_t = 480)]
    height: u32,
    /// Rush threshold.
    #[arg(long, default_value_t = 10)]
    threshold: u32,
    /// Font for the overlay text.
    #[arg(long, default_value = "assets/fonts/DejaVuSans.ttf")]
    font: PathBuf,
    /// Draw boxes without overlay text.
    #[arg(long)]
    boxes_only: bool,
    /// Output directory.
    #[arg(long, default_value = "demo_out")]
    out: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if args.frames == 0 {
        return Err(anyhow!("frames must be >= 1"));
    }
    let ui = Ui::from_args(
        None,
        std::io::stderr().is_terminal(),
        !std::io::stdout().is_terminal(),
    );

    let out_dir = PathBuf::from(&args.out);
    fs::create_dir_all(&out_dir)
        .with_context(|| format!("create output directory {}", out_dir.display()))?;

    let mut source = FileSource::new(FileConfig {
        path: "stub://demo".to_string(),
        synthetic_frames: args.frames,
        synthetic_width: args.width,
        synthetic_height: args.height,
    })?;

    let overlay = {
        let _stage = ui.stage("Load overlay font");
        let font = Some(args.font.as_path()).filter(|_| !args.boxes_only);
        Overlay::load(font, OverlayStyle::default())?
    };
    let config = ProcessorConfig {
        threshold: RushThreshold::new(args.threshold)?,
        ..ProcessorConfig::default()
    };
    let mut processor = FrameProcessor::new(StubBackend::synthetic_traffic(), config, overlay);

    let frames_dir = out_dir.join("frames");
    let report_path = out_dir.join("report.jsonl");
    let mut sinks: Vec<Box<dyn FrameSink>> = vec![
        Box::new(ui.progress()),
        Box::new(ImageDirSink::new(&frames_dir, ImageFormat::Jpeg)?),
        Box::new(JsonlReportSink::create(&report_path)?),
    ];

    let summary = {
        let _stage = ui.stage("Process synthetic clip");
        run(
            &mut source,
            &mut processor,
            &mut sinks,
            &AtomicBool::new(false),
            &RunOptions::default(),
        )?
    };

    let summary_path = out_dir.join("summary.json");
    fs::write(&summary_path, serde_json::to_vec_pretty(&summary)?)
        .with_context(|| format!("write {}", summary_path.display()))?;

    println!("demo: {} frames processed", summary.frames_processed);
    println!(
        "demo: {} rush frames, peak total {}",
        summary.rush_frames, summary.peak_total
    );
    println!("demo: frames  -> {}", frames_dir.display());
    println!("demo: report  -> {}", report_path.display());
    println!("demo: summary -> {}", summary_path.display());
    Ok(())
}
