//! Terminal feedback: stage spinners and a live frame counter.
//!
//! Pretty output needs a TTY; otherwise stages print plain `==>` lines and the
//! frame counter stays silent (the run summary is logged instead).

use anyhow::Result;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

use crate::processor::ProcessedFrame;
use crate::sink::FrameSink;

#[derive(Clone, Copy, Debug)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
    disable_pretty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool, disable_pretty: bool) -> Self {
        Self {
            mode,
            is_tty,
            disable_pretty,
        }
    }

    pub fn from_args(ui_flag: Option<&str>, is_tty: bool, disable_pretty: bool) -> Self {
        let mode = match ui_flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        };
        Self::new(mode, is_tty, disable_pretty)
    }

    fn use_pretty(&self) -> bool {
        self.is_tty
            && match self.mode {
                UiMode::Pretty => true,
                UiMode::Auto => !self.disable_pretty,
                UiMode::Plain => false,
            }
    }

    pub fn stage(&self, name: &str) -> StageGuard {
        if self.use_pretty() {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner.set_message(format!("{name}…"));
            StageGuard::new(name.to_string(), Some(spinner))
        } else {
            eprintln!("==> {}", name);
            StageGuard::new(name.to_string(), None)
        }
    }

    /// Frame counter sink for the processing loop.
    pub fn progress(&self) -> ProgressSink {
        let spinner = self.use_pretty().then(|| {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} [{elapsed}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner.set_message("waiting for frames…");
            spinner
        });
        ProgressSink {
            spinner,
            frames: 0,
            rush_frames: 0,
        }
    }
}

/// Shows the latest frame's tally and status on a spinner line.
pub struct ProgressSink {
    spinner: Option<ProgressBar>,
    frames: u64,
    rush_frames: u64,
}

impl ProgressSink {
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl FrameSink for ProgressSink {
    fn name(&self) -> &str {
        "progress"
    }

    fn present(&mut self, processed: &ProcessedFrame) -> Result<()> {
        self.frames += 1;
        if processed.status.is_rush() {
            self.rush_frames += 1;
        }
        if let Some(spinner) = &self.spinner {
            let tally = &processed.tally;
            spinner.set_message(format!(
                "frame {} | cars {} trucks {} buses {} motorcycles {} bicycles {} | {}",
                processed.frame.index,
                tally.car,
                tally.truck,
                tally.bus,
                tally.motorcycle,
                tally.bicycle,
                processed.status
            ));
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_with_message(format!(
                "✔ {} frames ({} rush)",
                self.frames, self.rush_frames
            ));
        }
        Ok(())
    }
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
}

impl StageGuard {
    fn new(name: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
        }
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let message = format!("✔ {} ({})", self.name, format_duration(elapsed));
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
