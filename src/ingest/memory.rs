use std::collections::VecDeque;

use anyhow::Result;

use super::FrameSource;
use crate::frame::Frame;

/// Source backed by frames already in memory.
pub struct MemorySource {
    frames: VecDeque<Frame>,
    captured: u64,
}

impl MemorySource {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames: frames.into(),
            captured: 0,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for MemorySource {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let frame = self.frames.pop_front();
        if frame.is_some() {
            self.captured += 1;
        }
        Ok(frame)
    }

    fn frames_captured(&self) -> u64 {
        self.captured
    }
}
