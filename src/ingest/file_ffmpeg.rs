//! Local file frame source using FFmpeg.
//!
//! Decodes the best video stream of a local file to RGB24, one frame per call.
//! At end of file the decoder is flushed, then the source reports exhaustion.

use anyhow::{Context, Result};
use ffmpeg_next as ffmpeg;
use std::time::Instant;

use super::file::FileConfig;
use crate::frame::Frame;

struct OpenedInput {
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
}

pub(crate) struct FfmpegFileSource {
    config: FileConfig,
    opened: Option<OpenedInput>,
    frame_count: u64,
    eof_sent: bool,
    last_frame_at: Option<Instant>,
    last_error: Option<String>,
}

impl FfmpegFileSource {
    pub(crate) fn new(config: FileConfig) -> Self {
        Self {
            config,
            opened: None,
            frame_count: 0,
            eof_sent: false,
            last_frame_at: None,
            last_error: None,
        }
    }

    pub(crate) fn path(&self) -> &str {
        &self.config.path
    }

    pub(crate) fn connect(&mut self) -> Result<()> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(&self.config.path)
            .with_context(|| format!("failed to open file input '{}' with ffmpeg", self.config.path))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow::anyhow!("file '{}' has no video track", self.config.path))?;
        let stream_index = input_stream.index();
        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        log::info!(
            "FileSource: connected to {} (ffmpeg, {}x{})",
            self.config.path,
            decoder.width(),
            decoder.height()
        );

        self.opened = Some(OpenedInput {
            input,
            stream_index,
            decoder,
            scaler,
        });
        self.eof_sent = false;
        self.last_error = None;
        Ok(())
    }

    pub(crate) fn next_frame(&mut self) -> Result<Option<Frame>> {
        let opened = self.opened.as_mut().context("file source not connected")?;
        let mut decoded = ffmpeg::frame::Video::empty();

        loop {
            if opened.decoder.receive_frame(&mut decoded).is_ok() {
                let mut rgb_frame = ffmpeg::frame::Video::empty();
                opened
                    .scaler
                    .run(&decoded, &mut rgb_frame)
                    .context("scale frame to RGB")?;
                let (pixels, width, height) = frame_to_pixels(&rgb_frame)?;

                self.frame_count += 1;
                self.last_frame_at = Some(Instant::now());
                return Frame::from_rgb(pixels, width, height, self.frame_count).map(Some);
            }

            if self.eof_sent {
                return Ok(None);
            }

            let stream_index = opened.stream_index;
            let packet = opened
                .input
                .packets()
                .find_map(|(stream, packet)| (stream.index() == stream_index).then_some(packet));

            match packet {
                Some(packet) => {
                    if let Err(err) = opened.decoder.send_packet(&packet) {
                        self.last_error = Some(err.to_string());
                        return Err(anyhow::Error::new(err).context("send packet to ffmpeg decoder"));
                    }
                }
                None => {
                    opened
                        .decoder
                        .send_eof()
                        .context("flush ffmpeg decoder")?;
                    self.eof_sent = true;
                    log::debug!(
                        "FileSource: end of {} after {} frames",
                        self.config.path,
                        self.frame_count
                    );
                }
            }
        }
    }

    pub(crate) fn is_healthy(&self) -> bool {
        self.last_error.is_none() && self.opened.is_some()
    }

    pub(crate) fn frames_captured(&self) -> u64 {
        self.frame_count
    }
}

fn frame_to_pixels(frame: &ffmpeg::frame::Video) -> Result<(Vec<u8>, u32, u32)> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        let len = row_bytes * height as usize;
        let pixels = data
            .get(..len)
            .context("ffmpeg frame is shorter than its dimensions")?;
        return Ok((pixels.to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }

    Ok((pixels, width, height))
}
