//! Synthetic road-scene pixels for `stub://` sources.

use crate::frame::Frame;

/// Asphalt-grey gradient with a lane marking that drifts with the frame index.
pub(crate) fn road_frame(width: u32, height: u32, index: u64) -> Frame {
    let mut pixels = vec![0u8; (width as usize) * (height as usize) * 3];
    let lane_x = ((index * 4) % width.max(1) as u64) as u32;
    for (i, px) in pixels.chunks_exact_mut(3).enumerate() {
        let x = i as u32 % width;
        let y = i as u32 / width;
        let shade = 70 + ((y * 60) / height.max(1)) as u8;
        if x.abs_diff(lane_x) < 3 && (y / 20) % 2 == 0 {
            px.copy_from_slice(&[230, 230, 230]);
        } else {
            px.copy_from_slice(&[shade, shade, shade.saturating_add(5)]);
        }
    }
    let rgb = image::RgbImage::from_raw(width, height, pixels)
        .unwrap_or_else(|| image::RgbImage::new(width, height));
    Frame::from_image(rgb, index)
}
