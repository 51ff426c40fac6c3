//! I420 to JPEG conversion.
//!
//! Colour conversion goes through libyuv as shipped with the WebRTC stack;
//! this module only repacks the pixels and runs the JPEG encoder.

use ::livekit::webrtc::native::yuv_helper;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder};

use super::frame::VideoFrame;
use crate::core::vision::{VisionError, VisionResult};

/// Encode a frame as JPEG at the given quality (1-100).
pub fn encode_jpeg(frame: &VideoFrame, quality: u8) -> VisionResult<Vec<u8>> {
    if !frame.is_well_formed() {
        return Err(VisionError::Encode(format!(
            "malformed {}x{} frame",
            frame.width, frame.height
        )));
    }

    let rgb = i420_to_rgb(frame)?;
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100))
        .write_image(&rgb, frame.width, frame.height, ExtendedColorType::Rgb8)
        .map_err(|e| VisionError::Encode(e.to_string()))?;
    Ok(jpeg)
}

/// Packed RGB8 pixels of a well-formed frame.
fn i420_to_rgb(frame: &VideoFrame) -> VisionResult<Vec<u8>> {
    let too_large = || VisionError::Encode(format!("{}x{} frame", frame.width, frame.height));
    let width = i32::try_from(frame.width).map_err(|_| too_large())?;
    let height = i32::try_from(frame.height).map_err(|_| too_large())?;
    let stride = frame.width.checked_mul(4).ok_or_else(too_large)?;

    // libyuv "ABGR" is R, G, B, A in memory
    let mut rgba = vec![0u8; stride as usize * frame.height as usize];
    yuv_helper::i420_to_abgr(
        &frame.y,
        frame.stride_y,
        &frame.u,
        frame.stride_u,
        &frame.v,
        frame.stride_v,
        &mut rgba,
        stride,
        width,
        height,
    );

    Ok(rgba
        .chunks_exact(4)
        .flat_map(|px| [px[0], px[1], px[2]])
        .collect())
}
