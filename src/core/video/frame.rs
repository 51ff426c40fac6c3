//! Raw camera frames.

use bytes::Bytes;

/// One planar I420 (YUV 4:2:0) camera frame.
///
/// Planes are shared byte buffers so a frame can move into an analysis task
/// without copying pixel data.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub y: Bytes,
    pub u: Bytes,
    pub v: Bytes,
    pub stride_y: u32,
    pub stride_u: u32,
    pub stride_v: u32,
    /// Capture timestamp in microseconds
    pub timestamp_us: i64,
}

impl VideoFrame {
    /// Width and height of the chroma planes.
    pub fn chroma_dimensions(&self) -> (u32, u32) {
        (self.width.div_ceil(2), self.height.div_ceil(2))
    }

    /// Whether the plane buffers are large enough for the declared geometry.
    pub fn is_well_formed(&self) -> bool {
        if self.width == 0 || self.height == 0 {
            return false;
        }
        let (cw, ch) = self.chroma_dimensions();
        plane_fits(&self.y, self.stride_y, self.width, self.height)
            && plane_fits(&self.u, self.stride_u, cw, ch)
            && plane_fits(&self.v, self.stride_v, cw, ch)
    }

    /// Solid-color frame, mostly useful for tests.
    pub fn solid(width: u32, height: u32, y: u8, u: u8, v: u8) -> Self {
        let (cw, ch) = (width.div_ceil(2), height.div_ceil(2));
        Self {
            width,
            height,
            y: Bytes::from(vec![y; (width * height) as usize]),
            u: Bytes::from(vec![u; (cw * ch) as usize]),
            v: Bytes::from(vec![v; (cw * ch) as usize]),
            stride_y: width,
            stride_u: cw,
            stride_v: cw,
            timestamp_us: 0,
        }
    }
}

// Every row is a full stride, the last one included
fn plane_fits(plane: &[u8], stride: u32, width: u32, height: u32) -> bool {
    stride >= width && plane.len() >= (stride as usize) * (height as usize)
}
