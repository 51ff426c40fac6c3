//! Camera frame sampling, encoding and obstacle-detection dispatch.

mod encoder;
mod frame;
mod pipeline;
mod throttle;

pub use encoder::encode_jpeg;
pub use frame::VideoFrame;
pub use pipeline::{VideoPipeline, VideoPipelineConfig, VideoPipelineStats};
pub use throttle::FrameThrottle;
