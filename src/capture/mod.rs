pub mod frame;
pub mod vdma;

pub use frame::{FrameBufferHandle, RawFrame, Role, VideoGeometry};
pub use vdma::FrameBufferController;
