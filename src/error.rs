//! Error types shared by the capture pipeline

use thiserror::Error;

use crate::hardware::Register;

/// Failures talking to the video DMA engine, its frame memory or the board.
///
/// Every variant is fatal to a run: there is no software retry path for
/// register access or frame mapping.
#[derive(Debug, Error)]
pub enum HardwareError {
    #[error("register {register:?} access failed: {reason}")]
    RegisterAccess { register: Register, reason: String },

    #[error("no frame store mapped at {address:#010x}")]
    UnmappedFrame { address: u32 },

    #[error("frame store at {address:#010x} holds {available} samples, {required} required")]
    FrameTooSmall {
        address: u32,
        available: usize,
        required: usize,
    },

    #[error("inbound and outbound frame buffers alias {address:#010x}")]
    AliasedFrames { address: u32 },

    #[error("frame memory requested while circular park is active")]
    ParkActive,

    #[error("circular park is already suspended")]
    ParkSuspended,

    #[error("video pipeline configuration failed: {0}")]
    Configuration(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Problems with the loaded configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),

    #[error("invalid video geometry {width}x{height}")]
    InvalidGeometry { width: u32, height: u32 },

    #[error("frame store must hold at least one frame")]
    EmptyFrameStore,

    #[error("{name} index {index} is outside the 8-bit input bank")]
    InputOutOfRange { name: &'static str, index: u8 },

    #[error("mode and exit switches share index {0}")]
    SharedSwitch(u8),

    #[error("ping-pong buffering needs at least two frame stores, {0} configured")]
    TooFewFrameStores(u8),

    #[error("the simulated backend has no exit switch to flip; set pipeline.frame_limit")]
    UnboundedSimulation,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Hardware(#[from] HardwareError),
}

pub type Result<T> = std::result::Result<T, Error>;
