//! Board access: VDMA registers, frame memory and the switch/button banks.

pub mod devmem;
pub mod sim;

pub use devmem::{DevMemVdma, GpioInputs};
pub use sim::{InputFrame, ScriptedInputs, SimulatedVdma, TraceEvent};

use crate::capture::FrameBufferHandle;
use crate::error::HardwareError;
use crate::VideoConfig;

/// AXI VDMA registers touched by the capture pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    /// Memory-to-display channel control.
    Mm2sControl,
    /// Sensor-to-memory channel control.
    S2mmControl,
    ParkPointer,
    Version,
    Mm2sStartAddress(u8),
    S2mmStartAddress(u8),
}

impl Register {
    /// Byte offset from the VDMA base address.
    pub fn offset(self) -> usize {
        match self {
            Register::Mm2sControl => 0x00,
            Register::ParkPointer => 0x28,
            Register::Version => 0x2C,
            Register::S2mmControl => 0x30,
            Register::Mm2sStartAddress(n) => 0x5C + 4 * n as usize,
            Register::S2mmStartAddress(n) => 0xAC + 4 * n as usize,
        }
    }
}

pub trait RegisterIo {
    fn read(&mut self, register: Register) -> Result<u32, HardwareError>;
    fn write(&mut self, register: Register, value: u32) -> Result<(), HardwareError>;
}

/// The inbound and outbound frame regions, borrowed together.
pub struct FramePair<'a> {
    pub inbound: &'a [u16],
    pub outbound: &'a mut [u16],
}

pub trait FrameMemory {
    /// Borrow exactly `frame_len` samples of each buffer.
    fn frames(
        &mut self,
        inbound: FrameBufferHandle,
        outbound: FrameBufferHandle,
        frame_len: usize,
    ) -> Result<FramePair<'_>, HardwareError>;
}

pub trait VideoHardware: RegisterIo + FrameMemory {
    /// One-time bring-up of the sensor, timing controllers and DMA engine.
    fn configure_video_pipeline(&mut self, video: &VideoConfig) -> Result<(), HardwareError>;
}

pub trait InputState {
    /// Sample the banks once at the start of a polling cycle.
    fn refresh(&mut self) {}
    fn switch(&mut self, index: u8) -> bool;
    fn button(&mut self, index: u8) -> bool;
}

impl<T: RegisterIo + ?Sized> RegisterIo for Box<T> {
    fn read(&mut self, register: Register) -> Result<u32, HardwareError> {
        (**self).read(register)
    }

    fn write(&mut self, register: Register, value: u32) -> Result<(), HardwareError> {
        (**self).write(register, value)
    }
}

impl<T: FrameMemory + ?Sized> FrameMemory for Box<T> {
    fn frames(
        &mut self,
        inbound: FrameBufferHandle,
        outbound: FrameBufferHandle,
        frame_len: usize,
    ) -> Result<FramePair<'_>, HardwareError> {
        (**self).frames(inbound, outbound, frame_len)
    }
}

impl<T: VideoHardware + ?Sized> VideoHardware for Box<T> {
    fn configure_video_pipeline(&mut self, video: &VideoConfig) -> Result<(), HardwareError> {
        (**self).configure_video_pipeline(video)
    }
}

impl<T: InputState + ?Sized> InputState for Box<T> {
    fn refresh(&mut self) {
        (**self).refresh()
    }

    fn switch(&mut self, index: u8) -> bool {
        (**self).switch(index)
    }

    fn button(&mut self, index: u8) -> bool {
        (**self).button(index)
    }
}

/// Split one shared and one exclusive borrow out of `items`.
///
/// `None` when either index is out of range or both name the same element.
pub(crate) fn disjoint_pair<T>(
    items: &mut [T],
    shared: usize,
    exclusive: usize,
) -> Option<(&T, &mut T)> {
    if shared == exclusive || shared >= items.len() || exclusive >= items.len() {
        return None;
    }
    if shared < exclusive {
        let (head, tail) = items.split_at_mut(exclusive);
        Some((&head[shared], &mut tail[0]))
    } else {
        let (head, tail) = items.split_at_mut(shared);
        Some((&tail[0], &mut head[exclusive]))
    }
}

/// Slice a frame region down to `frame_len` samples.
pub(crate) fn checked_frame<'a>(
    samples: &'a [u16],
    address: u32,
    frame_len: usize,
) -> Result<&'a [u16], HardwareError> {
    samples
        .get(..frame_len)
        .ok_or(HardwareError::FrameTooSmall {
            address,
            available: samples.len(),
            required: frame_len,
        })
}

pub(crate) fn checked_frame_mut<'a>(
    samples: &'a mut [u16],
    address: u32,
    frame_len: usize,
) -> Result<&'a mut [u16], HardwareError> {
    let available = samples.len();
    samples
        .get_mut(..frame_len)
        .ok_or(HardwareError::FrameTooSmall {
            address,
            available,
            required: frame_len,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_offsets_follow_the_vdma_map() {
        assert_eq!(Register::Mm2sControl.offset(), 0x00);
        assert_eq!(Register::S2mmControl.offset(), 0x30);
        assert_eq!(Register::ParkPointer.offset(), 0x28);
        assert_eq!(Register::Mm2sStartAddress(1).offset(), 0x60);
        assert_eq!(Register::S2mmStartAddress(0).offset(), 0xAC);
    }

    #[test]
    fn disjoint_pair_refuses_aliasing() {
        let mut items = [1, 2, 3];
        assert!(disjoint_pair(&mut items, 1, 1).is_none());
        assert!(disjoint_pair(&mut items, 0, 3).is_none());

        let (shared, exclusive) = disjoint_pair(&mut items, 2, 0).unwrap();
        *exclusive += *shared;
        assert_eq!(items, [4, 2, 3]);
    }
}
