//! In-memory VDMA model and scripted controls.
//!
//! Used by the test suite and by the `simulated` backend. The model keeps a
//! trace of every control/park register write and every frame-memory borrow
//! so callers can check the pause/resume discipline after the fact.

use std::collections::{HashMap, VecDeque};

use tracing::{debug, info};

use super::{
    checked_frame, checked_frame_mut, disjoint_pair, FrameMemory, FramePair, InputState, Register,
    RegisterIo, VideoHardware,
};
use crate::capture::vdma::CIRCULAR_PARK;
use crate::capture::{FrameBufferHandle, VideoGeometry};
use crate::error::HardwareError;
use crate::VideoConfig;

const SIM_FRAME_BASE: u32 = 0x1000_0000;
const SIM_VERSION: u32 = 0x0620_0000;
/// Run/stop plus circular park, as left by the bring-up code.
const SIM_CONTROL_RESET: u32 = 0x0000_0001 | CIRCULAR_PARK;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEvent {
    ControlWrite { register: Register, circular: bool },
    ParkPointerWrite(u32),
    FramesMapped {
        inbound: u32,
        outbound: u32,
        circular: bool,
    },
}

pub struct SimulatedVdma {
    registers: HashMap<Register, u32>,
    stores: Vec<Vec<u16>>,
    store_stride: u32,
    trace: Vec<TraceEvent>,
    failing_register: Option<Register>,
    configure_failure: Option<String>,
    unmapped: Option<u32>,
}

impl SimulatedVdma {
    pub fn new(geometry: VideoGeometry, num_frame_stores: u8) -> Self {
        let num_frame_stores = num_frame_stores.max(2);
        let store_stride = geometry.frame_bytes() as u32;

        let mut registers = HashMap::new();
        registers.insert(Register::Mm2sControl, SIM_CONTROL_RESET);
        registers.insert(Register::S2mmControl, SIM_CONTROL_RESET);
        // stale read/write references from a previous run
        registers.insert(Register::ParkPointer, 0x0000_0102);
        registers.insert(Register::Version, SIM_VERSION);
        for n in 0..num_frame_stores {
            let address = SIM_FRAME_BASE + n as u32 * store_stride;
            registers.insert(Register::Mm2sStartAddress(n), address);
            registers.insert(Register::S2mmStartAddress(n), address);
        }

        let mut stores = vec![vec![0u16; geometry.frame_len()]; num_frame_stores as usize];
        stores[0] = bayer_test_pattern(geometry);

        Self {
            registers,
            stores,
            store_stride,
            trace: Vec::new(),
            failing_register: None,
            configure_failure: None,
            unmapped: None,
        }
    }

    /// Make every access to `register` fail.
    pub fn fail_register(mut self, register: Register) -> Self {
        self.failing_register = Some(register);
        self
    }

    pub fn fail_configuration(mut self, reason: impl Into<String>) -> Self {
        self.configure_failure = Some(reason.into());
        self
    }

    /// Refuse to map the frame store at `address` from now on.
    pub fn unmap(&mut self, address: u32) {
        self.unmapped = Some(address);
    }

    pub fn register(&self, register: Register) -> Option<u32> {
        self.registers.get(&register).copied()
    }

    /// True while either channel still cycles through its frame stores.
    pub fn circular_park_enabled(&self) -> bool {
        [Register::Mm2sControl, Register::S2mmControl]
            .iter()
            .filter_map(|r| self.registers.get(r))
            .any(|v| v & CIRCULAR_PARK != 0)
    }

    pub fn trace(&self) -> &[TraceEvent] {
        &self.trace
    }

    pub fn take_trace(&mut self) -> Vec<TraceEvent> {
        std::mem::take(&mut self.trace)
    }

    pub fn store(&self, index: usize) -> &[u16] {
        &self.stores[index]
    }

    pub fn store_mut(&mut self, index: usize) -> &mut [u16] {
        &mut self.stores[index]
    }

    fn store_index(&self, address: u32) -> Result<usize, HardwareError> {
        if self.unmapped == Some(address) {
            return Err(HardwareError::UnmappedFrame { address });
        }
        let offset = address
            .checked_sub(SIM_FRAME_BASE)
            .ok_or(HardwareError::UnmappedFrame { address })?;
        if self.store_stride == 0 || offset % self.store_stride != 0 {
            return Err(HardwareError::UnmappedFrame { address });
        }
        let index = (offset / self.store_stride) as usize;
        if index >= self.stores.len() {
            return Err(HardwareError::UnmappedFrame { address });
        }
        Ok(index)
    }

    fn check(&self, register: Register) -> Result<(), HardwareError> {
        if self.failing_register == Some(register) {
            return Err(HardwareError::RegisterAccess {
                register,
                reason: "simulated bus error".into(),
            });
        }
        Ok(())
    }
}

impl RegisterIo for SimulatedVdma {
    fn read(&mut self, register: Register) -> Result<u32, HardwareError> {
        self.check(register)?;
        Ok(self.registers.get(&register).copied().unwrap_or(0))
    }

    fn write(&mut self, register: Register, value: u32) -> Result<(), HardwareError> {
        self.check(register)?;
        match register {
            Register::Mm2sControl | Register::S2mmControl => {
                self.trace.push(TraceEvent::ControlWrite {
                    register,
                    circular: value & CIRCULAR_PARK != 0,
                });
            }
            Register::ParkPointer => self.trace.push(TraceEvent::ParkPointerWrite(value)),
            _ => {}
        }
        self.registers.insert(register, value);
        Ok(())
    }
}

impl FrameMemory for SimulatedVdma {
    fn frames(
        &mut self,
        inbound: FrameBufferHandle,
        outbound: FrameBufferHandle,
        frame_len: usize,
    ) -> Result<FramePair<'_>, HardwareError> {
        let (in_addr, out_addr) = (inbound.base_address(), outbound.base_address());
        let in_index = self.store_index(in_addr)?;
        let out_index = self.store_index(out_addr)?;

        let circular = self.circular_park_enabled();
        self.trace.push(TraceEvent::FramesMapped {
            inbound: in_addr,
            outbound: out_addr,
            circular,
        });

        let (src, dst) = disjoint_pair(&mut self.stores, in_index, out_index)
            .ok_or(HardwareError::AliasedFrames { address: in_addr })?;
        Ok(FramePair {
            inbound: checked_frame(src, in_addr, frame_len)?,
            outbound: checked_frame_mut(dst, out_addr, frame_len)?,
        })
    }
}

impl VideoHardware for SimulatedVdma {
    fn configure_video_pipeline(&mut self, video: &VideoConfig) -> Result<(), HardwareError> {
        if let Some(reason) = &self.configure_failure {
            return Err(HardwareError::Configuration(reason.clone()));
        }
        info!(
            "Simulated video pipeline configured for {}x{}",
            video.width, video.height
        );
        Ok(())
    }
}

/// Switch and button levels for one polling cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputFrame {
    pub switches: u8,
    pub buttons: u8,
}

impl InputFrame {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn with_switch(mut self, index: u8) -> Self {
        self.switches |= 1 << index;
        self
    }

    pub fn with_button(mut self, index: u8) -> Self {
        self.buttons |= 1 << index;
        self
    }
}

/// Replays one [`InputFrame`] per polling cycle, then holds the last one.
#[derive(Debug, Default)]
pub struct ScriptedInputs {
    script: VecDeque<InputFrame>,
    current: InputFrame,
}

impl ScriptedInputs {
    pub fn new(script: impl IntoIterator<Item = InputFrame>) -> Self {
        Self {
            script: script.into_iter().collect(),
            current: InputFrame::idle(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl InputState for ScriptedInputs {
    fn refresh(&mut self) {
        if let Some(next) = self.script.pop_front() {
            debug!(?next, "Scripted input");
            self.current = next;
        }
    }

    fn switch(&mut self, index: u8) -> bool {
        (self.current.switches >> index) & 1 == 1
    }

    fn button(&mut self, index: u8) -> bool {
        (self.current.buttons >> index) & 1 == 1
    }
}

/// RGGB gradient: red ramps left to right, blue top to bottom, green flat.
pub fn bayer_test_pattern(geometry: VideoGeometry) -> Vec<u16> {
    let (width, height) = (geometry.width(), geometry.height());
    (0..geometry.frame_len())
        .map(|i| {
            let (y, x) = (i / width, i % width);
            match (y % 2, x % 2) {
                (0, 0) => (x * 255 / (width - 1).max(1)) as u16,
                (1, 1) => (y * 255 / (height - 1).max(1)) as u16,
                _ => 128,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> VideoGeometry {
        VideoGeometry::new(4, 4).unwrap()
    }

    #[test]
    fn frames_are_bounds_checked_and_disjoint() {
        let mut sim = SimulatedVdma::new(geometry(), 3);
        let base = sim.register(Register::S2mmStartAddress(0)).unwrap();
        let next = sim.register(Register::Mm2sStartAddress(1)).unwrap();
        let inbound = FrameBufferHandle::new(base, crate::capture::Role::Inbound);
        let outbound = FrameBufferHandle::new(next, crate::capture::Role::Outbound);

        let pair = sim.frames(inbound, outbound, 16).unwrap();
        assert_eq!(pair.inbound.len(), 16);
        assert_eq!(pair.outbound.len(), 16);

        assert!(matches!(
            sim.frames(inbound, outbound, 17),
            Err(HardwareError::FrameTooSmall { required: 17, .. })
        ));
        assert!(matches!(
            sim.frames(inbound, inbound, 16),
            Err(HardwareError::AliasedFrames { .. })
        ));
        let stray = FrameBufferHandle::new(base + 1, crate::capture::Role::Outbound);
        assert!(matches!(
            sim.frames(inbound, stray, 16),
            Err(HardwareError::UnmappedFrame { .. })
        ));
    }

    #[test]
    fn failing_register_reports_bus_error() {
        let mut sim = SimulatedVdma::new(geometry(), 3).fail_register(Register::ParkPointer);
        assert!(matches!(
            sim.read(Register::ParkPointer),
            Err(HardwareError::RegisterAccess { .. })
        ));
        assert!(sim.read(Register::Version).is_ok());
    }

    #[test]
    fn scripted_inputs_hold_last_frame() {
        let mut inputs = ScriptedInputs::new([
            InputFrame::idle().with_button(4),
            InputFrame::idle().with_switch(7),
        ]);
        assert!(!inputs.button(4));

        inputs.refresh();
        assert!(inputs.button(4));
        assert!(!inputs.switch(7));

        inputs.refresh();
        inputs.refresh();
        assert!(inputs.switch(7));
        assert!(!inputs.button(4));
        assert_eq!(inputs.remaining(), 0);
    }

    #[test]
    fn test_pattern_spans_the_sample_range() {
        let pattern = bayer_test_pattern(VideoGeometry::new(8, 8).unwrap());
        assert_eq!(pattern[0], 0);
        assert_eq!(pattern[6], 218);
        assert_eq!(pattern[1], 128);
        assert_eq!(pattern[7 * 8 + 7], 255);
        assert!(pattern.iter().all(|&v| v <= 255));
    }
}
