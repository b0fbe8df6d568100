//! Park control for the ping-pong VDMA frame buffers

use tracing::{debug, info, instrument, warn};

use crate::capture::frame::{FrameBufferHandle, Role, VideoGeometry};
use crate::error::HardwareError;
use crate::hardware::{FramePair, Register, VideoHardware};

/// Control register bit: cycle through all frame stores instead of parking.
pub const CIRCULAR_PARK: u32 = 0x0000_0002;
/// Park pointer field selecting the MM2S (read) frame.
pub const PARK_READ_REF: u32 = 0x0000_001F;
/// Park pointer field selecting the S2MM (write) frame.
pub const PARK_WRITE_REF: u32 = 0x0000_1F00;

const INBOUND_FRAME: u8 = 0;
const OUTBOUND_FRAME: u8 = 1;

const CHANNELS: [Register; 2] = [Register::Mm2sControl, Register::S2mmControl];

/// Owns the VDMA and the two frame buffers software is allowed to touch.
///
/// Frame memory is only reachable between [`pause`](Self::pause) and
/// [`resume`](Self::resume); while circular park is active the hardware may
/// advance either buffer at any moment.
pub struct FrameBufferController<H> {
    hw: H,
    inbound: FrameBufferHandle,
    outbound: FrameBufferHandle,
    frame_len: usize,
    paused: bool,
}

impl<H: VideoHardware> FrameBufferController<H> {
    /// Park S2MM on frame 0 and MM2S on frame 1, then look up both buffers.
    #[instrument(skip(hw))]
    pub fn new(mut hw: H, geometry: VideoGeometry) -> Result<Self, HardwareError> {
        set_park(&mut hw)?;

        let inbound = hw.read(Register::S2mmStartAddress(INBOUND_FRAME))?;
        let outbound = hw.read(Register::Mm2sStartAddress(OUTBOUND_FRAME))?;
        info!(
            "Frame buffers: inbound {:#010x}, outbound {:#010x}",
            inbound, outbound
        );

        Ok(Self {
            hw,
            inbound: FrameBufferHandle::new(inbound, Role::Inbound),
            outbound: FrameBufferHandle::new(outbound, Role::Outbound),
            frame_len: geometry.frame_len(),
            paused: false,
        })
    }

    /// Clear circular park on both channels so the parked buffers hold still.
    ///
    /// If a channel cannot be stopped, the ones already stopped are handed
    /// back before the error is returned.
    pub fn pause(&mut self) -> Result<(), HardwareError> {
        if self.paused {
            return Err(HardwareError::ParkSuspended);
        }
        for (n, channel) in CHANNELS.into_iter().enumerate() {
            if let Err(e) = self.set_circular(channel, false) {
                for stopped in &CHANNELS[..n] {
                    if let Err(rollback) = self.set_circular(*stopped, true) {
                        warn!(?stopped, %rollback, "Could not restore circular park");
                    }
                }
                return Err(e);
            }
        }
        self.paused = true;
        debug!("Circular park suspended");
        Ok(())
    }

    /// Hand both buffers back to the hardware.
    ///
    /// Every channel is attempted; the first failure is returned.
    pub fn resume(&mut self) -> Result<(), HardwareError> {
        if !self.paused {
            return Err(HardwareError::ParkActive);
        }
        self.paused = false;
        let mut outcome = Ok(());
        for channel in CHANNELS {
            if let Err(e) = self.set_circular(channel, true) {
                warn!(?channel, %e, "Could not restore circular park");
                if outcome.is_ok() {
                    outcome = Err(e);
                }
            }
        }
        outcome?;
        debug!("Circular park restored");
        Ok(())
    }

    fn set_circular(&mut self, channel: Register, enabled: bool) -> Result<(), HardwareError> {
        let control = self.hw.read(channel)?;
        let control = if enabled {
            control | CIRCULAR_PARK
        } else {
            control & !CIRCULAR_PARK
        };
        self.hw.write(channel, control)
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Borrow the parked buffers. Fails unless paused.
    pub fn frames(&mut self) -> Result<FramePair<'_>, HardwareError> {
        if !self.paused {
            return Err(HardwareError::ParkActive);
        }
        self.hw.frames(self.inbound, self.outbound, self.frame_len)
    }

    /// Run `op` on the parked buffers inside a pause/resume bracket.
    ///
    /// Circular park is restored even if the buffers could not be mapped.
    pub fn paused<T>(&mut self, op: impl FnOnce(FramePair<'_>) -> T) -> Result<T, HardwareError> {
        self.pause()?;
        let outcome = self.frames().map(op);
        self.resume()?;
        outcome
    }

    pub fn inbound(&self) -> FrameBufferHandle {
        self.inbound
    }

    pub fn outbound(&self) -> FrameBufferHandle {
        self.outbound
    }

    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    pub fn hardware(&self) -> &H {
        &self.hw
    }

    pub fn hardware_mut(&mut self) -> &mut H {
        &mut self.hw
    }

    pub fn into_hardware(self) -> H {
        self.hw
    }
}

/// Clear both park references and select frame 1 for reads, frame 0 for
/// writes, so the two channels never park on the same store.
fn set_park<H: VideoHardware>(hw: &mut H) -> Result<(), HardwareError> {
    let mut park = hw.read(Register::ParkPointer)?;
    park &= !PARK_READ_REF;
    park &= !PARK_WRITE_REF;
    park |= OUTBOUND_FRAME as u32;
    hw.write(Register::ParkPointer, park)?;
    debug!("Park pointer set to {:#010x}", park);
    Ok(())
}
