//! Physical register and DDR access through `/dev/mem`

use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::ptr;

use memmap2::{MmapMut, MmapOptions};
use tracing::{debug, info, instrument};

use super::{
    checked_frame, checked_frame_mut, disjoint_pair, FrameMemory, FramePair, InputState, Register,
    RegisterIo, VideoHardware,
};
use crate::capture::{FrameBufferHandle, VideoGeometry};
use crate::error::HardwareError;
use crate::{HardwareConfig, VideoConfig};

const DEV_MEM: &str = "/dev/mem";
/// Covers the control, park and start address registers of both channels.
const REGISTER_SPAN: usize = 0x100;

/// A page-aligned mapping of a physical address range.
struct PhysicalRegion {
    map: MmapMut,
    /// Distance from the page boundary to the requested address.
    lead: usize,
    len: usize,
}

impl PhysicalRegion {
    fn map(file: &File, address: u64, len: usize) -> std::io::Result<Self> {
        let page = page_size::get() as u64;
        let aligned = address - address % page;
        let lead = (address - aligned) as usize;
        // SAFETY: /dev/mem mappings are not file-backed data that other
        // processes truncate; the region stays valid for the map's lifetime.
        let map = unsafe {
            MmapOptions::new()
                .offset(aligned)
                .len(lead + len)
                .map_mut(file)?
        };
        Ok(Self { map, lead, len })
    }

    fn read_u32(&self, offset: usize) -> u32 {
        debug_assert!(offset + 4 <= self.len);
        // SAFETY: offset is inside the mapping and register offsets are
        // 4-byte aligned on a page-aligned base.
        unsafe { ptr::read_volatile(self.map.as_ptr().add(self.lead + offset) as *const u32) }
    }

    fn write_u32(&mut self, offset: usize, value: u32) {
        debug_assert!(offset + 4 <= self.len);
        // SAFETY: see read_u32.
        unsafe {
            ptr::write_volatile(
                self.map.as_mut_ptr().add(self.lead + offset) as *mut u32,
                value,
            )
        }
    }

    fn read_u8(&self) -> u8 {
        // SAFETY: every region is at least one byte long.
        unsafe { ptr::read_volatile(self.map.as_ptr().add(self.lead)) }
    }

    fn samples(&self) -> &[u16] {
        // SAFETY: frame regions are only created for 2-byte aligned addresses.
        unsafe {
            std::slice::from_raw_parts(
                self.map.as_ptr().add(self.lead) as *const u16,
                self.len / 2,
            )
        }
    }

    fn samples_mut(&mut self) -> &mut [u16] {
        // SAFETY: see samples.
        unsafe {
            std::slice::from_raw_parts_mut(
                self.map.as_mut_ptr().add(self.lead) as *mut u16,
                self.len / 2,
            )
        }
    }
}

fn open_dev_mem() -> Result<File, HardwareError> {
    Ok(OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_SYNC)
        .open(DEV_MEM)?)
}

/// The AXI VDMA core and its frame stores in physical memory.
pub struct DevMemVdma {
    file: File,
    base: u64,
    registers: PhysicalRegion,
    frames: Vec<(u32, PhysicalRegion)>,
    frame_bytes: usize,
}

impl DevMemVdma {
    #[instrument(skip(hw))]
    pub fn open(hw: &HardwareConfig, geometry: VideoGeometry) -> Result<Self, HardwareError> {
        let file = open_dev_mem()?;
        let registers = PhysicalRegion::map(&file, hw.vdma_base, REGISTER_SPAN)?;
        info!("Mapped VDMA registers at {:#x}", hw.vdma_base);

        Ok(Self {
            file,
            base: hw.vdma_base,
            registers,
            frames: Vec::new(),
            frame_bytes: geometry.frame_bytes(),
        })
    }

    /// Index of the mapping for `address`, creating it on first use.
    fn frame_region(&mut self, address: u32) -> Result<usize, HardwareError> {
        if let Some(index) = self.frames.iter().position(|(a, _)| *a == address) {
            return Ok(index);
        }
        if address % 2 != 0 {
            return Err(HardwareError::UnmappedFrame { address });
        }
        let region = PhysicalRegion::map(&self.file, address as u64, self.frame_bytes)?;
        debug!("Mapped frame store at {:#010x}", address);
        self.frames.push((address, region));
        Ok(self.frames.len() - 1)
    }

    fn checked_offset(&self, register: Register) -> Result<usize, HardwareError> {
        let offset = register.offset();
        if offset + 4 > REGISTER_SPAN {
            return Err(HardwareError::RegisterAccess {
                register,
                reason: format!("offset {:#x} outside the mapped register window", offset),
            });
        }
        Ok(offset)
    }
}

impl RegisterIo for DevMemVdma {
    fn read(&mut self, register: Register) -> Result<u32, HardwareError> {
        let offset = self.checked_offset(register)?;
        Ok(self.registers.read_u32(offset))
    }

    fn write(&mut self, register: Register, value: u32) -> Result<(), HardwareError> {
        let offset = self.checked_offset(register)?;
        self.registers.write_u32(offset, value);
        Ok(())
    }
}

impl FrameMemory for DevMemVdma {
    fn frames(
        &mut self,
        inbound: FrameBufferHandle,
        outbound: FrameBufferHandle,
        frame_len: usize,
    ) -> Result<FramePair<'_>, HardwareError> {
        let (in_addr, out_addr) = (inbound.base_address(), outbound.base_address());
        let in_index = self.frame_region(in_addr)?;
        let out_index = self.frame_region(out_addr)?;

        let ((_, src), (_, dst)) = disjoint_pair(&mut self.frames, in_index, out_index)
            .ok_or(HardwareError::AliasedFrames { address: in_addr })?;
        Ok(FramePair {
            inbound: checked_frame(src.samples(), in_addr, frame_len)?,
            outbound: checked_frame_mut(dst.samples_mut(), out_addr, frame_len)?,
        })
    }
}

impl VideoHardware for DevMemVdma {
    /// Sensor and timing bring-up happen in the boot firmware; here we only
    /// confirm the VDMA core answers on the bus.
    fn configure_video_pipeline(&mut self, video: &VideoConfig) -> Result<(), HardwareError> {
        let version = self.read(Register::Version)?;
        if version == 0 || version == u32::MAX {
            return Err(HardwareError::Configuration(format!(
                "no VDMA core responding at {:#x}",
                self.base
            )));
        }
        info!(
            "VDMA version {}.{:02} ready for {}x{}",
            version >> 28,
            (version >> 20) & 0xFF,
            video.width,
            video.height
        );
        Ok(())
    }
}

/// The 8-bit switch and button GPIO banks.
pub struct GpioInputs {
    switches: PhysicalRegion,
    buttons: PhysicalRegion,
    switch_bits: u8,
    button_bits: u8,
}

impl GpioInputs {
    pub fn open(hw: &HardwareConfig) -> Result<Self, HardwareError> {
        let file = open_dev_mem()?;
        Ok(Self {
            switches: PhysicalRegion::map(&file, hw.switches_base, 1)?,
            buttons: PhysicalRegion::map(&file, hw.buttons_base, 1)?,
            switch_bits: 0,
            button_bits: 0,
        })
    }
}

impl InputState for GpioInputs {
    fn refresh(&mut self) {
        self.switch_bits = self.switches.read_u8();
        self.button_bits = self.buttons.read_u8();
    }

    fn switch(&mut self, index: u8) -> bool {
        (self.switch_bits >> index) & 1 == 1
    }

    fn button(&mut self, index: u8) -> bool {
        (self.button_bits >> index) & 1 == 1
    }
}
