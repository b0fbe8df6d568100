use std::time::Instant;

use crate::error::ConfigError;

/// Sensor geometry, fixed for the lifetime of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoGeometry {
    width: usize,
    height: usize,
}

impl VideoGeometry {
    pub fn new(width: u32, height: u32) -> Result<Self, ConfigError> {
        let invalid = ConfigError::InvalidGeometry { width, height };
        if width == 0 || height == 0 {
            return Err(invalid);
        }
        let (w, h) = (width as usize, height as usize);
        // frame byte length must be addressable as a u32 offset
        match w.checked_mul(h).and_then(|len| len.checked_mul(2)) {
            Some(bytes) if bytes <= u32::MAX as usize => Ok(Self {
                width: w,
                height: h,
            }),
            _ => Err(invalid),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of 16-bit samples in one frame.
    pub fn frame_len(&self) -> usize {
        self.width * self.height
    }

    pub fn frame_bytes(&self) -> usize {
        self.frame_len() * std::mem::size_of::<u16>()
    }

    #[inline]
    pub fn row(&self, index: usize) -> usize {
        index / self.width
    }

    #[inline]
    pub fn col(&self, index: usize) -> usize {
        index % self.width
    }
}

/// Which DMA channel a frame buffer belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Sensor to memory (S2MM).
    Inbound,
    /// Memory to display (MM2S).
    Outbound,
}

/// Opaque reference to one hardware frame buffer.
///
/// Only the buffer controller creates these; everything else reaches frame
/// memory through the bounds-checked slices it hands out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameBufferHandle {
    base_address: u32,
    role: Role,
}

impl FrameBufferHandle {
    pub(crate) fn new(base_address: u32, role: Role) -> Self {
        Self { base_address, role }
    }

    pub fn base_address(&self) -> u32 {
        self.base_address
    }

    pub fn role(&self) -> Role {
        self.role
    }
}

/// A raw Bayer frame copied out of the inbound buffer.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub sequence: u64,
    pub captured_at: Instant,
    pub data: Box<[u16]>,
}

impl RawFrame {
    pub fn new(sequence: u64, samples: &[u16]) -> Self {
        Self {
            sequence,
            captured_at: Instant::now(),
            data: samples.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_rejects_empty_and_oversized() {
        assert!(VideoGeometry::new(0, 10).is_err());
        assert!(VideoGeometry::new(10, 0).is_err());
        assert!(VideoGeometry::new(u32::MAX, u32::MAX).is_err());

        let geometry = VideoGeometry::new(6, 4).unwrap();
        assert_eq!(geometry.frame_len(), 24);
        assert_eq!(geometry.frame_bytes(), 48);
        assert_eq!(geometry.row(13), 2);
        assert_eq!(geometry.col(13), 1);
    }
}
